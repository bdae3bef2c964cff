// src/confidence.rs

use crate::model::{AttributePattern, PatternSource};

/// Hard ceiling: historical inference never expresses full certainty.
pub const MAX_CONFIDENCE: u8 = 95;

/// Raw evidence fed into the shared confidence score.
#[derive(Debug, Clone, Copy)]
pub struct Evidence {
    pub frequency: u32,
    pub has_expense_account: bool,
    pub has_project: bool,
    pub has_warehouse: bool,
    pub source: PatternSource,
}

impl Evidence {
    pub fn from_pattern(pattern: &AttributePattern) -> Self {
        Evidence {
            frequency: pattern.frequency,
            has_expense_account: pattern.expense_account.is_some(),
            has_project: pattern.project.is_some(),
            has_warehouse: pattern.warehouse.is_some(),
            source: pattern.source,
        }
    }
}

/// Turn raw evidence into a bounded confidence score.
///
/// Base 50, frequency boost capped at 30, completeness boosts for the
/// expense account / project / warehouse fields, and a source boost for
/// direct invoice mining. Clamped to [0, 95].
pub fn score(evidence: &Evidence) -> u8 {
    let mut confidence: u32 = 50;

    confidence += (evidence.frequency * 5).min(30);

    if evidence.has_expense_account {
        confidence += 10;
    }
    if evidence.has_project {
        confidence += 10;
    }
    if evidence.has_warehouse {
        confidence += 5;
    }

    if evidence.source == PatternSource::HistoricalInvoice {
        confidence += 10;
    }

    confidence.min(MAX_CONFIDENCE as u32) as u8
}

/// Confidence for reusing a historical manual note on a new document:
/// the note's own impact plus a usage boost capped at +20.
pub fn note_reuse_confidence(base: u8, times_referenced: u32) -> u8 {
    let boost = (times_referenced * 2).min(20);
    (base as u32 + boost).min(MAX_CONFIDENCE as u32) as u8
}
