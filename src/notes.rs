// src/notes.rs

use tracing::{info, warn};

use crate::clues;
use crate::config::LearningSection;
use crate::confidence;
use crate::error::{LearnError, Result};
use crate::fuzzy;
use crate::model::{AttributePattern, ContextType, ManualNote, PatternSource};
use crate::store::PatternStore;

/// Resolves the supplier from a note's originating document (an OCR
/// processor run or a purchase invoice). Owned by the caller; the
/// learning core only sees this seam.
pub trait SupplierResolver {
    fn resolve_supplier(&self, document_id: &str) -> Option<String>;
}

/// A prior note that scored above the similarity threshold.
#[derive(Debug, Clone)]
pub struct SimilarNote {
    pub note_id: String,
    pub similarity: u32,
    pub linked_field: Option<String>,
    pub confidence_impact: u8,
}

/// What applying a note actually did.
#[derive(Debug, Clone, PartialEq)]
pub enum ApplyOutcome {
    /// A pattern was folded into the store under this binding.
    Applied { supplier: String, item_key: String },
    /// The note was applied before; nothing changed.
    AlreadyApplied,
    /// No supplier could be resolved; note recorded, store untouched.
    SupplierUnresolved,
    /// Context type carries no attribute field; note recorded only.
    RecordedOnly,
}

/// Folds single user corrections into the pattern store, immediately
/// and at most once per note.
pub struct NoteLearner<'a> {
    cfg: &'a LearningSection,
}

impl<'a> NoteLearner<'a> {
    pub fn new(cfg: &'a LearningSection) -> Self {
        NoteLearner { cfg }
    }

    /// One-shot learning application for a stored note.
    pub fn apply(
        &self,
        store: &mut PatternStore,
        note_id: &str,
        resolver: &dyn SupplierResolver,
    ) -> Result<ApplyOutcome> {
        let note = store
            .get_note(note_id)?
            .ok_or_else(|| LearnError::UnknownNote(note_id.to_string()))?;

        if note.applied_to_learning {
            info!(note_id = %note.id, "Note already applied, skipping");
            return Ok(ApplyOutcome::AlreadyApplied);
        }

        let similar = self.similar_patterns(store, &note.text, note.context_type, &note.id)?;
        let best_similarity = similar.first().map(|s| s.similarity);

        let confidence_impact = match best_similarity {
            Some(best) if best > self.cfg.high_similarity_threshold => {
                (best as u8).min(confidence::MAX_CONFIDENCE)
            }
            _ => self.cfg.default_note_confidence,
        };

        store.mark_note_applied(&note.id, confidence_impact, best_similarity)?;

        let Some(document_id) = note.source_document.as_deref() else {
            warn!(note_id = %note.id, "Note has no originating document, recorded without learning");
            return Ok(ApplyOutcome::SupplierUnresolved);
        };
        let Some(supplier) = resolver.resolve_supplier(document_id) else {
            warn!(
                note_id = %note.id,
                document = document_id,
                "Could not resolve supplier, recorded without learning"
            );
            return Ok(ApplyOutcome::SupplierUnresolved);
        };

        let Some((item_key, pattern)) = self.pattern_for(&note) else {
            info!(
                note_id = %note.id,
                context = note.context_type.as_str(),
                "Context carries no attribute field, note recorded only"
            );
            return Ok(ApplyOutcome::RecordedOnly);
        };

        store.upsert(&supplier, &item_key, &pattern, self.cfg.top_k)?;
        info!(
            note_id = %note.id,
            supplier = %supplier,
            item_key = %item_key,
            confidence_impact,
            "Manual note folded into pattern store"
        );
        Ok(ApplyOutcome::Applied { supplier, item_key })
    }

    /// Map the note's context type onto the attribute field its
    /// linked value fills, and derive the item key from the note text.
    fn pattern_for(&self, note: &ManualNote) -> Option<(String, AttributePattern)> {
        let linked = note.linked_field.clone()?;
        let mut pattern = AttributePattern::from_source(PatternSource::ManualNote);
        pattern.note_id = Some(note.id.clone());

        let item_key = match note.context_type {
            ContextType::ExpenseHead => {
                pattern.expense_account = Some(linked);
                clues::extract(&note.text)[0].to_string()
            }
            ContextType::Project => {
                pattern.project = Some(linked);
                clues::extract(&note.text)[0].to_string()
            }
            ContextType::Payment => {
                pattern.payment_terms = Some(linked);
                clues::GENERAL_EXPENSE.to_string()
            }
            // An item note corrects the classification itself: the
            // linked field IS the item key.
            ContextType::Item => linked,
            ContextType::Supplier | ContextType::General => return None,
        };
        Some((item_key, pattern))
    }

    /// Prior notes in the same context scoring above the similarity
    /// threshold, best first. Also used as a preview before saving.
    pub fn similar_patterns(
        &self,
        store: &PatternStore,
        text: &str,
        context_type: ContextType,
        exclude_id: &str,
    ) -> Result<Vec<SimilarNote>> {
        let peers = store.notes_with_context(context_type, exclude_id)?;
        let texts: Vec<String> = peers.iter().map(|n| n.text.clone()).collect();

        let matches = fuzzy::find_matches(text, &texts, self.cfg.similarity_threshold);
        Ok(matches
            .into_iter()
            .map(|m| {
                let peer = &peers[m.index];
                SimilarNote {
                    note_id: peer.id.clone(),
                    similarity: m.score,
                    linked_field: peer.linked_field.clone(),
                    confidence_impact: peer.confidence_impact,
                }
            })
            .collect())
    }

    /// Reuse a historical note's pattern for a new document: counts the
    /// reference and returns the confidence the reuse carries.
    pub fn reuse(&self, store: &PatternStore, note_id: &str) -> Result<u8> {
        let note = store
            .get_note(note_id)?
            .ok_or_else(|| LearnError::UnknownNote(note_id.to_string()))?;

        let conf = confidence::note_reuse_confidence(note.confidence_impact, note.times_referenced);
        store.increment_note_reference(note_id)?;
        info!(note_id = %note_id, confidence = conf, "Historical note pattern reused");
        Ok(conf)
    }
}
