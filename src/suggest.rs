// src/suggest.rs

use std::collections::HashMap;

use tracing::{debug, info};

use crate::clues;
use crate::config::LearningSection;
use crate::confidence::MAX_CONFIDENCE;
use crate::error::Result;
use crate::model::{AssetLikelihood, AttributePattern, Suggestion, Suggestions};
use crate::store::PatternStore;

/// How the caller identifies the invoice line being suggested for.
#[derive(Debug, Clone, Copy)]
pub enum ItemInput<'a> {
    /// An explicit item code.
    Code(&'a str),
    /// Free text (OCR description, narration); the clue extractor
    /// canonicalizes it into an item key.
    Text(&'a str),
}

impl<'a> ItemInput<'a> {
    /// Treat `raw` as an item code when the store already knows it for
    /// this supplier, otherwise as free text for clue extraction.
    /// Multi-word item codes stay codes this way.
    pub fn infer(store: &PatternStore, supplier: &str, raw: &'a str) -> Result<Self> {
        if store.read(supplier, raw)?.is_empty() {
            Ok(ItemInput::Text(raw))
        } else {
            Ok(ItemInput::Code(raw))
        }
    }

    fn resolve(self) -> &'a str {
        match self {
            ItemInput::Code(code) => code,
            ItemInput::Text(text) => clues::extract(text)[0],
        }
    }
}

/// Deterministic keyword-driven preferences derived from the project
/// context and the invoice amount, applied on top of the vote.
#[derive(Debug, Default, Clone, PartialEq)]
struct ContextBoost {
    expense_preference: Option<&'static str>,
    cost_center_preference: Option<&'static str>,
    asset_likelihood: Option<AssetLikelihood>,
}

/// Read-only consumer of the pattern store: pools supplier-wide and
/// item-specific evidence and majority-votes each attribute field.
pub struct SuggestionEngine<'a> {
    cfg: &'a LearningSection,
}

impl<'a> SuggestionEngine<'a> {
    pub fn new(cfg: &'a LearningSection) -> Self {
        SuggestionEngine { cfg }
    }

    pub fn suggest(
        &self,
        store: &PatternStore,
        supplier: &str,
        item: ItemInput<'_>,
        project_context: Option<&str>,
        amount: Option<f64>,
    ) -> Result<Suggestions> {
        let item_key = item.resolve();

        // Supplier-wide patterns are weaker fallback evidence; the
        // item-specific slice appears in both pools and so votes twice.
        let mut pool = store.read_supplier(supplier)?;
        pool.extend(store.read(supplier, item_key)?);

        if pool.is_empty() {
            debug!(supplier, item_key, "No learned evidence, returning empty suggestions");
            return Ok(Suggestions::default());
        }

        let boost = self.context_boost(project_context, amount);
        let mut out = Suggestions::default();

        if let Some((value, conf, votes)) = vote(&pool, |p| p.expense_account.as_deref(), None) {
            out.expense_account = Some(Suggestion {
                value,
                confidence: conf,
                reason: format!("Used {votes} times"),
            });
        }

        if let Some((value, conf, votes)) = vote(&pool, |p| p.project.as_deref(), None) {
            let (conf, reason) = if boost.expense_preference.is_some() {
                (
                    (conf + 15).min(MAX_CONFIDENCE),
                    "Historical pattern + context match".to_string(),
                )
            } else {
                (conf, format!("Used {votes} times"))
            };
            out.project = Some(Suggestion { value, confidence: conf, reason });
        }

        if let Some((value, conf, votes)) =
            vote(&pool, |p| p.cost_center.as_deref(), boost.cost_center_preference)
        {
            let (conf, reason) = if boost.cost_center_preference == Some(value.as_str()) {
                (
                    (conf + 10).min(MAX_CONFIDENCE),
                    "Historical pattern + context match".to_string(),
                )
            } else {
                (conf, format!("Used {votes} times"))
            };
            out.cost_center = Some(Suggestion { value, confidence: conf, reason });
        }

        out.warehouse = simple_vote(&pool, |p| p.warehouse.as_deref());
        out.payment_terms = simple_vote(&pool, |p| p.payment_terms.as_deref());
        out.tax_template = simple_vote(&pool, |p| p.tax_template.as_deref());
        out.mode_of_payment = simple_vote(&pool, |p| p.mode_of_payment.as_deref());
        out.asset_category = simple_vote(&pool, |p| p.asset_category.as_deref());

        // Most frequently observed conversion wins.
        out.uom_conversion = pool
            .iter()
            .filter(|p| p.uom.is_some())
            .max_by_key(|p| p.frequency)
            .and_then(|p| p.uom.clone());

        out.asset_likelihood = boost.asset_likelihood;

        let confidences = out.field_confidences();
        if !confidences.is_empty() {
            let sum: u32 = confidences.iter().map(|&c| c as u32).sum();
            out.overall_confidence = (sum / confidences.len() as u32) as u8;
        }

        info!(
            supplier,
            item_key,
            pool = pool.len(),
            overall = out.overall_confidence,
            "Suggestions generated"
        );
        Ok(out)
    }

    fn context_boost(&self, project_context: Option<&str>, amount: Option<f64>) -> ContextBoost {
        let mut boost = ContextBoost::default();

        if let Some(project) = project_context {
            let project = project.to_lowercase();

            if ["truck", "vehicle", "transport"].iter().any(|k| project.contains(k)) {
                boost.expense_preference = Some("vehicle_maintenance");
                if project.contains("truck 1") {
                    boost.cost_center_preference = Some("Truck 1 Operations");
                } else if project.contains("truck 2") {
                    boost.cost_center_preference = Some("Truck 2 Operations");
                }
            } else if project.contains("generator") {
                boost.expense_preference = Some("generator_fuel");
                boost.cost_center_preference = Some("Power & Utilities");
            } else if project.contains("office") || project.contains("admin") {
                boost.expense_preference = Some("office_expenses");
                boost.cost_center_preference = Some("Administration");
            }
        }

        if let Some(amount) = amount {
            if amount >= self.cfg.high_value_amount {
                boost.asset_likelihood = Some(AssetLikelihood::High);
            } else if amount >= self.cfg.medium_value_amount {
                boost.asset_likelihood = Some(AssetLikelihood::Medium);
            }
        }

        boost
    }
}

/// Frequency-weighted majority vote over one attribute field.
///
/// Returns `(winner, confidence, winner_votes)`. Confidence is the
/// winner's share of all votes carrying any value for the field, as a
/// percentage capped at the global ceiling. Ties break toward
/// `preference` when it is among the leaders, then lexicographically
/// so repeated calls agree.
fn vote<F>(
    pool: &[AttributePattern],
    field: F,
    preference: Option<&str>,
) -> Option<(String, u8, u32)>
where
    F: Fn(&AttributePattern) -> Option<&str>,
{
    let mut counts: HashMap<&str, u32> = HashMap::new();
    let mut total: u32 = 0;
    for pattern in pool {
        if let Some(value) = field(pattern) {
            *counts.entry(value).or_insert(0) += pattern.frequency;
            total += pattern.frequency;
        }
    }
    if total == 0 {
        return None;
    }

    let mut ranked: Vec<(&str, u32)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));

    let top_votes = ranked[0].1;
    let winner = preference
        .and_then(|pref| {
            ranked
                .iter()
                .find(|(value, votes)| *votes == top_votes && *value == pref)
                .copied()
        })
        .unwrap_or(ranked[0]);

    let confidence = ((winner.1 as u64 * 100 / total as u64) as u8).min(MAX_CONFIDENCE);
    Some((winner.0.to_string(), confidence, winner.1))
}

fn simple_vote<F>(pool: &[AttributePattern], field: F) -> Option<Suggestion>
where
    F: Fn(&AttributePattern) -> Option<&str>,
{
    vote(pool, field, None).map(|(value, confidence, votes)| Suggestion {
        value,
        confidence,
        reason: format!("Used {votes} times"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{PatternSource, UomConversion};

    fn pattern(expense: &str, freq: u32) -> AttributePattern {
        AttributePattern {
            expense_account: Some(expense.to_string()),
            frequency: freq,
            ..AttributePattern::from_source(PatternSource::HistoricalInvoice)
        }
    }

    fn seeded_store() -> PatternStore {
        let mut store = PatternStore::new(":memory:").unwrap();
        // two Generator Fuel observations merge, one Truck Fuel stands alone
        store.upsert("ABC Motors", "diesel", &pattern("Generator Fuel", 1), 10).unwrap();
        store.upsert("ABC Motors", "diesel", &pattern("Generator Fuel", 1), 10).unwrap();
        store.upsert("ABC Motors", "diesel", &pattern("Truck Fuel", 1), 10).unwrap();
        store
    }

    #[test]
    fn test_majority_vote_picks_most_frequent_expense() {
        let cfg = LearningSection::default();
        let store = seeded_store();
        let engine = SuggestionEngine::new(&cfg);

        let out = engine
            .suggest(&store, "ABC Motors", ItemInput::Code("diesel"), None, None)
            .unwrap();

        let expense = out.expense_account.unwrap();
        assert_eq!(expense.value, "Generator Fuel");
        // 2-of-3 majority, doubled by the supplier-wide pool
        assert_eq!(expense.confidence, 66);
        assert!(expense.reason.starts_with("Used "));
    }

    #[test]
    fn test_no_evidence_yields_empty_suggestions() {
        let cfg = LearningSection::default();
        let store = PatternStore::new(":memory:").unwrap();
        let engine = SuggestionEngine::new(&cfg);

        let out = engine
            .suggest(&store, "Nobody & Sons", ItemInput::Code("diesel"), None, Some(500.0))
            .unwrap();
        assert!(out.is_empty());
        assert_eq!(out.overall_confidence, 0);
    }

    #[test]
    fn test_truck_context_breaks_cost_center_tie() {
        let cfg = LearningSection::default();
        let mut store = PatternStore::new(":memory:").unwrap();
        let mut a = pattern("Vehicle Maintenance", 2);
        a.cost_center = Some("General".to_string());
        let mut b = pattern("Vehicle Repairs", 2);
        b.cost_center = Some("Truck 1 Operations".to_string());
        store.upsert("ABC Motors", "coolant", &a, 10).unwrap();
        store.upsert("ABC Motors", "coolant", &b, 10).unwrap();
        let engine = SuggestionEngine::new(&cfg);

        let out = engine
            .suggest(
                &store,
                "ABC Motors",
                ItemInput::Code("coolant"),
                Some("Truck 1 Maintenance"),
                None,
            )
            .unwrap();

        let cc = out.cost_center.unwrap();
        assert_eq!(cc.value, "Truck 1 Operations");
        // tied 50/50, +10 for matching the context preference
        assert_eq!(cc.confidence, 60);
    }

    #[test]
    fn test_expense_preference_boosts_project_confidence() {
        let cfg = LearningSection::default();
        let mut store = PatternStore::new(":memory:").unwrap();
        let mut p = pattern("Generator Fuel", 3);
        p.project = Some("Generator Upkeep".to_string());
        store.upsert("ABC Motors", "diesel", &p, 10).unwrap();
        let engine = SuggestionEngine::new(&cfg);

        let plain = engine
            .suggest(&store, "ABC Motors", ItemInput::Code("diesel"), None, None)
            .unwrap();
        let boosted = engine
            .suggest(
                &store,
                "ABC Motors",
                ItemInput::Code("diesel"),
                Some("Generator shed"),
                None,
            )
            .unwrap();

        assert_eq!(plain.project.unwrap().confidence, 95);
        // already at the ceiling, boost cannot push past it
        assert_eq!(boosted.project.as_ref().unwrap().confidence, 95);
        assert_eq!(
            boosted.project.unwrap().reason,
            "Historical pattern + context match"
        );
    }

    #[test]
    fn test_high_amount_raises_asset_likelihood() {
        let cfg = LearningSection::default();
        let store = seeded_store();
        let engine = SuggestionEngine::new(&cfg);

        let high = engine
            .suggest(&store, "ABC Motors", ItemInput::Code("diesel"), None, Some(60_000.0))
            .unwrap();
        assert_eq!(high.asset_likelihood, Some(AssetLikelihood::High));

        let medium = engine
            .suggest(&store, "ABC Motors", ItemInput::Code("diesel"), None, Some(15_000.0))
            .unwrap();
        assert_eq!(medium.asset_likelihood, Some(AssetLikelihood::Medium));

        let low = engine
            .suggest(&store, "ABC Motors", ItemInput::Code("diesel"), None, Some(800.0))
            .unwrap();
        assert_eq!(low.asset_likelihood, None);
    }

    #[test]
    fn test_infer_keeps_known_multiword_codes() {
        let cfg = LearningSection::default();
        let mut store = PatternStore::new(":memory:").unwrap();
        store
            .upsert("ABC Motors", "heavy diesel 500ppm", &pattern("Generator Fuel", 2), 10)
            .unwrap();

        let known = ItemInput::infer(&store, "ABC Motors", "heavy diesel 500ppm").unwrap();
        assert_eq!(known.resolve(), "heavy diesel 500ppm");

        // unknown free text falls through to clue extraction
        let unknown = ItemInput::infer(&store, "ABC Motors", "HSD diesel supply").unwrap();
        assert_eq!(unknown.resolve(), "diesel");

        let out = SuggestionEngine::new(&cfg)
            .suggest(&store, "ABC Motors", known, None, None)
            .unwrap();
        assert_eq!(out.expense_account.unwrap().value, "Generator Fuel");
    }

    #[test]
    fn test_free_text_resolves_through_clue_extraction() {
        let cfg = LearningSection::default();
        let store = seeded_store();
        let engine = SuggestionEngine::new(&cfg);

        let out = engine
            .suggest(
                &store,
                "ABC Motors",
                ItemInput::Text("HSD diesel supply for the month"),
                None,
                None,
            )
            .unwrap();
        assert_eq!(out.expense_account.unwrap().value, "Generator Fuel");
    }

    #[test]
    fn test_uom_conversion_carried_from_most_frequent() {
        let cfg = LearningSection::default();
        let mut store = PatternStore::new(":memory:").unwrap();
        let mut p = pattern("Generator Fuel", 4);
        p.uom = Some(UomConversion {
            source_unit: "Barrel".to_string(),
            target_unit: "Litre".to_string(),
            conversion_factor: 159.0,
        });
        store.upsert("ABC Motors", "diesel", &p, 10).unwrap();
        let engine = SuggestionEngine::new(&cfg);

        let out = engine
            .suggest(&store, "ABC Motors", ItemInput::Code("diesel"), None, None)
            .unwrap();
        let uom = out.uom_conversion.unwrap();
        assert_eq!(uom.source_unit, "Barrel");
        assert_eq!(uom.conversion_factor, 159.0);
    }
}
