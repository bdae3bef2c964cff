// src/miner.rs

use tracing::{info, warn};

use crate::clues;
use crate::config::LearningSection;
use crate::error::Result;
use crate::history::HistoryStore;
use crate::model::{AttributePattern, PatternSource, UomConversion};
use crate::store::PatternStore;

/// Reserved supplier key for journal evidence with no party.
pub const JOURNAL_SUPPLIER: &str = "journal";

/// Batch learner over the historical transaction tables.
///
/// Safe to re-run: frequency growth is bounded only by the store's
/// dedup-by-(expense_account, project) merge rule, so mining after new
/// documents arrive additively deepens the learned patterns.
pub struct HistoricalMiner<'a> {
    cfg: &'a LearningSection,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct MineSummary {
    pub invoice_patterns: usize,
    pub journal_patterns: usize,
    pub payment_patterns: usize,
    pub asset_patterns: usize,
    pub stock_patterns: usize,
    pub malformed_rows: usize,
}

impl MineSummary {
    pub fn total(&self) -> usize {
        self.invoice_patterns
            + self.journal_patterns
            + self.payment_patterns
            + self.asset_patterns
            + self.stock_patterns
    }
}

impl<'a> HistoricalMiner<'a> {
    pub fn new(cfg: &'a LearningSection) -> Self {
        HistoricalMiner { cfg }
    }

    /// Run all five mining passes, writing through the pattern store.
    pub fn mine(&self, history: &HistoryStore, store: &mut PatternStore) -> Result<MineSummary> {
        let mut summary = MineSummary::default();
        let lookback = self.cfg.lookback_days;

        summary.invoice_patterns = self.mine_invoices(history, store)?;
        summary.journal_patterns = self.mine_journals(history, store)?;
        summary.payment_patterns = self.mine_payments(history, store)?;
        summary.asset_patterns = self.mine_assets(history, store)?;
        summary.stock_patterns = self.mine_stock(history, store)?;

        summary.malformed_rows = history.malformed_row_count()?;
        if summary.malformed_rows > 0 {
            warn!(
                skipped = summary.malformed_rows,
                "Malformed historical rows excluded from mining"
            );
        }

        info!(
            lookback_days = lookback,
            invoice = summary.invoice_patterns,
            journal = summary.journal_patterns,
            payment = summary.payment_patterns,
            asset = summary.asset_patterns,
            stock = summary.stock_patterns,
            "Historical mining complete"
        );
        Ok(summary)
    }

    fn mine_invoices(&self, history: &HistoryStore, store: &mut PatternStore) -> Result<usize> {
        let span = tracing::info_span!("mine_pass", source = "purchase_invoice");
        let _guard = span.enter();

        let aggregates = history.invoice_aggregates(self.cfg.lookback_days)?;
        info!(count = aggregates.len(), "Purchase invoice patterns");

        for agg in &aggregates {
            let uom = match (&agg.uom, &agg.stock_uom, agg.conversion_factor) {
                (Some(source), Some(target), Some(factor)) => Some(UomConversion {
                    source_unit: source.clone(),
                    target_unit: target.clone(),
                    conversion_factor: factor,
                }),
                _ => None,
            };
            let pattern = AttributePattern {
                expense_account: agg.expense_account.clone(),
                project: agg.project.clone(),
                cost_center: agg.cost_center.clone(),
                warehouse: agg.warehouse.clone(),
                payment_terms: agg.payment_terms.clone(),
                tax_template: agg.tax_template.clone(),
                uom,
                average_rate: agg.average_rate,
                average_amount: agg.average_amount,
                frequency: agg.frequency,
                last_used: agg.last_posting.clone(),
                ..AttributePattern::from_source(PatternSource::HistoricalInvoice)
            };
            store.upsert(&agg.supplier, &agg.item_code, &pattern, self.cfg.top_k)?;
        }
        Ok(aggregates.len())
    }

    fn mine_journals(&self, history: &HistoryStore, store: &mut PatternStore) -> Result<usize> {
        let span = tracing::info_span!("mine_pass", source = "journal_entry");
        let _guard = span.enter();

        let aggregates =
            history.journal_aggregates(self.cfg.lookback_days, self.cfg.journal_min_frequency)?;
        info!(count = aggregates.len(), "Journal entry patterns");

        let mut written = 0;
        for agg in &aggregates {
            let supplier = agg.party.as_deref().unwrap_or(JOURNAL_SUPPLIER);
            // No item reference on journals: the narration carries the
            // clue, falling back to general_expense when nothing matches.
            for item_key in clues::extract(&agg.narration) {
                let pattern = AttributePattern {
                    expense_account: Some(agg.account.clone()),
                    project: agg.project.clone(),
                    cost_center: agg.cost_center.clone(),
                    frequency: agg.frequency,
                    ..AttributePattern::from_source(PatternSource::HistoricalJournal)
                };
                store.upsert(supplier, item_key, &pattern, self.cfg.top_k)?;
                written += 1;
            }
        }
        Ok(written)
    }

    fn mine_payments(&self, history: &HistoryStore, store: &mut PatternStore) -> Result<usize> {
        let span = tracing::info_span!("mine_pass", source = "payment_entry");
        let _guard = span.enter();

        let aggregates =
            history.payment_aggregates(self.cfg.lookback_days, self.cfg.payment_min_frequency)?;
        info!(count = aggregates.len(), "Payment entry patterns");

        for agg in &aggregates {
            let pattern = AttributePattern {
                project: agg.project.clone(),
                cost_center: agg.cost_center.clone(),
                mode_of_payment: agg.mode_of_payment.clone(),
                frequency: agg.frequency,
                ..AttributePattern::from_source(PatternSource::HistoricalPayment)
            };
            // Payments carry no item; they are supplier-level behavior.
            store.upsert(
                &agg.supplier,
                clues::GENERAL_EXPENSE,
                &pattern,
                self.cfg.top_k,
            )?;
        }
        Ok(aggregates.len())
    }

    fn mine_assets(&self, history: &HistoryStore, store: &mut PatternStore) -> Result<usize> {
        let span = tracing::info_span!("mine_pass", source = "asset");
        let _guard = span.enter();

        let aggregates = history.asset_aggregates(self.cfg.lookback_days)?;
        info!(count = aggregates.len(), "Asset creation patterns");

        for agg in &aggregates {
            let pattern = AttributePattern {
                project: agg.project.clone(),
                warehouse: agg.warehouse.clone(),
                asset_category: agg.asset_category.clone(),
                frequency: agg.frequency,
                ..AttributePattern::from_source(PatternSource::HistoricalAsset)
            };
            store.upsert(&agg.supplier, &agg.item_code, &pattern, self.cfg.top_k)?;
        }
        Ok(aggregates.len())
    }

    fn mine_stock(&self, history: &HistoryStore, store: &mut PatternStore) -> Result<usize> {
        let span = tracing::info_span!("mine_pass", source = "stock_movement");
        let _guard = span.enter();

        let aggregates = history.stock_aggregates(self.cfg.lookback_days)?;
        info!(count = aggregates.len(), "Stock movement patterns");

        for agg in &aggregates {
            let pattern = AttributePattern {
                warehouse: agg.warehouse.clone(),
                frequency: agg.frequency,
                ..AttributePattern::from_source(PatternSource::HistoricalStock)
            };
            store.upsert(&agg.supplier, &agg.item_code, &pattern, self.cfg.top_k)?;
        }
        Ok(aggregates.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::{AssetRow, InvoiceLineRow, JournalLineRow, PaymentRow, StockMovementRow};

    fn setup() -> (LearningSection, HistoryStore, PatternStore) {
        (
            LearningSection::default(),
            HistoryStore::new(":memory:").unwrap(),
            PatternStore::new(":memory:").unwrap(),
        )
    }

    fn invoice_line(expense: &str) -> InvoiceLineRow {
        InvoiceLineRow {
            supplier: "ABC Motors".to_string(),
            item_code: "diesel".to_string(),
            item_name: Some("Diesel".to_string()),
            expense_account: Some(expense.to_string()),
            project: None,
            cost_center: None,
            warehouse: None,
            payment_terms: Some("30 Days".to_string()),
            tax_template: None,
            uom: Some("Litre".to_string()),
            stock_uom: Some("Litre".to_string()),
            conversion_factor: Some(1.0),
            rate: Some(92.5),
            amount: Some(9250.0),
            posting_date: "2026-07-15".to_string(),
        }
    }

    #[test]
    fn test_invoice_mining_reaches_store() {
        let (cfg, history, mut store) = setup();
        history.record_invoice_line(&invoice_line("Generator Fuel")).unwrap();
        history.record_invoice_line(&invoice_line("Generator Fuel")).unwrap();
        history.record_invoice_line(&invoice_line("Truck Fuel")).unwrap();

        let summary = HistoricalMiner::new(&cfg).mine(&history, &mut store).unwrap();
        assert_eq!(summary.invoice_patterns, 2);

        let patterns = store.read("ABC Motors", "diesel").unwrap();
        assert_eq!(patterns.len(), 2);
        assert_eq!(patterns[0].expense_account.as_deref(), Some("Generator Fuel"));
        assert_eq!(patterns[0].frequency, 2);
        assert_eq!(patterns[0].source, PatternSource::HistoricalInvoice);
    }

    #[test]
    fn test_journal_narration_without_clue_lands_in_general_expense() {
        let (cfg, history, mut store) = setup();
        let row = JournalLineRow {
            narration: "sundry adjustments".to_string(),
            account: "Miscellaneous Expenses".to_string(),
            party: None,
            project: None,
            cost_center: None,
            debit: 1200.0,
            posting_date: "2026-07-01".to_string(),
        };
        history.record_journal_line(&row).unwrap();
        history.record_journal_line(&row).unwrap();

        HistoricalMiner::new(&cfg).mine(&history, &mut store).unwrap();

        let patterns = store.read(JOURNAL_SUPPLIER, clues::GENERAL_EXPENSE).unwrap();
        assert_eq!(patterns.len(), 1);
        assert_eq!(
            patterns[0].expense_account.as_deref(),
            Some("Miscellaneous Expenses")
        );
    }

    #[test]
    fn test_journal_party_becomes_supplier_key() {
        let (cfg, history, mut store) = setup();
        let row = JournalLineRow {
            narration: "diesel top-up for generator".to_string(),
            account: "Generator Fuel".to_string(),
            party: Some("ABC Motors".to_string()),
            project: None,
            cost_center: None,
            debit: 4000.0,
            posting_date: "2026-07-01".to_string(),
        };
        history.record_journal_line(&row).unwrap();
        history.record_journal_line(&row).unwrap();

        HistoricalMiner::new(&cfg).mine(&history, &mut store).unwrap();

        let patterns = store.read("ABC Motors", "diesel").unwrap();
        assert_eq!(patterns.len(), 1);
        assert_eq!(patterns[0].source, PatternSource::HistoricalJournal);
    }

    #[test]
    fn test_payment_asset_and_stock_passes() {
        let (cfg, history, mut store) = setup();

        let payment = PaymentRow {
            supplier: "ABC Motors".to_string(),
            mode_of_payment: Some("Bank Transfer".to_string()),
            bank_account: Some("HDFC Current".to_string()),
            project: None,
            cost_center: None,
            posting_date: "2026-07-01".to_string(),
        };
        // below the min frequency of 3 until the third entry
        history.record_payment(&payment).unwrap();
        history.record_payment(&payment).unwrap();
        history.record_payment(&payment).unwrap();

        history
            .record_asset(&AssetRow {
                supplier: "Genset Traders".to_string(),
                item_code: "generator-5kva".to_string(),
                asset_category: Some("Plant & Machinery".to_string()),
                warehouse: None,
                project: None,
                posting_date: "2026-07-02".to_string(),
            })
            .unwrap();

        history
            .record_stock_movement(&StockMovementRow {
                supplier: "ABC Motors".to_string().into(),
                item_code: "diesel".to_string(),
                warehouse: Some("Fuel Store".to_string()),
                posting_date: "2026-07-03".to_string(),
            })
            .unwrap();

        let summary = HistoricalMiner::new(&cfg).mine(&history, &mut store).unwrap();
        assert_eq!(summary.payment_patterns, 1);
        assert_eq!(summary.asset_patterns, 1);
        assert_eq!(summary.stock_patterns, 1);

        let payments = store.read("ABC Motors", clues::GENERAL_EXPENSE).unwrap();
        assert_eq!(payments[0].mode_of_payment.as_deref(), Some("Bank Transfer"));
        assert_eq!(payments[0].frequency, 3);

        let assets = store.read("Genset Traders", "generator-5kva").unwrap();
        assert_eq!(assets[0].asset_category.as_deref(), Some("Plant & Machinery"));
        assert_eq!(assets[0].source, PatternSource::HistoricalAsset);

        let stock = store.read("ABC Motors", "diesel").unwrap();
        assert_eq!(stock[0].warehouse.as_deref(), Some("Fuel Store"));
    }

    #[test]
    fn test_rerun_adds_frequency_without_duplicates() {
        let (cfg, history, mut store) = setup();
        history.record_invoice_line(&invoice_line("Generator Fuel")).unwrap();

        let miner = HistoricalMiner::new(&cfg);
        miner.mine(&history, &mut store).unwrap();
        miner.mine(&history, &mut store).unwrap();

        let patterns = store.read("ABC Motors", "diesel").unwrap();
        // still one record, re-run merged into it
        assert_eq!(patterns.len(), 1);
        assert_eq!(patterns[0].frequency, 2);
    }
}
