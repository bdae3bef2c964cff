// src/history.rs
//
// Historical transaction tables the miner aggregates over. Rows are
// appended by the document-creation workflow when a document is
// confirmed; the miner only reads grouped aggregates.

use rusqlite::{Connection, Result as SqliteResult, params};
use std::path::Path;
use tracing::info;

pub struct HistoryStore {
    conn: Connection,
}

/// A confirmed purchase-invoice line.
#[derive(Debug, Clone)]
pub struct InvoiceLineRow {
    pub supplier: String,
    pub item_code: String,
    pub item_name: Option<String>,
    pub expense_account: Option<String>,
    pub project: Option<String>,
    pub cost_center: Option<String>,
    pub warehouse: Option<String>,
    pub payment_terms: Option<String>,
    pub tax_template: Option<String>,
    pub uom: Option<String>,
    pub stock_uom: Option<String>,
    pub conversion_factor: Option<f64>,
    pub rate: Option<f64>,
    pub amount: Option<f64>,
    pub posting_date: String,
}

/// A debit line from a confirmed journal entry. Journals carry no item
/// reference; the narration is mined for item clues instead.
#[derive(Debug, Clone)]
pub struct JournalLineRow {
    pub narration: String,
    pub account: String,
    pub party: Option<String>,
    pub project: Option<String>,
    pub cost_center: Option<String>,
    pub debit: f64,
    pub posting_date: String,
}

#[derive(Debug, Clone)]
pub struct PaymentRow {
    pub supplier: String,
    pub mode_of_payment: Option<String>,
    pub bank_account: Option<String>,
    pub project: Option<String>,
    pub cost_center: Option<String>,
    pub posting_date: String,
}

#[derive(Debug, Clone)]
pub struct AssetRow {
    pub supplier: String,
    pub item_code: String,
    pub asset_category: Option<String>,
    pub warehouse: Option<String>,
    pub project: Option<String>,
    pub posting_date: String,
}

#[derive(Debug, Clone)]
pub struct StockMovementRow {
    pub supplier: Option<String>,
    pub item_code: String,
    pub warehouse: Option<String>,
    pub posting_date: String,
}

// Aggregated tuples returned to the miner.

#[derive(Debug, Clone)]
pub struct InvoiceAggregate {
    pub supplier: String,
    pub item_code: String,
    pub expense_account: Option<String>,
    pub project: Option<String>,
    pub cost_center: Option<String>,
    pub warehouse: Option<String>,
    pub payment_terms: Option<String>,
    pub tax_template: Option<String>,
    pub uom: Option<String>,
    pub stock_uom: Option<String>,
    pub conversion_factor: Option<f64>,
    pub average_rate: Option<f64>,
    pub average_amount: Option<f64>,
    pub last_posting: Option<String>,
    pub frequency: u32,
}

#[derive(Debug, Clone)]
pub struct JournalAggregate {
    pub narration: String,
    pub account: String,
    pub party: Option<String>,
    pub project: Option<String>,
    pub cost_center: Option<String>,
    pub frequency: u32,
}

#[derive(Debug, Clone)]
pub struct PaymentAggregate {
    pub supplier: String,
    pub mode_of_payment: Option<String>,
    pub project: Option<String>,
    pub cost_center: Option<String>,
    pub frequency: u32,
}

#[derive(Debug, Clone)]
pub struct AssetAggregate {
    pub supplier: String,
    pub item_code: String,
    pub asset_category: Option<String>,
    pub warehouse: Option<String>,
    pub project: Option<String>,
    pub frequency: u32,
}

#[derive(Debug, Clone)]
pub struct StockAggregate {
    pub supplier: String,
    pub item_code: String,
    pub warehouse: Option<String>,
    pub frequency: u32,
}

impl HistoryStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> SqliteResult<Self> {
        let conn = Connection::open(db_path)?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS purchase_invoice_lines (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                supplier TEXT NOT NULL,
                item_code TEXT NOT NULL,
                item_name TEXT,
                expense_account TEXT,
                project TEXT,
                cost_center TEXT,
                warehouse TEXT,
                payment_terms TEXT,
                tax_template TEXT,
                uom TEXT,
                stock_uom TEXT,
                conversion_factor REAL,
                rate REAL,
                amount REAL,
                posting_date TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS journal_entry_lines (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                narration TEXT NOT NULL,
                account TEXT NOT NULL,
                party TEXT,
                project TEXT,
                cost_center TEXT,
                debit REAL NOT NULL,
                posting_date TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS payment_entries (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                supplier TEXT NOT NULL,
                mode_of_payment TEXT,
                bank_account TEXT,
                project TEXT,
                cost_center TEXT,
                posting_date TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS asset_records (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                supplier TEXT NOT NULL,
                item_code TEXT NOT NULL,
                asset_category TEXT,
                warehouse TEXT,
                project TEXT,
                posting_date TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS stock_movements (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                supplier TEXT,
                item_code TEXT NOT NULL,
                warehouse TEXT,
                posting_date TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_pil_supplier_item
                ON purchase_invoice_lines(supplier, item_code);
            CREATE INDEX IF NOT EXISTS idx_jel_account
                ON journal_entry_lines(account);
            CREATE INDEX IF NOT EXISTS idx_pe_supplier
                ON payment_entries(supplier);",
        )?;

        info!("History store initialized");
        Ok(Self { conn })
    }

    // -----------------------------------------------------------------
    // Appenders, called by the document-creation workflow
    // -----------------------------------------------------------------

    pub fn record_invoice_line(&self, row: &InvoiceLineRow) -> SqliteResult<()> {
        self.conn.execute(
            "INSERT INTO purchase_invoice_lines
                (supplier, item_code, item_name, expense_account, project, cost_center,
                 warehouse, payment_terms, tax_template, uom, stock_uom,
                 conversion_factor, rate, amount, posting_date)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
            params![
                row.supplier,
                row.item_code,
                row.item_name,
                row.expense_account,
                row.project,
                row.cost_center,
                row.warehouse,
                row.payment_terms,
                row.tax_template,
                row.uom,
                row.stock_uom,
                row.conversion_factor,
                row.rate,
                row.amount,
                row.posting_date,
            ],
        )?;
        Ok(())
    }

    pub fn record_journal_line(&self, row: &JournalLineRow) -> SqliteResult<()> {
        self.conn.execute(
            "INSERT INTO journal_entry_lines
                (narration, account, party, project, cost_center, debit, posting_date)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                row.narration,
                row.account,
                row.party,
                row.project,
                row.cost_center,
                row.debit,
                row.posting_date,
            ],
        )?;
        Ok(())
    }

    pub fn record_payment(&self, row: &PaymentRow) -> SqliteResult<()> {
        self.conn.execute(
            "INSERT INTO payment_entries
                (supplier, mode_of_payment, bank_account, project, cost_center, posting_date)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                row.supplier,
                row.mode_of_payment,
                row.bank_account,
                row.project,
                row.cost_center,
                row.posting_date,
            ],
        )?;
        Ok(())
    }

    pub fn record_asset(&self, row: &AssetRow) -> SqliteResult<()> {
        self.conn.execute(
            "INSERT INTO asset_records
                (supplier, item_code, asset_category, warehouse, project, posting_date)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                row.supplier,
                row.item_code,
                row.asset_category,
                row.warehouse,
                row.project,
                row.posting_date,
            ],
        )?;
        Ok(())
    }

    pub fn record_stock_movement(&self, row: &StockMovementRow) -> SqliteResult<()> {
        self.conn.execute(
            "INSERT INTO stock_movements (supplier, item_code, warehouse, posting_date)
             VALUES (?1, ?2, ?3, ?4)",
            params![row.supplier, row.item_code, row.warehouse, row.posting_date],
        )?;
        Ok(())
    }

    // -----------------------------------------------------------------
    // Aggregated readers for the miner
    // -----------------------------------------------------------------

    /// Invoice evidence grouped by supplier, item and attribute set.
    /// No minimum frequency: invoices are the highest-trust source.
    /// Rows with a blank supplier or item are malformed and excluded.
    pub fn invoice_aggregates(&self, lookback_days: u32) -> SqliteResult<Vec<InvoiceAggregate>> {
        let mut stmt = self.conn.prepare(
            "SELECT supplier, item_code, expense_account, project, cost_center,
                    warehouse, payment_terms, tax_template, uom, stock_uom,
                    conversion_factor, AVG(rate), AVG(amount), MAX(posting_date),
                    COUNT(*) as frequency
             FROM purchase_invoice_lines
             WHERE supplier != '' AND item_code != ''
               AND posting_date >= date('now', '-' || ?1 || ' days')
             GROUP BY supplier, item_code, expense_account, project, cost_center, warehouse
             ORDER BY supplier, item_code, frequency DESC",
        )?;
        let rows = stmt.query_map(params![lookback_days], |row| {
            Ok(InvoiceAggregate {
                supplier: row.get(0)?,
                item_code: row.get(1)?,
                expense_account: row.get(2)?,
                project: row.get(3)?,
                cost_center: row.get(4)?,
                warehouse: row.get(5)?,
                payment_terms: row.get(6)?,
                tax_template: row.get(7)?,
                uom: row.get(8)?,
                stock_uom: row.get(9)?,
                conversion_factor: row.get(10)?,
                average_rate: row.get(11)?,
                average_amount: row.get(12)?,
                last_posting: row.get(13)?,
                frequency: row.get(14)?,
            })
        })?;
        rows.collect()
    }

    /// Debit-side journal evidence grouped by account, project and the
    /// leading slice of the narration. Single occurrences are noise and
    /// filtered by `min_frequency`. Columns outside the GROUP BY are
    /// picked with MIN() so repeated runs agree on the same row.
    pub fn journal_aggregates(
        &self,
        lookback_days: u32,
        min_frequency: u32,
    ) -> SqliteResult<Vec<JournalAggregate>> {
        let mut stmt = self.conn.prepare(
            "SELECT MIN(narration), account, MIN(party), project, MIN(cost_center),
                    COUNT(*) as frequency
             FROM journal_entry_lines
             WHERE debit > 0
               AND narration != ''
               AND posting_date >= date('now', '-' || ?1 || ' days')
             GROUP BY account, project, SUBSTR(narration, 1, 50)
             HAVING frequency >= ?2
             ORDER BY frequency DESC",
        )?;
        let rows = stmt.query_map(params![lookback_days, min_frequency], |row| {
            Ok(JournalAggregate {
                narration: row.get(0)?,
                account: row.get(1)?,
                party: row.get(2)?,
                project: row.get(3)?,
                cost_center: row.get(4)?,
                frequency: row.get(5)?,
            })
        })?;
        rows.collect()
    }

    pub fn payment_aggregates(
        &self,
        lookback_days: u32,
        min_frequency: u32,
    ) -> SqliteResult<Vec<PaymentAggregate>> {
        let mut stmt = self.conn.prepare(
            "SELECT supplier, mode_of_payment, MIN(project), MIN(cost_center),
                    COUNT(*) as frequency
             FROM payment_entries
             WHERE supplier != ''
               AND posting_date >= date('now', '-' || ?1 || ' days')
             GROUP BY supplier, mode_of_payment
             HAVING frequency >= ?2
             ORDER BY supplier, frequency DESC",
        )?;
        let rows = stmt.query_map(params![lookback_days, min_frequency], |row| {
            Ok(PaymentAggregate {
                supplier: row.get(0)?,
                mode_of_payment: row.get(1)?,
                project: row.get(2)?,
                cost_center: row.get(3)?,
                frequency: row.get(4)?,
            })
        })?;
        rows.collect()
    }

    pub fn asset_aggregates(&self, lookback_days: u32) -> SqliteResult<Vec<AssetAggregate>> {
        let mut stmt = self.conn.prepare(
            "SELECT supplier, item_code, asset_category, warehouse, project,
                    COUNT(*) as frequency
             FROM asset_records
             WHERE supplier != '' AND item_code != ''
               AND posting_date >= date('now', '-' || ?1 || ' days')
             GROUP BY supplier, item_code, asset_category
             ORDER BY frequency DESC",
        )?;
        let rows = stmt.query_map(params![lookback_days], |row| {
            Ok(AssetAggregate {
                supplier: row.get(0)?,
                item_code: row.get(1)?,
                asset_category: row.get(2)?,
                warehouse: row.get(3)?,
                project: row.get(4)?,
                frequency: row.get(5)?,
            })
        })?;
        rows.collect()
    }

    /// Warehouse placement evidence. Movements without a supplier
    /// cannot form a binding key and are excluded here.
    pub fn stock_aggregates(&self, lookback_days: u32) -> SqliteResult<Vec<StockAggregate>> {
        let mut stmt = self.conn.prepare(
            "SELECT supplier, item_code, warehouse, COUNT(*) as frequency
             FROM stock_movements
             WHERE supplier IS NOT NULL AND supplier != '' AND item_code != ''
               AND posting_date >= date('now', '-' || ?1 || ' days')
             GROUP BY supplier, item_code, warehouse
             ORDER BY frequency DESC",
        )?;
        let rows = stmt.query_map(params![lookback_days], |row| {
            Ok(StockAggregate {
                supplier: row.get(0)?,
                item_code: row.get(1)?,
                warehouse: row.get(2)?,
                frequency: row.get(3)?,
            })
        })?;
        rows.collect()
    }

    /// Rows every aggregate pass will skip: blank supplier or item.
    /// Reported by the miner as a data-quality diagnostic.
    pub fn malformed_row_count(&self) -> SqliteResult<usize> {
        let invoices: usize = self.conn.query_row(
            "SELECT COUNT(*) FROM purchase_invoice_lines
             WHERE supplier = '' OR item_code = ''",
            [],
            |row| row.get(0),
        )?;
        let stock: usize = self.conn.query_row(
            "SELECT COUNT(*) FROM stock_movements
             WHERE supplier IS NULL OR supplier = '' OR item_code = ''",
            [],
            |row| row.get(0),
        )?;
        Ok(invoices + stock)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(supplier: &str, item: &str, expense: &str, project: Option<&str>) -> InvoiceLineRow {
        InvoiceLineRow {
            supplier: supplier.to_string(),
            item_code: item.to_string(),
            item_name: None,
            expense_account: Some(expense.to_string()),
            project: project.map(str::to_string),
            cost_center: None,
            warehouse: None,
            payment_terms: None,
            tax_template: None,
            uom: None,
            stock_uom: None,
            conversion_factor: None,
            rate: Some(90.0),
            amount: Some(9000.0),
            posting_date: "2026-07-01".to_string(),
        }
    }

    #[test]
    fn test_invoice_aggregates_group_and_count() {
        let h = HistoryStore::new(":memory:").unwrap();
        h.record_invoice_line(&line("ABC Motors", "diesel", "Generator Fuel", None))
            .unwrap();
        h.record_invoice_line(&line("ABC Motors", "diesel", "Generator Fuel", None))
            .unwrap();
        h.record_invoice_line(&line("ABC Motors", "diesel", "Truck Fuel", None))
            .unwrap();

        let aggs = h.invoice_aggregates(1095).unwrap();
        assert_eq!(aggs.len(), 2);
        let generator = aggs
            .iter()
            .find(|a| a.expense_account.as_deref() == Some("Generator Fuel"))
            .unwrap();
        assert_eq!(generator.frequency, 2);
    }

    #[test]
    fn test_journal_min_frequency_filters_noise() {
        let h = HistoryStore::new(":memory:").unwrap();
        let row = JournalLineRow {
            narration: "diesel for generator".to_string(),
            account: "Generator Fuel".to_string(),
            party: None,
            project: None,
            cost_center: None,
            debit: 5000.0,
            posting_date: "2026-07-01".to_string(),
        };
        h.record_journal_line(&row).unwrap();
        assert!(h.journal_aggregates(1095, 2).unwrap().is_empty());

        h.record_journal_line(&row).unwrap();
        let aggs = h.journal_aggregates(1095, 2).unwrap();
        assert_eq!(aggs.len(), 1);
        assert_eq!(aggs[0].frequency, 2);
    }

    #[test]
    fn test_journal_aggregates_pick_party_deterministically() {
        let h = HistoryStore::new(":memory:").unwrap();
        let mut row = JournalLineRow {
            narration: "diesel for generator".to_string(),
            account: "Generator Fuel".to_string(),
            party: Some("Beta Fuels".to_string()),
            project: None,
            cost_center: None,
            debit: 5000.0,
            posting_date: "2026-07-01".to_string(),
        };
        h.record_journal_line(&row).unwrap();
        row.party = Some("Alpha Fuels".to_string());
        h.record_journal_line(&row).unwrap();

        let aggs = h.journal_aggregates(1095, 2).unwrap();
        assert_eq!(aggs.len(), 1);
        // MIN over the group, not an arbitrary row
        assert_eq!(aggs[0].party.as_deref(), Some("Alpha Fuels"));
    }

    #[test]
    fn test_payment_aggregates_group_by_mode_across_accounts() {
        let h = HistoryStore::new(":memory:").unwrap();
        let mut row = PaymentRow {
            supplier: "ABC Motors".to_string(),
            mode_of_payment: Some("Bank Transfer".to_string()),
            bank_account: Some("HDFC Current".to_string()),
            project: None,
            cost_center: None,
            posting_date: "2026-07-01".to_string(),
        };
        h.record_payment(&row).unwrap();
        row.bank_account = Some("SBI Current".to_string());
        h.record_payment(&row).unwrap();
        h.record_payment(&row).unwrap();

        // one supplier-level behavior, whichever account paid
        let aggs = h.payment_aggregates(1095, 3).unwrap();
        assert_eq!(aggs.len(), 1);
        assert_eq!(aggs[0].mode_of_payment.as_deref(), Some("Bank Transfer"));
        assert_eq!(aggs[0].frequency, 3);
    }

    #[test]
    fn test_lookback_window_excludes_old_rows() {
        let h = HistoryStore::new(":memory:").unwrap();
        let mut old = line("ABC Motors", "diesel", "Generator Fuel", None);
        old.posting_date = "2015-01-01".to_string();
        h.record_invoice_line(&old).unwrap();
        assert!(h.invoice_aggregates(1095).unwrap().is_empty());
    }

    #[test]
    fn test_malformed_rows_excluded_not_fatal() {
        let h = HistoryStore::new(":memory:").unwrap();
        h.record_invoice_line(&line("", "diesel", "Generator Fuel", None))
            .unwrap();
        h.record_stock_movement(&StockMovementRow {
            supplier: None,
            item_code: "diesel".to_string(),
            warehouse: Some("Main Store".to_string()),
            posting_date: "2026-07-01".to_string(),
        })
        .unwrap();

        assert!(h.invoice_aggregates(1095).unwrap().is_empty());
        assert!(h.stock_aggregates(1095).unwrap().is_empty());
        assert_eq!(h.malformed_row_count().unwrap(), 2);
    }
}
