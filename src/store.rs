use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, Result as SqliteResult, params};
use sha2::{Digest, Sha256};
use std::path::Path;
use tracing::info;

use crate::confidence::{self, Evidence};
use crate::model::{AttributePattern, ContextType, ManualNote, PatternSource, UomConversion};

/// Durable store for supplier/item bindings, their attribute patterns,
/// and manual notes. SQLite-backed.
pub struct PatternStore {
    conn: Connection,
}

#[derive(Debug, Clone, Copy)]
pub struct StoreCounts {
    pub bindings: usize,
    pub patterns: usize,
    pub notes: usize,
    pub applied_notes: usize,
}

impl PatternStore {
    /// Open (or create) the pattern store at `db_path`.
    pub fn new<P: AsRef<Path>>(db_path: P) -> SqliteResult<Self> {
        let conn = Connection::open(db_path)?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS bindings (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                supplier TEXT NOT NULL,
                item_key TEXT NOT NULL,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                UNIQUE(supplier, item_key)
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS patterns (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                binding_id INTEGER NOT NULL,
                expense_account TEXT,
                project TEXT,
                cost_center TEXT,
                warehouse TEXT,
                payment_terms TEXT,
                tax_template TEXT,
                mode_of_payment TEXT,
                asset_category TEXT,
                source_unit TEXT,
                target_unit TEXT,
                conversion_factor REAL,
                average_rate REAL,
                average_amount REAL,
                frequency INTEGER NOT NULL DEFAULT 1,
                confidence INTEGER NOT NULL DEFAULT 0,
                source TEXT NOT NULL,
                last_used TEXT,
                note_id TEXT,
                FOREIGN KEY (binding_id) REFERENCES bindings(id) ON DELETE CASCADE
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS notes (
                id TEXT PRIMARY KEY,
                note_text TEXT NOT NULL,
                context_type TEXT NOT NULL,
                linked_field TEXT,
                source_document TEXT,
                confidence_impact INTEGER NOT NULL DEFAULT 0,
                times_referenced INTEGER NOT NULL DEFAULT 0,
                pattern_similarity_score INTEGER,
                applied_to_learning INTEGER NOT NULL DEFAULT 0,
                created_by TEXT,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_bindings_supplier ON bindings(supplier)",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_patterns_binding ON patterns(binding_id)",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_notes_context ON notes(context_type)",
            [],
        )?;

        info!("Pattern store initialized");
        Ok(Self { conn })
    }

    /// Deterministic note id from text, context, and source document.
    pub fn generate_note_id(text: &str, context_type: ContextType, source_document: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(text.as_bytes());
        hasher.update(context_type.as_str().as_bytes());
        hasher.update(source_document.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// Merge one observed pattern into the binding for
    /// `(supplier, item_key)`, creating the binding on first sight.
    ///
    /// Patterns deduplicate on (expense_account, project): a repeat
    /// observation adds its frequency to the existing record and
    /// refreshes `last_used`. Confidence is recomputed at write time.
    /// After the merge the binding keeps only the `top_k` most
    /// frequent patterns.
    pub fn upsert(
        &mut self,
        supplier: &str,
        item_key: &str,
        pattern: &AttributePattern,
        top_k: usize,
    ) -> SqliteResult<()> {
        let tx = self.conn.transaction()?;

        tx.execute(
            "INSERT OR IGNORE INTO bindings (supplier, item_key) VALUES (?1, ?2)",
            params![supplier, item_key],
        )?;
        let binding_id: i64 = tx.query_row(
            "SELECT id FROM bindings WHERE supplier = ?1 AND item_key = ?2",
            params![supplier, item_key],
            |row| row.get(0),
        )?;

        let last_used = pattern
            .last_used
            .clone()
            .unwrap_or_else(|| Utc::now().to_rfc3339());

        // Null-safe dedup match on the (expense_account, project) pair.
        let existing: Option<(i64, u32, Option<String>, String)> = tx
            .query_row(
                "SELECT id, frequency, warehouse, source FROM patterns
                 WHERE binding_id = ?1
                   AND expense_account IS ?2
                   AND project IS ?3",
                params![binding_id, pattern.expense_account, pattern.project],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
            .optional()?;

        match existing {
            Some((pattern_id, frequency, stored_warehouse, stored_source)) => {
                let merged_frequency = frequency + pattern.frequency;
                // The merge only adds frequency; confidence must
                // describe the stored row's own fields, not whatever
                // the re-observation happened to carry.
                let conf = confidence::score(&Evidence {
                    frequency: merged_frequency,
                    has_expense_account: pattern.expense_account.is_some(),
                    has_project: pattern.project.is_some(),
                    has_warehouse: stored_warehouse.is_some(),
                    source: PatternSource::parse(&stored_source).unwrap_or(pattern.source),
                });
                tx.execute(
                    "UPDATE patterns
                     SET frequency = ?1, confidence = ?2, last_used = ?3
                     WHERE id = ?4",
                    params![merged_frequency, conf, last_used, pattern_id],
                )?;
            }
            None => {
                let conf = confidence::score(&Evidence::from_pattern(pattern));
                let (source_unit, target_unit, conversion_factor) = match &pattern.uom {
                    Some(u) => (
                        Some(u.source_unit.clone()),
                        Some(u.target_unit.clone()),
                        Some(u.conversion_factor),
                    ),
                    None => (None, None, None),
                };
                tx.execute(
                    "INSERT INTO patterns
                        (binding_id, expense_account, project, cost_center, warehouse,
                         payment_terms, tax_template, mode_of_payment, asset_category,
                         source_unit, target_unit, conversion_factor,
                         average_rate, average_amount,
                         frequency, confidence, source, last_used, note_id)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14,
                             ?15, ?16, ?17, ?18, ?19)",
                    params![
                        binding_id,
                        pattern.expense_account,
                        pattern.project,
                        pattern.cost_center,
                        pattern.warehouse,
                        pattern.payment_terms,
                        pattern.tax_template,
                        pattern.mode_of_payment,
                        pattern.asset_category,
                        source_unit,
                        target_unit,
                        conversion_factor,
                        pattern.average_rate,
                        pattern.average_amount,
                        pattern.frequency,
                        conf,
                        pattern.source.as_str(),
                        last_used,
                        pattern.note_id,
                    ],
                )?;
            }
        }

        // Frequency-ranked eviction down to top_k.
        tx.execute(
            "DELETE FROM patterns
             WHERE binding_id = ?1
               AND id NOT IN (
                   SELECT id FROM patterns
                   WHERE binding_id = ?1
                   ORDER BY frequency DESC, id ASC
                   LIMIT ?2
               )",
            params![binding_id, top_k as i64],
        )?;

        tx.commit()?;
        info!(supplier = %supplier, item_key = %item_key, "Pattern upserted");
        Ok(())
    }

    /// Current top-K patterns for a binding, most frequent first.
    /// Unknown bindings yield an empty list, never an error.
    pub fn read(&self, supplier: &str, item_key: &str) -> SqliteResult<Vec<AttributePattern>> {
        let mut stmt = self.conn.prepare(
            "SELECT p.expense_account, p.project, p.cost_center, p.warehouse,
                    p.payment_terms, p.tax_template, p.mode_of_payment, p.asset_category,
                    p.source_unit, p.target_unit, p.conversion_factor,
                    p.average_rate, p.average_amount,
                    p.frequency, p.confidence, p.source, p.last_used, p.note_id
             FROM patterns p
             JOIN bindings b ON p.binding_id = b.id
             WHERE b.supplier = ?1 AND b.item_key = ?2
             ORDER BY p.frequency DESC, p.id ASC",
        )?;
        let rows = stmt.query_map(params![supplier, item_key], Self::row_to_pattern)?;
        rows.collect()
    }

    /// All patterns for a supplier across every item key. Used as
    /// weaker, supplier-wide fallback evidence by the suggestion engine.
    pub fn read_supplier(&self, supplier: &str) -> SqliteResult<Vec<AttributePattern>> {
        let mut stmt = self.conn.prepare(
            "SELECT p.expense_account, p.project, p.cost_center, p.warehouse,
                    p.payment_terms, p.tax_template, p.mode_of_payment, p.asset_category,
                    p.source_unit, p.target_unit, p.conversion_factor,
                    p.average_rate, p.average_amount,
                    p.frequency, p.confidence, p.source, p.last_used, p.note_id
             FROM patterns p
             JOIN bindings b ON p.binding_id = b.id
             WHERE b.supplier = ?1
             ORDER BY p.frequency DESC, p.id ASC",
        )?;
        let rows = stmt.query_map(params![supplier], Self::row_to_pattern)?;
        rows.collect()
    }

    fn row_to_pattern(row: &rusqlite::Row<'_>) -> rusqlite::Result<AttributePattern> {
        let source_unit: Option<String> = row.get(8)?;
        let target_unit: Option<String> = row.get(9)?;
        let conversion_factor: Option<f64> = row.get(10)?;
        let uom = match (source_unit, target_unit, conversion_factor) {
            (Some(source_unit), Some(target_unit), Some(conversion_factor)) => {
                Some(UomConversion {
                    source_unit,
                    target_unit,
                    conversion_factor,
                })
            }
            _ => None,
        };
        let source_str: String = row.get(15)?;
        Ok(AttributePattern {
            expense_account: row.get(0)?,
            project: row.get(1)?,
            cost_center: row.get(2)?,
            warehouse: row.get(3)?,
            payment_terms: row.get(4)?,
            tax_template: row.get(5)?,
            mode_of_payment: row.get(6)?,
            asset_category: row.get(7)?,
            uom,
            average_rate: row.get(11)?,
            average_amount: row.get(12)?,
            frequency: row.get(13)?,
            confidence: row.get(14)?,
            source: PatternSource::parse(&source_str)
                .unwrap_or(PatternSource::HistoricalJournal),
            last_used: row.get(16)?,
            note_id: row.get(17)?,
        })
    }

    // -----------------------------------------------------------------
    // Manual notes
    // -----------------------------------------------------------------

    /// Persist a manual note. Re-inserting the same note id is a no-op.
    pub fn insert_note(&self, note: &ManualNote) -> SqliteResult<()> {
        self.conn.execute(
            "INSERT OR IGNORE INTO notes
                (id, note_text, context_type, linked_field, source_document,
                 confidence_impact, times_referenced, pattern_similarity_score,
                 applied_to_learning, created_by)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                note.id,
                note.text,
                note.context_type.as_str(),
                note.linked_field,
                note.source_document,
                note.confidence_impact,
                note.times_referenced,
                note.pattern_similarity_score,
                note.applied_to_learning,
                note.created_by,
            ],
        )?;
        info!(note_id = %note.id, context = note.context_type.as_str(), "Note stored");
        Ok(())
    }

    pub fn get_note(&self, id: &str) -> SqliteResult<Option<ManualNote>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, note_text, context_type, linked_field, source_document,
                    confidence_impact, times_referenced, pattern_similarity_score,
                    applied_to_learning, created_by, created_at
             FROM notes WHERE id = ?1",
        )?;
        stmt.query_row(params![id], Self::row_to_note).optional()
    }

    /// Other notes sharing a context type, for similarity search.
    pub fn notes_with_context(
        &self,
        context_type: ContextType,
        exclude_id: &str,
    ) -> SqliteResult<Vec<ManualNote>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, note_text, context_type, linked_field, source_document,
                    confidence_impact, times_referenced, pattern_similarity_score,
                    applied_to_learning, created_by, created_at
             FROM notes
             WHERE context_type = ?1 AND id != ?2
             ORDER BY times_referenced DESC, created_at DESC",
        )?;
        let rows = stmt.query_map(params![context_type.as_str(), exclude_id], Self::row_to_note)?;
        rows.collect()
    }

    fn row_to_note(row: &rusqlite::Row<'_>) -> rusqlite::Result<ManualNote> {
        let context_str: String = row.get(2)?;
        Ok(ManualNote {
            id: row.get(0)?,
            text: row.get(1)?,
            context_type: ContextType::parse(&context_str).unwrap_or(ContextType::General),
            linked_field: row.get(3)?,
            source_document: row.get(4)?,
            confidence_impact: row.get(5)?,
            times_referenced: row.get(6)?,
            pattern_similarity_score: row.get(7)?,
            applied_to_learning: row.get(8)?,
            created_by: row.get(9)?,
            created_at: row.get(10)?,
        })
    }

    /// Record the one-shot learning application of a note.
    pub fn mark_note_applied(
        &self,
        id: &str,
        confidence_impact: u8,
        similarity_score: Option<u32>,
    ) -> SqliteResult<()> {
        self.conn.execute(
            "UPDATE notes
             SET confidence_impact = ?1,
                 pattern_similarity_score = ?2,
                 applied_to_learning = 1
             WHERE id = ?3",
            params![confidence_impact, similarity_score, id],
        )?;
        Ok(())
    }

    /// Count a reuse of this note's pattern by a later invoice.
    pub fn increment_note_reference(&self, id: &str) -> SqliteResult<()> {
        self.conn.execute(
            "UPDATE notes SET times_referenced = times_referenced + 1 WHERE id = ?1",
            params![id],
        )?;
        Ok(())
    }

    pub fn counts(&self) -> SqliteResult<StoreCounts> {
        let bindings: usize =
            self.conn
                .query_row("SELECT COUNT(*) FROM bindings", [], |row| row.get(0))?;
        let patterns: usize =
            self.conn
                .query_row("SELECT COUNT(*) FROM patterns", [], |row| row.get(0))?;
        let notes: usize = self
            .conn
            .query_row("SELECT COUNT(*) FROM notes", [], |row| row.get(0))?;
        let applied_notes: usize = self.conn.query_row(
            "SELECT COUNT(*) FROM notes WHERE applied_to_learning = 1",
            [],
            |row| row.get(0),
        )?;
        Ok(StoreCounts {
            bindings,
            patterns,
            notes,
            applied_notes,
        })
    }
}
