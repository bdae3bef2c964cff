// src/model.rs

use serde::{Deserialize, Serialize};

/// Where a learned pattern came from. Direct invoice mining is the
/// highest-trust origin and earns a confidence boost.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PatternSource {
    HistoricalInvoice,
    HistoricalJournal,
    HistoricalPayment,
    HistoricalAsset,
    HistoricalStock,
    ManualNote,
}

impl PatternSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            PatternSource::HistoricalInvoice => "historical_invoice",
            PatternSource::HistoricalJournal => "historical_journal",
            PatternSource::HistoricalPayment => "historical_payment",
            PatternSource::HistoricalAsset => "historical_asset",
            PatternSource::HistoricalStock => "historical_stock",
            PatternSource::ManualNote => "manual_note",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "historical_invoice" => Some(PatternSource::HistoricalInvoice),
            "historical_journal" => Some(PatternSource::HistoricalJournal),
            "historical_payment" => Some(PatternSource::HistoricalPayment),
            "historical_asset" => Some(PatternSource::HistoricalAsset),
            "historical_stock" => Some(PatternSource::HistoricalStock),
            "manual_note" => Some(PatternSource::ManualNote),
            _ => None,
        }
    }
}

/// Supplier UOM to stock UOM conversion learned from invoice lines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UomConversion {
    pub source_unit: String,
    pub target_unit: String,
    pub conversion_factor: f64,
}

/// One piece of accumulated evidence attached to a (supplier, item_key)
/// binding. Deduplicated within a binding by (expense_account, project).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributePattern {
    pub expense_account: Option<String>,
    pub project: Option<String>,
    pub cost_center: Option<String>,
    pub warehouse: Option<String>,
    pub payment_terms: Option<String>,
    pub tax_template: Option<String>,
    pub mode_of_payment: Option<String>,
    pub asset_category: Option<String>,
    pub uom: Option<UomConversion>,
    pub average_rate: Option<f64>,
    pub average_amount: Option<f64>,
    pub frequency: u32,
    pub confidence: u8,
    pub source: PatternSource,
    pub last_used: Option<String>,
    /// Id of the manual note this pattern came from, when source is
    /// `ManualNote`. Weak reference: the note is owned elsewhere.
    pub note_id: Option<String>,
}

impl AttributePattern {
    /// A blank pattern with frequency 1 from the given source.
    pub fn from_source(source: PatternSource) -> Self {
        AttributePattern {
            expense_account: None,
            project: None,
            cost_center: None,
            warehouse: None,
            payment_terms: None,
            tax_template: None,
            mode_of_payment: None,
            asset_category: None,
            uom: None,
            average_rate: None,
            average_amount: None,
            frequency: 1,
            confidence: 0,
            source,
            last_used: None,
            note_id: None,
        }
    }
}

/// What a manual note is about, which decides the attribute field the
/// note's `linked_field` value lands in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextType {
    Project,
    Item,
    Payment,
    ExpenseHead,
    Supplier,
    General,
}

impl ContextType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContextType::Project => "project",
            ContextType::Item => "item",
            ContextType::Payment => "payment",
            ContextType::ExpenseHead => "expense_head",
            ContextType::Supplier => "supplier",
            ContextType::General => "general",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "project" => Some(ContextType::Project),
            "item" => Some(ContextType::Item),
            "payment" => Some(ContextType::Payment),
            "expense_head" => Some(ContextType::ExpenseHead),
            "supplier" => Some(ContextType::Supplier),
            "general" => Some(ContextType::General),
            _ => None,
        }
    }
}

/// A user-authored correction against a specific source document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManualNote {
    pub id: String,
    pub text: String,
    pub context_type: ContextType,
    pub linked_field: Option<String>,
    /// Identifier of the originating document (OCR processor run or
    /// purchase invoice) the supplier is resolved from.
    pub source_document: Option<String>,
    pub confidence_impact: u8,
    pub times_referenced: u32,
    pub pattern_similarity_score: Option<u32>,
    pub applied_to_learning: bool,
    pub created_by: Option<String>,
    pub created_at: Option<String>,
}

/// One ranked suggestion for a single attribute field.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Suggestion {
    pub value: String,
    pub confidence: u8,
    pub reason: String,
}

/// Asset-likelihood signal derived from the invoice amount. Advisory:
/// the caller decides whether to route the line to asset creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetLikelihood {
    Medium,
    High,
}

/// Engine output: at most one suggestion per attribute field.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Suggestions {
    pub expense_account: Option<Suggestion>,
    pub project: Option<Suggestion>,
    pub cost_center: Option<Suggestion>,
    pub warehouse: Option<Suggestion>,
    pub payment_terms: Option<Suggestion>,
    pub tax_template: Option<Suggestion>,
    pub mode_of_payment: Option<Suggestion>,
    pub asset_category: Option<Suggestion>,
    pub uom_conversion: Option<UomConversion>,
    pub asset_likelihood: Option<AssetLikelihood>,
    pub overall_confidence: u8,
}

impl Suggestions {
    /// True when no field received a suggestion.
    pub fn is_empty(&self) -> bool {
        self.expense_account.is_none()
            && self.project.is_none()
            && self.cost_center.is_none()
            && self.warehouse.is_none()
            && self.payment_terms.is_none()
            && self.tax_template.is_none()
            && self.mode_of_payment.is_none()
            && self.asset_category.is_none()
            && self.uom_conversion.is_none()
    }

    /// Confidences of the emitted field suggestions.
    pub fn field_confidences(&self) -> Vec<u8> {
        [
            &self.expense_account,
            &self.project,
            &self.cost_center,
            &self.warehouse,
            &self.payment_terms,
            &self.tax_template,
            &self.mode_of_payment,
            &self.asset_category,
        ]
        .iter()
        .filter_map(|s| s.as_ref().map(|s| s.confidence))
        .collect()
    }
}
