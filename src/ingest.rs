// src/ingest.rs
//
// OCR output boundary. Takes a raw text blob (possibly multi-page,
// concatenated) and pulls out the structured invoice fields with
// keyword-anchored regex patterns. A field the text does not carry is
// absent evidence, never an error.

use regex::Regex;
use serde::{Deserialize, Serialize};

/// One invoice line as the OCR text presents it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedItem {
    pub description: String,
    pub quantity: f64,
    pub rate: f64,
    pub amount: f64,
    pub uom: Option<String>,
}

/// GSTIN plus the split tax amounts, when printed on the invoice.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaxInfo {
    pub gstin: Option<String>,
    pub cgst: Option<f64>,
    pub sgst: Option<f64>,
    pub igst: Option<f64>,
}

impl TaxInfo {
    pub fn is_empty(&self) -> bool {
        self.gstin.is_none() && self.cgst.is_none() && self.sgst.is_none() && self.igst.is_none()
    }
}

/// Structured view over one OCR'd purchase invoice.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractedInvoice {
    pub invoice_number: Option<String>,
    pub invoice_date: Option<String>,
    pub total_amount: Option<f64>,
    pub items: Vec<ExtractedItem>,
    pub payment_terms: Option<String>,
    pub tax_info: TaxInfo,
}

/// Main extraction entry point.
pub fn extract(text: &str) -> ExtractedInvoice {
    ExtractedInvoice {
        invoice_number: extract_invoice_number(text),
        invoice_date: extract_date(text),
        total_amount: extract_total_amount(text),
        items: extract_line_items(text),
        payment_terms: extract_payment_terms(text),
        tax_info: extract_tax_info(text),
    }
}

// ---------------------------------------------------------------------------
// Scalar field extractors
// ---------------------------------------------------------------------------

fn extract_invoice_number(text: &str) -> Option<String> {
    // "Invoice No: INV-2024/001", "Bill Number INV123", "Inv: 42-A".
    // The value itself stays case-sensitive so prose after the word
    // "invoice" is not mistaken for a number.
    let patterns = [
        r"(?i)Invoice\s*(?:No|Number|#)?\s*[:.]?\s*((?-i)[A-Z0-9][A-Z0-9\-/]+)",
        r"(?i)Bill\s*(?:No|Number)?\s*[:.]?\s*((?-i)[A-Z0-9][A-Z0-9\-/]+)",
        r"(?i)Inv\s*[:.]?\s*((?-i)[A-Z0-9][A-Z0-9\-/]+)",
    ];
    first_capture(text, &patterns)
}

fn extract_date(text: &str) -> Option<String> {
    let patterns = [
        r"(\d{4}[-/]\d{1,2}[-/]\d{1,2})",
        r"(\d{1,2}[-/]\d{1,2}[-/]\d{2,4})",
        r"(?i)(\d{1,2}\s+(?:Jan|Feb|Mar|Apr|May|Jun|Jul|Aug|Sep|Oct|Nov|Dec)[a-z]*\s+\d{2,4})",
    ];
    first_capture(text, &patterns)
}

fn extract_total_amount(text: &str) -> Option<f64> {
    // Grand/net totals first so a plain "Total" sub-total does not win
    let patterns = [
        r"(?i)Grand\s*Total\s*[:.]?\s*(?:₹|Rs\.?|INR)?\s*([0-9,]+\.?\d*)",
        r"(?i)Amount\s*Payable\s*[:.]?\s*(?:₹|Rs\.?|INR)?\s*([0-9,]+\.?\d*)",
        r"(?i)Net\s*Amount\s*[:.]?\s*(?:₹|Rs\.?|INR)?\s*([0-9,]+\.?\d*)",
        r"(?i)Total\s*[:.]?\s*(?:₹|Rs\.?|INR)?\s*([0-9,]+\.?\d*)",
    ];
    first_capture(text, &patterns).and_then(|s| s.replace(',', "").parse::<f64>().ok())
}

fn extract_payment_terms(text: &str) -> Option<String> {
    let patterns = [
        r"(?i)Payment\s*Terms?\s*[:.]?\s*([A-Za-z0-9 ]+)",
        r"(?i)(?:Net|Credit)\s*(\d+\s*Days?)",
        r"(?i)Due\s*(?:in|within)\s*(\d+\s*Days?)",
        r"(?i)\b(Cash|COD|Credit)\b",
    ];
    first_capture(text, &patterns)
}

fn extract_tax_info(text: &str) -> TaxInfo {
    let gstin = Regex::new(r"(?i)GST[IN]*\s*[:.]?\s*([0-9][A-Z0-9]{10,})")
        .ok()
        .and_then(|re| re.captures(text).map(|c| c[1].to_string()));

    TaxInfo {
        gstin,
        cgst: tax_amount(text, "CGST"),
        sgst: tax_amount(text, "SGST"),
        igst: tax_amount(text, "IGST"),
    }
}

fn tax_amount(text: &str, label: &str) -> Option<f64> {
    let re = Regex::new(&format!(
        r"(?i){label}\s*(?:@\s*\d+%?)?\s*[:.]?\s*(?:₹|Rs\.?)?\s*([0-9,]+\.?\d*)"
    ))
    .ok()?;
    re.captures(text)
        .and_then(|c| c[1].replace(',', "").parse::<f64>().ok())
}

// ---------------------------------------------------------------------------
// Line items
// ---------------------------------------------------------------------------

fn extract_line_items(text: &str) -> Vec<ExtractedItem> {
    // description, quantity, optional unit, rate, amount
    let Ok(re) = Regex::new(
        r"(?im)^([A-Za-z][A-Za-z \-]+?)\s+(\d+\.?\d*)\s*(Pcs|Kg|Lt|Ltr|Nos|Box|Unit)?\s+(?:₹|Rs\.?)?\s*(\d+\.?\d*)\s+(?:₹|Rs\.?)?\s*(\d+[\d,]*\.?\d*)\s*$",
    ) else {
        return Vec::new();
    };

    let mut items = Vec::new();
    for cap in re.captures_iter(text) {
        let (Ok(quantity), Ok(rate), Ok(amount)) = (
            cap[2].parse::<f64>(),
            cap[4].parse::<f64>(),
            cap[5].replace(',', "").parse::<f64>(),
        ) else {
            continue;
        };
        items.push(ExtractedItem {
            description: cap[1].trim().to_string(),
            quantity,
            rate,
            amount,
            uom: cap.get(3).map(|m| m.as_str().to_string()),
        });
    }
    items
}

fn first_capture(text: &str, patterns: &[&str]) -> Option<String> {
    for pattern in patterns {
        let Ok(re) = Regex::new(pattern) else { continue };
        if let Some(cap) = re.captures(text) {
            return Some(cap[1].trim().to_string());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
ABC Motors Pvt Ltd
Invoice No: INV-2026/0451
Date: 15/07/2026
GSTIN: 27AABCU9603R1ZM

Diesel Supply  500 Lt  92.50  46250.00
Engine Oil  12 Nos  450.00  5400.00

CGST @ 9%: 4648.50
SGST @ 9%: 4648.50
Grand Total: Rs. 60,947.00
Payment Terms: Net 30 Days";

    #[test]
    fn test_full_invoice_extraction() {
        let inv = extract(SAMPLE);
        assert_eq!(inv.invoice_number.as_deref(), Some("INV-2026/0451"));
        assert_eq!(inv.invoice_date.as_deref(), Some("15/07/2026"));
        assert_eq!(inv.total_amount, Some(60947.0));
        assert_eq!(inv.tax_info.gstin.as_deref(), Some("27AABCU9603R1ZM"));
        assert_eq!(inv.tax_info.cgst, Some(4648.5));
        assert_eq!(inv.tax_info.igst, None);
    }

    #[test]
    fn test_line_items_with_uom() {
        let inv = extract(SAMPLE);
        assert_eq!(inv.items.len(), 2);
        assert_eq!(inv.items[0].description, "Diesel Supply");
        assert_eq!(inv.items[0].quantity, 500.0);
        assert_eq!(inv.items[0].rate, 92.5);
        assert_eq!(inv.items[0].uom.as_deref(), Some("Lt"));
        assert_eq!(inv.items[1].description, "Engine Oil");
        assert_eq!(inv.items[1].uom.as_deref(), Some("Nos"));
    }

    #[test]
    fn test_absent_fields_are_none_not_errors() {
        let inv = extract("completely unrelated text with no invoice in it");
        assert_eq!(inv.invoice_number, None);
        assert_eq!(inv.total_amount, None);
        assert!(inv.items.is_empty());
        assert!(inv.tax_info.is_empty());
    }

    #[test]
    fn test_grand_total_beats_subtotal() {
        let text = "Total: 100.00\nGrand Total: Rs 1,100.00";
        assert_eq!(extract_total_amount(text), Some(1100.0));
    }

    #[test]
    fn test_payment_terms_variants() {
        assert_eq!(
            extract_payment_terms("Payment Terms: Net 30 Days").as_deref(),
            Some("Net 30 Days")
        );
        assert_eq!(
            extract_payment_terms("Supplies on Credit 45 days").as_deref(),
            Some("45 days")
        );
        assert_eq!(extract_payment_terms("payable by COD only").as_deref(), Some("COD"));
        assert_eq!(extract_payment_terms("no terms stated here at all"), None);
    }
}
