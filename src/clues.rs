// src/clues.rs

/// Fallback item key when no keyword family matches.
pub const GENERAL_EXPENSE: &str = "general_expense";

/// Keyword families for deriving an item key from free text
/// (journal narrations, note text, OCR line descriptions).
///
/// Data-driven on purpose: extending the family set must not touch
/// the matching logic.
const KEYWORD_FAMILIES: &[(&str, &[&str])] = &[
    ("diesel", &["diesel", "fuel oil", "gasoil", "petroleum"]),
    ("petrol", &["petrol", "gasoline", "benzin"]),
    ("coolant", &["coolant", "antifreeze", "radiator fluid"]),
    (
        "engine_oil",
        &["engine oil", "motor oil", "lubricant", "mobil", "castrol"],
    ),
    ("grease", &["grease", "lubrication", "bearing grease"]),
    ("brake_fluid", &["brake fluid", "brake oil", "dot 3", "dot 4"]),
    (
        "hydraulic_oil",
        &["hydraulic oil", "hydraulic fluid", "hyd oil"],
    ),
    (
        "spare_parts",
        &["spare", "parts", "component", "replacement"],
    ),
    (
        "filters",
        &["filter", "air filter", "oil filter", "fuel filter"],
    ),
    ("belts", &["belt", "v-belt", "timing belt"]),
    ("tyres", &["tyre", "tire", "wheel"]),
    ("batteries", &["battery", "cell", "power pack"]),
    (
        "office_supplies",
        &["paper", "pen", "stapler", "stationery"],
    ),
    (
        "cleaning",
        &["detergent", "soap", "cleaning", "sanitizer"],
    ),
    ("electrical", &["wire", "cable", "fuse", "bulb", "led"]),
];

/// Scan `text` against the keyword families and return every family
/// whose any keyword appears as a substring.
///
/// Always returns at least one key: `general_expense` when nothing
/// matches, so callers never have to handle an empty set.
pub fn extract(text: &str) -> Vec<&'static str> {
    let text_lower = text.to_lowercase();
    let mut detected: Vec<&'static str> = Vec::new();

    for (family, keywords) in KEYWORD_FAMILIES {
        if keywords.iter().any(|kw| text_lower.contains(kw)) {
            detected.push(family);
        }
    }

    if detected.is_empty() {
        detected.push(GENERAL_EXPENSE);
    }
    detected
}
