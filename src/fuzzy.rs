// src/fuzzy.rs

use strsim::normalized_levenshtein;

/// A candidate that scored above the similarity cutoff.
#[derive(Debug, Clone, PartialEq)]
pub struct FuzzyMatch {
    pub index: usize,
    pub score: u32,
}

/// Edit-distance similarity between two strings, 0..=100.
///
/// Case-insensitive. Two empty strings are identical and score 100.
pub fn ratio(a: &str, b: &str) -> u32 {
    let a = a.trim().to_lowercase();
    let b = b.trim().to_lowercase();
    if a.is_empty() && b.is_empty() {
        return 100;
    }
    (normalized_levenshtein(&a, &b) * 100.0).round() as u32
}

/// Score `needle` against every candidate and return matches above
/// `cutoff`, best first.
pub fn find_matches(needle: &str, candidates: &[String], cutoff: u32) -> Vec<FuzzyMatch> {
    let mut matches: Vec<FuzzyMatch> = candidates
        .iter()
        .enumerate()
        .map(|(index, c)| FuzzyMatch {
            index,
            score: ratio(needle, c),
        })
        .filter(|m| m.score > cutoff)
        .collect();
    matches.sort_by(|a, b| b.score.cmp(&a.score));
    matches
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_strings_score_100() {
        assert_eq!(ratio("diesel fuel", "diesel fuel"), 100);
        assert_eq!(ratio("Diesel Fuel", "diesel fuel"), 100);
    }

    #[test]
    fn test_symmetry() {
        assert_eq!(
            ratio("generator fuel", "truck fuel"),
            ratio("truck fuel", "generator fuel")
        );
    }

    #[test]
    fn test_empty_strings() {
        assert_eq!(ratio("", ""), 100);
        assert_eq!(ratio("diesel", ""), 0);
    }

    #[test]
    fn test_similar_strings_score_high() {
        let score = ratio("diesel for generator", "diesel for generators");
        assert!(score > 90, "got {score}");
    }

    #[test]
    fn test_find_matches_sorted_and_cut() {
        let candidates = vec![
            "coolant for truck 1".to_string(),
            "coolant for truck 2".to_string(),
            "office stationery".to_string(),
        ];
        let matches = find_matches("coolant for truck 1", &candidates, 70);
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].index, 0);
        assert_eq!(matches[0].score, 100);
        assert!(matches[1].score > 70);
    }
}
