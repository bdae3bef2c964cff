use serde::Deserialize;
use std::{fs, path::Path};

use crate::error::LearnError;

#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default = "default_db_path")]
    pub db_path: String,
    #[serde(default = "default_history_db_path")]
    pub history_db_path: String,
    #[serde(default)]
    pub learning: LearningSection,
    #[serde(default)]
    pub llm: LlmSection,
}

fn default_db_path() -> String {
    "learnstore/patterns.db".to_string()
}

fn default_history_db_path() -> String {
    "learnstore/history.db".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Config {
            db_path: default_db_path(),
            history_db_path: default_history_db_path(),
            learning: LearningSection::default(),
            llm: LlmSection::default(),
        }
    }
}

/// Tunables for the mining, note-learning and suggestion components.
/// Constructed once and passed by reference; there is no ambient
/// settings singleton.
#[derive(Debug, Clone, Deserialize)]
pub struct LearningSection {
    /// How far back historical mining looks, in days.
    #[serde(default = "default_lookback_days")]
    pub lookback_days: u32,
    /// Journal-sourced evidence below this frequency is noise.
    #[serde(default = "default_journal_min_frequency")]
    pub journal_min_frequency: u32,
    /// Payment-entry evidence below this frequency is noise.
    #[serde(default = "default_payment_min_frequency")]
    pub payment_min_frequency: u32,
    /// Patterns retained per binding, ranked by frequency.
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Notes scoring above this ratio count as similar.
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: u32,
    /// Above this ratio the best match drives the confidence impact.
    #[serde(default = "default_high_similarity_threshold")]
    pub high_similarity_threshold: u32,
    /// Confidence impact for a genuinely new note pattern.
    #[serde(default = "default_note_confidence")]
    pub default_note_confidence: u8,
    /// Amounts at or above this raise a high asset-likelihood signal.
    #[serde(default = "default_high_value_amount")]
    pub high_value_amount: f64,
    #[serde(default = "default_medium_value_amount")]
    pub medium_value_amount: f64,
}

fn default_lookback_days() -> u32 {
    1095 // 3 years, same window the historical queries always used
}
fn default_journal_min_frequency() -> u32 {
    2
}
fn default_payment_min_frequency() -> u32 {
    3
}
fn default_top_k() -> usize {
    10
}
fn default_similarity_threshold() -> u32 {
    70
}
fn default_high_similarity_threshold() -> u32 {
    80
}
fn default_note_confidence() -> u8 {
    60
}
fn default_high_value_amount() -> f64 {
    50_000.0
}
fn default_medium_value_amount() -> f64 {
    10_000.0
}

impl Default for LearningSection {
    fn default() -> Self {
        LearningSection {
            lookback_days: default_lookback_days(),
            journal_min_frequency: default_journal_min_frequency(),
            payment_min_frequency: default_payment_min_frequency(),
            top_k: default_top_k(),
            similarity_threshold: default_similarity_threshold(),
            high_similarity_threshold: default_high_similarity_threshold(),
            default_note_confidence: default_note_confidence(),
            high_value_amount: default_high_value_amount(),
            medium_value_amount: default_medium_value_amount(),
        }
    }
}

/// Which backend handles optional AI enhancement of OCR extractions.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmBackend {
    /// No AI calls, heuristic extraction only.
    Disabled,
    Ollama,
    Remote,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmSection {
    #[serde(default = "default_backend")]
    pub backend: LlmBackend,
    #[serde(default)]
    pub ollama: OllamaConfig,
    #[serde(default)]
    pub remote: RemoteConfig,
}

fn default_backend() -> LlmBackend {
    LlmBackend::Disabled
}

impl Default for LlmSection {
    fn default() -> Self {
        LlmSection {
            backend: default_backend(),
            ollama: OllamaConfig::default(),
            remote: RemoteConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct OllamaConfig {
    #[serde(default = "default_ollama_url")]
    pub base_url: String,
    #[serde(default = "default_ollama_model")]
    pub model: String,
}

fn default_ollama_url() -> String {
    "http://localhost:11434/v1".to_string()
}
fn default_ollama_model() -> String {
    "qwen2.5:7b".to_string()
}

impl Default for OllamaConfig {
    fn default() -> Self {
        OllamaConfig {
            base_url: default_ollama_url(),
            model: default_ollama_model(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RemoteConfig {
    #[serde(default)]
    pub base_url: String,
    #[serde(default)]
    pub model: String,
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, LearnError> {
        let content = fs::read_to_string(&path)
            .map_err(|e| LearnError::Config(format!("{}: {e}", path.as_ref().display())))?;
        toml::from_str(&content).map_err(|e| LearnError::Config(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_toml() {
        let cfg: Config = toml::from_str("").unwrap();
        assert_eq!(cfg.learning.top_k, 10);
        assert_eq!(cfg.learning.journal_min_frequency, 2);
        assert_eq!(cfg.learning.similarity_threshold, 70);
        assert_eq!(cfg.llm.backend, LlmBackend::Disabled);
    }

    #[test]
    fn test_partial_override() {
        let cfg: Config = toml::from_str(
            r#"
            db_path = "test.db"

            [learning]
            top_k = 5
            high_value_amount = 75000.0

            [llm]
            backend = "ollama"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.db_path, "test.db");
        assert_eq!(cfg.learning.top_k, 5);
        assert_eq!(cfg.learning.high_value_amount, 75000.0);
        assert_eq!(cfg.llm.backend, LlmBackend::Ollama);
        // untouched sections keep defaults
        assert_eq!(cfg.learning.lookback_days, 1095);
    }
}
