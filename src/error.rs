// src/error.rs

use thiserror::Error;

/// Failures the learning core can actually raise.
///
/// Data-quality problems are deliberately not here: missing evidence
/// propagates as empty collections, malformed source rows are skipped
/// and logged, and an unresolvable note supplier is a logged no-op.
#[derive(Debug, Error)]
pub enum LearnError {
    #[error("pattern store error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("unknown note {0}")]
    UnknownNote(String),

    #[error("enhancement service failure: {0}")]
    Enhancement(String),
}

pub type Result<T> = std::result::Result<T, LearnError>;
