//! Error types for data operations.

use fmp_engine::EngineError;
use thiserror::Error;

/// Result type for data operations.
pub type Result<T> = std::result::Result<T, DataError>;

/// Errors that can occur during data operations.
#[derive(Debug, Error)]
pub enum DataError {
    /// Fetch engine error (validation, transport, merge)
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// Network error
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Polars error
    #[error("Polars error: {0}")]
    Polars(#[from] polars::prelude::PolarsError),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// No API key in the config file or the environment
    #[error("missing API key: set `api_key` in the config file or FMP_API_KEY in the environment")]
    MissingApiKey,

    /// Quarter outside 1..=4
    #[error("invalid quarter {0}, expected 1-4")]
    InvalidQuarter(u8),

    /// Data parsing error
    #[error("Data parsing error: {0}")]
    Parse(String),

    /// Cache error
    #[error("Cache error: {0}")]
    Cache(String),
}

impl DataError {
    /// The engine error behind this error, if any.
    pub const fn engine(&self) -> Option<&EngineError> {
        match self {
            Self::Engine(err) => Some(err),
            _ => None,
        }
    }
}
