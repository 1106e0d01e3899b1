//! Error types for the fetch engine.

use std::time::Duration;
use thiserror::Error;

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Failure of a single transport call.
///
/// Transport errors are captured per task and never cancel sibling tasks.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The request could not be sent or the connection failed
    #[error("request to {url} failed: {message}")]
    Request {
        /// Requested URL (without credentials)
        url: String,
        /// Underlying error message
        message: String,
    },

    /// The provider answered with a non-success status
    #[error("HTTP {status} from {url}")]
    Status {
        /// Requested URL (without credentials)
        url: String,
        /// HTTP status code
        status: u16,
    },

    /// The response body was not valid JSON
    #[error("failed to decode response from {url}: {message}")]
    Decode {
        /// Requested URL (without credentials)
        url: String,
        /// Decoder error message
        message: String,
    },

    /// The provider returned an error object instead of data
    #[error("provider error from {url}: {message}")]
    Provider {
        /// Requested URL (without credentials)
        url: String,
        /// Message reported by the provider
        message: String,
    },
}

/// Errors that can occur while validating, fetching or merging.
#[derive(Debug, Error)]
pub enum EngineError {
    /// One or more identifiers are not in the provider catalogue
    #[error("invalid identifier(s): {}", .0.join(", "))]
    InvalidIdentifier(Vec<String>),

    /// Requested frequency is not offered by the endpoint
    #[error("unsupported frequency: {0}")]
    UnsupportedFrequency(String),

    /// Requested catalogue mode does not exist
    #[error("unsupported mode: {0}")]
    UnsupportedMode(String),

    /// Invalid argument (batch size, concurrency, empty request, ...)
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Transport failure
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Task was still pending when the call deadline passed
    #[error("timed out after {0:?}")]
    TimedOut(Duration),

    /// Response had a shape the endpoint cannot interpret
    #[error("unexpected payload: {0}")]
    Payload(String),

    /// The call succeeded but produced no usable rows
    #[error("no rows returned for {0}")]
    EmptyResult(String),

    /// Every dispatched source failed
    #[error("all sources failed: {0}")]
    AllSourcesFailed(String),

    /// Polars error
    #[error("Polars error: {0}")]
    Polars(#[from] polars::prelude::PolarsError),
}

impl EngineError {
    /// Whether this error is raised by input validation, before any dispatch.
    pub const fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::InvalidIdentifier(_)
                | Self::UnsupportedFrequency(_)
                | Self::UnsupportedMode(_)
                | Self::InvalidArgument(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_identifier_lists_every_symbol() {
        let err = EngineError::InvalidIdentifier(vec!["FOO".into(), "BAR".into()]);
        assert_eq!(err.to_string(), "invalid identifier(s): FOO, BAR");
        assert!(err.is_validation());
    }

    #[test]
    fn test_transport_error_is_transparent() {
        let err: EngineError = TransportError::Status {
            url: "https://example.com/api/v3/quote/AAPL".into(),
            status: 503,
        }
        .into();
        assert_eq!(
            err.to_string(),
            "HTTP 503 from https://example.com/api/v3/quote/AAPL"
        );
        assert!(!err.is_validation());
    }
}
