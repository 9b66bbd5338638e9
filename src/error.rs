//! Error types for request orchestration.
//!
//! Errors fall into four families:
//!
//! | Family | Variant(s) | Surfaced as |
//! |--------|------------|-------------|
//! | User cancellation | [`ArtError::Cancelled`] | `OperationResult { is_cancel: true }`, no error callback |
//! | Transport failure | [`ArtError::Status`], [`ArtError::Http`] | failed `OperationResult`, retryable |
//! | Configuration | [`ArtError::Configuration`], [`ArtError::UnknownMethod`] | `Err` returned to the caller |
//! | Conversion | [`ArtError::Conversion`], [`ArtError::Serialization`] | failed `OperationResult`, not retried |
//!
//! Only configuration errors ever escape the engine as `Err`; they indicate a
//! programming mistake rather than a runtime condition.

use bytes::Bytes;
use thiserror::Error;

/// Errors produced while building, executing or converting a request.
#[derive(Debug, Clone, Error)]
pub enum ArtError {
    /// The store or request was configured in a way that cannot work
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The request was cancelled by the user or superseded
    #[error("request cancelled: {0}")]
    Cancelled(String),

    /// The server answered with a status the transport treats as a failure
    #[error("HTTP {status}: {message}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Reason phrase or message taken from the response
        message: String,
        /// Raw response body
        body: Bytes,
    },

    /// Network level failure (connect, TLS, body read)
    #[error("HTTP error: {0}")]
    Http(String),

    /// The response converter could not produce a result
    #[error("conversion error: {0}")]
    Conversion(String),

    /// A persistent cache backing failed
    #[error("cache error: {0}")]
    Cache(String),

    /// JSON encoding or decoding failed
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A composed store was asked for a method it does not have
    #[error("no method named `{0}` on this store")]
    UnknownMethod(String),
}

impl ArtError {
    /// Whether this error represents a user cancellation
    pub fn is_cancel(&self) -> bool {
        matches!(self, ArtError::Cancelled(_))
    }

    /// Whether a retry could plausibly succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, ArtError::Status { .. } | ArtError::Http(_))
    }

    /// HTTP status attached to the error, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            ArtError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for ArtError {
    fn from(err: serde_json::Error) -> Self {
        ArtError::Serialization(err.to_string())
    }
}

impl From<reqwest::Error> for ArtError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => ArtError::Status {
                status: status.as_u16(),
                message: status.canonical_reason().unwrap_or_default().to_string(),
                body: Bytes::new(),
            },
            None => ArtError::Http(err.to_string()),
        }
    }
}

impl From<std::io::Error> for ArtError {
    fn from(err: std::io::Error) -> Self {
        ArtError::Cache(err.to_string())
    }
}

/// Result type for art_fetch operations
pub type Result<T> = std::result::Result<T, ArtError>;
