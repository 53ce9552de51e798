//! Error types for Quiver operations.
//!
//! This module provides a common `Error` type and `Result<T>` alias used across
//! all Quiver crates. Uses `thiserror` for derive macros.
//!
//! Errors fall into four families:
//!
//! - configuration errors, raised from validation or adapter construction;
//! - embedding errors (count and dimension mismatches);
//! - backend errors, carrying the driver's own error as `source`;
//! - capability errors, for operations a provider does not implement.

use thiserror::Error;

/// Boxed error used to carry driver errors through [`Error::Backend`].
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that can occur in Quiver operations.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The embedder returned a different number of vectors than texts.
    #[error("Embedding count mismatch: expected {expected} vectors, got {actual}")]
    EmbeddingCountMismatch {
        /// Number of input texts.
        expected: usize,
        /// Number of vectors returned.
        actual: usize,
    },

    /// A vector does not have the dimensionality the store expects.
    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Dimensionality fixed by the store or resolved embedding.
        expected: usize,
        /// Dimensionality actually seen.
        actual: usize,
    },

    /// The provider does not implement this operation.
    #[error("{operation} is not supported by provider {provider}")]
    NotSupported {
        /// Provider name (e.g. `"pinecone"`).
        provider: String,
        /// Operation name (e.g. `"clear"`).
        operation: String,
    },

    /// A filter expression could not be compiled.
    #[error("Invalid filter: {0}")]
    InvalidFilter(String),

    /// Error reported by a backend driver, passed through unchanged.
    #[error("{provider}: {source}")]
    Backend {
        /// Provider that raised the error.
        provider: String,
        /// The driver's error.
        #[source]
        source: BoxError,
    },

    /// Invalid data or format.
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Internal operation failure (task join, poisoned lock, ...).
    #[error("Operation failed: {0}")]
    Operation(String),
}

impl Error {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an invalid filter error.
    pub fn invalid_filter(msg: impl Into<String>) -> Self {
        Self::InvalidFilter(msg.into())
    }

    /// Create an invalid data error.
    pub fn invalid_data(msg: impl Into<String>) -> Self {
        Self::InvalidData(msg.into())
    }

    /// Create an operation error.
    pub fn operation(msg: impl Into<String>) -> Self {
        Self::Operation(msg.into())
    }

    /// Wrap a driver error raised by `provider`.
    pub fn backend(provider: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Backend {
            provider: provider.into(),
            source: source.into(),
        }
    }

    /// Create a capability error for `operation` on `provider`.
    pub fn not_supported(provider: impl Into<String>, operation: impl Into<String>) -> Self {
        Self::NotSupported {
            provider: provider.into(),
            operation: operation.into(),
        }
    }

    /// Whether this is a capability error.
    pub fn is_not_supported(&self) -> bool {
        matches!(self, Self::NotSupported { .. })
    }

    /// Whether this is a configuration error.
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Result type alias using Quiver's Error type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedding_count_mismatch_message() {
        let err = Error::EmbeddingCountMismatch {
            expected: 2,
            actual: 1,
        };
        assert!(err.to_string().contains("Embedding count mismatch"));
        assert!(err.to_string().contains("expected 2"));
    }

    #[test]
    fn test_not_supported() {
        let err = Error::not_supported("pinecone", "close");
        assert!(err.is_not_supported());
        assert!(!err.is_config());
        assert_eq!(err.to_string(), "close is not supported by provider pinecone");
    }

    #[test]
    fn test_backend_keeps_source() {
        let io = std::io::Error::other("connection reset");
        let err = Error::backend("qdrant", io);
        assert_eq!(err.to_string(), "qdrant: connection reset");
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_config_constructor() {
        let err = Error::config("missing api key");
        assert!(err.is_config());
        assert_eq!(err.to_string(), "Configuration error: missing api key");
    }

    #[test]
    fn test_from_serde_json() {
        let parse: std::result::Result<serde_json::Value, _> = serde_json::from_str("{");
        let err: Error = parse.unwrap_err().into();
        assert!(matches!(err, Error::Serialization(_)));
    }
}
