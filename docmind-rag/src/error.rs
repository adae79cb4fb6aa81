//! Error types for the `docmind-rag` crate.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Errors that can occur in RAG operations.
#[derive(Debug, Error)]
pub enum RagError {
    /// A required input was empty, blank or otherwise malformed.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// An embedding width does not match the collection's established width.
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// The width the collection (or batch) was established with.
        expected: usize,
        /// The width that was supplied.
        actual: usize,
    },

    /// A vector cannot be normalized (zero magnitude or non-finite values).
    #[error("Invalid vector: {0}")]
    InvalidVector(String),

    /// A collection's structure and document list no longer agree.
    #[error("Corrupt index state in collection '{collection}': {message}")]
    CorruptIndexState {
        /// The affected collection.
        collection: String,
        /// A description of the violated invariant.
        message: String,
    },

    /// A generation call never succeeded within its attempt budget.
    #[error("Exceeded maximum retries ({attempts}) for generation request: {last_error}")]
    RetriesExhausted {
        /// How many attempts were made.
        attempts: u32,
        /// The error of the final attempt.
        last_error: Box<RagError>,
    },

    /// A provider call did not finish within its time limit.
    #[error("Provider timeout ({provider}) after {timeout:?}")]
    ProviderTimeout {
        /// The provider that timed out.
        provider: String,
        /// The limit that was exceeded.
        timeout: Duration,
    },

    /// A provider reported a rate limit, an HTTP failure or a transport failure.
    #[error("Transient provider error ({provider}){}: {message}", status_suffix(.status))]
    ProviderTransient {
        /// The provider that failed.
        provider: String,
        /// The HTTP status, when one was received.
        status: Option<u16>,
        /// A description of the failure.
        message: String,
    },

    /// The operation was cancelled by its caller.
    #[error("Operation cancelled")]
    Cancelled,

    /// An error occurred during embedding generation.
    #[error("Embedding error ({provider}): {message}")]
    EmbeddingError {
        /// The embedding provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// A generation provider failed in a way that is not transient.
    #[error("Generation error ({provider}): {message}")]
    GenerationError {
        /// The generation provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// Reading or writing a durable artifact failed.
    #[error("Storage error at {}: {source}", .path.display())]
    Storage {
        /// The artifact path involved.
        path: PathBuf,
        /// The underlying I/O failure.
        #[source]
        source: std::io::Error,
    },

    /// An artifact could not be encoded.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A configuration validation error.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// An error in the RAG pipeline orchestration.
    #[error("Pipeline error: {0}")]
    PipelineError(String),
}

impl RagError {
    /// Whether the error is a provider failure that the invocation layer
    /// classifies as transient (timeouts, rate limits, HTTP failures).
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::ProviderTimeout { .. } | Self::ProviderTransient { .. })
    }

    /// Whether the error originates from a local precondition check.
    ///
    /// Local errors always reach the caller and are never retried.
    pub fn is_local(&self) -> bool {
        matches!(
            self,
            Self::InvalidInput(_) | Self::DimensionMismatch { .. } | Self::InvalidVector(_)
        )
    }

    pub(crate) fn storage(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Storage { path: path.into(), source }
    }

    pub(crate) fn corrupt(collection: &str, message: impl Into<String>) -> Self {
        Self::CorruptIndexState { collection: collection.to_string(), message: message.into() }
    }
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" status {s}")).unwrap_or_default()
}

/// A convenience result type for RAG operations.
pub type Result<T> = std::result::Result<T, RagError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_transient_and_local_errors() {
        let timeout =
            RagError::ProviderTimeout { provider: "x".into(), timeout: Duration::from_secs(1) };
        let rate_limited = RagError::ProviderTransient {
            provider: "x".into(),
            status: Some(429),
            message: "slow down".into(),
        };
        assert!(timeout.is_transient());
        assert!(rate_limited.is_transient());
        assert!(!RagError::Cancelled.is_transient());

        assert!(RagError::InvalidInput("q".into()).is_local());
        assert!(RagError::DimensionMismatch { expected: 3, actual: 2 }.is_local());
        assert!(!rate_limited.is_local());
    }

    #[test]
    fn transient_message_includes_status_when_present() {
        let err = RagError::ProviderTransient {
            provider: "OpenAI".into(),
            status: Some(503),
            message: "unavailable".into(),
        };
        assert_eq!(err.to_string(), "Transient provider error (OpenAI) status 503: unavailable");

        let err = RagError::ProviderTransient {
            provider: "OpenAI".into(),
            status: None,
            message: "connection reset".into(),
        };
        assert_eq!(err.to_string(), "Transient provider error (OpenAI): connection reset");
    }
}
