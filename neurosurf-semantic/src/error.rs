//! Error types for the `neurosurf-semantic` crate.

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur while indexing documents or answering queries.
#[derive(Debug, Error)]
pub enum SemanticError {
    /// A document or request field is malformed or empty.
    ///
    /// Always raised before any mutation takes place.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A request argument is out of range (e.g. `k < 1`).
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The requested document does not exist.
    #[error("Document '{id}' not found")]
    NotFound {
        /// The missing document ID.
        id: String,
    },

    /// A query was issued against an index holding zero entries.
    #[error("The index holds no documents")]
    EmptyIndex,

    /// Retrieval produced no usable documents for the query.
    #[error("No documents matched the query")]
    NoResults,

    /// An external capability (embedder or summarizer) failed.
    #[error("{capability} error: {message}")]
    ExternalCapability {
        /// The capability that produced the error, e.g. `"embedder"`.
        capability: String,
        /// A description of the failure.
        message: String,
        /// Whether a retry may succeed.
        retryable: bool,
    },

    /// An external capability did not answer within its time budget.
    #[error("{capability} timed out after {after:?}")]
    Timeout {
        /// The capability that timed out.
        capability: String,
        /// The per-attempt time budget that elapsed.
        after: Duration,
    },

    /// An error occurred in the vector index backend.
    #[error("Vector index error ({backend}): {message}")]
    VectorIndex {
        /// The index backend that produced the error.
        backend: String,
        /// A description of the failure.
        message: String,
    },

    /// The document store could not read or write its backing storage.
    #[error("Storage error: {0}")]
    Storage(String),

    /// A configuration validation error.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl SemanticError {
    /// Build a non-retryable [`SemanticError::ExternalCapability`].
    pub fn capability(capability: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ExternalCapability {
            capability: capability.into(),
            message: message.into(),
            retryable: false,
        }
    }

    /// Build a retryable [`SemanticError::ExternalCapability`].
    pub fn transient(capability: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ExternalCapability {
            capability: capability.into(),
            message: message.into(),
            retryable: true,
        }
    }

    /// Whether the operation that produced this error may succeed if retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout { .. } => true,
            Self::ExternalCapability { retryable, .. } => *retryable,
            _ => false,
        }
    }
}

/// A convenience result type for semantic index operations.
pub type Result<T> = std::result::Result<T, SemanticError>;
