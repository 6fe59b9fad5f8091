//! Error taxonomy for the graph store and the engine built on it.
//!
//! Lookup misses are not errors: stores return `Ok(None)`. Batch operations
//! report per-file failures through [`crate::types::FileError`] instead of
//! failing wholesale, and unsupported languages are skipped silently.

use thiserror::Error;

/// Errors surfaced by a [`crate::store::GraphStore`] and by engine entry points.
#[derive(Debug, Error)]
pub enum GraphError {
    /// Duplicate key, invalid version transition, or an edge whose endpoints
    /// are not in the project.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Backend I/O failure.
    #[error("storage failure: {message}")]
    StorageFailure {
        message: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Malformed arguments from the caller.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl GraphError {
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    /// Wrap a backend error.
    pub fn storage<E>(message: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::StorageFailure {
            message: message.into(),
            source: Box::new(source),
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}

impl From<serde_json::Error> for GraphError {
    fn from(err: serde_json::Error) -> Self {
        Self::storage("failed to encode payload", err)
    }
}

pub type Result<T> = std::result::Result<T, GraphError>;
