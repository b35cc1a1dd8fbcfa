//! Error types shared by the reindexing crates.

use thiserror::Error;

/// Unified error type for reindex operations.
///
/// Storage collaborators must report optimistic concurrency and uniqueness
/// violations as [`ReindexError::Conflict`] so the scheduler can leave the
/// resource for a later pass instead of marking it failed.
#[derive(Debug, Error)]
pub enum ReindexError {
    /// Concurrent version or uniqueness conflict
    #[error("Version conflict: {0}")]
    Conflict(String),

    /// Record not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Storage engine error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Resource handler failed while re-deriving the index
    #[error("Handler error: {0}")]
    Handler(String),

    /// Transaction could not be opened or committed
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ReindexError {
    /// Whether this error is a transient conflict rather than a hard failure.
    pub fn is_conflict(&self) -> bool {
        matches!(self, ReindexError::Conflict(_))
    }
}
