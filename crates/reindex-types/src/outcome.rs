//! Per-resource reindex outcome.

use chrono::{DateTime, Utc};

use crate::resource::ResourceId;

/// Result of reindexing one resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReindexOutcome {
    /// Reindexed; carries the stored last-modified timestamp
    Success(DateTime<Utc>),
    /// Concurrent conflict; left unindexed for a later pass
    Conflict(ResourceId),
    /// Hard failure; the resource was marked failed and its index rows purged
    Failure(ResourceId),
}

impl ReindexOutcome {
    /// Timestamp of a successful reindex, if any.
    pub fn success_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            ReindexOutcome::Success(updated) => Some(*updated),
            _ => None,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ReindexOutcome::Success(_))
    }
}
