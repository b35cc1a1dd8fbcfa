//! Reindex job records.
//!
//! A job describes one reindexing campaign over the window
//! `[threshold_low, threshold_high)` of resource last-modified timestamps,
//! optionally restricted to one resource type. `threshold_low` is the
//! resumable cursor; `threshold_high` is fixed at creation.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ReindexError;

/// Lower bound used when a job has not yet advanced its cursor.
pub const BEGINNING_OF_TIME: DateTime<Utc> = DateTime::<Utc>::UNIX_EPOCH;

/// Grace window added to the creation time to form `threshold_high`, in milliseconds.
pub const REINDEX_GRACE_WINDOW: i64 = 5 * 60 * 1000;

/// Opaque job identifier, assigned by the job store at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub u64);

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A durable reindexing campaign.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReindexJob {
    /// Immutable identifier
    pub id: JobId,

    /// Resource type filter; `None` means all types
    #[serde(default)]
    pub resource_type: Option<String>,

    /// Inclusive lower bound of the unprocessed window (unset = epoch)
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub threshold_low: Option<DateTime<Utc>>,

    /// Exclusive upper bound, fixed at creation
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub threshold_high: DateTime<Utc>,

    /// Job is skipped while this lies in the future
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub suspended_until: Option<DateTime<Utc>>,

    /// Soft-delete flag; deleted jobs are expunged by the next pass
    #[serde(default)]
    pub deleted: bool,

    /// When the job was created
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
}

impl ReindexJob {
    /// Create a job covering everything modified before `now` plus the grace window.
    pub fn new(id: JobId, resource_type: Option<String>, now: DateTime<Utc>) -> Self {
        Self {
            id,
            resource_type,
            threshold_low: None,
            threshold_high: now + Duration::milliseconds(REINDEX_GRACE_WINDOW),
            suspended_until: None,
            deleted: false,
            created_at: now,
        }
    }

    /// The cursor value to scan from, treating an unset cursor as epoch.
    pub fn effective_low(&self) -> DateTime<Utc> {
        self.threshold_low.unwrap_or(BEGINNING_OF_TIME)
    }

    /// Whether the job is suspended at `now`.
    pub fn is_suspended(&self, now: DateTime<Utc>) -> bool {
        matches!(self.suspended_until, Some(until) if until > now)
    }

    /// Whether the job outlived its upper bound and should be dropped unfinished.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.threshold_high < now
    }

    /// Whether the cursor has reached the upper bound, leaving an empty window.
    pub fn window_exhausted(&self) -> bool {
        self.effective_low() >= self.threshold_high
    }

    /// Human readable scope for logging.
    pub fn scope(&self) -> &str {
        self.resource_type.as_deref().unwrap_or("(any)")
    }

    /// Serialize to JSON bytes for storage
    pub fn to_bytes(&self) -> Result<Vec<u8>, ReindexError> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Deserialize from JSON bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ReindexError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}
