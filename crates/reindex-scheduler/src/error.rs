//! Error types for the scheduler crate.
//!
//! Covers cron/timezone validation, scheduler lifecycle, worker pool
//! shutdown and fatal pass errors. Per-resource failures never surface
//! here; they are reported as [`reindex_types::ReindexOutcome`] values.

use reindex_storage::StorageError;
use reindex_types::ReindexError;
use thiserror::Error;
use tokio_cron_scheduler::JobSchedulerError;

/// Errors that can occur during scheduler operations.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Error from the underlying tokio-cron-scheduler
    #[error("Scheduler error: {0}")]
    Scheduler(String),

    /// Invalid cron expression
    #[error("Invalid cron expression: {0}")]
    InvalidCron(String),

    /// Invalid timezone string
    #[error("Invalid timezone: {0}")]
    InvalidTimezone(String),

    /// Scheduler is already running
    #[error("Scheduler is already running")]
    AlreadyRunning,

    /// Scheduler is not running
    #[error("Scheduler is not running")]
    NotRunning,

    /// The worker pool was shut down before the task completed
    #[error("Worker pool shut down")]
    PoolShutdown,

    /// No Tokio runtime available to host the worker pool
    #[error("No Tokio runtime: {0}")]
    NoRuntime(String),

    /// The resource scanner returned an unusable page
    #[error("Scan error: {0}")]
    Scan(String),

    /// Job store failure
    #[error("Job store error: {0}")]
    Storage(#[from] StorageError),

    /// Collaborator failure outside of a resource task
    #[error("Reindex error: {0}")]
    Reindex(#[from] ReindexError),
}

impl From<JobSchedulerError> for SchedulerError {
    fn from(err: JobSchedulerError) -> Self {
        SchedulerError::Scheduler(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SchedulerError::InvalidCron("bad expression".to_string());
        assert!(err.to_string().contains("Invalid cron expression"));

        let err = SchedulerError::InvalidTimezone("Bad/Zone".to_string());
        assert!(err.to_string().contains("Invalid timezone"));

        let err = SchedulerError::AlreadyRunning;
        assert!(err.to_string().contains("already running"));

        let err = SchedulerError::PoolShutdown;
        assert!(err.to_string().contains("pool shut down"));

        let err = SchedulerError::Scan("unordered page".to_string());
        assert!(err.to_string().contains("unordered page"));
    }

    #[test]
    fn test_from_reindex_error() {
        let err: SchedulerError = ReindexError::Transaction("begin failed".into()).into();
        assert!(matches!(err, SchedulerError::Reindex(_)));
    }
}
