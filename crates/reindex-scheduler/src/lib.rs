//! Background resource reindexing.
//!
//! Reindex jobs describe a window of resource last-modified timestamps,
//! optionally limited to one resource type. Each pass walks the active
//! jobs, reindexes one page of resources per job on a bounded worker pool
//! and advances the job's cursor from the timestamps that succeeded.
//!
//! # Example
//!
//! ```ignore
//! use reindex_scheduler::{ReindexScheduler, ReindexService};
//!
//! let service = Arc::new(ReindexService::new(
//!     store, settings.clone(), resource_table, handlers, transactions,
//! )?);
//! service.mark_all_for_reindexing_of_type("Patient")?;
//!
//! let mut scheduler = ReindexScheduler::for_service(service.clone()).await?;
//! scheduler.start().await?;
//! // ...
//! scheduler.shutdown().await?;
//! ```

mod collaborators;
mod config;
mod cursor;
mod error;
mod failure;
mod pool;
mod scanner;
mod scheduler;
mod service;
mod task;
mod transaction;

pub use collaborators::{HandlerResolver, ResourceHandler, ResourceTable};
pub use config::SchedulerConfig;
pub use cursor::{decide, CursorDecision};
pub use error::SchedulerError;
pub use failure::{mark_resource_as_indexing_failed, FailureKind};
pub use pool::{TaskHandle, WorkerPool};
pub use scanner::{ResourceScanner, SCAN_PAGE_SIZE};
pub use scheduler::{validate_cron_expression, ReindexScheduler};
pub use service::{ReindexService, MAX_JOBS_PER_PASS, SUSPEND_BACKOFF_MS};
pub use task::{ReindexTask, TaskContext};
pub use transaction::{in_transaction, Propagation, TransactionScope, TransactionStatus};
