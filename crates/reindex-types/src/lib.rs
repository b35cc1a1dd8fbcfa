//! # reindex-types
//!
//! Shared domain types for the resource reindexing scheduler.
//!
//! This crate defines the data structures passed between the job store,
//! the scheduler and the storage collaborators:
//! - Jobs: durable reindexing campaigns with a resumable cursor
//! - Resources: candidates returned by range scans and stored records
//! - Outcomes: per-resource results collected within a pass
//! - Settings: layered configuration

pub mod config;
pub mod error;
pub mod job;
pub mod outcome;
pub mod resource;

pub use config::ReindexSettings;
pub use error::ReindexError;
pub use job::{JobId, ReindexJob, BEGINNING_OF_TIME, REINDEX_GRACE_WINDOW};
pub use outcome::ReindexOutcome;
pub use resource::{
    ForcedId, IndexStatus, IndexTable, Resource, ResourceCandidate, ResourceId, StoredResource,
};
