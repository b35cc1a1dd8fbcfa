//! Job store for the resource reindexer.
//!
//! Provides RocksDB-backed storage with:
//! - Column family isolation for job rows and metadata
//! - Insertion-ordered keys for deterministic, bounded listing
//! - Atomic replace-scope writes via WriteBatch
//! - Resumable cursors that survive restarts

pub mod column_families;
pub mod db;
pub mod error;
pub mod job_store;
pub mod keys;

pub use db::Storage;
pub use error::StorageError;
pub use job_store::JobStore;
pub use keys::JobKey;
