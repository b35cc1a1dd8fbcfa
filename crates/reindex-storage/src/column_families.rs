//! Column family definitions for RocksDB.
//!
//! - reindex_jobs: one row per reindex job, keyed by zero-padded job id
//! - metadata: small counters such as the next job id

use rocksdb::{ColumnFamilyDescriptor, Options};

/// Column family name for reindex jobs
pub const CF_REINDEX_JOBS: &str = "reindex_jobs";

/// Column family name for store metadata
pub const CF_METADATA: &str = "metadata";

/// All column family names
pub const ALL_CF_NAMES: &[&str] = &[CF_REINDEX_JOBS, CF_METADATA];

/// Build all column family descriptors
pub fn build_cf_descriptors() -> Vec<ColumnFamilyDescriptor> {
    vec![
        ColumnFamilyDescriptor::new(CF_REINDEX_JOBS, Options::default()),
        ColumnFamilyDescriptor::new(CF_METADATA, Options::default()),
    ]
}
