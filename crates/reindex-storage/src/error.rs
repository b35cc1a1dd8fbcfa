//! Storage layer error types.

use thiserror::Error;

/// Errors that can occur in the job store
#[derive(Error, Debug)]
pub enum StorageError {
    /// RocksDB operation failed
    #[error("RocksDB error: {0}")]
    RocksDb(#[from] rocksdb::Error),

    /// Column family not found
    #[error("Column family not found: {0}")]
    ColumnFamilyNotFound(String),

    /// Key encoding/decoding error
    #[error("Key error: {0}")]
    Key(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

impl From<reindex_types::ReindexError> for StorageError {
    fn from(err: reindex_types::ReindexError) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

impl From<StorageError> for reindex_types::ReindexError {
    fn from(err: StorageError) -> Self {
        reindex_types::ReindexError::Storage(err.to_string())
    }
}
