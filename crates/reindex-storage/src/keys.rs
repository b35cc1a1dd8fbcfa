//! Key encoding and decoding for the job store.
//!
//! Key format: `job:{id:020}`. Zero padding makes lexicographic order
//! equal to insertion order, so prefix iteration yields jobs oldest first.

use reindex_types::JobId;

use crate::error::StorageError;

/// Metadata key holding the next job id to assign
pub const NEXT_JOB_ID_KEY: &[u8] = b"next_job_id";

/// Key prefix shared by all job rows
pub const JOB_KEY_PREFIX: &[u8] = b"job:";

/// Key for a reindex job row
/// Format: job:{id:020}
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobKey {
    pub id: JobId,
}

impl JobKey {
    pub fn new(id: JobId) -> Self {
        Self { id }
    }

    /// Encode key to bytes
    pub fn to_bytes(&self) -> Vec<u8> {
        format!("job:{:020}", self.id.0).into_bytes()
    }

    /// Decode key from bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, StorageError> {
        let s = std::str::from_utf8(bytes)
            .map_err(|e| StorageError::Key(format!("Invalid UTF-8: {}", e)))?;

        let parts: Vec<&str> = s.split(':').collect();
        if parts.len() != 2 || parts[0] != "job" {
            return Err(StorageError::Key(format!("Invalid job key format: {}", s)));
        }

        let id: u64 = parts[1]
            .parse()
            .map_err(|e| StorageError::Key(format!("Invalid job id: {}", e)))?;

        Ok(Self { id: JobId(id) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_key_roundtrip() {
        let key = JobKey::new(JobId(12345));
        let decoded = JobKey::from_bytes(&key.to_bytes()).unwrap();
        assert_eq!(key, decoded);
    }

    #[test]
    fn test_job_key_insertion_order() {
        let key1 = JobKey::new(JobId(9));
        let key2 = JobKey::new(JobId(10));
        assert!(key1.to_bytes() < key2.to_bytes());
        assert!(key1.to_bytes().starts_with(JOB_KEY_PREFIX));
    }

    #[test]
    fn test_invalid_job_key() {
        assert!(JobKey::from_bytes(b"outbox:1").is_err());
        assert!(JobKey::from_bytes(b"job:abc").is_err());
    }
}
