//! RocksDB wrapper for the reindex job store.
//!
//! Provides:
//! - Database open with column family setup
//! - Job id assignment persisted alongside the job row
//! - Ordered prefix scans over job rows
//! - Serialized read-modify-write of single jobs

use rocksdb::{ColumnFamily, Direction, IteratorMode, Options, WriteBatch, DB};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, info};

use reindex_types::{JobId, ReindexJob};

use crate::column_families::{build_cf_descriptors, ALL_CF_NAMES, CF_METADATA, CF_REINDEX_JOBS};
use crate::error::StorageError;
use crate::keys::{JobKey, JOB_KEY_PREFIX, NEXT_JOB_ID_KEY};

/// Durable storage for reindex jobs.
pub struct Storage {
    db: DB,
    /// Next job id; persisted in the metadata column family with every insert
    next_job_id: AtomicU64,
    /// Serializes read-modify-write cycles on job rows
    write_lock: Mutex<()>,
}

impl Storage {
    /// Open storage at the given path, creating if necessary
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        info!("Opening job store at {:?}", path);

        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);

        let cf_descriptors = build_cf_descriptors();
        let db = DB::open_cf_descriptors(&db_opts, path, cf_descriptors)?;

        let next_job_id = Self::load_next_job_id(&db)?;
        debug!(next_job_id = next_job_id, "Loaded job id sequence");

        Ok(Self {
            db,
            next_job_id: AtomicU64::new(next_job_id),
            write_lock: Mutex::new(()),
        })
    }

    /// Load the next job id from metadata, falling back to the highest stored key.
    fn load_next_job_id(db: &DB) -> Result<u64, StorageError> {
        let meta_cf = db
            .cf_handle(CF_METADATA)
            .ok_or_else(|| StorageError::ColumnFamilyNotFound(CF_METADATA.to_string()))?;
        let jobs_cf = db
            .cf_handle(CF_REINDEX_JOBS)
            .ok_or_else(|| StorageError::ColumnFamilyNotFound(CF_REINDEX_JOBS.to_string()))?;

        let persisted = match db.get_cf(meta_cf, NEXT_JOB_ID_KEY)? {
            Some(b) if b.len() >= 8 => {
                let mut buf = [0u8; 8];
                buf.copy_from_slice(&b[..8]);
                u64::from_be_bytes(buf)
            }
            _ => 1,
        };

        // Iterate in reverse to find highest key
        let mut iter = db.iterator_cf(jobs_cf, IteratorMode::End);
        let from_rows = match iter.next() {
            Some(result) => {
                let (key, _) = result?;
                JobKey::from_bytes(&key)?.id.0 + 1
            }
            None => 1,
        };

        Ok(persisted.max(from_rows))
    }

    pub(crate) fn cf(&self, name: &str) -> Result<&ColumnFamily, StorageError> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StorageError::ColumnFamilyNotFound(name.to_string()))
    }

    pub(crate) fn lock_writes(&self) -> MutexGuard<'_, ()> {
        self.write_lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Reserve the next job id. The caller persists it via [`Storage::put_sequence`].
    pub(crate) fn next_job_id(&self) -> JobId {
        JobId(self.next_job_id.fetch_add(1, Ordering::SeqCst))
    }

    /// Add the id sequence high-water mark to a write batch.
    pub(crate) fn put_sequence(&self, batch: &mut WriteBatch) -> Result<(), StorageError> {
        let meta_cf = self.cf(CF_METADATA)?;
        let next = self.next_job_id.load(Ordering::SeqCst);
        batch.put_cf(meta_cf, NEXT_JOB_ID_KEY, next.to_be_bytes());
        Ok(())
    }

    pub(crate) fn write(&self, batch: WriteBatch) -> Result<(), StorageError> {
        self.db.write(batch)?;
        Ok(())
    }

    /// Read a single job row.
    pub(crate) fn read_job(&self, id: JobId) -> Result<Option<ReindexJob>, StorageError> {
        let cf = self.cf(CF_REINDEX_JOBS)?;
        match self.db.get_cf(cf, JobKey::new(id).to_bytes())? {
            Some(bytes) => Ok(Some(ReindexJob::from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Write a single job row.
    pub(crate) fn write_job(&self, job: &ReindexJob) -> Result<(), StorageError> {
        let cf = self.cf(CF_REINDEX_JOBS)?;
        self.db
            .put_cf(cf, JobKey::new(job.id).to_bytes(), job.to_bytes()?)?;
        Ok(())
    }

    /// Remove a single job row.
    pub(crate) fn remove_job(&self, id: JobId) -> Result<(), StorageError> {
        let cf = self.cf(CF_REINDEX_JOBS)?;
        self.db.delete_cf(cf, JobKey::new(id).to_bytes())?;
        Ok(())
    }

    /// Scan jobs in insertion order, keeping those matching `filter`, up to `limit`.
    pub(crate) fn scan_jobs<F>(&self, limit: usize, filter: F) -> Result<Vec<ReindexJob>, StorageError>
    where
        F: Fn(&ReindexJob) -> bool,
    {
        let cf = self.cf(CF_REINDEX_JOBS)?;
        let iter = self
            .db
            .iterator_cf(cf, IteratorMode::From(JOB_KEY_PREFIX, Direction::Forward));

        let mut results = Vec::new();
        for item in iter {
            if results.len() >= limit {
                break;
            }
            let (key, value) = item?;
            // Stop if we've passed the prefix
            if !key.starts_with(JOB_KEY_PREFIX) {
                break;
            }
            let job = ReindexJob::from_bytes(&value)?;
            if filter(&job) {
                results.push(job);
            }
        }

        Ok(results)
    }

    /// Flush all column families to disk
    pub fn flush(&self) -> Result<(), StorageError> {
        for cf_name in ALL_CF_NAMES {
            if let Some(cf) = self.db.cf_handle(cf_name) {
                self.db.flush_cf(cf)?;
            }
        }
        Ok(())
    }

    /// Count stored job rows, deleted or not.
    pub fn job_count(&self) -> Result<u64, StorageError> {
        let cf = self.cf(CF_REINDEX_JOBS)?;
        let mut count = 0;
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            item?;
            count += 1;
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tempfile::TempDir;

    fn create_test_storage() -> (Storage, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let storage = Storage::open(temp_dir.path()).unwrap();
        (storage, temp_dir)
    }

    #[test]
    fn test_open_creates_column_families() {
        let (storage, _temp) = create_test_storage();
        for cf_name in ALL_CF_NAMES {
            assert!(storage.db.cf_handle(cf_name).is_some());
        }
        assert_eq!(storage.job_count().unwrap(), 0);
    }

    #[test]
    fn test_write_and_read_job() {
        let (storage, _temp) = create_test_storage();
        let job = ReindexJob::new(storage.next_job_id(), None, Utc::now());
        storage.write_job(&job).unwrap();

        let loaded = storage.read_job(job.id).unwrap().unwrap();
        assert_eq!(loaded, job);
        assert_eq!(storage.job_count().unwrap(), 1);
    }

    #[test]
    fn test_job_id_sequence_survives_reopen() {
        let temp_dir = TempDir::new().unwrap();
        {
            let storage = Storage::open(temp_dir.path()).unwrap();
            let first = storage.next_job_id();
            assert_eq!(first, JobId(1));
            let mut batch = WriteBatch::default();
            storage.put_sequence(&mut batch).unwrap();
            storage.write(batch).unwrap();
        }

        let storage = Storage::open(temp_dir.path()).unwrap();
        assert_eq!(storage.next_job_id(), JobId(2));
    }
}
