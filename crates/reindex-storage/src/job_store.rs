//! Durable reindex job records.
//!
//! Only the pass coordinator and the "mark for reindex" entry points mutate
//! jobs. Each mutation is committed on its own; mutating an id that no
//! longer exists is a silent no-op.

use chrono::{DateTime, Utc};
use rocksdb::WriteBatch;
use tracing::{debug, info};

use reindex_types::{JobId, ReindexJob};

use crate::column_families::CF_REINDEX_JOBS;
use crate::db::Storage;
use crate::error::StorageError;
use crate::keys::JobKey;

/// Store of reindex jobs and their progress cursors.
pub trait JobStore: Send + Sync {
    /// Soft-delete jobs matching the scope and insert a fresh job for it.
    ///
    /// `Some(type)` replaces jobs of that type; `None` replaces every job.
    fn mark_all_for_type(
        &self,
        resource_type: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<ReindexJob, StorageError>;

    /// Soft-delete every job. Returns how many were newly marked.
    fn mark_all_deleted(&self) -> Result<usize, StorageError>;

    /// Jobs not marked deleted, in insertion order.
    fn list_active(&self, limit: usize) -> Result<Vec<ReindexJob>, StorageError>;

    /// Jobs neither deleted nor suspended at `now`, in insertion order.
    ///
    /// Suspended jobs are skipped before `limit` applies, so a backlog of
    /// failing jobs cannot crowd out healthy ones.
    fn list_runnable(
        &self,
        limit: usize,
        now: DateTime<Utc>,
    ) -> Result<Vec<ReindexJob>, StorageError>;

    /// Jobs marked deleted, in insertion order.
    fn list_deleted(&self, limit: usize) -> Result<Vec<ReindexJob>, StorageError>;

    fn get(&self, id: JobId) -> Result<Option<ReindexJob>, StorageError>;

    fn set_threshold_low(&self, id: JobId, value: DateTime<Utc>) -> Result<(), StorageError>;

    fn set_suspended_until(
        &self,
        id: JobId,
        value: Option<DateTime<Utc>>,
    ) -> Result<(), StorageError>;

    fn mark_deleted(&self, id: JobId) -> Result<(), StorageError>;

    /// Physically remove a job row.
    fn delete_by_id(&self, id: JobId) -> Result<(), StorageError>;
}

impl Storage {
    /// Apply `update` to a job under the write lock. Missing ids are ignored.
    fn update_job<F>(&self, id: JobId, update: F) -> Result<(), StorageError>
    where
        F: FnOnce(&mut ReindexJob),
    {
        let _guard = self.lock_writes();
        match self.read_job(id)? {
            Some(mut job) => {
                update(&mut job);
                self.write_job(&job)
            }
            None => {
                debug!(job_id = %id, "Ignoring update for missing reindex job");
                Ok(())
            }
        }
    }
}

impl JobStore for Storage {
    fn mark_all_for_type(
        &self,
        resource_type: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<ReindexJob, StorageError> {
        let _guard = self.lock_writes();
        let cf = self.cf(CF_REINDEX_JOBS)?;

        let superseded = self.scan_jobs(usize::MAX, |job| {
            !job.deleted
                && match resource_type {
                    Some(t) => job.resource_type.as_deref() == Some(t),
                    None => true,
                }
        })?;

        // Atomic write: superseded jobs + new job + id sequence
        let mut batch = WriteBatch::default();
        for mut job in superseded {
            debug!(job_id = %job.id, "Superseding reindex job");
            job.deleted = true;
            batch.put_cf(cf, JobKey::new(job.id).to_bytes(), job.to_bytes()?);
        }

        let job = ReindexJob::new(self.next_job_id(), resource_type.map(String::from), now);
        batch.put_cf(cf, JobKey::new(job.id).to_bytes(), job.to_bytes()?);
        self.put_sequence(&mut batch)?;
        self.write(batch)?;

        info!(
            job_id = %job.id,
            resource_type = %job.scope(),
            threshold_high = %job.threshold_high,
            "Created reindex job"
        );
        Ok(job)
    }

    fn mark_all_deleted(&self) -> Result<usize, StorageError> {
        let _guard = self.lock_writes();
        let cf = self.cf(CF_REINDEX_JOBS)?;

        let active = self.scan_jobs(usize::MAX, |job| !job.deleted)?;
        let count = active.len();

        let mut batch = WriteBatch::default();
        for mut job in active {
            job.deleted = true;
            batch.put_cf(cf, JobKey::new(job.id).to_bytes(), job.to_bytes()?);
        }
        if count > 0 {
            self.write(batch)?;
        }
        Ok(count)
    }

    fn list_active(&self, limit: usize) -> Result<Vec<ReindexJob>, StorageError> {
        self.scan_jobs(limit, |job| !job.deleted)
    }

    fn list_runnable(
        &self,
        limit: usize,
        now: DateTime<Utc>,
    ) -> Result<Vec<ReindexJob>, StorageError> {
        self.scan_jobs(limit, |job| !job.deleted && !job.is_suspended(now))
    }

    fn list_deleted(&self, limit: usize) -> Result<Vec<ReindexJob>, StorageError> {
        self.scan_jobs(limit, |job| job.deleted)
    }

    fn get(&self, id: JobId) -> Result<Option<ReindexJob>, StorageError> {
        self.read_job(id)
    }

    fn set_threshold_low(&self, id: JobId, value: DateTime<Utc>) -> Result<(), StorageError> {
        self.update_job(id, |job| job.threshold_low = Some(value))
    }

    fn set_suspended_until(
        &self,
        id: JobId,
        value: Option<DateTime<Utc>>,
    ) -> Result<(), StorageError> {
        self.update_job(id, |job| job.suspended_until = value)
    }

    fn mark_deleted(&self, id: JobId) -> Result<(), StorageError> {
        self.update_job(id, |job| job.deleted = true)
    }

    fn delete_by_id(&self, id: JobId) -> Result<(), StorageError> {
        let _guard = self.lock_writes();
        self.remove_job(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use tempfile::TempDir;

    fn create_test_storage() -> (Storage, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let storage = Storage::open(temp_dir.path()).unwrap();
        (storage, temp_dir)
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_mark_all_for_type_creates_job() {
        let (storage, _temp) = create_test_storage();
        let job = storage.mark_all_for_type(Some("Patient"), t0()).unwrap();

        assert_eq!(job.resource_type.as_deref(), Some("Patient"));
        assert_eq!(job.threshold_low, None);
        assert_eq!(job.threshold_high, t0() + Duration::minutes(5));

        let active = storage.list_active(10).unwrap();
        assert_eq!(active, vec![job]);
    }

    #[test]
    fn test_mark_all_for_type_replaces_same_scope_only() {
        let (storage, _temp) = create_test_storage();
        let patient1 = storage.mark_all_for_type(Some("Patient"), t0()).unwrap();
        let observation = storage.mark_all_for_type(Some("Observation"), t0()).unwrap();
        let patient2 = storage.mark_all_for_type(Some("Patient"), t0()).unwrap();

        let active: Vec<JobId> = storage.list_active(10).unwrap().iter().map(|j| j.id).collect();
        assert_eq!(active, vec![observation.id, patient2.id]);

        let deleted: Vec<JobId> = storage.list_deleted(10).unwrap().iter().map(|j| j.id).collect();
        assert_eq!(deleted, vec![patient1.id]);
    }

    #[test]
    fn test_untyped_mark_replaces_every_job() {
        let (storage, _temp) = create_test_storage();
        storage.mark_all_for_type(Some("Patient"), t0()).unwrap();
        storage.mark_all_for_type(Some("Observation"), t0()).unwrap();
        let all = storage.mark_all_for_type(None, t0()).unwrap();

        let active = storage.list_active(10).unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, all.id);
        assert_eq!(storage.list_deleted(10).unwrap().len(), 2);
    }

    #[test]
    fn test_list_respects_limit_and_order() {
        let (storage, _temp) = create_test_storage();
        let ids: Vec<JobId> = ["A", "B", "C", "D"]
            .iter()
            .map(|t| storage.mark_all_for_type(Some(*t), t0()).unwrap().id)
            .collect();

        let page: Vec<JobId> = storage.list_active(3).unwrap().iter().map(|j| j.id).collect();
        assert_eq!(page, ids[..3].to_vec());
    }

    #[test]
    fn test_list_runnable_skips_suspended_before_limit() {
        let (storage, _temp) = create_test_storage();
        let ids: Vec<JobId> = ["A", "B", "C", "D"]
            .iter()
            .map(|t| storage.mark_all_for_type(Some(*t), t0()).unwrap().id)
            .collect();
        storage
            .set_suspended_until(ids[0], Some(t0() + Duration::minutes(1)))
            .unwrap();
        storage
            .set_suspended_until(ids[1], Some(t0() + Duration::minutes(1)))
            .unwrap();

        let page: Vec<JobId> = storage
            .list_runnable(2, t0())
            .unwrap()
            .iter()
            .map(|j| j.id)
            .collect();
        assert_eq!(page, vec![ids[2], ids[3]]);

        // Suspension lapses once `now` reaches it
        let later: Vec<JobId> = storage
            .list_runnable(10, t0() + Duration::minutes(1))
            .unwrap()
            .iter()
            .map(|j| j.id)
            .collect();
        assert_eq!(later, ids);
        assert_eq!(storage.list_active(10).unwrap().len(), 4);
    }

    #[test]
    fn test_targeted_mutations() {
        let (storage, _temp) = create_test_storage();
        let job = storage.mark_all_for_type(None, t0()).unwrap();

        storage
            .set_threshold_low(job.id, t0() + Duration::milliseconds(7))
            .unwrap();
        storage
            .set_suspended_until(job.id, Some(t0() + Duration::minutes(1)))
            .unwrap();

        let loaded = storage.get(job.id).unwrap().unwrap();
        assert_eq!(loaded.threshold_low, Some(t0() + Duration::milliseconds(7)));
        assert_eq!(loaded.suspended_until, Some(t0() + Duration::minutes(1)));
        assert_eq!(loaded.threshold_high, job.threshold_high);

        storage.mark_deleted(job.id).unwrap();
        assert!(storage.list_active(10).unwrap().is_empty());
        assert_eq!(storage.list_deleted(10).unwrap().len(), 1);

        storage.delete_by_id(job.id).unwrap();
        assert!(storage.get(job.id).unwrap().is_none());
        assert!(storage.list_deleted(10).unwrap().is_empty());
    }

    #[test]
    fn test_mutating_missing_job_is_noop() {
        let (storage, _temp) = create_test_storage();
        storage.set_threshold_low(JobId(99), t0()).unwrap();
        storage.set_suspended_until(JobId(99), None).unwrap();
        storage.mark_deleted(JobId(99)).unwrap();
        storage.delete_by_id(JobId(99)).unwrap();
        assert_eq!(storage.job_count().unwrap(), 0);
    }

    #[test]
    fn test_mark_all_deleted() {
        let (storage, _temp) = create_test_storage();
        storage.mark_all_for_type(Some("Patient"), t0()).unwrap();
        storage.mark_all_for_type(Some("Observation"), t0()).unwrap();

        assert_eq!(storage.mark_all_deleted().unwrap(), 2);
        assert!(storage.list_active(10).unwrap().is_empty());
        assert_eq!(storage.mark_all_deleted().unwrap(), 0);
    }

    #[test]
    fn test_ids_not_reused_after_expunge() {
        let (storage, _temp) = create_test_storage();
        let first = storage.mark_all_for_type(None, t0()).unwrap();
        storage.mark_deleted(first.id).unwrap();
        storage.delete_by_id(first.id).unwrap();

        let second = storage.mark_all_for_type(None, t0()).unwrap();
        assert!(second.id > first.id);
    }

    #[test]
    fn test_jobs_survive_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let job = {
            let storage = Storage::open(temp_dir.path()).unwrap();
            let job = storage.mark_all_for_type(Some("Patient"), t0()).unwrap();
            storage.set_threshold_low(job.id, t0()).unwrap();
            storage.flush().unwrap();
            job
        };

        let storage = Storage::open(temp_dir.path()).unwrap();
        let loaded = storage.get(job.id).unwrap().unwrap();
        assert_eq!(loaded.threshold_low, Some(t0()));
    }
}
