//! Reindex pass coordinator.
//!
//! A pass expunges soft-deleted jobs, then walks up to [`MAX_JOBS_PER_PASS`]
//! runnable jobs. Suspended jobs are passed over without taking a slot, and
//! a job whose `threshold_high` has gone by is dropped unfinished. For each
//! job it scans one page of candidates, fans them out
//! to the worker pool, waits for every outcome and only then moves the
//! job's cursor. Passes are serialized by an async mutex: scheduled passes
//! skip when one is already running, forced passes wait their turn.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Instant;

use chrono::{DateTime, Duration, Utc};
use tokio::runtime::Handle;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use reindex_storage::JobStore;
use reindex_types::{JobId, ReindexJob, ReindexOutcome, ReindexSettings};

use crate::collaborators::{HandlerResolver, ResourceTable};
use crate::cursor::{decide, CursorDecision};
use crate::pool::{TaskHandle, WorkerPool};
use crate::scanner::ResourceScanner;
use crate::task::{ReindexTask, TaskContext};
use crate::transaction::TransactionScope;
use crate::SchedulerError;

/// Active jobs processed per pass, and deleted jobs expunged per pass.
pub const MAX_JOBS_PER_PASS: usize = 10;

/// Back-off applied to a job whose page produced no successes, in milliseconds.
pub const SUSPEND_BACKOFF_MS: i64 = 60 * 1000;

/// Schedules and runs reindexing of stored resources.
pub struct ReindexService {
    job_store: Arc<dyn JobStore>,
    settings: ReindexSettings,
    scanner: ResourceScanner,
    context: TaskContext,
    runtime: Handle,
    pool: RwLock<Arc<WorkerPool>>,
    pass_lock: Mutex<()>,
}

impl ReindexService {
    /// Create the service and start its worker pool on the current runtime.
    pub fn new(
        job_store: Arc<dyn JobStore>,
        settings: ReindexSettings,
        resources: Arc<dyn ResourceTable>,
        handlers: Arc<dyn HandlerResolver>,
        transactions: Arc<dyn TransactionScope>,
    ) -> Result<Self, SchedulerError> {
        settings.validate()?;
        let runtime = Handle::try_current().map_err(|e| SchedulerError::NoRuntime(e.to_string()))?;

        let context = TaskContext {
            resources: resources.clone(),
            handlers,
            transactions,
        };
        let pool = WorkerPool::new(
            settings.reindex_thread_count,
            settings.reindex_queue_capacity,
            context.clone(),
        )?;

        info!(
            threads = settings.reindex_thread_count,
            scheduling_disabled = settings.scheduling_disabled,
            "Reindex service created"
        );

        Ok(Self {
            job_store,
            scanner: ResourceScanner::new(resources),
            settings,
            context,
            runtime,
            pool: RwLock::new(Arc::new(pool)),
            pass_lock: Mutex::new(()),
        })
    }

    /// Override the number of candidates fetched per job per pass.
    pub fn with_scan_page_size(mut self, page_size: usize) -> Self {
        self.scanner = self.scanner.with_page_size(page_size);
        self
    }

    /// Settings the service was built with.
    pub fn settings(&self) -> &ReindexSettings {
        &self.settings
    }

    /// Queue a reindex of every resource, replacing all existing jobs.
    pub fn mark_all_for_reindexing(&self) -> Result<ReindexJob, SchedulerError> {
        self.mark_scope(None)
    }

    /// Queue a reindex of one resource type, replacing that type's job.
    ///
    /// A blank type means every type.
    pub fn mark_all_for_reindexing_of_type(
        &self,
        resource_type: &str,
    ) -> Result<ReindexJob, SchedulerError> {
        self.mark_scope(Some(resource_type))
    }

    /// Jobs live in the job store, which commits the replacement as one
    /// batch. No resource transaction is opened for it.
    fn mark_scope(&self, resource_type: Option<&str>) -> Result<ReindexJob, SchedulerError> {
        let resource_type = resource_type.map(str::trim).filter(|t| !t.is_empty());
        let job = self.job_store.mark_all_for_type(resource_type, Utc::now())?;
        info!(job_id = %job.id, scope = job.scope(), "Marked resources for reindexing");
        Ok(job)
    }

    /// Run a pass unless scheduling is disabled or another pass holds the lock.
    ///
    /// Returns `None` when the pass was skipped.
    pub async fn run_scheduled_pass(&self) -> Result<Option<usize>, SchedulerError> {
        self.run_scheduled_pass_until(&CancellationToken::new()).await
    }

    /// Like [`run_scheduled_pass`](Self::run_scheduled_pass), but stops
    /// before the next job once `stop` is cancelled.
    ///
    /// The job in progress always finishes its page.
    pub async fn run_scheduled_pass_until(
        &self,
        stop: &CancellationToken,
    ) -> Result<Option<usize>, SchedulerError> {
        if self.settings.scheduling_disabled {
            debug!("Reindex scheduling is disabled");
            return Ok(None);
        }

        let Ok(_guard) = self.pass_lock.try_lock() else {
            debug!("Reindex pass already running, skipping");
            return Ok(None);
        };
        self.run_pass_inside_lock(stop).await.map(Some)
    }

    /// Run a pass now, waiting for any running pass to finish first.
    pub async fn force_pass(&self) -> Result<usize, SchedulerError> {
        let _guard = self.pass_lock.lock().await;
        self.run_pass_inside_lock(&CancellationToken::new()).await
    }

    /// Delete every job and abandon queued work.
    ///
    /// Resource tasks already running finish; queued ones are discarded.
    /// Does not wait for a running pass.
    pub fn cancel_and_purge_all(&self) -> Result<usize, SchedulerError> {
        let marked = self.job_store.mark_all_deleted()?;

        let fresh = {
            let _enter = self.runtime.enter();
            WorkerPool::new(
                self.settings.reindex_thread_count,
                self.settings.reindex_queue_capacity,
                self.context.clone(),
            )?
        };
        let old = std::mem::replace(
            &mut *self.pool.write().unwrap_or_else(PoisonError::into_inner),
            Arc::new(fresh),
        );
        old.shutdown_now();

        let mut purged = 0;
        loop {
            let removed = self.expunge_jobs_marked_as_deleted()?;
            if removed == 0 {
                break;
            }
            purged += removed;
        }

        info!(marked, purged, "Cancelled and purged all reindex jobs");
        Ok(purged)
    }

    fn current_pool(&self) -> Arc<WorkerPool> {
        self.pool
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    async fn run_pass_inside_lock(&self, stop: &CancellationToken) -> Result<usize, SchedulerError> {
        self.expunge_jobs_marked_as_deleted()?;
        self.run_reindex_jobs(stop).await
    }

    fn expunge_jobs_marked_as_deleted(&self) -> Result<usize, SchedulerError> {
        let deleted = self.job_store.list_deleted(MAX_JOBS_PER_PASS)?;
        for job in &deleted {
            info!(job_id = %job.id, scope = job.scope(), "Purging deleted job");
            self.job_store.delete_by_id(job.id)?;
        }
        Ok(deleted.len())
    }

    async fn run_reindex_jobs(&self, stop: &CancellationToken) -> Result<usize, SchedulerError> {
        let jobs = self.job_store.list_runnable(MAX_JOBS_PER_PASS, Utc::now())?;
        debug!(count = jobs.len(), "Running reindex jobs");

        let mut total = 0;
        for (done, job) in jobs.iter().enumerate() {
            if stop.is_cancelled() {
                info!(
                    done,
                    remaining = jobs.len() - done,
                    "Stop requested, ending reindex pass early"
                );
                break;
            }
            total += self.run_reindex_job(job.id).await?;
        }
        Ok(total)
    }

    async fn run_reindex_job(&self, id: JobId) -> Result<usize, SchedulerError> {
        // Another caller may have deleted the job since it was listed
        let job = match self.job_store.get(id)? {
            Some(job) if !job.deleted => job,
            _ => {
                debug!(job_id = %id, "Job no longer active, skipping");
                return Ok(0);
            }
        };

        let now = Utc::now();
        if job.is_suspended(now) {
            debug!(job_id = %id, suspended_until = ?job.suspended_until, "Job is suspended");
            return Ok(0);
        }

        if job.is_expired(now) {
            info!(
                job_id = %id,
                scope = job.scope(),
                threshold_high = %job.threshold_high,
                "Reindex job expired, marking deleted"
            );
            self.job_store.mark_deleted(id)?;
            return Ok(0);
        }

        if job.window_exhausted() {
            info!(job_id = %id, scope = job.scope(), "Reindex window exhausted, marking job deleted");
            self.job_store.mark_deleted(id)?;
            return Ok(0);
        }

        let start = Instant::now();
        let low = job.effective_low();
        let counter = Arc::new(AtomicUsize::new(0));

        let candidates = self
            .scanner
            .scan(job.resource_type.as_deref(), low, job.threshold_high)
            .await?;
        info!(
            job_id = %id,
            scope = job.scope(),
            count = candidates.len(),
            low = %low,
            high = %job.threshold_high,
            "Found resources to reindex"
        );

        let pool = self.current_pool();
        let mut handles: Vec<TaskHandle> = Vec::with_capacity(candidates.len());
        for candidate in &candidates {
            match pool.submit(ReindexTask::new(candidate.id, counter.clone())).await {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    error!(job_id = %id, error = %e, "Failed to submit reindex task");
                    self.suspend(id, now)?;
                    return Ok(counter.load(Ordering::SeqCst));
                }
            }
        }

        let mut outcomes: Vec<ReindexOutcome> = Vec::with_capacity(handles.len());
        for handle in handles {
            match handle.wait().await {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => {
                    error!(job_id = %id, error = %e, "Failure reindexing");
                    self.suspend(id, now)?;
                    return Ok(counter.load(Ordering::SeqCst));
                }
            }
        }

        let count = counter.load(Ordering::SeqCst);
        match decide(low, &outcomes) {
            CursorDecision::Complete => {
                info!(job_id = %id, scope = job.scope(), "No resources left to reindex, marking job deleted");
                self.job_store.mark_deleted(id)?;
                return Ok(0);
            }
            CursorDecision::Suspend => {
                warn!(
                    job_id = %id,
                    count = outcomes.len(),
                    "No resources reindexed successfully, suspending job"
                );
                self.suspend(id, now)?;
            }
            CursorDecision::Advance {
                new_low,
                latest,
                stalled,
            } => {
                if stalled {
                    error!(
                        job_id = %id,
                        low = %low,
                        latest = %latest,
                        "Reindex cursor did not advance, forcing it forward by one millisecond"
                    );
                }
                self.job_store.set_threshold_low(id, new_low)?;
                debug!(job_id = %id, new_low = %new_low, "Advanced reindex cursor");
            }
        }

        let elapsed = start.elapsed();
        let per_sec = if elapsed.as_secs_f64() > 0.0 {
            count as f64 / elapsed.as_secs_f64()
        } else {
            count as f64
        };
        info!(
            job_id = %id,
            count,
            elapsed_ms = elapsed.as_millis() as u64,
            per_sec = (per_sec * 10.0).round() / 10.0,
            "Completed pass of reindex job"
        );

        Ok(count)
    }

    fn suspend(&self, id: JobId, now: DateTime<Utc>) -> Result<(), SchedulerError> {
        let until = now + Duration::milliseconds(SUSPEND_BACKOFF_MS);
        self.job_store.set_suspended_until(id, Some(until))?;
        info!(job_id = %id, until = %until, "Suspended reindex job");
        Ok(())
    }
}
