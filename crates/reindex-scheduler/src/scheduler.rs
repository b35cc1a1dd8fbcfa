//! Cron driver for reindex passes.
//!
//! [`ReindexScheduler`] owns a `tokio-cron-scheduler` instance with exactly
//! one job: each tick runs [`ReindexService::run_scheduled_pass_until`] with
//! the scheduler's stop token. A tick that fires while a pass is still
//! running is skipped by the service's pass lock.
//!
//! Shutdown cancels the stop token, so a running pass ends after the job it
//! is working on, then waits up to `shutdown_timeout_secs` for that pass to
//! return before stopping the cron scheduler.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_cron_scheduler::{Job, JobScheduler};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::{ReindexService, SchedulerConfig, SchedulerError};

/// Check that `expr` is a cron expression the scheduler accepts.
///
/// Expressions have six fields: second minute hour day-of-month month
/// day-of-week.
///
/// ```
/// use reindex_scheduler::validate_cron_expression;
///
/// assert!(validate_cron_expression("*/10 * * * * *").is_ok());
/// assert!(validate_cron_expression("0 30 4 * * *").is_ok());
/// assert!(validate_cron_expression("every ten seconds").is_err());
/// ```
pub fn validate_cron_expression(expr: &str) -> Result<(), SchedulerError> {
    Job::new_async(expr, |_uuid, _lock| Box::pin(async {}))
        .map(|_| ())
        .map_err(|e| SchedulerError::InvalidCron(format!("'{}': {}", expr, e)))
}

/// Runs scheduled reindex passes for one [`ReindexService`].
pub struct ReindexScheduler {
    scheduler: JobScheduler,
    config: SchedulerConfig,
    job_id: Uuid,
    stop: CancellationToken,
    passes: TaskTracker,
    is_running: AtomicBool,
}

impl ReindexScheduler {
    /// Scheduler driven by the cron and timezone in the service's settings.
    pub async fn for_service(service: Arc<ReindexService>) -> Result<Self, SchedulerError> {
        let config = SchedulerConfig::from_settings(service.settings());
        Self::new(service, config).await
    }

    /// Register the reindex pass on `config.cron`.
    ///
    /// Nothing runs until [`start`](Self::start) is called.
    ///
    /// # Errors
    ///
    /// Returns `InvalidCron` or `InvalidTimezone` for a bad schedule, and
    /// `Scheduler` if the cron scheduler cannot be created.
    pub async fn new(
        service: Arc<ReindexService>,
        config: SchedulerConfig,
    ) -> Result<Self, SchedulerError> {
        let tz = config.parse_timezone()?;
        validate_cron_expression(&config.cron)?;

        let scheduler = JobScheduler::new().await?;
        let stop = CancellationToken::new();
        let passes = TaskTracker::new();

        let tick_stop = stop.clone();
        let tick_passes = passes.clone();
        let job = Job::new_async_tz(config.cron.as_str(), tz, move |_uuid, _lock| {
            let tick = run_tick(service.clone(), tick_stop.clone());
            Box::pin(tick_passes.track_future(tick))
        })
        .map_err(|e| SchedulerError::InvalidCron(e.to_string()))?;
        let job_id = scheduler.add(job).await?;

        info!(
            job_id = %job_id,
            cron = %config.cron,
            timezone = %tz.name(),
            "Registered scheduled reindex pass"
        );

        Ok(Self {
            scheduler,
            config,
            job_id,
            stop,
            passes,
            is_running: AtomicBool::new(false),
        })
    }

    /// Start firing ticks.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::AlreadyRunning` on a second call.
    pub async fn start(&self) -> Result<(), SchedulerError> {
        if self.is_running.swap(true, Ordering::SeqCst) {
            return Err(SchedulerError::AlreadyRunning);
        }
        self.scheduler.start().await?;
        info!(cron = %self.config.cron, "Reindex scheduler started");
        Ok(())
    }

    /// Stop scheduling and let the running pass, if any, wind down.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::NotRunning` if the scheduler was never
    /// started or is already stopped.
    pub async fn shutdown(&mut self) -> Result<(), SchedulerError> {
        if !self.is_running.load(Ordering::SeqCst) {
            return Err(SchedulerError::NotRunning);
        }

        info!("Stopping reindex scheduler");
        self.stop.cancel();
        self.passes.close();

        let timeout = Duration::from_secs(self.config.shutdown_timeout_secs);
        if tokio::time::timeout(timeout, self.passes.wait()).await.is_err() {
            warn!(
                timeout_secs = self.config.shutdown_timeout_secs,
                "Reindex pass still running at shutdown, no longer waiting for it"
            );
        }

        if let Err(e) = self.scheduler.shutdown().await {
            warn!(error = %e, "Error stopping cron scheduler");
        }

        self.is_running.store(false, Ordering::SeqCst);
        info!("Reindex scheduler stopped");
        Ok(())
    }

    /// Token cancelled when shutdown begins.
    pub fn stop_token(&self) -> CancellationToken {
        self.stop.clone()
    }

    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::SeqCst)
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Id of the registered cron job.
    pub fn job_id(&self) -> Uuid {
        self.job_id
    }
}

async fn run_tick(service: Arc<ReindexService>, stop: CancellationToken) {
    if stop.is_cancelled() {
        debug!("Reindex tick skipped due to shutdown");
        return;
    }

    let start = Instant::now();
    match service.run_scheduled_pass_until(&stop).await {
        Ok(Some(count)) if count > 0 => info!(
            count,
            duration_ms = start.elapsed().as_millis() as u64,
            "Scheduled reindex pass completed"
        ),
        Ok(Some(_)) => debug!("Scheduled reindex pass found nothing to reindex"),
        Ok(None) => debug!("Scheduled reindex pass skipped"),
        Err(e) => error!(error = %e, "Scheduled reindex pass failed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_cron_expression() {
        assert!(validate_cron_expression("*/10 * * * * *").is_ok());
        assert!(validate_cron_expression("0 30 4 * * *").is_ok());
        assert!(validate_cron_expression("").is_err());
    }

    #[test]
    fn test_invalid_cron_names_expression() {
        match validate_cron_expression("not a cron") {
            Err(SchedulerError::InvalidCron(msg)) => assert!(msg.contains("not a cron")),
            other => panic!("Expected InvalidCron, got {:?}", other),
        }
    }
}
