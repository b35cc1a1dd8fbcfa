//! Bounded worker pool for resource tasks.
//!
//! A fixed number of workers pull from a bounded backlog. Submitting to a
//! full backlog waits for room instead of dropping work, which throttles
//! the scan-and-submit loop. Shutting the pool down discards tasks that
//! have not started; tasks already running finish normally.

use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use reindex_types::ReindexOutcome;

use crate::task::{ReindexTask, TaskContext};
use crate::SchedulerError;

struct QueuedTask {
    task: ReindexTask,
    reply: oneshot::Sender<ReindexOutcome>,
}

/// Pending result of a submitted task.
pub struct TaskHandle {
    receiver: oneshot::Receiver<ReindexOutcome>,
}

impl TaskHandle {
    /// Wait for the task's outcome.
    ///
    /// Fails with [`SchedulerError::PoolShutdown`] if the pool discarded
    /// the task, which is distinct from the resource itself failing.
    pub async fn wait(self) -> Result<ReindexOutcome, SchedulerError> {
        self.receiver
            .await
            .map_err(|_| SchedulerError::PoolShutdown)
    }
}

/// Fixed-size pool of reindex workers.
pub struct WorkerPool {
    sender: mpsc::Sender<QueuedTask>,
    shutdown: CancellationToken,
    size: usize,
}

impl WorkerPool {
    /// Spawn `size` workers on the current Tokio runtime with a backlog of `capacity`.
    pub fn new(size: usize, capacity: usize, context: TaskContext) -> Result<Self, SchedulerError> {
        let handle = Handle::try_current().map_err(|e| SchedulerError::NoRuntime(e.to_string()))?;
        let size = size.max(1);
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let receiver = Arc::new(Mutex::new(receiver));
        let shutdown = CancellationToken::new();

        for worker_id in 0..size {
            handle.spawn(worker_loop(
                worker_id,
                receiver.clone(),
                context.clone(),
                shutdown.clone(),
            ));
        }
        debug!(size, capacity, "Started reindex worker pool");

        Ok(Self {
            sender,
            shutdown,
            size,
        })
    }

    /// Queue a task, waiting while the backlog is full.
    pub async fn submit(&self, task: ReindexTask) -> Result<TaskHandle, SchedulerError> {
        if self.shutdown.is_cancelled() {
            return Err(SchedulerError::PoolShutdown);
        }
        let (reply, receiver) = oneshot::channel();
        self.sender
            .send(QueuedTask { task, reply })
            .await
            .map_err(|_| SchedulerError::PoolShutdown)?;
        Ok(TaskHandle { receiver })
    }

    /// Stop taking work. Queued tasks are dropped; running tasks complete.
    pub fn shutdown_now(&self) {
        debug!(size = self.size, "Shutting down reindex worker pool");
        self.shutdown.cancel();
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    pub fn size(&self) -> usize {
        self.size
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn worker_loop(
    worker_id: usize,
    receiver: Arc<Mutex<mpsc::Receiver<QueuedTask>>>,
    context: TaskContext,
    shutdown: CancellationToken,
) {
    loop {
        let next = {
            let mut receiver = receiver.lock().await;
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => None,
                queued = receiver.recv() => queued,
            }
        };

        let Some(QueuedTask { task, reply }) = next else {
            break;
        };
        if shutdown.is_cancelled() {
            break;
        }

        let context = context.clone();
        let resource_id = task.resource_id();
        let outcome = match tokio::task::spawn_blocking(move || task.run(&context)).await {
            Ok(outcome) => outcome,
            Err(e) => {
                // A panic is the resource's failure, not the pool's
                error!(worker_id, resource_id = %resource_id, error = %e, "Reindex task panicked");
                ReindexOutcome::Failure(resource_id)
            }
        };
        // Receiver may be gone if the pass already gave up on this page
        let _ = reply.send(outcome);
    }
    debug!(worker_id, "Reindex worker stopped");
}
