//! Reindexing of a single resource.
//!
//! A task is a plain value: the resource id plus a handle to the job's
//! success counter. It runs on the blocking pool under its own transaction
//! and always resolves to a [`ReindexOutcome`]; per-resource errors never
//! escape it.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tracing::{error, info};

use reindex_types::{ReindexError, ReindexOutcome, ResourceId, StoredResource};

use crate::collaborators::{HandlerResolver, ResourceTable};
use crate::failure::{mark_resource_as_indexing_failed, FailureKind};
use crate::transaction::{in_transaction, Propagation, TransactionScope};

/// Collaborators shared by every resource task.
#[derive(Clone)]
pub struct TaskContext {
    pub resources: Arc<dyn ResourceTable>,
    pub handlers: Arc<dyn HandlerResolver>,
    pub transactions: Arc<dyn TransactionScope>,
}

/// One resource to reindex.
#[derive(Debug, Clone)]
pub struct ReindexTask {
    resource_id: ResourceId,
    counter: Arc<AtomicUsize>,
}

impl ReindexTask {
    pub fn new(resource_id: ResourceId, counter: Arc<AtomicUsize>) -> Self {
        Self {
            resource_id,
            counter,
        }
    }

    pub fn resource_id(&self) -> ResourceId {
        self.resource_id
    }

    /// Reindex the resource. Blocks on storage calls.
    pub fn run(self, context: &TaskContext) -> ReindexOutcome {
        let id = self.resource_id;

        // Ok(Ok(updated)): committed
        // Ok(Err(e)): hard failure inside the work, transaction rolled back
        // Err(e): transaction aborted (conflicts land here)
        let result = in_transaction(
            context.transactions.as_ref(),
            Propagation::Required,
            |status| {
                let record = context
                    .resources
                    .find_by_id(id)?
                    .ok_or_else(|| ReindexError::NotFound(format!("resource {}", id)))?;

                match reindex_record(context, &record) {
                    Ok(()) => Ok(Ok(record.updated)),
                    Err(e) if e.is_conflict() => Err(e),
                    Err(e) => {
                        error!(
                            resource = %record.qualified_id(),
                            error = %e,
                            "Failed to index resource"
                        );
                        status.set_rollback_only();
                        Ok(Err(e))
                    }
                }
            },
        );

        let failure = match result {
            Ok(Ok(updated)) => {
                self.counter.fetch_add(1, Ordering::SeqCst);
                return ReindexOutcome::Success(updated);
            }
            Ok(Err(e)) => e,
            Err(e) => e,
        };

        match FailureKind::classify(&failure) {
            FailureKind::Conflict => {
                info!(
                    resource_id = %id,
                    error = %failure,
                    "Failed to reindex because of a version conflict. Leaving in unindexed state"
                );
                ReindexOutcome::Conflict(id)
            }
            FailureKind::Hard => {
                info!(resource_id = %id, error = %failure, "Setting resource status to ERRORED");
                if let Err(e) = mark_resource_as_indexing_failed(context, id) {
                    error!(resource_id = %id, error = %e, "Failed to mark resource as indexing_failed");
                }
                ReindexOutcome::Failure(id)
            }
        }
    }
}

/// Normalize, load and reindex one stored resource.
fn reindex_record(context: &TaskContext, record: &StoredResource) -> Result<(), ReindexError> {
    // Old rows stored forced ids without the resource type
    if let Some(forced) = &record.forced_id {
        if forced.is_legacy() {
            info!(
                forced_id = %forced.forced_id,
                resource_type = %record.resource_type,
                "Updating resource forced id type"
            );
            context
                .resources
                .update_forced_id_type(record.id, &record.resource_type)?;
        }
    }

    let handler = context.handlers.handler_for_type(&record.resource_type)?;
    let resource = handler.load_current(record, false)?.ok_or_else(|| {
        ReindexError::NotFound(format!(
            "Could not find resource version {} in database",
            record.qualified_id()
        ))
    })?;

    handler.reindex(&resource, record)
}
