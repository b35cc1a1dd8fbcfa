//! Failure handling for individual resources.
//!
//! Conflicts are transient: another writer won a race, so the resource is
//! left alone and picked up again by a later job. Anything else is a hard
//! failure: the resource is flagged and every derived index row is removed,
//! so a failed reindex never leaves half-updated index state behind.

use tracing::{debug, info};

use reindex_types::{IndexStatus, IndexTable, ReindexError, ResourceId};

use crate::task::TaskContext;
use crate::transaction::{in_transaction, Propagation};

/// How a per-resource error is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Concurrent version/uniqueness conflict; retry later
    Conflict,
    /// Anything else; compensate
    Hard,
}

impl FailureKind {
    pub fn classify(err: &ReindexError) -> Self {
        if err.is_conflict() {
            FailureKind::Conflict
        } else {
            FailureKind::Hard
        }
    }
}

/// Flag a resource as failed and purge its derived index rows.
///
/// Runs in its own independent transaction, separate from the rolled-back
/// reindex transaction. Returns the number of index rows deleted.
pub fn mark_resource_as_indexing_failed(
    context: &TaskContext,
    id: ResourceId,
) -> Result<usize, ReindexError> {
    in_transaction(
        context.transactions.as_ref(),
        Propagation::RequiresNew,
        |_status| {
            info!(resource_id = %id, "Marking resource as indexing_failed");
            context
                .resources
                .update_index_status(id, IndexStatus::IndexingFailed)?;

            let mut purged = 0;
            for table in IndexTable::ALL {
                let deleted = context.resources.delete_index_rows(table, id)?;
                if deleted > 0 {
                    debug!(resource_id = %id, table = %table, deleted, "Purged index rows");
                }
                purged += deleted;
            }
            Ok(purged)
        },
    )
}
