//! Storage engine interfaces consumed by the reindexer.
//!
//! The reindexer does not own resources or their index tables. It reaches
//! them through these traits, which the surrounding server implements on
//! top of its storage engine. All calls are synchronous and are made
//! either inside a [`crate::TransactionScope`] or from a blocking task.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use reindex_types::{
    IndexStatus, IndexTable, ReindexError, Resource, ResourceCandidate, ResourceId,
    StoredResource,
};

/// Row-level access to stored resources and their derived index tables.
pub trait ResourceTable: Send + Sync {
    /// Resources whose last-modified lies in `[low, high)`, oldest first,
    /// at most `page_size` of them. `resource_type = None` matches all types.
    fn find_ids_updated_in_range(
        &self,
        page_size: usize,
        resource_type: Option<&str>,
        low: DateTime<Utc>,
        high: DateTime<Utc>,
    ) -> Result<Vec<ResourceCandidate>, ReindexError>;

    fn find_by_id(&self, id: ResourceId) -> Result<Option<StoredResource>, ReindexError>;

    /// Set the type qualifier of a legacy forced id.
    fn update_forced_id_type(&self, id: ResourceId, resource_type: &str)
        -> Result<(), ReindexError>;

    fn update_index_status(&self, id: ResourceId, status: IndexStatus)
        -> Result<(), ReindexError>;

    /// Delete the resource's rows from one derived table. Returns rows deleted.
    fn delete_index_rows(&self, table: IndexTable, id: ResourceId)
        -> Result<usize, ReindexError>;
}

/// Type-specific resource handling.
pub trait ResourceHandler: Send + Sync {
    /// Load the current version of a stored resource.
    fn load_current(
        &self,
        record: &StoredResource,
        include_deleted: bool,
    ) -> Result<Option<Resource>, ReindexError>;

    /// Re-derive the search index rows of a resource.
    fn reindex(&self, resource: &Resource, record: &StoredResource) -> Result<(), ReindexError>;
}

/// Resolves the handler for a resource type.
pub trait HandlerResolver: Send + Sync {
    fn handler_for_type(&self, resource_type: &str) -> Result<Arc<dyn ResourceHandler>, ReindexError>;
}
