//! Resource records as seen by the reindexer.
//!
//! The storage engine owns these rows; the reindexer only reads them,
//! normalizes legacy forced ids and flips the index status on failure.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Storage-assigned resource primary key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceId(pub i64);

impl std::fmt::Display for ResourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A resource returned by a range scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceCandidate {
    pub id: ResourceId,
    pub last_updated: DateTime<Utc>,
}

impl ResourceCandidate {
    pub fn new(id: ResourceId, last_updated: DateTime<Utc>) -> Self {
        Self { id, last_updated }
    }
}

/// Client-assigned identifier attached to a resource.
///
/// Older rows stored only the bare id; current rows also carry the
/// resource type so the id is unique per type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForcedId {
    pub forced_id: String,
    #[serde(default)]
    pub resource_type: Option<String>,
}

impl ForcedId {
    /// Legacy rows have no (or a blank) type qualifier.
    pub fn is_legacy(&self) -> bool {
        self.resource_type
            .as_deref()
            .map(|t| t.trim().is_empty())
            .unwrap_or(true)
    }
}

/// Index status of a stored resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexStatus {
    Indexed,
    IndexingFailed,
}

/// A stored resource row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredResource {
    pub id: ResourceId,
    pub resource_type: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub updated: DateTime<Utc>,
    #[serde(default)]
    pub forced_id: Option<ForcedId>,
    #[serde(default)]
    pub index_status: Option<IndexStatus>,
}

impl StoredResource {
    /// Qualified id for log output, e.g. `Patient/123`.
    pub fn qualified_id(&self) -> String {
        match &self.forced_id {
            Some(forced) => format!("{}/{}", self.resource_type, forced.forced_id),
            None => format!("{}/{}", self.resource_type, self.id),
        }
    }
}

/// A parsed resource body handed to a type handler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub resource_type: String,
    pub id: ResourceId,
    pub body: serde_json::Value,
}

/// Derived index tables purged when a resource fails to reindex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexTable {
    Tag,
    Coords,
    Date,
    Number,
    Quantity,
    String,
    Token,
    Uri,
    /// Links where the resource is the source
    LinkSource,
    /// Links where the resource is the target
    LinkTarget,
}

impl IndexTable {
    /// Every derived table, in purge order.
    pub const ALL: [IndexTable; 10] = [
        IndexTable::Tag,
        IndexTable::Coords,
        IndexTable::Date,
        IndexTable::Number,
        IndexTable::Quantity,
        IndexTable::String,
        IndexTable::Token,
        IndexTable::Uri,
        IndexTable::LinkSource,
        IndexTable::LinkTarget,
    ];
}

impl std::fmt::Display for IndexTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            IndexTable::Tag => "tag",
            IndexTable::Coords => "coords",
            IndexTable::Date => "date",
            IndexTable::Number => "number",
            IndexTable::Quantity => "quantity",
            IndexTable::String => "string",
            IndexTable::Token => "token",
            IndexTable::Uri => "uri",
            IndexTable::LinkSource => "link_source",
            IndexTable::LinkTarget => "link_target",
        };
        write!(f, "{}", name)
    }
}
