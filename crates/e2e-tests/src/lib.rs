//! End-to-end test infrastructure for the resource reindexer.
//!
//! Provides an in-memory resource store that stands in for the storage
//! engine collaborators, and a TestHarness wiring it to a RocksDB job
//! store and a [`ReindexService`].

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use serde_json::json;

use reindex_scheduler::{
    HandlerResolver, Propagation, ReindexService, ResourceHandler, ResourceTable, TaskContext,
    TransactionScope, TransactionStatus,
};
use reindex_storage::{JobStore, Storage};
use reindex_types::{
    ForcedId, IndexStatus, IndexTable, ReindexError, ReindexSettings, Resource,
    ResourceCandidate, ResourceId, StoredResource,
};

/// How the fake handler treats a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behavior {
    Succeed,
    /// Reindex hits a concurrent version conflict
    Conflict,
    /// Reindex raises a non-conflict error
    Fail,
    /// The current version cannot be loaded
    MissingVersion,
    /// The handler panics mid-reindex
    Panic,
}

#[derive(Default)]
struct State {
    resources: BTreeMap<ResourceId, StoredResource>,
    behaviors: HashMap<ResourceId, Behavior>,
    index_rows: HashMap<(ResourceId, IndexTable), usize>,
    reindexed: Vec<ResourceId>,
    forced_id_updates: Vec<ResourceId>,
    reindex_delay: Duration,
    scan_delay: Duration,
}

#[derive(Default)]
struct Shared {
    state: Mutex<State>,
    commits: AtomicUsize,
    rollbacks: AtomicUsize,
    independent_transactions: AtomicUsize,
    scans: AtomicUsize,
    scans_in_flight: AtomicUsize,
    max_scans_in_flight: AtomicUsize,
}

/// In-memory resource table, handler and transaction scope.
///
/// Every stored resource starts with one row in each derived index table
/// so that purges are observable.
#[derive(Clone, Default)]
pub struct FakeResourceStore {
    shared: Arc<Shared>,
}

impl FakeResourceStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.shared.state.lock().expect("fake state poisoned")
    }

    /// Store a resource with the given last-modified time.
    pub fn insert(&self, id: i64, resource_type: &str, updated: DateTime<Utc>) {
        self.insert_record(StoredResource {
            id: ResourceId(id),
            resource_type: resource_type.to_string(),
            updated,
            forced_id: None,
            index_status: Some(IndexStatus::Indexed),
        });
    }

    /// Store a resource whose forced id lacks the resource type qualifier.
    pub fn insert_legacy_forced_id(
        &self,
        id: i64,
        resource_type: &str,
        updated: DateTime<Utc>,
        forced_id: &str,
    ) {
        self.insert_record(StoredResource {
            id: ResourceId(id),
            resource_type: resource_type.to_string(),
            updated,
            forced_id: Some(ForcedId {
                forced_id: forced_id.to_string(),
                resource_type: None,
            }),
            index_status: Some(IndexStatus::Indexed),
        });
    }

    fn insert_record(&self, record: StoredResource) {
        let mut state = self.state();
        for table in IndexTable::ALL {
            state.index_rows.insert((record.id, table), 1);
        }
        state.resources.insert(record.id, record);
    }

    pub fn set_behavior(&self, id: i64, behavior: Behavior) {
        self.state().behaviors.insert(ResourceId(id), behavior);
    }

    /// Sleep this long inside every reindex call.
    pub fn set_reindex_delay(&self, delay: Duration) {
        self.state().reindex_delay = delay;
    }

    /// Sleep this long inside every range query.
    pub fn set_scan_delay(&self, delay: Duration) {
        self.state().scan_delay = delay;
    }

    /// Resources reindexed successfully, in completion order.
    pub fn reindexed(&self) -> Vec<ResourceId> {
        self.state().reindexed.clone()
    }

    /// Derived index rows left for a resource across all tables.
    pub fn index_rows(&self, id: i64) -> usize {
        let state = self.state();
        IndexTable::ALL
            .iter()
            .filter_map(|t| state.index_rows.get(&(ResourceId(id), *t)))
            .sum()
    }

    pub fn index_status(&self, id: i64) -> Option<IndexStatus> {
        self.state()
            .resources
            .get(&ResourceId(id))
            .and_then(|r| r.index_status)
    }

    pub fn record(&self, id: i64) -> Option<StoredResource> {
        self.state().resources.get(&ResourceId(id)).cloned()
    }

    pub fn forced_id_updates(&self) -> Vec<ResourceId> {
        self.state().forced_id_updates.clone()
    }

    pub fn commits(&self) -> usize {
        self.shared.commits.load(Ordering::SeqCst)
    }

    pub fn rollbacks(&self) -> usize {
        self.shared.rollbacks.load(Ordering::SeqCst)
    }

    /// Transactions opened with [`Propagation::RequiresNew`].
    pub fn independent_transactions(&self) -> usize {
        self.shared.independent_transactions.load(Ordering::SeqCst)
    }

    pub fn scans(&self) -> usize {
        self.shared.scans.load(Ordering::SeqCst)
    }

    pub fn max_concurrent_scans(&self) -> usize {
        self.shared.max_scans_in_flight.load(Ordering::SeqCst)
    }

    /// Collaborators for driving resource tasks directly.
    pub fn task_context(&self) -> TaskContext {
        TaskContext {
            resources: Arc::new(self.clone()),
            handlers: Arc::new(self.clone()),
            transactions: Arc::new(self.clone()),
        }
    }

    fn behavior(&self, id: ResourceId) -> Behavior {
        self.state()
            .behaviors
            .get(&id)
            .copied()
            .unwrap_or(Behavior::Succeed)
    }
}

impl ResourceTable for FakeResourceStore {
    fn find_ids_updated_in_range(
        &self,
        page_size: usize,
        resource_type: Option<&str>,
        low: DateTime<Utc>,
        high: DateTime<Utc>,
    ) -> Result<Vec<ResourceCandidate>, ReindexError> {
        let in_flight = self.shared.scans_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.shared
            .max_scans_in_flight
            .fetch_max(in_flight, Ordering::SeqCst);
        self.shared.scans.fetch_add(1, Ordering::SeqCst);

        let (mut page, delay) = {
            let state = self.state();
            let page: Vec<ResourceCandidate> = state
                .resources
                .values()
                .filter(|r| resource_type.map_or(true, |t| r.resource_type == t))
                .filter(|r| r.updated >= low && r.updated < high)
                .map(|r| ResourceCandidate::new(r.id, r.updated))
                .collect();
            (page, state.scan_delay)
        };
        page.sort_by_key(|c| (c.last_updated, c.id));
        page.truncate(page_size);

        std::thread::sleep(delay);
        self.shared.scans_in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(page)
    }

    fn find_by_id(&self, id: ResourceId) -> Result<Option<StoredResource>, ReindexError> {
        Ok(self.state().resources.get(&id).cloned())
    }

    fn update_forced_id_type(&self, id: ResourceId, resource_type: &str) -> Result<(), ReindexError> {
        let mut state = self.state();
        if let Some(forced) = state
            .resources
            .get_mut(&id)
            .and_then(|r| r.forced_id.as_mut())
        {
            forced.resource_type = Some(resource_type.to_string());
        }
        state.forced_id_updates.push(id);
        Ok(())
    }

    fn update_index_status(&self, id: ResourceId, status: IndexStatus) -> Result<(), ReindexError> {
        if let Some(record) = self.state().resources.get_mut(&id) {
            record.index_status = Some(status);
        }
        Ok(())
    }

    fn delete_index_rows(&self, table: IndexTable, id: ResourceId) -> Result<usize, ReindexError> {
        Ok(self.state().index_rows.remove(&(id, table)).unwrap_or(0))
    }
}

impl ResourceHandler for FakeResourceStore {
    fn load_current(
        &self,
        record: &StoredResource,
        _include_deleted: bool,
    ) -> Result<Option<Resource>, ReindexError> {
        if self.behavior(record.id) == Behavior::MissingVersion {
            return Ok(None);
        }
        Ok(Some(Resource {
            resource_type: record.resource_type.clone(),
            id: record.id,
            body: json!({
                "resourceType": record.resource_type,
                "id": record.qualified_id(),
            }),
        }))
    }

    fn reindex(&self, _resource: &Resource, record: &StoredResource) -> Result<(), ReindexError> {
        let delay = self.state().reindex_delay;
        std::thread::sleep(delay);

        match self.behavior(record.id) {
            Behavior::Conflict => Err(ReindexError::Conflict(format!(
                "version conflict on {}",
                record.qualified_id()
            ))),
            Behavior::Fail => Err(ReindexError::Handler(format!(
                "cannot extract search parameters from {}",
                record.qualified_id()
            ))),
            Behavior::Panic => panic!("handler crashed on {}", record.qualified_id()),
            Behavior::Succeed | Behavior::MissingVersion => {
                self.state().reindexed.push(record.id);
                Ok(())
            }
        }
    }
}

impl HandlerResolver for FakeResourceStore {
    fn handler_for_type(&self, _resource_type: &str) -> Result<Arc<dyn ResourceHandler>, ReindexError> {
        Ok(Arc::new(self.clone()))
    }
}

impl TransactionScope for FakeResourceStore {
    fn execute(
        &self,
        propagation: Propagation,
        work: &mut dyn FnMut(&TransactionStatus) -> Result<(), ReindexError>,
    ) -> Result<(), ReindexError> {
        if propagation == Propagation::RequiresNew {
            self.shared
                .independent_transactions
                .fetch_add(1, Ordering::SeqCst);
        }

        let status = TransactionStatus::new();
        let result = work(&status);
        if result.is_err() || status.is_rollback_only() {
            self.shared.rollbacks.fetch_add(1, Ordering::SeqCst);
        } else {
            self.shared.commits.fetch_add(1, Ordering::SeqCst);
        }
        result
    }
}

static T0: OnceLock<DateTime<Utc>> = OnceLock::new();

/// Millisecond-precision reference time an hour before the first call.
///
/// Stable for the life of the test binary, and inside the window of any
/// job created afterwards.
pub fn t0() -> DateTime<Utc> {
    *T0.get_or_init(|| {
        let millis = Utc::now().timestamp_millis() - 60 * 60 * 1000;
        Utc.timestamp_millis_opt(millis)
            .single()
            .expect("valid timestamp")
    })
}

/// Shared test harness for E2E tests.
pub struct TestHarness {
    /// Keeps temp dir alive for the lifetime of the harness
    pub _temp_dir: Option<tempfile::TempDir>,
    /// Job store
    pub storage: Arc<Storage>,
    /// Resource table, handlers and transactions
    pub resources: FakeResourceStore,
    pub service: Arc<ReindexService>,
}

impl TestHarness {
    /// Harness with default settings. Must be called inside a Tokio runtime.
    pub fn new() -> Self {
        Self::with_settings(ReindexSettings::default(), None)
    }

    /// Harness with custom settings and optional scan page size.
    pub fn with_settings(settings: ReindexSettings, page_size: Option<usize>) -> Self {
        Self::with_job_store(settings, page_size, |storage| storage as Arc<dyn JobStore>)
    }

    /// Harness whose service sees the job store through `wrap`.
    ///
    /// `storage` on the harness stays the unwrapped RocksDB store, so tests
    /// can inspect what actually got persisted.
    pub fn with_job_store<F>(settings: ReindexSettings, page_size: Option<usize>, wrap: F) -> Self
    where
        F: FnOnce(Arc<Storage>) -> Arc<dyn JobStore>,
    {
        let temp_dir = tempfile::TempDir::new().expect("Failed to create temp dir");
        let storage =
            Arc::new(Storage::open(temp_dir.path()).expect("Failed to open test storage"));
        Self::assemble(Some(temp_dir), storage, settings, page_size, wrap)
    }

    /// Harness over an already opened job store, such as one at the
    /// configured `db_path`.
    pub fn with_storage(
        storage: Arc<Storage>,
        settings: ReindexSettings,
        page_size: Option<usize>,
    ) -> Self {
        Self::assemble(None, storage, settings, page_size, |storage| storage as Arc<dyn JobStore>)
    }

    fn assemble<F>(
        temp_dir: Option<tempfile::TempDir>,
        storage: Arc<Storage>,
        settings: ReindexSettings,
        page_size: Option<usize>,
        wrap: F,
    ) -> Self
    where
        F: FnOnce(Arc<Storage>) -> Arc<dyn JobStore>,
    {
        let resources = FakeResourceStore::new();
        let mut service = ReindexService::new(
            wrap(storage.clone()),
            settings,
            Arc::new(resources.clone()),
            Arc::new(resources.clone()),
            Arc::new(resources.clone()),
        )
        .expect("Failed to create reindex service");
        if let Some(page_size) = page_size {
            service = service.with_scan_page_size(page_size);
        }

        Self {
            _temp_dir: temp_dir,
            storage,
            resources,
            service: Arc::new(service),
        }
    }

    /// Store `count` resources of one type, `step_ms` apart starting at `start`.
    pub fn seed(&self, first_id: i64, count: usize, resource_type: &str, start: DateTime<Utc>, step_ms: i64) {
        for i in 0..count {
            let offset = chrono::Duration::milliseconds(step_ms * i as i64);
            self.resources
                .insert(first_id + i as i64, resource_type, start + offset);
        }
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}
