//! Shared test utilities for the integration suites.
//!
//! Import via `#[path = "../common/mod.rs"] mod common;` from a suite's main.rs.

#![allow(dead_code)]
#![allow(unused_imports)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Once};
use tracing_subscriber::EnvFilter;

pub use tablestore::storage::MetadataStore;
pub use tablestore::{
    properties, BatchCoordinator, BatchResult, ETag, Entity, EntityKey, EngineConfig, ErrorCode,
    ErrorTier, Operation, OutcomeStatus, PropertyMap, PropertyValue, RawBatch, ShardedStore,
    StagedWrite, TableError, TableResult,
};
use tablestore::types::PartitionToken;

pub const TABLE: &str = "people";

// ============================================================================
// Initialization
// ============================================================================

/// Install a test-writer subscriber once; `RUST_LOG` selects targets.
pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("tablestore=warn"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_ansi(false)
            .try_init();
    });
}

pub fn key(pk: &str, rk: &str) -> EntityKey {
    EntityKey::new(pk, rk)
}

pub fn int(v: i32) -> PropertyMap {
    properties([("v", PropertyValue::Int32(v))])
}

// ============================================================================
// TestEngine - coordinator over a fresh in-memory store
// ============================================================================

pub struct TestEngine {
    pub store: Arc<ShardedStore>,
    pub engine: Arc<BatchCoordinator<ShardedStore>>,
}

impl TestEngine {
    /// Default config: duplicate entities rejected
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    /// Duplicate entities allowed; later operations see earlier ones
    pub fn lenient() -> Self {
        Self::with_config(EngineConfig {
            reject_duplicate_entities: false,
            ..EngineConfig::default()
        })
    }

    pub fn with_config(config: EngineConfig) -> Self {
        init_tracing();
        let store = Arc::new(ShardedStore::new());
        store.create_table(TABLE).expect("create table");
        let engine = Arc::new(BatchCoordinator::new(Arc::clone(&store), config));
        TestEngine { store, engine }
    }

    pub fn run(&self, ops: Vec<Operation>) -> BatchResult {
        self.engine.run_batch(TABLE, RawBatch::changeset(ops))
    }

    pub fn retrieve(&self, pk: &str, rk: &str) -> BatchResult {
        self.engine
            .run_batch(TABLE, RawBatch::single(Operation::retrieve(key(pk, rk))))
    }

    /// Insert an entity, panicking if the batch fails
    pub fn seed(&self, pk: &str, rk: &str, props: PropertyMap) -> ETag {
        let result = self.run(vec![Operation::insert(key(pk, rk), props)]);
        result.outcomes().expect("seed insert")[0]
            .etag()
            .cloned()
            .expect("etag")
    }

    pub fn snapshot(&self) -> Vec<Entity> {
        self.store.snapshot(TABLE).expect("snapshot")
    }

    pub fn count(&self) -> usize {
        self.store.entity_count(TABLE).expect("count")
    }

    pub fn get(&self, pk: &str, rk: &str) -> Option<Entity> {
        self.store.peek(TABLE, &key(pk, rk)).expect("peek")
    }
}

// ============================================================================
// FaultyStore - injects store failures
// ============================================================================

/// Wraps a `ShardedStore`; reads or commits fail while their flag is set
#[derive(Default)]
pub struct FaultyStore {
    pub inner: ShardedStore,
    pub fail_reads: AtomicBool,
    pub fail_commits: AtomicBool,
}

impl FaultyStore {
    pub fn new() -> Self {
        let store = FaultyStore::default();
        store.inner.create_table(TABLE).expect("create table");
        store
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_commits(&self, fail: bool) {
        self.fail_commits.store(fail, Ordering::SeqCst);
    }
}

impl MetadataStore for FaultyStore {
    fn table_exists(&self, table: &str) -> TableResult<bool> {
        self.inner.table_exists(table)
    }

    fn get(
        &self,
        table: &str,
        key: &EntityKey,
        token: &PartitionToken,
    ) -> TableResult<Option<Entity>> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(TableError::unavailable("injected read failure"));
        }
        self.inner.get(table, key, token)
    }

    fn put(
        &self,
        table: &str,
        key: EntityKey,
        properties: PropertyMap,
        token: &PartitionToken,
    ) -> TableResult<ETag> {
        self.inner.put(table, key, properties, token)
    }

    fn remove(&self, table: &str, key: &EntityKey, token: &PartitionToken) -> TableResult<bool> {
        self.inner.remove(table, key, token)
    }

    fn commit(
        &self,
        table: &str,
        writes: Vec<StagedWrite>,
        token: &PartitionToken,
    ) -> TableResult<Vec<Option<Entity>>> {
        if self.fail_commits.load(Ordering::SeqCst) {
            return Err(TableError::unavailable("injected commit failure"));
        }
        self.inner.commit(table, writes, token)
    }
}
