//! Store Fault Tests
//!
//! Infrastructure failures surface as fatal-tier rejections and never leave
//! a partial change-set behind.

use crate::common::*;
use std::sync::Arc;
use tablestore::engine::BatchShape;
use tablestore::{CancelToken, ResponseAssembler};

fn faulty_engine() -> (Arc<FaultyStore>, BatchCoordinator<FaultyStore>) {
    init_tracing();
    let store = Arc::new(FaultyStore::new());
    let engine = BatchCoordinator::new(Arc::clone(&store), EngineConfig::default());
    (store, engine)
}

fn insert_batch(rows: &[&str]) -> RawBatch {
    RawBatch::changeset(rows.iter().map(|r| Operation::insert(key("p", r), int(1))).collect())
}

#[test]
fn commit_failure_is_store_unavailable() {
    let (store, engine) = faulty_engine();
    store.set_fail_commits(true);

    let result = engine.run_batch(TABLE, insert_batch(&["a", "b"]));
    let rejection = result.rejection().unwrap();
    assert_eq!(rejection.code, ErrorCode::StoreUnavailable);
    assert_eq!(rejection.tier(), ErrorTier::Fatal);
    assert_eq!(store.inner.entity_count(TABLE).unwrap(), 0);
    assert_eq!(engine.metrics().rejected_fatal, 1);

    let response = ResponseAssembler::assemble(&result, BatchShape::ChangeSet, &[]);
    assert_eq!(response.status, 503);
    assert_eq!(response.entries[0].error.as_ref().unwrap().wire_code, "ServerBusy");
}

#[test]
fn read_failure_blames_the_operation() {
    let (store, engine) = faulty_engine();
    store.set_fail_reads(true);

    let result = engine.run_batch(TABLE, insert_batch(&["a"]));
    let rejection = result.rejection().unwrap();
    assert_eq!(rejection.code, ErrorCode::StoreUnavailable);
    assert_eq!(rejection.index, Some(0));
}

#[test]
fn recovers_after_fault_clears() {
    let (store, engine) = faulty_engine();
    store.set_fail_commits(true);
    assert!(!engine.run_batch(TABLE, insert_batch(&["a"])).is_success());

    store.set_fail_commits(false);
    assert!(engine.run_batch(TABLE, insert_batch(&["a"])).is_success());
    assert_eq!(store.inner.entity_count(TABLE).unwrap(), 1);
    assert_eq!(engine.locks().tracked_partitions(), 0);
}

#[test]
fn default_commit_path_used_by_delegating_store() {
    // Trait default commit: put then get per write
    struct Plain(ShardedStore);

    impl MetadataStore for Plain {
        fn table_exists(&self, table: &str) -> TableResult<bool> {
            self.0.table_exists(table)
        }
        fn get(
            &self,
            table: &str,
            key: &EntityKey,
            token: &tablestore::types::PartitionToken,
        ) -> TableResult<Option<Entity>> {
            self.0.get(table, key, token)
        }
        fn put(
            &self,
            table: &str,
            key: EntityKey,
            properties: PropertyMap,
            token: &tablestore::types::PartitionToken,
        ) -> TableResult<ETag> {
            self.0.put(table, key, properties, token)
        }
        fn remove(
            &self,
            table: &str,
            key: &EntityKey,
            token: &tablestore::types::PartitionToken,
        ) -> TableResult<bool> {
            self.0.remove(table, key, token)
        }
    }

    let inner = ShardedStore::new();
    inner.create_table(TABLE).unwrap();
    let engine = BatchCoordinator::new(Arc::new(Plain(inner)), EngineConfig::default());

    let result = engine.run_batch(TABLE, insert_batch(&["a", "b"]));
    let outcomes = result.outcomes().unwrap();
    assert_eq!(outcomes.len(), 2);
    assert!(outcomes.iter().all(|o| o.etag().is_some()));

    let result = engine.run_batch(
        TABLE,
        RawBatch::changeset(vec![Operation::delete(key("p", "a"))]),
    );
    assert_eq!(result.outcomes().unwrap()[0].status, OutcomeStatus::Deleted);
    assert_eq!(engine.store().0.entity_count(TABLE).unwrap(), 1);
}

#[test]
fn cancellation_is_fatal_and_clean() {
    let (store, engine) = faulty_engine();
    let cancel = CancelToken::new();
    cancel.cancel();

    let result = engine.run_batch_with_cancel(TABLE, insert_batch(&["a"]), &cancel);
    assert_eq!(result.error_code(), Some(ErrorCode::Cancelled));
    assert_eq!(result.rejection().unwrap().tier(), ErrorTier::Fatal);
    assert_eq!(store.inner.entity_count(TABLE).unwrap(), 0);

    let response = ResponseAssembler::assemble(&result, BatchShape::ChangeSet, &[]);
    assert_eq!(response.status, 500);
}
