//! Tablestore - entity group transactions for a Table-Storage-compatible service
//!
//! Submits several insert/update/merge/delete operations against one
//! partition and applies them atomically, in order, with the Table
//! service's validation rules and error codes.
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use tablestore::{
//!     properties, BatchCoordinator, EngineConfig, EntityKey, Operation, RawBatch, ShardedStore,
//! };
//!
//! let store = Arc::new(ShardedStore::new());
//! store.create_table("people")?;
//! let engine = BatchCoordinator::new(store, EngineConfig::default());
//!
//! let key = EntityKey::new("part1", "row1");
//! let result = engine.run_batch(
//!     "people",
//!     RawBatch::changeset(vec![Operation::insert(key, properties([("myValue", "value1")]))]),
//! );
//! assert!(result.is_success());
//! ```
//!
//! # Architecture
//!
//! - [`types`]: entities, operations, limits, error codes, OData JSON codec
//! - [`storage`]: the `MetadataStore` trait and the in-memory sharded store
//! - [`concurrency`]: validator, partition locks, two-phase executor
//! - [`engine`]: coordinator, response assembler, config, worker pool

pub use tablestore_concurrency as concurrency;
pub use tablestore_core as types;
pub use tablestore_engine as engine;
pub use tablestore_storage as storage;

pub use tablestore_concurrency::{
    CancelToken, ChangeSetValidator, PartitionLockManager, ValidatedBatch,
};
pub use tablestore_core::{
    properties, BatchPart, BatchResult, ETag, Entity, EntityKey, ErrorCode, ErrorTier, IfMatch,
    Limits, Operation, OperationKind, OperationOutcome, OutcomeStatus, PropertyMap, PropertyValue,
    RawBatch, Rejection, TableError, TableResult, UpdateMode,
};
pub use tablestore_engine::{
    BackpressureError, BatchCoordinator, BatchMetrics, BatchResponse, BatchWorkerPool, EngineConfig,
    PendingBatch, ResponseAssembler,
};
pub use tablestore_storage::{MetadataStore, ShardedStore, StagedWrite};
