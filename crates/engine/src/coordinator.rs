//! Batch coordinator
//!
//! Runs one batch end to end:
//!
//! ```text
//! validate (no store access) → table exists? → acquire partition lock
//!   → execute change-set | retrieve → release lock → BatchResult
//! ```
//!
//! The coordinator owns no entity state. It holds the store, the lock
//! table and the validator built from an explicit [`EngineConfig`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use tablestore_concurrency::{
    CancelToken, ChangeSetValidator, PartitionLockManager, TransactionExecutor, ValidatedBatch,
};
use tablestore_core::{BatchPart, BatchResult, ErrorCode, ErrorTier, RawBatch, Rejection};
use tablestore_storage::MetadataStore;

use crate::config::EngineConfig;
use crate::response::{BatchResponse, BatchShape, ResponseAssembler};

/// Entry point for batch requests
///
/// # Memory Ordering
///
/// Metric counters use Relaxed ordering. They are observational only and
/// synchronize nothing else.
pub struct BatchCoordinator<S: MetadataStore> {
    store: Arc<S>,
    config: EngineConfig,
    validator: ChangeSetValidator,
    locks: PartitionLockManager,
    executor: TransactionExecutor,
    lock_timeout: Option<Duration>,
    started: AtomicU64,
    committed: AtomicU64,
    rejected_structural: AtomicU64,
    rejected_transactional: AtomicU64,
    rejected_fatal: AtomicU64,
    operations_applied: AtomicU64,
}

impl<S: MetadataStore> BatchCoordinator<S> {
    /// Create a coordinator over `store`
    pub fn new(store: Arc<S>, config: EngineConfig) -> Self {
        let validator = ChangeSetValidator::new(config.limits())
            .reject_duplicate_entities(config.reject_duplicate_entities);
        Self {
            store,
            validator,
            locks: PartitionLockManager::new(),
            executor: TransactionExecutor::new(),
            lock_timeout: config.lock_timeout(),
            config,
            started: AtomicU64::new(0),
            committed: AtomicU64::new(0),
            rejected_structural: AtomicU64::new(0),
            rejected_transactional: AtomicU64::new(0),
            rejected_fatal: AtomicU64::new(0),
            operations_applied: AtomicU64::new(0),
        }
    }

    /// Backing store
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Active configuration
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Partition locks, for inspection
    pub fn locks(&self) -> &PartitionLockManager {
        &self.locks
    }

    /// Run a batch against `table`
    pub fn run_batch(&self, table: &str, batch: RawBatch) -> BatchResult {
        self.run_batch_with_cancel(table, batch, &CancelToken::new())
    }

    /// Run a batch that may be cancelled up to its commit point
    pub fn run_batch_with_cancel(
        &self,
        table: &str,
        batch: RawBatch,
        cancel: &CancelToken,
    ) -> BatchResult {
        self.started.fetch_add(1, Ordering::Relaxed);
        let result = self.run(table, batch, cancel);
        self.record(table, &result);
        result
    }

    /// Run a batch and assemble its response
    pub fn respond(&self, table: &str, batch: RawBatch) -> BatchResponse {
        let (shape, echo) = describe(&batch);
        let result = self.run_batch(table, batch);
        ResponseAssembler::assemble(&result, shape, &echo)
    }

    /// Counter snapshot
    pub fn metrics(&self) -> BatchMetrics {
        BatchMetrics {
            started: self.started.load(Ordering::Relaxed),
            committed: self.committed.load(Ordering::Relaxed),
            rejected_structural: self.rejected_structural.load(Ordering::Relaxed),
            rejected_transactional: self.rejected_transactional.load(Ordering::Relaxed),
            rejected_fatal: self.rejected_fatal.load(Ordering::Relaxed),
            operations_applied: self.operations_applied.load(Ordering::Relaxed),
        }
    }

    fn run(&self, table: &str, batch: RawBatch, cancel: &CancelToken) -> BatchResult {
        let validated = match self.validator.validate(batch) {
            Ok(validated) => validated,
            Err(rejection) => return rejection.into(),
        };

        match self.store.table_exists(table) {
            Ok(true) => {}
            Ok(false) => {
                return Rejection::batch(
                    ErrorCode::TableNotFound,
                    format!("table {} does not exist", table),
                )
                .into()
            }
            Err(e) => return Rejection::batch(ErrorCode::StoreUnavailable, e.to_string()).into(),
        }

        if cancel.is_cancelled() {
            return Rejection::batch(ErrorCode::Cancelled, "batch cancelled before execution")
                .into();
        }

        let guard = match self
            .locks
            .acquire(table, validated.partition_key(), self.lock_timeout)
        {
            Ok(guard) => guard,
            Err(e) => return Rejection::from(e).into(),
        };

        let store = self.store.as_ref();
        match &validated {
            ValidatedBatch::ChangeSet(changeset) => {
                self.executor.execute(changeset, table, store, &guard, cancel)
            }
            ValidatedBatch::Retrieve(operation) => {
                self.executor.retrieve(operation, table, store, &guard)
            }
        }
    }

    fn record(&self, table: &str, result: &BatchResult) {
        match result {
            BatchResult::AllSucceeded(outcomes) => {
                self.committed.fetch_add(1, Ordering::Relaxed);
                self.operations_applied
                    .fetch_add(outcomes.len() as u64, Ordering::Relaxed);
                debug!(
                    target: "tablestore::batch",
                    table,
                    operations = outcomes.len(),
                    "Batch succeeded"
                );
            }
            BatchResult::Rejected(rejection) => match rejection.tier() {
                ErrorTier::Structural | ErrorTier::Transactional => {
                    let counter = match rejection.tier() {
                        ErrorTier::Structural => &self.rejected_structural,
                        _ => &self.rejected_transactional,
                    };
                    counter.fetch_add(1, Ordering::Relaxed);
                    debug!(
                        target: "tablestore::batch",
                        table,
                        code = %rejection.code,
                        index = ?rejection.index,
                        "Batch rejected"
                    );
                }
                ErrorTier::Fatal => {
                    self.rejected_fatal.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        target: "tablestore::batch",
                        table,
                        code = %rejection.code,
                        error = %rejection.message,
                        "Batch failed"
                    );
                }
            },
        }
    }
}

/// Batch shape and per-operation echo flags, read before validation
/// consumes the batch
fn describe(batch: &RawBatch) -> (BatchShape, Vec<bool>) {
    let changeset = batch.parts.iter().find_map(|part| match part {
        BatchPart::ChangeSet(ops) => Some(ops),
        BatchPart::Operation(_) => None,
    });
    match changeset {
        Some(ops) => (BatchShape::ChangeSet, ops.iter().map(|op| op.echo_content).collect()),
        None => {
            let echo = batch
                .parts
                .iter()
                .map(|part| match part {
                    BatchPart::Operation(op) => op.echo_content,
                    BatchPart::ChangeSet(_) => false,
                })
                .collect();
            (BatchShape::Retrieve, echo)
        }
    }
}

/// Batch counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchMetrics {
    /// Batches submitted
    pub started: u64,
    /// Batches that applied every operation
    pub committed: u64,
    /// Batches rejected for their shape
    pub rejected_structural: u64,
    /// Batches rejected by a failed precondition
    pub rejected_transactional: u64,
    /// Batches failed by infrastructure, timeout or cancellation
    pub rejected_fatal: u64,
    /// Operations applied across committed batches
    pub operations_applied: u64,
}

impl BatchMetrics {
    /// Batches rejected in any tier
    pub fn total_rejected(&self) -> u64 {
        self.rejected_structural + self.rejected_transactional + self.rejected_fatal
    }

    /// Fraction of finished batches that were rejected
    pub fn rejection_rate(&self) -> f64 {
        let finished = self.committed + self.total_rejected();
        if finished == 0 {
            0.0
        } else {
            self.total_rejected() as f64 / finished as f64
        }
    }
}
