//! Change-set execution
//!
//! Applies a validated change-set to the metadata store all-or-nothing.
//! The caller must hold the partition lock; the executor takes the
//! [`PartitionGuard`] by reference so it cannot be called without one.
//!
//! ## Commit Sequence
//!
//! ```text
//! 1. prepare: for each operation in order
//!      current = overlay[row] or store.get(row)
//!      check precondition (exists / absent / If-Match)
//!      stage the write, record the outcome status, update overlay
//!    any failure → Rejected(code, index), nothing written
//! 2. cancellation check (COMMIT POINT follows)
//! 3. store.commit(staged writes)
//!    failure → Rejected(StoreUnavailable)
//! 4. pair committed entities with outcome statuses, in submission order
//! ```
//!
//! The overlay holds the effect of earlier operations in the same
//! change-set, so insert-then-merge of one entity sees the insert. Staged
//! entities have no ETag yet, so a conditional operation against one never
//! matches a concrete ETag.

use rustc_hash::FxHashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

use tablestore_core::{
    BatchResult, ETag, ErrorCode, ErrorTier, IfMatch, Operation, OperationKind, OperationOutcome,
    OutcomeStatus, PropertyMap, Rejection, UpdateMode,
};
use tablestore_storage::{MetadataStore, StagedWrite};

use crate::cancel::CancelToken;
use crate::lock::PartitionGuard;
use crate::validation::ChangeSet;

/// Entity state as seen during the prepare phase
#[derive(Debug, Clone)]
struct Slot {
    properties: PropertyMap,
    /// `None` while the entity only exists in this change-set
    etag: Option<ETag>,
}

/// Staged writes plus each operation's outcome status
#[derive(Debug, Default)]
struct Plan {
    writes: Vec<StagedWrite>,
    statuses: Vec<OutcomeStatus>,
}

/// Runs change-sets and standalone retrieves against a store
///
/// Stateless apart from a transaction id counter used to correlate logs.
#[derive(Debug, Default)]
pub struct TransactionExecutor {
    next_txn_id: AtomicU64,
}

impl TransactionExecutor {
    /// Create an executor
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a change-set atomically
    ///
    /// Returns `AllSucceeded` with one outcome per operation in submission
    /// order, or `Rejected` with no store mutation.
    pub fn execute<S: MetadataStore + ?Sized>(
        &self,
        changeset: &ChangeSet,
        table: &str,
        store: &S,
        guard: &PartitionGuard,
        cancel: &CancelToken,
    ) -> BatchResult {
        let txn_id = self.next_txn_id.fetch_add(1, Ordering::Relaxed);

        let plan = match self.prepare(changeset, table, store, guard) {
            Ok(plan) => plan,
            Err(rejection) => return self.abort(txn_id, table, rejection),
        };

        if cancel.is_cancelled() {
            return self.abort(
                txn_id,
                table,
                Rejection::batch(ErrorCode::Cancelled, "batch cancelled before commit"),
            );
        }

        // COMMIT POINT
        let committed = match store.commit(table, plan.writes, guard.token()) {
            Ok(committed) => committed,
            Err(e) => {
                return self.abort(
                    txn_id,
                    table,
                    Rejection::batch(ErrorCode::StoreUnavailable, e.to_string()),
                )
            }
        };

        let outcomes: Vec<OperationOutcome> = changeset
            .operations()
            .iter()
            .zip(plan.statuses)
            .zip(committed)
            .enumerate()
            .map(|(index, ((op, status), entity))| OperationOutcome {
                index,
                status,
                key: op.key.clone(),
                entity,
            })
            .collect();

        debug!(
            target: "tablestore::txn",
            txn_id,
            table,
            partition = changeset.partition_key(),
            operations = outcomes.len(),
            "Change-set committed"
        );
        BatchResult::AllSucceeded(outcomes)
    }

    /// Read one entity
    pub fn retrieve<S: MetadataStore + ?Sized>(
        &self,
        operation: &Operation,
        table: &str,
        store: &S,
        guard: &PartitionGuard,
    ) -> BatchResult {
        match store.get(table, &operation.key, guard.token()) {
            Ok(Some(entity)) => BatchResult::AllSucceeded(vec![OperationOutcome {
                index: 0,
                status: OutcomeStatus::Retrieved,
                key: operation.key.clone(),
                entity: Some(entity),
            }]),
            Ok(None) => BatchResult::Rejected(Rejection::at(
                ErrorCode::EntityNotFound,
                0,
                format!("entity {} does not exist", operation.key),
            )),
            Err(e) => BatchResult::Rejected(Rejection::at(e.code(), 0, e.to_string())),
        }
    }

    /// Phase 1: check every precondition and stage the writes
    fn prepare<S: MetadataStore + ?Sized>(
        &self,
        changeset: &ChangeSet,
        table: &str,
        store: &S,
        guard: &PartitionGuard,
    ) -> Result<Plan, Rejection> {
        let mut overlay: FxHashMap<&str, Option<Slot>> = FxHashMap::default();
        let mut plan = Plan::default();

        for (index, op) in changeset.operations().iter().enumerate() {
            let current = match overlay.get(op.key.row_key.as_str()) {
                Some(slot) => slot.clone(),
                None => store
                    .get(table, &op.key, guard.token())
                    .map_err(|e| Rejection::at(e.code(), index, e.to_string()))?
                    .map(|entity| Slot {
                        properties: entity.properties,
                        etag: Some(entity.etag),
                    }),
            };

            let (next, status) = match op.kind {
                OperationKind::Insert => {
                    if current.is_some() {
                        return Err(Rejection::at(
                            ErrorCode::EntityAlreadyExists,
                            index,
                            format!("entity {} already exists", op.key),
                        ));
                    }
                    (Some(op.properties.clone()), OutcomeStatus::Created)
                }
                OperationKind::Update(mode) => {
                    let slot = require_existing(current, op, index)?;
                    check_if_match(&op.if_match, &slot, op, index)?;
                    (
                        Some(apply_mode(mode, slot.properties, &op.properties)),
                        OutcomeStatus::Updated,
                    )
                }
                OperationKind::Upsert(mode) => match current {
                    None => (Some(op.properties.clone()), OutcomeStatus::Created),
                    Some(slot) => (
                        Some(apply_mode(mode, slot.properties, &op.properties)),
                        OutcomeStatus::Updated,
                    ),
                },
                OperationKind::Delete => {
                    let slot = require_existing(current, op, index)?;
                    check_if_match(&op.if_match, &slot, op, index)?;
                    (None, OutcomeStatus::Deleted)
                }
                OperationKind::Retrieve => {
                    return Err(Rejection::at(
                        ErrorCode::RetrieveNotAllowedWithMutations,
                        index,
                        "retrieve cannot be combined with mutations",
                    ));
                }
            };

            let write = match &next {
                Some(properties) => StagedWrite::Put {
                    key: op.key.clone(),
                    properties: properties.clone(),
                },
                None => StagedWrite::Remove {
                    key: op.key.clone(),
                },
            };
            plan.writes.push(write);
            plan.statuses.push(status);
            overlay.insert(
                op.key.row_key.as_str(),
                next.map(|properties| Slot {
                    properties,
                    etag: None,
                }),
            );
        }

        Ok(plan)
    }

    fn abort(&self, txn_id: u64, table: &str, rejection: Rejection) -> BatchResult {
        if rejection.tier() == ErrorTier::Fatal {
            warn!(
                target: "tablestore::txn",
                txn_id,
                table,
                code = %rejection.code,
                "Change-set aborted: {}",
                rejection.message
            );
        } else {
            debug!(
                target: "tablestore::txn",
                txn_id,
                table,
                code = %rejection.code,
                index = ?rejection.index,
                "Change-set aborted"
            );
        }
        BatchResult::Rejected(rejection)
    }
}

fn require_existing(
    current: Option<Slot>,
    op: &Operation,
    index: usize,
) -> Result<Slot, Rejection> {
    current.ok_or_else(|| {
        Rejection::at(
            ErrorCode::EntityNotFound,
            index,
            format!("entity {} does not exist", op.key),
        )
    })
}

fn check_if_match(
    if_match: &IfMatch,
    slot: &Slot,
    op: &Operation,
    index: usize,
) -> Result<(), Rejection> {
    let matched = match (if_match, &slot.etag) {
        (IfMatch::Any, _) => true,
        (IfMatch::ETag(_), None) => false,
        (expected, Some(stored)) => expected.matches(stored),
    };
    if matched {
        return Ok(());
    }
    let stored = slot
        .etag
        .as_ref()
        .map(|e| e.as_str().to_string())
        .unwrap_or_else(|| "<uncommitted>".to_string());
    Err(Rejection::at(
        ErrorCode::ETagMismatch,
        index,
        format!("{} If-Match does not match current ETag {} of {}", op.kind.name(), stored, op.key),
    ))
}

/// Replace discards existing properties; merge overwrites supplied ones only
fn apply_mode(mode: UpdateMode, existing: PropertyMap, supplied: &PropertyMap) -> PropertyMap {
    match mode {
        UpdateMode::Replace => supplied.clone(),
        UpdateMode::Merge => {
            let mut merged = existing;
            merged.extend(supplied.iter().map(|(k, v)| (k.clone(), v.clone())));
            merged
        }
    }
}
