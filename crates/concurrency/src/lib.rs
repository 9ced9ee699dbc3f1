//! Concurrency layer for the table batch engine
//!
//! This crate implements the path a batch takes once it is parsed:
//! - ChangeSetValidator: structural rules, checked before any lock or store call
//! - PartitionLockManager: FIFO per-partition locks with bounded waits
//! - TransactionExecutor: two-phase, all-or-nothing change-set application
//! - CancelToken: cooperative cancellation up to the commit point

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cancel;
pub mod lock;
pub mod transaction;
pub mod validation;

pub use cancel::CancelToken;
pub use lock::{PartitionGuard, PartitionLockManager};
pub use transaction::TransactionExecutor;
pub use validation::{ChangeSet, ChangeSetValidator, ValidatedBatch};
