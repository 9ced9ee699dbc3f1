//! Batch engine for the table service
//!
//! This crate orchestrates the lower layers for one batch request:
//! - BatchCoordinator: validate → lock partition → execute → metrics
//! - ResponseAssembler: BatchResult → transport-agnostic BatchResponse
//! - EngineConfig: limits, lock timeout and pool sizing from `tablestore.toml`
//! - BatchWorkerPool: named worker threads behind a bounded FIFO queue
//!
//! The engine holds no entity state of its own; entities live in the
//! metadata store passed to the coordinator.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod coordinator;
pub mod pool;
pub mod response;

pub use config::{EngineConfig, CONFIG_FILE_NAME};
pub use coordinator::{BatchCoordinator, BatchMetrics};
pub use pool::{BackpressureError, BatchWorkerPool, PendingBatch, PoolStats};
pub use response::{BatchResponse, BatchShape, ErrorBody, ResponseAssembler, ResponseEntry};
