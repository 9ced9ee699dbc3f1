//! Core types for the table batch engine
//!
//! This crate defines the vocabulary shared by every layer:
//! - PropertyValue / PropertyMap: typed entity property bags
//! - Entity, EntityKey, ETag, IfMatch: stored entities and versioning
//! - Operation, RawBatch: what a batch request asks for
//! - BatchResult, OperationOutcome: what a batch produced
//! - Limits: configurable shape limits for batches and entities
//! - Error: `TableError` for infrastructure failures, `ErrorCode` / `Rejection` for batch outcomes
//! - odata: JSON entity codec with EDM type annotations

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod batch;
pub mod entity;
pub mod error;
pub mod limits;
pub mod odata;
pub mod operation;
pub mod result;
pub mod token;
pub mod value;

// Re-export commonly used types
pub use batch::{BatchPart, RawBatch};
pub use entity::{ETag, Entity, EntityKey, IfMatch};
pub use error::{ErrorCode, ErrorTier, Rejection, TableError, TableResult};
pub use limits::{KeyPart, LimitError, Limits};
pub use operation::{Operation, OperationKind, UpdateMode};
pub use result::{BatchResult, OperationOutcome, OutcomeStatus};
pub use token::PartitionToken;
pub use value::{properties, PropertyMap, PropertyValue};
