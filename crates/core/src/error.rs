//! Error types for the batch engine
//!
//! Two families live here:
//! - [`TableError`]: infrastructure failures raised by stores, locks and
//!   configuration. Propagated with `?`.
//! - [`ErrorCode`] / [`Rejection`]: the outcome vocabulary of a batch. A
//!   rejected batch is a normal result, not a Rust error.
//!
//! We use `thiserror` for automatic `Display` and `Error` trait implementations.

use std::fmt;
use std::io;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for engine operations
pub type TableResult<T> = std::result::Result<T, TableError>;

/// Infrastructure errors
#[derive(Debug, Error)]
pub enum TableError {
    /// The metadata store could not serve the request
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// A partition lock was not granted within the configured wait
    #[error("Partition lock timed out after {0:?}")]
    Timeout(Duration),

    /// The named table does not exist
    #[error("Table not found: {0}")]
    TableNotFound(String),

    /// The named table already exists
    #[error("Table already exists: {0}")]
    TableAlreadyExists(String),

    /// Caller supplied something malformed
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Configuration could not be loaded or parsed
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error (config files)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Payload serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl TableError {
    /// Create an invalid-input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        TableError::InvalidInput(msg.into())
    }

    /// Create a store-unavailable error
    pub fn unavailable(msg: impl Into<String>) -> Self {
        TableError::StoreUnavailable(msg.into())
    }

    /// Batch outcome code this error surfaces as
    pub fn code(&self) -> ErrorCode {
        match self {
            TableError::Timeout(_) => ErrorCode::Timeout,
            TableError::TableNotFound(_) => ErrorCode::TableNotFound,
            TableError::InvalidInput(_) | TableError::Serialization(_) => ErrorCode::InvalidBatch,
            TableError::StoreUnavailable(_)
            | TableError::TableAlreadyExists(_)
            | TableError::Config(_)
            | TableError::Io(_) => ErrorCode::StoreUnavailable,
        }
    }
}

impl From<serde_json::Error> for TableError {
    fn from(e: serde_json::Error) -> Self {
        TableError::Serialization(e.to_string())
    }
}

/// Which class of failure a code belongs to
///
/// Callers treat the tiers differently: structural rejections are never
/// retried, transactional ones need state reconciliation first, fatal ones
/// can be retried as-is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorTier {
    /// Batch shape is illegal; detected before any store access
    Structural,
    /// An operation's precondition failed against current state
    Transactional,
    /// Infrastructure failure or cancellation
    Fatal,
}

/// Outcome codes for a rejected batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// More than one change-set in the batch
    MultipleChangesetsNotAllowed,
    /// A retrieve shares the batch with mutations
    RetrieveNotAllowedWithMutations,
    /// Empty batch, empty change-set, or operations outside a change-set
    InvalidBatch,
    /// Change-set exceeds the operation limit
    TooManyOperations,
    /// Change-set spans more than one partition
    PartitionKeyMismatch,
    /// Two operations in a change-set target the same entity
    DuplicateEntityInChangeset,
    /// Entity key or payload violates shape limits
    InvalidEntity,
    /// Target table does not exist
    TableNotFound,
    /// Insert of an entity that already exists
    EntityAlreadyExists,
    /// Update, delete or retrieve of an absent entity
    EntityNotFound,
    /// Conditional update/delete with a stale ETag
    ETagMismatch,
    /// Metadata store failure
    StoreUnavailable,
    /// Partition lock wait expired
    Timeout,
    /// Caller abandoned the batch before commit
    Cancelled,
}

impl ErrorCode {
    /// Failure tier
    pub fn tier(&self) -> ErrorTier {
        match self {
            ErrorCode::MultipleChangesetsNotAllowed
            | ErrorCode::RetrieveNotAllowedWithMutations
            | ErrorCode::InvalidBatch
            | ErrorCode::TooManyOperations
            | ErrorCode::PartitionKeyMismatch
            | ErrorCode::DuplicateEntityInChangeset
            | ErrorCode::InvalidEntity
            | ErrorCode::TableNotFound => ErrorTier::Structural,
            ErrorCode::EntityAlreadyExists
            | ErrorCode::EntityNotFound
            | ErrorCode::ETagMismatch => ErrorTier::Transactional,
            ErrorCode::StoreUnavailable | ErrorCode::Timeout | ErrorCode::Cancelled => {
                ErrorTier::Fatal
            }
        }
    }

    /// HTTP status the transport reports for this code
    pub fn http_status(&self) -> u16 {
        match self {
            ErrorCode::TableNotFound | ErrorCode::EntityNotFound => 404,
            ErrorCode::EntityAlreadyExists => 409,
            ErrorCode::ETagMismatch => 412,
            ErrorCode::StoreUnavailable => 503,
            ErrorCode::Timeout | ErrorCode::Cancelled => 500,
            _ => 400,
        }
    }

    /// Table service error code string used on the wire
    pub fn wire_code(&self) -> &'static str {
        match self {
            ErrorCode::MultipleChangesetsNotAllowed
            | ErrorCode::RetrieveNotAllowedWithMutations
            | ErrorCode::InvalidBatch
            | ErrorCode::TooManyOperations
            | ErrorCode::InvalidEntity => "InvalidInput",
            ErrorCode::PartitionKeyMismatch => "CommandsInBatchActOnDifferentPartitions",
            ErrorCode::DuplicateEntityInChangeset => "InvalidDuplicateRow",
            ErrorCode::TableNotFound => "TableNotFound",
            ErrorCode::EntityAlreadyExists => "EntityAlreadyExists",
            ErrorCode::EntityNotFound => "ResourceNotFound",
            ErrorCode::ETagMismatch => "UpdateConditionNotSatisfied",
            ErrorCode::StoreUnavailable => "ServerBusy",
            ErrorCode::Timeout => "OperationTimedOut",
            ErrorCode::Cancelled => "OperationCancelled",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Why a batch was rejected
///
/// `index` is the zero-based position of the offending operation within
/// the change-set (or the batch part list for envelope errors), when one
/// operation can be blamed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    /// Outcome code
    pub code: ErrorCode,
    /// Offending operation, if any
    pub index: Option<usize>,
    /// Human readable detail
    pub message: String,
}

impl Rejection {
    /// Rejection blamed on the whole batch
    pub fn batch(code: ErrorCode, message: impl Into<String>) -> Self {
        Rejection {
            code,
            index: None,
            message: message.into(),
        }
    }

    /// Rejection blamed on one operation
    pub fn at(code: ErrorCode, index: usize, message: impl Into<String>) -> Self {
        Rejection {
            code,
            index: Some(index),
            message: message.into(),
        }
    }

    /// Failure tier of the code
    pub fn tier(&self) -> ErrorTier {
        self.code.tier()
    }
}

impl From<TableError> for Rejection {
    fn from(e: TableError) -> Self {
        Rejection::batch(e.code(), e.to_string())
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.index {
            Some(i) => write!(f, "{} at operation {}: {}", self.code, i, self.message),
            None => write!(f, "{}: {}", self.code, self.message),
        }
    }
}
