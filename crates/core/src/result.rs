//! Batch outcomes

use crate::entity::{ETag, Entity, EntityKey};
use crate::error::{ErrorCode, Rejection};

/// What a successful operation did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutcomeStatus {
    /// Entity was created
    Created,
    /// Entity was replaced or merged
    Updated,
    /// Entity was removed
    Deleted,
    /// Entity was read
    Retrieved,
}

/// Result of one successfully applied operation
#[derive(Debug, Clone, PartialEq)]
pub struct OperationOutcome {
    /// Position in the change-set
    pub index: usize,
    /// What happened
    pub status: OutcomeStatus,
    /// Target entity
    pub key: EntityKey,
    /// Resulting entity; `None` after a delete
    pub entity: Option<Entity>,
}

impl OperationOutcome {
    /// ETag of the resulting entity
    pub fn etag(&self) -> Option<&ETag> {
        self.entity.as_ref().map(|e| &e.etag)
    }
}

/// Result of running one batch
#[derive(Debug, Clone, PartialEq)]
pub enum BatchResult {
    /// Every operation applied, outcomes in submission order
    AllSucceeded(Vec<OperationOutcome>),
    /// Nothing applied
    Rejected(Rejection),
}

impl BatchResult {
    /// Whether the batch succeeded
    pub fn is_success(&self) -> bool {
        matches!(self, BatchResult::AllSucceeded(_))
    }

    /// Outcomes if the batch succeeded
    pub fn outcomes(&self) -> Option<&[OperationOutcome]> {
        match self {
            BatchResult::AllSucceeded(outcomes) => Some(outcomes),
            BatchResult::Rejected(_) => None,
        }
    }

    /// Rejection if the batch failed
    pub fn rejection(&self) -> Option<&Rejection> {
        match self {
            BatchResult::AllSucceeded(_) => None,
            BatchResult::Rejected(r) => Some(r),
        }
    }

    /// Rejection code if the batch failed
    pub fn error_code(&self) -> Option<ErrorCode> {
        self.rejection().map(|r| r.code)
    }
}

impl From<Rejection> for BatchResult {
    fn from(r: Rejection) -> Self {
        BatchResult::Rejected(r)
    }
}
