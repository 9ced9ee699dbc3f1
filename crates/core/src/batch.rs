//! Raw batch envelope as handed over by the transport
//!
//! The transport decodes the multipart request into an ordered list of
//! [`BatchPart`]s without judging legality. Validation happens later.

use crate::operation::Operation;

/// One part of a batch envelope
#[derive(Debug, Clone, PartialEq)]
pub enum BatchPart {
    /// A change-set: a group of operations to apply atomically
    ChangeSet(Vec<Operation>),
    /// An operation outside any change-set
    Operation(Operation),
}

/// An unvalidated batch request
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawBatch {
    /// Parts in request order
    pub parts: Vec<BatchPart>,
}

impl RawBatch {
    /// Empty batch
    pub fn new() -> Self {
        Self::default()
    }

    /// Batch holding a single change-set
    pub fn changeset(operations: Vec<Operation>) -> Self {
        RawBatch {
            parts: vec![BatchPart::ChangeSet(operations)],
        }
    }

    /// Batch holding a single standalone operation
    pub fn single(operation: Operation) -> Self {
        RawBatch {
            parts: vec![BatchPart::Operation(operation)],
        }
    }

    /// Append a change-set part
    pub fn with_changeset(mut self, operations: Vec<Operation>) -> Self {
        self.parts.push(BatchPart::ChangeSet(operations));
        self
    }

    /// Append a standalone operation part
    pub fn with_operation(mut self, operation: Operation) -> Self {
        self.parts.push(BatchPart::Operation(operation));
        self
    }

    /// Total operations across all parts
    pub fn operation_count(&self) -> usize {
        self.parts
            .iter()
            .map(|p| match p {
                BatchPart::ChangeSet(ops) => ops.len(),
                BatchPart::Operation(_) => 1,
            })
            .sum()
    }
}
