//! Batch shape validation
//!
//! Every rule here is checked before any lock is taken or any store call is
//! made. Rules are evaluated in a fixed precedence order and the first
//! violation wins:
//!
//! 1. At most one change-set
//! 2. No retrieve alongside mutations (inside or outside the change-set)
//! 3. Envelope shape: non-empty batch, non-empty change-set, at most one
//!    standalone retrieve, no mutation outside a change-set
//! 4. Change-set operation count within the limit
//! 5. One partition key per change-set
//! 6. No repeated entity in a change-set (when configured)
//! 7. Per-operation key and payload limits
//!
//! Each rule is a full pass over the batch, so an earlier rule wins even
//! when a later rule's violation appears at a lower index.

use rustc_hash::FxHashSet;

use tablestore_core::{BatchPart, ErrorCode, Limits, Operation, RawBatch, Rejection};

/// Change-set that passed validation
///
/// Only [`ChangeSetValidator`] constructs these, so holding one means the
/// operations share a partition key and fit the configured limits.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeSet {
    partition_key: String,
    operations: Vec<Operation>,
}

impl ChangeSet {
    /// Partition every operation targets
    pub fn partition_key(&self) -> &str {
        &self.partition_key
    }

    /// Operations in submission order
    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    /// Number of operations
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    /// Always false for a validated change-set
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}

/// Batch that passed validation
#[derive(Debug, Clone, PartialEq)]
pub enum ValidatedBatch {
    /// One change-set of mutations
    ChangeSet(ChangeSet),
    /// One standalone retrieve
    Retrieve(Operation),
}

impl ValidatedBatch {
    /// Partition the batch must lock
    pub fn partition_key(&self) -> &str {
        match self {
            ValidatedBatch::ChangeSet(cs) => cs.partition_key(),
            ValidatedBatch::Retrieve(op) => &op.key.partition_key,
        }
    }

    /// Number of operations
    pub fn operation_count(&self) -> usize {
        match self {
            ValidatedBatch::ChangeSet(cs) => cs.len(),
            ValidatedBatch::Retrieve(_) => 1,
        }
    }
}

/// Checks a raw batch against the transactional rules
#[derive(Debug, Clone)]
pub struct ChangeSetValidator {
    limits: Limits,
    reject_duplicate_entities: bool,
}

impl Default for ChangeSetValidator {
    fn default() -> Self {
        Self::new(Limits::default())
    }
}

impl ChangeSetValidator {
    /// Validator with the given limits; duplicate entities are rejected
    pub fn new(limits: Limits) -> Self {
        ChangeSetValidator {
            limits,
            reject_duplicate_entities: true,
        }
    }

    /// Choose whether a change-set may target one entity more than once
    ///
    /// When allowed, later operations see the effects of earlier ones.
    pub fn reject_duplicate_entities(mut self, reject: bool) -> Self {
        self.reject_duplicate_entities = reject;
        self
    }

    /// Active limits
    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    /// Validate a batch
    ///
    /// # Errors
    ///
    /// The first rule violation, with the offending operation's index when
    /// one can be blamed. Change-set rules index into the change-set;
    /// envelope rules index into the batch part list.
    pub fn validate(&self, batch: RawBatch) -> Result<ValidatedBatch, Rejection> {
        self.check_envelope(&batch)?;

        let mut changeset = None;
        let mut retrieve = None;
        for part in batch.parts {
            match part {
                BatchPart::ChangeSet(ops) => changeset = Some(ops),
                BatchPart::Operation(op) => retrieve = Some(op),
            }
        }

        match (changeset, retrieve) {
            (Some(ops), _) => self.check_changeset(ops).map(ValidatedBatch::ChangeSet),
            (None, Some(op)) => {
                self.limits
                    .validate_key(&op.key)
                    .map_err(|e| Rejection::at(ErrorCode::InvalidEntity, 0, e.to_string()))?;
                Ok(ValidatedBatch::Retrieve(op))
            }
            (None, None) => Err(Rejection::batch(ErrorCode::InvalidBatch, "batch is empty")),
        }
    }

    /// Rules 1-3
    fn check_envelope(&self, batch: &RawBatch) -> Result<(), Rejection> {
        // Rule 1
        let mut changesets = batch
            .parts
            .iter()
            .enumerate()
            .filter(|(_, part)| matches!(part, BatchPart::ChangeSet(_)));
        changesets.next();
        if let Some((i, _)) = changesets.next() {
            return Err(Rejection::at(
                ErrorCode::MultipleChangesetsNotAllowed,
                i,
                "a batch may contain only one change-set",
            ));
        }

        // Rule 2
        let has_mutation = batch.parts.iter().any(|part| match part {
            BatchPart::ChangeSet(ops) => ops.iter().any(Operation::is_mutation),
            BatchPart::Operation(op) => op.is_mutation(),
        });
        let has_changeset = batch
            .parts
            .iter()
            .any(|part| matches!(part, BatchPart::ChangeSet(_)));
        if has_mutation || has_changeset {
            for (i, part) in batch.parts.iter().enumerate() {
                let position = match part {
                    BatchPart::ChangeSet(ops) => ops.iter().position(|op| !op.is_mutation()),
                    BatchPart::Operation(op) if !op.is_mutation() => Some(i),
                    BatchPart::Operation(_) => None,
                };
                if let Some(index) = position {
                    return Err(Rejection::at(
                        ErrorCode::RetrieveNotAllowedWithMutations,
                        index,
                        "retrieve cannot be combined with mutations",
                    ));
                }
            }
        }

        // Rule 3
        if batch.parts.is_empty() {
            return Err(Rejection::batch(ErrorCode::InvalidBatch, "batch is empty"));
        }
        let mut retrieves = 0;
        for (i, part) in batch.parts.iter().enumerate() {
            match part {
                BatchPart::ChangeSet(ops) if ops.is_empty() => {
                    return Err(Rejection::at(ErrorCode::InvalidBatch, i, "change-set is empty"));
                }
                BatchPart::ChangeSet(_) => {}
                BatchPart::Operation(op) if op.is_mutation() => {
                    return Err(Rejection::at(
                        ErrorCode::InvalidBatch,
                        i,
                        format!("{} must be inside a change-set", op.kind.name()),
                    ));
                }
                BatchPart::Operation(_) => {
                    retrieves += 1;
                    if retrieves > 1 {
                        return Err(Rejection::at(
                            ErrorCode::InvalidBatch,
                            i,
                            "a batch may contain only one standalone retrieve",
                        ));
                    }
                }
            }
        }
        Ok(())
    }

    /// Rules 4-7
    fn check_changeset(&self, operations: Vec<Operation>) -> Result<ChangeSet, Rejection> {
        // Rule 4
        let max = self.limits.max_operations_per_changeset;
        if operations.len() > max {
            return Err(Rejection::batch(
                ErrorCode::TooManyOperations,
                format!("{} operations exceeds maximum {}", operations.len(), max),
            ));
        }

        // Rule 5
        let partition_key = operations
            .first()
            .map(|op| op.key.partition_key.clone())
            .unwrap_or_default();
        if let Some(i) = operations
            .iter()
            .position(|op| op.key.partition_key != partition_key)
        {
            return Err(Rejection::at(
                ErrorCode::PartitionKeyMismatch,
                i,
                format!(
                    "partition key {:?} differs from {:?}",
                    operations[i].key.partition_key, partition_key
                ),
            ));
        }

        // Rule 6
        if self.reject_duplicate_entities {
            let mut seen = FxHashSet::default();
            for (i, op) in operations.iter().enumerate() {
                if !seen.insert(&op.key.row_key) {
                    return Err(Rejection::at(
                        ErrorCode::DuplicateEntityInChangeset,
                        i,
                        format!("entity {} already targeted in this change-set", op.key),
                    ));
                }
            }
        }

        // Rule 7
        for (i, op) in operations.iter().enumerate() {
            let checked = if op.kind.has_payload() {
                self.limits.validate_entity(&op.key, &op.properties)
            } else {
                self.limits.validate_key(&op.key)
            };
            if let Err(e) = checked {
                return Err(Rejection::at(
                    ErrorCode::InvalidEntity,
                    i,
                    format!("{} ({})", e, e.reason_code()),
                ));
            }
        }

        Ok(ChangeSet {
            partition_key,
            operations,
        })
    }
}
