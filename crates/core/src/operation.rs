//! Batch operations
//!
//! An [`Operation`] targets exactly one entity. Mutating operations belong
//! in a change-set. A `Retrieve` may only appear alone in a batch.

use crate::entity::{ETag, EntityKey, IfMatch};
use crate::value::PropertyMap;

/// How an update treats properties the payload does not mention
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UpdateMode {
    /// Replace the whole property set
    Replace,
    /// Overwrite supplied properties, keep the rest
    Merge,
}

/// What an operation does
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    /// Create; fails if the entity exists
    Insert,
    /// Modify an existing entity; fails if absent or the ETag is stale
    Update(UpdateMode),
    /// Create or modify, never fails on existence (InsertOrReplace / InsertOrMerge)
    Upsert(UpdateMode),
    /// Remove an existing entity; fails if absent or the ETag is stale
    Delete,
    /// Read one entity
    Retrieve,
}

impl OperationKind {
    /// Whether the operation writes to the store
    pub fn is_mutation(&self) -> bool {
        !matches!(self, OperationKind::Retrieve)
    }

    /// Whether the operation carries a property payload
    pub fn has_payload(&self) -> bool {
        matches!(
            self,
            OperationKind::Insert | OperationKind::Update(_) | OperationKind::Upsert(_)
        )
    }

    /// Short name for logs
    pub fn name(&self) -> &'static str {
        match self {
            OperationKind::Insert => "insert",
            OperationKind::Update(UpdateMode::Replace) => "replace",
            OperationKind::Update(UpdateMode::Merge) => "merge",
            OperationKind::Upsert(UpdateMode::Replace) => "insert_or_replace",
            OperationKind::Upsert(UpdateMode::Merge) => "insert_or_merge",
            OperationKind::Delete => "delete",
            OperationKind::Retrieve => "retrieve",
        }
    }
}

/// A single operation inside a batch
#[derive(Debug, Clone, PartialEq)]
pub struct Operation {
    /// What to do
    pub kind: OperationKind,
    /// Target entity
    pub key: EntityKey,
    /// Property payload; empty for delete and retrieve
    pub properties: PropertyMap,
    /// Expected version for update and delete
    pub if_match: IfMatch,
    /// Whether the response should carry the resulting entity
    pub echo_content: bool,
}

impl Operation {
    fn build(kind: OperationKind, key: EntityKey, properties: PropertyMap) -> Self {
        Operation {
            kind,
            key,
            properties,
            if_match: IfMatch::Any,
            echo_content: false,
        }
    }

    /// Insert a new entity
    pub fn insert(key: EntityKey, properties: PropertyMap) -> Self {
        Self::build(OperationKind::Insert, key, properties)
    }

    /// Replace an existing entity's properties
    pub fn replace(key: EntityKey, properties: PropertyMap) -> Self {
        Self::build(OperationKind::Update(UpdateMode::Replace), key, properties)
    }

    /// Merge properties into an existing entity
    pub fn merge(key: EntityKey, properties: PropertyMap) -> Self {
        Self::build(OperationKind::Update(UpdateMode::Merge), key, properties)
    }

    /// Insert, or replace if present
    pub fn insert_or_replace(key: EntityKey, properties: PropertyMap) -> Self {
        Self::build(OperationKind::Upsert(UpdateMode::Replace), key, properties)
    }

    /// Insert, or merge if present
    pub fn insert_or_merge(key: EntityKey, properties: PropertyMap) -> Self {
        Self::build(OperationKind::Upsert(UpdateMode::Merge), key, properties)
    }

    /// Delete an existing entity
    pub fn delete(key: EntityKey) -> Self {
        Self::build(OperationKind::Delete, key, PropertyMap::new())
    }

    /// Read one entity
    pub fn retrieve(key: EntityKey) -> Self {
        Self::build(OperationKind::Retrieve, key, PropertyMap::new())
    }

    /// Require the stored entity to carry `etag`
    pub fn with_etag(mut self, etag: ETag) -> Self {
        self.if_match = IfMatch::ETag(etag);
        self
    }

    /// Set the If-Match precondition
    pub fn with_if_match(mut self, if_match: IfMatch) -> Self {
        self.if_match = if_match;
        self
    }

    /// Ask for the resulting entity in the response
    pub fn echo(mut self, echo_content: bool) -> Self {
        self.echo_content = echo_content;
        self
    }

    /// Whether this operation writes
    pub fn is_mutation(&self) -> bool {
        self.kind.is_mutation()
    }
}
