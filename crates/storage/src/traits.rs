//! Metadata store abstraction
//!
//! The batch engine consumes persistence through [`MetadataStore`] so the
//! in-memory store can be swapped for a durable one without touching the
//! executor. Every entity call is scoped by the [`PartitionToken`] of a held
//! partition lock; implementations must reject keys outside it.
//!
//! Thread safety: all methods must be safe to call concurrently from
//! multiple threads (requires Send + Sync).

use std::sync::Arc;

use tablestore_core::{ETag, Entity, EntityKey, PartitionToken, PropertyMap, TableResult};

/// One mutation staged by the executor, applied at commit
#[derive(Debug, Clone, PartialEq)]
pub enum StagedWrite {
    /// Create or fully replace the entity with these properties
    Put {
        /// Target entity
        key: EntityKey,
        /// Complete final property set
        properties: PropertyMap,
    },
    /// Remove the entity
    Remove {
        /// Target entity
        key: EntityKey,
    },
}

impl StagedWrite {
    /// Target entity
    pub fn key(&self) -> &EntityKey {
        match self {
            StagedWrite::Put { key, .. } | StagedWrite::Remove { key } => key,
        }
    }
}

/// Persistence layer holding tables and their entities
pub trait MetadataStore: Send + Sync {
    /// Whether the table exists
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be reached.
    fn table_exists(&self, table: &str) -> TableResult<bool>;

    /// Current entity for `key`, or `None` if absent
    ///
    /// # Errors
    ///
    /// Returns `TableNotFound` for an unknown table, `InvalidInput` if the
    /// token does not cover the key, or `StoreUnavailable`.
    fn get(
        &self,
        table: &str,
        key: &EntityKey,
        token: &PartitionToken,
    ) -> TableResult<Option<Entity>>;

    /// Unconditionally create or replace an entity, returning its new ETag
    ///
    /// Only called after precondition checks have passed.
    ///
    /// # Errors
    ///
    /// Same as [`MetadataStore::get`].
    fn put(
        &self,
        table: &str,
        key: EntityKey,
        properties: PropertyMap,
        token: &PartitionToken,
    ) -> TableResult<ETag>;

    /// Remove an entity; returns whether it existed
    ///
    /// # Errors
    ///
    /// Same as [`MetadataStore::get`].
    fn remove(&self, table: &str, key: &EntityKey, token: &PartitionToken) -> TableResult<bool>;

    /// Apply a staged write list in order
    ///
    /// Returns, per write, the stored entity for a put and `None` for a
    /// remove. The default applies writes one by one; under the partition
    /// lock that is invisible to other batches, but plain readers may see
    /// a prefix. Stores that can publish the whole list at once should
    /// override this.
    ///
    /// # Errors
    ///
    /// Same as [`MetadataStore::get`].
    fn commit(
        &self,
        table: &str,
        writes: Vec<StagedWrite>,
        token: &PartitionToken,
    ) -> TableResult<Vec<Option<Entity>>> {
        let mut applied = Vec::with_capacity(writes.len());
        for write in writes {
            match write {
                StagedWrite::Put { key, properties } => {
                    self.put(table, key.clone(), properties, token)?;
                    applied.push(self.get(table, &key, token)?);
                }
                StagedWrite::Remove { key } => {
                    self.remove(table, &key, token)?;
                    applied.push(None);
                }
            }
        }
        Ok(applied)
    }
}

impl<S: MetadataStore + ?Sized> MetadataStore for Arc<S> {
    fn table_exists(&self, table: &str) -> TableResult<bool> {
        (**self).table_exists(table)
    }

    fn get(
        &self,
        table: &str,
        key: &EntityKey,
        token: &PartitionToken,
    ) -> TableResult<Option<Entity>> {
        (**self).get(table, key, token)
    }

    fn put(
        &self,
        table: &str,
        key: EntityKey,
        properties: PropertyMap,
        token: &PartitionToken,
    ) -> TableResult<ETag> {
        (**self).put(table, key, properties, token)
    }

    fn remove(&self, table: &str, key: &EntityKey, token: &PartitionToken) -> TableResult<bool> {
        (**self).remove(table, key, token)
    }

    fn commit(
        &self,
        table: &str,
        writes: Vec<StagedWrite>,
        token: &PartitionToken,
    ) -> TableResult<Vec<Option<Entity>>> {
        (**self).commit(table, writes, token)
    }
}
