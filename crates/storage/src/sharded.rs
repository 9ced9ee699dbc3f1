//! Sharded in-memory metadata store
//!
//! # Design
//!
//! - DashMap of tables, each a DashMap of partitions
//! - Partition = `Shard`: BTreeMap of row key → entity, so rows iterate in key order
//! - A commit holds the partition's DashMap entry for the whole write list,
//!   so readers observe either none or all of a change-set
//! - Different partitions never contend beyond DashMap shard hashing
//!
//! ETags and timestamps come from a store-wide [`MonotonicClock`] with
//! 100ns resolution, matching the precision ETags print with. Two writes
//! never share a timestamp, so two versions never share an ETag.

use chrono::{DateTime, TimeZone, Utc};
use dashmap::DashMap;
use rustc_hash::FxHasher;
use std::collections::BTreeMap;
use std::hash::BuildHasherDefault;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tracing::{debug, trace};

use tablestore_core::{
    ETag, Entity, EntityKey, PartitionToken, PropertyMap, TableError, TableResult,
};

use crate::traits::{MetadataStore, StagedWrite};

type FxDashMap<K, V> = DashMap<K, V, BuildHasherDefault<FxHasher>>;

/// Strictly increasing UTC clock with 100ns ticks
#[derive(Debug, Default)]
pub struct MonotonicClock {
    last_tick: AtomicI64,
}

impl MonotonicClock {
    /// Create a clock
    pub fn new() -> Self {
        Self::default()
    }

    /// Next timestamp; always later than every previous one
    pub fn tick(&self) -> DateTime<Utc> {
        let now = Utc::now().timestamp_nanos_opt().unwrap_or(0) / 100;
        let prev = self
            .last_tick
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |last| {
                Some(now.max(last + 1))
            })
            .unwrap_or_else(|last| last);
        let tick = now.max(prev + 1);
        Utc.timestamp_nanos(tick.saturating_mul(100))
    }
}

/// One partition's rows, ordered by row key
#[derive(Debug, Default)]
pub struct Shard {
    pub(crate) rows: BTreeMap<String, Entity>,
}

impl Shard {
    /// Number of entities in this partition
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Check if partition is empty
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[derive(Debug, Default)]
struct TableData {
    partitions: FxDashMap<String, Shard>,
}

/// In-memory metadata store
///
/// # Example
///
/// ```ignore
/// use tablestore_storage::ShardedStore;
///
/// let store = ShardedStore::new();
/// store.create_table("people")?;
/// ```
#[derive(Debug, Default)]
pub struct ShardedStore {
    tables: FxDashMap<String, Arc<TableData>>,
    clock: MonotonicClock,
}

impl ShardedStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a table
    ///
    /// # Errors
    ///
    /// `TableAlreadyExists` if the name is taken.
    pub fn create_table(&self, name: &str) -> TableResult<()> {
        match self.tables.entry(name.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                Err(TableError::TableAlreadyExists(name.to_string()))
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(Arc::new(TableData::default()));
                debug!(target: "tablestore::store", table = name, "Table created");
                Ok(())
            }
        }
    }

    /// Drop a table and all its entities
    ///
    /// # Errors
    ///
    /// `TableNotFound` if absent.
    pub fn delete_table(&self, name: &str) -> TableResult<()> {
        if self.tables.remove(name).is_none() {
            return Err(TableError::TableNotFound(name.to_string()));
        }
        debug!(target: "tablestore::store", table = name, "Table deleted");
        Ok(())
    }

    /// Table names in sorted order
    pub fn list_tables(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tables.iter().map(|t| t.key().clone()).collect();
        names.sort();
        names
    }

    /// Read an entity without holding a partition lock
    ///
    /// Sees only committed state: a change-set is published all at once.
    pub fn peek(&self, table: &str, key: &EntityKey) -> TableResult<Option<Entity>> {
        let data = self.table(table)?;
        let entity = data
            .partitions
            .get(&key.partition_key)
            .and_then(|shard| shard.rows.get(&key.row_key).cloned());
        Ok(entity)
    }

    /// Every entity in the table, ordered by `(PartitionKey, RowKey)`
    pub fn snapshot(&self, table: &str) -> TableResult<Vec<Entity>> {
        let data = self.table(table)?;
        let mut partitions: Vec<(String, Vec<Entity>)> = data
            .partitions
            .iter()
            .map(|shard| (shard.key().clone(), shard.rows.values().cloned().collect()))
            .collect();
        partitions.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(partitions.into_iter().flat_map(|(_, rows)| rows).collect())
    }

    /// Number of entities in the table
    pub fn entity_count(&self, table: &str) -> TableResult<usize> {
        let data = self.table(table)?;
        let count = data.partitions.iter().map(|shard| shard.len()).sum();
        Ok(count)
    }

    fn table(&self, name: &str) -> TableResult<Arc<TableData>> {
        self.tables
            .get(name)
            .map(|t| Arc::clone(t.value()))
            .ok_or_else(|| TableError::TableNotFound(name.to_string()))
    }

    fn stamp(&self, key: EntityKey, properties: PropertyMap) -> Entity {
        let timestamp = self.clock.tick();
        Entity {
            key,
            properties,
            etag: ETag::from_timestamp(timestamp),
            timestamp,
        }
    }
}

impl MetadataStore for ShardedStore {
    fn table_exists(&self, table: &str) -> TableResult<bool> {
        Ok(self.tables.contains_key(table))
    }

    fn get(
        &self,
        table: &str,
        key: &EntityKey,
        token: &PartitionToken,
    ) -> TableResult<Option<Entity>> {
        token.check(table, key)?;
        self.peek(table, key)
    }

    fn put(
        &self,
        table: &str,
        key: EntityKey,
        properties: PropertyMap,
        token: &PartitionToken,
    ) -> TableResult<ETag> {
        token.check(table, &key)?;
        let data = self.table(table)?;
        let entity = self.stamp(key, properties);
        let etag = entity.etag.clone();
        data.partitions
            .entry(entity.key.partition_key.clone())
            .or_default()
            .rows
            .insert(entity.key.row_key.clone(), entity);
        Ok(etag)
    }

    fn remove(&self, table: &str, key: &EntityKey, token: &PartitionToken) -> TableResult<bool> {
        token.check(table, key)?;
        let data = self.table(table)?;
        let existed = match data.partitions.get_mut(&key.partition_key) {
            Some(mut shard) => shard.rows.remove(&key.row_key).is_some(),
            None => false,
        };
        data.partitions
            .remove_if(&key.partition_key, |_, shard| shard.is_empty());
        Ok(existed)
    }

    fn commit(
        &self,
        table: &str,
        writes: Vec<StagedWrite>,
        token: &PartitionToken,
    ) -> TableResult<Vec<Option<Entity>>> {
        for write in &writes {
            token.check(table, write.key())?;
        }
        let data = self.table(table)?;
        let partition_key = token.partition_key().to_string();

        let mut applied = Vec::with_capacity(writes.len());
        {
            // Holding the entry excludes readers of this partition until every
            // write is in place
            let mut shard = data.partitions.entry(partition_key.clone()).or_default();
            for write in writes {
                match write {
                    StagedWrite::Put { key, properties } => {
                        let entity = self.stamp(key, properties);
                        shard
                            .rows
                            .insert(entity.key.row_key.clone(), entity.clone());
                        applied.push(Some(entity));
                    }
                    StagedWrite::Remove { key } => {
                        shard.rows.remove(&key.row_key);
                        applied.push(None);
                    }
                }
            }
        }
        data.partitions
            .remove_if(&partition_key, |_, shard| shard.is_empty());

        trace!(
            target: "tablestore::store",
            table,
            partition = %partition_key,
            writes = applied.len(),
            "Change-set applied"
        );
        Ok(applied)
    }
}
