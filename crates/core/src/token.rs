//! Partition lock tokens
//!
//! Metadata store calls are scoped by the token of a held partition lock.
//! The store checks that every key it is asked to touch lies inside the
//! token's partition. It does not check that the lock is still held: a
//! token is a scope, and holding the guard that issued it is the caller's
//! responsibility.

use crate::entity::EntityKey;
use crate::error::{TableError, TableResult};

/// Scope of one table partition, as issued with a partition lock
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PartitionToken {
    table: String,
    partition_key: String,
    lock_id: u64,
}

impl PartitionToken {
    /// Issue a token; called by the partition lock manager on acquisition
    pub fn new(table: impl Into<String>, partition_key: impl Into<String>, lock_id: u64) -> Self {
        PartitionToken {
            table: table.into(),
            partition_key: partition_key.into(),
            lock_id,
        }
    }

    /// Table the lock covers
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Partition the lock covers
    pub fn partition_key(&self) -> &str {
        &self.partition_key
    }

    /// Acquisition sequence number, unique per lock manager
    pub fn lock_id(&self) -> u64 {
        self.lock_id
    }

    /// Ensure `key` in `table` is covered by this token
    pub fn check(&self, table: &str, key: &EntityKey) -> TableResult<()> {
        if self.table != table || self.partition_key != key.partition_key {
            return Err(TableError::invalid_input(format!(
                "lock token for {}/{} does not cover {}/{}",
                self.table, self.partition_key, table, key.partition_key
            )));
        }
        Ok(())
    }
}
