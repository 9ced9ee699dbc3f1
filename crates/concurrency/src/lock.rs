//! Per-partition locking
//!
//! Batches touching the same `(table, PartitionKey)` are serialized; batches
//! on different partitions run concurrently. Each partition gets a ticket
//! lock so waiters are granted in arrival order (first-come-first-served).
//!
//! ## Lifecycle
//!
//! ```text
//! acquire() → entry(partition).or_insert(lock) → take ticket → wait for turn
//! guard dropped → now_serving += 1 → wake waiters → drop idle lock entry
//! ```
//!
//! Lock entries are removed once no holder or waiter references them, so
//! the table does not grow with every partition ever touched.

use dashmap::DashMap;
use parking_lot::{Condvar, Mutex};
use rustc_hash::FxHasher;
use std::collections::BTreeSet;
use std::hash::BuildHasherDefault;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{trace, warn};

use tablestore_core::{PartitionToken, TableError, TableResult};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct PartitionId {
    table: String,
    partition_key: String,
}

#[derive(Debug, Default)]
struct TicketState {
    next_ticket: u64,
    now_serving: u64,
    /// Tickets whose owners stopped waiting
    abandoned: BTreeSet<u64>,
}

impl TicketState {
    fn skip_abandoned(&mut self) {
        while self.abandoned.remove(&self.now_serving) {
            self.now_serving += 1;
        }
    }

    /// Holder plus live waiters
    fn contenders(&self) -> usize {
        (self.next_ticket - self.now_serving) as usize - self.abandoned.len()
    }
}

/// FIFO lock: tickets are granted strictly in the order they were taken
#[derive(Debug, Default)]
struct TicketLock {
    state: Mutex<TicketState>,
    turn: Condvar,
}

impl TicketLock {
    /// Returns false if `timeout` elapsed before our turn came
    fn lock(&self, timeout: Option<Duration>) -> bool {
        let mut state = self.state.lock();
        let ticket = state.next_ticket;
        state.next_ticket += 1;
        let deadline = timeout.map(|t| Instant::now() + t);

        loop {
            state.skip_abandoned();
            if state.now_serving == ticket {
                return true;
            }
            match deadline {
                None => self.turn.wait(&mut state),
                Some(deadline) => {
                    if self.turn.wait_until(&mut state, deadline).timed_out() {
                        state.skip_abandoned();
                        if state.now_serving == ticket {
                            return true;
                        }
                        state.abandoned.insert(ticket);
                        return false;
                    }
                }
            }
        }
    }

    fn unlock(&self) {
        {
            let mut state = self.state.lock();
            state.now_serving += 1;
            state.skip_abandoned();
        }
        self.turn.notify_all();
    }

    fn contenders(&self) -> usize {
        self.state.lock().contenders()
    }
}

#[derive(Debug, Default)]
struct LockTable {
    locks: DashMap<PartitionId, Arc<TicketLock>, BuildHasherDefault<FxHasher>>,
    next_lock_id: AtomicU64,
}

impl LockTable {
    /// Remove the entry if only the table itself still references it
    fn prune(&self, id: &PartitionId) {
        self.locks
            .remove_if(id, |_, lock| Arc::strong_count(lock) == 1 && lock.contenders() == 0);
    }
}

/// Grants exclusive access to one table partition at a time
#[derive(Debug, Clone, Default)]
pub struct PartitionLockManager {
    inner: Arc<LockTable>,
}

impl PartitionLockManager {
    /// Create a manager with no locks held
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the lock for `(table, partition_key)`
    ///
    /// Blocks until every earlier requester of the same partition has
    /// released it. `timeout = None` waits indefinitely.
    ///
    /// # Errors
    ///
    /// `TableError::Timeout` if the wait exceeds `timeout`. The abandoned
    /// place in the queue is skipped, so later waiters are unaffected.
    pub fn acquire(
        &self,
        table: &str,
        partition_key: &str,
        timeout: Option<Duration>,
    ) -> TableResult<PartitionGuard> {
        let id = PartitionId {
            table: table.to_string(),
            partition_key: partition_key.to_string(),
        };
        let lock = Arc::clone(
            self.inner
                .locks
                .entry(id.clone())
                .or_insert_with(|| Arc::new(TicketLock::default()))
                .value(),
        );

        if !lock.lock(timeout) {
            drop(lock);
            self.inner.prune(&id);
            let waited = timeout.unwrap_or_default();
            warn!(
                target: "tablestore::lock",
                table,
                partition = partition_key,
                waited_ms = waited.as_millis() as u64,
                "Partition lock wait timed out"
            );
            return Err(TableError::Timeout(waited));
        }

        let lock_id = self.inner.next_lock_id.fetch_add(1, Ordering::Relaxed);
        trace!(
            target: "tablestore::lock",
            table,
            partition = partition_key,
            lock_id,
            "Partition lock acquired"
        );

        Ok(PartitionGuard {
            table: Arc::clone(&self.inner),
            token: PartitionToken::new(table, partition_key, lock_id),
            id,
            lock: Some(lock),
        })
    }

    /// Holder plus waiters currently queued on a partition
    pub fn contenders(&self, table: &str, partition_key: &str) -> usize {
        let id = PartitionId {
            table: table.to_string(),
            partition_key: partition_key.to_string(),
        };
        self.inner
            .locks
            .get(&id)
            .map(|lock| lock.contenders())
            .unwrap_or(0)
    }

    /// Number of partitions with a live lock entry
    pub fn tracked_partitions(&self) -> usize {
        self.inner.locks.len()
    }
}

/// Held partition lock; released on drop
#[derive(Debug)]
pub struct PartitionGuard {
    table: Arc<LockTable>,
    token: PartitionToken,
    id: PartitionId,
    lock: Option<Arc<TicketLock>>,
}

impl PartitionGuard {
    /// Token scoping metadata store calls to this partition
    pub fn token(&self) -> &PartitionToken {
        &self.token
    }

    /// Locked table
    pub fn table(&self) -> &str {
        self.token.table()
    }

    /// Locked partition
    pub fn partition_key(&self) -> &str {
        self.token.partition_key()
    }
}

impl Drop for PartitionGuard {
    fn drop(&mut self) {
        if let Some(lock) = self.lock.take() {
            lock.unlock();
            drop(lock);
            self.table.prune(&self.id);
            trace!(
                target: "tablestore::lock",
                table = %self.id.table,
                partition = %self.id.partition_key,
                lock_id = self.token.lock_id(),
                "Partition lock released"
            );
        }
    }
}
