//! Batch worker pool
//!
//! A fixed set of named worker threads pulling batches from a bounded FIFO
//! queue. Each batch runs synchronously on one worker; only partition lock
//! acquisition blocks it. Submission returns a [`PendingBatch`] the caller
//! can wait on or cancel.

use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, error};

use tablestore_concurrency::CancelToken;
use tablestore_core::{BatchResult, ErrorCode, RawBatch, Rejection, TableError, TableResult};
use tablestore_storage::MetadataStore;

use crate::config::EngineConfig;
use crate::coordinator::BatchCoordinator;

/// Submission refused
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackpressureError {
    /// Queue is at capacity
    #[error("batch queue is full ({depth} pending)")]
    QueueFull {
        /// Queued batches at the time of refusal
        depth: usize,
    },
    /// Pool has been shut down
    #[error("batch worker pool is shut down")]
    ShutDown,
}

/// Pool metrics snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    /// Batches waiting in the queue
    pub queue_depth: usize,
    /// Batches currently running
    pub active_batches: usize,
    /// Batches finished since the pool started
    pub batches_completed: u64,
    /// Worker threads
    pub worker_count: usize,
}

type Job = Box<dyn FnOnce() + Send>;

struct PoolInner {
    queue: Mutex<VecDeque<Job>>,
    work_ready: Condvar,
    drain_cond: Condvar,
    shutdown: AtomicBool,
    queue_depth: AtomicUsize,
    active_batches: AtomicUsize,
    max_queue_depth: usize,
    batches_completed: AtomicU64,
}

/// Where a worker leaves a batch's result
#[derive(Default)]
struct ResultSlot {
    result: Mutex<Option<BatchResult>>,
    ready: Condvar,
}

impl ResultSlot {
    fn fill(&self, result: BatchResult) {
        *self.result.lock() = Some(result);
        self.ready.notify_all();
    }
}

/// Handle to a submitted batch
pub struct PendingBatch {
    slot: Arc<ResultSlot>,
    cancel: CancelToken,
}

impl PendingBatch {
    /// Block until the batch finishes
    pub fn wait(self) -> BatchResult {
        let mut result = self.slot.result.lock();
        loop {
            if let Some(done) = result.take() {
                return done;
            }
            self.slot.ready.wait(&mut result);
        }
    }

    /// Block up to `timeout`; `None` if the batch is still running
    ///
    /// The result stays in the handle, so later calls and [`wait`](Self::wait)
    /// return it again.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<BatchResult> {
        let deadline = Instant::now() + timeout;
        let mut result = self.slot.result.lock();
        while result.is_none() {
            if self.slot.ready.wait_until(&mut result, deadline).timed_out() {
                break;
            }
        }
        result.clone()
    }

    /// Ask for the batch to be abandoned
    ///
    /// Takes effect only if the batch has not reached its commit point; a
    /// cancelled batch is rejected with `Cancelled` and makes no changes.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Whether a result is available
    pub fn is_finished(&self) -> bool {
        self.slot.result.lock().is_some()
    }
}

/// Runs batches on a fixed pool of worker threads
///
/// Batches start in submission order. Workers are named
/// `tablestore-batch-0`, `tablestore-batch-1`, etc.
pub struct BatchWorkerPool {
    inner: Arc<PoolInner>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    num_threads: usize,
}

impl BatchWorkerPool {
    /// Create a pool with `num_threads` workers and a bounded queue
    ///
    /// # Errors
    ///
    /// `TableError::Config` if either size is zero, `TableError::Io` if a
    /// worker thread cannot be spawned.
    pub fn new(num_threads: usize, max_queue_depth: usize) -> TableResult<Self> {
        if num_threads == 0 || max_queue_depth == 0 {
            return Err(TableError::Config(format!(
                "batch worker pool needs at least one worker and one queue slot \
                 (got {} workers, depth {})",
                num_threads, max_queue_depth
            )));
        }

        let inner = Arc::new(PoolInner {
            queue: Mutex::new(VecDeque::new()),
            work_ready: Condvar::new(),
            drain_cond: Condvar::new(),
            shutdown: AtomicBool::new(false),
            queue_depth: AtomicUsize::new(0),
            active_batches: AtomicUsize::new(0),
            max_queue_depth,
            batches_completed: AtomicU64::new(0),
        });

        let pool = Self {
            inner,
            workers: Mutex::new(Vec::with_capacity(num_threads)),
            num_threads,
        };
        for i in 0..num_threads {
            let inner_clone = Arc::clone(&pool.inner);
            // On failure, dropping `pool` joins the workers already started
            let handle = std::thread::Builder::new()
                .name(format!("tablestore-batch-{}", i))
                .spawn(move || worker_loop(&inner_clone))?;
            pool.workers.lock().push(handle);
        }
        debug!(
            target: "tablestore::pool",
            workers = num_threads,
            max_queue_depth,
            "Batch worker pool started"
        );
        Ok(pool)
    }

    /// Pool sized by `worker_threads` / `max_queue_depth`
    ///
    /// # Errors
    ///
    /// Whatever [`EngineConfig::validate`] or [`BatchWorkerPool::new`]
    /// reports.
    pub fn from_config(config: &EngineConfig) -> TableResult<Self> {
        config.validate()?;
        Self::new(config.worker_threads, config.max_queue_depth)
    }

    /// Queue a batch for `coordinator` to run against `table`
    ///
    /// # Errors
    ///
    /// `BackpressureError` if the queue is full or the pool is shut down.
    pub fn submit<S: MetadataStore + 'static>(
        &self,
        coordinator: &Arc<BatchCoordinator<S>>,
        table: &str,
        batch: RawBatch,
    ) -> Result<PendingBatch, BackpressureError> {
        if self.inner.shutdown.load(Ordering::Acquire) {
            return Err(BackpressureError::ShutDown);
        }

        let slot = Arc::new(ResultSlot::default());
        let cancel = CancelToken::new();
        let job: Job = {
            let coordinator = Arc::clone(coordinator);
            let table = table.to_string();
            let slot = Arc::clone(&slot);
            let cancel = cancel.clone();
            Box::new(move || {
                let run = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                    coordinator.run_batch_with_cancel(&table, batch, &cancel)
                }));
                let result = run.unwrap_or_else(|_| {
                    BatchResult::Rejected(Rejection::batch(
                        ErrorCode::StoreUnavailable,
                        "batch worker panicked",
                    ))
                });
                slot.fill(result);
            })
        };

        {
            let mut queue = self.inner.queue.lock();
            let depth = self.inner.queue_depth.load(Ordering::Acquire);
            if depth >= self.inner.max_queue_depth {
                return Err(BackpressureError::QueueFull { depth });
            }
            queue.push_back(job);
            self.inner.queue_depth.fetch_add(1, Ordering::Release);
        }

        self.inner.work_ready.notify_one();
        Ok(PendingBatch { slot, cancel })
    }

    /// Block until all queued and running batches have finished
    ///
    /// Workers keep running afterwards.
    pub fn drain(&self) {
        let mut queue = self.inner.queue.lock();
        while self.inner.queue_depth.load(Ordering::Acquire) > 0
            || self.inner.active_batches.load(Ordering::Acquire) > 0
        {
            self.inner.drain_cond.wait(&mut queue);
        }
    }

    /// Stop accepting batches, finish the queued ones, join the workers
    pub fn shutdown(&self) {
        self.inner.shutdown.store(true, Ordering::Release);

        // Lock before notifying: a worker between its shutdown check and
        // its wait holds this lock, so it cannot miss the wakeup
        {
            let _queue = self.inner.queue.lock();
            self.inner.work_ready.notify_all();
        }

        let mut workers = self.workers.lock();
        for handle in workers.drain(..) {
            let _ = handle.join();
        }
        debug!(target: "tablestore::pool", "Batch worker pool shut down");
    }

    /// Metrics snapshot
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            queue_depth: self.inner.queue_depth.load(Ordering::Relaxed),
            active_batches: self.inner.active_batches.load(Ordering::Relaxed),
            batches_completed: self.inner.batches_completed.load(Ordering::Relaxed),
            worker_count: self.num_threads,
        }
    }
}

impl Drop for BatchWorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Decrements `active_batches` even if a job panics
struct ActiveBatchGuard<'a> {
    inner: &'a PoolInner,
}

impl<'a> Drop for ActiveBatchGuard<'a> {
    fn drop(&mut self) {
        let prev_active = self.inner.active_batches.fetch_sub(1, Ordering::Release);
        self.inner.batches_completed.fetch_add(1, Ordering::Relaxed);

        if prev_active == 1 && self.inner.queue_depth.load(Ordering::Acquire) == 0 {
            let _queue = self.inner.queue.lock();
            self.inner.drain_cond.notify_all();
        }
    }
}

fn worker_loop(inner: &PoolInner) {
    loop {
        let job = {
            let mut queue = inner.queue.lock();
            loop {
                if let Some(job) = queue.pop_front() {
                    inner.queue_depth.fetch_sub(1, Ordering::Release);
                    inner.active_batches.fetch_add(1, Ordering::Release);
                    break job;
                }
                if inner.shutdown.load(Ordering::Acquire) {
                    return;
                }
                inner.work_ready.wait(&mut queue);
            }
        };

        let _guard = ActiveBatchGuard { inner };
        if let Err(e) = std::panic::catch_unwind(std::panic::AssertUnwindSafe(job)) {
            error!(
                target: "tablestore::pool",
                "batch job panicked: {:?}",
                e.downcast_ref::<&str>().copied().unwrap_or("(non-string panic)")
            );
        }
    }
}
