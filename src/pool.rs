//! Worker pools.
//!
//! Jobs run on named worker threads fed from a queue. A pool keeps its core
//! workers alive and, like a cached thread pool, starts another worker
//! whenever more jobs are queued than there are idle workers, up to an
//! optional maximum. Workers above the core count retire after sitting idle
//! for the keep-alive period.
//!
//! Dropping the pool closes the queue: workers drain what is already queued,
//! then exit and are joined.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender, TrySendError};

use crate::error::{DispatchError, DispatchResult, ExecutionError};

pub(crate) type Job = Box<dyn FnOnce() + Send + 'static>;

/// Thread and queue limits of one pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PoolSizing {
    /// Workers kept alive even when idle.
    pub(crate) core: usize,
    /// Upper bound on live workers; `None` grows without limit.
    pub(crate) max: Option<usize>,
    /// Queue bound; `None` is unbounded.
    pub(crate) queue_capacity: Option<usize>,
    /// Idle time after which a worker above `core` retires.
    pub(crate) keep_alive: Duration,
}

impl PoolSizing {
    /// A pool that never grows past `workers`.
    pub(crate) fn fixed(workers: usize, queue_capacity: Option<usize>) -> Self {
        Self {
            core: workers,
            max: Some(workers),
            queue_capacity,
            keep_alive: Duration::from_secs(60),
        }
    }

    fn normalized(self) -> Self {
        let core = self.core.max(1);
        Self {
            core,
            max: self.max.map(|m| m.max(core)),
            queue_capacity: self.queue_capacity.map(|c| c.max(1)),
            keep_alive: self.keep_alive,
        }
    }
}

/// Shared worker bookkeeping.
///
/// `pending` counts submitted jobs no worker has taken yet. It is raised
/// before the send, so a worker can never take a job it does not cover.
#[derive(Debug, Default)]
struct Counters {
    live: AtomicUsize,
    idle: AtomicUsize,
    pending: AtomicUsize,
    spawned: AtomicUsize,
}

impl Counters {
    /// Give up one worker slot if above `core` and nothing is queued.
    fn try_retire(&self, core: usize, rx: &Receiver<Job>) -> bool {
        if self
            .live
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| (n > core).then(|| n - 1))
            .is_err()
        {
            return false;
        }
        if rx.is_empty() {
            return true;
        }
        self.live.fetch_add(1, Ordering::SeqCst);
        false
    }
}

#[derive(Debug)]
pub(crate) struct WorkerPool {
    name: String,
    prefix: String,
    sizing: PoolSizing,
    tx: Option<Sender<Job>>,
    rx: Receiver<Job>,
    counters: Arc<Counters>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    pub(crate) fn start(name: &str, prefix: &str, sizing: PoolSizing) -> DispatchResult<Self> {
        let sizing = sizing.normalized();
        let (tx, rx) = match sizing.queue_capacity {
            Some(capacity) => bounded::<Job>(capacity),
            None => unbounded::<Job>(),
        };

        let pool = Self {
            name: name.to_string(),
            prefix: prefix.to_string(),
            sizing,
            tx: Some(tx),
            rx,
            counters: Arc::new(Counters::default()),
            workers: Mutex::new(Vec::with_capacity(sizing.core)),
        };
        for _ in 0..sizing.core {
            pool.spawn_worker()?;
        }

        tracing::debug!(
            pool = name,
            core = sizing.core,
            max = ?sizing.max,
            queue_capacity = ?sizing.queue_capacity,
            "worker pool started"
        );

        Ok(pool)
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    /// Number of workers currently alive.
    pub(crate) fn live_workers(&self) -> usize {
        self.counters.live.load(Ordering::SeqCst)
    }

    /// Queue a job without blocking; fails only when a bounded queue is full.
    pub(crate) fn try_submit(&self, job: Job) -> DispatchResult<()> {
        let tx = self.sender()?;
        self.counters.pending.fetch_add(1, Ordering::SeqCst);
        match tx.try_send(job) {
            Ok(()) => {
                self.grow_if_busy();
                Ok(())
            }
            Err(err) => {
                self.counters.pending.fetch_sub(1, Ordering::SeqCst);
                match err {
                    TrySendError::Full(_) => {
                        Err(DispatchError::Execution(ExecutionError::QueueFull {
                            pool: self.name.clone(),
                            capacity: self.sizing.queue_capacity.unwrap_or(usize::MAX),
                        }))
                    }
                    TrySendError::Disconnected(_) => Err(self.disconnected()),
                }
            }
        }
    }

    /// Queue a job, blocking while a bounded queue is full.
    pub(crate) fn submit(&self, job: Job) -> DispatchResult<()> {
        let tx = self.sender()?;
        self.counters.pending.fetch_add(1, Ordering::SeqCst);
        if tx.send(job).is_err() {
            self.counters.pending.fetch_sub(1, Ordering::SeqCst);
            return Err(self.disconnected());
        }
        self.grow_if_busy();
        Ok(())
    }

    /// Start one more worker if queued jobs outnumber idle workers.
    fn grow_if_busy(&self) {
        let pending = self.counters.pending.load(Ordering::SeqCst);
        if pending <= self.counters.idle.load(Ordering::SeqCst) {
            return;
        }
        if self.sizing.max.is_some_and(|max| self.live_workers() >= max) {
            return;
        }
        match self.spawn_worker() {
            Ok(()) => {
                let workers = self.live_workers();
                tracing::trace!(pool = %self.name, workers, "worker pool grew");
            }
            Err(err) => {
                tracing::warn!(pool = %self.name, error = %err, "could not grow worker pool");
            }
        }
    }

    fn spawn_worker(&self) -> DispatchResult<()> {
        let idx = self.counters.spawned.fetch_add(1, Ordering::SeqCst);
        let thread_name = format!("{}-{}-{idx}", self.prefix, self.name);
        let pool_name = self.name.clone();
        let rx = self.rx.clone();
        let counters = Arc::clone(&self.counters);
        let PoolSizing { core, keep_alive, .. } = self.sizing;

        self.counters.live.fetch_add(1, Ordering::SeqCst);
        let spawned = thread::Builder::new()
            .name(thread_name.clone())
            .spawn(move || run_worker(&pool_name, &rx, &counters, core, keep_alive));

        match spawned {
            Ok(handle) => {
                let mut workers = self.workers.lock().unwrap_or_else(PoisonError::into_inner);
                workers.retain(|h| !h.is_finished());
                workers.push(handle);
                Ok(())
            }
            Err(e) => {
                self.counters.live.fetch_sub(1, Ordering::SeqCst);
                Err(ExecutionError::WorkerSpawn {
                    name: thread_name,
                    message: e.to_string(),
                }
                .into())
            }
        }
    }

    fn sender(&self) -> DispatchResult<&Sender<Job>> {
        self.tx.as_ref().ok_or_else(|| self.disconnected())
    }

    fn disconnected(&self) -> DispatchError {
        DispatchError::Execution(ExecutionError::Disconnected {
            pool: self.name.clone(),
        })
    }

    /// Close the queue without joining; later submissions fail.
    #[cfg(test)]
    pub(crate) fn close(&mut self) {
        drop(self.tx.take());
    }
}

fn run_worker(
    pool: &str,
    rx: &Receiver<Job>,
    counters: &Counters,
    core: usize,
    keep_alive: Duration,
) {
    loop {
        counters.idle.fetch_add(1, Ordering::SeqCst);
        let next = rx.recv_timeout(keep_alive);
        counters.idle.fetch_sub(1, Ordering::SeqCst);

        match next {
            Ok(job) => {
                counters.pending.fetch_sub(1, Ordering::SeqCst);
                // Tasks isolate callback panics themselves; this keeps the
                // worker alive if anything else unwinds.
                if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
                    tracing::error!(pool, "worker job panicked");
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                if counters.try_retire(core, rx) {
                    tracing::trace!(pool, "idle worker retired");
                    return;
                }
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    counters.live.fetch_sub(1, Ordering::SeqCst);
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        // Close the channel: workers drain queued jobs then exit.
        drop(self.tx.take());

        // The last reference may be released by one of our own workers
        // (a callback dropping a future); that thread cannot join itself.
        let current = thread::current().id();
        let handles: Vec<JoinHandle<()>> = self
            .workers
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        for handle in handles {
            if handle.thread().id() == current {
                continue;
            }
            let _ = handle.join();
        }
        tracing::debug!(pool = %self.name, "worker pool stopped");
    }
}
