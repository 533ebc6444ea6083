//! Fixed-size worker pool with a bounded queue, consumed by the phase-1
//! driver (the producer) and fed recursively by scanners running on the
//! workers themselves.
//!
//! Grounded on the teacher's `core::WorkerPool` (thread spawn / shutdown
//! / stats shape); the task queue is swapped from an unbounded
//! `crossbeam::queue::SegQueue` plus busy-poll for a
//! `crossbeam::channel::bounded` queue, since spec.md §4.7 requires
//! `submit` to block rather than drop when the queue is full.

use std::cell::Cell;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use crossbeam::channel::{self, Receiver, Sender, TrySendError};

use crate::error::EngineError;
use crate::workunit::WorkUnit;

thread_local! {
    /// Set for the lifetime of a pool worker thread. Lets `submit`
    /// distinguish the producer (driver) thread, which should block on a
    /// full queue, from a worker recursing into `submit` from inside a
    /// running scanner, which must not block on itself.
    static ON_WORKER_THREAD: Cell<bool> = const { Cell::new(false) };
}

#[derive(Debug, Default)]
pub struct WorkerStats {
    pub tasks_executed: AtomicU64,
    pub tasks_submitted: AtomicU64,
    pub inline_recursions: AtomicU64,
    /// Cumulative time every worker spent blocked waiting for work —
    /// useful for diagnosing pool sizing (spec.md §4.1's "worker-wait
    /// metrics"; see SPEC_FULL.md §9.6).
    pub idle_time_ns: AtomicU64,
}

struct Shared {
    outstanding: AtomicUsize,
    done: (Mutex<()>, Condvar),
    shutting_down: std::sync::atomic::AtomicBool,
    stats: WorkerStats,
}

impl Shared {
    fn complete_one(&self) {
        if self.outstanding.fetch_sub(1, Ordering::SeqCst) == 1 {
            let _guard = self.done.0.lock().unwrap();
            self.done.1.notify_all();
        }
    }
}

pub struct WorkerPool {
    sender: Sender<WorkUnit>,
    receiver: Receiver<WorkUnit>,
    shared: Arc<Shared>,
    handles: Mutex<Vec<std::thread::JoinHandle<()>>>,
    capacity: usize,
}

/// Outcome of [`WorkerPool::join`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOutcome {
    Drained,
    TimedOut,
}

impl WorkerPool {
    /// Build a pool of `num_threads` workers backed by a bounded queue.
    /// The caller picks the capacity; the only hard requirement (per
    /// spec.md §4.7) is `capacity >= num_threads` so every worker can
    /// have at least one unit in flight without immediately blocking
    /// the producer.
    pub fn new(num_threads: usize, capacity: usize) -> Result<Arc<Self>, EngineError> {
        if num_threads == 0 {
            return Err(EngineError::PoolBuild("num_threads must be >= 1".into()));
        }
        let capacity = capacity.max(num_threads);
        let (sender, receiver) = channel::bounded(capacity);

        let pool = Arc::new(Self {
            sender,
            receiver,
            shared: Arc::new(Shared {
                outstanding: AtomicUsize::new(0),
                done: (Mutex::new(()), Condvar::new()),
                shutting_down: std::sync::atomic::AtomicBool::new(false),
                stats: WorkerStats::default(),
            }),
            handles: Mutex::new(Vec::with_capacity(num_threads)),
            capacity,
        });

        let mut handles = Vec::with_capacity(num_threads);
        for id in 0..num_threads {
            let pool = Arc::clone(&pool);
            let handle = std::thread::Builder::new()
                .name(format!("phase1-worker-{id}"))
                .spawn(move || pool.worker_loop())
                .map_err(|e| EngineError::PoolBuild(e.to_string()))?;
            handles.push(handle);
        }
        *pool.handles.lock().unwrap() = handles;

        Ok(pool)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Blocking enqueue; returns once queued (or, when called from
    /// inside a worker thread with a saturated queue, once the unit has
    /// run inline — see spec.md §4.7's reentrant drain rule).
    pub fn submit(&self, unit: WorkUnit) {
        self.shared.outstanding.fetch_add(1, Ordering::SeqCst);
        self.shared.stats.tasks_submitted.fetch_add(1, Ordering::Relaxed);

        let on_worker = ON_WORKER_THREAD.with(|f| f.get());
        if on_worker {
            match self.sender.try_send(unit) {
                Ok(()) => {}
                Err(TrySendError::Full(unit)) => {
                    self.shared.stats.inline_recursions.fetch_add(1, Ordering::Relaxed);
                    self.run_unit(unit);
                }
                Err(TrySendError::Disconnected(_unit)) => {
                    self.shared.complete_one();
                }
            }
        } else if self.sender.send(unit).is_err() {
            self.shared.complete_one();
        }
    }

    /// Block until every submitted unit has finished, or `deadline`
    /// elapses. Idempotent: calling again when nothing is outstanding
    /// returns immediately.
    pub fn join(&self, deadline: Option<Duration>) -> JoinOutcome {
        let start = Instant::now();
        let mut guard = self.shared.done.0.lock().unwrap();
        loop {
            if self.shared.outstanding.load(Ordering::SeqCst) == 0 {
                return JoinOutcome::Drained;
            }
            let remaining = match deadline {
                Some(d) => match d.checked_sub(start.elapsed()) {
                    Some(r) if !r.is_zero() => r,
                    _ => return JoinOutcome::TimedOut,
                },
                None => Duration::from_secs(3600),
            };
            let (g, timeout_result) = self.shared.done.1.wait_timeout(guard, remaining).unwrap();
            guard = g;
            if timeout_result.timed_out() && self.shared.outstanding.load(Ordering::SeqCst) != 0 {
                if deadline.is_some() {
                    return JoinOutcome::TimedOut;
                }
                // no deadline: a spurious wakeup, keep waiting
            }
        }
    }

    pub fn stats(&self) -> &WorkerStats {
        &self.shared.stats
    }

    /// Stop worker threads and join their handles. Not part of the
    /// external scanner-visible contract (spec.md §6 names only `new`,
    /// `submit`, `join`) — called once by the driver during
    /// finalization, after `join()` has drained or timed out.
    pub(crate) fn stop(&self) {
        self.shared.shutting_down.store(true, Ordering::SeqCst);
        let mut handles = self.handles.lock().unwrap();
        for handle in handles.drain(..) {
            let _ = handle.join();
        }
    }

    fn worker_loop(self: Arc<Self>) {
        ON_WORKER_THREAD.with(|f| f.set(true));
        loop {
            let wait_start = Instant::now();
            match self.receiver.recv_timeout(Duration::from_millis(50)) {
                Ok(unit) => {
                    self.shared
                        .stats
                        .idle_time_ns
                        .fetch_add(wait_start.elapsed().as_nanos() as u64, Ordering::Relaxed);
                    self.run_unit(unit);
                }
                Err(channel::RecvTimeoutError::Timeout) => {
                    self.shared
                        .stats
                        .idle_time_ns
                        .fetch_add(wait_start.elapsed().as_nanos() as u64, Ordering::Relaxed);
                    if self.shared.shutting_down.load(Ordering::SeqCst) {
                        return;
                    }
                }
                Err(channel::RecvTimeoutError::Disconnected) => return,
            }
        }
    }

    fn run_unit(&self, unit: WorkUnit) {
        unit.execute(self);
        self.shared.stats.tasks_executed.fetch_add(1, Ordering::Relaxed);
        self.shared.complete_one();
    }
}
