//! Parallel per-origin scheduling
//!
//! One unit of work per origin zone runs on a fixed rayon pool. Admission is
//! bounded by a gate whose size is independent of the thread count, so the
//! number of origins holding result memory at the same time can be capped
//! separately from CPU parallelism. The dispatching thread is never a pool
//! worker: it blocks on the gate while workers drain admitted units.
//!
//! Per-worker scratch (heap, tree, accumulator, potential buffer) lives in a
//! worker-indexed pool, created on a worker's first unit and reused for every
//! later one.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tokio_util::sync::CancellationToken;

use odflow_common::{Error, Result};

use crate::config::SchedulerConfig;

// =============================================================================
// ADMISSION GATE
// =============================================================================

/// Counting semaphore with RAII permits
pub struct AdmissionGate {
    available: Mutex<usize>,
    freed: Condvar,
    size: usize,
}

impl AdmissionGate {
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            available: Mutex::new(size),
            freed: Condvar::new(),
            size,
        }
    }

    /// Block until a slot is free and take it
    pub fn acquire(&self) -> GatePermit<'_> {
        let mut available = self.available.lock();
        while *available == 0 {
            self.freed.wait(&mut available);
        }
        *available -= 1;
        GatePermit { gate: self }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Slots not currently held
    pub fn available(&self) -> usize {
        *self.available.lock()
    }
}

/// A held gate slot, released on drop (including unwinding)
pub struct GatePermit<'a> {
    gate: &'a AdmissionGate,
}

impl Drop for GatePermit<'_> {
    fn drop(&mut self) {
        *self.gate.available.lock() += 1;
        self.gate.freed.notify_one();
    }
}

// =============================================================================
// WORKER SCRATCH
// =============================================================================

/// Lazily created scratch state, one slot per pool worker
///
/// A slot is only ever locked by the worker owning it, so the lock is never
/// contended. The last slot serves callers outside the pool.
pub struct WorkerScratchPool<S> {
    slots: Vec<Mutex<Option<S>>>,
}

impl<S> WorkerScratchPool<S> {
    pub fn new(workers: usize) -> Self {
        Self {
            slots: (0..workers + 1).map(|_| Mutex::new(None)).collect(),
        }
    }

    /// Run `f` on the current worker's scratch, creating it with `init` first
    /// if this worker has none yet
    pub fn with<R>(&self, init: impl FnOnce() -> S, f: impl FnOnce(&mut S) -> R) -> R {
        let outside = self.slots.len() - 1;
        let index = rayon::current_thread_index().map_or(outside, |i| i.min(outside));
        let mut slot = self.slots[index].lock();
        f(slot.get_or_insert_with(init))
    }

    /// Number of workers that created scratch
    pub fn initialized(&self) -> usize {
        self.slots.iter().filter(|s| s.lock().is_some()).count()
    }
}

// =============================================================================
// PROGRESS
// =============================================================================

struct Progress {
    total: usize,
    done: AtomicUsize,
    found: AtomicUsize,
    interval: Duration,
    last_report: Mutex<Instant>,
}

impl Progress {
    fn new(total: usize, interval: Duration) -> Self {
        Self {
            total,
            done: AtomicUsize::new(0),
            found: AtomicUsize::new(0),
            interval,
            last_report: Mutex::new(Instant::now()),
        }
    }

    fn record(&self, found: usize) {
        let done = self.done.fetch_add(1, Ordering::Relaxed) + 1;
        let found = self.found.fetch_add(found, Ordering::Relaxed) + found;

        // whoever holds the lock reports; the others skip
        if let Some(mut last) = self.last_report.try_lock() {
            if last.elapsed() >= self.interval {
                *last = Instant::now();
                tracing::info!(
                    origins_done = done,
                    origins_total = self.total,
                    pairs_found = found,
                    "progress"
                );
            }
        }
    }
}

// =============================================================================
// SCHEDULER
// =============================================================================

pub struct ParallelOriginScheduler {
    pool: rayon::ThreadPool,
    max_in_flight: usize,
    progress_interval: Duration,
}

impl ParallelOriginScheduler {
    pub fn new(config: &SchedulerConfig) -> Result<Self> {
        config.validate()?;
        let threads = config.resolved_threads();
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("odflow-worker-{i}"))
            .build()
            .map_err(|e| Error::Config(format!("cannot start worker pool: {e}")))?;

        Ok(Self {
            pool,
            max_in_flight: config.resolved_max_in_flight(),
            progress_interval: config.progress_interval(),
        })
    }

    pub fn worker_threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight
    }

    /// Run `work(origin, scratch)` for every origin in `0..nr_origins`
    ///
    /// Returns the sum of the counts returned by the units, or `None` when the
    /// token was cancelled; outputs written by the units are then undefined.
    pub fn run<S, I, F>(
        &self,
        nr_origins: usize,
        cancel: &CancellationToken,
        make_scratch: I,
        work: F,
    ) -> Option<usize>
    where
        S: Send,
        I: Fn() -> S + Sync,
        F: Fn(usize, &mut S) -> usize + Sync,
    {
        if cancel.is_cancelled() {
            return None;
        }

        let gate = AdmissionGate::new(self.max_in_flight);
        let scratch = WorkerScratchPool::new(self.worker_threads());
        let progress = Progress::new(nr_origins, self.progress_interval);
        let total = AtomicUsize::new(0);

        let (gate, scratch, progress, total) = (&gate, &scratch, &progress, &total);
        let (make_scratch, work) = (&make_scratch, &work);

        self.pool.in_place_scope(|scope| {
            for origin in 0..nr_origins {
                if cancel.is_cancelled() {
                    break;
                }
                let permit = gate.acquire();
                scope.spawn(move |_| {
                    let _permit = permit;
                    if cancel.is_cancelled() {
                        return;
                    }
                    let found = scratch.with(make_scratch, |s| work(origin, s));
                    total.fetch_add(found, Ordering::Relaxed);
                    progress.record(found);
                });
            }
        });

        if cancel.is_cancelled() {
            tracing::info!(
                origins_done = progress.done.load(Ordering::Relaxed),
                origins_total = nr_origins,
                "cancelled"
            );
            return None;
        }

        tracing::debug!(
            workers = self.worker_threads(),
            scratch_created = scratch.initialized(),
            max_in_flight = self.max_in_flight,
            "scheduler finished"
        );
        Some(total.load(Ordering::Relaxed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;

    fn scheduler(threads: usize, max_in_flight: usize) -> ParallelOriginScheduler {
        ParallelOriginScheduler::new(&SchedulerConfig {
            worker_threads: threads,
            max_in_flight,
            progress_interval_secs: 5,
        })
        .unwrap()
    }

    #[test]
    fn test_gate_permit_released_on_drop() {
        let gate = AdmissionGate::new(2);
        let a = gate.acquire();
        let _b = gate.acquire();
        assert_eq!(gate.available(), 0);
        drop(a);
        assert_eq!(gate.available(), 1);
    }

    #[test]
    fn test_gate_released_on_panic() {
        let gate = AdmissionGate::new(1);
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _permit = gate.acquire();
            panic!("unit failed");
        }));
        assert!(result.is_err());
        assert_eq!(gate.available(), 1);
    }

    #[test]
    fn test_runs_every_origin_once() {
        let sched = scheduler(4, 2);
        let seen: Vec<AtomicUsize> = (0..100).map(|_| AtomicUsize::new(0)).collect();
        let total = sched.run(100, &CancellationToken::new(), || (), |origin, _| {
            seen[origin].fetch_add(1, Ordering::Relaxed);
            origin
        });
        assert_eq!(total, Some((0..100).sum()));
        assert!(seen.iter().all(|c| c.load(Ordering::Relaxed) == 1));
    }

    #[test]
    fn test_admission_bounds_concurrency() {
        let sched = scheduler(4, 2);
        let running = AtomicUsize::new(0);
        let peak = AtomicUsize::new(0);
        sched.run(40, &CancellationToken::new(), || (), |_, _| {
            let now = running.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(1));
            running.fetch_sub(1, Ordering::SeqCst);
            0
        });
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[test]
    fn test_scratch_reused_per_worker() {
        let sched = scheduler(2, 4);
        let created = AtomicUsize::new(0);
        sched.run(50, &CancellationToken::new(), || {
            created.fetch_add(1, Ordering::Relaxed);
            Vec::<u8>::new()
        }, |_, buf| {
            buf.push(1);
            1
        });
        assert!(created.load(Ordering::Relaxed) <= 2);
    }

    #[test]
    fn test_cancel_before_start() {
        let sched = scheduler(2, 2);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let ran = AtomicBool::new(false);
        let result = sched.run(10, &cancel, || (), |_, _| {
            ran.store(true, Ordering::Relaxed);
            1
        });
        assert_eq!(result, None);
        assert!(!ran.load(Ordering::Relaxed));
    }

    #[test]
    fn test_cancel_midway() {
        let sched = scheduler(2, 1);
        let cancel = CancellationToken::new();
        let result = sched.run(1000, &cancel, || (), |origin, _| {
            if origin == 3 {
                cancel.cancel();
            }
            1
        });
        assert_eq!(result, None);
    }
}
