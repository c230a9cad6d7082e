//! File-level work-stealing worker pool (`spec.md` §4.E).
//!
//! Grounded on the same algorithm as the source's `ProductionThreadPool` (per-worker queues,
//! round-robin enqueue, steal-on-empty, sleep-and-retry backoff, atomic stop flag) but built on
//! `crossbeam_deque::Worker`/`Stealer` rather than a hand-rolled mutex+queue pair per worker —
//! the idiomatic Rust shape for the same work-stealing design.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_deque::{Injector, Stealer, Worker};

/// Idle back-off between failed steal attempts, mirroring the source's 100µs sleep
/// (`spec.md` §4.E).
const IDLE_BACKOFF: Duration = Duration::from_micros(100);

/// A file-granularity work-stealing pool.
///
/// One job per file; within a file, signal processing is strictly sequential (forced by the
/// HDF5 lock — `spec.md` §4.E: "no per-signal parallelism would help"). Job closures therefore
/// run any HDF5 reads synchronously inside the worker thread.
pub struct WorkerPool {
    injector: Arc<Injector<Job>>,
    stealers: Vec<Stealer<Job>>,
    stop: Arc<AtomicBool>,
    active_workers: Arc<AtomicUsize>,
    handles: Vec<std::thread::JoinHandle<()>>,
}

type Job = Box<dyn FnOnce() + Send + 'static>;

impl WorkerPool {
    /// Spawns `worker_count` threads, each polling its own local deque, then the shared
    /// injector, then stealing from sibling workers before backing off (`spec.md` §4.E).
    ///
    /// `worker_count` is clamped to at least 1.
    #[must_use]
    pub fn new(worker_count: usize) -> Self {
        let worker_count = worker_count.max(1);
        let injector = Arc::new(Injector::new());
        let stop = Arc::new(AtomicBool::new(false));
        let active_workers = Arc::new(AtomicUsize::new(0));

        let workers: Vec<Worker<Job>> = (0..worker_count).map(|_| Worker::new_fifo()).collect();
        let stealers: Vec<Stealer<Job>> = workers.iter().map(Worker::stealer).collect();

        let handles = workers
            .into_iter()
            .enumerate()
            .map(|(idx, local)| {
                let injector = Arc::clone(&injector);
                let stealers = stealers.clone();
                let stop = Arc::clone(&stop);
                let active_workers = Arc::clone(&active_workers);
                std::thread::Builder::new()
                    .name(format!("dp-ingest-worker-{idx}"))
                    .spawn(move || {
                        active_workers.fetch_add(1, Ordering::SeqCst);
                        worker_loop(&local, &injector, &stealers, &stop);
                        active_workers.fetch_sub(1, Ordering::SeqCst);
                    })
                    .expect("failed to spawn worker thread")
            })
            .collect();

        Self { injector, stealers, stop, active_workers, handles }
    }

    /// Enqueues a job onto the shared injector queue; any idle worker may pick it up.
    pub fn submit(&self, job: impl FnOnce() + Send + 'static) {
        self.injector.push(Box::new(job));
    }

    /// Number of worker threads currently inside their loop body (diagnostic only).
    #[must_use]
    pub fn active_worker_count(&self) -> usize {
        self.active_workers.load(Ordering::SeqCst)
    }

    /// Number of worker threads in the pool.
    #[must_use]
    pub fn worker_count(&self) -> usize {
        self.stealers.len()
    }

    /// Signals every worker to stop after its current job, then blocks until all workers have
    /// drained (`spec.md` §4.E: "every worker drains before the pool's destructor returns").
    pub fn shutdown(self) {
        self.stop.store(true, Ordering::SeqCst);
        for handle in self.handles {
            let _ = handle.join();
        }
    }

    /// Requests shutdown without blocking on worker join; used by the watchdog to abort a run
    /// still in progress (`spec.md` §4.H).
    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }
}

fn worker_loop(
    local: &Worker<Job>,
    injector: &Injector<Job>,
    stealers: &[Stealer<Job>],
    stop: &AtomicBool,
) {
    loop {
        if let Some(job) = find_job(local, injector, stealers) {
            job();
            continue;
        }
        if stop.load(Ordering::SeqCst) {
            return;
        }
        std::thread::sleep(IDLE_BACKOFF);
    }
}

fn find_job(local: &Worker<Job>, injector: &Injector<Job>, stealers: &[Stealer<Job>]) -> Option<Job> {
    local.pop().or_else(|| {
        std::iter::repeat_with(|| {
            injector
                .steal_batch_and_pop(local)
                .or_else(|| stealers.iter().map(Stealer::steal).collect())
        })
        .find(|s| !s.is_retry())
        .and_then(|s| s.success())
    })
}
