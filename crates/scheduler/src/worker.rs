//! Background worker pool.
//!
//! A fixed number of threads pull jobs from a shared [`JobScheduler`] and run
//! them. Workers never touch view state; jobs report back through a
//! [`UiHandle`](crate::UiHandle).

use crate::{CancellationToken, JobScheduler};
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Smallest and largest pool the viewer runs with.
pub const MIN_WORKERS: usize = 2;
pub const MAX_WORKERS: usize = 4;

/// Configuration for the worker pool.
#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    /// Number of worker threads to spawn.
    /// Default: 2.
    pub num_workers: usize,

    /// How long an idle worker sleeps before looking at the queue again.
    /// Default: 10ms.
    pub poll_interval: Duration,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self::new(MIN_WORKERS)
    }
}

impl WorkerPoolConfig {
    /// Create a configuration with `num_workers` threads, clamped to the
    /// supported range.
    pub fn new(num_workers: usize) -> Self {
        Self {
            num_workers: num_workers.clamp(MIN_WORKERS, MAX_WORKERS),
            poll_interval: Duration::from_millis(10),
        }
    }

    /// Set the poll interval for workers.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

/// Worker pool executing scheduler jobs in parallel.
///
/// # Example
///
/// ```
/// use photoview_scheduler::{JobKind, JobPriority, JobScheduler, WorkerPool, WorkerPoolConfig};
/// use std::sync::{mpsc, Arc};
/// use std::time::Duration;
///
/// let scheduler = Arc::new(JobScheduler::new());
/// let pool = WorkerPool::new(scheduler.clone(), WorkerPoolConfig::default()).unwrap();
///
/// let (tx, rx) = mpsc::channel();
/// scheduler.submit(JobPriority::Normal, JobKind::Task { label: "ping".into() }, move |_| {
///     tx.send(42).unwrap();
/// });
///
/// assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), 42);
/// pool.shutdown();
/// ```
pub struct WorkerPool {
    workers: Vec<Worker>,
    shutdown: Arc<AtomicBool>,
}

impl WorkerPool {
    /// Spawn the worker threads.
    ///
    /// # Arguments
    ///
    /// * `scheduler` - Job scheduler to pull jobs from
    /// * `config` - Worker pool configuration
    pub fn new(scheduler: Arc<JobScheduler>, config: WorkerPoolConfig) -> io::Result<Self> {
        let shutdown = Arc::new(AtomicBool::new(false));
        let mut workers = Vec::with_capacity(config.num_workers);

        for id in 0..config.num_workers {
            match Worker::spawn(id, scheduler.clone(), shutdown.clone(), config.poll_interval) {
                Ok(worker) => workers.push(worker),
                Err(err) => {
                    shutdown.store(true, Ordering::Release);
                    for worker in workers {
                        worker.join();
                    }
                    return Err(err);
                }
            }
        }

        log::info!("started {} workers", workers.len());
        Ok(Self { workers, shutdown })
    }

    /// Get the number of worker threads.
    pub fn num_workers(&self) -> usize {
        self.workers.len()
    }

    /// Stop every worker and wait for running jobs to finish.
    ///
    /// Jobs still queued stay in the scheduler.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        self.shutdown.store(true, Ordering::Release);
        for worker in self.workers.drain(..) {
            worker.join();
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.stop();
    }
}

/// A single worker thread.
struct Worker {
    id: usize,
    thread: Option<JoinHandle<()>>,
}

impl Worker {
    fn spawn(
        id: usize,
        scheduler: Arc<JobScheduler>,
        shutdown: Arc<AtomicBool>,
        poll_interval: Duration,
    ) -> io::Result<Self> {
        let thread = thread::Builder::new()
            .name(format!("photoview-worker-{}", id))
            .spawn(move || Self::run(scheduler, shutdown, poll_interval))?;

        Ok(Self {
            id,
            thread: Some(thread),
        })
    }

    /// Pull, run, complete; sleep when the queue is empty.
    fn run(scheduler: Arc<JobScheduler>, shutdown: Arc<AtomicBool>, poll_interval: Duration) {
        while !shutdown.load(Ordering::Acquire) {
            let Some(job) = scheduler.next_job() else {
                thread::sleep(poll_interval);
                continue;
            };

            let job_id = job.id;
            let token = scheduler
                .get_cancellation_token(job_id)
                .unwrap_or_else(CancellationToken::new);

            if token.is_cancelled() {
                log::debug!("skipping cancelled job {job_id}");
                drop(job);
            } else {
                let kind = job.kind.clone();
                if panic::catch_unwind(AssertUnwindSafe(|| job.run(&token))).is_err() {
                    log::error!("job {job_id} ({kind:?}) panicked");
                }
            }

            scheduler.complete_job(job_id);
        }
    }

    fn join(mut self) {
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::error!("worker {} exited with a panic", self.id);
            }
        }
    }
}
