//! Job scheduler implementation
//!
//! Ties the priority queue to the cancellation registry and keeps lifecycle
//! statistics.

use crate::cancel::{CancellationRegistry, CancellationToken};
use crate::priority::{Job, JobId, JobInfo, JobKind, JobPriority, PriorityQueue};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Job scheduler statistics
#[derive(Debug, Clone, Default)]
pub struct SchedulerStats {
    /// Total jobs submitted
    pub jobs_submitted: u64,

    /// Total jobs completed
    pub jobs_completed: u64,

    /// Total jobs cancelled before they started
    pub jobs_cancelled: u64,

    /// Current queue size
    pub queue_size: usize,
}

impl SchedulerStats {
    /// Jobs submitted but neither completed nor cancelled yet.
    pub fn pending_jobs(&self) -> u64 {
        self.jobs_submitted
            .saturating_sub(self.jobs_completed)
            .saturating_sub(self.jobs_cancelled)
    }
}

/// Thread-safe scheduler shared by the views (submitting) and the worker
/// pool (executing).
///
/// # Example
///
/// ```
/// use photoview_scheduler::{JobKind, JobPriority, JobScheduler};
///
/// let scheduler = JobScheduler::new();
/// let (job_id, token) = scheduler.submit(
///     JobPriority::Prefetch,
///     JobKind::Fetch { cache_id: '4', key: "http://host/a.jpg".into() },
///     |_token| {},
/// );
///
/// // The user scrolled to the cell: run it sooner.
/// scheduler.reprioritize(job_id, JobPriority::Normal);
/// assert!(!token.is_cancelled());
/// ```
pub struct JobScheduler {
    queue: PriorityQueue,
    state: Arc<Mutex<SchedulerState>>,
    cancellation: CancellationRegistry,
}

struct SchedulerState {
    stats: SchedulerStats,
}

impl JobScheduler {
    pub fn new() -> Self {
        Self {
            queue: PriorityQueue::new(),
            state: Arc::new(Mutex::new(SchedulerState {
                stats: SchedulerStats::default(),
            })),
            cancellation: CancellationRegistry::new(),
        }
    }

    fn state(&self) -> MutexGuard<'_, SchedulerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Submit a job.
    ///
    /// The task runs on a worker thread once every higher-priority job ahead
    /// of it has been taken. Returns the job id and its cancellation token.
    pub fn submit<F>(&self, priority: JobPriority, kind: JobKind, task: F) -> (JobId, CancellationToken)
    where
        F: FnOnce(&CancellationToken) + Send + 'static,
    {
        // The token must exist before a worker can pop the job.
        let mut token = None;
        let job_id = self.queue.push_with(priority, kind, Box::new(task), |id| {
            token = Some(self.cancellation.register(id));
        });
        let token = token.unwrap_or_default();

        self.state().stats.jobs_submitted += 1;
        log::trace!("submitted job {job_id} at {priority:?}");

        (job_id, token)
    }

    /// Take the highest priority job.
    ///
    /// The job's token stays registered until `complete_job()`.
    pub fn next_job(&self) -> Option<Job> {
        self.queue.pop()
    }

    /// Mark a job as completed and forget its token.
    pub fn complete_job(&self, job_id: JobId) {
        self.state().stats.jobs_completed += 1;
        self.cancellation.unregister(job_id);
    }

    /// Raise the priority of a queued job. Returns `false` if the job has
    /// already started or would not move up.
    pub fn reprioritize(&self, job_id: JobId, priority: JobPriority) -> bool {
        self.queue.reprioritize(job_id, priority)
    }

    /// Cancel a job by id.
    ///
    /// A queued job is removed and its task dropped unrun. A running job only
    /// has its token cancelled. Returns `true` if the job was found.
    pub fn cancel_job(&self, job_id: JobId) -> bool {
        let token_cancelled = self.cancellation.cancel(job_id);
        let removed = self.queue.remove_if(|job| job.id == job_id);

        if removed.is_empty() {
            return token_cancelled;
        }

        self.state().stats.jobs_cancelled += removed.len() as u64;
        self.cancellation.unregister(job_id);
        drop(removed);
        true
    }

    /// Cancel every queued job matching a predicate. Returns how many were
    /// removed.
    pub fn cancel_jobs_if<F>(&self, predicate: F) -> usize
    where
        F: Fn(&JobInfo) -> bool,
    {
        let removed = self.queue.remove_if(|job| predicate(&job.info()));
        if removed.is_empty() {
            return 0;
        }

        let ids: Vec<JobId> = removed.iter().map(|job| job.id).collect();
        self.cancellation.cancel_many(&ids);
        for id in &ids {
            self.cancellation.unregister(*id);
        }
        self.state().stats.jobs_cancelled += ids.len() as u64;

        // Dropping unrun tasks may call back into their owners; the queue
        // lock is no longer held here.
        drop(removed);
        ids.len()
    }

    /// Number of queued jobs.
    pub fn pending_jobs(&self) -> usize {
        self.queue.len()
    }

    /// Cancel every queued and running job.
    pub fn clear(&self) {
        let drained = self.queue.drain();
        self.cancellation.cancel_all();

        if !drained.is_empty() {
            self.state().stats.jobs_cancelled += drained.len() as u64;
            for job in &drained {
                self.cancellation.unregister(job.id);
            }
        }
        drop(drained);
    }

    pub fn stats(&self) -> SchedulerStats {
        let mut stats = self.state().stats.clone();
        stats.queue_size = self.queue.len();
        stats
    }

    pub fn peek_next_job(&self) -> Option<JobInfo> {
        self.queue.peek()
    }

    /// Token of a queued or running job.
    pub fn get_cancellation_token(&self, job_id: JobId) -> Option<CancellationToken> {
        self.cancellation.get(job_id)
    }
}

impl Default for JobScheduler {
    fn default() -> Self {
        Self::new()
    }
}
