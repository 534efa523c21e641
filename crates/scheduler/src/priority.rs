//! Priority-ordered job queue.
//!
//! Jobs run in priority order; within one priority level they run in the
//! order they were submitted.

use crate::CancellationToken;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Job priority levels. Higher values run first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum JobPriority {
    /// Cache warming for items that are not on screen yet.
    Prefetch = 0,

    /// Thumbnails for visible grid cells and feed loads.
    Normal = 1,

    /// The full-size image the user is looking at.
    High = 2,
}

/// Unique job identifier
pub type JobId = u64;

/// The work itself. Receives the job's cancellation token so long-running
/// work can stop early.
pub type Task = Box<dyn FnOnce(&CancellationToken) + Send + 'static>;

/// What a job is for. Used to find and cancel related jobs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobKind {
    /// Resolve `key` in the cache namespace `cache_id`.
    Fetch { cache_id: char, key: String },

    /// Anything else, identified by a label for logging.
    Task { label: String },
}

impl JobKind {
    /// Returns the cache key for fetch jobs.
    pub fn fetch_key(&self) -> Option<(char, &str)> {
        match self {
            JobKind::Fetch { cache_id, key } => Some((*cache_id, key.as_str())),
            JobKind::Task { .. } => None,
        }
    }
}

/// A scheduled job.
///
/// Ordered by priority (higher first), then by insertion order (earlier
/// first) so equal priorities are FIFO.
pub struct Job {
    /// Unique job identifier
    pub id: JobId,

    /// Job priority level
    pub priority: JobPriority,

    /// What the job does
    pub kind: JobKind,

    task: Task,

    /// Insertion order (used for FIFO within same priority)
    insertion_order: u64,
}

impl Job {
    /// Create a new job
    pub fn new(
        id: JobId,
        priority: JobPriority,
        kind: JobKind,
        task: Task,
        insertion_order: u64,
    ) -> Self {
        Self {
            id,
            priority,
            kind,
            task,
            insertion_order,
        }
    }

    /// Execute the job's task, consuming the job.
    pub fn run(self, token: &CancellationToken) {
        (self.task)(token)
    }

    /// Snapshot of the job without its task.
    pub fn info(&self) -> JobInfo {
        JobInfo {
            id: self.id,
            priority: self.priority,
            kind: self.kind.clone(),
        }
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("id", &self.id)
            .field("priority", &self.priority)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

impl PartialEq for Job {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Job {}

impl PartialOrd for Job {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Job {
    fn cmp(&self, other: &Self) -> Ordering {
        match self.priority.cmp(&other.priority) {
            // BinaryHeap is a max heap, so earlier insertions compare greater
            Ordering::Equal => other.insertion_order.cmp(&self.insertion_order),
            other => other,
        }
    }
}

/// Inspectable copy of a queued job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobInfo {
    pub id: JobId,
    pub priority: JobPriority,
    pub kind: JobKind,
}

/// Thread-safe priority queue of jobs.
pub struct PriorityQueue {
    state: Arc<Mutex<QueueState>>,
}

struct QueueState {
    heap: BinaryHeap<Job>,
    next_job_id: JobId,
    insertion_counter: u64,
}

impl PriorityQueue {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(QueueState {
                heap: BinaryHeap::new(),
                next_job_id: 1,
                insertion_counter: 0,
            })),
        }
    }

    fn state(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Push a job and return its assigned id.
    #[cfg(test)]
    pub fn push(&self, priority: JobPriority, kind: JobKind, task: Task) -> JobId {
        self.push_with(priority, kind, task, |_| {})
    }

    /// Push a job, calling `on_assigned` with its id before the job becomes
    /// visible to `pop`.
    pub fn push_with<F>(&self, priority: JobPriority, kind: JobKind, task: Task, on_assigned: F) -> JobId
    where
        F: FnOnce(JobId),
    {
        let mut state = self.state();
        let job_id = state.next_job_id;
        state.next_job_id += 1;
        on_assigned(job_id);

        let insertion_order = state.insertion_counter;
        state.insertion_counter += 1;

        state
            .heap
            .push(Job::new(job_id, priority, kind, task, insertion_order));

        job_id
    }

    /// Pop the highest priority job.
    pub fn pop(&self) -> Option<Job> {
        self.state().heap.pop()
    }

    /// Look at the highest priority job without removing it.
    pub fn peek(&self) -> Option<JobInfo> {
        self.state().heap.peek().map(Job::info)
    }

    pub fn len(&self) -> usize {
        self.state().heap.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.state().heap.is_empty()
    }

    /// Remove every job, returning them to the caller.
    ///
    /// Returned jobs are dropped by the caller outside the queue lock, since
    /// dropping an unrun task may run arbitrary cleanup.
    pub fn drain(&self) -> Vec<Job> {
        std::mem::take(&mut self.state().heap).into_vec()
    }

    /// Remove all jobs matching a predicate and return them.
    pub fn remove_if<F>(&self, predicate: F) -> Vec<Job>
    where
        F: Fn(&Job) -> bool,
    {
        let mut state = self.state();
        let (removed, remaining): (Vec<Job>, Vec<Job>) = std::mem::take(&mut state.heap)
            .into_vec()
            .into_iter()
            .partition(|job| predicate(job));
        state.heap = remaining.into();
        removed
    }

    /// Raise a queued job to `priority`.
    ///
    /// A job is never lowered. Its FIFO position among jobs of the new
    /// priority follows its original submission. Returns `true` if the job
    /// was queued and its priority changed.
    pub fn reprioritize(&self, job_id: JobId, priority: JobPriority) -> bool {
        let mut state = self.state();
        let mut jobs = std::mem::take(&mut state.heap).into_vec();

        let mut changed = false;
        if let Some(job) = jobs.iter_mut().find(|job| job.id == job_id) {
            if priority > job.priority {
                job.priority = priority;
                changed = true;
            }
        }

        state.heap = jobs.into();
        changed
    }
}

impl Default for PriorityQueue {
    fn default() -> Self {
        Self::new()
    }
}
