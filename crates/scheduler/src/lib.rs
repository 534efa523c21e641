//! Photoview Scheduler Library
//!
//! Priority job queue, background worker pool and the UI-affine callback
//! queue that together make up the viewer's concurrency model.
//!
//! Background work (fetching, decoding, scaling) is submitted to a
//! [`JobScheduler`] and executed by a small [`WorkerPool`]. Workers never
//! touch view state directly: they post closures to a [`UiQueue`] through a
//! [`UiHandle`], and the thread that owns the views drains that queue.
//!
//! # Example
//!
//! ```
//! use photoview_scheduler::{JobKind, JobPriority, JobScheduler, UiQueue};
//!
//! let scheduler = JobScheduler::new();
//! let mut ui: UiQueue<Vec<String>> = UiQueue::new();
//! let handle = ui.handle();
//!
//! scheduler.submit(
//!     JobPriority::Normal,
//!     JobKind::Task { label: "greet".to_string() },
//!     move |_token| {
//!         handle.post(|log: &mut Vec<String>| log.push("hello".to_string()));
//!     },
//! );
//!
//! // Normally a worker thread runs this.
//! if let Some(job) = scheduler.next_job() {
//!     let id = job.id;
//!     let token = scheduler.get_cancellation_token(id).unwrap_or_default();
//!     job.run(&token);
//!     scheduler.complete_job(id);
//! }
//!
//! let mut log = Vec::new();
//! ui.drain(&mut log);
//! assert_eq!(log, vec!["hello".to_string()]);
//! ```

mod cancel;
mod dispatch;
mod priority;
mod scheduler;
mod worker;

// Re-export public API
pub use cancel::{CancellationRegistry, CancellationToken};
pub use dispatch::{UiHandle, UiQueue};
pub use priority::{Job, JobId, JobInfo, JobKind, JobPriority, Task};
pub use scheduler::{JobScheduler, SchedulerStats};
pub use worker::{WorkerPool, WorkerPoolConfig, MAX_WORKERS, MIN_WORKERS};
