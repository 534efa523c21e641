//! Cooperative cancellation for queued and running jobs.
//!
//! Cancellation never interrupts a thread. A job (or a callback about to be
//! delivered) checks its token and gives up early when it has been cancelled.

use crate::JobId;
use std::collections::HashMap;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex, MutexGuard, PoisonError,
};

/// Shared cancellation flag.
///
/// Clones observe the same state, so a view can keep one copy and hand the
/// other to a background fetch.
///
/// # Example
///
/// ```
/// use photoview_scheduler::CancellationToken;
///
/// let token = CancellationToken::new();
/// let worker_token = token.clone();
///
/// token.cancel();
/// assert!(worker_token.is_cancelled());
/// ```
#[derive(Clone, Debug)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Create a new, non-cancelled token.
    pub fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Cancel this token and every clone of it. Idempotent.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Returns `true` once `cancel()` has been called on any clone.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Returns `true` if both handles share the same flag.
    pub fn same_as(&self, other: &CancellationToken) -> bool {
        Arc::ptr_eq(&self.cancelled, &other.cancelled)
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Maps job ids to their cancellation tokens.
///
/// The scheduler registers a token on submit and unregisters it once the
/// job has completed or was removed from the queue.
pub struct CancellationRegistry {
    tokens: Mutex<HashMap<JobId, CancellationToken>>,
}

impl CancellationRegistry {
    pub fn new() -> Self {
        Self {
            tokens: Mutex::new(HashMap::new()),
        }
    }

    fn tokens(&self) -> MutexGuard<'_, HashMap<JobId, CancellationToken>> {
        self.tokens.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a job and return the token handed to its worker.
    pub fn register(&self, job_id: JobId) -> CancellationToken {
        let token = CancellationToken::new();
        self.tokens().insert(job_id, token.clone());
        token
    }

    /// Cancel a job by id. Returns `true` if the job was registered.
    pub fn cancel(&self, job_id: JobId) -> bool {
        match self.tokens().get(&job_id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancel several jobs, returning how many were registered.
    pub fn cancel_many(&self, job_ids: &[JobId]) -> usize {
        let tokens = self.tokens();
        job_ids
            .iter()
            .filter_map(|id| tokens.get(id))
            .map(CancellationToken::cancel)
            .count()
    }

    /// Cancel every registered job. Returns the number cancelled.
    pub fn cancel_all(&self) -> usize {
        let tokens = self.tokens();
        for token in tokens.values() {
            token.cancel();
        }
        tokens.len()
    }

    /// Forget a job. Returns `true` if it was registered.
    pub fn unregister(&self, job_id: JobId) -> bool {
        self.tokens().remove(&job_id).is_some()
    }

    /// Token for a registered job.
    pub fn get(&self, job_id: JobId) -> Option<CancellationToken> {
        self.tokens().get(&job_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.tokens().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens().is_empty()
    }
}

impl Default for CancellationRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_scope_token_cancels_every_clone() {
        // A grid hands clones of one scope to each thumbnail request.
        let scope = CancellationToken::new();
        let requests: Vec<_> = (0..4).map(|_| scope.clone()).collect();
        assert!(requests.iter().all(|t| !t.is_cancelled() && t.same_as(&scope)));

        scope.cancel();
        scope.cancel();
        assert!(requests.iter().all(CancellationToken::is_cancelled));

        let next_generation = CancellationToken::default();
        assert!(!next_generation.is_cancelled());
        assert!(!next_generation.same_as(&scope));
    }

    #[test]
    fn test_cancel_observed_across_threads() {
        let token = CancellationToken::new();
        let worker_token = token.clone();
        let worker = thread::spawn(move || {
            while !worker_token.is_cancelled() {
                thread::yield_now();
            }
        });
        token.cancel();
        worker.join().unwrap();
    }

    #[test]
    fn test_registry_tracks_jobs_until_unregistered() {
        let registry = CancellationRegistry::default();
        assert!(registry.is_empty());

        let fetch = registry.register(10);
        let prefetch = registry.register(11);
        assert_eq!(registry.len(), 2);
        assert!(registry.get(10).unwrap().same_as(&fetch));

        assert!(registry.cancel(11));
        assert!(prefetch.is_cancelled());
        assert!(!fetch.is_cancelled());

        assert!(registry.unregister(11));
        assert!(!registry.unregister(11));
        assert!(!registry.cancel(11));
        assert!(registry.get(11).is_none());
    }

    #[test]
    fn test_registry_bulk_cancellation() {
        let registry = CancellationRegistry::new();
        let tokens: Vec<_> = (1..=3).map(|id| registry.register(id)).collect();

        assert_eq!(registry.cancel_many(&[1, 3, 42]), 2);
        assert_eq!(
            tokens.iter().map(CancellationToken::is_cancelled).collect::<Vec<_>>(),
            [true, false, true]
        );

        assert_eq!(registry.cancel_all(), 3);
        assert!(tokens[1].is_cancelled());
    }
}
