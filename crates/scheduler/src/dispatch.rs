//! UI-affine callback queue.
//!
//! Every mutation of view state happens on the thread that owns the
//! [`UiQueue`]. Background jobs hold a [`UiHandle`] and post closures that
//! receive `&mut C` when the owner drains the queue.

use std::fmt;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::time::{Duration, Instant};

type Callback<C> = Box<dyn FnOnce(&mut C) + Send + 'static>;

/// Receiving end, owned by the UI thread.
pub struct UiQueue<C> {
    sender: Sender<Callback<C>>,
    receiver: Receiver<Callback<C>>,
}

/// Posting end, cloned into background jobs.
pub struct UiHandle<C> {
    sender: Sender<Callback<C>>,
}

impl<C: 'static> UiQueue<C> {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::channel();
        Self { sender, receiver }
    }

    /// A handle that posts into this queue.
    pub fn handle(&self) -> UiHandle<C> {
        UiHandle {
            sender: self.sender.clone(),
        }
    }

    /// Run every callback that is already queued. Returns how many ran.
    pub fn drain(&self, ctx: &mut C) -> usize {
        let mut ran = 0;
        while let Ok(callback) = self.receiver.try_recv() {
            callback(ctx);
            ran += 1;
        }
        ran
    }

    /// Run callbacks as they arrive for `timeout`. Returns how many ran.
    pub fn run_for(&self, ctx: &mut C, timeout: Duration) -> usize {
        let deadline = Instant::now() + timeout;
        let mut ran = 0;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return ran + self.drain(ctx);
            }
            match self.receiver.recv_timeout(remaining) {
                Ok(callback) => {
                    callback(ctx);
                    ran += 1;
                }
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {
                    return ran;
                }
            }
        }
    }

    /// Run callbacks until `done` holds or `timeout` passes.
    ///
    /// Returns whether `done` held. `done` is checked before waiting, so an
    /// already satisfied condition returns immediately.
    pub fn run_until<F>(&self, ctx: &mut C, timeout: Duration, mut done: F) -> bool
    where
        F: FnMut(&C) -> bool,
    {
        let deadline = Instant::now() + timeout;
        self.drain(ctx);
        while !done(ctx) {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return false;
            }
            match self.receiver.recv_timeout(remaining) {
                Ok(callback) => callback(ctx),
                Err(_) => return done(ctx),
            }
        }
        true
    }
}

impl<C: 'static> Default for UiQueue<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> fmt::Debug for UiQueue<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UiQueue").finish_non_exhaustive()
    }
}

impl<C: 'static> UiHandle<C> {
    /// Queue `callback` for the UI thread.
    ///
    /// Returns `false` if the queue has been dropped, in which case the
    /// callback is discarded.
    pub fn post<F>(&self, callback: F) -> bool
    where
        F: FnOnce(&mut C) + Send + 'static,
    {
        self.sender.send(Box::new(callback)).is_ok()
    }
}

impl<C> Clone for UiHandle<C> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}

impl<C> fmt::Debug for UiHandle<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UiHandle").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_drain_runs_posted_callbacks_in_order() {
        let queue: UiQueue<Vec<u32>> = UiQueue::new();
        let handle = queue.handle();

        handle.post(|v| v.push(1));
        handle.post(|v| v.push(2));

        let mut state = Vec::new();
        assert_eq!(queue.drain(&mut state), 2);
        assert_eq!(state, vec![1, 2]);
        assert_eq!(queue.drain(&mut state), 0);
    }

    #[test]
    fn test_callbacks_run_on_owner_thread() {
        let queue: UiQueue<Option<thread::ThreadId>> = UiQueue::new();
        let handle = queue.handle();

        thread::spawn(move || {
            handle.post(|seen| *seen = Some(thread::current().id()));
        })
        .join()
        .unwrap();

        let mut seen = None;
        queue.drain(&mut seen);
        assert_eq!(seen, Some(thread::current().id()));
    }

    #[test]
    fn test_run_until_waits_for_background_post() {
        let queue: UiQueue<u32> = UiQueue::new();
        let handle = queue.handle();

        thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            handle.post(|n| *n += 1);
        });

        let mut n = 0;
        assert!(queue.run_until(&mut n, Duration::from_secs(5), |n| *n == 1));
        assert_eq!(n, 1);
    }

    #[test]
    fn test_run_until_times_out() {
        let queue: UiQueue<u32> = UiQueue::new();
        let mut n = 0;
        assert!(!queue.run_until(&mut n, Duration::from_millis(20), |n| *n > 0));
    }

    #[test]
    fn test_run_for_returns_after_timeout() {
        let queue: UiQueue<u32> = UiQueue::new();
        queue.handle().post(|n| *n = 7);

        let mut n = 0;
        let started = Instant::now();
        assert_eq!(queue.run_for(&mut n, Duration::from_millis(30)), 1);
        assert!(started.elapsed() >= Duration::from_millis(30));
        assert_eq!(n, 7);
    }

    #[test]
    fn test_post_after_queue_dropped() {
        let queue: UiQueue<u32> = UiQueue::new();
        let handle = queue.handle();
        drop(queue);
        assert!(!handle.post(|n| *n = 1));
    }
}
