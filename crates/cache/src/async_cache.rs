//! Asynchronous two-level cache with per-key fetch de-duplication.
//!
//! A request is resolved memory first, then from the persistent store, then
//! from the network, as its [`FetchPolicy`] allows. Only one fetch per key is
//! ever in flight: later requests for the same key attach to the running
//! fetch (a "flight") and are resolved by it. Completion callbacks run on the
//! UI thread through a [`UiHandle`], never on the worker that did the work.

use crate::config::CacheConfig;
use crate::decoder::ResourceDecoder;
use crate::disk::{DiskCacheStats, DiskStore};
use crate::fetch::Fetcher;
use crate::ram::{CacheStats, RamCache, Weighted};
use crate::{CacheError, Result};
use photoview_scheduler::{
    CancellationToken, JobId, JobKind, JobPriority, JobScheduler, UiHandle, WorkerPool,
};
use std::collections::HashMap;
use std::fmt;
use std::io;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Cache namespace for decoded images.
pub const IMAGE_CACHE_ID: char = '4';

/// Cache namespace for parsed feeds.
pub const FEED_CACHE_ID: char = '5';

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Where a request may look for its value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FetchPolicy {
    /// Memory and persistent store only; never touches the network. When
    /// it joins a running fetch it is answered once the store has been
    /// read, whatever the fetch does next.
    LocalOnly,
    /// Memory, then persistent store, then network.
    Anywhere,
    /// Always re-fetch from the network, ignoring cached copies.
    WebOnly,
}

impl FetchPolicy {
    fn rank(self) -> u8 {
        match self {
            FetchPolicy::LocalOnly => 0,
            FetchPolicy::Anywhere => 1,
            FetchPolicy::WebOnly => 2,
        }
    }

    /// The policy that satisfies both requests.
    fn combine(self, other: FetchPolicy) -> FetchPolicy {
        if other.rank() > self.rank() {
            other
        } else {
            self
        }
    }
}

/// Observable state of a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    /// Neither resident nor being fetched.
    Empty,
    /// A fetch for the key is queued or running.
    Fetching,
    /// Resident in memory or in the persistent store.
    Ready,
}

/// Counters kept by an [`AsyncCache`].
#[derive(Debug, Clone, Default)]
pub struct AsyncCacheStats {
    pub requests: u64,
    pub memory_hits: u64,
    pub disk_hits: u64,
    pub network_fetches: u64,
    pub failures: u64,
    /// Requests that attached to a fetch already in flight
    pub joined: u64,
    /// Callbacks skipped because their request was cancelled
    pub cancelled_deliveries: u64,
    pub ram: CacheStats,
    pub disk: DiskCacheStats,
}

impl AsyncCacheStats {
    /// Share of requests answered without the network (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        if self.requests == 0 {
            0.0
        } else {
            (self.memory_hits + self.disk_hits) as f64 / self.requests as f64
        }
    }
}

/// Resolution signal shared by a flight and every [`Request`] attached to it.
struct Completion<V> {
    result: Mutex<Option<Option<Arc<V>>>>,
    ready: Condvar,
}

impl<V> Completion<V> {
    fn pending() -> Arc<Self> {
        Arc::new(Self {
            result: Mutex::new(None),
            ready: Condvar::new(),
        })
    }

    fn resolved(value: Option<Arc<V>>) -> Arc<Self> {
        Arc::new(Self {
            result: Mutex::new(Some(value)),
            ready: Condvar::new(),
        })
    }

    fn set(&self, value: Option<Arc<V>>) {
        let mut result = lock(&self.result);
        if result.is_none() {
            *result = Some(value);
            self.ready.notify_all();
        }
    }
}

/// Handle to one `get`.
///
/// Dropping the handle does not cancel the request; call [`Request::cancel`]
/// (or cancel the scope token it was created with).
pub struct Request<V> {
    key: String,
    token: CancellationToken,
    scope: Option<CancellationToken>,
    completion: Arc<Completion<V>>,
}

impl<V> Request<V> {
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Stop the callback of this request from being delivered.
    ///
    /// The underlying fetch keeps running and still populates the cache.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled() || self.scope.as_ref().is_some_and(|s| s.is_cancelled())
    }

    /// Whether the fetch behind this request has resolved.
    pub fn is_done(&self) -> bool {
        lock(&self.completion.result).is_some()
    }

    /// Block for at most `timeout` waiting for the value.
    ///
    /// Returns `None` on timeout or failure. The callback is delivered later
    /// either way.
    pub fn wait(&self, timeout: Duration) -> Option<Arc<V>> {
        let deadline = Instant::now() + timeout;
        let mut result = lock(&self.completion.result);
        loop {
            if let Some(value) = result.as_ref() {
                return value.clone();
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return None;
            }
            result = self
                .completion
                .ready
                .wait_timeout(result, remaining)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }
}

impl<V> fmt::Debug for Request<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("key", &self.key)
            .field("cancelled", &self.is_cancelled())
            .field("done", &self.is_done())
            .finish()
    }
}

type Callback<V, C> = Box<dyn FnOnce(&mut C, Option<Arc<V>>) + Send + 'static>;

struct Waiter<V, C> {
    token: CancellationToken,
    scope: Option<CancellationToken>,
    callback: Callback<V, C>,
}

impl<V, C> Waiter<V, C> {
    fn is_cancelled(token: &CancellationToken, scope: &Option<CancellationToken>) -> bool {
        token.is_cancelled() || scope.as_ref().is_some_and(|s| s.is_cancelled())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Queued,
    Local,
    Network,
}

struct FlightState<V, C> {
    /// Combined policy of the requests that may go to the network
    policy: FetchPolicy,
    priority: JobPriority,
    phase: Phase,
    job_id: Option<JobId>,
    waiters: Vec<Waiter<V, C>>,
    /// Local-only requests, answered as soon as the store has been read
    local_waiters: Vec<Waiter<V, C>>,
    /// What the persistent store held, once read
    local_result: Option<Option<Arc<V>>>,
    resolved: bool,
}

/// One in-flight fetch for a key.
struct Flight<V, C> {
    state: Mutex<FlightState<V, C>>,
    completion: Arc<Completion<V>>,
    /// Resolved at the end of the local phase
    local: Arc<Completion<V>>,
}

struct Inner<V, C> {
    cache_id: char,
    ram: RamCache<V>,
    disk: DiskStore,
    fetcher: Arc<dyn Fetcher>,
    decoder: Box<dyn ResourceDecoder<V>>,
    scheduler: Arc<JobScheduler>,
    ui: UiHandle<C>,
    flights: Mutex<HashMap<String, Arc<Flight<V, C>>>>,
    stats: Mutex<AsyncCacheStats>,
}

/// Shared plumbing for every cache of one viewer: the scheduler, the
/// network, the UI queue and the configuration.
pub struct CacheRuntime<C> {
    config: CacheConfig,
    scheduler: Arc<JobScheduler>,
    fetcher: Arc<dyn Fetcher>,
    ui: UiHandle<C>,
}

impl<C: 'static> CacheRuntime<C> {
    pub fn new(config: CacheConfig, fetcher: Arc<dyn Fetcher>, ui: UiHandle<C>) -> Self {
        Self {
            config,
            scheduler: Arc::new(JobScheduler::new()),
            fetcher,
            ui,
        }
    }

    /// Start the background workers that execute cache fetches.
    pub fn spawn_workers(&self) -> io::Result<WorkerPool> {
        WorkerPool::new(self.scheduler.clone(), self.config.worker_pool_config())
    }

    /// Open the cache namespace `cache_id`, indexing whatever the persistent
    /// store already holds.
    pub fn open_cache<V, D>(&self, cache_id: char, decoder: D) -> Result<AsyncCache<V, C>>
    where
        V: Weighted + Send + Sync + 'static,
        D: ResourceDecoder<V> + 'static,
    {
        let disk = DiskStore::open(&self.config.disk_cache_dir, cache_id, self.config.disk_cache_size)?;
        disk.load_from_disk()?;
        log::info!(
            "opened cache '{cache_id}' with {} persisted entries",
            disk.entry_count()
        );

        Ok(AsyncCache {
            inner: Arc::new(Inner {
                cache_id,
                ram: RamCache::new(self.config.ram_cache_size),
                disk,
                fetcher: self.fetcher.clone(),
                decoder: Box::new(decoder),
                scheduler: self.scheduler.clone(),
                ui: self.ui.clone(),
                flights: Mutex::new(HashMap::new()),
                stats: Mutex::new(AsyncCacheStats::default()),
            }),
        })
    }

    pub fn scheduler(&self) -> &Arc<JobScheduler> {
        &self.scheduler
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Drop every queued fetch. Their waiters receive `None`.
    pub fn shutdown(&self) {
        self.scheduler.clear();
    }
}

impl<C> Clone for CacheRuntime<C> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            scheduler: self.scheduler.clone(),
            fetcher: self.fetcher.clone(),
            ui: self.ui.clone(),
        }
    }
}

/// Key to value cache with asynchronous, de-duplicated resolution.
///
/// `V` is the decoded value, `C` the UI context that callbacks receive.
pub struct AsyncCache<V, C> {
    inner: Arc<Inner<V, C>>,
}

impl<V, C> Clone for AsyncCache<V, C> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<V, C> AsyncCache<V, C>
where
    V: Weighted + Send + Sync + 'static,
    C: 'static,
{
    /// Resolve `key` and deliver the result to `on_complete` on the UI
    /// thread, exactly once unless the request is cancelled first.
    ///
    /// Returns immediately. `None` signals failure or absence.
    pub fn get<F>(&self, key: &str, priority: JobPriority, policy: FetchPolicy, on_complete: F) -> Request<V>
    where
        F: FnOnce(&mut C, Option<Arc<V>>) + Send + 'static,
    {
        self.request(key, priority, policy, None, Some(Box::new(on_complete)))
    }

    /// Like [`AsyncCache::get`], but the delivery is also suppressed once
    /// `scope` is cancelled. A view cancels one scope token to drop every
    /// outstanding delivery of a superseded generation.
    pub fn get_scoped<F>(
        &self,
        key: &str,
        priority: JobPriority,
        policy: FetchPolicy,
        scope: &CancellationToken,
        on_complete: F,
    ) -> Request<V>
    where
        F: FnOnce(&mut C, Option<Arc<V>>) + Send + 'static,
    {
        self.request(key, priority, policy, Some(scope.clone()), Some(Box::new(on_complete)))
    }

    /// Warm the cache for `key` without a callback.
    pub fn prefetch(&self, key: &str) {
        self.request(key, JobPriority::Prefetch, FetchPolicy::Anywhere, None, None);
    }

    /// Drop prefetches still queued for keys matching `stale`. Returns how
    /// many were dropped.
    pub fn cancel_prefetches<F>(&self, stale: F) -> usize
    where
        F: Fn(&str) -> bool,
    {
        let cache_id = self.inner.cache_id;
        let dropped = self.inner.scheduler.cancel_jobs_if(|job| {
            job.priority == JobPriority::Prefetch
                && job
                    .kind
                    .fetch_key()
                    .is_some_and(|(id, key)| id == cache_id && stale(key))
        });
        if dropped > 0 {
            log::debug!("dropped {dropped} queued prefetches from cache '{cache_id}'");
        }
        dropped
    }

    /// Memory lookup that does not schedule anything.
    pub fn peek(&self, key: &str) -> Option<Arc<V>> {
        self.inner.ram.peek(key)
    }

    pub fn entry_state(&self, key: &str) -> EntryState {
        if lock(&self.inner.flights).contains_key(key) {
            EntryState::Fetching
        } else if self.inner.ram.contains(key) || self.inner.disk.contains(key) {
            EntryState::Ready
        } else {
            EntryState::Empty
        }
    }

    pub fn cache_id(&self) -> char {
        self.inner.cache_id
    }

    pub fn stats(&self) -> AsyncCacheStats {
        let mut stats = lock(&self.inner.stats).clone();
        stats.ram = self.inner.ram.stats();
        stats.disk = self.inner.disk.stats();
        stats
    }

    /// Empty memory and the persistent store. Fetches in flight still
    /// complete and repopulate their keys.
    pub fn clear(&self) -> Result<()> {
        self.inner.ram.clear();
        self.inner.disk.clear()?;
        Ok(())
    }

    fn request(
        &self,
        key: &str,
        priority: JobPriority,
        policy: FetchPolicy,
        scope: Option<CancellationToken>,
        callback: Option<Callback<V, C>>,
    ) -> Request<V> {
        let inner = &self.inner;
        let token = CancellationToken::new();
        lock(&inner.stats).requests += 1;

        if policy != FetchPolicy::WebOnly {
            if let Some(value) = inner.ram.get(key) {
                lock(&inner.stats).memory_hits += 1;
                log::trace!("memory hit for {key}");
                if let Some(callback) = callback {
                    inner.deliver(
                        Waiter {
                            token: token.clone(),
                            scope: scope.clone(),
                            callback,
                        },
                        Some(value.clone()),
                    );
                }
                return Request {
                    key: key.to_string(),
                    token,
                    scope,
                    completion: Completion::resolved(Some(value)),
                };
            }
        }

        let mut flights = lock(&inner.flights);

        // The flight stays in the map until it resolves, so a joiner that
        // holds the map lock is guaranteed to be delivered to.
        if let Some(flight) = flights.get(key).cloned() {
            let request = self.join(&flight, key, token, priority, policy, scope, callback);
            drop(flights);
            return request;
        }

        let flight = Arc::new(Flight {
            state: Mutex::new(FlightState {
                policy,
                priority,
                phase: Phase::Queued,
                job_id: None,
                waiters: Vec::new(),
                local_waiters: Vec::new(),
                local_result: None,
                resolved: false,
            }),
            completion: Completion::pending(),
            local: Completion::pending(),
        });
        if let Some(callback) = callback {
            let waiter = Waiter {
                token: token.clone(),
                scope: scope.clone(),
                callback,
            };
            let mut state = lock(&flight.state);
            if policy == FetchPolicy::LocalOnly {
                state.local_waiters.push(waiter);
            } else {
                state.waiters.push(waiter);
            }
        }
        flights.insert(key.to_string(), flight.clone());

        let job = FetchJob {
            inner: inner.clone(),
            key: key.to_string(),
            flight: flight.clone(),
        };
        let (job_id, _) = inner.scheduler.submit(
            priority,
            JobKind::Fetch {
                cache_id: inner.cache_id,
                key: key.to_string(),
            },
            move |token| job.run(token),
        );
        lock(&flight.state).job_id = Some(job_id);
        drop(flights);

        let completion = if policy == FetchPolicy::LocalOnly {
            flight.local.clone()
        } else {
            flight.completion.clone()
        };
        Request {
            key: key.to_string(),
            token,
            scope,
            completion,
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn join(
        &self,
        flight: &Flight<V, C>,
        key: &str,
        token: CancellationToken,
        priority: JobPriority,
        policy: FetchPolicy,
        scope: Option<CancellationToken>,
        callback: Option<Callback<V, C>>,
    ) -> Request<V> {
        let inner = &self.inner;
        let mut state = lock(&flight.state);
        lock(&inner.stats).joined += 1;
        log::trace!("joining in-flight fetch for {key}");

        if priority > state.priority {
            state.priority = priority;
            if let (Phase::Queued, Some(job_id)) = (state.phase, state.job_id) {
                inner.scheduler.reprioritize(job_id, priority);
            }
        }

        // A local-only request never waits on the network part of a flight.
        if policy == FetchPolicy::LocalOnly {
            if let Some(result) = state.local_result.clone() {
                drop(state);
                if let Some(callback) = callback {
                    inner.deliver(
                        Waiter {
                            token: token.clone(),
                            scope: scope.clone(),
                            callback,
                        },
                        result.clone(),
                    );
                }
                return Request {
                    key: key.to_string(),
                    token,
                    scope,
                    completion: Completion::resolved(result),
                };
            }
            if let Some(callback) = callback {
                state.local_waiters.push(Waiter {
                    token: token.clone(),
                    scope: scope.clone(),
                    callback,
                });
            }
            return Request {
                key: key.to_string(),
                token,
                scope,
                completion: flight.local.clone(),
            };
        }

        state.policy = state.policy.combine(policy);
        if let Some(callback) = callback {
            state.waiters.push(Waiter {
                token: token.clone(),
                scope: scope.clone(),
                callback,
            });
        }

        Request {
            key: key.to_string(),
            token,
            scope,
            completion: flight.completion.clone(),
        }
    }
}

impl<V, C> Inner<V, C>
where
    V: Weighted + Send + Sync + 'static,
    C: 'static,
{
    /// Post one waiter's callback to the UI thread.
    fn deliver(&self, waiter: Waiter<V, C>, value: Option<Arc<V>>) {
        let Waiter {
            token,
            scope,
            callback,
        } = waiter;

        if Waiter::<V, C>::is_cancelled(&token, &scope) {
            lock(&self.stats).cancelled_deliveries += 1;
            return;
        }

        let posted = self.ui.post(move |ctx: &mut C| {
            // Cancellation may land between posting and draining.
            if !Waiter::<V, C>::is_cancelled(&token, &scope) {
                callback(ctx, value);
            }
        });
        if !posted {
            log::debug!("UI queue closed; dropping callback");
        }
    }

    fn load_local(&self, key: &str) -> Option<V> {
        let bytes = match self.disk.get(key) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return None,
            Err(e) => {
                log::warn!("persistent store read failed for {key}: {e}");
                return None;
            }
        };

        match self.decoder.decode(key, &bytes) {
            Ok(value) => Some(value),
            Err(e) => {
                log::warn!("dropping undecodable cache entry {key}: {e}");
                if let Err(e) = self.disk.remove(key) {
                    log::warn!("could not remove {key}: {e}");
                }
                None
            }
        }
    }

    fn load_network(&self, key: &str) -> Result<V> {
        lock(&self.stats).network_fetches += 1;
        let bytes = self.fetcher.fetch(key)?;
        let value = self.decoder.decode(key, &bytes)?;

        if let Err(e) = self.disk.put(key, &bytes) {
            log::warn!("could not persist {key}: {e}");
        }
        Ok(value)
    }

    /// Answer the local-only waiters of `flight` with `local`.
    fn settle_local(&self, flight: &Flight<V, C>, local: Option<Arc<V>>, waiters: Vec<Waiter<V, C>>) {
        flight.local.set(local.clone());
        for waiter in waiters {
            self.deliver(waiter, local.clone());
        }
    }

    /// Resolve the flight for `key` and hand the result to its waiters.
    fn finish(&self, key: &str, flight: &Flight<V, C>, value: Option<Arc<V>>) {
        if let Some(value) = &value {
            self.ram.put(key, value.clone());
        } else {
            lock(&self.stats).failures += 1;
        }

        // Populate memory before leaving the flight map so a request arriving
        // in between is a memory hit rather than a second fetch.
        {
            let mut flights = lock(&self.flights);
            if flights.get(key).is_some_and(|f| std::ptr::eq(Arc::as_ptr(f), flight)) {
                flights.remove(key);
            }
        }

        let (waiters, local_waiters) = {
            let mut state = lock(&flight.state);
            state.resolved = true;
            (
                std::mem::take(&mut state.waiters),
                std::mem::take(&mut state.local_waiters),
            )
        };
        // Whatever is left was not answered before a network phase, so the
        // flight's own result is the local one (or `None` if dropped early).
        self.settle_local(flight, value.clone(), local_waiters);
        flight.completion.set(value.clone());

        for waiter in waiters {
            self.deliver(waiter, value.clone());
        }
    }
}

/// The scheduled work for one flight.
///
/// If the job is dropped without running (cancelled or cleared) the flight
/// still resolves, with `None`.
struct FetchJob<V, C>
where
    V: Weighted + Send + Sync + 'static,
    C: 'static,
{
    inner: Arc<Inner<V, C>>,
    key: String,
    flight: Arc<Flight<V, C>>,
}

impl<V, C> FetchJob<V, C>
where
    V: Weighted + Send + Sync + 'static,
    C: 'static,
{
    fn run(self, token: &CancellationToken) {
        let value = self.resolve(token);
        self.inner.finish(&self.key, &self.flight, value);
    }

    fn resolve(&self, token: &CancellationToken) -> Option<Arc<V>> {
        let inner = &self.inner;
        let key = self.key.as_str();

        let read_store = {
            let mut state = lock(&self.flight.state);
            state.phase = Phase::Local;
            state.policy != FetchPolicy::WebOnly || !state.local_waiters.is_empty()
        };
        let local = if read_store {
            inner.load_local(key).map(Arc::new)
        } else {
            None
        };

        let policy = {
            let mut state = lock(&self.flight.state);
            state.local_result = Some(local.clone());
            // A web-only request may have joined during the disk read.
            let to_network = match state.policy {
                FetchPolicy::LocalOnly => false,
                FetchPolicy::Anywhere => local.is_none(),
                FetchPolicy::WebOnly => true,
            };
            if to_network {
                state.phase = Phase::Network;
                let waiters = std::mem::take(&mut state.local_waiters);
                let policy = state.policy;
                drop(state);
                inner.settle_local(&self.flight, local.clone(), waiters);
                policy
            } else {
                // Settled by `finish` together with everyone else.
                state.policy
            }
        };

        if local.is_some() && policy != FetchPolicy::WebOnly {
            lock(&inner.stats).disk_hits += 1;
            log::trace!("persistent store hit for {key}");
            return local;
        }
        if policy == FetchPolicy::LocalOnly {
            return None;
        }

        if token.is_cancelled() {
            log::debug!("fetch for {key} cancelled before network");
            return None;
        }

        match inner.load_network(key) {
            Ok(value) => Some(Arc::new(value)),
            Err(CacheError::Timeout(url)) => {
                log::warn!("timed out fetching {url}");
                None
            }
            Err(e) => {
                log::warn!("fetch failed for {key}: {e}");
                None
            }
        }
    }
}

impl<V, C> Drop for FetchJob<V, C>
where
    V: Weighted + Send + Sync + 'static,
    C: 'static,
{
    fn drop(&mut self) {
        let resolved = lock(&self.flight.state).resolved;
        if !resolved {
            log::debug!("fetch for {} dropped before completion", self.key);
            self.inner.finish(&self.key, &self.flight, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use photoview_scheduler::UiQueue;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    impl Weighted for String {
        fn weight(&self) -> usize {
            self.len()
        }
    }

    /// Serves `body-of-<url>` after a delay, counting calls per URL.
    struct FakeFetcher {
        calls: Mutex<HashMap<String, usize>>,
        total: AtomicUsize,
        delay: Duration,
        fail: bool,
    }

    impl FakeFetcher {
        fn new(delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                calls: Mutex::new(HashMap::new()),
                total: AtomicUsize::new(0),
                delay,
                fail: false,
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                calls: Mutex::new(HashMap::new()),
                total: AtomicUsize::new(0),
                delay: Duration::from_millis(50),
                fail: true,
            })
        }

        fn calls_for(&self, url: &str) -> usize {
            self.calls.lock().unwrap().get(url).copied().unwrap_or(0)
        }

        fn total(&self) -> usize {
            self.total.load(Ordering::SeqCst)
        }
    }

    impl Fetcher for FakeFetcher {
        fn fetch(&self, url: &str) -> Result<Vec<u8>> {
            *self.calls.lock().unwrap().entry(url.to_string()).or_default() += 1;
            self.total.fetch_add(1, Ordering::SeqCst);
            thread::sleep(self.delay);
            if self.fail {
                return Err(CacheError::Network {
                    url: url.to_string(),
                    message: "unreachable".to_string(),
                });
            }
            Ok(format!("body-of-{url}").into_bytes())
        }
    }

    fn string_decoder(_key: &str, bytes: &[u8]) -> Result<String> {
        String::from_utf8(bytes.to_vec()).map_err(|e| CacheError::Parse {
            key: "utf8".to_string(),
            message: e.to_string(),
        })
    }

    /// Everything a test needs, including the UI side.
    struct Harness {
        _dir: tempfile::TempDir,
        ui: UiQueue<Vec<Option<String>>>,
        runtime: CacheRuntime<Vec<Option<String>>>,
        cache: AsyncCache<String, Vec<Option<String>>>,
        pool: Option<WorkerPool>,
    }

    impl Harness {
        fn new(fetcher: Arc<dyn Fetcher>) -> Self {
            Self::with_dir(tempfile::tempdir().unwrap(), fetcher, true)
        }

        fn with_dir(dir: tempfile::TempDir, fetcher: Arc<dyn Fetcher>, workers: bool) -> Self {
            let ui = UiQueue::new();
            let config = CacheConfig::default().with_disk_dir(dir.path());
            let runtime = CacheRuntime::new(config, fetcher, ui.handle());
            let cache = runtime.open_cache('4', string_decoder).unwrap();
            let pool = workers.then(|| runtime.spawn_workers().unwrap());
            Self {
                _dir: dir,
                ui,
                runtime,
                cache,
                pool,
            }
        }

        fn get(&self, key: &str, policy: FetchPolicy) -> Request<String> {
            self.cache.get(key, JobPriority::Normal, policy, |log, value| {
                log.push(value.map(|v| v.to_string()));
            })
        }

        fn collect(&self, expected: usize) -> Vec<Option<String>> {
            let mut log = Vec::new();
            assert!(
                self.ui
                    .run_until(&mut log, Duration::from_secs(5), |log| log.len() >= expected),
                "timed out waiting for {expected} callbacks, got {log:?}"
            );
            log
        }
    }

    impl Drop for Harness {
        fn drop(&mut self) {
            if let Some(pool) = self.pool.take() {
                pool.shutdown();
            }
        }
    }

    #[test]
    fn test_concurrent_gets_fetch_once() {
        let fetcher = FakeFetcher::new(Duration::from_millis(100));
        let harness = Harness::new(fetcher.clone());

        let requests: Vec<_> = (0..8)
            .map(|_| harness.get("http://host/a.jpg", FetchPolicy::Anywhere))
            .collect();

        let log = harness.collect(8);
        assert_eq!(log.len(), 8);
        assert!(log
            .iter()
            .all(|v| v.as_deref() == Some("body-of-http://host/a.jpg")));
        assert_eq!(fetcher.calls_for("http://host/a.jpg"), 1);
        assert!(requests.iter().all(Request::is_done));
        assert_eq!(harness.cache.stats().joined, 7);
    }

    #[test]
    fn test_gets_from_many_threads_fetch_once() {
        let fetcher = FakeFetcher::new(Duration::from_millis(100));
        let harness = Harness::new(fetcher.clone());

        thread::scope(|scope| {
            for _ in 0..6 {
                let cache = harness.cache.clone();
                scope.spawn(move || {
                    cache.get("k", JobPriority::Normal, FetchPolicy::Anywhere, |log, v| {
                        log.push(v.map(|v| v.to_string()));
                    });
                });
            }
        });

        assert_eq!(harness.collect(6).len(), 6);
        assert_eq!(fetcher.calls_for("k"), 1);
    }

    #[test]
    fn test_second_get_is_memory_hit() {
        let fetcher = FakeFetcher::new(Duration::ZERO);
        let harness = Harness::new(fetcher.clone());

        harness.get("a", FetchPolicy::Anywhere);
        harness.collect(1);

        let request = harness.get("a", FetchPolicy::Anywhere);
        assert!(request.is_done());
        assert_eq!(request.wait(Duration::ZERO).as_deref().map(String::as_str), Some("body-of-a"));
        assert_eq!(harness.collect(1), vec![Some("body-of-a".to_string())]);

        let stats = harness.cache.stats();
        assert_eq!(stats.memory_hits, 1);
        assert_eq!(stats.network_fetches, 1);
        assert_eq!(fetcher.total(), 1);
    }

    #[test]
    fn test_local_only_never_hits_network() {
        let fetcher = FakeFetcher::new(Duration::ZERO);
        let harness = Harness::new(fetcher.clone());

        harness.get("absent", FetchPolicy::LocalOnly);
        assert_eq!(harness.collect(1), vec![None]);
        assert_eq!(fetcher.total(), 0);
        assert_eq!(harness.cache.entry_state("absent"), EntryState::Empty);
    }

    #[test]
    fn test_local_only_joiner_does_not_wait_for_network() {
        let fetcher = FakeFetcher::new(Duration::from_millis(500));
        let harness = Harness::new(fetcher.clone());
        let started = Instant::now();

        let remote = harness.get("k", FetchPolicy::Anywhere);
        let local = harness.get("k", FetchPolicy::LocalOnly);

        assert!(local.wait(Duration::from_secs(5)).is_none());
        assert!(started.elapsed() < Duration::from_millis(300));
        assert!(!remote.is_done());

        assert_eq!(harness.collect(2), vec![None, Some("body-of-k".to_string())]);
        assert_eq!(fetcher.calls_for("k"), 1);
    }

    #[test]
    fn test_local_only_joiner_during_network_phase_returns_at_once() {
        let fetcher = FakeFetcher::new(Duration::from_millis(300));
        let harness = Harness::new(fetcher.clone());

        harness.get("k", FetchPolicy::Anywhere);
        let deadline = Instant::now() + Duration::from_secs(5);
        while fetcher.total() == 0 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(2));
        }

        let local = harness.get("k", FetchPolicy::LocalOnly);
        assert!(local.is_done());
        assert!(local.wait(Duration::ZERO).is_none());
        assert_eq!(harness.collect(2), vec![None, Some("body-of-k".to_string())]);
    }

    #[test]
    fn test_persistent_store_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_path_buf();
        let fetcher = FakeFetcher::new(Duration::ZERO);

        {
            let harness = Harness::with_dir(dir, fetcher.clone(), true);
            harness.get("feed", FetchPolicy::Anywhere);
            harness.collect(1);
            assert!(root.join("4").exists());

            // Reopen over the same directory before the tempdir goes away.
            let ui: UiQueue<Vec<Option<String>>> = UiQueue::new();
            let config = CacheConfig::default().with_disk_dir(&root);
            let runtime = CacheRuntime::new(config, fetcher.clone(), ui.handle());
            let reopened: AsyncCache<String, _> = runtime.open_cache('4', string_decoder).unwrap();
            let pool = runtime.spawn_workers().unwrap();

            assert_eq!(reopened.entry_state("feed"), EntryState::Ready);
            reopened.get("feed", JobPriority::Normal, FetchPolicy::LocalOnly, |log, v| {
                log.push(v.map(|v| v.to_string()));
            });

            let mut log = Vec::new();
            assert!(ui.run_until(&mut log, Duration::from_secs(5), |l| !l.is_empty()));
            assert_eq!(log, vec![Some("body-of-feed".to_string())]);
            assert_eq!(reopened.stats().disk_hits, 1);
            pool.shutdown();
        }

        assert_eq!(fetcher.total(), 1);
    }

    #[test]
    fn test_web_only_refetches() {
        let fetcher = FakeFetcher::new(Duration::ZERO);
        let harness = Harness::new(fetcher.clone());

        harness.get("a", FetchPolicy::Anywhere);
        harness.collect(1);
        harness.get("a", FetchPolicy::WebOnly);
        harness.collect(1);

        assert_eq!(fetcher.calls_for("a"), 2);
    }

    #[test]
    fn test_failure_delivers_none_and_allows_retry() {
        let fetcher = FakeFetcher::failing();
        let harness = Harness::new(fetcher.clone());

        harness.get("a", FetchPolicy::Anywhere);
        harness.get("a", FetchPolicy::Anywhere);
        assert_eq!(harness.collect(2), vec![None, None]);
        assert_eq!(harness.cache.entry_state("a"), EntryState::Empty);

        harness.get("a", FetchPolicy::Anywhere);
        assert_eq!(harness.collect(1), vec![None]);
        assert_eq!(fetcher.calls_for("a"), 2);
        assert_eq!(harness.cache.stats().failures, 2);
    }

    #[test]
    fn test_cancelled_request_gets_no_callback_but_cache_fills() {
        let fetcher = FakeFetcher::new(Duration::from_millis(50));
        let harness = Harness::new(fetcher.clone());

        let cancelled = harness.get("a", FetchPolicy::Anywhere);
        cancelled.cancel();
        let kept = harness.get("b", FetchPolicy::Anywhere);

        assert_eq!(harness.collect(1), vec![Some("body-of-b".to_string())]);
        assert!(kept.wait(Duration::from_secs(5)).is_some());
        assert!(cancelled.wait(Duration::from_secs(5)).is_some());
        assert!(harness.cache.peek("a").is_some());

        let mut log = Vec::new();
        harness.ui.run_for(&mut log, Duration::from_millis(50));
        assert!(log.is_empty());
    }

    #[test]
    fn test_scope_cancels_every_request() {
        let fetcher = FakeFetcher::new(Duration::from_millis(50));
        let harness = Harness::new(fetcher.clone());
        let scope = CancellationToken::new();

        for key in ["a", "b", "c"] {
            harness
                .cache
                .get_scoped(key, JobPriority::Normal, FetchPolicy::Anywhere, &scope, |log, v| {
                    log.push(v.map(|v| v.to_string()));
                });
        }
        scope.cancel();

        let mut log = Vec::new();
        harness.ui.run_for(&mut log, Duration::from_millis(400));
        assert!(log.is_empty());
        assert_eq!(harness.cache.stats().cancelled_deliveries, 3);
    }

    #[test]
    fn test_wait_times_out_then_callback_still_fires() {
        let fetcher = FakeFetcher::new(Duration::from_millis(200));
        let harness = Harness::new(fetcher.clone());

        let request = harness.get("slow", FetchPolicy::Anywhere);
        assert!(request.wait(Duration::from_millis(10)).is_none());
        assert!(!request.is_done());

        assert_eq!(harness.collect(1), vec![Some("body-of-slow".to_string())]);
    }

    #[test]
    fn test_prefetch_warms_without_callback() {
        let fetcher = FakeFetcher::new(Duration::ZERO);
        let harness = Harness::new(fetcher.clone());

        harness.cache.prefetch("thumb");
        let deadline = Instant::now() + Duration::from_secs(5);
        while harness.cache.peek("thumb").is_none() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }

        assert!(harness.cache.peek("thumb").is_some());
        let mut log = Vec::new();
        assert_eq!(harness.ui.drain(&mut log), 0);
    }

    #[test]
    fn test_get_boosts_queued_prefetch() {
        let fetcher = FakeFetcher::new(Duration::ZERO);
        let harness = Harness::with_dir(tempfile::tempdir().unwrap(), fetcher, false);
        let scheduler = harness.runtime.scheduler().clone();

        harness.cache.prefetch("warm");
        assert_eq!(scheduler.peek_next_job().unwrap().priority, JobPriority::Prefetch);
        assert_eq!(harness.cache.entry_state("warm"), EntryState::Fetching);

        harness
            .cache
            .get("warm", JobPriority::High, FetchPolicy::Anywhere, |_, _| {});
        assert_eq!(scheduler.peek_next_job().unwrap().priority, JobPriority::High);
        assert_eq!(scheduler.pending_jobs(), 1);
    }

    #[test]
    fn test_cancel_prefetches_leaves_requested_keys() {
        let fetcher = FakeFetcher::new(Duration::ZERO);
        let harness = Harness::with_dir(tempfile::tempdir().unwrap(), fetcher.clone(), false);
        let scheduler = harness.runtime.scheduler().clone();

        harness.cache.prefetch("old-1");
        harness.cache.prefetch("old-2");
        harness.cache.prefetch("new-1");
        harness.get("old-3", FetchPolicy::Anywhere);
        harness.cache.prefetch("old-3");

        assert_eq!(harness.cache.cancel_prefetches(|key| key.starts_with("old")), 2);
        assert_eq!(scheduler.pending_jobs(), 2);
        assert_eq!(harness.cache.entry_state("old-1"), EntryState::Empty);
        assert_eq!(harness.cache.entry_state("new-1"), EntryState::Fetching);
        assert_eq!(harness.cache.entry_state("old-3"), EntryState::Fetching);
        assert_eq!(fetcher.total(), 0);
    }

    #[test]
    fn test_shutdown_resolves_queued_waiters_with_none() {
        let fetcher = FakeFetcher::new(Duration::ZERO);
        let harness = Harness::with_dir(tempfile::tempdir().unwrap(), fetcher.clone(), false);

        let request = harness.get("never", FetchPolicy::Anywhere);
        harness.runtime.shutdown();

        assert!(request.is_done());
        assert_eq!(harness.collect(1), vec![None]);
        assert_eq!(fetcher.total(), 0);
        assert_eq!(harness.cache.entry_state("never"), EntryState::Empty);
    }

    #[test]
    fn test_clear_empties_both_levels() {
        let fetcher = FakeFetcher::new(Duration::ZERO);
        let harness = Harness::new(fetcher);

        harness.get("a", FetchPolicy::Anywhere);
        harness.collect(1);
        assert_eq!(harness.cache.entry_state("a"), EntryState::Ready);

        harness.cache.clear().unwrap();
        assert_eq!(harness.cache.entry_state("a"), EntryState::Empty);
        assert_eq!(harness.cache.stats().disk.entry_count, 0);
    }

    #[test]
    fn test_policy_combine() {
        use FetchPolicy::*;
        assert_eq!(LocalOnly.combine(Anywhere), Anywhere);
        assert_eq!(Anywhere.combine(LocalOnly), Anywhere);
        assert_eq!(Anywhere.combine(WebOnly), WebOnly);
        assert_eq!(WebOnly.combine(LocalOnly), WebOnly);
    }
}
