//! A running viewer: caches, workers, the UI queue and the views.

use crate::capability::Capabilities;
use crate::config::ViewerConfig;
use crate::coordinator::{Services, ViewCoordinator};
use crate::error::{Result, ViewerError};
use photoview_cache::{CacheRuntime, Fetcher, HttpFetcher, PixmapDecoder, IMAGE_CACHE_ID};
use photoview_feed::FeedClient;
use photoview_scheduler::{UiQueue, WorkerPool};
use std::sync::Arc;
use std::time::Duration;

/// Owns everything the viewer needs and drives the UI queue.
///
/// The thread that owns the session is the UI thread: callbacks posted by
/// the workers only run inside [`Session::pump`] and friends.
pub struct Session {
    ui: UiQueue<ViewCoordinator>,
    coordinator: ViewCoordinator,
    runtime: CacheRuntime<ViewCoordinator>,
    pool: Option<WorkerPool>,
}

impl Session {
    /// Start against the network.
    pub fn start(config: ViewerConfig) -> Result<Self> {
        let fetcher = Arc::new(HttpFetcher::new(config.cache.network_timeout));
        Self::with_fetcher(config, fetcher)
    }

    /// Start with a custom fetcher. Fails if a persistent store cannot be
    /// opened or the workers cannot be spawned.
    pub fn with_fetcher(config: ViewerConfig, fetcher: Arc<dyn Fetcher>) -> Result<Self> {
        log::info!(
            "starting viewer {}x{} against {}",
            config.screen_width,
            config.screen_height,
            config.feed_base
        );
        let ui = UiQueue::new();
        let runtime = CacheRuntime::new(config.cache.clone(), fetcher, ui.handle());

        let images = runtime
            .open_cache(IMAGE_CACHE_ID, PixmapDecoder::for_screen_width(config.screen_width))
            .inspect_err(|e| log::error!("image cache unavailable: {e}"))?;
        let feeds = FeedClient::new(&runtime, &config.feed_base, config.screen_width)
            .inspect_err(|e| log::error!("feed cache unavailable: {e}"))?;
        let pool = runtime.spawn_workers().map_err(ViewerError::Workers)?;

        let services = Services {
            images,
            feeds,
            capabilities: Capabilities::detect(&config),
        };
        let coordinator = ViewCoordinator::new(services, config.screen_width, config.screen_height);

        Ok(Self {
            ui,
            coordinator,
            runtime,
            pool: Some(pool),
        })
    }

    pub fn coordinator(&self) -> &ViewCoordinator {
        &self.coordinator
    }

    pub fn coordinator_mut(&mut self) -> &mut ViewCoordinator {
        &mut self.coordinator
    }

    /// Run the callbacks already delivered. Returns how many ran.
    pub fn pump(&mut self) -> usize {
        self.ui.drain(&mut self.coordinator)
    }

    /// Run callbacks as they arrive for `timeout`.
    pub fn pump_for(&mut self, timeout: Duration) -> usize {
        self.ui.run_for(&mut self.coordinator, timeout)
    }

    /// Run callbacks until `done` holds or `timeout` passes.
    pub fn run_until<F>(&mut self, timeout: Duration, done: F) -> bool
    where
        F: FnMut(&ViewCoordinator) -> bool,
    {
        self.ui.run_until(&mut self.coordinator, timeout, done)
    }

    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        if let Some(pool) = self.pool.take() {
            self.runtime.shutdown();
            pool.shutdown();
            log::info!("viewer stopped");
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.stop();
    }
}
