//! Feed loading through the feed cache namespace.

use crate::parse::FeedDecoder;
use crate::record::Feed;
use crate::url::{FeedSizes, FeedUrls};
use photoview_cache::{AsyncCache, CacheRuntime, FetchPolicy, Request, FEED_CACHE_ID};
use photoview_scheduler::{CancellationToken, JobPriority};
use std::sync::Arc;
use std::time::Duration;

/// Fetches and caches feeds for one screen size.
pub struct FeedClient<C> {
    urls: FeedUrls,
    sizes: FeedSizes,
    cache: AsyncCache<Feed, C>,
}

impl<C: 'static> FeedClient<C> {
    /// Open the feed namespace on `runtime`.
    pub fn new(
        runtime: &CacheRuntime<C>,
        base: &str,
        screen_width: u32,
    ) -> photoview_cache::Result<Self> {
        let sizes = FeedSizes::for_screen_width(screen_width);
        Ok(Self {
            urls: FeedUrls::new(base, sizes),
            sizes,
            cache: runtime.open_cache(FEED_CACHE_ID, FeedDecoder)?,
        })
    }

    pub fn sizes(&self) -> FeedSizes {
        self.sizes
    }

    pub fn feed_url(&self, search: Option<&str>) -> String {
        self.urls.feed_url(search)
    }

    /// Load the featured feed (`search == None`) or a search feed.
    ///
    /// Feed loads always run at high priority. `on_complete` gets `None` if
    /// the feed could not be obtained under `policy`.
    pub fn fetch_feed<F>(
        &self,
        search: Option<&str>,
        policy: FetchPolicy,
        scope: &CancellationToken,
        on_complete: F,
    ) -> Request<Feed>
    where
        F: FnOnce(&mut C, Option<Arc<Feed>>) + Send + 'static,
    {
        let url = self.feed_url(search);
        log::debug!("loading feed {url} ({policy:?})");
        self.cache
            .get_scoped(&url, JobPriority::High, policy, scope, on_complete)
    }

    /// Load a feed and block up to `timeout` for it.
    ///
    /// Needs running workers on the runtime. Callbacks are not involved, so
    /// nothing is posted to the UI queue.
    pub fn fetch_feed_blocking(
        &self,
        search: Option<&str>,
        policy: FetchPolicy,
        timeout: Duration,
    ) -> Option<Arc<Feed>> {
        // A pre-cancelled scope keeps the no-op callback off the UI queue.
        let scope = CancellationToken::new();
        scope.cancel();
        self.fetch_feed(search, policy, &scope, |_, _| {})
            .wait(timeout)
    }

    pub fn cache(&self) -> &AsyncCache<Feed, C> {
        &self.cache
    }
}
