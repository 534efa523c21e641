//! Featured and search thumbnail grids.
//!
//! A `GridView` composes a [`GridModel`], a [`ScrollController`] and the
//! shared caches. Results come back through the coordinator, which routes
//! them here by [`GridKind`].

use crate::coordinator::{Services, ViewCoordinator};
use crate::frame::{DrawItem, Frame, NO_RESULT_TEXT};
use crate::grid::GridModel;
use crate::scroll::ScrollController;
use crate::TapOutcome;
use photoview_cache::{FetchPolicy, Request};
use photoview_feed::Feed;
use photoview_imaging::Pixmap;
use photoview_scheduler::{CancellationToken, JobPriority};
use std::sync::Arc;
use std::time::Duration;

/// Height of the search field heading the search grid.
pub const SEARCH_BAR_HEIGHT: u32 = 35;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GridKind {
    Featured,
    Search,
}

#[derive(Debug, Default)]
struct SearchField {
    term: String,
    focused: bool,
}

#[derive(Debug, Clone, Copy)]
struct PendingLoad {
    id: u64,
    policy: FetchPolicy,
}

pub struct GridView {
    kind: GridKind,
    model: GridModel,
    scroll: ScrollController,
    width: i32,
    height: i32,
    spinner: bool,
    /// Scope of outstanding feed loads
    feed_scope: CancellationToken,
    /// Scope of thumbnail requests for the current snapshot
    thumb_scope: CancellationToken,
    next_load: u64,
    pending: Option<PendingLoad>,
    /// Drag distance since the finger went down
    drag_travel: i32,
    search: Option<SearchField>,
}

impl GridView {
    pub fn new(kind: GridKind, width: u32, height: u32) -> Self {
        let (header, search) = match kind {
            GridKind::Featured => (0, None),
            GridKind::Search => (SEARCH_BAR_HEIGHT, Some(SearchField::default())),
        };
        Self {
            kind,
            model: GridModel::new(width, height, header),
            scroll: ScrollController::new(-(height as i32)),
            width: width as i32,
            height: height as i32,
            spinner: false,
            feed_scope: CancellationToken::new(),
            thumb_scope: CancellationToken::new(),
            next_load: 0,
            pending: None,
            drag_travel: 0,
            search,
        }
    }

    pub fn kind(&self) -> GridKind {
        self.kind
    }

    pub fn model(&self) -> &GridModel {
        &self.model
    }

    pub fn scroll(&self) -> &ScrollController {
        &self.scroll
    }

    pub fn scroll_mut(&mut self) -> &mut ScrollController {
        &mut self.scroll
    }

    pub fn is_spinning(&self) -> bool {
        self.spinner
    }

    pub fn is_loading(&self) -> bool {
        self.pending.is_some()
    }

    /// Load the feed for this view. Supersedes any load still outstanding.
    pub fn load_feed(&mut self, services: &Services, policy: FetchPolicy) -> Request<Feed> {
        self.start_load(services, policy).1
    }

    fn start_load(&mut self, services: &Services, policy: FetchPolicy) -> (u64, Request<Feed>) {
        self.feed_scope.cancel();
        self.feed_scope = CancellationToken::new();

        self.next_load += 1;
        let id = self.next_load;
        self.pending = Some(PendingLoad { id, policy });
        if policy != FetchPolicy::LocalOnly {
            self.spinner = true;
        }

        let kind = self.kind;
        let term = self.search.as_ref().map(|s| s.term.as_str());
        log::info!("{kind:?} loading feed {id} ({policy:?})");
        let request =
            services
                .feeds
                .fetch_feed(term, policy, &self.feed_scope, move |viewer: &mut ViewCoordinator, feed| {
                    viewer.deliver_feed(kind, id, feed);
                });
        (id, request)
    }

    /// Load and block up to `wait` so a cached feed shows without flicker.
    pub fn load_feed_and_wait(&mut self, services: &Services, policy: FetchPolicy, wait: Duration) {
        let (id, request) = self.start_load(services, policy);
        if let Some(feed) = request.wait(wait) {
            self.apply_feed(services, id, Some(feed));
        }
    }

    /// Snap to the top and reload.
    pub fn refresh(&mut self, services: &Services, policy: FetchPolicy) -> Request<Feed> {
        self.scroll.reset_to_top(-self.height);
        self.load_feed(services, policy)
    }

    /// Apply the result of load `id`. Results of superseded or already
    /// applied loads are ignored.
    pub(crate) fn apply_feed(&mut self, services: &Services, id: u64, feed: Option<Arc<Feed>>) -> bool {
        let Some(pending) = self.pending.filter(|p| p.id == id) else {
            return false;
        };
        self.pending = None;
        self.spinner = false;

        match feed {
            Some(feed) => self.show_feed(services, feed),
            None if pending.policy == FetchPolicy::LocalOnly => {
                // Nothing cached for this term yet.
                self.renew_thumb_scope();
                self.model.clear();
                self.scroll.set_lower_bound(-self.height);
            }
            None => {
                log::warn!("{:?} feed load {id} failed", self.kind);
                self.show_feed(services, Arc::new(Feed::no_results()));
            }
        }
        true
    }

    fn show_feed(&mut self, services: &Services, feed: Arc<Feed>) {
        let previous = self.model.snapshot().clone();
        services.images.cancel_prefetches(|key| {
            previous.thumb_urls().any(|url| url == key) && !feed.thumb_urls().any(|url| url == key)
        });
        self.renew_thumb_scope();
        self.scroll.set_offset(0);
        let images = &services.images;
        let bound = self.model.reload(feed, |url| images.prefetch(url));
        self.scroll.set_lower_bound(bound);
    }

    pub(crate) fn apply_thumbnail(&mut self, generation: u64, url: &str, pixmap: Option<Arc<Pixmap>>) {
        match pixmap {
            Some(pixmap) => {
                self.model.insert_thumbnail(generation, url, pixmap);
            }
            None => log::debug!("thumbnail unavailable: {url}"),
        }
    }

    fn renew_thumb_scope(&mut self) {
        self.thumb_scope.cancel();
        self.thumb_scope = CancellationToken::new();
    }

    fn request_thumbnail(&self, services: &Services, url: &str) {
        let kind = self.kind;
        let generation = self.model.generation();
        let key = url.to_string();
        services.images.get_scoped(
            url,
            JobPriority::Normal,
            FetchPolicy::Anywhere,
            &self.thumb_scope,
            move |viewer: &mut ViewCoordinator, pixmap| {
                viewer.deliver_thumbnail(kind, generation, &key, pixmap);
            },
        );
    }

    pub fn paint(&mut self, services: &Services) -> Frame {
        self.scroll.clamp();
        let offset = self.scroll.offset();

        let mut frame = Frame::new(self.width, self.height);
        frame.scroll_offset = offset;
        frame.category_bar = services.capabilities.category_bar_visible();

        let side = self.model.cell_side();
        let snapshot = self.model.snapshot().clone();
        for cell in self.model.visible_cells(offset) {
            let Some(record) = snapshot.get(cell.index) else {
                break;
            };

            if let Some(pixmap) = self.model.thumbnail(&record.thumb_url) {
                frame.push(DrawItem::Thumbnail {
                    index: cell.index,
                    x: cell.x,
                    y: cell.y,
                    pixmap: pixmap.clone(),
                });
            } else if record.is_placeholder() {
                frame.push(DrawItem::Text {
                    x: 0,
                    y: self.model.header_height(),
                    text: NO_RESULT_TEXT.to_string(),
                });
            } else {
                if self.model.mark_requested(&record.thumb_url) {
                    self.request_thumbnail(services, &record.thumb_url);
                }
                frame.push(DrawItem::Placeholder {
                    index: cell.index,
                    x: cell.x,
                    y: cell.y,
                    side,
                });
            }
        }

        if let Some(search) = &self.search {
            frame.push(DrawItem::SearchBar {
                term: search.term.clone(),
                focused: search.focused,
                height: SEARCH_BAR_HEIGHT as i32,
            });
        }
        frame.spinner = self.spinner;
        frame
    }

    /// Finger down: stops a running flick.
    pub fn press(&mut self) {
        self.drag_travel = 0;
        self.scroll.stop();
    }

    pub fn tap(&mut self, services: &Services, x: i32, y: i32) -> TapOutcome {
        if self.scroll.stop() {
            return TapOutcome::Consumed;
        }
        if services.capabilities.tap_on_category_bar(y, self.height) {
            return TapOutcome::Consumed;
        }

        let offset = self.scroll.offset();
        let record = self
            .model
            .record_at(x, y, offset)
            .filter(|record| !record.is_placeholder())
            .cloned();
        match &mut self.search {
            None => match record {
                Some(record) => TapOutcome::Open(record),
                None => TapOutcome::Ignored,
            },
            // The search grid consumes every tap.
            Some(search) => {
                if self.model.hit_test(x, y, offset).is_none() {
                    return TapOutcome::Consumed;
                }
                if search.focused {
                    search.focused = false;
                    return TapOutcome::Consumed;
                }
                match record {
                    Some(record) => TapOutcome::Open(record),
                    None => TapOutcome::Consumed,
                }
            }
        }
    }

    pub fn drag(&mut self, services: &Services, start_y: i32, delta_y: i32) {
        self.drag_travel += delta_y;
        if services
            .capabilities
            .drag_on_category_bar(start_y + self.drag_travel, self.height)
        {
            return;
        }
        self.scroll.drag(delta_y);
    }

    pub fn drop_drag(&mut self) {
        self.drag_travel = 0;
        self.scroll.end_drag();
    }

    pub fn flick(&mut self, speed: f32, direction: f32) {
        self.drag_travel = 0;
        self.scroll.flick(speed, direction);
    }

    /// Pinch reloads the featured grid from the network.
    pub fn pinch(&mut self, services: &Services) {
        self.scroll.stop();
        if self.kind == GridKind::Featured {
            self.refresh(services, FetchPolicy::WebOnly);
        }
    }

    /// Advance the scroll animation. Returns true if a redraw is needed.
    pub fn tick(&mut self, dt: Duration) -> bool {
        self.scroll.tick(dt).is_some() || self.spinner
    }

    pub fn on_show(&mut self, services: &mut Services) {
        match &mut self.search {
            None => services.capabilities.set_category_bar_visible(true),
            Some(search) => {
                let no_bar = !services.capabilities.category_bar.is_supported();
                if (no_bar || self.model.is_empty()) && search.term.is_empty() {
                    search.focused = true;
                } else {
                    services.capabilities.set_category_bar_visible(true);
                }
            }
        }
    }

    pub fn on_hide(&mut self) {
        if let Some(search) = &mut self.search {
            search.focused = false;
        }
        self.scroll.stop();
        self.spinner = false;
    }

    pub fn search_term(&self) -> Option<&str> {
        self.search.as_ref().map(|s| s.term.as_str())
    }

    pub fn is_search_focused(&self) -> bool {
        self.search.as_ref().is_some_and(|s| s.focused)
    }

    pub fn set_search_focused(&mut self, focused: bool) {
        if let Some(search) = &mut self.search {
            search.focused = focused;
        }
    }

    /// Every edit shows whatever is already cached for the new term.
    pub fn set_search_term(&mut self, services: &Services, term: &str) {
        let Some(search) = &mut self.search else {
            return;
        };
        if search.term == term {
            return;
        }
        search.term = term.to_string();
        self.refresh(services, FetchPolicy::LocalOnly);
    }

    pub fn erase_last_char(&mut self, services: &Services) {
        let Some(term) = self.search_term() else {
            return;
        };
        let mut term = term.to_string();
        if term.pop().is_some() {
            self.set_search_term(services, &term);
        }
    }

    /// Run the search against the network.
    pub fn submit_search(&mut self, services: &Services) -> Option<Request<Feed>> {
        self.search.as_mut()?.focused = false;
        self.scroll.set_offset(0);
        Some(self.load_feed(services, FetchPolicy::WebOnly))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ViewerConfig;
    use crate::coordinator::testing::Offline;
    use photoview_feed::PhotoRecord;

    fn feed(count: usize) -> Arc<Feed> {
        let records = (0..count)
            .map(|i| {
                PhotoRecord::new(
                    format!("photo {i}"),
                    "ann",
                    format!("http://img.test/t{i}.png"),
                    format!("http://img.test/i{i}.png"),
                )
            })
            .collect();
        Arc::new(Feed::new(records))
    }

    fn loaded(offline: &Offline, kind: GridKind, count: usize) -> GridView {
        let mut view = GridView::new(kind, 240, 320);
        view.show_feed(&offline.services, feed(count));
        view
    }

    #[test]
    fn test_failed_load_shows_no_results() {
        let offline = Offline::new(ViewerConfig::default());
        let mut view = GridView::new(GridKind::Featured, 240, 320);

        view.load_feed(&offline.services, FetchPolicy::Anywhere);
        assert!(view.is_spinning());
        assert!(view.apply_feed(&offline.services, 1, None));

        assert!(!view.is_spinning());
        assert!(!view.is_loading());
        assert_eq!(view.model().len(), 1);
        assert!(view.model().record(0).unwrap().is_placeholder());
        let frame = view.paint(&offline.services);
        assert_eq!(frame.texts(), vec![NO_RESULT_TEXT]);
        assert_eq!(frame.placeholders(), 0);
    }

    #[test]
    fn test_local_miss_clears_grid() {
        let offline = Offline::new(ViewerConfig::default());
        let mut view = loaded(&offline, GridKind::Search, 4);

        view.load_feed(&offline.services, FetchPolicy::LocalOnly);
        assert!(!view.is_spinning());
        assert!(view.apply_feed(&offline.services, 1, None));
        assert!(view.model().is_empty());
    }

    #[test]
    fn test_superseded_load_is_ignored() {
        let offline = Offline::new(ViewerConfig::default());
        let mut view = GridView::new(GridKind::Featured, 240, 320);

        view.load_feed(&offline.services, FetchPolicy::Anywhere);
        view.load_feed(&offline.services, FetchPolicy::WebOnly);
        assert!(!view.apply_feed(&offline.services, 1, Some(feed(3))));
        assert!(view.model().is_empty());

        assert!(view.apply_feed(&offline.services, 2, Some(feed(3))));
        assert_eq!(view.model().len(), 3);
        assert!(!view.apply_feed(&offline.services, 2, Some(feed(5))));
    }

    #[test]
    fn test_wait_applies_result_of_its_own_load() {
        let offline = Offline::new(ViewerConfig::default());
        let mut view = GridView::new(GridKind::Featured, 240, 320);
        view.load_feed(&offline.services, FetchPolicy::Anywhere);

        // Nothing is served, so the wait times out and the load stays pending.
        view.load_feed_and_wait(&offline.services, FetchPolicy::Anywhere, Duration::from_millis(5));
        assert!(view.is_loading());
        assert!(!view.apply_feed(&offline.services, 1, Some(feed(2))));
        assert!(view.apply_feed(&offline.services, 2, Some(feed(2))));
    }

    #[test]
    fn test_new_snapshot_drops_queued_prefetches_of_old_one() {
        let offline = Offline::new(ViewerConfig::default());
        let scheduler = offline.runtime.scheduler();
        let mut view = loaded(&offline, GridKind::Featured, 6);
        assert_eq!(scheduler.pending_jobs(), 6);

        // The first two thumbnails are shared with the new snapshot.
        view.show_feed(&offline.services, feed(2));
        assert_eq!(scheduler.pending_jobs(), 2);
        assert_eq!(view.model().len(), 2);
    }

    #[test]
    fn test_tap_stops_flick_without_opening() {
        let offline = Offline::new(ViewerConfig::default());
        let mut view = loaded(&offline, GridKind::Featured, 20);

        view.flick(4000.0, -std::f32::consts::FRAC_PI_2);
        assert!(view.scroll().is_animating());

        assert_eq!(view.tap(&offline.services, 10, 60), TapOutcome::Consumed);
        assert!(!view.scroll().is_animating());

        match view.tap(&offline.services, 10, 60) {
            TapOutcome::Open(record) => assert_eq!(record.title, "photo 0"),
            other => panic!("expected the first photo to open, got {other:?}"),
        }
    }

    #[test]
    fn test_tap_below_last_row() {
        let offline = Offline::new(ViewerConfig::default());
        let mut featured = loaded(&offline, GridKind::Featured, 1);
        let mut search = loaded(&offline, GridKind::Search, 1);

        assert_eq!(featured.tap(&offline.services, 200, 60), TapOutcome::Ignored);
        assert_eq!(search.tap(&offline.services, 200, 60), TapOutcome::Consumed);
    }

    #[test]
    fn test_pinch_reloads_featured_only() {
        let offline = Offline::new(ViewerConfig::default());
        let scheduler = offline.runtime.scheduler();

        let mut featured = loaded(&offline, GridKind::Featured, 2);
        let queued = scheduler.pending_jobs();
        featured.pinch(&offline.services);
        assert!(featured.is_loading());
        assert!(featured.is_spinning());
        assert_eq!(featured.pending.map(|p| p.policy), Some(FetchPolicy::WebOnly));
        assert_eq!(scheduler.pending_jobs(), queued + 1);

        let mut search = loaded(&offline, GridKind::Search, 2);
        let queued = scheduler.pending_jobs();
        search.pinch(&offline.services);
        assert!(!search.is_loading());
        assert_eq!(scheduler.pending_jobs(), queued);
    }

    #[test]
    fn test_paint_reports_offset_clamped_to_new_bound() {
        let offline = Offline::new(ViewerConfig::default());
        let mut view = loaded(&offline, GridKind::Featured, 20);

        let bottom = view.scroll().lower_bound();
        assert!(bottom < -100);
        view.scroll_mut().set_offset(bottom);
        view.scroll_mut().set_lower_bound(-40);

        let frame = view.paint(&offline.services);
        assert_eq!(frame.scroll_offset, -40);
        assert_eq!(view.scroll().offset(), -40);
    }

    #[test]
    fn test_first_paint_requests_visible_thumbnails_once() {
        let offline = Offline::new(ViewerConfig::default());
        let mut view = loaded(&offline, GridKind::Featured, 4);

        let frame = view.paint(&offline.services);
        assert_eq!(frame.placeholders(), 4);
        for i in 0..4 {
            assert!(!view.model.mark_requested(&format!("http://img.test/t{i}.png")));
        }
    }
}
