//! View switching, navigation and input routing.
//!
//! The coordinator is the UI context: every cache callback is posted to the
//! UI queue as a closure over `&mut ViewCoordinator` and lands in one of the
//! `deliver_*` methods below.

use crate::capability::Capabilities;
use crate::detail::DetailView;
use crate::frame::Frame;
use crate::grid_view::{GridKind, GridView};
use crate::TapOutcome;
use photoview_cache::{AsyncCache, FetchPolicy};
use photoview_feed::{Feed, FeedClient, PhotoRecord};
use photoview_imaging::Pixmap;
use std::sync::Arc;
use std::time::Duration;

/// Bounded wait for the featured feed when the viewer starts.
pub const INITIAL_FEED_WAIT: Duration = Duration::from_millis(200);

/// Shared collaborators handed to the views.
pub struct Services {
    pub images: AsyncCache<Pixmap, ViewCoordinator>,
    pub feeds: FeedClient<ViewCoordinator>,
    pub capabilities: Capabilities,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViewKind {
    Featured,
    Search,
    Detail,
}

impl From<GridKind> for ViewKind {
    fn from(kind: GridKind) -> Self {
        match kind {
            GridKind::Featured => ViewKind::Featured,
            GridKind::Search => ViewKind::Search,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    Back,
    Refresh,
    Search,
    Featured,
    Exit,
    /// Erase the last search character
    Delete,
}

/// Pointer and key input, in view coordinates.
#[derive(Debug, Clone, PartialEq)]
pub enum InputEvent {
    Press { x: i32, y: i32 },
    Tap { x: i32, y: i32 },
    Drag { start_x: i32, start_y: i32, dx: i32, dy: i32 },
    Drop,
    Flick { speed: f32, direction: f32 },
    Pinch,
    /// New contents of the search field
    Text(String),
    /// Run the search
    Submit,
}

/// Back history, one level deep.
#[derive(Debug, Default, Clone, Copy)]
pub struct NavStack {
    previous: Option<ViewKind>,
}

impl NavStack {
    pub fn push(&mut self, kind: ViewKind) {
        self.previous = Some(kind);
    }

    pub fn pop(&mut self) -> Option<ViewKind> {
        self.previous.take()
    }

    pub fn peek(&self) -> Option<ViewKind> {
        self.previous
    }
}

pub struct ViewCoordinator {
    services: Services,
    featured: GridView,
    search: GridView,
    detail: DetailView,
    current: ViewKind,
    nav: NavStack,
    running: bool,
}

impl ViewCoordinator {
    /// Build every view and show the featured grid, waiting briefly so a
    /// cached feed shows on the first paint.
    pub fn new(services: Services, width: u32, height: u32) -> Self {
        let mut coordinator = Self {
            services,
            featured: GridView::new(GridKind::Featured, width, height),
            search: GridView::new(GridKind::Search, width, height),
            detail: DetailView::new(width, height),
            current: ViewKind::Featured,
            nav: NavStack::default(),
            running: true,
        };
        coordinator.featured.load_feed_and_wait(
            &coordinator.services,
            FetchPolicy::Anywhere,
            INITIAL_FEED_WAIT,
        );
        coordinator.show_current();
        coordinator
    }

    pub fn services(&self) -> &Services {
        &self.services
    }

    pub fn current_view(&self) -> ViewKind {
        self.current
    }

    pub fn previous_view(&self) -> Option<ViewKind> {
        self.nav.peek()
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn featured(&self) -> &GridView {
        &self.featured
    }

    pub fn search(&self) -> &GridView {
        &self.search
    }

    pub fn detail(&self) -> &DetailView {
        &self.detail
    }

    fn grid_mut(&mut self, kind: GridKind) -> &mut GridView {
        match kind {
            GridKind::Featured => &mut self.featured,
            GridKind::Search => &mut self.search,
        }
    }

    fn show_current(&mut self) {
        match self.current {
            ViewKind::Featured => self.featured.on_show(&mut self.services),
            ViewKind::Search => self.search.on_show(&mut self.services),
            ViewKind::Detail => self.detail.on_show(&mut self.services),
        }
    }

    fn hide_current(&mut self) {
        match self.current {
            ViewKind::Featured => self.featured.on_hide(),
            ViewKind::Search => self.search.on_hide(),
            ViewKind::Detail => self.detail.on_hide(),
        }
    }

    fn switch_to(&mut self, kind: ViewKind) {
        self.hide_current();
        self.current = kind;
        self.show_current();
        log::debug!("showing {kind:?}");
    }

    /// Show `kind`, remembering the current view for [`Self::back`].
    pub fn show(&mut self, kind: ViewKind) {
        if kind == self.current {
            return;
        }
        self.nav.push(self.current);
        self.switch_to(kind);
    }

    /// Open the detail view on `record`.
    pub fn open_detail(&mut self, record: Arc<PhotoRecord>) {
        log::info!("opening {:?}", record.title);
        self.detail.open(record);
        self.show(ViewKind::Detail);
    }

    /// Return to the previous view, or stop when there is none.
    pub fn back(&mut self) {
        match self.nav.pop() {
            Some(previous) => self.switch_to(previous),
            None => self.exit(),
        }
    }

    pub fn exit(&mut self) {
        if self.running {
            log::info!("viewer exiting");
            self.hide_current();
            self.running = false;
        }
    }

    /// Commands offered by the current view.
    pub fn commands(&self) -> &'static [Command] {
        match self.current {
            ViewKind::Featured => &[Command::Search, Command::Refresh, Command::Exit],
            ViewKind::Search => &[Command::Featured, Command::Delete, Command::Exit],
            ViewKind::Detail => &[Command::Back],
        }
    }

    pub fn handle_command(&mut self, command: Command) {
        if !self.commands().contains(&command) && command != Command::Back {
            log::debug!("{command:?} is not available on {:?}", self.current);
            return;
        }
        match command {
            // The grids are tabs: backing out of one leaves the viewer.
            Command::Back if self.current == ViewKind::Detail => self.back(),
            Command::Back | Command::Exit => self.exit(),
            Command::Refresh => {
                self.featured.refresh(&self.services, FetchPolicy::WebOnly);
            }
            Command::Search => self.show(ViewKind::Search),
            Command::Featured => self.show(ViewKind::Featured),
            Command::Delete => self.search.erase_last_char(&self.services),
        }
    }

    /// Route one input event to the current view. Returns true if the
    /// view needs repainting.
    pub fn handle_input(&mut self, event: InputEvent) -> bool {
        match self.current {
            ViewKind::Featured => self.grid_input(GridKind::Featured, event),
            ViewKind::Search => self.grid_input(GridKind::Search, event),
            ViewKind::Detail => self.detail_input(event),
        }
    }

    fn grid_input(&mut self, kind: GridKind, event: InputEvent) -> bool {
        let Self {
            services,
            featured,
            search,
            ..
        } = self;
        let view = match kind {
            GridKind::Featured => featured,
            GridKind::Search => search,
        };
        match event {
            InputEvent::Press { .. } => view.press(),
            InputEvent::Tap { x, y } => {
                let outcome = view.tap(services, x, y);
                return self.apply_tap(outcome);
            }
            InputEvent::Drag { start_y, dy, .. } => view.drag(services, start_y, dy),
            InputEvent::Drop => view.drop_drag(),
            InputEvent::Flick { speed, direction } => view.flick(speed, direction),
            InputEvent::Pinch => view.pinch(services),
            InputEvent::Text(term) => view.set_search_term(services, &term),
            InputEvent::Submit => {
                view.submit_search(services);
            }
        }
        true
    }

    fn detail_input(&mut self, event: InputEvent) -> bool {
        match event {
            InputEvent::Press { .. } => self.detail.press(),
            InputEvent::Tap { .. } => {
                let outcome = self.detail.tap(&self.services);
                return self.apply_tap(outcome);
            }
            InputEvent::Drag { dy, .. } => self.detail.drag(dy),
            InputEvent::Drop => self.detail.drop_drag(),
            InputEvent::Flick { speed, direction } => self.detail.flick(speed, direction),
            InputEvent::Pinch | InputEvent::Text(_) | InputEvent::Submit => return false,
        }
        true
    }

    fn apply_tap(&mut self, outcome: TapOutcome) -> bool {
        match outcome {
            TapOutcome::Open(record) => self.open_detail(record),
            TapOutcome::Back => self.back(),
            TapOutcome::Consumed => {}
            TapOutcome::Ignored => return false,
        }
        true
    }

    pub fn paint(&mut self) -> Frame {
        match self.current {
            ViewKind::Featured => self.featured.paint(&self.services),
            ViewKind::Search => self.search.paint(&self.services),
            ViewKind::Detail => self.detail.paint(&self.services),
        }
    }

    /// Advance animations by `dt`. Returns true while the current view
    /// wants further frames.
    pub fn tick(&mut self, dt: Duration) -> bool {
        match self.current {
            ViewKind::Featured => self.featured.tick(dt),
            ViewKind::Search => self.search.tick(dt),
            ViewKind::Detail => self.detail.tick(dt),
        }
    }

    pub(crate) fn deliver_feed(&mut self, kind: GridKind, id: u64, feed: Option<Arc<Feed>>) {
        let Self {
            services,
            featured,
            search,
            ..
        } = self;
        let view = match kind {
            GridKind::Featured => featured,
            GridKind::Search => search,
        };
        view.apply_feed(services, id, feed);
    }

    pub(crate) fn deliver_thumbnail(
        &mut self,
        kind: GridKind,
        generation: u64,
        url: &str,
        pixmap: Option<Arc<Pixmap>>,
    ) {
        self.grid_mut(kind).apply_thumbnail(generation, url, pixmap);
    }

    pub(crate) fn deliver_detail_image(&mut self, record: &Arc<PhotoRecord>, image: Option<Arc<Pixmap>>) {
        if image.is_none() {
            log::warn!("full image unavailable: {}", record.image_url);
        }
        self.detail.apply_image(record, image);
    }
}
