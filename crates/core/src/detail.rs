//! Full image view of one photo.

use crate::coordinator::{Services, ViewCoordinator};
use crate::frame::{wrap_text, DrawItem, Frame, LINE_HEIGHT, SPINNER_CENTER_Y, SPINNER_RADIUS};
use crate::scroll::ScrollController;
use crate::TapOutcome;
use photoview_cache::FetchPolicy;
use photoview_feed::PhotoRecord;
use photoview_imaging::Pixmap;
use photoview_scheduler::{CancellationToken, JobPriority};
use std::sync::Arc;
use std::time::Duration;

/// Left and right text inset, also used above and below the text block.
pub const DETAIL_PADDING: i32 = 5;

/// Bounded wait for the full image when the view first paints.
pub const DETAIL_IMAGE_WAIT: Duration = Duration::from_millis(100);

pub struct DetailView {
    record: Option<Arc<PhotoRecord>>,
    image: Option<Arc<Pixmap>>,
    title_lines: Vec<String>,
    scroll: ScrollController,
    spinner: bool,
    scope: CancellationToken,
    width: i32,
    height: i32,
}

impl DetailView {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            record: None,
            image: None,
            title_lines: Vec::new(),
            scroll: ScrollController::new(0),
            spinner: false,
            scope: CancellationToken::new(),
            width: width as i32,
            height: height as i32,
        }
    }

    /// Show `record` next. Anything loading for a previous record is
    /// dropped.
    pub fn open(&mut self, record: Arc<PhotoRecord>) {
        self.scope.cancel();
        self.scope = CancellationToken::new();
        self.record = Some(record);
        self.image = None;
        self.spinner = false;
        self.title_lines.clear();
    }

    pub fn record(&self) -> Option<&Arc<PhotoRecord>> {
        self.record.as_ref()
    }

    pub fn image(&self) -> Option<&Arc<Pixmap>> {
        self.image.as_ref()
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

    /// Total height of image, title, author and padding; never less than
    /// the view.
    fn content_height(&self) -> i32 {
        let image = self.image.as_ref().map_or(0, |p| p.height() as i32);
        let title = self.title_lines.len() as i32 * LINE_HEIGHT;
        (image + title + LINE_HEIGHT + DETAIL_PADDING * 2).max(self.height)
    }

    fn update_bounds(&mut self) {
        let bound = -self.content_height() + self.height;
        self.scroll.set_lower_bound(bound);
    }

    pub fn on_show(&mut self, services: &mut Services) {
        services.capabilities.set_category_bar_visible(false);
        self.scroll.set_offset(0);
        self.update_bounds();
    }

    pub fn on_hide(&mut self) {
        self.scope.cancel();
        self.image = None;
        self.spinner = false;
        self.scroll.stop();
        self.title_lines.clear();
    }

    /// Take a delivered image if it is for the record still shown.
    pub(crate) fn apply_image(&mut self, record: &Arc<PhotoRecord>, image: Option<Arc<Pixmap>>) -> bool {
        let current = self.record.as_ref().is_some_and(|r| Arc::ptr_eq(r, record));
        let Some(image) = image.filter(|_| current) else {
            return false;
        };
        self.image = Some(image);
        self.spinner = false;
        self.update_bounds();
        true
    }

    fn load_image(&mut self, services: &Services, record: &Arc<PhotoRecord>) {
        let target = record.clone();
        let request = services.images.get_scoped(
            &record.image_url,
            JobPriority::High,
            FetchPolicy::Anywhere,
            &self.scope,
            move |viewer: &mut ViewCoordinator, image| {
                viewer.deliver_detail_image(&target, image);
            },
        );
        if let Some(image) = request.wait(DETAIL_IMAGE_WAIT) {
            self.apply_image(record, Some(image));
        }
    }

    pub fn paint(&mut self, services: &Services) -> Frame {
        self.scroll.clamp();
        let mut frame = Frame::new(self.width, self.height);
        frame.back_icon = !services.capabilities.has_back_key();

        let Some(record) = self.record.clone() else {
            return frame;
        };

        if self.title_lines.is_empty() {
            self.title_lines = wrap_text(&record.title, self.width - 2 * DETAIL_PADDING);
        }

        let mut starting = false;
        if self.image.is_none() && !self.spinner {
            self.spinner = true;
            starting = true;
            self.load_image(services, &record);
        }

        let offset = self.scroll.offset();
        frame.scroll_offset = offset;
        if self.spinner {
            // Not drawn on the pass that starts it.
            frame.spinner = !starting;
        } else if let Some(image) = &self.image {
            frame.push(DrawItem::Image {
                center_x: self.width / 2,
                y: offset,
                pixmap: image.clone(),
            });
        }

        let mut text_y = match &self.image {
            Some(image) => image.height() as i32 + offset,
            None => (SPINNER_CENTER_Y + SPINNER_RADIUS) * 2,
        };
        for line in &self.title_lines {
            frame.push(DrawItem::Text {
                x: DETAIL_PADDING,
                y: text_y,
                text: line.clone(),
            });
            text_y += LINE_HEIGHT;
        }
        frame.push(DrawItem::Text {
            x: DETAIL_PADDING,
            y: text_y,
            text: record.author.clone(),
        });
        frame
    }

    /// Without a hardware back key any tap goes back.
    pub fn tap(&mut self, services: &Services) -> TapOutcome {
        if services.capabilities.has_back_key() {
            TapOutcome::Ignored
        } else {
            TapOutcome::Back
        }
    }

    pub fn press(&mut self) {
        self.scroll.stop();
    }

    pub fn drag(&mut self, delta_y: i32) {
        self.scroll.drag(delta_y);
    }

    pub fn drop_drag(&mut self) {
        self.scroll.end_drag();
    }

    pub fn flick(&mut self, speed: f32, direction: f32) {
        self.scroll.flick(speed, direction);
    }

    pub fn tick(&mut self, dt: Duration) -> bool {
        self.scroll.tick(dt).is_some() || self.spinner
    }
}
