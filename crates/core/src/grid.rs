//! Two-column thumbnail grid: snapshot, resident thumbnails and layout.

use photoview_feed::{Feed, PhotoRecord};
use photoview_imaging::Pixmap;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Slack left below the last row when scrolled to the bottom.
pub const GRID_BOTTOM_MARGIN: i32 = 20;

/// Where one cell lands on screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellLayout {
    pub index: usize,
    pub x: i32,
    pub y: i32,
}

/// The feed currently shown and the thumbnails decoded for it.
///
/// The snapshot and the resident set are replaced together; every
/// replacement bumps the generation so late thumbnail deliveries for an
/// older snapshot are recognised and dropped.
#[derive(Debug)]
pub struct GridModel {
    snapshot: Arc<Feed>,
    /// Decoded thumbnails keyed by thumbnail URL
    resident: HashMap<String, Arc<Pixmap>>,
    /// Thumbnail URLs already requested for this generation
    requested: HashSet<String>,
    generation: u64,
    width: i32,
    height: i32,
    header_height: i32,
}

impl GridModel {
    pub fn new(width: u32, height: u32, header_height: u32) -> Self {
        Self {
            snapshot: Arc::new(Feed::default()),
            resident: HashMap::new(),
            requested: HashSet::new(),
            generation: 0,
            width: width as i32,
            height: height as i32,
            header_height: header_height as i32,
        }
    }

    /// Side of a (square) cell: half the view width.
    pub fn cell_side(&self) -> i32 {
        self.width / 2
    }

    pub fn header_height(&self) -> i32 {
        self.header_height
    }

    pub fn snapshot(&self) -> &Arc<Feed> {
        &self.snapshot
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn len(&self) -> usize {
        self.snapshot.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot.is_empty()
    }

    pub fn record(&self, index: usize) -> Option<&Arc<PhotoRecord>> {
        self.snapshot.get(index)
    }

    /// Swap in a new feed, dropping every resident thumbnail, and prefetch
    /// the new thumbnails through `prefetch`.
    ///
    /// Returns the new scroll lower bound.
    pub fn reload<F>(&mut self, feed: Arc<Feed>, mut prefetch: F) -> i32
    where
        F: FnMut(&str),
    {
        self.snapshot = feed;
        self.resident.clear();
        self.requested.clear();
        self.generation += 1;

        for url in self.snapshot.thumb_urls() {
            prefetch(url);
        }
        log::debug!(
            "grid generation {} with {} records",
            self.generation,
            self.snapshot.len()
        );
        self.lower_bound()
    }

    /// Drop the snapshot entirely (nothing cached for a local-only load).
    pub fn clear(&mut self) {
        self.snapshot = Arc::new(Feed::default());
        self.resident.clear();
        self.requested.clear();
        self.generation += 1;
    }

    /// Scroll lower bound for the current snapshot.
    pub fn lower_bound(&self) -> i32 {
        let side = self.cell_side();
        let count = self.snapshot.len() as i32;
        (-(count * side / 2 - self.height / 2) + side - GRID_BOTTOM_MARGIN).min(0)
    }

    /// Index under a tap at (`x`, `y`), or `None` on the header.
    ///
    /// The index may be past the end of the snapshot when the tap lands
    /// below the last row.
    pub fn hit_test(&self, x: i32, y: i32, scroll_offset: i32) -> Option<usize> {
        if y <= self.header_height {
            return None;
        }
        let side = self.cell_side();
        if side <= 0 {
            return None;
        }
        let row = (y - scroll_offset - self.header_height) / side;
        let column = if x < self.width / 2 { 0 } else { 1 };
        usize::try_from(row * 2 + column).ok()
    }

    /// Record under a tap, if any.
    pub fn record_at(&self, x: i32, y: i32, scroll_offset: i32) -> Option<&Arc<PhotoRecord>> {
        self.hit_test(x, y, scroll_offset)
            .and_then(|index| self.snapshot.get(index))
    }

    /// Cells from the top down to the first row starting below the view.
    pub fn visible_cells(&self, scroll_offset: i32) -> Vec<CellLayout> {
        let side = self.cell_side();
        let mut cells = Vec::new();
        for index in 0..self.snapshot.len() {
            let row = (index / 2) as i32;
            let x = (index % 2) as i32 * side;
            let y = self.header_height + scroll_offset + row * side;
            if y > self.height {
                break;
            }
            cells.push(CellLayout { index, x, y });
        }
        cells
    }

    pub fn thumbnail(&self, url: &str) -> Option<&Arc<Pixmap>> {
        self.resident.get(url)
    }

    /// Mark `url` as requested. Returns false if it already was during this
    /// generation.
    pub fn mark_requested(&mut self, url: &str) -> bool {
        self.requested.insert(url.to_string())
    }

    /// Store a delivered thumbnail if it belongs to the current generation.
    pub fn insert_thumbnail(&mut self, generation: u64, url: &str, pixmap: Arc<Pixmap>) -> bool {
        if generation != self.generation {
            log::trace!("dropping stale thumbnail {url}");
            return false;
        }
        self.resident.insert(url.to_string(), pixmap);
        true
    }

    pub fn resident_count(&self) -> usize {
        self.resident.len()
    }
}
