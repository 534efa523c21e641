//! Paint output.
//!
//! Views describe what to draw as a [`Frame`]; a platform layer (or a test)
//! turns it into pixels.

use photoview_imaging::Pixmap;
use std::sync::Arc;

/// Fixed advance of one character of the default font.
pub const CHAR_WIDTH: i32 = 6;

/// Line height of the default font.
pub const LINE_HEIGHT: i32 = 14;

/// Spinner position in the detail view.
pub const SPINNER_CENTER_Y: i32 = 50;
pub const SPINNER_RADIUS: i32 = 12;

/// Text shown in place of an empty grid.
pub const NO_RESULT_TEXT: &str = "No Result.";

#[derive(Debug, Clone)]
pub enum DrawItem {
    /// A resident thumbnail
    Thumbnail {
        index: usize,
        x: i32,
        y: i32,
        pixmap: Arc<Pixmap>,
    },
    /// Dark block standing in for a thumbnail still loading
    Placeholder { index: usize, x: i32, y: i32, side: i32 },
    /// Full image, horizontally centred at `center_x`
    Image {
        center_x: i32,
        y: i32,
        pixmap: Arc<Pixmap>,
    },
    Text { x: i32, y: i32, text: String },
    /// Search field at the top of the search view
    SearchBar { term: String, focused: bool, height: i32 },
}

/// Everything one paint pass produces.
#[derive(Debug, Clone, Default)]
pub struct Frame {
    pub width: i32,
    pub height: i32,
    pub items: Vec<DrawItem>,
    pub spinner: bool,
    pub category_bar: bool,
    /// Soft back icon, drawn when the device has no back key
    pub back_icon: bool,
    pub scroll_offset: i32,
}

impl Frame {
    pub fn new(width: i32, height: i32) -> Self {
        Self {
            width,
            height,
            ..Self::default()
        }
    }

    pub fn push(&mut self, item: DrawItem) {
        self.items.push(item);
    }

    pub fn thumbnails(&self) -> usize {
        self.items
            .iter()
            .filter(|item| matches!(item, DrawItem::Thumbnail { .. }))
            .count()
    }

    pub fn placeholders(&self) -> usize {
        self.items
            .iter()
            .filter(|item| matches!(item, DrawItem::Placeholder { .. }))
            .count()
    }

    pub fn texts(&self) -> Vec<&str> {
        self.items
            .iter()
            .filter_map(|item| match item {
                DrawItem::Text { text, .. } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn image(&self) -> Option<&Arc<Pixmap>> {
        self.items.iter().find_map(|item| match item {
            DrawItem::Image { pixmap, .. } => Some(pixmap),
            _ => None,
        })
    }
}

/// Width of `text` in the default font.
pub fn text_width(text: &str) -> i32 {
    text.chars().count() as i32 * CHAR_WIDTH
}

/// Greedy word wrap to `max_width`. Words wider than a line are broken.
pub fn wrap_text(text: &str, max_width: i32) -> Vec<String> {
    let max_chars = (max_width / CHAR_WIDTH).max(1) as usize;
    let mut lines = Vec::new();
    let mut line = String::new();

    for word in text.split_whitespace() {
        let mut word: Vec<char> = word.chars().collect();
        while word.len() > max_chars {
            if !line.is_empty() {
                lines.push(std::mem::take(&mut line));
            }
            lines.push(word.drain(..max_chars).collect());
        }
        if word.is_empty() {
            continue;
        }

        let needed = if line.is_empty() {
            word.len()
        } else {
            line.chars().count() + 1 + word.len()
        };
        if needed > max_chars {
            lines.push(std::mem::take(&mut line));
        }
        if !line.is_empty() {
            line.push(' ');
        }
        line.extend(word);
    }

    if !line.is_empty() || lines.is_empty() {
        lines.push(line);
    }
    lines
}
