//! Feed endpoint URL construction.

use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};

/// Public photo feed service.
pub const DEFAULT_FEED_BASE: &str = "http://picasaweb.google.com/data/feed/base/";

/// Entries requested per feed page.
pub const RESULTS_PER_PAGE: u32 = 20;

/// Screens narrower than this get the small size class.
const WIDE_SCREEN: u32 = 256;

/// Thumbnail and full image sizes requested from the service, chosen once
/// from the screen width.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeedSizes {
    /// Side of the square (cropped) thumbnail, in pixels
    pub thumb_side: u32,
    /// Longest side of the full image, in pixels
    pub image_max: u32,
}

impl FeedSizes {
    pub fn for_screen_width(width: u32) -> Self {
        if width < WIDE_SCREEN {
            Self {
                thumb_side: 128,
                image_max: 288,
            }
        } else {
            Self {
                thumb_side: 256,
                image_max: 720,
            }
        }
    }
}

/// Builds the featured and search URLs for one base endpoint.
#[derive(Debug, Clone)]
pub struct FeedUrls {
    featured: String,
    search: String,
}

impl FeedUrls {
    pub fn new(base: &str, sizes: FeedSizes) -> Self {
        let base = if base.ends_with('/') {
            base.to_string()
        } else {
            format!("{base}/")
        };
        let options = format!(
            "?alt=json&kind=photo&max-results={RESULTS_PER_PAGE}&thumbsize={}c\
             &fields=entry(title,author(name),updated,media:group)&imgmax={}",
            sizes.thumb_side, sizes.image_max
        );

        Self {
            featured: format!("{base}featured{options}"),
            search: format!("{base}all{options}&q="),
        }
    }

    /// The featured album URL, or the search URL when `search` is given.
    ///
    /// The URL doubles as the feed's cache key.
    pub fn feed_url(&self, search: Option<&str>) -> String {
        match search {
            Some(term) => format!("{}{}", self.search, utf8_percent_encode(term, NON_ALPHANUMERIC)),
            None => self.featured.clone(),
        }
    }
}
