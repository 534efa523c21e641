//! Photo metadata as parsed from a feed.

use photoview_cache::Weighted;
use serde::Serialize;
use std::sync::Arc;

/// Title shown by the placeholder record of an empty feed.
pub const NO_RESULTS_TITLE: &str = "No Results";

/// One photo of a feed. Never mutated after parsing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PhotoRecord {
    pub title: String,
    pub author: String,
    pub thumb_url: String,
    pub image_url: String,
}

impl PhotoRecord {
    pub fn new(
        title: impl Into<String>,
        author: impl Into<String>,
        thumb_url: impl Into<String>,
        image_url: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            author: author.into(),
            thumb_url: thumb_url.into(),
            image_url: image_url.into(),
        }
    }

    /// The sentinel standing in for an empty result set.
    pub fn no_results() -> Self {
        Self::new(NO_RESULTS_TITLE, "", "", "")
    }

    /// True for records without a thumbnail to load.
    pub fn is_placeholder(&self) -> bool {
        self.thumb_url.is_empty()
    }
}

/// An ordered, immutable page of photos, in feed order.
///
/// A new load produces a new `Feed`; the grid swaps the whole snapshot, so
/// thumbnail callbacks can compare records by identity (`Arc::ptr_eq`).
#[derive(Debug, Clone, Default, Serialize)]
pub struct Feed {
    records: Vec<Arc<PhotoRecord>>,
}

impl Feed {
    pub fn new(records: Vec<PhotoRecord>) -> Self {
        Self {
            records: records.into_iter().map(Arc::new).collect(),
        }
    }

    /// A feed holding only the "No Results" sentinel.
    pub fn no_results() -> Self {
        Self::new(vec![PhotoRecord::no_results()])
    }

    pub fn records(&self) -> &[Arc<PhotoRecord>] {
        &self.records
    }

    pub fn get(&self, index: usize) -> Option<&Arc<PhotoRecord>> {
        self.records.get(index)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Thumbnail URLs of every real record, in order.
    pub fn thumb_urls(&self) -> impl Iterator<Item = &str> {
        self.records
            .iter()
            .filter(|r| !r.is_placeholder())
            .map(|r| r.thumb_url.as_str())
    }
}

impl Weighted for Feed {
    fn weight(&self) -> usize {
        self.records
            .iter()
            .map(|r| {
                std::mem::size_of::<PhotoRecord>()
                    + r.title.len()
                    + r.author.len()
                    + r.thumb_url.len()
                    + r.image_url.len()
            })
            .sum()
    }
}
