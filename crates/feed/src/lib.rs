//! Photoview Feed Library
//!
//! Builds feed URLs for the photo service, parses its JSON responses into
//! [`PhotoRecord`]s and loads them through the feed cache namespace.

mod client;
mod error;
pub mod parse;
pub mod record;
pub mod url;

pub use client::FeedClient;
pub use error::{FeedError, Result};
pub use parse::{parse_feed, FeedDecoder};
pub use record::{Feed, PhotoRecord, NO_RESULTS_TITLE};
pub use url::{FeedSizes, FeedUrls, DEFAULT_FEED_BASE, RESULTS_PER_PAGE};
