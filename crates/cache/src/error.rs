use std::io;

use crate::config::ConfigError;

/// Errors raised while resolving a cache entry.
///
/// Inside [`AsyncCache`](crate::AsyncCache) these are logged and turned into
/// a `None` delivery; they only surface directly from construction and from
/// the synchronous helpers.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("network error for {url}: {message}")]
    Network { url: String, message: String },

    #[error("timed out fetching {0}")]
    Timeout(String),

    #[error("could not parse {key}: {message}")]
    Parse { key: String, message: String },

    #[error("resource unavailable: {0}")]
    ResourceUnavailable(String),

    #[error("cache I/O error: {0}")]
    Io(#[from] io::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

pub type Result<T> = std::result::Result<T, CacheError>;
