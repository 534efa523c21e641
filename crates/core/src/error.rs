use photoview_cache::{CacheError, ConfigError};
use thiserror::Error;

/// Errors that stop the viewer from starting.
///
/// Everything recoverable (a feed entry, an image) is handled inside the
/// views and never surfaces here.
#[derive(Debug, Error)]
pub enum ViewerError {
    #[error("cache initialization failed: {0}")]
    Cache(#[from] CacheError),

    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("could not start worker threads: {0}")]
    Workers(#[source] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ViewerError>;
