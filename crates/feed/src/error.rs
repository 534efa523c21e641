use photoview_cache::CacheError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FeedError {
    /// The response body is not a JSON object.
    #[error("malformed feed: {0}")]
    Parse(#[from] serde_json::Error),

    #[error(transparent)]
    Cache(#[from] CacheError),
}

pub type Result<T> = std::result::Result<T, FeedError>;
