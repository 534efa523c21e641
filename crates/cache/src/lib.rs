//! Photoview Cache Library
//!
//! Two-level (memory and persistent) cache for remote resources, with
//! background fetching on the shared worker pool and de-duplication of
//! concurrent requests for the same key.

pub mod async_cache;
pub mod config;
pub mod decoder;
pub mod disk;
mod error;
pub mod fetch;
pub mod ram;

pub use async_cache::{
    AsyncCache, AsyncCacheStats, CacheRuntime, EntryState, FetchPolicy, Request, FEED_CACHE_ID,
    IMAGE_CACHE_ID,
};
pub use config::{CacheConfig, ConfigError};
pub use decoder::{PixmapDecoder, ResourceDecoder};
pub use disk::{key_digest, DiskCacheStats, DiskStore};
pub use error::{CacheError, Result};
pub use fetch::{Fetcher, HttpFetcher, MAX_BODY_BYTES};
pub use ram::{CacheStats, RamCache, Weighted};
