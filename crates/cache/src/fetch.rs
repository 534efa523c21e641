//! Network access behind a trait so the cache can be driven without I/O.

use crate::{CacheError, Result};
use std::error::Error as _;
use std::fs;
use std::io::{self, Read};
use std::time::Duration;

/// Largest response body accepted, in bytes.
pub const MAX_BODY_BYTES: u64 = 16 * 1024 * 1024;

/// Retrieves the raw bytes behind a URL.
///
/// Called from worker threads only.
pub trait Fetcher: Send + Sync {
    fn fetch(&self, url: &str) -> Result<Vec<u8>>;
}

/// `ureq` backed fetcher.
///
/// Also accepts `file://` URLs (any query string is ignored), which lets a
/// feed mirror or test fixture stand in for the remote service.
pub struct HttpFetcher {
    agent: ureq::Agent,
    user_agent: String,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(timeout).build();
        Self {
            agent,
            user_agent: format!("photoview/{}", env!("CARGO_PKG_VERSION")),
        }
    }

    fn fetch_file(path: &str) -> Result<Vec<u8>> {
        let path = path.split_once('?').map_or(path, |(p, _)| p);
        fs::read(path).map_err(|e| CacheError::Network {
            url: format!("file://{path}"),
            message: e.to_string(),
        })
    }
}

impl Fetcher for HttpFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        if let Some(path) = url.strip_prefix("file://") {
            return Self::fetch_file(path);
        }

        log::debug!("GET {url}");
        let response = self
            .agent
            .get(url)
            .set("User-Agent", &self.user_agent)
            .call()
            .map_err(|e| map_ureq_error(url, e))?;

        let mut body = Vec::new();
        response
            .into_reader()
            .take(MAX_BODY_BYTES)
            .read_to_end(&mut body)
            .map_err(|e| map_io_error(url, e))?;

        Ok(body)
    }
}

fn map_io_error(url: &str, e: io::Error) -> CacheError {
    match e.kind() {
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => CacheError::Timeout(url.to_string()),
        _ => CacheError::Network {
            url: url.to_string(),
            message: e.to_string(),
        },
    }
}

fn map_ureq_error(url: &str, e: ureq::Error) -> CacheError {
    match e {
        ureq::Error::Status(status, _) => CacheError::Network {
            url: url.to_string(),
            message: format!("HTTP {status}"),
        },
        ureq::Error::Transport(transport) => {
            let timed_out = transport
                .source()
                .and_then(|s| s.downcast_ref::<io::Error>())
                .is_some_and(|io| matches!(io.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock));
            if timed_out {
                CacheError::Timeout(url.to_string())
            } else {
                CacheError::Network {
                    url: url.to_string(),
                    message: transport.to_string(),
                }
            }
        }
    }
}
