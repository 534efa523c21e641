//! Cache configuration.
//!
//! Sizes, the persistent store location and worker pool settings. Values can
//! come from a `key = value` file, from `PHOTOVIEW_*` environment variables,
//! or from the builder methods.

use photoview_scheduler::{WorkerPoolConfig, MAX_WORKERS, MIN_WORKERS};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

const MB: usize = 1024 * 1024;

/// Configuration for the cache system.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheConfig {
    /// In-memory working set limit per cache namespace, in bytes
    pub ram_cache_size: usize,
    /// Persistent store limit per cache namespace, in bytes
    pub disk_cache_size: usize,
    /// Root directory of the persistent store
    pub disk_cache_dir: PathBuf,
    /// Number of background workers (2 to 4)
    pub num_workers: usize,
    /// Idle worker poll interval
    pub poll_interval: Duration,
    /// Network request timeout
    pub network_timeout: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ram_cache_size: 32 * MB,
            disk_cache_size: 64 * MB,
            disk_cache_dir: Self::default_cache_dir(),
            num_workers: MIN_WORKERS,
            poll_interval: Duration::from_millis(10),
            network_timeout: Duration::from_secs(20),
        }
    }
}

impl CacheConfig {
    /// Creates a configuration with sizes in megabytes.
    ///
    /// # Arguments
    /// * `ram_mb` - In-memory working set size in megabytes
    /// * `disk_mb` - Persistent store size in megabytes
    /// * `disk_dir` - Root directory of the persistent store
    pub fn new(ram_mb: usize, disk_mb: usize, disk_dir: PathBuf) -> Self {
        Self {
            ram_cache_size: ram_mb * MB,
            disk_cache_size: disk_mb * MB,
            disk_cache_dir: disk_dir,
            ..Self::default()
        }
    }

    pub fn with_ram_mb(mut self, mb: usize) -> Self {
        self.ram_cache_size = mb * MB;
        self
    }

    pub fn with_disk_mb(mut self, mb: usize) -> Self {
        self.disk_cache_size = mb * MB;
        self
    }

    pub fn with_disk_dir<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.disk_cache_dir = path.as_ref().to_path_buf();
        self
    }

    /// Sets the worker count, clamped to the supported range.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.num_workers = workers.clamp(MIN_WORKERS, MAX_WORKERS);
        self
    }

    pub fn with_network_timeout(mut self, timeout: Duration) -> Self {
        self.network_timeout = timeout;
        self
    }

    /// Returns the default cache directory for the current platform.
    ///
    /// - macOS: ~/Library/Caches/photoview
    /// - Linux: ~/.cache/photoview
    /// - Windows: %LOCALAPPDATA%\photoview
    pub fn default_cache_dir() -> PathBuf {
        match dirs::cache_dir() {
            Some(cache_dir) => cache_dir.join("photoview"),
            None => PathBuf::from("cache/photoview"),
        }
    }

    /// Loads configuration from environment variables.
    ///
    /// - `PHOTOVIEW_RAM_CACHE_MB`: working set size in MB (default: 32)
    /// - `PHOTOVIEW_DISK_CACHE_MB`: persistent store size in MB (default: 64)
    /// - `PHOTOVIEW_CACHE_DIR`: persistent store directory
    /// - `PHOTOVIEW_WORKERS`: background workers, clamped to 2..=4 (default: 2)
    /// - `PHOTOVIEW_NETWORK_TIMEOUT_SECS`: request timeout (default: 20)
    ///
    /// # Errors
    /// Returns an error if any variable holds a value that does not parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env()?;
        Ok(config)
    }

    /// Overrides fields with any `PHOTOVIEW_*` variables that are set.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        for (var, key) in [
            ("PHOTOVIEW_RAM_CACHE_MB", "ram_cache_mb"),
            ("PHOTOVIEW_DISK_CACHE_MB", "disk_cache_mb"),
            ("PHOTOVIEW_CACHE_DIR", "disk_cache_dir"),
            ("PHOTOVIEW_WORKERS", "workers"),
            ("PHOTOVIEW_NETWORK_TIMEOUT_SECS", "network_timeout_secs"),
        ] {
            if let Ok(value) = std::env::var(var) {
                self.set(key, &value)
                    .map_err(|_| ConfigError::InvalidValue(var.to_string()))?;
            }
        }
        Ok(())
    }

    /// Loads configuration from a `key = value` file.
    ///
    /// ```text
    /// ram_cache_mb = 32
    /// disk_cache_mb = 64
    /// disk_cache_dir = "/path/to/cache"
    /// workers = 2
    /// network_timeout_secs = 20
    /// ```
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path.as_ref())?;
        Self::parse(&contents)
    }

    /// Parses the `key = value` format. Unknown keys are ignored.
    pub fn parse(contents: &str) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        for line in contents.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if let Some((key, value)) = line.split_once('=') {
                config.set(key.trim(), value.trim().trim_matches('"'))?;
            }
        }

        Ok(config)
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let invalid = || ConfigError::InvalidValue(key.to_string());
        let number = || value.parse::<usize>().map_err(|_| invalid());

        match key {
            "ram_cache_mb" => self.ram_cache_size = number()? * MB,
            "disk_cache_mb" => self.disk_cache_size = number()? * MB,
            "disk_cache_dir" => self.disk_cache_dir = PathBuf::from(value),
            "workers" => self.num_workers = number()?.clamp(MIN_WORKERS, MAX_WORKERS),
            "network_timeout_secs" => {
                self.network_timeout = Duration::from_secs(number()? as u64);
            }
            _ => log::debug!("ignoring unknown cache config key {key}"),
        }
        Ok(())
    }

    /// Saves configuration in the format read by [`CacheConfig::from_file`].
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        fs::write(path.as_ref(), self.to_config_string())?;
        Ok(())
    }

    fn to_config_string(&self) -> String {
        format!(
            "# photoview cache configuration\n\
             ram_cache_mb = {}\n\
             disk_cache_mb = {}\n\
             disk_cache_dir = \"{}\"\n\
             workers = {}\n\
             network_timeout_secs = {}\n",
            self.ram_cache_mb(),
            self.disk_cache_mb(),
            self.disk_cache_dir.display(),
            self.num_workers,
            self.network_timeout.as_secs()
        )
    }

    pub fn ram_cache_mb(&self) -> usize {
        self.ram_cache_size / MB
    }

    pub fn disk_cache_mb(&self) -> usize {
        self.disk_cache_size / MB
    }

    /// Worker pool settings derived from this configuration.
    pub fn worker_pool_config(&self) -> WorkerPoolConfig {
        WorkerPoolConfig::new(self.num_workers).with_poll_interval(self.poll_interval)
    }
}

/// Errors that can occur while loading or saving configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for configuration key: {0}")]
    InvalidValue(String),

    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),
}
