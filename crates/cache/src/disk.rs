//! Persistent store with LRU eviction.
//!
//! Each cache namespace owns one subdirectory named after its cache id. An
//! entry is a single file named by the SHA-256 of its key, holding the raw
//! fetched bytes. The in-memory index is rebuilt from the directory on
//! startup by [`DiskStore::load_from_disk`].

use sha2::{Digest, Sha256};
use std::collections::{HashMap, VecDeque};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::SystemTime;

const ENTRY_EXTENSION: &str = "bin";

/// Statistics for monitoring the persistent store
#[derive(Debug, Clone, Default)]
pub struct DiskCacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Entries deleted to stay under the limit
    pub evictions: u64,
    pub entry_count: usize,
    /// Total bytes on disk
    pub disk_used: usize,
}

impl DiskCacheStats {
    /// Calculate cache hit rate (0.0 to 1.0)
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    /// Calculate disk utilization (0.0 to 1.0)
    pub fn disk_utilization(&self, limit: usize) -> f64 {
        if limit == 0 {
            0.0
        } else {
            self.disk_used as f64 / limit as f64
        }
    }
}

struct StoredEntry {
    path: PathBuf,
    size: usize,
}

struct StoreState {
    /// Keyed by the hex digest of the cache key
    entries: HashMap<String, StoredEntry>,
    /// Front = least recently used
    lru_queue: VecDeque<String>,
    stats: DiskCacheStats,
    disk_limit: usize,
    dir: PathBuf,
}

impl StoreState {
    fn touch(&mut self, digest: &str) {
        if let Some(pos) = self.lru_queue.iter().position(|d| d == digest) {
            if let Some(d) = self.lru_queue.remove(pos) {
                self.lru_queue.push_back(d);
            }
        }
    }

    fn forget(&mut self, digest: &str) -> Option<StoredEntry> {
        let entry = self.entries.remove(digest)?;
        self.lru_queue.retain(|d| d != digest);
        self.stats.disk_used = self.stats.disk_used.saturating_sub(entry.size);
        self.stats.entry_count = self.entries.len();
        Some(entry)
    }

    fn evict_lru(&mut self) -> io::Result<()> {
        let Some(digest) = self.lru_queue.front().cloned() else {
            return Ok(());
        };
        if let Some(entry) = self.forget(&digest) {
            remove_file_if_present(&entry.path)?;
            self.stats.evictions += 1;
        }
        Ok(())
    }

    fn evict_until_space_available(&mut self, needed: usize) -> io::Result<()> {
        while self.stats.disk_used + needed > self.disk_limit && !self.lru_queue.is_empty() {
            self.evict_lru()?;
        }
        Ok(())
    }
}

fn remove_file_if_present(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

/// Hex SHA-256 of a cache key, used as its file name.
pub fn key_digest(key: &str) -> String {
    Sha256::digest(key.as_bytes())
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

/// Persistent key to bytes store for one cache namespace.
///
/// Writes for a key come only from the fetch that owns its in-flight slot,
/// so the store does not coordinate concurrent writers of the same key.
#[derive(Clone)]
pub struct DiskStore {
    state: Arc<Mutex<StoreState>>,
}

impl DiskStore {
    /// Open (creating if needed) the namespace `cache_id` under `root`.
    pub fn open<P: AsRef<Path>>(root: P, cache_id: char, disk_limit: usize) -> io::Result<Self> {
        let dir = root.as_ref().join(cache_id.to_string());
        fs::create_dir_all(&dir)?;

        Ok(Self {
            state: Arc::new(Mutex::new(StoreState {
                entries: HashMap::new(),
                lru_queue: VecDeque::new(),
                stats: DiskCacheStats::default(),
                disk_limit,
                dir,
            })),
        })
    }

    fn state(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store `bytes` under `key`, evicting least recently used entries to
    /// make room.
    pub fn put(&self, key: &str, bytes: &[u8]) -> io::Result<()> {
        let digest = key_digest(key);
        let mut state = self.state();

        if let Some(old) = state.forget(&digest) {
            remove_file_if_present(&old.path)?;
        }
        state.evict_until_space_available(bytes.len())?;

        let path = state.dir.join(format!("{digest}.{ENTRY_EXTENSION}"));
        let mut file = fs::File::create(&path)?;
        file.write_all(bytes)?;
        file.sync_all()?;

        state.entries.insert(
            digest.clone(),
            StoredEntry {
                path,
                size: bytes.len(),
            },
        );
        state.lru_queue.push_back(digest);
        state.stats.disk_used += bytes.len();
        state.stats.entry_count = state.entries.len();
        Ok(())
    }

    /// Read the bytes stored under `key`.
    ///
    /// A file deleted behind the store's back counts as a miss and is
    /// dropped from the index.
    pub fn get(&self, key: &str) -> io::Result<Option<Vec<u8>>> {
        let digest = key_digest(key);
        let mut state = self.state();

        let Some(path) = state.entries.get(&digest).map(|e| e.path.clone()) else {
            state.stats.misses += 1;
            return Ok(None);
        };

        match fs::read(&path) {
            Ok(bytes) => {
                state.touch(&digest);
                state.stats.hits += 1;
                Ok(Some(bytes))
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                log::warn!("cache file {} vanished", path.display());
                state.forget(&digest);
                state.stats.misses += 1;
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Check for `key` without touching LRU order.
    pub fn contains(&self, key: &str) -> bool {
        self.state().entries.contains_key(&key_digest(key))
    }

    pub fn remove(&self, key: &str) -> io::Result<()> {
        let mut state = self.state();
        if let Some(entry) = state.forget(&key_digest(key)) {
            remove_file_if_present(&entry.path)?;
        }
        Ok(())
    }

    /// Delete every entry of this namespace.
    pub fn clear(&self) -> io::Result<()> {
        let mut state = self.state();
        for (_, entry) in state.entries.drain() {
            remove_file_if_present(&entry.path)?;
        }
        state.lru_queue.clear();
        state.stats.entry_count = 0;
        state.stats.disk_used = 0;
        Ok(())
    }

    pub fn stats(&self) -> DiskCacheStats {
        self.state().stats.clone()
    }

    pub fn disk_limit(&self) -> usize {
        self.state().disk_limit
    }

    pub fn entry_count(&self) -> usize {
        self.state().entries.len()
    }

    /// Change the limit, evicting if current usage is above it.
    pub fn set_disk_limit(&self, new_limit: usize) -> io::Result<()> {
        let mut state = self.state();
        state.disk_limit = new_limit;
        state.evict_until_space_available(0)
    }

    /// Rebuild the index from the namespace directory.
    ///
    /// Entries are ordered by modification time so the oldest files are
    /// evicted first.
    pub fn load_from_disk(&self) -> io::Result<()> {
        let mut state = self.state();
        state.entries.clear();
        state.lru_queue.clear();
        state.stats.entry_count = 0;
        state.stats.disk_used = 0;

        let mut found: Vec<(SystemTime, String, StoredEntry)> = Vec::new();
        for entry in fs::read_dir(&state.dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|s| s.to_str()) != Some(ENTRY_EXTENSION) {
                continue;
            }
            let Some(digest) = path.file_stem().and_then(|s| s.to_str()).map(str::to_string) else {
                continue;
            };
            if digest.len() != 64 || !digest.chars().all(|c| c.is_ascii_hexdigit()) {
                continue;
            }

            let metadata = entry.metadata()?;
            let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
            let size = metadata.len() as usize;
            found.push((modified, digest, StoredEntry { path, size }));
        }

        found.sort_by(|a, b| a.0.cmp(&b.0));
        for (_, digest, entry) in found {
            state.stats.disk_used += entry.size;
            state.lru_queue.push_back(digest.clone());
            state.entries.insert(digest, entry);
        }
        state.stats.entry_count = state.entries.len();

        log::debug!(
            "loaded {} cache entries ({} bytes) from {}",
            state.stats.entry_count,
            state.stats.disk_used,
            state.dir.display()
        );

        // A smaller limit than last run takes effect immediately.
        state.evict_until_space_available(0)
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.state().dir.clone()
    }
}
