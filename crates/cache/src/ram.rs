//! In-memory working set with LRU eviction.
//!
//! Holds decoded values behind `Arc` so readers on the UI thread and the
//! background workers can share them without copying pixels. The limit is
//! expressed in bytes via [`Weighted`].

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Approximate memory footprint of a cached value.
pub trait Weighted {
    fn weight(&self) -> usize;
}

impl Weighted for Vec<u8> {
    fn weight(&self) -> usize {
        self.len()
    }
}

impl Weighted for photoview_imaging::Pixmap {
    fn weight(&self) -> usize {
        self.byte_size()
    }
}

/// Statistics about cache usage
#[derive(Debug, Clone, Copy, Default)]
pub struct CacheStats {
    /// Number of entries currently in cache
    pub entry_count: usize,

    /// Total weight of cached entries (bytes)
    pub memory_used: usize,

    /// Maximum weight allowed (bytes)
    pub memory_limit: usize,

    pub hits: u64,
    pub misses: u64,

    /// Entries dropped to stay under the limit
    pub evictions: u64,
}

impl CacheStats {
    /// Calculate the cache hit rate (0.0 to 1.0)
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    /// Calculate memory utilization (0.0 to 1.0)
    pub fn memory_utilization(&self) -> f64 {
        if self.memory_limit == 0 {
            0.0
        } else {
            self.memory_used as f64 / self.memory_limit as f64
        }
    }
}

struct Entry<V> {
    value: Arc<V>,
    weight: usize,
}

struct CacheState<V> {
    entries: HashMap<String, Entry<V>>,
    /// Most recently used at the back
    lru_queue: VecDeque<String>,
    memory_used: usize,
    memory_limit: usize,
    stats: CacheStats,
}

impl<V> CacheState<V> {
    fn new(memory_limit: usize) -> Self {
        Self {
            entries: HashMap::new(),
            lru_queue: VecDeque::new(),
            memory_used: 0,
            memory_limit,
            stats: CacheStats {
                memory_limit,
                ..Default::default()
            },
        }
    }

    fn touch(&mut self, key: &str) {
        if let Some(pos) = self.lru_queue.iter().position(|k| k == key) {
            if let Some(k) = self.lru_queue.remove(pos) {
                self.lru_queue.push_back(k);
            }
        }
    }

    fn remove_entry(&mut self, key: &str) -> Option<Entry<V>> {
        let entry = self.entries.remove(key)?;
        self.lru_queue.retain(|k| k != key);
        self.memory_used = self.memory_used.saturating_sub(entry.weight);
        Some(entry)
    }

    fn evict_lru(&mut self) -> bool {
        let Some(key) = self.lru_queue.pop_front() else {
            return false;
        };
        if let Some(entry) = self.entries.remove(&key) {
            self.memory_used = self.memory_used.saturating_sub(entry.weight);
            self.stats.evictions += 1;
            log::trace!("evicted {key} from memory");
        }
        true
    }

    fn evict_to_fit(&mut self, required: usize) {
        while self.memory_used + required > self.memory_limit && self.evict_lru() {}
    }

    fn sync_stats(&mut self) {
        self.stats.entry_count = self.entries.len();
        self.stats.memory_used = self.memory_used;
    }
}

/// Thread-safe LRU cache bounded by total weight.
///
/// An entry heavier than the whole limit is still stored (after evicting
/// everything else) so the value the user is looking at stays resident.
///
/// # Example
///
/// ```
/// use photoview_cache::RamCache;
/// use std::sync::Arc;
///
/// let cache: RamCache<Vec<u8>> = RamCache::new(1024);
/// cache.put("thumb", Arc::new(vec![0u8; 256]));
///
/// assert!(cache.get("thumb").is_some());
/// assert_eq!(cache.stats().memory_used, 256);
/// ```
pub struct RamCache<V> {
    state: Arc<Mutex<CacheState<V>>>,
}

impl<V: Weighted> RamCache<V> {
    /// # Arguments
    ///
    /// * `memory_limit` - Maximum total weight in bytes
    pub fn new(memory_limit: usize) -> Self {
        Self {
            state: Arc::new(Mutex::new(CacheState::new(memory_limit))),
        }
    }

    pub fn with_mb_limit(megabytes: usize) -> Self {
        Self::new(megabytes * 1024 * 1024)
    }

    fn state(&self) -> MutexGuard<'_, CacheState<V>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store a value, replacing any previous value for `key`.
    pub fn put(&self, key: &str, value: Arc<V>) {
        let weight = value.weight();
        let mut state = self.state();

        state.remove_entry(key);
        state.evict_to_fit(weight);

        state.memory_used += weight;
        state.entries.insert(key.to_string(), Entry { value, weight });
        state.lru_queue.push_back(key.to_string());
        state.sync_stats();
    }

    /// Look up a value, marking it most recently used.
    pub fn get(&self, key: &str) -> Option<Arc<V>> {
        let mut state = self.state();
        match state.entries.get(key).map(|e| e.value.clone()) {
            Some(value) => {
                state.touch(key);
                state.stats.hits += 1;
                Some(value)
            }
            None => {
                state.stats.misses += 1;
                None
            }
        }
    }

    /// Look up a value without touching LRU order or statistics.
    pub fn peek(&self, key: &str) -> Option<Arc<V>> {
        self.state().entries.get(key).map(|e| e.value.clone())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.state().entries.contains_key(key)
    }

    pub fn remove(&self, key: &str) -> Option<Arc<V>> {
        let mut state = self.state();
        let removed = state.remove_entry(key).map(|e| e.value);
        state.sync_stats();
        removed
    }

    pub fn clear(&self) {
        let mut state = self.state();
        state.entries.clear();
        state.lru_queue.clear();
        state.memory_used = 0;
        state.sync_stats();
    }

    pub fn len(&self) -> usize {
        self.state().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state().entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        self.state().stats
    }
}

impl<V> Clone for RamCache<V> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blob(size: usize) -> Arc<Vec<u8>> {
        Arc::new(vec![0u8; size])
    }

    #[test]
    fn test_basic_put_get() {
        let cache = RamCache::new(1000);
        cache.put("a", blob(100));

        assert_eq!(cache.get("a").unwrap().len(), 100);
        assert!(cache.get("missing").is_none());

        let stats = cache.stats();
        assert_eq!(stats.entry_count, 1);
        assert_eq!(stats.memory_used, 100);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hit_rate(), 0.5);
    }

    #[test]
    fn test_lru_eviction() {
        let cache = RamCache::new(300);
        cache.put("a", blob(100));
        cache.put("b", blob(100));
        cache.put("c", blob(100));

        // Touch "a" so "b" becomes the oldest
        cache.get("a");
        cache.put("d", blob(100));

        assert!(cache.contains("a"));
        assert!(!cache.contains("b"));
        assert!(cache.contains("c"));
        assert!(cache.contains("d"));
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_replace_updates_weight() {
        let cache = RamCache::new(1000);
        cache.put("a", blob(100));
        cache.put("a", blob(300));

        let stats = cache.stats();
        assert_eq!(stats.entry_count, 1);
        assert_eq!(stats.memory_used, 300);
    }

    #[test]
    fn test_oversized_entry_is_kept_alone() {
        let cache = RamCache::new(100);
        cache.put("small", blob(50));
        cache.put("huge", blob(500));

        assert!(!cache.contains("small"));
        assert!(cache.contains("huge"));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_peek_does_not_count() {
        let cache = RamCache::new(1000);
        cache.put("a", blob(10));

        assert!(cache.peek("a").is_some());
        assert!(cache.peek("b").is_none());
        assert_eq!(cache.stats().hits, 0);
        assert_eq!(cache.stats().misses, 0);
    }

    #[test]
    fn test_remove_and_clear() {
        let cache = RamCache::new(1000);
        cache.put("a", blob(10));
        cache.put("b", blob(20));

        assert!(cache.remove("a").is_some());
        assert!(cache.remove("a").is_none());
        assert_eq!(cache.stats().memory_used, 20);

        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.stats().memory_used, 0);
    }

    #[test]
    fn test_memory_utilization() {
        let cache = RamCache::with_mb_limit(1);
        cache.put("a", blob(512 * 1024));
        assert!((cache.stats().memory_utilization() - 0.5).abs() < f64::EPSILON);
    }
}
