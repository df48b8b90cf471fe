//! Bounded, time-expiring LRU cache.

use crate::Result;
use ::lru::LruCache;
use serde::Serialize;
use std::future::Future;
use std::hash::Hash;
use std::num::NonZeroUsize;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tracing::trace;

struct CacheEntry<V> {
    value: V,
    /// `None` when `now + ttl` overflows; such an entry never expires.
    expires_at: Option<Instant>,
}

impl<V> CacheEntry<V> {
    fn new(value: V, ttl: Duration) -> Self {
        Self {
            value,
            expires_at: Instant::now().checked_add(ttl),
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        matches!(self.expires_at, Some(at) if now > at)
    }
}

struct Inner<K: Hash + Eq, V> {
    entries: LruCache<K, CacheEntry<V>>,
    hits: u64,
    misses: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub size: usize,
    pub capacity: usize,
    pub hits: u64,
    pub misses: u64,
    /// Percentage of `get` calls that were hits; `0.0` before any lookup.
    pub hit_rate: f64,
}

impl CacheStats {
    /// Hit rate formatted with two decimals (`"50.00%"`), or `"0%"` before any lookup.
    pub fn hit_rate_display(&self) -> String {
        if self.hits + self.misses == 0 {
            "0%".to_string()
        } else {
            format!("{:.2}%", self.hit_rate)
        }
    }
}

/// LRU cache whose entries expire after a per-entry TTL.
///
/// Recency is touched by `get` and `set` only. Expired entries are removed
/// lazily when a lookup finds them; nothing sweeps the cache in the background.
pub struct TtlLruCache<K: Hash + Eq, V> {
    capacity: usize,
    inner: Mutex<Inner<K, V>>,
}

impl<K: Hash + Eq, V: Clone> TtlLruCache<K, V> {
    /// A zero capacity is treated as 1.
    pub fn new(capacity: usize) -> Self {
        let cap = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            capacity: cap.get(),
            inner: Mutex::new(Inner {
                entries: LruCache::new(cap),
                hits: 0,
                misses: 0,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner<K, V>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Look up `key`, counting a hit or a miss.
    pub fn get(&self, key: &K) -> Option<V> {
        let mut inner = self.lock();
        let expired = match inner.entries.peek(key) {
            Some(entry) => entry.is_expired(Instant::now()),
            None => {
                inner.misses += 1;
                return None;
            }
        };

        if expired {
            inner.entries.pop(key);
            inner.misses += 1;
            trace!("cache entry expired");
            return None;
        }

        inner.hits += 1;
        inner.entries.get(key).map(|entry| entry.value.clone())
    }

    /// Insert or overwrite `key`, making it the most recently used entry.
    pub fn set(&self, key: K, value: V, ttl: Duration) {
        let mut inner = self.lock();
        let evicting = inner.entries.len() >= self.capacity && !inner.entries.contains(&key);
        inner.entries.put(key, CacheEntry::new(value, ttl));
        if evicting {
            trace!(capacity = self.capacity, "evicted least recently used entry");
        }
    }

    /// Whether `key` is present and unexpired. Does not touch recency or counters.
    pub fn has(&self, key: &K) -> bool {
        let mut inner = self.lock();
        let expired = match inner.entries.peek(key) {
            Some(entry) => entry.is_expired(Instant::now()),
            None => return false,
        };
        if expired {
            inner.entries.pop(key);
            return false;
        }
        true
    }

    /// Remove `key`; returns whether it was resident.
    pub fn delete(&self, key: &K) -> bool {
        self.lock().entries.pop(key).is_some()
    }

    /// Drop every entry and zero the hit/miss counters.
    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.entries.clear();
        inner.hits = 0;
        inner.misses = 0;
    }

    /// Resident entries, including expired ones not yet looked up.
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.lock();
        let total = inner.hits + inner.misses;
        let hit_rate = if total == 0 {
            0.0
        } else {
            inner.hits as f64 / total as f64 * 100.0
        };
        CacheStats {
            size: inner.entries.len(),
            capacity: self.capacity,
            hits: inner.hits,
            misses: inner.misses,
            hit_rate,
        }
    }
}

impl<K: Hash + Eq + Clone, V: Clone> TtlLruCache<K, V> {
    /// Return the cached value for `key`, or compute, store and return it.
    ///
    /// Failures from `init` are not cached. Concurrent misses on the same key
    /// may each run `init`; the last one to finish wins the slot.
    pub async fn get_or_insert_with<F, Fut>(&self, key: K, ttl: Duration, init: F) -> Result<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V>>,
    {
        if let Some(value) = self.get(&key) {
            return Ok(value);
        }
        let value = init().await?;
        self.set(key, value.clone(), ttl);
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error_code::RemoteError;
    use crate::Error;
    use std::sync::Arc;

    const LONG: Duration = Duration::from_secs(5);

    fn cache() -> TtlLruCache<&'static str, &'static str> {
        TtlLruCache::new(3)
    }

    #[test]
    fn test_stores_and_retrieves_values() {
        let cache = cache();
        cache.set("key1", "value1", LONG);
        assert_eq!(cache.get(&"key1"), Some("value1"));
        assert_eq!(cache.get(&"missing"), None);
    }

    #[test]
    fn test_evicts_least_recently_inserted() {
        let cache = cache();
        cache.set("a", "1", LONG);
        cache.set("b", "2", LONG);
        cache.set("c", "3", LONG);
        cache.set("d", "4", LONG);

        assert!(!cache.has(&"a"));
        assert!(cache.has(&"b"));
        assert!(cache.has(&"c"));
        assert!(cache.has(&"d"));
        assert_eq!(cache.len(), 3);
    }

    #[test]
    fn test_get_refreshes_recency() {
        let cache = cache();
        cache.set("a", "1", LONG);
        cache.set("b", "2", LONG);
        cache.set("c", "3", LONG);
        cache.get(&"a");
        cache.get(&"b");
        cache.set("d", "4", LONG);

        // `c` is now the least recently used entry.
        assert!(!cache.has(&"c"));
        assert!(cache.has(&"a"));
        assert!(cache.has(&"b"));
        assert!(cache.has(&"d"));
    }

    #[test]
    fn test_has_does_not_refresh_recency() {
        let cache = cache();
        cache.set("a", "1", LONG);
        cache.set("b", "2", LONG);
        cache.set("c", "3", LONG);
        assert!(cache.has(&"a"));
        cache.set("d", "4", LONG);
        assert!(!cache.has(&"a"));
    }

    #[test]
    fn test_overwrite_moves_key_to_newest() {
        let cache = cache();
        cache.set("a", "1", LONG);
        cache.set("b", "2", LONG);
        cache.set("c", "3", LONG);
        cache.set("a", "updated", LONG);
        cache.set("d", "4", LONG);

        assert_eq!(cache.len(), 3);
        assert!(!cache.has(&"b"));
        assert_eq!(cache.get(&"a"), Some("updated"));
    }

    #[test]
    fn test_entries_expire_after_ttl() {
        let cache = cache();
        cache.set("a", "1", Duration::from_millis(100));
        assert_eq!(cache.get(&"a"), Some("1"));

        std::thread::sleep(Duration::from_millis(150));
        assert_eq!(cache.get(&"a"), None);
        // The stale entry was evicted by the lookup.
        assert_eq!(cache.len(), 0);

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[test]
    fn test_has_expires_lazily() {
        let cache = cache();
        cache.set("a", "1", Duration::from_millis(20));
        std::thread::sleep(Duration::from_millis(40));
        assert_eq!(cache.len(), 1);
        assert!(!cache.has(&"a"));
        assert_eq!(cache.len(), 0);
        // `has` never counts as a lookup.
        assert_eq!(cache.stats().misses, 0);
    }

    #[test]
    fn test_delete_and_clear() {
        let cache = cache();
        cache.set("a", "1", LONG);
        cache.set("b", "2", LONG);
        assert!(cache.delete(&"a"));
        assert!(!cache.delete(&"a"));
        assert_eq!(cache.get(&"a"), None);

        cache.get(&"b");
        cache.clear();
        let stats = cache.stats();
        assert_eq!(stats.size, 0);
        assert_eq!(stats.hits, 0);
        assert_eq!(stats.misses, 0);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_stats_hit_rate() {
        let cache = cache();
        let stats = cache.stats();
        assert_eq!(stats.hit_rate, 0.0);
        assert_eq!(stats.hit_rate_display(), "0%");

        cache.set("key1", "value1", LONG);
        cache.get(&"key1");
        cache.get(&"key2");
        cache.get(&"key1");
        cache.get(&"key3");

        let stats = cache.stats();
        assert_eq!(stats.size, 1);
        assert_eq!(stats.capacity, 3);
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.misses, 2);
        assert_eq!(stats.hit_rate, 50.0);
        assert_eq!(stats.hit_rate_display(), "50.00%");
    }

    #[test]
    fn test_stats_serialize_camel_case() {
        let cache: TtlLruCache<String, u32> = TtlLruCache::new(2);
        let json = serde_json::to_value(cache.stats()).unwrap();
        assert_eq!(json["capacity"], 2);
        assert_eq!(json["hitRate"], 0.0);
    }

    #[test]
    fn test_zero_capacity_holds_one_entry() {
        let cache: TtlLruCache<u32, u32> = TtlLruCache::new(0);
        cache.set(1, 1, LONG);
        cache.set(2, 2, LONG);
        assert_eq!(cache.capacity(), 1);
        assert_eq!(cache.get(&2), Some(2));
        assert_eq!(cache.get(&1), None);
    }

    #[tokio::test]
    async fn test_get_or_insert_with() {
        let cache: TtlLruCache<String, String> = TtlLruCache::new(4);
        let first = cache
            .get_or_insert_with("k".to_string(), LONG, || async { Ok("fresh".to_string()) })
            .await
            .unwrap();
        assert_eq!(first, "fresh");

        let second = cache
            .get_or_insert_with("k".to_string(), LONG, || async {
                Err(Error::Remote(RemoteError::new(500, "should not run")))
            })
            .await
            .unwrap();
        assert_eq!(second, "fresh");

        let failed = cache
            .get_or_insert_with("other".to_string(), LONG, || async {
                Err(Error::Remote(RemoteError::new(404, "missing")))
            })
            .await;
        assert!(failed.is_err());
        assert!(!cache.has(&"other".to_string()));
    }

    #[test]
    fn test_concurrent_inserts_respect_capacity() {
        let cache = Arc::new(TtlLruCache::<u32, u32>::new(16));
        let mut handles = vec![];
        for t in 0..8u32 {
            let cache = Arc::clone(&cache);
            handles.push(std::thread::spawn(move || {
                for i in 0..100u32 {
                    cache.set(t * 1000 + i, i, LONG);
                    cache.get(&(t * 1000 + i));
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        let stats = cache.stats();
        assert_eq!(stats.size, 16);
        assert_eq!(stats.hits + stats.misses, 800);
    }
}
