//! Bounded, expiring key/value cache (§4.9).
//!
//! Backs provider lookups (TTL 30s) and `/v1/models` listings (TTL 60s). A
//! single generic implementation serves both named caches; callers own one
//! [`TtlLruCache`] instance per cache name and report its [`CacheStats`]
//! under that name in the admin `cache/stats` view.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Mutex;
use std::time::{Duration, Instant};

struct Entry<V> {
    value: V,
    expires_at: Instant,
}

/// Insertion-ordered, TTL+LRU-bounded cache.
///
/// `get` evicts (and reports a miss for) an expired entry; a live hit moves
/// the key to the most-recently-used position. `set` removes any prior
/// binding for the key, inserts at the most-recent position, then evicts the
/// least-recently-used entries until the cache is back under `max_size`.
pub struct TtlLruCache<K, V> {
    max_size: usize,
    inner: Mutex<Inner<K, V>>,
}

struct Inner<K, V> {
    entries: HashMap<K, Entry<V>>,
    /// Most-recently-used order, back = most recent.
    order: Vec<K>,
    hits: u64,
    misses: u64,
}

/// A snapshot of cache population and hit/miss counters.
#[derive(Debug, Clone, Copy)]
pub struct CacheStats {
    /// Current number of live entries (including not-yet-reaped expired ones).
    pub size: usize,
    /// Configured maximum size.
    pub max_size: usize,
    /// Cumulative hit count.
    pub hits: u64,
    /// Cumulative miss count.
    pub misses: u64,
}

impl<K, V> TtlLruCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// Build a cache bounded at `max_size` entries.
    #[must_use]
    pub fn new(max_size: usize) -> Self {
        Self {
            max_size: max_size.max(1),
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                order: Vec::new(),
                hits: 0,
                misses: 0,
            }),
        }
    }

    /// Fetch a live value, bumping it to most-recently-used. Returns `None`
    /// (and records a miss) for an absent or expired key.
    ///
    /// # Panics
    /// Panics if the internal mutex is poisoned.
    pub fn get(&self, key: &K) -> Option<V> {
        let mut inner = self.inner.lock().expect("mutex poisoned");
        let now = Instant::now();
        let expired = inner.entries.get(key).is_some_and(|e| e.expires_at <= now);
        if expired {
            inner.entries.remove(key);
            inner.order.retain(|k| k != key);
            inner.misses += 1;
            return None;
        }
        match inner.entries.get(key) {
            Some(entry) => {
                let value = entry.value.clone();
                inner.order.retain(|k| k != key);
                inner.order.push(key.clone());
                inner.hits += 1;
                Some(value)
            }
            None => {
                inner.misses += 1;
                None
            }
        }
    }

    /// Insert or replace a value with the given TTL, evicting the
    /// least-recently-used entry until the cache is within `max_size`.
    ///
    /// # Panics
    /// Panics if the internal mutex is poisoned.
    pub fn set(&self, key: K, value: V, ttl: Duration) {
        let mut inner = self.inner.lock().expect("mutex poisoned");
        inner.order.retain(|k| k != &key);
        inner.entries.insert(
            key.clone(),
            Entry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
        inner.order.push(key);
        while inner.order.len() > self.max_size {
            let oldest = inner.order.remove(0);
            inner.entries.remove(&oldest);
        }
    }

    /// Drop every entry.
    ///
    /// # Panics
    /// Panics if the internal mutex is poisoned.
    pub fn clear(&self) {
        let mut inner = self.inner.lock().expect("mutex poisoned");
        inner.entries.clear();
        inner.order.clear();
    }

    /// Remove every entry whose key (rendered via `key_as_str`) contains `pattern`.
    ///
    /// # Panics
    /// Panics if the internal mutex is poisoned.
    pub fn invalidate_matching(&self, pattern: &str, key_as_str: impl Fn(&K) -> String) {
        let mut inner = self.inner.lock().expect("mutex poisoned");
        let doomed: Vec<K> = inner
            .entries
            .keys()
            .filter(|k| key_as_str(k).contains(pattern))
            .cloned()
            .collect();
        for k in doomed {
            inner.entries.remove(&k);
            inner.order.retain(|o| o != &k);
        }
    }

    /// Snapshot current population and hit/miss counters.
    ///
    /// # Panics
    /// Panics if the internal mutex is poisoned.
    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock().expect("mutex poisoned");
        CacheStats {
            size: inner.entries.len(),
            max_size: self.max_size,
            hits: inner.hits,
            misses: inner.misses,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_then_get_within_ttl_hits() {
        let cache: TtlLruCache<&str, i32> = TtlLruCache::new(10);
        cache.set("a", 1, Duration::from_secs(60));
        assert_eq!(cache.get(&"a"), Some(1));
        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 0);
    }

    #[test]
    fn get_after_ttl_expiry_is_a_miss() {
        let cache: TtlLruCache<&str, i32> = TtlLruCache::new(10);
        cache.set("a", 1, Duration::from_millis(1));
        std::thread::sleep(Duration::from_millis(10));
        assert_eq!(cache.get(&"a"), None);
        assert_eq!(cache.stats().misses, 1);
    }

    #[test]
    fn eviction_drops_least_recently_used() {
        let cache: TtlLruCache<i32, i32> = TtlLruCache::new(2);
        cache.set(1, 1, Duration::from_secs(60));
        cache.set(2, 2, Duration::from_secs(60));
        // touch 1 so 2 becomes the least-recently-used
        assert_eq!(cache.get(&1), Some(1));
        cache.set(3, 3, Duration::from_secs(60));
        assert_eq!(cache.get(&2), None);
        assert_eq!(cache.get(&1), Some(1));
        assert_eq!(cache.get(&3), Some(3));
    }

    #[test]
    fn invalidate_matching_drops_keys_by_substring() {
        let cache: TtlLruCache<String, i32> = TtlLruCache::new(10);
        cache.set("provider:abc".to_string(), 1, Duration::from_secs(60));
        cache.set("provider:def".to_string(), 2, Duration::from_secs(60));
        cache.set("models:list".to_string(), 3, Duration::from_secs(60));
        cache.invalidate_matching("provider:", |k| k.clone());
        assert_eq!(cache.get(&"provider:abc".to_string()), None);
        assert_eq!(cache.get(&"provider:def".to_string()), None);
        assert_eq!(cache.get(&"models:list".to_string()), Some(3));
    }

    #[test]
    fn clear_drops_everything() {
        let cache: TtlLruCache<&str, i32> = TtlLruCache::new(10);
        cache.set("a", 1, Duration::from_secs(60));
        cache.clear();
        assert_eq!(cache.get(&"a"), None);
        assert_eq!(cache.stats().size, 0);
    }
}
