//! Bounded in-memory cache with LRU eviction and per-entry TTL.
//!
//! Every public method here is synchronous and MUST NOT suspend — the
//! component is guarded by a single [`parking_lot::Mutex`] and operations
//! are short-lived hash + list-splice work, never I/O.

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use lru::LruCache;
use parking_lot::Mutex;

use crate::cache::types::{CacheConfig, CacheConfigUpdate, CacheStats};
use crate::model::CacheEntry;

/// Returns monotonic milliseconds since the first call in this process.
///
/// `CacheEntry::created_at`/`expires_at` are defined over this clock, never
/// wall-clock time, so they are immune to clock adjustments.
pub fn now_ms() -> u64 {
    static EPOCH: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();
    let epoch = EPOCH.get_or_init(Instant::now);
    epoch.elapsed().as_millis() as u64
}

struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
}

impl Counters {
    const fn new() -> Self {
        Self {
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }
}

/// A bounded, generic, LRU+TTL in-memory cache.
pub struct MemoryCache<T: Clone> {
    config: Mutex<CacheConfig>,
    entries: Mutex<LruCache<String, CacheEntry<T>>>,
    counters: Counters,
}

impl<T: Clone> MemoryCache<T> {
    /// Builds a new cache with the given configuration.
    #[must_use]
    pub fn new(config: CacheConfig) -> Self {
        let cap = NonZeroUsize::new(config.max_size.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            config: Mutex::new(config),
            entries: Mutex::new(LruCache::new(cap)),
            counters: Counters::new(),
        }
    }

    /// Returns the value for `key` if it exists and has not expired.
    ///
    /// On hit, `key` moves to the most-recently-used position and its hit
    /// counter increments. On miss (including expiry), a stale entry is
    /// removed from the backing store.
    pub fn get(&self, key: &str) -> Option<T> {
        if !self.config.lock().enabled {
            return None;
        }
        let now = now_ms();
        let mut entries = self.entries.lock();
        let hit = match entries.get_mut(key) {
            Some(entry) if !entry.is_expired(now) => {
                entry.hits += 1;
                Some(entry.data.clone())
            }
            Some(_) => {
                entries.pop(key);
                None
            }
            None => None,
        };
        drop(entries);
        if hit.is_some() {
            self.counters.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.counters.misses.fetch_add(1, Ordering::Relaxed);
        }
        hit
    }

    /// Inserts or overwrites `key`, marking it most-recently-used.
    ///
    /// `ttl_ms` overrides the configured default. If the cache exceeds its
    /// configured `max_size` after insertion, the least-recently-used keys
    /// are evicted until the bound holds again.
    pub fn set(&self, key: &str, value: T, ttl_ms: Option<u64>) {
        let cfg = self.config.lock();
        if !cfg.enabled {
            return;
        }
        let ttl = ttl_ms.unwrap_or(cfg.default_ttl_ms);
        drop(cfg);
        let now = now_ms();
        let entry = CacheEntry::new(value, now, ttl);
        self.entries.lock().put(key.to_string(), entry);
    }

    /// Removes `key`, returning whether it was present (live or not).
    pub fn delete(&self, key: &str) -> bool {
        self.entries.lock().pop(key).is_some()
    }

    /// Removes every entry.
    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    /// True if `key` is present and not expired, without affecting LRU
    /// order or hit/miss counters.
    #[must_use]
    pub fn has(&self, key: &str) -> bool {
        let now = now_ms();
        self.entries
            .lock()
            .peek(key)
            .is_some_and(|e| !e.is_expired(now))
    }

    /// Returns `key`'s value plus its `created_at`/`expires_at` (both
    /// monotonic milliseconds per [`now_ms`]) if live, without affecting
    /// LRU order or hit/miss counters.
    #[must_use]
    pub fn entry_snapshot(&self, key: &str) -> Option<(T, u64, u64)> {
        let now = now_ms();
        self.entries.lock().peek(key).and_then(|e| {
            (!e.is_expired(now)).then(|| (e.data.clone(), e.created_at, e.expires_at))
        })
    }

    /// Returns all live keys, most-recently-used first.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        let now = now_ms();
        self.entries
            .lock()
            .iter()
            .filter(|(_, e)| !e.is_expired(now))
            .map(|(k, _)| k.clone())
            .collect()
    }

    /// Number of entries currently stored, including any not yet purged by
    /// `cleanup`.
    #[must_use]
    pub fn size(&self) -> usize {
        self.entries.lock().len()
    }

    /// Purges every entry whose `expires_at <= now`, returning the count
    /// removed.
    pub fn cleanup(&self) -> usize {
        let now = now_ms();
        let mut entries = self.entries.lock();
        let expired: Vec<String> = entries
            .iter()
            .filter(|(_, e)| e.is_expired(now))
            .map(|(k, _)| k.clone())
            .collect();
        for key in &expired {
            entries.pop(key);
        }
        expired.len()
    }

    /// Current hit/miss/size statistics.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        let hits = self.counters.hits.load(Ordering::Relaxed);
        let misses = self.counters.misses.load(Ordering::Relaxed);
        let size = self.entries.lock().len();
        CacheStats {
            hits,
            misses,
            hit_rate: CacheStats::hit_rate(hits, misses),
            size,
            memory_usage: size * std::mem::size_of::<CacheEntry<T>>(),
        }
    }

    /// Applies a partial configuration update. Shrinking `max_size`
    /// evicts LRU entries down to the new bound.
    pub fn update_config(&self, update: CacheConfigUpdate) {
        let mut cfg = self.config.lock();
        if let Some(max_size) = update.max_size {
            cfg.max_size = max_size;
            let cap = NonZeroUsize::new(max_size.max(1)).unwrap_or(NonZeroUsize::MIN);
            self.entries.lock().resize(cap);
        }
        if let Some(ttl_ms) = update.ttl_ms {
            cfg.default_ttl_ms = ttl_ms;
        }
        if let Some(enabled) = update.enabled {
            cfg.enabled = enabled;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache(max_size: usize) -> MemoryCache<String> {
        MemoryCache::new(CacheConfig {
            max_size,
            default_ttl_ms: 3_600_000,
            enabled: true,
        })
    }

    #[test]
    fn lru_eviction_scenario() {
        let c = cache(3);
        c.set("k1", "v1".into(), None);
        c.set("k2", "v2".into(), None);
        c.set("k3", "v3".into(), None);
        assert_eq!(c.get("k1").as_deref(), Some("v1"));
        c.set("k4", "v4".into(), None);
        assert_eq!(c.get("k2"), None);
        assert!(c.has("k1"));
        assert!(c.has("k3"));
        assert!(c.has("k4"));
    }

    #[test]
    fn ttl_expiry_scenario() {
        let c: MemoryCache<String> = MemoryCache::new(CacheConfig {
            max_size: 10,
            default_ttl_ms: 50,
            enabled: true,
        });
        c.set("a", "x".into(), None);
        std::thread::sleep(std::time::Duration::from_millis(60));
        assert_eq!(c.get("a"), None);
        // already evicted by the get above; cleanup on an untouched key
        // still reports correctly.
        c.set("b", "y".into(), Some(10));
        std::thread::sleep(std::time::Duration::from_millis(20));
        assert!(c.cleanup() >= 1);
    }

    #[test]
    fn hit_rate_accounting_scenario() {
        let c = cache(10);
        c.set("a", "x".into(), None);
        c.set("b", "y".into(), None);
        c.get("a");
        c.get("b");
        c.get("miss");
        c.get("miss2");
        let stats = c.stats();
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.misses, 2);
        assert!((stats.hit_rate - 50.0).abs() < f64::EPSILON);
    }

    #[test]
    fn disabled_cache_always_misses_and_ignores_writes() {
        let c = cache(10);
        c.update_config(CacheConfigUpdate {
            enabled: Some(false),
            ..Default::default()
        });
        c.set("a", "x".into(), None);
        assert_eq!(c.get("a"), None);
    }

    #[test]
    fn shrinking_max_size_evicts_down_to_bound() {
        let c = cache(10);
        for i in 0..5 {
            c.set(&format!("k{i}"), "v".into(), None);
        }
        c.update_config(CacheConfigUpdate {
            max_size: Some(2),
            ..Default::default()
        });
        assert_eq!(c.size(), 2);
    }

    #[test]
    fn delete_and_clear() {
        let c = cache(10);
        c.set("a", "x".into(), None);
        assert!(c.delete("a"));
        assert!(!c.delete("a"));
        c.set("b", "y".into(), None);
        c.clear();
        assert_eq!(c.size(), 0);
    }
}
