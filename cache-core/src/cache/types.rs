//! Configuration and statistics types shared by the memory cache and its
//! durable counterpart.

use serde::{Deserialize, Serialize};

/// Tunables for a [`super::memory::MemoryCache`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Maximum number of live entries before LRU eviction kicks in.
    pub max_size: usize,
    /// Default time-to-live applied when `set` is called without an
    /// explicit TTL.
    pub default_ttl_ms: u64,
    /// When `false`, `get` always misses and `set` is a no-op.
    pub enabled: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_size: 1000,
            default_ttl_ms: 3_600_000,
            enabled: true,
        }
    }
}

/// Partial update applied via `update_config`. `None` fields are left
/// unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheConfigUpdate {
    /// New maximum size, if changing.
    pub max_size: Option<usize>,
    /// New default TTL in milliseconds, if changing.
    pub ttl_ms: Option<u64>,
    /// New enabled flag, if changing.
    pub enabled: Option<bool>,
}

/// Point-in-time statistics for a cache tier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Number of `get` calls that found a live entry.
    pub hits: u64,
    /// Number of `get` calls that found no live entry.
    pub misses: u64,
    /// `hits / (hits + misses) * 100`, rounded to 2 decimal places. Zero
    /// when there have been no requests.
    pub hit_rate: f64,
    /// Current number of live entries.
    pub size: usize,
    /// Approximate heap usage in bytes.
    pub memory_usage: usize,
}

impl CacheStats {
    /// Computes `hit_rate` from raw counters, matching the rounding rule
    /// used everywhere hit rate is reported.
    #[must_use]
    pub fn hit_rate(hits: u64, misses: u64) -> f64 {
        let total = hits + misses;
        if total == 0 {
            return 0.0;
        }
        let rate = (hits as f64 / total as f64) * 100.0;
        (rate * 100.0).round() / 100.0
    }
}
