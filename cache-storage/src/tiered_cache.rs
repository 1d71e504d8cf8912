//! Façade composing the memory and persistent tiers behind a single API,
//! with per-tier deadlines, warm-up, and SLA monitoring.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;

use cache_core::cache::{CacheConfig, CacheStats, MemoryCache};

use crate::analytics::{AnalyticsRecorder, NewEvent};
use crate::persistent_cache::PersistentCacheBackend;

/// Latency deadlines for each tier.
#[derive(Debug, Clone, Copy)]
pub struct PerformanceTargets {
    /// Deadline for a memory-tier lookup, in milliseconds.
    pub max_memory_response_time_ms: u64,
    /// Deadline for a persistent-tier lookup, in milliseconds.
    pub max_persistent_response_time_ms: u64,
    /// Hit rate below which the cache is considered ineffective.
    pub min_cache_hit_rate: f64,
    /// Soft cap on memory-tier heap usage.
    pub max_memory_usage_bytes: u64,
}

impl Default for PerformanceTargets {
    fn default() -> Self {
        Self {
            max_memory_response_time_ms: 30,
            max_persistent_response_time_ms: 100,
            min_cache_hit_rate: 80.0,
            max_memory_usage_bytes: 52_428_800,
        }
    }
}

/// Rolling-window SLA monitoring configuration.
#[derive(Debug, Clone, Copy)]
pub struct SlaMonitoringConfig {
    /// Whether SLA monitoring is active at all.
    pub enabled: bool,
    /// Violations within a window before an `sla_violation` event fires.
    pub violation_threshold: u32,
    /// Width of the rolling window, in milliseconds.
    pub monitoring_window_ms: u64,
}

impl Default for SlaMonitoringConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            violation_threshold: 5,
            monitoring_window_ms: 60_000,
        }
    }
}

/// Top-level configuration for the tiered cache.
#[derive(Debug, Clone)]
pub struct TieredCacheConfig {
    /// Memory-tier sizing/TTL configuration.
    pub memory: CacheConfig,
    /// Whether the persistent tier is consulted at all.
    pub persistent_enabled: bool,
    /// Per-tier latency deadlines.
    pub performance_targets: PerformanceTargets,
    /// Rolling-window violation tracking.
    pub sla_monitoring: SlaMonitoringConfig,
}

#[derive(Debug, Clone, Copy)]
enum Tier {
    Memory,
    Persistent,
}

struct SlaState {
    window_start: Instant,
    violations: u32,
    violation_emitted: bool,
}

impl SlaState {
    fn fresh() -> Self {
        Self {
            window_start: Instant::now(),
            violations: 0,
            violation_emitted: false,
        }
    }
}

/// Combined hit-rate/size view across both tiers.
#[derive(Debug, Clone, Copy)]
pub struct CombinedStats {
    /// Hit rate across both tiers combined, 0-100, 2 dp.
    pub overall_hit_rate: f64,
    /// Total live entries across both tiers' memory footprints.
    pub size: usize,
    /// Combined hit count.
    pub hits: u64,
    /// Combined miss count.
    pub misses: u64,
}

/// Stats bundle returned by `get_stats`.
#[derive(Debug, Clone, Copy)]
pub struct TieredStats {
    /// Fast-tier stats.
    pub memory: CacheStats,
    /// Persistent tier's own memory-footprint stats, if enabled.
    pub persistent: Option<CacheStats>,
    /// Combined view.
    pub combined: CombinedStats,
}

/// Outcome of a `warmup_critical_standards` call.
#[derive(Debug, Clone, Default)]
pub struct WarmupReport {
    /// Keys whose provider resolved and were cached.
    pub resolved: Vec<String>,
    /// Keys whose provider errored; logged and skipped.
    pub skipped: Vec<String>,
    /// True if the overall deadline was hit before every key was tried.
    pub deadline_exceeded: bool,
}

/// Composes a fast memory tier with an optional durable tier, enforcing
/// per-tier deadlines and rolling-window SLA monitoring.
pub struct TieredPerformanceCache<T>
where
    T: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    memory: Arc<MemoryCache<T>>,
    persistent: Option<Arc<PersistentCacheBackend<T>>>,
    targets: PerformanceTargets,
    sla_config: SlaMonitoringConfig,
    sla: Mutex<SlaState>,
    analytics: Option<Arc<AnalyticsRecorder>>,
}

impl<T> TieredPerformanceCache<T>
where
    T: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    /// Builds a tiered cache. `persistent` is `None` when the persistent
    /// tier is disabled by configuration.
    #[must_use]
    pub fn new(
        config: &TieredCacheConfig,
        persistent: Option<Arc<PersistentCacheBackend<T>>>,
        analytics: Option<Arc<AnalyticsRecorder>>,
    ) -> Self {
        Self {
            memory: Arc::new(MemoryCache::new(config.memory.clone())),
            persistent: if config.persistent_enabled { persistent } else { None },
            targets: config.performance_targets,
            sla_config: config.sla_monitoring,
            sla: Mutex::new(SlaState::fresh()),
            analytics,
        }
    }

    /// Reads `key`: memory first (within `max_memory_response_time_ms`),
    /// falling back to the persistent tier (within
    /// `max_persistent_response_time_ms`) on miss. A persistent hit is
    /// promoted into memory before returning.
    pub async fn get(&self, key: &str) -> Option<T> {
        let started = Instant::now();
        if let Some(value) = self.memory.get(key) {
            self.record_tier_timing(Tier::Memory, started.elapsed()).await;
            return Some(value);
        }
        self.record_tier_timing(Tier::Memory, started.elapsed()).await;

        let Some(persistent) = &self.persistent else {
            return None;
        };
        let deadline = Duration::from_millis(self.targets.max_persistent_response_time_ms);
        let started = Instant::now();
        let result = tokio::time::timeout(deadline, persistent.get(key)).await;
        self.record_tier_timing(Tier::Persistent, started.elapsed()).await;

        match result {
            Ok(Some(value)) => {
                self.memory.set(key, value.clone(), None);
                Some(value)
            }
            Ok(None) | Err(_) => None,
        }
    }

    /// Writes through to both tiers: memory eagerly, persistent lazily via
    /// its dirty-flag mechanism.
    pub fn set(&self, key: &str, value: T, ttl_ms: Option<u64>) {
        self.memory.set(key, value.clone(), ttl_ms);
        if let Some(persistent) = &self.persistent {
            persistent.set(key, value, ttl_ms);
        }
    }

    /// Calls `provider(key)` for every key and caches the result. Failures
    /// are logged and skipped, not propagated. The whole batch is bounded
    /// by `deadline`; keys not yet attempted when it elapses are abandoned
    /// and reported as neither resolved nor skipped.
    pub async fn warmup_critical_standards<F, Fut>(
        &self,
        keys: Vec<String>,
        provider: F,
        deadline: Duration,
    ) -> WarmupReport
    where
        F: Fn(String) -> Fut,
        Fut: std::future::Future<Output = Result<T, cache_core::Error>>,
    {
        let report = Mutex::new(WarmupReport::default());
        let work = async {
            for key in keys {
                match provider(key.clone()).await {
                    Ok(value) => {
                        self.set(&key, value, None);
                        report.lock().resolved.push(key);
                    }
                    Err(e) => {
                        tracing::warn!(key, error = %e, "warmup provider failed, skipping");
                        report.lock().skipped.push(key);
                    }
                }
            }
        };
        if tokio::time::timeout(deadline, work).await.is_err() {
            tracing::warn!("warm-up deadline exceeded; remaining keys abandoned");
            report.lock().deadline_exceeded = true;
        }
        report.into_inner()
    }

    /// Point-in-time stats for both tiers plus a combined view. Does not
    /// touch the persistent tier's disk-backed aggregates — those are
    /// behind `PersistentCacheBackend::get_extended_stats` instead, since
    /// this call must not suspend.
    #[must_use]
    pub fn get_stats(&self) -> TieredStats {
        let memory = self.memory.stats();
        let persistent = self.persistent.as_ref().map(|p| p.memory().stats());

        let (hits, misses, size) = persistent.as_ref().map_or(
            (memory.hits, memory.misses, memory.size),
            |p| (memory.hits + p.hits, memory.misses + p.misses, memory.size + p.size),
        );

        TieredStats {
            memory,
            persistent,
            combined: CombinedStats {
                overall_hit_rate: CacheStats::hit_rate(hits, misses),
                size,
                hits,
                misses,
            },
        }
    }

    /// Direct access to the persistent tier, for callers that need a
    /// disk-backed scan the memory/persistent `get` path doesn't cover
    /// (e.g. listing by facet rather than by exact key).
    #[must_use]
    pub fn persistent(&self) -> Option<&Arc<PersistentCacheBackend<T>>> {
        self.persistent.as_ref()
    }

    /// Stops any background tasks on the persistent tier, force-syncs it
    /// if dirty, and clears memory.
    pub async fn destroy(&self) -> cache_core::Result<()> {
        if let Some(persistent) = &self.persistent {
            persistent.destroy().await?;
        }
        self.memory.clear();
        Ok(())
    }

    async fn record_tier_timing(&self, tier: Tier, elapsed: Duration) {
        if !self.sla_config.enabled {
            return;
        }
        let deadline_ms = match tier {
            Tier::Memory => self.targets.max_memory_response_time_ms,
            Tier::Persistent => self.targets.max_persistent_response_time_ms,
        };
        if elapsed.as_millis() as u64 <= deadline_ms {
            return;
        }

        let should_emit = {
            let mut state = self.sla.lock();
            if state.window_start.elapsed().as_millis() as u64 > self.sla_config.monitoring_window_ms {
                *state = SlaState::fresh();
            }
            state.violations += 1;
            if state.violations > self.sla_config.violation_threshold && !state.violation_emitted {
                state.violation_emitted = true;
                true
            } else {
                false
            }
        };

        if should_emit {
            if let Some(analytics) = &self.analytics {
                analytics
                    .record_event(NewEvent {
                        id: uuid::Uuid::new_v4().to_string(),
                        event_type: "sla_violation".to_string(),
                        metadata: serde_json::json!({ "tier": format!("{tier:?}") }),
                        duration_ms: Some(elapsed.as_millis() as u64),
                        standard_id: None,
                    })
                    .await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::adapter::{LibsqlStorageAdapter, StorageAdapter};
    use crate::analytics::EventQuery;
    use crate::persistent_cache::{PersistentCacheBackend, PersistentCacheConfig};

    fn memory_config() -> CacheConfig {
        CacheConfig {
            max_size: 10,
            default_ttl_ms: 60_000,
            enabled: true,
        }
    }

    fn no_op_cache() -> TieredPerformanceCache<String> {
        TieredPerformanceCache::new(
            &TieredCacheConfig {
                memory: memory_config(),
                persistent_enabled: false,
                performance_targets: PerformanceTargets::default(),
                sla_monitoring: SlaMonitoringConfig::default(),
            },
            None,
            None,
        )
    }

    #[tokio::test]
    async fn warmup_resolves_values_and_skips_failed_providers() {
        let cache = no_op_cache();
        let report = cache
            .warmup_critical_standards(
                vec!["good".to_string(), "bad".to_string()],
                |key| async move {
                    if key == "bad" {
                        Err(cache_core::Error::Configuration("provider unavailable".to_string()))
                    } else {
                        Ok(format!("value-for-{key}"))
                    }
                },
                Duration::from_secs(5),
            )
            .await;

        assert_eq!(report.resolved, vec!["good".to_string()]);
        assert_eq!(report.skipped, vec!["bad".to_string()]);
        assert!(!report.deadline_exceeded);
        assert_eq!(cache.get("good").await, Some("value-for-good".to_string()));
    }

    #[tokio::test]
    async fn warmup_abandons_remaining_keys_past_its_deadline() {
        let cache = no_op_cache();
        let keys = vec!["k1".to_string(), "k2".to_string(), "k3".to_string()];
        let report = cache
            .warmup_critical_standards(
                keys,
                |key| async move {
                    tokio::time::sleep(Duration::from_millis(40)).await;
                    Ok::<String, cache_core::Error>(format!("value-for-{key}"))
                },
                Duration::from_millis(60),
            )
            .await;

        assert!(report.deadline_exceeded);
        assert!(!report.resolved.is_empty());
        assert!(report.resolved.len() < 3);
    }

    #[tokio::test]
    async fn persistent_hit_is_promoted_into_memory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.db");
        let storage: Arc<dyn StorageAdapter> =
            Arc::new(LibsqlStorageAdapter::new(format!("file:{}", path.display())));
        storage.initialize().await.unwrap();
        let persistent = Arc::new(PersistentCacheBackend::new(
            memory_config(),
            storage,
            PersistentCacheConfig::default(),
            None,
        ));
        persistent.set("standards:rust:naming:r1", "value".to_string(), None);
        persistent.sync_to_disk().await.unwrap();
        // Dropped from the persistent backend's own memory tier so the hit
        // below can only come from disk, proving the promotion path.
        persistent.memory().delete("standards:rust:naming:r1");

        let cache = TieredPerformanceCache::new(
            &TieredCacheConfig {
                memory: memory_config(),
                persistent_enabled: true,
                performance_targets: PerformanceTargets::default(),
                sla_monitoring: SlaMonitoringConfig::default(),
            },
            Some(Arc::clone(&persistent)),
            None,
        );

        assert_eq!(
            cache.get("standards:rust:naming:r1").await,
            Some("value".to_string())
        );
        // Promoted: now present in the façade's own memory tier without
        // consulting the persistent backend again.
        assert!(cache.memory.has("standards:rust:naming:r1"));
    }

    #[tokio::test]
    async fn sla_violation_emits_once_per_window_past_threshold() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.db");
        let storage: Arc<dyn StorageAdapter> =
            Arc::new(LibsqlStorageAdapter::new(format!("file:{}", path.display())));
        storage.initialize().await.unwrap();
        let analytics = Arc::new(AnalyticsRecorder::new(Arc::clone(&storage)));

        let cache = TieredPerformanceCache::new(
            &TieredCacheConfig {
                memory: memory_config(),
                persistent_enabled: false,
                performance_targets: PerformanceTargets::default(),
                sla_monitoring: SlaMonitoringConfig {
                    enabled: true,
                    violation_threshold: 2,
                    monitoring_window_ms: 60_000,
                },
            },
            None,
            Some(Arc::clone(&analytics)),
        );

        for _ in 0..4 {
            cache
                .record_tier_timing(Tier::Memory, Duration::from_millis(50))
                .await;
        }

        let (events, _) = analytics
            .get_events(&EventQuery {
                limit: 10,
                ..EventQuery::default()
            })
            .await
            .unwrap();
        assert_eq!(
            events.iter().filter(|e| e.event_type == "sla_violation").count(),
            1
        );
    }
}
