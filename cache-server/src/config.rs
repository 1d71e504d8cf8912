//! Layered configuration for the standards cache process: built-in
//! defaults, an optional TOML file, then `CACHE__`-prefixed environment
//! overrides, in that order.

use std::path::Path;

use serde::{Deserialize, Serialize};

use cache_core::cache::CacheConfig;
use cache_storage::{PerformanceTargets, PersistentCacheConfig, SlaMonitoringConfig, TieredCacheConfig};

/// Sizing and TTL for the fast in-memory tier.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryCacheSettings {
    /// Maximum number of entries held in memory.
    pub max_size: usize,
    /// Soft heap-usage ceiling; informational only, not enforced directly.
    pub memory_limit_bytes: u64,
    /// Default entry TTL in milliseconds.
    pub ttl_ms: u64,
}

impl Default for MemoryCacheSettings {
    fn default() -> Self {
        Self {
            max_size: 1000,
            memory_limit_bytes: 52_428_800,
            ttl_ms: 3_600_000,
        }
    }
}

/// Persistent tier sizing and upkeep cadence.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistentCacheSettings {
    /// Whether the persistent tier is consulted at all.
    pub enabled: bool,
    /// Maximum rows hydrated into memory on startup.
    pub max_size: usize,
    /// Default entry TTL in milliseconds.
    pub ttl_ms: u64,
    /// How often dirty entries flush to disk.
    pub sync_interval_ms: u64,
    /// How often expired rows are swept from disk.
    pub cleanup_interval_ms: u64,
    /// Recognised but not implemented: no compression codec is wired in.
    pub compression_enabled: bool,
    /// Recognised but not implemented: cryptographic confidentiality of
    /// cached data is out of scope.
    pub encryption_key: Option<String>,
    /// `libsql` connection URL, e.g. `file:standards-cache.db`.
    pub database_url: String,
    /// Bounded connection pool size.
    pub max_connections: usize,
}

impl Default for PersistentCacheSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            max_size: 10_000,
            ttl_ms: 3_600_000,
            sync_interval_ms: 30_000,
            cleanup_interval_ms: 300_000,
            compression_enabled: false,
            encryption_key: None,
            database_url: "file:standards-cache.db".to_string(),
            max_connections: 8,
        }
    }
}

/// Per-tier latency targets; mirrors [`cache_storage::PerformanceTargets`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct PerformanceTargetsSettings {
    /// Deadline for a memory-tier lookup, in milliseconds.
    pub max_memory_response_time_ms: u64,
    /// Deadline for a persistent-tier lookup, in milliseconds.
    pub max_persistent_response_time_ms: u64,
    /// Hit rate below which the cache is considered ineffective.
    pub min_cache_hit_rate: f64,
    /// Soft cap on memory-tier heap usage.
    pub max_memory_usage_bytes: u64,
}

impl Default for PerformanceTargetsSettings {
    fn default() -> Self {
        let defaults = PerformanceTargets::default();
        Self {
            max_memory_response_time_ms: defaults.max_memory_response_time_ms,
            max_persistent_response_time_ms: defaults.max_persistent_response_time_ms,
            min_cache_hit_rate: defaults.min_cache_hit_rate,
            max_memory_usage_bytes: defaults.max_memory_usage_bytes,
        }
    }
}

/// Rolling-window SLA monitoring; mirrors [`cache_storage::SlaMonitoringConfig`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct SlaMonitoringSettings {
    /// Whether SLA monitoring is active at all.
    pub enabled: bool,
    /// Violations within a window before an `sla_violation` event fires.
    pub violation_threshold: u32,
    /// Width of the rolling window, in milliseconds.
    pub monitoring_window_ms: u64,
}

impl Default for SlaMonitoringSettings {
    fn default() -> Self {
        let defaults = SlaMonitoringConfig::default();
        Self {
            enabled: defaults.enabled,
            violation_threshold: defaults.violation_threshold,
            monitoring_window_ms: defaults.monitoring_window_ms,
        }
    }
}

/// Top-level configuration for the standards cache process.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSystemConfig {
    /// Memory-tier settings.
    pub memory_cache: MemoryCacheSettings,
    /// Persistent-tier settings.
    pub persistent_cache: PersistentCacheSettings,
    /// Per-tier latency targets.
    pub performance_targets: PerformanceTargetsSettings,
    /// SLA monitoring settings.
    pub sla_monitoring: SlaMonitoringSettings,
}

impl CacheSystemConfig {
    /// Loads configuration from built-in defaults, an optional TOML file at
    /// `path`, then `CACHE__`-prefixed (double-underscore nested) environment
    /// variables, each layer overriding the previous.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut builder = config::Config::builder();
        builder = match path {
            Some(path) => builder.add_source(config::File::from(path).required(false)),
            None => builder.add_source(config::File::with_name("cache-server").required(false)),
        };
        builder = builder.add_source(
            config::Environment::with_prefix("CACHE")
                .separator("__")
                .try_parsing(true),
        );
        let raw = builder.build()?;

        // `config` leaves entirely-absent tables as missing rather than
        // defaulted, so fall back field-by-field via serde's `#[default]`.
        match raw.try_deserialize::<Self>() {
            Ok(cfg) => Ok(cfg),
            Err(config::ConfigError::NotFound(_)) => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    /// Builds the tiered cache façade's configuration from these settings.
    #[must_use]
    pub fn tiered_cache_config(&self) -> TieredCacheConfig {
        TieredCacheConfig {
            memory: CacheConfig {
                max_size: self.memory_cache.max_size,
                default_ttl_ms: self.memory_cache.ttl_ms,
                enabled: true,
            },
            persistent_enabled: self.persistent_cache.enabled,
            performance_targets: PerformanceTargets {
                max_memory_response_time_ms: self.performance_targets.max_memory_response_time_ms,
                max_persistent_response_time_ms: self
                    .performance_targets
                    .max_persistent_response_time_ms,
                min_cache_hit_rate: self.performance_targets.min_cache_hit_rate,
                max_memory_usage_bytes: self.performance_targets.max_memory_usage_bytes,
            },
            sla_monitoring: SlaMonitoringConfig {
                enabled: self.sla_monitoring.enabled,
                violation_threshold: self.sla_monitoring.violation_threshold,
                monitoring_window_ms: self.sla_monitoring.monitoring_window_ms,
            },
        }
    }

    /// Builds the persistent tier's own sync/cleanup configuration.
    #[must_use]
    pub fn persistent_cache_config(&self) -> PersistentCacheConfig {
        PersistentCacheConfig {
            sync_interval_ms: self.persistent_cache.sync_interval_ms,
            cleanup_interval_ms: self.persistent_cache.cleanup_interval_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_round_trip_through_toml() {
        let cfg = CacheSystemConfig::default();
        let toml_str = toml::to_string(&cfg).expect("serialize");
        let reparsed: CacheSystemConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(reparsed.memory_cache.max_size, cfg.memory_cache.max_size);
        assert_eq!(reparsed.persistent_cache.database_url, cfg.persistent_cache.database_url);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let cfg = CacheSystemConfig::load(Some(Path::new("/nonexistent/cache-server.toml")));
        assert!(cfg.is_ok());
    }
}
