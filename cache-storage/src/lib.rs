//! Durable, searchable, analytics-backed storage for the standards cache.
//!
//! This crate layers on top of `cache-core`'s pure in-memory cache with an
//! embedded-relational-store backend: the persistent tier that mirrors it
//! to disk, the tiered façade that composes both, the full-text search
//! engine, and the append-only usage analytics recorder.

pub mod adapter;
pub mod analytics;
pub mod fts5_schema;
pub mod fts_engine;
pub mod persistent_cache;
pub mod pool;
pub mod schema;
pub mod tiered_cache;

pub use adapter::{ExecuteOutcome, HealthStatus, LibsqlStorageAdapter, RetryPolicy, StorageAdapter};
pub use analytics::{AnalyticsRecorder, EventQuery, NewEvent, Summary, UsageBucket};
pub use fts_engine::{FtsSearchEngine, IndexHealth, OrderBy, SearchHit, SearchOptions, SearchResults};
pub use persistent_cache::{
    ExportedEntry, ExtendedStats, PersistentCacheBackend, PersistentCacheConfig,
};
pub use pool::{ConnectionPool, PoolConfig, PooledConnection};
pub use tiered_cache::{
    CombinedStats, PerformanceTargets, SlaMonitoringConfig, TieredCacheConfig,
    TieredPerformanceCache, TieredStats, WarmupReport,
};
