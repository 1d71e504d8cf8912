//! Process entrypoint: loads configuration, initializes storage, and keeps
//! the standards cache's background tasks alive until shutdown.

use std::sync::Arc;

use cache_core::cache::CacheConfig;
use cache_server::api::AppState;
use cache_server::config::CacheSystemConfig;
use cache_storage::{
    AnalyticsRecorder, FtsSearchEngine, LibsqlStorageAdapter, PersistentCacheBackend,
    StorageAdapter, TieredPerformanceCache,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config_path = std::env::args().nth(1);
    let config = CacheSystemConfig::load(config_path.as_deref().map(std::path::Path::new))?;
    tracing::info!("loaded standards cache configuration");

    let storage: Arc<dyn StorageAdapter> =
        Arc::new(LibsqlStorageAdapter::new(config.persistent_cache.database_url.clone()));
    storage.initialize().await?;
    tracing::info!(url = %config.persistent_cache.database_url, "storage initialized");

    let analytics = Arc::new(AnalyticsRecorder::new(Arc::clone(&storage)));

    let persistent = Arc::new(PersistentCacheBackend::new(
        CacheConfig {
            max_size: config.persistent_cache.max_size,
            default_ttl_ms: config.persistent_cache.ttl_ms,
            enabled: true,
        },
        Arc::clone(&storage),
        config.persistent_cache_config(),
        Some(Arc::clone(&analytics)),
    ));
    persistent.load_from_disk(config.persistent_cache.max_size).await?;
    persistent.start_background_tasks();

    let cache = Arc::new(TieredPerformanceCache::new(
        &config.tiered_cache_config(),
        Some(Arc::clone(&persistent)),
        Some(Arc::clone(&analytics)),
    ));
    let search = Arc::new(FtsSearchEngine::new(Arc::clone(&storage)));

    let state = AppState {
        cache: Arc::clone(&cache),
        search,
        analytics,
    };

    match cache_server::api::get_registry_stats(&state).await {
        Ok(stats) => {
            let documents = stats.index_health.total_documents;
            tracing::info!(documents, "standards cache ready");
        }
        Err(e) => tracing::warn!(error = %e, "standards cache ready, index health unavailable"),
    }
    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down");
    cache.destroy().await?;
    storage.close().await?;
    Ok(())
}
