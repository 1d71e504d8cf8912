//! Durable mirror of the memory cache.
//!
//! Composition over inheritance: a [`PersistentCacheBackend`] holds a
//! [`MemoryCache`] and a [`StorageAdapter`]; writes mutate both, reads
//! consult memory first. No subclassing.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use libsql::Value;
use parking_lot::Mutex;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::task::JoinHandle;

use cache_core::cache::{now_ms, CacheConfig, MemoryCache};
use cache_core::error::{Error, Result};

use crate::adapter::{ExecuteOutcome, StorageAdapter};
use crate::analytics::AnalyticsRecorder;

fn wall_clock_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Tunables specific to the persistent tier.
#[derive(Debug, Clone)]
pub struct PersistentCacheConfig {
    /// How often dirty entries are flushed to disk.
    pub sync_interval_ms: u64,
    /// How often expired rows are swept from disk.
    pub cleanup_interval_ms: u64,
}

impl Default for PersistentCacheConfig {
    fn default() -> Self {
        Self {
            sync_interval_ms: 30_000,
            cleanup_interval_ms: 300_000,
        }
    }
}

/// Aggregate stats merging the memory tier with persistent-only facts.
#[derive(Debug, Clone)]
pub struct ExtendedStats {
    /// The underlying memory-tier stats.
    pub memory: cache_core::cache::CacheStats,
    /// Number of rows currently on disk.
    pub disk_entry_count: u64,
    /// Approximate on-disk byte size of cached payloads.
    pub disk_byte_size: u64,
    /// Top technologies by row count, descending.
    pub top_technologies: Vec<(String, u64)>,
    /// Top categories by row count, descending.
    pub top_categories: Vec<(String, u64)>,
    /// Number of rows already past `expires_at`.
    pub expired_count: u64,
    /// Oldest `created_at`, milliseconds since epoch.
    pub oldest_created_at: Option<i64>,
    /// Newest `created_at`, milliseconds since epoch.
    pub newest_created_at: Option<i64>,
}

/// One exported row, used for `export`/`import` round-trips.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ExportedEntry<T> {
    /// The cache key.
    pub key: String,
    /// The cached value.
    pub value: T,
    /// Wall-clock creation time, milliseconds since epoch.
    pub created_at: i64,
    /// Wall-clock expiry time, milliseconds since epoch.
    pub expires_at: i64,
}

/// Durable two-tier cache: a fast [`MemoryCache`] backed by rows in
/// `standards_cache` via a [`StorageAdapter`].
pub struct PersistentCacheBackend<T>
where
    T: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    memory: Arc<MemoryCache<T>>,
    storage: Arc<dyn StorageAdapter>,
    analytics: Option<Arc<AnalyticsRecorder>>,
    dirty: Mutex<HashSet<String>>,
    config: PersistentCacheConfig,
    sync_task: Mutex<Option<JoinHandle<()>>>,
    cleanup_task: Mutex<Option<JoinHandle<()>>>,
}

impl<T> PersistentCacheBackend<T>
where
    T: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    /// Builds a new backend. Call [`Self::load_from_disk`] to hydrate it
    /// and [`Self::start_background_tasks`] to begin periodic sync/sweep.
    #[must_use]
    pub fn new(
        memory_config: CacheConfig,
        storage: Arc<dyn StorageAdapter>,
        config: PersistentCacheConfig,
        analytics: Option<Arc<AnalyticsRecorder>>,
    ) -> Self {
        Self {
            memory: Arc::new(MemoryCache::new(memory_config)),
            storage,
            analytics,
            dirty: Mutex::new(HashSet::new()),
            config,
            sync_task: Mutex::new(None),
            cleanup_task: Mutex::new(None),
        }
    }

    /// Hydrates memory with the `max_size` most-recently-accessed live
    /// rows, ordered by `last_accessed DESC`.
    pub async fn load_from_disk(&self, max_size: usize) -> Result<()> {
        let now = wall_clock_ms();
        let outcome = self
            .storage
            .execute(
                "SELECT key, data, expires_at FROM standards_cache \
                 WHERE expires_at > ?1 ORDER BY last_accessed DESC LIMIT ?2",
                vec![Value::Integer(now), Value::Integer(max_size as i64)],
            )
            .await?;
        let ExecuteOutcome::Rows(rows) = outcome else {
            return Ok(());
        };
        for row in rows {
            let Some(key) = row.get("key").and_then(|v| v.as_str()) else {
                continue;
            };
            let Some(blob) = row.get("data").and_then(|v| v.as_str()) else {
                continue;
            };
            let expires_at = row.get("expires_at").and_then(serde_json::Value::as_i64).unwrap_or(0);
            match serde_json::from_str::<T>(blob) {
                Ok(value) => {
                    let ttl = u64::try_from(expires_at - now).unwrap_or(0);
                    self.memory.set(key, value, Some(ttl));
                }
                Err(e) => {
                    tracing::warn!(key, error = %e, "dropping corrupt cache row on load");
                    let _ = self
                        .storage
                        .execute(
                            "DELETE FROM standards_cache WHERE key = ?1",
                            vec![Value::Text(key.to_string())],
                        )
                        .await;
                }
            }
        }
        Ok(())
    }

    /// Reads `key`, consulting memory first. Promotes hits discovered only
    /// on disk. Emits a `cache_hit`/`cache_miss` analytics event on every
    /// call; analytics failures never propagate.
    pub async fn get(&self, key: &str) -> Option<T> {
        if let Some(value) = self.memory.get(key) {
            self.record_hit(key).await;
            return Some(value);
        }

        let now = wall_clock_ms();
        let outcome = self
            .storage
            .execute(
                "SELECT data, expires_at FROM standards_cache WHERE key = ?1",
                vec![Value::Text(key.to_string())],
            )
            .await;
        let rows = match outcome {
            Ok(ExecuteOutcome::Rows(rows)) => rows,
            _ => {
                self.record_miss(key).await;
                return None;
            }
        };
        let Some(row) = rows.first() else {
            self.record_miss(key).await;
            return None;
        };
        let expires_at = row.get("expires_at").and_then(serde_json::Value::as_i64).unwrap_or(0);
        if expires_at <= now {
            self.record_miss(key).await;
            return None;
        }
        let Some(blob) = row.get("data").and_then(|v| v.as_str()) else {
            self.record_miss(key).await;
            return None;
        };
        match serde_json::from_str::<T>(blob) {
            Ok(value) => {
                let ttl = u64::try_from(expires_at - now).unwrap_or(0);
                self.memory.set(key, value.clone(), Some(ttl));
                self.record_hit(key).await;
                Some(value)
            }
            Err(e) => {
                tracing::warn!(key, error = %e, "dropping corrupt cache row on read");
                let _ = self
                    .storage
                    .execute(
                        "DELETE FROM standards_cache WHERE key = ?1",
                        vec![Value::Text(key.to_string())],
                    )
                    .await;
                self.record_miss(key).await;
                None
            }
        }
    }

    /// Writes `key` into memory eagerly and marks it dirty for the next
    /// `sync_to_disk` tick.
    pub fn set(&self, key: &str, value: T, ttl_ms: Option<u64>) {
        self.memory.set(key, value, ttl_ms);
        self.dirty.lock().insert(key.to_string());
    }

    /// Deletes `key` from memory and issues a prompt disk deletion rather
    /// than waiting for the next sync tick.
    pub async fn delete(&self, key: &str) -> Result<()> {
        self.memory.delete(key);
        self.dirty.lock().remove(key);
        self.storage
            .execute(
                "DELETE FROM standards_cache WHERE key = ?1",
                vec![Value::Text(key.to_string())],
            )
            .await?;
        Ok(())
    }

    /// Upserts every dirty memory entry into `standards_cache` within a
    /// single transaction, then clears the dirty set.
    pub async fn sync_to_disk(&self) -> Result<usize> {
        let dirty_keys: Vec<String> = {
            let mut dirty = self.dirty.lock();
            let keys = dirty.iter().cloned().collect();
            dirty.clear();
            keys
        };
        if dirty_keys.is_empty() {
            return Ok(0);
        }

        let now = wall_clock_ms();
        let mono_now = now_ms();
        let mut ops = Vec::with_capacity(dirty_keys.len());
        for key in &dirty_keys {
            let Some((value, created_at_mono, expires_at_mono)) = self.memory.entry_snapshot(key)
            else {
                continue;
            };
            let blob = match serde_json::to_string(&value) {
                Ok(b) => b,
                Err(e) => {
                    tracing::warn!(key, error = %e, "skipping unserializable entry during sync");
                    continue;
                }
            };
            let ttl_ms = expires_at_mono.saturating_sub(created_at_mono);
            let remaining_ms = expires_at_mono.saturating_sub(mono_now);
            let technology = cache_core::key_schema::extract_technology(key);
            let category = cache_core::key_schema::extract_category(key);
            let standard_id = cache_core::key_schema::extract_standard_id(key);
            ops.push((
                "INSERT INTO standards_cache \
                 (key, data, ttl, created_at, last_accessed, expires_at, technology, category, standard_id) \
                 VALUES (?1, ?2, ?3, ?4, ?4, ?5, ?6, ?7, ?8) \
                 ON CONFLICT(key) DO UPDATE SET \
                   data = excluded.data, last_accessed = excluded.last_accessed, \
                   expires_at = excluded.expires_at, access_count = access_count + 1"
                    .to_string(),
                vec![
                    Value::Text(key.clone()),
                    Value::Text(blob),
                    Value::Integer(i64::try_from(ttl_ms).unwrap_or(i64::MAX)),
                    Value::Integer(now),
                    Value::Integer(now + i64::try_from(remaining_ms).unwrap_or(i64::MAX)),
                    technology.map_or(Value::Null, Value::Text),
                    category.map_or(Value::Null, Value::Text),
                    standard_id.map_or(Value::Null, Value::Text),
                ],
            ));
        }
        let n = ops.len();
        if n > 0 {
            self.storage.transaction(ops).await?;
        }
        Ok(n)
    }

    /// Deletes every row whose `expires_at < now`.
    pub async fn cleanup_expired(&self) -> Result<usize> {
        let now = wall_clock_ms();
        match self
            .storage
            .execute(
                "DELETE FROM standards_cache WHERE expires_at < ?1",
                vec![Value::Integer(now)],
            )
            .await?
        {
            ExecuteOutcome::Changes(n) => Ok(n as usize),
            ExecuteOutcome::Rows(_) => Ok(0),
        }
    }

    /// With no pattern, clears both tiers entirely. With a glob pattern
    /// (only `*` is a wildcard), removes every matching key from both
    /// tiers — anchored semantics in both: `^pat$` in memory, a non-`%`-
    /// surrounded `LIKE` translation on disk. Returns the count of
    /// distinct keys removed.
    pub async fn invalidate(&self, pattern: Option<&str>) -> Result<usize> {
        let Some(pattern) = pattern else {
            let memory_count = self.memory.size();
            self.memory.clear();
            self.dirty.lock().clear();
            self.storage.execute("DELETE FROM standards_cache", vec![]).await?;
            return Ok(memory_count);
        };

        let like_pattern = pattern.replace('*', "%");
        let regex_pattern = format!("^{}$", regex::escape(pattern).replace("\\*", ".*"));
        let re = Regex::new(&regex_pattern)
            .map_err(|e| Error::InvalidFilter(format!("bad invalidate pattern: {e}")))?;

        let mut removed: HashSet<String> = self
            .memory
            .keys()
            .into_iter()
            .filter(|k| re.is_match(k))
            .collect();
        for key in &removed {
            self.memory.delete(key);
            self.dirty.lock().remove(key);
        }

        if let ExecuteOutcome::Rows(rows) = self
            .storage
            .execute(
                "SELECT key FROM standards_cache WHERE key LIKE ?1",
                vec![Value::Text(like_pattern)],
            )
            .await?
        {
            for row in rows {
                if let Some(key) = row.get("key").and_then(|v| v.as_str()) {
                    removed.insert(key.to_string());
                }
            }
        }
        self.storage
            .execute(
                "DELETE FROM standards_cache WHERE key LIKE ?1",
                vec![Value::Text(pattern.replace('*', "%"))],
            )
            .await?;

        Ok(removed.len())
    }

    /// Filtered scan of the persistent tier only; does not touch memory.
    pub async fn get_by_technology_and_category(
        &self,
        technology: Option<&str>,
        category: Option<&str>,
    ) -> Result<Vec<(String, T)>> {
        let (sql, params): (&str, Vec<Value>) = match (technology, category) {
            (Some(t), Some(c)) => (
                "SELECT key, data FROM standards_cache WHERE technology = ?1 AND category = ?2",
                vec![Value::Text(t.to_string()), Value::Text(c.to_string())],
            ),
            (Some(t), None) => (
                "SELECT key, data FROM standards_cache WHERE technology = ?1",
                vec![Value::Text(t.to_string())],
            ),
            (None, Some(c)) => (
                "SELECT key, data FROM standards_cache WHERE category = ?1",
                vec![Value::Text(c.to_string())],
            ),
            (None, None) => ("SELECT key, data FROM standards_cache", vec![]),
        };

        let ExecuteOutcome::Rows(rows) = self.storage.execute(sql, params).await? else {
            return Ok(vec![]);
        };
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let (Some(key), Some(blob)) = (
                row.get("key").and_then(|v| v.as_str()),
                row.get("data").and_then(|v| v.as_str()),
            ) else {
                continue;
            };
            if let Ok(value) = serde_json::from_str::<T>(blob) {
                out.push((key.to_string(), value));
            }
        }
        Ok(out)
    }

    /// Snapshots every live entry for backup, mirroring each entry's real
    /// remaining TTL rather than a fixed horizon.
    pub fn export(&self) -> Vec<ExportedEntry<T>> {
        let wall_now = wall_clock_ms();
        let mono_now = now_ms();
        self.memory
            .keys()
            .into_iter()
            .filter_map(|key| {
                let (value, _created_at_mono, expires_at_mono) = self.memory.entry_snapshot(&key)?;
                let remaining_ms = expires_at_mono.saturating_sub(mono_now);
                Some(ExportedEntry {
                    key,
                    value,
                    created_at: wall_now,
                    expires_at: wall_now + i64::try_from(remaining_ms).unwrap_or(i64::MAX),
                })
            })
            .collect()
    }

    /// Restores entries from a prior `export()`, skipping any already
    /// expired by wall-clock time.
    pub fn import(&self, entries: Vec<ExportedEntry<T>>) -> usize {
        let now = wall_clock_ms();
        let mut restored = 0;
        for entry in entries {
            if entry.expires_at <= now {
                continue;
            }
            let ttl = u64::try_from(entry.expires_at - now).unwrap_or(0);
            self.set(&entry.key, entry.value, Some(ttl));
            restored += 1;
        }
        restored
    }

    /// Merges memory stats with persistent-only aggregates.
    pub async fn get_extended_stats(&self) -> Result<ExtendedStats> {
        let memory = self.memory.stats();
        let now = wall_clock_ms();

        let disk_entry_count = self.scalar_count("SELECT COUNT(*) AS c FROM standards_cache").await?;
        let disk_byte_size = self
            .scalar_count("SELECT COALESCE(SUM(LENGTH(data)), 0) AS c FROM standards_cache")
            .await?;
        let expired_count = self
            .scalar_count_with(
                "SELECT COUNT(*) AS c FROM standards_cache WHERE expires_at < ?1",
                vec![Value::Integer(now)],
            )
            .await?;

        let top_technologies = self
            .top_n_facet("technology")
            .await
            .unwrap_or_default();
        let top_categories = self.top_n_facet("category").await.unwrap_or_default();

        let (oldest, newest) = self.min_max_created_at().await.unwrap_or((None, None));

        Ok(ExtendedStats {
            memory,
            disk_entry_count,
            disk_byte_size,
            top_technologies,
            top_categories,
            expired_count,
            oldest_created_at: oldest,
            newest_created_at: newest,
        })
    }

    async fn scalar_count(&self, sql: &str) -> Result<u64> {
        self.scalar_count_with(sql, vec![]).await
    }

    async fn scalar_count_with(&self, sql: &str, params: Vec<Value>) -> Result<u64> {
        let ExecuteOutcome::Rows(rows) = self.storage.execute(sql, params).await? else {
            return Ok(0);
        };
        Ok(rows
            .first()
            .and_then(|r| r.get("c"))
            .and_then(serde_json::Value::as_u64)
            .unwrap_or(0))
    }

    async fn top_n_facet(&self, column: &str) -> Result<Vec<(String, u64)>> {
        let sql = format!(
            "SELECT {column} AS facet, COUNT(*) AS c FROM standards_cache \
             WHERE {column} IS NOT NULL GROUP BY {column} ORDER BY c DESC LIMIT 5"
        );
        let ExecuteOutcome::Rows(rows) = self.storage.execute(&sql, vec![]).await? else {
            return Ok(vec![]);
        };
        Ok(rows
            .into_iter()
            .filter_map(|r| {
                let facet = r.get("facet").and_then(|v| v.as_str())?.to_string();
                let count = r.get("c").and_then(serde_json::Value::as_u64)?;
                Some((facet, count))
            })
            .collect())
    }

    async fn min_max_created_at(&self) -> Result<(Option<i64>, Option<i64>)> {
        let ExecuteOutcome::Rows(rows) = self
            .storage
            .execute(
                "SELECT MIN(created_at) AS oldest, MAX(created_at) AS newest FROM standards_cache",
                vec![],
            )
            .await?
        else {
            return Ok((None, None));
        };
        let Some(row) = rows.first() else {
            return Ok((None, None));
        };
        Ok((
            row.get("oldest").and_then(serde_json::Value::as_i64),
            row.get("newest").and_then(serde_json::Value::as_i64),
        ))
    }

    async fn record_hit(&self, key: &str) {
        if let Some(analytics) = &self.analytics {
            analytics.record_cache_event("cache_hit", key).await;
        }
    }

    async fn record_miss(&self, key: &str) {
        if let Some(analytics) = &self.analytics {
            analytics.record_cache_event("cache_miss", key).await;
        }
    }

    /// Spawns the periodic sync and cleanup timers. Call once; re-calling
    /// replaces any previously running tasks.
    pub fn start_background_tasks(self: &Arc<Self>) {
        let sync_self = Arc::clone(self);
        let sync_interval = Duration::from_millis(self.config.sync_interval_ms);
        let sync_handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(sync_interval);
            loop {
                ticker.tick().await;
                if let Err(e) = sync_self.sync_to_disk().await {
                    tracing::warn!(error = %e, "background sync_to_disk failed");
                }
            }
        });
        *self.sync_task.lock() = Some(sync_handle);

        let cleanup_self = Arc::clone(self);
        let cleanup_interval = Duration::from_millis(self.config.cleanup_interval_ms);
        let cleanup_handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(cleanup_interval);
            loop {
                ticker.tick().await;
                if let Err(e) = cleanup_self.cleanup_expired().await {
                    tracing::warn!(error = %e, "background cleanup_expired failed");
                }
            }
        });
        *self.cleanup_task.lock() = Some(cleanup_handle);
    }

    /// Cancels background tasks and force-flushes any pending dirty
    /// writes.
    pub async fn destroy(&self) -> Result<()> {
        if let Some(handle) = self.sync_task.lock().take() {
            handle.abort();
        }
        if let Some(handle) = self.cleanup_task.lock().take() {
            handle.abort();
        }
        self.sync_to_disk().await?;
        self.memory.clear();
        Ok(())
    }

    /// Access to the underlying memory tier, for components (e.g. the
    /// tiered cache) that need direct access to its pure operations.
    #[must_use]
    pub fn memory(&self) -> &Arc<MemoryCache<T>> {
        &self.memory
    }
}

impl<T> Drop for PersistentCacheBackend<T>
where
    T: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    fn drop(&mut self) {
        if let Some(handle) = self.sync_task.lock().take() {
            handle.abort();
        }
        if let Some(handle) = self.cleanup_task.lock().take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::adapter::LibsqlStorageAdapter;

    async fn backend() -> (tempfile::TempDir, PersistentCacheBackend<String>) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.db");
        let storage: Arc<dyn StorageAdapter> =
            Arc::new(LibsqlStorageAdapter::new(format!("file:{}", path.display())));
        storage.initialize().await.unwrap();
        let backend = PersistentCacheBackend::new(
            CacheConfig {
                max_size: 100,
                default_ttl_ms: 3_600_000,
                enabled: true,
            },
            storage,
            PersistentCacheConfig::default(),
            None,
        );
        (dir, backend)
    }

    #[tokio::test]
    async fn sync_then_cleanup_never_resurrects_an_expired_memory_entry() {
        let (_dir, backend) = backend().await;
        backend.set("standards:rust:naming:r1", "short-lived".to_string(), Some(50));
        backend.sync_to_disk().await.unwrap();

        tokio::time::sleep(Duration::from_millis(80)).await;
        // The in-memory entry has now expired and been evicted on access;
        // a disk row written with a fake one-hour expiry would still be
        // live and would resurrect the value here.
        assert_eq!(backend.get("standards:rust:naming:r1").await, None);
    }

    #[tokio::test]
    async fn sync_to_disk_mirrors_the_real_expires_at() {
        let (_dir, backend) = backend().await;
        backend.set("standards:rust:naming:r1", "value".to_string(), Some(60_000));
        backend.sync_to_disk().await.unwrap();

        let stats = backend.get_extended_stats().await.unwrap();
        assert_eq!(stats.disk_entry_count, 1);
        assert_eq!(stats.expired_count, 0);
    }

    #[tokio::test]
    async fn invalidate_pattern_removes_matching_keys_from_both_tiers() {
        let (_dir, backend) = backend().await;
        backend.set("standards:rust:naming:r1", "a".to_string(), None);
        backend.set("standards:rust:style:r2", "b".to_string(), None);
        backend.set("standards:python:naming:r3", "c".to_string(), None);
        backend.sync_to_disk().await.unwrap();

        let removed = backend.invalidate(Some("standards:rust:*")).await.unwrap();
        assert_eq!(removed, 2);
        assert_eq!(backend.get("standards:rust:naming:r1").await, None);
        assert_eq!(backend.get("standards:rust:style:r2").await, None);
        assert_eq!(
            backend.get("standards:python:naming:r3").await,
            Some("c".to_string())
        );
    }

    #[tokio::test]
    async fn export_then_import_round_trips_live_entries() {
        let (_dir, source) = backend().await;
        source.set("standards:rust:naming:r1", "value".to_string(), Some(60_000));
        let exported = source.export();
        assert_eq!(exported.len(), 1);
        assert!(exported[0].expires_at > exported[0].created_at);

        let (_dir2, dest) = backend().await;
        let restored = dest.import(exported);
        assert_eq!(restored, 1);
        assert_eq!(
            dest.memory().get("standards:rust:naming:r1"),
            Some("value".to_string())
        );
    }

    #[tokio::test]
    async fn get_by_technology_and_category_scans_disk_only() {
        let (_dir, backend) = backend().await;
        backend.set("standards:rust:naming:r1", "a".to_string(), None);
        backend.set("standards:rust:style:r2", "b".to_string(), None);
        backend.set("standards:python:naming:r3", "c".to_string(), None);
        backend.sync_to_disk().await.unwrap();

        let rust_only = backend
            .get_by_technology_and_category(Some("rust"), None)
            .await
            .unwrap();
        assert_eq!(rust_only.len(), 2);

        let rust_naming = backend
            .get_by_technology_and_category(Some("rust"), Some("naming"))
            .await
            .unwrap();
        assert_eq!(rust_naming.len(), 1);
        assert_eq!(rust_naming[0].0, "standards:rust:naming:r1");
    }
}
