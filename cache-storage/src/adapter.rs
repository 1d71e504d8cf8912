//! The sole gateway to the embedded relational store: pragma setup,
//! migrations, pooled connections, and retry-with-backoff for recoverable
//! errors.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use libsql::{Builder, Database, Value};

use cache_core::error::{Error, Result};

use crate::pool::{ConnectionPool, PoolConfig};
use crate::{fts5_schema, schema};

/// The outcome of a single `execute` call: either the rows a `SELECT`
/// produced, or the number of rows a write statement changed.
#[derive(Debug, Clone)]
pub enum ExecuteOutcome {
    /// Rows from a read statement, each a column-name to value map.
    Rows(Vec<HashMap<String, serde_json::Value>>),
    /// Number of rows affected by a write statement.
    Changes(u64),
}

/// Result of `check_health()`.
#[derive(Debug, Clone, Copy)]
pub struct HealthStatus {
    /// True if the store is reachable and both checks below pass.
    pub healthy: bool,
    /// True if `PRAGMA integrity_check` reported `ok`.
    pub integrity_check: bool,
    /// True if `PRAGMA foreign_key_check` reported no violations.
    pub foreign_key_check: bool,
}

/// Exponential backoff policy applied to retryable storage errors.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Initial delay before the first retry.
    pub base_delay: Duration,
    /// Upper bound the delay is capped at.
    pub max_delay: Duration,
    /// Maximum number of attempts, including the first.
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            max_attempts: 5,
        }
    }
}

/// Abstracts the embedded relational store behind a narrow,
/// transaction-aware interface. The concrete store engine is an
/// implementation detail the rest of the system never sees directly.
#[async_trait]
pub trait StorageAdapter: Send + Sync {
    /// Runs one parameterised statement, returning rows for reads or a
    /// change count for writes.
    async fn execute(&self, sql: &str, params: Vec<Value>) -> Result<ExecuteOutcome>;

    /// Atomically runs a batch of statements against one connection. On
    /// any failure every statement in the batch is rolled back and the
    /// error propagates; transactions do not nest.
    async fn transaction(&self, ops: Vec<(String, Vec<Value>)>) -> Result<Vec<ExecuteOutcome>>;

    /// Opens the store, enables WAL journaling, foreign keys, and a
    /// busy-wait timeout, and runs idempotent schema migrations. Returns
    /// only once the store reports healthy.
    async fn initialize(&self) -> Result<()>;

    /// Flushes, checkpoints, and releases the handle. Safe to call twice.
    async fn close(&self) -> Result<()>;

    /// Runs integrity and foreign-key checks against the store.
    async fn check_health(&self) -> Result<HealthStatus>;
}

/// The production [`StorageAdapter`], backed by an embedded, WAL-mode
/// relational store reached through a bounded connection pool.
pub struct LibsqlStorageAdapter {
    url: String,
    db: tokio::sync::OnceCell<Arc<Database>>,
    pool: tokio::sync::OnceCell<ConnectionPool>,
    retry: RetryPolicy,
    closed: AtomicBool,
}

impl LibsqlStorageAdapter {
    /// Builds an adapter over `url` (a `file:` path or `:memory:`).
    /// `initialize()` must be called before use.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            db: tokio::sync::OnceCell::new(),
            pool: tokio::sync::OnceCell::new(),
            retry: RetryPolicy::default(),
            closed: AtomicBool::new(false),
        }
    }

    fn pool(&self) -> Result<&ConnectionPool> {
        self.pool
            .get()
            .ok_or_else(|| Error::StorageUnavailable("adapter not initialized".to_string()))
    }

    async fn execute_pragmas(conn: &libsql::Connection) -> Result<()> {
        for pragma in [
            "PRAGMA journal_mode=WAL",
            "PRAGMA foreign_keys=ON",
            "PRAGMA busy_timeout=5000",
            "PRAGMA cache_size=-20000",
        ] {
            let mut rows = conn
                .query(pragma, ())
                .await
                .map_err(|e| Error::StorageUnavailable(e.to_string()))?;
            while rows
                .next()
                .await
                .map_err(|e| Error::StorageUnavailable(e.to_string()))?
                .is_some()
            {}
        }
        Ok(())
    }

    async fn run_migrations(conn: &libsql::Connection) -> Result<()> {
        for stmt in schema::ALL_MIGRATIONS {
            conn.execute(stmt, ())
                .await
                .map_err(|e| Error::Integrity(e.to_string()))?;
        }
        conn.execute(fts5_schema::CREATE_FTS5_SCHEMA, ())
            .await
            .map_err(|e| Error::Integrity(e.to_string()))?;
        Ok(())
    }

    async fn exec_one(
        conn: &libsql::Connection,
        sql: &str,
        params: Vec<Value>,
    ) -> Result<ExecuteOutcome> {
        let trimmed = sql.trim_start().to_ascii_uppercase();
        if trimmed.starts_with("SELECT") || trimmed.starts_with("PRAGMA") {
            let mut rows_cursor = conn
                .query(sql, params)
                .await
                .map_err(classify_libsql_error)?;
            let mut out = Vec::new();
            while let Some(row) = rows_cursor.next().await.map_err(classify_libsql_error)? {
                out.push(row_to_map(&row));
            }
            Ok(ExecuteOutcome::Rows(out))
        } else {
            let changes = conn.execute(sql, params).await.map_err(classify_libsql_error)?;
            Ok(ExecuteOutcome::Changes(changes))
        }
    }

    async fn with_retry<F, Fut, T>(&self, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let mut delay = self.retry.base_delay;
        let mut attempt = 0;
        loop {
            attempt += 1;
            match op().await {
                Ok(v) => return Ok(v),
                Err(e) if e.is_recoverable() && attempt < self.retry.max_attempts => {
                    tracing::warn!(attempt, ?delay, "storage op failed, retrying: {e}");
                    tokio::time::sleep(delay).await;
                    delay = (delay * 2).min(self.retry.max_delay);
                }
                Err(e) => return Err(e),
            }
        }
    }
}

fn row_to_map(row: &libsql::Row) -> HashMap<String, serde_json::Value> {
    let mut map = HashMap::new();
    let count = row.column_count();
    for i in 0..count {
        let name = row.column_name(i).unwrap_or_default().to_string();
        let value = row.get_value(i).unwrap_or(Value::Null);
        map.insert(name, libsql_value_to_json(&value));
    }
    map
}

fn libsql_value_to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Integer(i) => serde_json::Value::from(*i),
        Value::Real(f) => serde_json::Number::from_f64(*f).map_or(serde_json::Value::Null, serde_json::Value::Number),
        Value::Text(s) => serde_json::Value::String(s.clone()),
        Value::Blob(b) => serde_json::Value::String(String::from_utf8_lossy(b).to_string()),
    }
}

fn classify_libsql_error(e: libsql::Error) -> Error {
    let msg = e.to_string();
    if msg.to_lowercase().contains("busy") || msg.to_lowercase().contains("locked") {
        Error::Busy
    } else if msg.to_lowercase().contains("constraint") {
        Error::Integrity(msg)
    } else {
        Error::StorageUnavailable(msg)
    }
}

#[async_trait]
impl StorageAdapter for LibsqlStorageAdapter {
    async fn execute(&self, sql: &str, params: Vec<Value>) -> Result<ExecuteOutcome> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::StorageUnavailable("adapter closed".to_string()));
        }
        let pool = self.pool()?;
        self.with_retry(|| {
            let sql = sql.to_string();
            let params = params.clone();
            async move {
                let conn = pool.get().await?;
                Self::exec_one(&conn, &sql, params).await
            }
        })
        .await
    }

    async fn transaction(&self, ops: Vec<(String, Vec<Value>)>) -> Result<Vec<ExecuteOutcome>> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::StorageUnavailable("adapter closed".to_string()));
        }
        let pool = self.pool()?;
        let conn = pool.get().await?;
        conn.execute("BEGIN IMMEDIATE", ())
            .await
            .map_err(classify_libsql_error)?;

        let mut outcomes = Vec::with_capacity(ops.len());
        for (sql, params) in ops {
            match Self::exec_one(&conn, &sql, params).await {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => {
                    let _ = conn.execute("ROLLBACK", ()).await;
                    return Err(e);
                }
            }
        }
        conn.execute("COMMIT", ()).await.map_err(classify_libsql_error)?;
        Ok(outcomes)
    }

    async fn initialize(&self) -> Result<()> {
        let db = Builder::new_local(&self.url)
            .build()
            .await
            .map_err(|e| Error::Configuration(e.to_string()))?;
        let db = Arc::new(db);

        let conn = db
            .connect()
            .map_err(|e| Error::StorageUnavailable(e.to_string()))?;
        Self::execute_pragmas(&conn).await?;
        Self::run_migrations(&conn).await?;

        self.db
            .set(Arc::clone(&db))
            .map_err(|_| Error::Configuration("adapter already initialized".to_string()))?;
        self.pool
            .set(ConnectionPool::new(db, PoolConfig::default()))
            .map_err(|_| Error::Configuration("adapter already initialized".to_string()))?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        if let Some(pool) = self.pool.get() {
            pool.shutdown(Duration::from_secs(5)).await;
        }
        Ok(())
    }

    async fn check_health(&self) -> Result<HealthStatus> {
        let pool = self.pool()?;
        let conn = pool.get().await?;

        let integrity_ok = match Self::exec_one(&conn, "PRAGMA integrity_check", vec![]).await? {
            ExecuteOutcome::Rows(rows) => rows
                .first()
                .and_then(|r| r.values().next())
                .is_some_and(|v| v == "ok"),
            ExecuteOutcome::Changes(_) => false,
        };
        let fk_ok = matches!(
            Self::exec_one(&conn, "PRAGMA foreign_key_check", vec![]).await?,
            ExecuteOutcome::Rows(rows) if rows.is_empty()
        );

        Ok(HealthStatus {
            healthy: integrity_ok && fk_ok,
            integrity_check: integrity_ok,
            foreign_key_check: fk_ok,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn initialize_then_close_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.db");
        let adapter = LibsqlStorageAdapter::new(format!("file:{}", path.display()));
        adapter.initialize().await.unwrap();
        adapter.close().await.unwrap();
        adapter.close().await.unwrap();
    }

    #[tokio::test]
    async fn execute_runs_migrated_schema() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.db");
        let adapter = LibsqlStorageAdapter::new(format!("file:{}", path.display()));
        adapter.initialize().await.unwrap();
        let outcome = adapter
            .execute(
                "INSERT INTO standards_cache (key, data, ttl, expires_at) VALUES (?1, ?2, ?3, ?4)",
                vec![
                    Value::Text("standards:rust:naming".into()),
                    Value::Blob(b"{}".to_vec()),
                    Value::Integer(1000),
                    Value::Integer(9_999_999_999),
                ],
            )
            .await
            .unwrap();
        assert!(matches!(outcome, ExecuteOutcome::Changes(1)));
    }
}
