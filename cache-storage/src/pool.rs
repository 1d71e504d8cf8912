//! Bounded connection pool over a single embedded-store handle.
//!
//! A semaphore bounds concurrent connections; a guard releases its permit
//! on drop.

use std::sync::Arc;
use std::time::Duration;

use libsql::Database;
use parking_lot::RwLock;
use tokio::sync::{Semaphore, SemaphorePermit};

use cache_core::error::{Error, Result};

/// Pool sizing and timeout configuration.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// How long `get()` waits for a free permit before failing `Busy`.
    pub acquire_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 8,
            acquire_timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct PoolStatistics {
    acquired_total: u64,
    timeouts_total: u64,
}

/// A bounded pool of connections over a shared [`Database`] handle.
pub struct ConnectionPool {
    db: Arc<Database>,
    config: PoolConfig,
    semaphore: Arc<Semaphore>,
    stats: Arc<RwLock<PoolStatistics>>,
}

impl ConnectionPool {
    /// Builds a pool over an already-open database handle.
    #[must_use]
    pub fn new(db: Arc<Database>, config: PoolConfig) -> Self {
        let semaphore = Arc::new(Semaphore::new(config.max_connections));
        Self {
            db,
            config,
            semaphore,
            stats: Arc::new(RwLock::new(PoolStatistics::default())),
        }
    }

    /// Acquires a connection, waiting up to `acquire_timeout` for a free
    /// slot.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Busy`] if no permit is available before the
    /// timeout, or [`Error::StorageUnavailable`] if opening the connection
    /// itself fails.
    pub async fn get(&self) -> Result<PooledConnection<'_>> {
        let permit = tokio::time::timeout(
            self.config.acquire_timeout,
            self.semaphore.acquire(),
        )
        .await
        .map_err(|_| Error::Busy)?
        .map_err(|_| Error::StorageUnavailable("pool semaphore closed".to_string()))?;

        let conn = self
            .db
            .connect()
            .map_err(|e| Error::StorageUnavailable(e.to_string()))?;

        self.stats.write().acquired_total += 1;
        Ok(PooledConnection {
            conn,
            _permit: permit,
        })
    }

    /// Blocks until every outstanding connection has been released, or
    /// `timeout` elapses.
    pub async fn shutdown(&self, timeout: Duration) {
        let deadline = tokio::time::Instant::now() + timeout;
        while self.semaphore.available_permits() < self.config.max_connections {
            if tokio::time::Instant::now() >= deadline {
                tracing::warn!("connection pool shutdown timed out with connections still out");
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }
}

/// A leased connection; releases its pool permit when dropped.
pub struct PooledConnection<'a> {
    conn: libsql::Connection,
    _permit: SemaphorePermit<'a>,
}

impl std::ops::Deref for PooledConnection<'_> {
    type Target = libsql::Connection;

    fn deref(&self) -> &Self::Target {
        &self.conn
    }
}
