//! Schema DDL for the persistent cache and analytics tables.
//!
//! Constants rather than a migration framework: each statement is
//! `CREATE TABLE IF NOT EXISTS`, so running them all on every
//! `initialize()` is idempotent.

/// The durable mirror of the memory cache, keyed identically.
pub const CREATE_STANDARDS_CACHE_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS standards_cache (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    key             TEXT NOT NULL UNIQUE,
    data            BLOB NOT NULL,
    ttl             INTEGER NOT NULL,
    created_at      INTEGER NOT NULL DEFAULT (strftime('%s','now')),
    last_accessed   INTEGER NOT NULL DEFAULT (strftime('%s','now')),
    access_count    INTEGER NOT NULL DEFAULT 0,
    expires_at      INTEGER NOT NULL,
    technology      TEXT,
    category        TEXT,
    standard_id     TEXT
)
"#;

/// Index supporting expiry sweeps.
pub const CREATE_STANDARDS_CACHE_EXPIRES_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_standards_cache_expires_at
    ON standards_cache (expires_at)
"#;

/// Index supporting `get_by_technology_and_category`.
pub const CREATE_STANDARDS_CACHE_FACETS_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_standards_cache_facets
    ON standards_cache (technology, category)
"#;

/// Append-only analytics event log.
pub const CREATE_USAGE_ANALYTICS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS usage_analytics (
    id              TEXT PRIMARY KEY,
    event_type      TEXT NOT NULL,
    timestamp       INTEGER NOT NULL,
    duration        INTEGER,
    metadata        TEXT NOT NULL DEFAULT '{}',
    user_id         TEXT,
    session_id      TEXT
)
"#;

/// Index supporting time-range and event-type queries.
pub const CREATE_USAGE_ANALYTICS_TIME_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_usage_analytics_time
    ON usage_analytics (event_type, timestamp)
"#;

/// All DDL statements, in dependency order, run once at `initialize()`.
pub const ALL_MIGRATIONS: &[&str] = &[
    CREATE_STANDARDS_CACHE_TABLE,
    CREATE_STANDARDS_CACHE_EXPIRES_INDEX,
    CREATE_STANDARDS_CACHE_FACETS_INDEX,
    CREATE_USAGE_ANALYTICS_TABLE,
    CREATE_USAGE_ANALYTICS_TIME_INDEX,
];
