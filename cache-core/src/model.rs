//! Domain types shared across the cache, search, and analytics components.

use serde::{Deserialize, Serialize};

/// Severity of a single coding-standard rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Must be fixed.
    Error,
    /// Should be fixed.
    Warning,
    /// Informational only.
    Info,
}

/// A single rule belonging to a [`Standard`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    /// Stable identifier, unique within its parent standard.
    pub id: String,
    /// Human-readable description of the rule.
    pub description: String,
    /// How strictly the rule is enforced.
    pub severity: Severity,
    /// Grouping category (e.g. "naming", "formatting").
    pub category: String,
    /// Optional illustrative code example.
    pub example: Option<String>,
}

/// A coding-standard document. Immutable once inserted; replacement is by
/// `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Standard {
    /// Stable identity.
    pub id: String,
    /// Title of the standard.
    pub title: String,
    /// Prose description.
    pub description: String,
    /// The technology this standard applies to, e.g. "typescript".
    pub technology: String,
    /// Grouping category, e.g. "naming".
    pub category: String,
    /// The rules making up this standard.
    pub rules: Vec<Rule>,
    /// Unix milliseconds of the last update to this standard.
    pub last_updated: i64,
}

/// A cached value with hit accounting and TTL bookkeeping.
///
/// Invariant: `expires_at > created_at`. `expires_at <= now` means the
/// entry is logically absent even though it may still occupy a slot until
/// the next `cleanup()`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry<T> {
    /// The cached payload.
    pub data: T,
    /// Monotonic milliseconds at creation.
    pub created_at: u64,
    /// Monotonic milliseconds at which this entry becomes logically absent.
    pub expires_at: u64,
    /// Number of successful `get` hits against this entry.
    pub hits: u64,
}

impl<T> CacheEntry<T> {
    /// Builds a new entry with `hits = 0`.
    pub fn new(data: T, created_at: u64, ttl_ms: u64) -> Self {
        Self {
            data,
            created_at,
            expires_at: created_at + ttl_ms,
            hits: 0,
        }
    }

    /// True when `now >= expires_at`.
    #[must_use]
    pub fn is_expired(&self, now: u64) -> bool {
        now >= self.expires_at
    }
}

/// Violation emitted by `validateCode` for a single rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Violation {
    /// The rule that was violated.
    pub rule_id: String,
    /// Human-readable explanation.
    pub message: String,
    /// Severity carried over from the rule definition.
    pub severity: Severity,
    /// Line number in the submitted source, if known.
    pub line: Option<u32>,
}

/// Result of a `validateCode` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResult {
    /// True when no `error`-severity violations were found.
    pub valid: bool,
    /// All violations found, of any severity.
    pub violations: Vec<Violation>,
    /// A 0-100 score derived from violation severities.
    pub score: f64,
    /// Wall-clock time the validation took, in milliseconds.
    pub response_time_ms: u64,
}

/// An append-only analytics event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsEvent {
    /// Unique id; duplicate insertion is a no-op.
    pub id: String,
    /// The kind of event, e.g. `"cache_hit"`, `"search"`.
    pub event_type: String,
    /// Unix milliseconds.
    pub timestamp: i64,
    /// Duration of the operation that produced this event, if measured.
    pub duration_ms: Option<u64>,
    /// Opaque structured metadata.
    pub metadata: serde_json::Value,
    /// The standard this event relates to, if any.
    pub standard_id: Option<String>,
}
