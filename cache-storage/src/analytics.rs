//! Append-only analytics event log.

use std::collections::HashMap;

use libsql::Value;

use cache_core::error::Result;
use cache_core::key_schema;
use cache_core::model::AnalyticsEvent;

use crate::adapter::{ExecuteOutcome, StorageAdapter};
use std::sync::Arc;

/// A new event to be recorded.
#[derive(Debug, Clone)]
pub struct NewEvent {
    /// Caller-supplied id; a duplicate is silently ignored.
    pub id: String,
    /// Event kind, e.g. `"cache_hit"`, `"search"`, `"validation"`.
    pub event_type: String,
    /// Opaque structured metadata.
    pub metadata: serde_json::Value,
    /// Duration of the operation, if measured.
    pub duration_ms: Option<u64>,
    /// The standard this event relates to, if any.
    pub standard_id: Option<String>,
}

/// Filter/pagination parameters for [`AnalyticsRecorder::get_events`].
#[derive(Debug, Clone, Default)]
pub struct EventQuery {
    /// Maximum rows to return.
    pub limit: u32,
    /// Rows to skip before the first returned row.
    pub offset: u32,
    /// Inclusive lower bound on `timestamp`, if any.
    pub from: Option<i64>,
    /// Inclusive upper bound on `timestamp`, if any.
    pub to: Option<i64>,
    /// Filter to a single event type, if any.
    pub event_type: Option<String>,
}

/// Result of [`AnalyticsRecorder::get_summary`].
#[derive(Debug, Clone)]
pub struct Summary {
    /// Total events matching the time range.
    pub total_events: u64,
    /// Event count grouped by the requested dimension.
    pub counts_per_group: HashMap<String, u64>,
}

/// One bucket of [`AnalyticsRecorder::get_usage_patterns`].
#[derive(Debug, Clone)]
pub struct UsageBucket {
    /// Start of the bucket, milliseconds since epoch.
    pub bucket_start: i64,
    /// Count per event type within this bucket.
    pub counts: HashMap<String, u64>,
}

/// Append-only recorder over `usage_analytics`.
pub struct AnalyticsRecorder {
    storage: Arc<dyn StorageAdapter>,
}

impl AnalyticsRecorder {
    /// Builds a recorder over the given storage adapter.
    #[must_use]
    pub const fn new(storage: Arc<dyn StorageAdapter>) -> Self {
        Self { storage }
    }

    /// Records one event. Best-effort: failures are logged at `debug` and
    /// never propagate to the caller, per the analytics failure policy.
    pub async fn record_event(&self, event: NewEvent) {
        if let Err(e) = self.try_record_event(event).await {
            tracing::debug!(error = %e, "analytics event dropped");
        }
    }

    /// Convenience wrapper used by the cache tiers to record a
    /// `cache_hit`/`cache_miss` with facets derived from the key.
    pub async fn record_cache_event(&self, event_type: &str, key: &str) {
        let metadata = serde_json::json!({
            "key": key,
            "technology": key_schema::extract_technology(key),
            "category": key_schema::extract_category(key),
            "standard_id": key_schema::extract_standard_id(key),
        });
        self.record_event(NewEvent {
            id: new_event_id(),
            event_type: event_type.to_string(),
            metadata,
            duration_ms: None,
            standard_id: key_schema::extract_standard_id(key),
        })
        .await;
    }

    async fn try_record_event(&self, event: NewEvent) -> Result<()> {
        let metadata = serde_json::to_string(&event.metadata).unwrap_or_else(|_| "{}".to_string());
        self.storage
            .execute(
                "INSERT OR IGNORE INTO usage_analytics \
                 (id, event_type, timestamp, duration, metadata) VALUES (?1, ?2, ?3, ?4, ?5)",
                vec![
                    Value::Text(event.id),
                    Value::Text(event.event_type),
                    Value::Integer(now_ms()),
                    event
                        .duration_ms
                        .map_or(Value::Null, |d| Value::Integer(d as i64)),
                    Value::Text(metadata),
                ],
            )
            .await?;
        Ok(())
    }

    /// Returns events matching `query` and the total count ignoring
    /// pagination.
    pub async fn get_events(&self, query: &EventQuery) -> Result<(Vec<AnalyticsEvent>, u64)> {
        let mut conditions = Vec::new();
        let mut params: Vec<Value> = Vec::new();
        if let Some(from) = query.from {
            conditions.push("timestamp >= ?".to_string());
            params.push(Value::Integer(from));
        }
        if let Some(to) = query.to {
            conditions.push("timestamp <= ?".to_string());
            params.push(Value::Integer(to));
        }
        if let Some(event_type) = &query.event_type {
            conditions.push("event_type = ?".to_string());
            params.push(Value::Text(event_type.clone()));
        }
        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        let count_sql = format!("SELECT COUNT(*) AS c FROM usage_analytics {where_clause}");
        let total = match self.storage.execute(&count_sql, params.clone()).await? {
            ExecuteOutcome::Rows(rows) => rows
                .first()
                .and_then(|r| r.get("c"))
                .and_then(serde_json::Value::as_u64)
                .unwrap_or(0),
            ExecuteOutcome::Changes(_) => 0,
        };

        let mut select_params = params;
        select_params.push(Value::Integer(i64::from(query.limit)));
        select_params.push(Value::Integer(i64::from(query.offset)));
        let select_sql = format!(
            "SELECT id, event_type, timestamp, duration, metadata \
             FROM usage_analytics {where_clause} ORDER BY timestamp DESC LIMIT ? OFFSET ?"
        );

        let ExecuteOutcome::Rows(rows) = self.storage.execute(&select_sql, select_params).await?
        else {
            return Ok((vec![], total));
        };

        let events = rows
            .into_iter()
            .filter_map(|row| row_to_event(&row))
            .collect();
        Ok((events, total))
    }

    /// Aggregates event counts over `time_range`, grouped by `group_by`.
    ///
    /// # Errors
    ///
    /// Returns [`cache_core::Error::InvalidFilter`] if `group_by` is not
    /// `"event_type"` — the only dimension `usage_analytics` indexes.
    pub async fn get_summary(&self, time_range: (i64, i64), group_by: &str) -> Result<Summary> {
        if group_by != "event_type" {
            return Err(cache_core::Error::InvalidFilter(format!(
                "unsupported group_by dimension '{group_by}', only 'event_type' is supported"
            )));
        }
        let sql = "SELECT event_type AS grp, COUNT(*) AS c FROM usage_analytics \
             WHERE timestamp >= ?1 AND timestamp <= ?2 GROUP BY event_type";
        let ExecuteOutcome::Rows(rows) = self
            .storage
            .execute(sql, vec![Value::Integer(time_range.0), Value::Integer(time_range.1)])
            .await?
        else {
            return Ok(Summary {
                total_events: 0,
                counts_per_group: HashMap::new(),
            });
        };

        let mut counts_per_group = HashMap::new();
        let mut total_events = 0u64;
        for row in rows {
            let grp = row.get("grp").and_then(|v| v.as_str()).unwrap_or("unknown").to_string();
            let c = row.get("c").and_then(serde_json::Value::as_u64).unwrap_or(0);
            total_events += c;
            counts_per_group.insert(grp, c);
        }
        Ok(Summary {
            total_events,
            counts_per_group,
        })
    }

    /// Time-bucketed counts per event type over `time_range`, bucketed at
    /// `granularity_ms`.
    pub async fn get_usage_patterns(
        &self,
        time_range: (i64, i64),
        granularity_ms: i64,
    ) -> Result<Vec<UsageBucket>> {
        let granularity_ms = granularity_ms.max(1);
        let ExecuteOutcome::Rows(rows) = self
            .storage
            .execute(
                "SELECT event_type, timestamp FROM usage_analytics \
                 WHERE timestamp >= ?1 AND timestamp <= ?2 ORDER BY timestamp ASC",
                vec![Value::Integer(time_range.0), Value::Integer(time_range.1)],
            )
            .await?
        else {
            return Ok(vec![]);
        };

        let mut buckets: HashMap<i64, HashMap<String, u64>> = HashMap::new();
        for row in rows {
            let Some(ts) = row.get("timestamp").and_then(serde_json::Value::as_i64) else {
                continue;
            };
            let Some(event_type) = row.get("event_type").and_then(|v| v.as_str()) else {
                continue;
            };
            let bucket_start = (ts / granularity_ms) * granularity_ms;
            *buckets
                .entry(bucket_start)
                .or_default()
                .entry(event_type.to_string())
                .or_insert(0) += 1;
        }

        let mut out: Vec<UsageBucket> = buckets
            .into_iter()
            .map(|(bucket_start, counts)| UsageBucket { bucket_start, counts })
            .collect();
        out.sort_by_key(|b| b.bucket_start);
        Ok(out)
    }
}

fn row_to_event(row: &HashMap<String, serde_json::Value>) -> Option<AnalyticsEvent> {
    let id = row.get("id")?.as_str()?.to_string();
    let event_type = row.get("event_type")?.as_str()?.to_string();
    let timestamp = row.get("timestamp")?.as_i64()?;
    let duration_ms = row.get("duration").and_then(serde_json::Value::as_u64);
    let metadata_str = row.get("metadata")?.as_str()?.to_string();
    let metadata = serde_json::from_str(&metadata_str).unwrap_or(serde_json::Value::Null);
    let standard_id = metadata
        .get("standard_id")
        .and_then(|v| v.as_str())
        .map(str::to_string);
    Some(AnalyticsEvent {
        id,
        event_type,
        timestamp,
        duration_ms,
        metadata,
        standard_id,
    })
}

fn new_event_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
