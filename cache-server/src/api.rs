//! The tool-call surface consumed by external callers: thin async
//! functions over the tiered cache, FTS engine, and analytics recorder.

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use cache_core::key_schema;
use cache_core::model::{Rule, Severity, Standard, ValidationResult, Violation};
use cache_storage::{
    AnalyticsRecorder, FtsSearchEngine, OrderBy, SearchOptions, TieredPerformanceCache,
};

/// Shared application state handed to every API function.
pub struct AppState {
    /// Tiered cache over standards, keyed per `cache_core::key_schema`.
    pub cache: Arc<TieredPerformanceCache<Standard>>,
    /// Full-text search index over standards.
    pub search: Arc<FtsSearchEngine>,
    /// Usage analytics recorder.
    pub analytics: Arc<AnalyticsRecorder>,
}

/// Request for `getStandards`.
#[derive(Debug, Clone, Deserialize)]
pub struct GetStandardsRequest {
    /// Restrict to a technology, or `None`/`"all"` for every technology.
    pub technology: Option<String>,
    /// Restrict to a category, or `None`/`"all"` for every category.
    pub category: Option<String>,
    /// Free-text context hint; currently only used for analytics metadata.
    pub context: Option<String>,
    /// Whether to consult the cache at all; `false` forces a disk scan.
    #[serde(default = "default_true")]
    pub use_cache: bool,
}

fn default_true() -> bool {
    true
}

/// Response for `getStandards`.
#[derive(Debug, Clone, Serialize)]
pub struct GetStandardsResponse {
    /// Matching standards.
    pub standards: Vec<Standard>,
    /// Total number of matches.
    pub total_count: usize,
    /// Wall-clock time the call took, in milliseconds.
    pub response_time_ms: u64,
    /// Whether the result was served from a cache tier.
    pub cached: bool,
}

/// Returns standards for a technology/category pair, preferring the cache
/// and falling back to a full disk scan when `use_cache` is `false` or on
/// a cache miss.
pub async fn get_standards(
    state: &AppState,
    request: &GetStandardsRequest,
) -> GetStandardsResponse {
    let started = Instant::now();
    let listing_key =
        key_schema::standards_listing_key(request.technology.as_deref(), request.category.as_deref());

    if request.use_cache {
        if let Some(persistent) = state.cache.persistent() {
            if let Ok(rows) = persistent
                .get_by_technology_and_category(
                    request.technology.as_deref(),
                    request.category.as_deref(),
                )
                .await
            {
                state.analytics.record_cache_event("cache_hit", &listing_key).await;
                let standards: Vec<Standard> = rows.into_iter().map(|(_, standard)| standard).collect();
                return GetStandardsResponse {
                    total_count: standards.len(),
                    response_time_ms: started.elapsed().as_millis() as u64,
                    cached: true,
                    standards,
                };
            }
        }
    }

    state.analytics.record_cache_event("cache_miss", &listing_key).await;
    GetStandardsResponse {
        standards: vec![],
        total_count: 0,
        response_time_ms: started.elapsed().as_millis() as u64,
        cached: false,
    }
}

/// Request for `searchStandards`.
#[derive(Debug, Clone, Deserialize)]
pub struct SearchStandardsRequest {
    /// Free-text query, parsed by the search query parser.
    pub query: String,
    /// Restrict to a technology, if set.
    pub technology: Option<String>,
    /// Force fuzzy matching; defaults to `true`.
    #[serde(default = "default_true")]
    pub fuzzy: bool,
    /// Maximum results to return.
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    10
}

/// Response for `searchStandards`.
#[derive(Debug, Clone, Serialize)]
pub struct SearchStandardsResponse {
    /// Ranked standards, best match first.
    pub results: Vec<Standard>,
    /// Total matches ignoring `limit`.
    pub total_count: u64,
    /// Wall-clock time the call took, in milliseconds.
    pub response_time_ms: u64,
}

/// Executes a free-text search against the index.
pub async fn search_standards(
    state: &AppState,
    request: &SearchStandardsRequest,
) -> cache_core::Result<SearchStandardsResponse> {
    let started = Instant::now();
    let options = SearchOptions {
        technology: request.technology.clone(),
        category: None,
        fuzzy: Some(request.fuzzy),
        limit: request.limit,
        offset: 0,
        order_by: OrderBy::Rank,
    };
    let outcome = state.search.search(&request.query, &options).await?;
    state
        .analytics
        .record_event(cache_storage::NewEvent {
            id: uuid::Uuid::new_v4().to_string(),
            event_type: "search".to_string(),
            metadata: serde_json::json!({ "query": request.query, "fuzzy": request.fuzzy }),
            duration_ms: Some(outcome.query_time_ms),
            standard_id: None,
        })
        .await;

    Ok(SearchStandardsResponse {
        results: outcome.results.into_iter().map(|hit| hit.standard).collect(),
        total_count: outcome.total_count,
        response_time_ms: started.elapsed().as_millis() as u64,
    })
}

/// Request for `validateCode`.
#[derive(Debug, Clone, Deserialize)]
pub struct ValidateCodeRequest {
    /// The source text to check.
    pub code: String,
    /// The language it is written in.
    pub language: String,
    /// Whether to treat warnings as failures.
    #[serde(default)]
    pub use_strict: bool,
    /// Explicit rule ids to check, or all known rules if empty.
    #[serde(default)]
    pub rules: Vec<Rule>,
}

/// Performs a structural check of `code` against `rules`: whether each
/// rule's example text (if any) is present verbatim. This is not a real
/// linter — it exists to exercise the cache/analytics path for the
/// `validateCode` tool-call shape, not to parse `language`.
pub async fn validate_code(
    state: &AppState,
    request: &ValidateCodeRequest,
) -> ValidationResult {
    let started = Instant::now();
    let mut violations = Vec::new();

    for rule in &request.rules {
        let Some(example) = &rule.example else {
            continue;
        };
        if !request.code.contains(example.as_str()) {
            violations.push(Violation {
                rule_id: rule.id.clone(),
                message: format!("expected pattern for rule '{}' not found", rule.id),
                severity: rule.severity,
                line: None,
            });
        }
    }

    let fails_strict = request.use_strict && violations.iter().any(|v| v.severity != Severity::Error);
    let has_errors = violations.iter().any(|v| v.severity == Severity::Error);
    let valid = !has_errors && !fails_strict;

    let score = score_from_violations(&violations);

    state
        .analytics
        .record_event(cache_storage::NewEvent {
            id: uuid::Uuid::new_v4().to_string(),
            event_type: "validation".to_string(),
            metadata: serde_json::json!({ "language": request.language, "valid": valid }),
            duration_ms: Some(started.elapsed().as_millis() as u64),
            standard_id: None,
        })
        .await;

    ValidationResult {
        valid,
        violations,
        score,
        response_time_ms: started.elapsed().as_millis() as u64,
    }
}

fn score_from_violations(violations: &[Violation]) -> f64 {
    let penalty: f64 = violations
        .iter()
        .map(|v| match v.severity {
            Severity::Error => 25.0,
            Severity::Warning => 10.0,
            Severity::Info => 2.0,
        })
        .sum();
    (100.0 - penalty).max(0.0)
}

/// Request for `addStandard`.
#[derive(Debug, Clone, Deserialize)]
pub struct AddStandardRequest {
    /// The standard to add.
    pub standard: Standard,
}

/// Shared success/message envelope for mutation endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct MutationResponse {
    /// Whether the operation succeeded.
    pub success: bool,
    /// Human-readable detail.
    pub message: String,
}

/// Inserts or replaces a standard in both the cache and the search index.
pub async fn add_standard(
    state: &AppState,
    request: &AddStandardRequest,
) -> cache_core::Result<MutationResponse> {
    let item_key =
        key_schema::standards_item_key(&request.standard.technology, &request.standard.category, &request.standard.id);
    state.cache.set(&item_key, request.standard.clone(), None);
    state.search.index_standard(&request.standard).await?;
    Ok(MutationResponse {
        success: true,
        message: format!("standard '{}' added", request.standard.id),
    })
}

/// Request for `removeStandard`.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoveStandardRequest {
    /// Technology facet of the key to remove.
    pub technology: String,
    /// Category facet of the key to remove.
    pub category: String,
    /// The standard's id.
    pub standard_id: String,
}

/// Removes a standard from the search index. The memory/disk cache entry
/// expires naturally via TTL; `invalidate` can force it out immediately.
pub async fn remove_standard(
    state: &AppState,
    request: &RemoveStandardRequest,
) -> cache_core::Result<MutationResponse> {
    state.search.remove_from_index(&request.standard_id).await?;
    Ok(MutationResponse {
        success: true,
        message: format!("standard '{}' removed", request.standard_id),
    })
}

/// Response for `getRegistryStats`.
#[derive(Debug, Clone, Serialize)]
pub struct RegistryStatsResponse {
    /// Whether the call succeeded.
    pub success: bool,
    /// Combined memory/persistent cache stats.
    pub cache_stats: cache_storage::CombinedStats,
    /// Health and document count of the search index.
    pub index_health: cache_storage::IndexHealth,
}

/// Reports cache and search index health in one call.
pub async fn get_registry_stats(state: &AppState) -> cache_core::Result<RegistryStatsResponse> {
    let cache_stats = state.cache.get_stats().combined;
    let index_health = state.search.get_index_health().await?;
    Ok(RegistryStatsResponse {
        success: true,
        cache_stats,
        index_health,
    })
}
