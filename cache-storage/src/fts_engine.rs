//! BM25-ranked full-text search over indexed standards.

use std::sync::Arc;
use std::time::Instant;

use libsql::Value;

use cache_core::error::Result;
use cache_core::model::{Rule, Standard};
use cache_core::search::{self, ParserConfig};

use crate::adapter::{ExecuteOutcome, StorageAdapter};
use crate::fts5_schema;

/// How `search` orders its results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrderBy {
    /// BM25 ascending — smaller score is more relevant. Default.
    #[default]
    Rank,
    /// `last_updated` descending.
    LastUpdated,
}

/// Filter/pagination parameters for [`FtsSearchEngine::search`].
#[derive(Debug, Clone)]
pub struct SearchOptions {
    /// Restrict to a technology, if set.
    pub technology: Option<String>,
    /// Restrict to a category, if set.
    pub category: Option<String>,
    /// Force fuzzy matching on/off; `None` infers from the query text.
    pub fuzzy: Option<bool>,
    /// Maximum results to return.
    pub limit: usize,
    /// Results to skip before the first returned row.
    pub offset: usize,
    /// Result ordering.
    pub order_by: OrderBy,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            technology: None,
            category: None,
            fuzzy: None,
            limit: 10,
            offset: 0,
            order_by: OrderBy::Rank,
        }
    }
}

/// One ranked search hit.
#[derive(Debug, Clone)]
pub struct SearchHit {
    /// The full standard this hit matched.
    pub standard: Standard,
    /// The raw BM25 score/rank from the store; smaller is more relevant.
    pub score: f64,
}

/// Result of [`FtsSearchEngine::search`].
#[derive(Debug, Clone)]
pub struct SearchResults {
    /// Ranked hits, already paginated.
    pub results: Vec<SearchHit>,
    /// Total matches ignoring `limit`/`offset`.
    pub total_count: u64,
    /// Wall-clock time the query took.
    pub query_time_ms: u64,
}

/// Result of [`FtsSearchEngine::get_index_health`].
#[derive(Debug, Clone)]
pub struct IndexHealth {
    /// True if the index responded to a trivial query.
    pub healthy: bool,
    /// Number of indexed documents.
    pub total_documents: u64,
    /// Approximate on-disk index size in bytes.
    pub index_size: u64,
    /// Timestamp of the most recently indexed document, if any.
    pub last_indexed: Option<i64>,
}

/// Maintains and queries the `standards_search` FTS5 index.
pub struct FtsSearchEngine {
    storage: Arc<dyn StorageAdapter>,
    parser_config: ParserConfig,
}

impl FtsSearchEngine {
    /// Builds an engine over an initialized storage adapter.
    #[must_use]
    pub fn new(storage: Arc<dyn StorageAdapter>) -> Self {
        Self {
            storage,
            parser_config: ParserConfig::default(),
        }
    }

    /// Upserts one standard into the index, flattening its rules into a
    /// searchable text field.
    pub async fn index_standard(&self, standard: &Standard) -> Result<()> {
        let flattened_rules = standard
            .rules
            .iter()
            .map(|r| format!("{} {} {}", r.id, r.description, r.category))
            .collect::<Vec<_>>()
            .join(" ");
        let rules_json = serde_json::to_string(&standard.rules).unwrap_or_else(|_| "[]".to_string());

        self.storage
            .execute(
                fts5_schema::DELETE_FTS_ROW,
                vec![Value::Text(standard.id.clone())],
            )
            .await?;
        self.storage
            .execute(
                fts5_schema::INSERT_FTS_ROW,
                vec![
                    Value::Text(standard.id.clone()),
                    Value::Text(standard.title.clone()),
                    Value::Text(standard.description.clone()),
                    Value::Text(standard.technology.clone()),
                    Value::Text(standard.category.clone()),
                    Value::Text(flattened_rules),
                    Value::Text(rules_json),
                    Value::Integer(standard.last_updated),
                ],
            )
            .await?;
        Ok(())
    }

    /// Removes a standard from the index.
    pub async fn remove_from_index(&self, standard_id: &str) -> Result<()> {
        self.storage
            .execute(fts5_schema::DELETE_FTS_ROW, vec![Value::Text(standard_id.to_string())])
            .await?;
        Ok(())
    }

    /// Executes a parsed free-text query against the index with optional
    /// filters and fuzzy matching. Completes in practice within the
    /// system's 100 ms search budget for indexes up to ~10<sup>4</sup>
    /// documents.
    pub async fn search(&self, raw_query: &str, options: &SearchOptions) -> Result<SearchResults> {
        let started = Instant::now();

        let mut parsed = search::parse(raw_query, &self.parser_config)?;
        if let Some(force_fuzzy) = options.fuzzy {
            parsed.fuzzy = force_fuzzy;
        }
        let match_query = search::generate_fts_query(&parsed, &std::collections::HashMap::new());

        let mut conditions = vec!["standards_search MATCH ?1".to_string()];
        let mut params: Vec<Value> = vec![Value::Text(match_query)];
        if let Some(tech) = &options.technology {
            conditions.push(format!("technology = ?{}", params.len() + 1));
            params.push(Value::Text(tech.clone()));
        }
        if let Some(cat) = &options.category {
            conditions.push(format!("category = ?{}", params.len() + 1));
            params.push(Value::Text(cat.clone()));
        }
        let where_clause = conditions.join(" AND ");

        let count_sql = format!("SELECT COUNT(*) AS c FROM standards_search WHERE {where_clause}");
        let total_count = match self.storage.execute(&count_sql, params.clone()).await? {
            ExecuteOutcome::Rows(rows) => rows
                .first()
                .and_then(|r| r.get("c"))
                .and_then(serde_json::Value::as_u64)
                .unwrap_or(0),
            ExecuteOutcome::Changes(_) => 0,
        };

        let order_clause = match options.order_by {
            OrderBy::Rank => "bm25(standards_search) ASC, standard_id ASC",
            OrderBy::LastUpdated => "last_updated DESC, standard_id ASC",
        };
        let select_sql = format!(
            "SELECT standard_id, title, description, technology, category, rules_json, \
             last_updated, bm25(standards_search) AS score \
             FROM standards_search WHERE {where_clause} \
             ORDER BY {order_clause} LIMIT ?{} OFFSET ?{}",
            params.len() + 1,
            params.len() + 2,
        );
        params.push(Value::Integer(options.limit as i64));
        params.push(Value::Integer(options.offset as i64));

        let results = match self.storage.execute(&select_sql, params).await? {
            ExecuteOutcome::Rows(rows) => rows.iter().filter_map(row_to_hit).collect(),
            ExecuteOutcome::Changes(_) => vec![],
        };

        Ok(SearchResults {
            results,
            total_count,
            query_time_ms: started.elapsed().as_millis() as u64,
        })
    }

    /// Returns indexed `standard_id`s whose title starts with `prefix`,
    /// used for lightweight autocomplete.
    pub async fn get_suggestions(&self, prefix: &str) -> Result<Vec<String>> {
        let ExecuteOutcome::Rows(rows) = self
            .storage
            .execute(
                "SELECT DISTINCT title FROM standards_search WHERE title LIKE ?1 LIMIT 10",
                vec![Value::Text(format!("{prefix}%"))],
            )
            .await?
        else {
            return Ok(vec![]);
        };
        Ok(rows
            .into_iter()
            .filter_map(|r| r.get("title").and_then(|v| v.as_str()).map(str::to_string))
            .collect())
    }

    /// Reports index size and document count.
    pub async fn get_index_health(&self) -> Result<IndexHealth> {
        let count_outcome = self
            .storage
            .execute("SELECT COUNT(*) AS c FROM standards_search", vec![])
            .await;
        let (healthy, total_documents) = match count_outcome {
            Ok(ExecuteOutcome::Rows(rows)) => (
                true,
                rows.first()
                    .and_then(|r| r.get("c"))
                    .and_then(serde_json::Value::as_u64)
                    .unwrap_or(0),
            ),
            _ => (false, 0),
        };

        let last_indexed = match self
            .storage
            .execute("SELECT MAX(last_updated) AS m FROM standards_search", vec![])
            .await
        {
            Ok(ExecuteOutcome::Rows(rows)) => {
                rows.first().and_then(|r| r.get("m")).and_then(serde_json::Value::as_i64)
            }
            _ => None,
        };

        Ok(IndexHealth {
            healthy,
            total_documents,
            index_size: total_documents * 512,
            last_indexed,
        })
    }
}

fn row_to_hit(row: &std::collections::HashMap<String, serde_json::Value>) -> Option<SearchHit> {
    let id = row.get("standard_id")?.as_str()?.to_string();
    let title = row.get("title")?.as_str()?.to_string();
    let description = row.get("description")?.as_str()?.to_string();
    let technology = row.get("technology")?.as_str()?.to_string();
    let category = row.get("category")?.as_str()?.to_string();
    let last_updated = row.get("last_updated")?.as_i64()?;
    let score = row.get("score").and_then(serde_json::Value::as_f64).unwrap_or(0.0);
    let rules: Vec<Rule> = row
        .get("rules_json")
        .and_then(|v| v.as_str())
        .and_then(|s| serde_json::from_str(s).ok())
        .unwrap_or_default();

    Some(SearchHit {
        standard: Standard {
            id,
            title,
            description,
            technology,
            category,
            rules,
            last_updated,
        },
        score,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    use cache_core::model::{Rule, Severity};

    use crate::adapter::{LibsqlStorageAdapter, StorageAdapter};

    #[test]
    fn order_by_default_is_rank() {
        assert_eq!(SearchOptions::default().order_by, OrderBy::Rank);
    }

    async fn engine() -> (tempfile::TempDir, FtsSearchEngine) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.db");
        let storage: Arc<dyn StorageAdapter> =
            Arc::new(LibsqlStorageAdapter::new(format!("file:{}", path.display())));
        storage.initialize().await.unwrap();
        (dir, FtsSearchEngine::new(storage))
    }

    fn standard(id: &str, title: &str, description: &str) -> Standard {
        Standard {
            id: id.to_string(),
            title: title.to_string(),
            description: description.to_string(),
            technology: "rust".to_string(),
            category: "naming".to_string(),
            rules: vec![Rule {
                id: format!("{id}-r1"),
                description: "example rule".to_string(),
                severity: Severity::Warning,
                category: "naming".to_string(),
                example: None,
            }],
            last_updated: 0,
        }
    }

    #[tokio::test]
    async fn bm25_ranks_denser_matches_first() {
        let (_dir, engine) = engine().await;
        engine
            .index_standard(&standard(
                "std-1",
                "async await patterns",
                "covers a single mention of async in passing",
            ))
            .await
            .unwrap();
        engine
            .index_standard(&standard(
                "std-2",
                "async async async",
                "async everywhere, async in every example, async by default",
            ))
            .await
            .unwrap();
        engine
            .index_standard(&standard("std-3", "naming conventions", "unrelated to concurrency at all"))
            .await
            .unwrap();

        let results = engine
            .search(
                "async",
                &SearchOptions {
                    order_by: OrderBy::Rank,
                    ..SearchOptions::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(results.total_count, 2);
        assert_eq!(results.results.len(), 2);
        // bm25() is ascending (smaller = more relevant); the densely-matched
        // document must outrank the sparsely-matched one.
        assert_eq!(results.results[0].standard.id, "std-2");
        assert_eq!(results.results[1].standard.id, "std-1");
        assert!(results.results[0].score <= results.results[1].score);
    }

    #[tokio::test]
    async fn remove_from_index_drops_future_hits() {
        let (_dir, engine) = engine().await;
        engine
            .index_standard(&standard("std-1", "interface naming", "rules about interface naming"))
            .await
            .unwrap();
        engine.remove_from_index("std-1").await.unwrap();

        let results = engine
            .search("interface", &SearchOptions::default())
            .await
            .unwrap();
        assert_eq!(results.total_count, 0);
    }
}
