//! FTS5 virtual table backing the search engine.
//!
//! Standards are immutable once inserted, so this table is the sole store
//! of record for search: `index_standard`/`remove_from_index` maintain it
//! directly via delete-then-insert upserts, since FTS5 has no native
//! upsert.

/// The `standards_search` virtual table tokenised on `(title, description,
/// technology, category, rules)`. `standard_id`, `last_updated`, and
/// `rules_json` are carried `UNINDEXED`: the first two for filtering and
/// ordering without affecting BM25, the last to let `search` reconstruct
/// the full `Standard` (the indexed `rules` column holds only flattened
/// prose for matching).
pub const CREATE_FTS5_SCHEMA: &str = r#"
CREATE VIRTUAL TABLE IF NOT EXISTS standards_search USING fts5(
    standard_id UNINDEXED,
    title,
    description,
    technology,
    category,
    rules,
    rules_json UNINDEXED,
    last_updated UNINDEXED,
    tokenize = 'porter unicode61'
)
"#;

/// Drops the virtual table; used by test fixtures that rebuild it.
pub const DROP_FTS5_SCHEMA: &str = "DROP TABLE IF EXISTS standards_search";

/// Removes any existing row for `standard_id` before re-inserting.
pub const DELETE_FTS_ROW: &str = "DELETE FROM standards_search WHERE standard_id = ?1";

/// Inserts a new FTS row.
pub const INSERT_FTS_ROW: &str = r#"
INSERT INTO standards_search
    (standard_id, title, description, technology, category, rules, rules_json, last_updated)
VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
"#;

/// Periodic housekeeping: tells FTS5 to merge its internal b-tree segments.
pub const OPTIMIZE_FTS: &str = "INSERT INTO standards_search(standards_search) VALUES('optimize')";
