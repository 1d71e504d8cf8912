//! The authoritative cache key schema.
//!
//! Four kinds of key are recognised, each a colon-separated string:
//!
//! | Kind | Format |
//! |---|---|
//! | standards listing | `standards:{technology\|"all"}:{category\|"all"}` |
//! | standards item | `standards:{technology}:{category}:{id}` |
//! | search result | `search:{query}:{technology\|"all"}:{"fuzzy"\|"exact"}:{limit}` |
//! | validation result | `validation:{code-hash}:{language}:{rules-csv\|"default"}` |
//!
//! These parsers never perform external lookups; the key string alone is
//! authoritative. All functions are total — an unrecognised key simply
//! produces `None` facets rather than an error.

const ALL: &str = "all";

/// Builds a standards-listing key.
#[must_use]
pub fn standards_listing_key(technology: Option<&str>, category: Option<&str>) -> String {
    format!(
        "standards:{}:{}",
        technology.unwrap_or(ALL),
        category.unwrap_or(ALL)
    )
}

/// Builds a standards-item key.
#[must_use]
pub fn standards_item_key(technology: &str, category: &str, id: &str) -> String {
    format!("standards:{technology}:{category}:{id}")
}

/// Builds a search-result key.
#[must_use]
pub fn search_key(query: &str, technology: Option<&str>, fuzzy: bool, limit: usize) -> String {
    format!(
        "search:{query}:{}:{}:{limit}",
        technology.unwrap_or(ALL),
        if fuzzy { "fuzzy" } else { "exact" }
    )
}

/// Builds a validation-result key.
#[must_use]
pub fn validation_key(code_hash: &str, language: &str, rules: &[String]) -> String {
    let rules_csv = if rules.is_empty() {
        "default".to_string()
    } else {
        rules.join(",")
    };
    format!("validation:{code_hash}:{language}:{rules_csv}")
}

fn segments(key: &str) -> Vec<&str> {
    key.split(':').collect()
}

/// Extracts the technology facet from a key, if the key kind carries one
/// and it is not the `"all"` wildcard.
#[must_use]
pub fn extract_technology(key: &str) -> Option<String> {
    let parts = segments(key);
    match parts.first().copied() {
        Some("standards") if parts.len() == 3 || parts.len() == 4 => {
            non_wildcard(parts.get(1).copied())
        }
        Some("search") if parts.len() == 5 => non_wildcard(parts.get(2).copied()),
        _ => None,
    }
}

/// Extracts the category facet from a key, if the key kind carries one and
/// it is not the `"all"` wildcard.
#[must_use]
pub fn extract_category(key: &str) -> Option<String> {
    let parts = segments(key);
    match parts.first().copied() {
        Some("standards") if parts.len() == 3 || parts.len() == 4 => {
            non_wildcard(parts.get(2).copied())
        }
        _ => None,
    }
}

/// Extracts the standard id facet from a `standards:{tech}:{cat}:{id}` key.
#[must_use]
pub fn extract_standard_id(key: &str) -> Option<String> {
    let parts = segments(key);
    if parts.first().copied() == Some("standards") && parts.len() == 4 {
        parts.get(3).map(|s| (*s).to_string())
    } else {
        None
    }
}

fn non_wildcard(segment: Option<&str>) -> Option<String> {
    match segment {
        Some(ALL) | None => None,
        Some(s) => Some(s.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listing_key_round_trips() {
        let key = standards_listing_key(Some("typescript"), Some("naming"));
        assert_eq!(key, "standards:typescript:naming");
        assert_eq!(extract_technology(&key).as_deref(), Some("typescript"));
        assert_eq!(extract_category(&key).as_deref(), Some("naming"));
        assert_eq!(extract_standard_id(&key), None);
    }

    #[test]
    fn listing_key_all_wildcard_has_no_facets() {
        let key = standards_listing_key(None, None);
        assert_eq!(key, "standards:all:all");
        assert_eq!(extract_technology(&key), None);
        assert_eq!(extract_category(&key), None);
    }

    #[test]
    fn item_key_round_trips() {
        let key = standards_item_key("typescript", "naming", "ts-001");
        assert_eq!(key, "standards:typescript:naming:ts-001");
        assert_eq!(extract_technology(&key).as_deref(), Some("typescript"));
        assert_eq!(extract_category(&key).as_deref(), Some("naming"));
        assert_eq!(extract_standard_id(&key).as_deref(), Some("ts-001"));
    }

    #[test]
    fn search_key_extracts_technology_only() {
        let key = search_key("interfaces", Some("typescript"), true, 10);
        assert_eq!(key, "search:interfaces:typescript:fuzzy:10");
        assert_eq!(extract_technology(&key).as_deref(), Some("typescript"));
        assert_eq!(extract_category(&key), None);
    }

    #[test]
    fn validation_key_has_no_facets() {
        let key = validation_key("abc123", "rust", &[]);
        assert_eq!(key, "validation:abc123:rust:default");
        assert_eq!(extract_technology(&key), None);
        assert_eq!(extract_category(&key), None);
        assert_eq!(extract_standard_id(&key), None);
    }

    #[test]
    fn unrecognised_key_is_total_not_error() {
        assert_eq!(extract_technology("garbage"), None);
        assert_eq!(extract_category(""), None);
        assert_eq!(extract_standard_id("standards:only:two"), None);
    }
}
