//! Free-text query tokenisation and lowering to the embedded store's FTS
//! dialect: a small hand-rolled tokenizer plus a plain struct, unit-tested
//! per token kind rather than pulled in from a parser-combinator crate.

use std::collections::HashMap;

use crate::error::{Error, Result};

/// Boolean operator joining two adjacent terms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    /// Both terms must match.
    And,
    /// Either term may match.
    Or,
}

impl Operator {
    const fn as_fts_str(self) -> &'static str {
        match self {
            Self::And => "AND",
            Self::Or => "OR",
        }
    }
}

/// Tunables for [`parse`].
#[derive(Debug, Clone)]
pub struct ParserConfig {
    /// Hard cap on tokenised query length; exceeding it is a
    /// [`Error::QueryTooLong`].
    pub max_terms: usize,
    /// Operator used between adjacent plain terms that had no explicit
    /// `AND`/`OR` between them.
    pub default_operator: Operator,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            max_terms: 50,
            default_operator: Operator::And,
        }
    }
}

const STOP_WORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "for", "from", "has", "he", "in", "is",
    "it", "its", "of", "on", "that", "the", "to", "was", "were", "will", "with",
];

const COMMON_MISSPELLINGS: &[&str] = &[
    "seperate",
    "occured",
    "recieve",
    "definately",
    "accomodate",
    "neccessary",
    "begining",
];

const SUGGESTION_TABLE: &[(&str, &str)] = &[
    ("seperate", "separate"),
    ("occured", "occurred"),
    ("recieve", "receive"),
    ("definately", "definitely"),
    ("accomodate", "accommodate"),
    ("neccessary", "necessary"),
    ("begining", "beginning"),
];

/// A query after tokenisation, ready to be optimised and/or lowered.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedQuery {
    /// Plain terms plus phrase and `NOT`-consumed terms, in input order.
    pub terms: Vec<String>,
    /// Operators between adjacent `terms`; always `terms.len() - 1` long
    /// after parsing, padded with the configured default.
    pub operators: Vec<Operator>,
    /// Quoted phrases (inner text, spaces retained).
    pub phrases: Vec<String>,
    /// Terms to exclude from matches.
    pub exclusions: Vec<String>,
    /// `field:value` filters extracted outside quotes.
    pub filters: HashMap<String, String>,
    /// True if the query should be matched with fuzzy/NEAR semantics.
    pub fuzzy: bool,
}

enum Token {
    Word(String),
    Phrase(String),
}

fn tokenize(raw: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut chars = raw.chars().peekable();
    let mut current = String::new();

    while let Some(&c) = chars.peek() {
        if c == '"' {
            chars.next();
            let mut phrase = String::new();
            for pc in chars.by_ref() {
                if pc == '"' {
                    break;
                }
                phrase.push(pc);
            }
            if !phrase.is_empty() {
                tokens.push(Token::Phrase(phrase));
            }
        } else if c.is_whitespace() {
            chars.next();
            if !current.is_empty() {
                tokens.push(Token::Word(std::mem::take(&mut current)));
            }
        } else {
            current.push(c);
            chars.next();
        }
    }
    if !current.is_empty() {
        tokens.push(Token::Word(current));
    }
    tokens
}

fn is_stop_word(term: &str) -> bool {
    STOP_WORDS.contains(&term.to_lowercase().as_str())
}

fn looks_like_filter(word: &str) -> Option<(String, String)> {
    let (field, value) = word.split_once(':')?;
    if field.is_empty() || value.is_empty() {
        return None;
    }
    if field.eq_ignore_ascii_case("and") || field.eq_ignore_ascii_case("or") {
        return None;
    }
    if !field.chars().all(|c| c.is_ascii_alphabetic() || c == '_') {
        return None;
    }
    Some((field.to_lowercase(), value.to_string()))
}

fn keyword_operator(word: &str) -> Option<Operator> {
    if word.eq_ignore_ascii_case("and") {
        Some(Operator::And)
    } else if word.eq_ignore_ascii_case("or") {
        Some(Operator::Or)
    } else {
        None
    }
}

fn is_not_keyword(word: &str) -> bool {
    word.eq_ignore_ascii_case("not")
}

struct Builder {
    terms: Vec<String>,
    operators: Vec<Option<Operator>>,
    pending_op: Option<Operator>,
}

impl Builder {
    const fn new() -> Self {
        Self {
            terms: Vec::new(),
            operators: Vec::new(),
            pending_op: None,
        }
    }

    fn add_term(&mut self, term: String) {
        if !self.terms.is_empty() {
            self.operators.push(self.pending_op.take());
        }
        self.terms.push(term);
    }
}

/// Parses a free-text query into its structured form.
///
/// # Errors
///
/// Returns [`Error::QueryTooLong`] if the raw token count exceeds
/// `config.max_terms`. Otherwise parsing is total: pathological input
/// degrades to an empty result rather than failing.
pub fn parse(raw: &str, config: &ParserConfig) -> Result<ParsedQuery> {
    let tokens = tokenize(raw);
    if tokens.len() > config.max_terms {
        return Err(Error::QueryTooLong(tokens.len(), config.max_terms));
    }

    let mut builder = Builder::new();
    let mut phrases = Vec::new();
    let mut exclusions = Vec::new();
    let mut filters = HashMap::new();

    let mut iter = tokens.into_iter().peekable();
    while let Some(token) = iter.next() {
        match token {
            Token::Phrase(phrase) => {
                phrases.push(phrase.clone());
                builder.add_term(phrase);
            }
            Token::Word(word) => {
                if is_not_keyword(&word) {
                    if let Some(next) = iter.next() {
                        let text = match next {
                            Token::Phrase(p) => {
                                phrases.push(p.clone());
                                p
                            }
                            Token::Word(w) => w,
                        };
                        exclusions.push(text.clone());
                        builder.add_term(text);
                    }
                    continue;
                }
                if let Some(op) = keyword_operator(&word) {
                    builder.pending_op = Some(op);
                    continue;
                }
                if let Some(stripped) = word.strip_prefix('-') {
                    if !stripped.is_empty() {
                        exclusions.push(stripped.to_string());
                        continue;
                    }
                }
                if let Some((field, value)) = looks_like_filter(&word) {
                    filters.insert(field, value);
                    continue;
                }
                if is_stop_word(&word) {
                    continue;
                }
                builder.add_term(word.to_lowercase());
            }
        }
    }

    let default_op = config.default_operator;
    let operators: Vec<Operator> = builder
        .operators
        .into_iter()
        .map(|op| op.unwrap_or(default_op))
        .collect();

    let fuzzy = builder
        .terms
        .iter()
        .any(|t| t.len() < 4 || COMMON_MISSPELLINGS.contains(&t.as_str()));

    Ok(ParsedQuery {
        terms: builder.terms,
        operators,
        phrases,
        exclusions,
        filters,
        fuzzy,
    })
}

/// Trims a parsed query to `max_terms` and drops any stop words that
/// slipped through term extraction (e.g. via `NOT`/phrase paths).
pub fn optimize(query: &mut ParsedQuery, max_terms: usize) {
    let keep: Vec<bool> = query
        .terms
        .iter()
        .map(|t| !is_stop_word(t) || query.phrases.contains(t))
        .collect();

    let mut new_terms = Vec::new();
    let mut new_operators = Vec::new();
    for (i, term) in query.terms.iter().enumerate() {
        if !keep[i] {
            continue;
        }
        if !new_terms.is_empty() && i > 0 {
            // Preserve the operator immediately preceding this term when
            // one exists.
            if let Some(op) = query.operators.get(i - 1) {
                new_operators.push(*op);
            }
        }
        new_terms.push(term.clone());
    }
    new_terms.truncate(max_terms);
    new_operators.truncate(new_terms.len().saturating_sub(1));
    query.terms = new_terms;
    query.operators = new_operators;
}

/// Lowers a parsed query to the embedded store's FTS dialect.
///
/// Boosts are rendered as `term[weight]` with one decimal place; `boosts`
/// maps a literal term (as it appears in `query.terms`) to its weight.
#[must_use]
pub fn generate_fts_query(query: &ParsedQuery, boosts: &HashMap<String, f64>) -> String {
    let phrase_set: std::collections::HashSet<&str> =
        query.phrases.iter().map(String::as_str).collect();

    let render_term = |term: &str| -> String {
        let base = if phrase_set.contains(term) {
            format!("\"{term}\"")
        } else if query.fuzzy {
            format!("{term}*")
        } else {
            term.to_string()
        };
        boosts
            .get(term)
            .map_or_else(|| base.clone(), |weight| format!("{base}[{weight:.1}]"))
    };

    let mut rendered = String::new();
    for (i, term) in query.terms.iter().enumerate() {
        if i > 0 {
            let joiner = if query.fuzzy {
                "NEAR"
            } else {
                query.operators.get(i - 1).map_or("AND", |op| op.as_fts_str())
            };
            rendered.push(' ');
            rendered.push_str(joiner);
            rendered.push(' ');
        }
        rendered.push_str(&render_term(term));
    }

    for exclusion in &query.exclusions {
        let rendered_exclusion = if exclusion.contains(char::is_whitespace) {
            format!("\"{exclusion}\"")
        } else {
            exclusion.clone()
        };
        if !rendered.is_empty() {
            rendered.push(' ');
        }
        rendered.push_str("NOT ");
        rendered.push_str(&rendered_exclusion);
    }

    rendered
}

/// Returns spelling corrections for any recognised misspelling in `query`.
#[must_use]
pub fn get_suggestions(query: &str) -> Vec<String> {
    query
        .split_whitespace()
        .filter_map(|word| {
            let lower = word.to_lowercase();
            SUGGESTION_TABLE
                .iter()
                .find(|(misspelled, _)| *misspelled == lower)
                .map(|(_, correct)| (*correct).to_string())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> ParserConfig {
        ParserConfig::default()
    }

    #[test]
    fn quoted_phrase_preserves_inner_spaces() {
        let parsed = parse(r#""hello world" foo"#, &cfg()).unwrap();
        assert_eq!(parsed.phrases, vec!["hello world".to_string()]);
        assert!(parsed.terms.contains(&"hello world".to_string()));
        assert!(parsed.terms.contains(&"foo".to_string()));
    }

    #[test]
    fn field_filters_extracted_outside_quotes() {
        let parsed = parse("lang:rust memory leak", &cfg()).unwrap();
        assert_eq!(parsed.filters.get("lang").map(String::as_str), Some("rust"));
        assert!(!parsed.terms.iter().any(|t| t.contains("lang")));
    }

    #[test]
    fn not_appends_to_exclusions_and_terms() {
        let parsed = parse("interfaces NOT deprecated", &cfg()).unwrap();
        assert!(parsed.exclusions.contains(&"deprecated".to_string()));
        assert!(parsed.terms.contains(&"deprecated".to_string()));
    }

    #[test]
    fn leading_dash_is_exclusion_only() {
        let parsed = parse("interfaces -legacy", &cfg()).unwrap();
        assert!(parsed.exclusions.contains(&"legacy".to_string()));
        assert!(!parsed.terms.contains(&"legacy".to_string()));
    }

    #[test]
    fn stop_words_dropped_from_plain_terms() {
        let parsed = parse("the quick fox", &cfg()).unwrap();
        assert!(!parsed.terms.contains(&"the".to_string()));
        assert!(parsed.terms.contains(&"quick".to_string()));
    }

    #[test]
    fn operators_padded_with_default() {
        let parsed = parse("quick brown fox", &cfg()).unwrap();
        assert_eq!(parsed.operators.len(), parsed.terms.len() - 1);
        assert!(parsed.operators.iter().all(|op| *op == Operator::And));
    }

    #[test]
    fn explicit_or_is_honoured() {
        let parsed = parse("quick OR brown", &cfg()).unwrap();
        assert_eq!(parsed.operators, vec![Operator::Or]);
    }

    #[test]
    fn fuzzy_inferred_from_short_term() {
        let parsed = parse("cat dog elephant", &cfg()).unwrap();
        assert!(parsed.fuzzy);
        let parsed = parse("elephant giraffe", &cfg()).unwrap();
        assert!(!parsed.fuzzy);
    }

    #[test]
    fn query_too_long_is_rejected() {
        let cfg = ParserConfig {
            max_terms: 2,
            ..ParserConfig::default()
        };
        let err = parse("one two three", &cfg).unwrap_err();
        assert!(matches!(err, Error::QueryTooLong(3, 2)));
    }

    #[test]
    fn generate_fts_query_round_trips_term_count() {
        let parsed = parse("typescript interface naming", &cfg()).unwrap();
        let fts = generate_fts_query(&parsed, &HashMap::new());
        for term in &parsed.terms {
            assert!(fts.contains(term.as_str()));
        }
    }

    #[test]
    fn generate_fts_query_quotes_phrases_and_appends_exclusions() {
        let parsed = parse(r#""interface naming" NOT deprecated"#, &cfg()).unwrap();
        let fts = generate_fts_query(&parsed, &HashMap::new());
        assert!(fts.contains("\"interface naming\""));
        assert!(fts.ends_with("NOT deprecated"));
    }

    #[test]
    fn generate_fts_query_renders_boosts_with_one_decimal() {
        let parsed = parse("typescript", &cfg()).unwrap();
        let mut boosts = HashMap::new();
        boosts.insert("typescript".to_string(), 2.0);
        let fts = generate_fts_query(&parsed, &boosts);
        assert!(fts.contains("[2.0]"));
    }

    #[test]
    fn suggestions_use_fixed_lookup_table() {
        let suggestions = get_suggestions("I will seperate these occured items");
        assert_eq!(suggestions, vec!["separate".to_string(), "occurred".to_string()]);
    }

    proptest::proptest! {
        /// Parsing then regenerating an FTS query preserves term count,
        /// phrase spans, and the exclusion set, regardless of which
        /// long, non-stop-word terms and exclusions went in.
        #[test]
        fn parse_then_generate_preserves_terms_and_exclusions(
            words in proptest::collection::vec("[a-z]{5,10}", 1..6),
            excluded in proptest::collection::vec("[a-z]{5,10}", 0..3),
        ) {
            let mut raw = words.join(" ");
            for excl in &excluded {
                raw.push_str(" -");
                raw.push_str(excl);
            }

            let parsed = parse(&raw, &cfg()).unwrap();
            let fts = generate_fts_query(&parsed, &HashMap::new());

            prop_assert_eq!(parsed.terms.len(), words.len());
            for word in &words {
                prop_assert!(fts.contains(word.as_str()));
            }
            for excl in &excluded {
                prop_assert!(parsed.exclusions.contains(excl));
                prop_assert!(fts.contains(&format!("NOT {excl}")));
            }
        }
    }
}
