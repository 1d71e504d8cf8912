//! Free-text query parsing and lowering to the embedded store's FTS dialect.

pub mod parser;

pub use parser::{generate_fts_query, get_suggestions, optimize, parse, Operator, ParsedQuery, ParserConfig};
