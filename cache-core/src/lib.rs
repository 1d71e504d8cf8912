//! Pure, dependency-light core of the standards cache: the in-memory
//! LRU+TTL cache, the free-text search query parser, the shared domain
//! model, and the crate-wide error taxonomy.
//!
//! Everything here is synchronous and infallible beyond the documented
//! error cases — no I/O, no async runtime dependency. The persistent tier,
//! FTS index, and analytics recorder that consume these types live in
//! `cache-storage`.

pub mod cache;
pub mod error;
pub mod key_schema;
pub mod model;
pub mod search;

pub use error::{Error, Result};
