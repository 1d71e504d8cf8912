//! Runnable glue layer: configuration, the tool-call surface, and process
//! wiring for the standards cache.

pub mod api;
pub mod config;

pub use api::AppState;
pub use config::CacheSystemConfig;
