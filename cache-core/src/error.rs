//! Crate-wide error taxonomy.
//!
//! Mirrors the policy in the system's error handling design: most variants
//! surface to the caller, a handful are downgraded (deadline -> miss,
//! analytics -> swallowed) by the components that produce them rather than
//! by this type itself.

use thiserror::Error;

/// Result alias used throughout the cache core.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type shared by every component in this crate.
#[derive(Debug, Error)]
pub enum Error {
    /// The embedded store handle is not open.
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    /// The store remained locked past its busy-wait timeout.
    #[error("storage busy")]
    Busy,

    /// A constraint violation surfaced from within a transaction.
    #[error("integrity violation: {0}")]
    Integrity(String),

    /// A cached blob failed to (de)serialize on rehydration.
    #[error("serialization failed for key {key}: {source}")]
    Serialization {
        /// The cache key whose payload failed to round-trip.
        key: String,
        /// Underlying serde error.
        #[source]
        source: serde_json::Error,
    },

    /// The tokenised query exceeded the configured term bound.
    #[error("query too long: {0} terms exceeds max of {1}")]
    QueryTooLong(usize, usize),

    /// A search filter was malformed or referenced an unknown field.
    #[error("invalid filter: {0}")]
    InvalidFilter(String),

    /// A tier failed to respond within its deadline.
    #[error("deadline exceeded after {0:?}")]
    DeadlineExceeded(std::time::Duration),

    /// Recording an analytics event failed; never propagated to callers.
    #[error("analytics failure: {0}")]
    AnalyticsFailure(String),

    /// Invalid configuration discovered at construction time.
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl Error {
    /// Classifies whether a caller may usefully retry the operation that
    /// produced this error.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Self::Busy | Self::DeadlineExceeded(_))
    }

    /// True for the three storage-layer variants that are surfaced
    /// synchronously to callers per the error handling policy.
    #[must_use]
    pub const fn is_storage_error(&self) -> bool {
        matches!(
            self,
            Self::StorageUnavailable(_) | Self::Busy | Self::Integrity(_)
        )
    }
}
