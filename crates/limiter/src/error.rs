//! Error types for building limiters.

/// Errors that can occur while setting up a limiter.
#[derive(Debug, thiserror::Error)]
pub enum LimiterError {
    /// The limiter configuration breaks an invariant.
    #[error("Invalid limiter configuration: {0}")]
    InvalidConfig(String),

    /// Storage backend error.
    #[error("Storage error: {0}")]
    Storage(#[from] crate::storage::StoreError),
}
