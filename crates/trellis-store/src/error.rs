//! Error types for the storage boundary.

use thiserror::Error;

/// Errors surfaced by storage backends.
///
/// Storage failures are returned to the caller of a mutation; the engine
/// does not roll back in-memory state on a failed save. Callers re-attempt
/// the save or explicitly discard the change.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to encode holder snapshot: {0}")]
    Encode(String),

    #[error("failed to decode holder snapshot: {0}")]
    Decode(String),

    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Result alias for storage operations.
pub type Result<T> = std::result::Result<T, StoreError>;
