//! Error types for the Trellis core data model.

use thiserror::Error;

/// Core errors that can occur while constructing model types.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid name {0:?}: must be non-empty and contain no whitespace")]
    InvalidName(String),

    #[error("invalid user id: {0}")]
    InvalidUserId(String),

    #[error("track contains duplicate group {0:?}")]
    DuplicateTrackGroup(String),

    #[error("track must contain at least one group")]
    EmptyTrack,
}

/// Result alias for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
