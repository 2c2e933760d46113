//! Error types for invalidation messaging.

use thiserror::Error;

/// Errors surfaced by messaging implementations.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("failed to decode invalidation message: {0}")]
    Decode(String),

    #[error("failed to encode invalidation message: {0}")]
    Encode(String),

    /// The receiver fell behind and missed messages. Consumers should
    /// treat this as a lost-signal window and invalidate everything rather
    /// than risk permanent staleness.
    #[error("invalidation receiver lagged, {0} messages skipped")]
    Lagged(u64),

    #[error("messaging channel closed")]
    Closed,
}

/// Result alias for messaging operations.
pub type Result<T> = std::result::Result<T, SyncError>;
