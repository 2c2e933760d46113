//! Error types for the Trellis engine.

use thiserror::Error;

use trellis_core::{CoreError, GroupName, HolderRef, TrackName};
use trellis_store::StoreError;
use trellis_sync::SyncError;

/// Engine errors surfaced to calling code.
///
/// Resolver-internal problems (missing groups mid-traversal, inheritance
/// cycles) are absorbed as skip-and-continue with warnings and never reach
/// this type; only boundary failures and caller mistakes do.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("holder {0} not found")]
    NotFound(HolderRef),

    #[error("no user named {0:?}")]
    UserNameNotFound(String),

    #[error("group {0} not found")]
    GroupNotFound(GroupName),

    #[error("track {0} not found")]
    TrackNotFound(TrackName),

    #[error("user is not on any group of track {0}")]
    NotOnTrack(TrackName),

    #[error("user is already at the {end} end of track {track}")]
    EndOfTrack { track: TrackName, end: &'static str },

    #[error("a platform hook is already registered")]
    HookAlreadyRegistered,

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Sync(#[from] SyncError),
}

/// Result alias for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;
