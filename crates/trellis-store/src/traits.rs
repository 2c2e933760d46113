//! Storage trait: the abstract interface for holder persistence.
//!
//! This trait keeps the engine storage-agnostic. The engine never blocks its
//! resolution path on these calls; holders are loaded up front and resolution
//! runs purely on in-memory snapshots.

use async_trait::async_trait;
use trellis_core::{GroupData, GroupName, Track, TrackName, UserData, UserId};

use crate::error::Result;

/// The Storage trait: async interface for holder persistence.
///
/// # Design Notes
///
/// - **DTO boundary**: live holders carry interior locks, so the contract
///   deals in plain `UserData`/`GroupData` snapshots.
/// - **Upsert saves**: saving an already-present holder overwrites it.
/// - **Name lookup**: user display names are indexed case-insensitively for
///   `lookup_user_id`.
#[async_trait]
pub trait Storage: Send + Sync {
    // ─────────────────────────────────────────────────────────────────────────
    // User Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Load a user snapshot by id.
    async fn load_user(&self, id: UserId) -> Result<Option<UserData>>;

    /// Save (upsert) a user snapshot.
    async fn save_user(&self, data: &UserData) -> Result<()>;

    /// Resolve a display name to a user id, if known.
    async fn lookup_user_id(&self, name: &str) -> Result<Option<UserId>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Group Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Load a group snapshot by name.
    async fn load_group(&self, name: &GroupName) -> Result<Option<GroupData>>;

    /// Save (upsert) a group snapshot.
    async fn save_group(&self, data: &GroupData) -> Result<()>;

    /// List the names of all stored groups.
    async fn list_groups(&self) -> Result<Vec<GroupName>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Track Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Load a track by name.
    async fn load_track(&self, name: &TrackName) -> Result<Option<Track>>;

    /// Save (upsert) a track.
    async fn save_track(&self, track: &Track) -> Result<()>;
}
