//! Arena-style registry of loaded holders.
//!
//! Holders are looked up by id or name and shared behind `Arc`. The resolver
//! borrows them transiently during one traversal; no holder ever stores a
//! pointer to another, so inheritance cycles in the data cannot become
//! reference cycles in memory.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use trellis_core::{Group, GroupName, Track, TrackName, User, UserId};

/// Registry of currently-loaded users, groups, and tracks.
#[derive(Debug, Default)]
pub struct HolderRegistry {
    users: RwLock<HashMap<UserId, Arc<User>>>,
    groups: RwLock<HashMap<GroupName, Arc<Group>>>,
    tracks: RwLock<HashMap<TrackName, Arc<Track>>>,
}

impl HolderRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a loaded user.
    pub fn get_user(&self, id: UserId) -> Option<Arc<User>> {
        self.users.read().unwrap().get(&id).cloned()
    }

    /// Insert a user, replacing any previously-loaded copy.
    pub fn insert_user(&self, user: Arc<User>) {
        self.users.write().unwrap().insert(user.id(), user);
    }

    /// Unload a user.
    pub fn remove_user(&self, id: UserId) -> Option<Arc<User>> {
        self.users.write().unwrap().remove(&id)
    }

    /// Snapshot of all loaded users.
    pub fn loaded_users(&self) -> Vec<Arc<User>> {
        self.users.read().unwrap().values().cloned().collect()
    }

    /// Look up a loaded group.
    pub fn get_group(&self, name: &GroupName) -> Option<Arc<Group>> {
        self.groups.read().unwrap().get(name).cloned()
    }

    /// Insert a group, replacing any previously-loaded copy.
    pub fn insert_group(&self, group: Arc<Group>) {
        self.groups
            .write()
            .unwrap()
            .insert(group.name().clone(), group);
    }

    /// Unload a group.
    pub fn remove_group(&self, name: &GroupName) -> Option<Arc<Group>> {
        self.groups.write().unwrap().remove(name)
    }

    /// Snapshot of all loaded groups.
    pub fn loaded_groups(&self) -> Vec<Arc<Group>> {
        self.groups.read().unwrap().values().cloned().collect()
    }

    /// Look up a loaded track.
    pub fn get_track(&self, name: &TrackName) -> Option<Arc<Track>> {
        self.tracks.read().unwrap().get(name).cloned()
    }

    /// Insert a track, replacing any previously-loaded copy.
    pub fn insert_track(&self, track: Arc<Track>) {
        self.tracks
            .write()
            .unwrap()
            .insert(track.name().clone(), track);
    }

    /// Number of loaded users.
    pub fn user_count(&self) -> usize {
        self.users.read().unwrap().len()
    }

    /// Number of loaded groups.
    pub fn group_count(&self) -> usize {
        self.groups.read().unwrap().len()
    }
}
