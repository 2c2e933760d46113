//! In-memory implementation of the Storage trait.
//!
//! Primarily for tests, and the reference for what a real backend must do.
//! Snapshots are held as encoded bytes so the encode/decode path is the same
//! one a durable backend would exercise.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

use trellis_core::{GroupData, GroupName, Track, TrackName, UserData, UserId};

use crate::error::{Result, StoreError};
use crate::traits::Storage;

/// In-memory storage implementation.
///
/// All data is lost when the store is dropped. Thread-safe via RwLock.
#[derive(Default)]
pub struct MemoryStorage {
    inner: RwLock<MemoryStorageInner>,
}

#[derive(Default)]
struct MemoryStorageInner {
    /// Encoded user snapshots by id.
    users: HashMap<UserId, Vec<u8>>,

    /// Encoded group snapshots by name.
    groups: HashMap<GroupName, Vec<u8>>,

    /// Encoded tracks by name.
    tracks: HashMap<TrackName, Vec<u8>>,

    /// Lowercased display name -> user id.
    name_index: HashMap<String, UserId>,
}

impl MemoryStorage {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored users (test helper).
    pub fn user_count(&self) -> usize {
        self.inner.read().unwrap().users.len()
    }
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    ciborium::into_writer(value, &mut buf).map_err(|e| StoreError::Encode(e.to_string()))?;
    Ok(buf)
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    ciborium::from_reader(bytes).map_err(|e| StoreError::Decode(e.to_string()))
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn load_user(&self, id: UserId) -> Result<Option<UserData>> {
        let inner = self.inner.read().unwrap();
        inner.users.get(&id).map(|b| decode(b)).transpose()
    }

    async fn save_user(&self, data: &UserData) -> Result<()> {
        let bytes = encode(data)?;
        let mut inner = self.inner.write().unwrap();
        if let Some(name) = &data.name {
            inner.name_index.insert(name.to_lowercase(), data.id);
        }
        inner.users.insert(data.id, bytes);
        Ok(())
    }

    async fn lookup_user_id(&self, name: &str) -> Result<Option<UserId>> {
        let inner = self.inner.read().unwrap();
        Ok(inner.name_index.get(&name.to_lowercase()).copied())
    }

    async fn load_group(&self, name: &GroupName) -> Result<Option<GroupData>> {
        let inner = self.inner.read().unwrap();
        inner.groups.get(name).map(|b| decode(b)).transpose()
    }

    async fn save_group(&self, data: &GroupData) -> Result<()> {
        let bytes = encode(data)?;
        let mut inner = self.inner.write().unwrap();
        inner.groups.insert(data.name.clone(), bytes);
        Ok(())
    }

    async fn list_groups(&self) -> Result<Vec<GroupName>> {
        let inner = self.inner.read().unwrap();
        let mut names: Vec<GroupName> = inner.groups.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    async fn load_track(&self, name: &TrackName) -> Result<Option<Track>> {
        let inner = self.inner.read().unwrap();
        inner.tracks.get(name).map(|b| decode(b)).transpose()
    }

    async fn save_track(&self, track: &Track) -> Result<()> {
        let bytes = encode(track)?;
        let mut inner = self.inner.write().unwrap();
        inner.tracks.insert(track.name().clone(), bytes);
        Ok(())
    }
}
