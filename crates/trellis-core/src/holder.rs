//! Permission holders: users, groups, and tracks.
//!
//! Users and groups own a node collection plus inheritance edges; tracks are
//! ordered promotion ladders of groups and carry no weight in resolution.
//! Live holders use interior locking so the engine can share them behind
//! `Arc` without a global lock; plain `*Data` structs cross the storage
//! boundary.

use std::collections::BTreeMap;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

use crate::collection::NodeCollection;
use crate::context::ContextSet;
use crate::error::CoreError;
use crate::node::Node;
use crate::types::{GroupName, HolderRef, TrackName, UserId};

/// One membership (user -> group) or inheritance (group -> parent) edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InheritanceEdge {
    /// The inherited group.
    pub group: GroupName,

    /// Context restriction on the edge itself; empty applies everywhere.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub contexts: BTreeMap<String, String>,

    /// Expiry timestamp in unix milliseconds, if temporary.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<i64>,

    /// Explicit ordering weight among sibling edges. Higher wins; ties break
    /// by group name ascending.
    #[serde(default)]
    pub weight: i32,
}

impl InheritanceEdge {
    /// Create an unrestricted, permanent edge with default weight.
    pub fn new(group: GroupName) -> Self {
        Self {
            group,
            contexts: BTreeMap::new(),
            expiry: None,
            weight: 0,
        }
    }

    /// Restrict the edge to a context key/value pair.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.contexts.insert(key.into(), value.into());
        self
    }

    /// Set the expiry timestamp.
    pub fn with_expiry(mut self, at: i64) -> Self {
        self.expiry = Some(at);
        self
    }

    /// Set the ordering weight.
    pub fn with_weight(mut self, weight: i32) -> Self {
        self.weight = weight;
        self
    }

    /// True if the expiry timestamp has elapsed.
    pub fn is_expired(&self, now: i64) -> bool {
        self.expiry.is_some_and(|at| now > at)
    }

    /// An edge is followed only while unexpired and context-matching.
    pub fn is_active(&self, now: i64, active: &ContextSet) -> bool {
        !self.is_expired(now) && active.satisfies(&self.contexts)
    }
}

/// A user principal.
pub struct User {
    id: UserId,
    name: RwLock<Option<String>>,
    nodes: NodeCollection,
    memberships: RwLock<Vec<InheritanceEdge>>,
}

impl User {
    /// Create a user with no nodes or memberships.
    pub fn new(id: UserId) -> Self {
        Self {
            id,
            name: RwLock::new(None),
            nodes: NodeCollection::new(),
            memberships: RwLock::new(Vec::new()),
        }
    }

    /// Builder-style display name.
    pub fn with_name(self, name: impl Into<String>) -> Self {
        self.set_name(Some(name.into()));
        self
    }

    /// The stable id.
    pub fn id(&self) -> UserId {
        self.id
    }

    /// The display name, if known.
    pub fn name(&self) -> Option<String> {
        self.name.read().unwrap().clone()
    }

    /// Update the display name.
    pub fn set_name(&self, name: Option<String>) {
        *self.name.write().unwrap() = name;
    }

    /// This user's own node collection.
    pub fn nodes(&self) -> &NodeCollection {
        &self.nodes
    }

    /// Snapshot of current memberships.
    pub fn memberships(&self) -> Vec<InheritanceEdge> {
        self.memberships.read().unwrap().clone()
    }

    /// Add a membership edge. Returns false if an identical edge exists.
    pub fn add_membership(&self, edge: InheritanceEdge) -> bool {
        add_edge(&self.memberships, edge)
    }

    /// Remove every membership edge to the given group.
    pub fn remove_membership(&self, group: &GroupName) -> bool {
        remove_edges(&self.memberships, group)
    }

    /// Remove memberships whose expiry has elapsed, returning them.
    pub fn remove_expired_memberships(&self, now: i64) -> Vec<InheritanceEdge> {
        remove_expired_edges(&self.memberships, now)
    }

    /// The graph-wide handle for this user.
    pub fn holder_ref(&self) -> HolderRef {
        HolderRef::User(self.id)
    }

    /// Snapshot into a storage DTO.
    pub fn to_data(&self) -> UserData {
        UserData {
            id: self.id,
            name: self.name(),
            nodes: self.nodes.snapshot().as_ref().clone(),
            memberships: self.memberships(),
        }
    }

    /// Rebuild a live user from a storage DTO.
    pub fn from_data(data: UserData) -> Self {
        Self {
            id: data.id,
            name: RwLock::new(data.name),
            nodes: NodeCollection::from_nodes(data.nodes),
            memberships: RwLock::new(data.memberships),
        }
    }
}

impl std::fmt::Debug for User {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("User")
            .field("id", &self.id)
            .field("name", &self.name())
            .field("nodes", &self.nodes.len())
            .field("memberships", &self.memberships().len())
            .finish()
    }
}

/// A group principal.
pub struct Group {
    name: GroupName,
    nodes: NodeCollection,
    parents: RwLock<Vec<InheritanceEdge>>,
}

impl Group {
    /// Create a group with no nodes or parents.
    pub fn new(name: GroupName) -> Self {
        Self {
            name,
            nodes: NodeCollection::new(),
            parents: RwLock::new(Vec::new()),
        }
    }

    /// The unique name.
    pub fn name(&self) -> &GroupName {
        &self.name
    }

    /// This group's own node collection.
    pub fn nodes(&self) -> &NodeCollection {
        &self.nodes
    }

    /// Snapshot of current parent edges.
    pub fn parents(&self) -> Vec<InheritanceEdge> {
        self.parents.read().unwrap().clone()
    }

    /// Add a parent edge. Returns false if an identical edge exists.
    pub fn add_parent(&self, edge: InheritanceEdge) -> bool {
        add_edge(&self.parents, edge)
    }

    /// Remove every parent edge to the given group.
    pub fn remove_parent(&self, group: &GroupName) -> bool {
        remove_edges(&self.parents, group)
    }

    /// Remove parent edges whose expiry has elapsed, returning them.
    pub fn remove_expired_parents(&self, now: i64) -> Vec<InheritanceEdge> {
        remove_expired_edges(&self.parents, now)
    }

    /// The graph-wide handle for this group.
    pub fn holder_ref(&self) -> HolderRef {
        HolderRef::Group(self.name.clone())
    }

    /// Snapshot into a storage DTO.
    pub fn to_data(&self) -> GroupData {
        GroupData {
            name: self.name.clone(),
            nodes: self.nodes.snapshot().as_ref().clone(),
            parents: self.parents(),
        }
    }

    /// Rebuild a live group from a storage DTO.
    pub fn from_data(data: GroupData) -> Self {
        Self {
            name: data.name,
            nodes: NodeCollection::from_nodes(data.nodes),
            parents: RwLock::new(data.parents),
        }
    }
}

impl std::fmt::Debug for Group {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Group")
            .field("name", &self.name)
            .field("nodes", &self.nodes.len())
            .field("parents", &self.parents().len())
            .finish()
    }
}

fn add_edge(edges: &RwLock<Vec<InheritanceEdge>>, edge: InheritanceEdge) -> bool {
    let mut guard = edges.write().unwrap();
    if guard.contains(&edge) {
        return false;
    }
    guard.push(edge);
    true
}

fn remove_edges(edges: &RwLock<Vec<InheritanceEdge>>, group: &GroupName) -> bool {
    let mut guard = edges.write().unwrap();
    let before = guard.len();
    guard.retain(|e| &e.group != group);
    guard.len() != before
}

fn remove_expired_edges(edges: &RwLock<Vec<InheritanceEdge>>, now: i64) -> Vec<InheritanceEdge> {
    let mut guard = edges.write().unwrap();
    if !guard.iter().any(|e| e.is_expired(now)) {
        return Vec::new();
    }
    let (expired, kept): (Vec<_>, Vec<_>) =
        guard.drain(..).partition(|e| e.is_expired(now));
    *guard = kept;
    expired
}

/// An ordered promotion ladder of distinct groups.
///
/// Always non-empty; deserialization re-runs the constructor checks, so a
/// stored track cannot bypass them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "TrackData")]
pub struct Track {
    name: TrackName,
    groups: Vec<GroupName>,
}

/// Raw track fields as stored, before validation.
#[derive(Deserialize)]
struct TrackData {
    name: TrackName,
    groups: Vec<GroupName>,
}

impl TryFrom<TrackData> for Track {
    type Error = CoreError;

    fn try_from(data: TrackData) -> Result<Self, CoreError> {
        Track::new(data.name, data.groups)
    }
}

impl Track {
    /// Create a track; groups must be non-empty and distinct.
    pub fn new(name: TrackName, groups: Vec<GroupName>) -> Result<Self, CoreError> {
        if groups.is_empty() {
            return Err(CoreError::EmptyTrack);
        }
        for (i, group) in groups.iter().enumerate() {
            if groups[..i].contains(group) {
                return Err(CoreError::DuplicateTrackGroup(group.as_str().to_string()));
            }
        }
        Ok(Self { name, groups })
    }

    /// The unique name.
    pub fn name(&self) -> &TrackName {
        &self.name
    }

    /// The ladder, lowest first.
    pub fn groups(&self) -> &[GroupName] {
        &self.groups
    }

    /// True if the group is on this track.
    pub fn contains(&self, group: &GroupName) -> bool {
        self.groups.contains(group)
    }

    /// The group one rung above, if any.
    pub fn next(&self, current: &GroupName) -> Option<&GroupName> {
        let pos = self.groups.iter().position(|g| g == current)?;
        self.groups.get(pos + 1)
    }

    /// The group one rung below, if any.
    pub fn previous(&self, current: &GroupName) -> Option<&GroupName> {
        let pos = self.groups.iter().position(|g| g == current)?;
        pos.checked_sub(1).map(|p| &self.groups[p])
    }

    /// The first rung of the ladder.
    pub fn first(&self) -> &GroupName {
        &self.groups[0]
    }
}

/// Storage DTO for a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserData {
    pub id: UserId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub memberships: Vec<InheritanceEdge>,
}

/// Storage DTO for a group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupData {
    pub name: GroupName,
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub parents: Vec<InheritanceEdge>,
}
