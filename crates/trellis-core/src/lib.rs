//! # Trellis Core
//!
//! Pure data model for the Trellis permission engine: nodes, contexts,
//! holders, and node collections.
//!
//! This crate contains no I/O, no storage, no networking. It is pure
//! computation over permission data structures.
//!
//! ## Key Types
//!
//! - [`Node`] - One permission grant or denial, optionally context-restricted
//!   and expiring
//! - [`NodeCollection`] - An ordered node set with atomic snapshots
//! - [`ContextSet`] - The active situational contexts a lookup happens in
//! - [`ContextFingerprint`] - Order-independent cache key for a context set
//! - [`User`] / [`Group`] / [`Track`] - The permission holders
//!
//! ## Matching
//!
//! A node applies under a context set iff every one of its required
//! key/value pairs is present. See [`ContextSet::satisfies`].

pub mod collection;
pub mod context;
pub mod error;
pub mod holder;
pub mod node;
pub mod types;

pub use collection::NodeCollection;
pub use context::{ContextFingerprint, ContextSet};
pub use error::CoreError;
pub use holder::{Group, GroupData, InheritanceEdge, Track, User, UserData};
pub use node::{Node, NodeBuilder};
pub use types::{GroupName, HolderRef, TrackName, UserId};
