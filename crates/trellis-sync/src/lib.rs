//! # Trellis Sync
//!
//! Cluster cache-invalidation messaging for the Trellis permission engine.
//!
//! When one cluster member mutates shared permission data, every other
//! member must drop its cached results for the affected holder. The engine
//! consumes the [`Messaging`] contract; this crate defines the message types
//! and ships an in-process bus implementation.

pub mod error;
pub mod messages;
pub mod transport;

pub use error::SyncError;
pub use messages::{BusNodeId, InvalidationMessage};
pub use transport::{InvalidationReceiver, MemoryBus, MemoryBusNetwork, Messaging};
