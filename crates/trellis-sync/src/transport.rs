//! Messaging abstraction for invalidation signals.
//!
//! The engine only consumes this publish/subscribe contract. Implementations
//! may sit on a message queue, a database channel, or any other transport;
//! this crate ships an in-process bus for tests and single-host clusters.

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::error::{Result, SyncError};
use crate::messages::{BusNodeId, InvalidationMessage};

/// Receiving half of an invalidation subscription.
///
/// Yields `(origin, message)` pairs. A [`SyncError::Lagged`] result means
/// messages were missed; the subscription stays usable afterwards.
pub struct InvalidationReceiver {
    rx: broadcast::Receiver<(BusNodeId, InvalidationMessage)>,
}

impl InvalidationReceiver {
    /// Receive the next invalidation signal.
    pub async fn recv(&mut self) -> Result<(BusNodeId, InvalidationMessage)> {
        match self.rx.recv().await {
            Ok(pair) => Ok(pair),
            Err(broadcast::error::RecvError::Lagged(n)) => Err(SyncError::Lagged(n)),
            Err(broadcast::error::RecvError::Closed) => Err(SyncError::Closed),
        }
    }
}

/// Messaging trait for publishing and subscribing to invalidation signals.
///
/// Implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait Messaging: Send + Sync {
    /// Broadcast an invalidation to every other cluster member.
    async fn publish(&self, message: InvalidationMessage) -> Result<()>;

    /// Subscribe to invalidations, including ones this node published.
    ///
    /// Callers compare the origin against [`Messaging::local_node_id`] to
    /// skip their own broadcasts.
    fn subscribe(&self) -> InvalidationReceiver;

    /// This node's identity on the bus.
    fn local_node_id(&self) -> BusNodeId;
}

/// Shared state for an in-process invalidation bus.
///
/// Connect several [`MemoryBus`] handles to simulate a cluster in tests.
pub struct MemoryBusNetwork {
    tx: broadcast::Sender<(BusNodeId, InvalidationMessage)>,
}

impl MemoryBusNetwork {
    /// Create a new bus network.
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(256);
        Self { tx }
    }

    /// Connect a new node to this network.
    pub fn connect(&self) -> MemoryBus {
        MemoryBus {
            node_id: BusNodeId::random(),
            tx: self.tx.clone(),
        }
    }
}

impl Default for MemoryBusNetwork {
    fn default() -> Self {
        Self::new()
    }
}

/// In-process messaging implementation over a broadcast channel.
pub struct MemoryBus {
    node_id: BusNodeId,
    tx: broadcast::Sender<(BusNodeId, InvalidationMessage)>,
}

#[async_trait]
impl Messaging for MemoryBus {
    async fn publish(&self, message: InvalidationMessage) -> Result<()> {
        // Exercise the wire encoding even in-process, so a message that a
        // real transport could not carry fails here too.
        let bytes = message.to_bytes()?;
        let decoded = InvalidationMessage::from_bytes(&bytes)?;

        // A send error only means no subscribers exist, which is fine.
        let _ = self.tx.send((self.node_id, decoded));
        Ok(())
    }

    fn subscribe(&self) -> InvalidationReceiver {
        InvalidationReceiver {
            rx: self.tx.subscribe(),
        }
    }

    fn local_node_id(&self) -> BusNodeId {
        self.node_id
    }
}
