//! Invalidation message types.
//!
//! When one cluster member mutates shared permission data it broadcasts an
//! invalidation so every other member drops its cached results for the
//! affected holder.

use serde::{Deserialize, Serialize};

use trellis_core::HolderRef;

use crate::error::SyncError;

/// Unique identifier for a node on the invalidation bus.
///
/// Used to ignore a node's own broadcasts when they loop back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BusNodeId(pub [u8; 16]);

impl BusNodeId {
    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Generate a random bus node id.
    pub fn random() -> Self {
        use rand::Rng;
        Self(rand::thread_rng().gen())
    }
}

/// A cache-invalidation signal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvalidationMessage {
    /// Invalidate cached data for one holder.
    Holder(HolderRef),

    /// Invalidate every cached result on the receiving node.
    All,
}

impl InvalidationMessage {
    /// Serialize to CBOR bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, SyncError> {
        let mut buf = Vec::new();
        ciborium::into_writer(self, &mut buf).map_err(|e| SyncError::Encode(e.to_string()))?;
        Ok(buf)
    }

    /// Deserialize from CBOR bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SyncError> {
        ciborium::from_reader(bytes).map_err(|e| SyncError::Decode(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trellis_core::{GroupName, UserId};

    #[test]
    fn test_message_roundtrip_holder() {
        let msg = InvalidationMessage::Holder(HolderRef::User(UserId::from_bytes([9; 16])));
        let bytes = msg.to_bytes().unwrap();
        assert_eq!(InvalidationMessage::from_bytes(&bytes).unwrap(), msg);
    }

    #[test]
    fn test_message_roundtrip_group_and_all() {
        let group = InvalidationMessage::Holder(HolderRef::Group(
            GroupName::new("admin").unwrap(),
        ));
        let bytes = group.to_bytes().unwrap();
        assert_eq!(InvalidationMessage::from_bytes(&bytes).unwrap(), group);

        let all = InvalidationMessage::All;
        let bytes = all.to_bytes().unwrap();
        assert_eq!(InvalidationMessage::from_bytes(&bytes).unwrap(), all);
    }

    #[test]
    fn test_decode_garbage_fails() {
        assert!(InvalidationMessage::from_bytes(&[0xff, 0x00, 0x13]).is_err());
    }
}
