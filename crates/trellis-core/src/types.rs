//! Strong identifier types for Trellis holders.
//!
//! All identifiers are newtypes to prevent misuse at compile time.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::CoreError;

/// A 16-byte stable user identifier.
///
/// Users are identified by id, not by display name; names may change or be
/// absent, the id never does.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(pub [u8; 16]);

impl UserId {
    /// Create a new UserId from raw bytes.
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// Generate a random user id.
    pub fn random() -> Self {
        use rand::Rng;
        Self(rand::thread_rng().gen())
    }

    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from hex string.
    pub fn from_hex(s: &str) -> Result<Self, CoreError> {
        let bytes = hex::decode(s).map_err(|e| CoreError::InvalidUserId(e.to_string()))?;
        let arr: [u8; 16] = bytes
            .try_into()
            .map_err(|_| CoreError::InvalidUserId(format!("wrong length: {s:?}")))?;
        Ok(Self(arr))
    }

    /// The zero user id (used as a sentinel in tests).
    pub const ZERO: Self = Self([0u8; 16]);
}

impl fmt::Debug for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UserId({})", self.to_hex())
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl From<[u8; 16]> for UserId {
    fn from(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }
}

/// A validated group name.
///
/// Group names are case-insensitive; they are normalized to lowercase on
/// construction so lookups and equality never depend on input casing.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct GroupName(String);

impl GroupName {
    /// Validate and normalize a group name.
    pub fn new(name: impl Into<String>) -> Result<Self, CoreError> {
        let name = name.into();
        validate_name(&name)?;
        Ok(Self(name.to_lowercase()))
    }

    /// The name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// Deserialization goes through the validating constructor, so a storage
// backend cannot hand back names that skip normalization.
impl TryFrom<String> for GroupName {
    type Error = CoreError;

    fn try_from(name: String) -> Result<Self, CoreError> {
        Self::new(name)
    }
}

impl From<GroupName> for String {
    fn from(name: GroupName) -> Self {
        name.0
    }
}

impl fmt::Debug for GroupName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GroupName({:?})", self.0)
    }
}

impl fmt::Display for GroupName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A validated track name, same rules as [`GroupName`].
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TrackName(String);

impl TrackName {
    /// Validate and normalize a track name.
    pub fn new(name: impl Into<String>) -> Result<Self, CoreError> {
        let name = name.into();
        validate_name(&name)?;
        Ok(Self(name.to_lowercase()))
    }

    /// The name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for TrackName {
    type Error = CoreError;

    fn try_from(name: String) -> Result<Self, CoreError> {
        Self::new(name)
    }
}

impl From<TrackName> for String {
    fn from(name: TrackName) -> Self {
        name.0
    }
}

impl fmt::Debug for TrackName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TrackName({:?})", self.0)
    }
}

impl fmt::Display for TrackName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn validate_name(name: &str) -> Result<(), CoreError> {
    if name.is_empty() || name.chars().any(char::is_whitespace) {
        return Err(CoreError::InvalidName(name.to_string()));
    }
    Ok(())
}

/// A reference to any permission holder in the graph.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum HolderRef {
    /// A user, by stable id.
    User(UserId),
    /// A group, by name.
    Group(GroupName),
}

impl HolderRef {
    /// The group name, if this references a group.
    pub fn as_group(&self) -> Option<&GroupName> {
        match self {
            HolderRef::Group(name) => Some(name),
            HolderRef::User(_) => None,
        }
    }

    /// The user id, if this references a user.
    pub fn as_user(&self) -> Option<UserId> {
        match self {
            HolderRef::User(id) => Some(*id),
            HolderRef::Group(_) => None,
        }
    }
}

impl fmt::Display for HolderRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HolderRef::User(id) => write!(f, "user/{id}"),
            HolderRef::Group(name) => write!(f, "group/{name}"),
        }
    }
}

impl From<UserId> for HolderRef {
    fn from(id: UserId) -> Self {
        HolderRef::User(id)
    }
}

impl From<GroupName> for HolderRef {
    fn from(name: GroupName) -> Self {
        HolderRef::Group(name)
    }
}
