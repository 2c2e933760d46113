//! Context sets, the context matching rule, and context fingerprints.
//!
//! A context set describes the active situation a permission lookup happens
//! in (for example `world=nether, server=lobby`). Nodes may be restricted to
//! specific contexts; the matcher decides whether a restriction is satisfied.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

/// The active situational key -> values mapping used to filter nodes.
///
/// Backed by ordered maps so iteration order is normalized regardless of
/// insertion order; this is what makes fingerprints stable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextSet {
    values: BTreeMap<String, BTreeSet<String>>,
}

impl ContextSet {
    /// Create an empty context set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insertion.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.add(key, value);
        self
    }

    /// Add a value for a key. Duplicate values are a no-op.
    pub fn add(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values
            .entry(key.into())
            .or_default()
            .insert(value.into());
    }

    /// Check whether the set contains the given key/value pair.
    pub fn contains(&self, key: &str, value: &str) -> bool {
        self.values.get(key).is_some_and(|vs| vs.contains(value))
    }

    /// True if no context is active.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Number of distinct keys.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Iterate over (key, values) in normalized order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &BTreeSet<String>)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// The context matching rule.
    ///
    /// A requirement set is satisfied iff every required (key, value) pair is
    /// present in this set. An empty requirement always matches (global node).
    pub fn satisfies(&self, required: &BTreeMap<String, String>) -> bool {
        required.iter().all(|(k, v)| self.contains(k, v))
    }

    /// Compute the normalized, order-independent fingerprint of this set.
    pub fn fingerprint(&self) -> ContextFingerprint {
        let mut hasher = blake3::Hasher::new();
        hasher.update(FINGERPRINT_DOMAIN);
        hasher.update(&(self.values.len() as u64).to_le_bytes());
        for (key, values) in &self.values {
            hash_str(&mut hasher, key);
            hasher.update(&(values.len() as u64).to_le_bytes());
            for value in values {
                hash_str(&mut hasher, value);
            }
        }
        ContextFingerprint(*hasher.finalize().as_bytes())
    }
}

impl FromIterator<(String, String)> for ContextSet {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        let mut set = ContextSet::new();
        for (k, v) in iter {
            set.add(k, v);
        }
        set
    }
}

const FINGERPRINT_DOMAIN: &[u8] = b"trellis.context.v1";

fn hash_str(hasher: &mut blake3::Hasher, s: &str) {
    hasher.update(&(s.len() as u64).to_le_bytes());
    hasher.update(s.as_bytes());
}

/// A 32-byte identifier derived from a normalized [`ContextSet`].
///
/// Equal context sets always produce equal fingerprints, independent of the
/// order contexts were added in. Used as the cache key for computed
/// permission data.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextFingerprint([u8; 32]);

impl ContextFingerprint {
    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for ContextFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContextFingerprint({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for ContextFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", &self.to_hex()[..16])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn required(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_empty_requirement_always_matches() {
        let active = ContextSet::new().with("world", "nether");
        assert!(active.satisfies(&required(&[])));
        assert!(ContextSet::new().satisfies(&required(&[])));
    }

    #[test]
    fn test_matching_requires_every_pair() {
        let active = ContextSet::new()
            .with("world", "nether")
            .with("server", "lobby");

        assert!(active.satisfies(&required(&[("world", "nether")])));
        assert!(active.satisfies(&required(&[("world", "nether"), ("server", "lobby")])));
        assert!(!active.satisfies(&required(&[("world", "overworld")])));
        assert!(!active.satisfies(&required(&[("world", "nether"), ("server", "smp")])));
    }

    #[test]
    fn test_missing_key_never_matches() {
        let active = ContextSet::new();
        assert!(!active.satisfies(&required(&[("world", "nether")])));
    }

    #[test]
    fn test_multi_value_key() {
        let active = ContextSet::new()
            .with("world", "nether")
            .with("world", "overworld");
        assert!(active.satisfies(&required(&[("world", "nether")])));
        assert!(active.satisfies(&required(&[("world", "overworld")])));
    }

    #[test]
    fn test_fingerprint_order_independent() {
        let a = ContextSet::new().with("world", "nether").with("server", "lobby");
        let b = ContextSet::new().with("server", "lobby").with("world", "nether");
        assert_eq!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn test_fingerprint_distinguishes_sets() {
        let empty = ContextSet::new();
        let one = ContextSet::new().with("world", "nether");
        let other = ContextSet::new().with("world", "overworld");

        assert_ne!(empty.fingerprint(), one.fingerprint());
        assert_ne!(one.fingerprint(), other.fingerprint());
    }

    #[test]
    fn test_fingerprint_key_value_boundaries() {
        // "ab" + "c" must not collide with "a" + "bc".
        let a = ContextSet::new().with("ab", "c");
        let b = ContextSet::new().with("a", "bc");
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    proptest! {
        #[test]
        fn prop_fingerprint_ignores_insertion_order(
            pairs in proptest::collection::vec(("[a-z]{1,8}", "[a-z]{1,8}"), 0..12),
            seed in any::<u64>(),
        ) {
            let forward: ContextSet = pairs.iter().cloned().collect();

            let mut shuffled = pairs.clone();
            // Cheap deterministic shuffle.
            let len = shuffled.len();
            if len > 1 {
                for i in 0..len {
                    let j = (seed as usize).wrapping_mul(i + 1) % len;
                    shuffled.swap(i, j);
                }
            }
            let reordered: ContextSet = shuffled.into_iter().collect();

            prop_assert_eq!(forward.fingerprint(), reordered.fingerprint());
        }
    }
}
