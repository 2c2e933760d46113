//! Ordered, mutable node collections with atomic snapshots.
//!
//! Each holder exclusively owns one collection. Readers take cheap `Arc`
//! snapshots; `replace_all` swaps the whole set atomically so a reader sees
//! either the old or the new set, never a partial mix.

use std::sync::{Arc, RwLock};

use crate::node::Node;

/// An ordered collection of nodes owned by one holder.
///
/// Duplicate-key nodes are permitted; precedence among duplicates is the
/// calculator's concern. Insertion order is preserved and is significant.
#[derive(Debug, Default)]
pub struct NodeCollection {
    inner: RwLock<Arc<Vec<Node>>>,
}

impl NodeCollection {
    /// Create an empty collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a collection from existing nodes, preserving order.
    pub fn from_nodes(nodes: Vec<Node>) -> Self {
        Self {
            inner: RwLock::new(Arc::new(nodes)),
        }
    }

    /// Take a snapshot of the current node set.
    ///
    /// The snapshot is immutable and safe to iterate while the collection
    /// keeps mutating.
    pub fn snapshot(&self) -> Arc<Vec<Node>> {
        Arc::clone(&self.inner.read().unwrap())
    }

    /// Append a node.
    pub fn add(&self, node: Node) {
        let mut guard = self.inner.write().unwrap();
        let mut nodes = (**guard).clone();
        nodes.push(node);
        *guard = Arc::new(nodes);
    }

    /// Remove the first node equal to `node` (full equality).
    ///
    /// Returns whether a node was removed.
    pub fn remove(&self, node: &Node) -> bool {
        let mut guard = self.inner.write().unwrap();
        let Some(pos) = guard.iter().position(|n| n == node) else {
            return false;
        };
        let mut nodes = (**guard).clone();
        nodes.remove(pos);
        *guard = Arc::new(nodes);
        true
    }

    /// Remove every node whose expiry has elapsed at `now`.
    ///
    /// Returns the removed nodes so callers can audit each removal.
    pub fn remove_expired(&self, now: i64) -> Vec<Node> {
        let mut guard = self.inner.write().unwrap();
        if !guard.iter().any(|n| n.is_expired(now)) {
            return Vec::new();
        }
        let (expired, kept): (Vec<Node>, Vec<Node>) =
            guard.iter().cloned().partition(|n| n.is_expired(now));
        *guard = Arc::new(kept);
        expired
    }

    /// Atomically replace the entire node set.
    pub fn replace_all(&self, nodes: Vec<Node>) {
        *self.inner.write().unwrap() = Arc::new(nodes);
    }

    /// Number of nodes.
    pub fn len(&self) -> usize {
        self.inner.read().unwrap().len()
    }

    /// True if the collection holds no nodes.
    pub fn is_empty(&self) -> bool {
        self.inner.read().unwrap().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(key: &str) -> Node {
        Node::builder(key).build()
    }

    #[test]
    fn test_add_preserves_order() {
        let coll = NodeCollection::new();
        coll.add(node("a"));
        coll.add(node("b"));
        coll.add(node("a"));

        let snap = coll.snapshot();
        let keys: Vec<&str> = snap.iter().map(|n| n.key()).collect();
        assert_eq!(keys, vec!["a", "b", "a"]);
    }

    #[test]
    fn test_remove_first_match_only() {
        let coll = NodeCollection::new();
        coll.add(node("a"));
        coll.add(node("a"));

        assert!(coll.remove(&node("a")));
        assert_eq!(coll.len(), 1);
        assert!(coll.remove(&node("a")));
        assert!(!coll.remove(&node("a")));
    }

    #[test]
    fn test_remove_requires_full_equality() {
        let coll = NodeCollection::new();
        coll.add(Node::builder("fly").context("world", "nether").build());

        assert!(!coll.remove(&node("fly")));
        assert_eq!(coll.len(), 1);
    }

    #[test]
    fn test_snapshot_unaffected_by_later_mutation() {
        let coll = NodeCollection::new();
        coll.add(node("a"));

        let snap = coll.snapshot();
        coll.replace_all(vec![node("b"), node("c")]);

        assert_eq!(snap.len(), 1);
        assert_eq!(snap[0].key(), "a");
        assert_eq!(coll.len(), 2);
    }

    #[test]
    fn test_remove_expired() {
        let coll = NodeCollection::new();
        coll.add(Node::builder("old").expiry(100).build());
        coll.add(node("keep"));
        coll.add(Node::builder("older").expiry(50).build());

        let removed = coll.remove_expired(200);
        let removed_keys: Vec<&str> = removed.iter().map(|n| n.key()).collect();
        assert_eq!(removed_keys, vec!["old", "older"]);

        let snap = coll.snapshot();
        assert_eq!(snap.len(), 1);
        assert_eq!(snap[0].key(), "keep");

        assert!(coll.remove_expired(200).is_empty());
    }
}
