//! Permission nodes.
//!
//! A node is a single grant or denial of one permission key, optionally
//! restricted to contexts and optionally expiring. Nodes are immutable once
//! built; precedence between duplicate keys is resolved by the calculator,
//! never here.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::context::ContextSet;
use crate::types::HolderRef;

/// Marker suffix for wildcard nodes.
const WILDCARD_SUFFIX: &str = ".*";

/// Key prefixes for non-boolean attributes carried as nodes.
const META_PREFIX: &str = "meta.";
const PREFIX_PREFIX: &str = "prefix.";
const SUFFIX_PREFIX: &str = "suffix.";

/// An immutable permission grant or denial.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    key: String,
    value: bool,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    contexts: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    expiry: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    source: Option<HolderRef>,
}

impl Node {
    /// Start building a node for the given permission key.
    pub fn builder(key: impl Into<String>) -> NodeBuilder {
        NodeBuilder {
            key: key.into(),
            value: true,
            contexts: BTreeMap::new(),
            expiry: None,
            source: None,
        }
    }

    /// The permission key.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Grant (`true`) or denial (`false`).
    pub fn value(&self) -> bool {
        self.value
    }

    /// The context restrictions, empty for a global node.
    pub fn contexts(&self) -> &BTreeMap<String, String> {
        &self.contexts
    }

    /// Expiry timestamp in unix milliseconds, if temporary.
    pub fn expiry(&self) -> Option<i64> {
        self.expiry
    }

    /// The holder that granted this node, if recorded.
    pub fn source(&self) -> Option<&HolderRef> {
        self.source.as_ref()
    }

    /// True if this node carries an expiry.
    pub fn is_temporary(&self) -> bool {
        self.expiry.is_some()
    }

    /// True if the expiry timestamp has elapsed.
    pub fn is_expired(&self, now: i64) -> bool {
        self.expiry.is_some_and(|at| now > at)
    }

    /// Check this node's restrictions against the active contexts.
    pub fn matches_context(&self, active: &ContextSet) -> bool {
        active.satisfies(&self.contexts)
    }

    /// Equality for override detection: same key and same contexts.
    ///
    /// Value and expiry may differ between otherwise-equal nodes; which one
    /// wins is decided by precedence ordering, not here.
    pub fn equals_ignoring_value(&self, other: &Node) -> bool {
        self.key == other.key && self.contexts == other.contexts
    }

    /// The stem of a wildcard key (`"server.*"` -> `"server"`, `"*"` -> `""`).
    ///
    /// Returns `None` for literal keys.
    pub fn wildcard_stem(&self) -> Option<&str> {
        if self.key == "*" {
            Some("")
        } else {
            self.key.strip_suffix(WILDCARD_SUFFIX)
        }
    }

    /// Parse a `meta.<key>.<value>` node into its attribute pair.
    pub fn meta_entry(&self) -> Option<(&str, &str)> {
        let rest = self.key.strip_prefix(META_PREFIX)?;
        rest.split_once('.')
    }

    /// Parse a `prefix.<weight>.<text>` node.
    pub fn prefix_entry(&self) -> Option<(i32, &str)> {
        parse_chat_meta(&self.key, PREFIX_PREFIX)
    }

    /// Parse a `suffix.<weight>.<text>` node.
    pub fn suffix_entry(&self) -> Option<(i32, &str)> {
        parse_chat_meta(&self.key, SUFFIX_PREFIX)
    }

    /// Copy of this node attributed to the given source holder.
    pub fn attributed_to(&self, source: HolderRef) -> Node {
        Node {
            source: Some(source),
            ..self.clone()
        }
    }
}

fn parse_chat_meta<'a>(key: &'a str, prefix: &str) -> Option<(i32, &'a str)> {
    let rest = key.strip_prefix(prefix)?;
    let (weight, text) = rest.split_once('.')?;
    let weight: i32 = weight.parse().ok()?;
    Some((weight, text))
}

/// Builder for [`Node`].
#[derive(Debug, Clone)]
pub struct NodeBuilder {
    key: String,
    value: bool,
    contexts: BTreeMap<String, String>,
    expiry: Option<i64>,
    source: Option<HolderRef>,
}

impl NodeBuilder {
    /// Set the grant value (defaults to `true`).
    pub fn value(mut self, value: bool) -> Self {
        self.value = value;
        self
    }

    /// Shorthand for `.value(false)`.
    pub fn negated(self) -> Self {
        self.value(false)
    }

    /// Set the expiry timestamp (unix milliseconds).
    pub fn expiry(mut self, at: i64) -> Self {
        self.expiry = Some(at);
        self
    }

    /// Restrict to a context key/value pair.
    pub fn context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.contexts.insert(key.into(), value.into());
        self
    }

    /// Record the granting holder.
    pub fn source(mut self, source: HolderRef) -> Self {
        self.source = Some(source);
        self
    }

    /// Finish building.
    pub fn build(self) -> Node {
        Node {
            key: self.key,
            value: self.value,
            contexts: self.contexts,
            expiry: self.expiry,
            source: self.source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let node = Node::builder("server.manage").build();
        assert_eq!(node.key(), "server.manage");
        assert!(node.value());
        assert!(node.contexts().is_empty());
        assert!(!node.is_temporary());
    }

    #[test]
    fn test_expiry() {
        let node = Node::builder("fly").expiry(1000).build();
        assert!(node.is_temporary());
        assert!(!node.is_expired(999));
        assert!(!node.is_expired(1000));
        assert!(node.is_expired(1001));
    }

    #[test]
    fn test_context_matching() {
        let node = Node::builder("fly").context("world", "overworld").build();
        let nether = ContextSet::new().with("world", "nether");
        let overworld = ContextSet::new().with("world", "overworld");

        assert!(!node.matches_context(&nether));
        assert!(node.matches_context(&overworld));
        assert!(!node.matches_context(&ContextSet::new()));
    }

    #[test]
    fn test_equals_ignoring_value() {
        let grant = Node::builder("fly").context("world", "nether").build();
        let denial = Node::builder("fly")
            .context("world", "nether")
            .negated()
            .expiry(5000)
            .build();
        let other = Node::builder("fly").build();

        assert!(grant.equals_ignoring_value(&denial));
        assert!(!grant.equals_ignoring_value(&other));
        assert_ne!(grant, denial);
    }

    #[test]
    fn test_wildcard_stem() {
        assert_eq!(Node::builder("server.*").build().wildcard_stem(), Some("server"));
        assert_eq!(Node::builder("*").build().wildcard_stem(), Some(""));
        assert_eq!(Node::builder("server.manage").build().wildcard_stem(), None);
    }

    #[test]
    fn test_meta_entry() {
        let node = Node::builder("meta.theme.dark").build();
        assert_eq!(node.meta_entry(), Some(("theme", "dark")));
        assert_eq!(Node::builder("meta.broken").build().meta_entry(), None);
        assert_eq!(Node::builder("plain.key").build().meta_entry(), None);
    }

    #[test]
    fn test_chat_meta_entries() {
        let prefix = Node::builder("prefix.100.[Admin]").build();
        assert_eq!(prefix.prefix_entry(), Some((100, "[Admin]")));
        assert_eq!(prefix.suffix_entry(), None);

        let bad_weight = Node::builder("prefix.ten.[Admin]").build();
        assert_eq!(bad_weight.prefix_entry(), None);
    }
}
