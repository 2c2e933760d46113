//! Permission calculation.
//!
//! Reduces a precedence-ordered node list into a frozen permission mapping.
//! The first occurrence of a literal key fixes its value; denials participate
//! in precedence exactly like grants. Wildcard nodes are kept as ordered
//! rules and only expanded against a permission universe at consumption time.

use std::collections::HashMap;

use trellis_core::ContextSet;

use crate::resolver::Resolution;

/// Three-valued lookup result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tristate {
    /// Explicitly granted.
    True,
    /// Explicitly denied.
    False,
    /// No node applies.
    Undefined,
}

impl Tristate {
    /// Collapse to a boolean, treating `Undefined` as `false`.
    pub fn as_bool(self) -> bool {
        self == Tristate::True
    }
}

impl From<bool> for Tristate {
    fn from(value: bool) -> Self {
        if value {
            Tristate::True
        } else {
            Tristate::False
        }
    }
}

/// The calculated, immutable permission data for one (holder, context set).
///
/// Frozen after construction; concurrent readers rely on it never mutating.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct PermissionData {
    /// Literal key -> value, first match already applied.
    permissions: HashMap<String, bool>,

    /// Wildcard rules (stem, value) in precedence order, unexpanded.
    wildcards: Vec<(String, bool)>,

    /// Meta attribute key -> value.
    meta: HashMap<String, String>,

    /// (weight, text) prefix entries, one per weight, precedence applied.
    prefixes: Vec<(i32, String)>,

    /// (weight, text) suffix entries, one per weight, precedence applied.
    suffixes: Vec<(i32, String)>,
}

impl PermissionData {
    /// An empty permission set (the result for an unknown holder).
    pub fn empty() -> Self {
        Self::default()
    }

    /// Look up one permission key.
    ///
    /// Consults literal entries first, then wildcard rules in precedence
    /// order, so a literal always beats a wildcard even when both came from
    /// nodes at equal precedence.
    pub fn check(&self, key: &str) -> Tristate {
        if let Some(&value) = self.permissions.get(key) {
            return value.into();
        }
        for (stem, value) in &self.wildcards {
            if wildcard_matches(stem, key) {
                return (*value).into();
            }
        }
        Tristate::Undefined
    }

    /// The literal permission map.
    pub fn permission_map(&self) -> &HashMap<String, bool> {
        &self.permissions
    }

    /// The unexpanded wildcard rules in precedence order.
    pub fn wildcard_rules(&self) -> &[(String, bool)] {
        &self.wildcards
    }

    /// Look up a meta attribute.
    pub fn meta(&self, key: &str) -> Option<&str> {
        self.meta.get(key).map(String::as_str)
    }

    /// The full meta attribute map.
    pub fn meta_map(&self) -> &HashMap<String, String> {
        &self.meta
    }

    /// The highest-weight prefix, if any.
    pub fn best_prefix(&self) -> Option<&str> {
        best_chat_meta(&self.prefixes)
    }

    /// The highest-weight suffix, if any.
    pub fn best_suffix(&self) -> Option<&str> {
        best_chat_meta(&self.suffixes)
    }

    /// Expand against a reference permission universe.
    ///
    /// Produces a literal map covering every universe key any rule decides,
    /// with literal entries taking precedence over wildcard matches.
    pub fn expand(&self, universe: &[&str]) -> HashMap<String, bool> {
        let mut out = self.permissions.clone();
        for key in universe {
            if out.contains_key(*key) {
                continue;
            }
            for (stem, value) in &self.wildcards {
                if wildcard_matches(stem, key) {
                    out.insert((*key).to_string(), *value);
                    break;
                }
            }
        }
        out
    }

    /// True if nothing was granted or denied.
    pub fn is_empty(&self) -> bool {
        self.permissions.is_empty()
            && self.wildcards.is_empty()
            && self.meta.is_empty()
            && self.prefixes.is_empty()
            && self.suffixes.is_empty()
    }
}

fn wildcard_matches(stem: &str, key: &str) -> bool {
    // The root wildcard ("*") matches every key; "a.b.*" matches "a.b.c"
    // but not "a.b" itself.
    stem.is_empty() || key.strip_prefix(stem).is_some_and(|rest| rest.starts_with('.'))
}

fn best_chat_meta(entries: &[(i32, String)]) -> Option<&str> {
    entries
        .iter()
        .max_by_key(|(weight, _)| *weight)
        .map(|(_, text)| text.as_str())
}

/// Reduce a resolution into frozen permission data.
///
/// Nodes are consumed in precedence order; the context check is repeated
/// here so the reduction is correct even for node lists that did not come
/// from the resolver.
pub fn calculate(resolution: &Resolution, active: &ContextSet) -> PermissionData {
    let mut data = PermissionData::default();

    for resolved in &resolution.nodes {
        let node = &resolved.node;
        if !node.matches_context(active) {
            continue;
        }

        if let Some((key, value)) = node.meta_entry() {
            data.meta
                .entry(key.to_string())
                .or_insert_with(|| value.to_string());
            continue;
        }
        if let Some((weight, text)) = node.prefix_entry() {
            if !data.prefixes.iter().any(|(w, _)| *w == weight) {
                data.prefixes.push((weight, text.to_string()));
            }
            continue;
        }
        if let Some((weight, text)) = node.suffix_entry() {
            if !data.suffixes.iter().any(|(w, _)| *w == weight) {
                data.suffixes.push((weight, text.to_string()));
            }
            continue;
        }
        if let Some(stem) = node.wildcard_stem() {
            if !data.wildcards.iter().any(|(s, _)| s == stem) {
                data.wildcards.push((stem.to_string(), node.value()));
            }
            continue;
        }

        data.permissions
            .entry(node.key().to_string())
            .or_insert_with(|| node.value());
    }

    data
}
