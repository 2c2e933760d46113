//! Inheritance graph resolution.
//!
//! Walks group membership and inheritance edges breadth-first, producing a
//! flattened node list in precedence order: a holder's own nodes first, then
//! inherited nodes by ascending traversal distance. First visit wins, which
//! both deduplicates diamond inheritance and breaks cycles.

use std::collections::{BTreeSet, VecDeque};
use std::sync::Arc;

use tracing::{debug, warn};

use trellis_core::{ContextSet, Group, GroupName, HolderRef, Node, User};

use crate::registry::HolderRegistry;

/// One node produced by a resolution pass, tagged with where it came from.
#[derive(Debug, Clone)]
pub struct ResolvedNode {
    /// The node itself.
    pub node: Node,
    /// Traversal distance of the owning holder (0 = the subject itself).
    pub distance: u32,
    /// The holder that owns the node.
    pub origin: HolderRef,
}

/// The outcome of one resolution pass.
#[derive(Debug, Default)]
pub struct Resolution {
    /// Context-filtered nodes in precedence order (highest first).
    pub nodes: Vec<ResolvedNode>,
    /// Group references that could not be resolved and were skipped.
    pub missing: Vec<GroupName>,
}

enum Frontier {
    User(Arc<User>),
    Group(Arc<Group>),
}

/// Resolve the full inherited node list for a holder under active contexts.
///
/// Never fails: unresolvable group references are skipped with a warning and
/// recorded in [`Resolution::missing`]; an unknown subject yields an empty
/// resolution.
pub fn resolve(
    registry: &HolderRegistry,
    subject: &HolderRef,
    active: &ContextSet,
    now: i64,
) -> Resolution {
    let mut resolution = Resolution::default();
    let mut visited: BTreeSet<GroupName> = BTreeSet::new();
    let mut queue: VecDeque<(Frontier, u32)> = VecDeque::new();

    match subject {
        HolderRef::User(id) => match registry.get_user(*id) {
            Some(user) => queue.push_back((Frontier::User(user), 0)),
            None => {
                warn!(user = %id, "resolution subject not loaded, returning empty set");
                return resolution;
            }
        },
        HolderRef::Group(name) => match registry.get_group(name) {
            Some(group) => {
                visited.insert(name.clone());
                queue.push_back((Frontier::Group(group), 0));
            }
            None => {
                warn!(group = %name, "resolution subject not loaded, returning empty set");
                resolution.missing.push(name.clone());
                return resolution;
            }
        },
    }

    while let Some((frontier, distance)) = queue.pop_front() {
        let (origin, snapshot, edges) = match &frontier {
            Frontier::User(user) => (user.holder_ref(), user.nodes().snapshot(), user.memberships()),
            Frontier::Group(group) => (group.holder_ref(), group.nodes().snapshot(), group.parents()),
        };

        for node in snapshot.iter() {
            if node.is_expired(now) || !node.matches_context(active) {
                continue;
            }
            resolution.nodes.push(ResolvedNode {
                node: node.clone(),
                distance,
                origin: origin.clone(),
            });
        }

        let mut active_edges: Vec<_> = edges
            .into_iter()
            .filter(|e| e.is_active(now, active))
            .collect();
        // Explicit weight first (descending), group name as the
        // deterministic tiebreak so sibling order is reproducible.
        active_edges.sort_by(|a, b| b.weight.cmp(&a.weight).then_with(|| a.group.cmp(&b.group)));

        for edge in active_edges {
            if Some(&edge.group) == origin.as_group() {
                warn!(group = %edge.group, "group inherits from itself, skipping back-edge");
                continue;
            }
            if !visited.insert(edge.group.clone()) {
                debug!(group = %edge.group, "group already visited, not re-expanding");
                continue;
            }
            match registry.get_group(&edge.group) {
                Some(group) => queue.push_back((Frontier::Group(group), distance + 1)),
                None => {
                    warn!(group = %edge.group, "inherited group not found, skipping branch");
                    resolution.missing.push(edge.group.clone());
                }
            }
        }
    }

    resolution
}

#[cfg(test)]
mod tests {
    use super::*;
    use trellis_core::{InheritanceEdge, UserId};

    fn group_name(s: &str) -> GroupName {
        GroupName::new(s).unwrap()
    }

    fn add_group(registry: &HolderRegistry, name: &str, keys: &[&str]) -> Arc<Group> {
        let group = Arc::new(Group::new(group_name(name)));
        for key in keys {
            group.nodes().add(Node::builder(*key).build());
        }
        registry.insert_group(Arc::clone(&group));
        group
    }

    fn keys(resolution: &Resolution) -> Vec<&str> {
        resolution.nodes.iter().map(|r| r.node.key()).collect()
    }

    #[test]
    fn test_own_nodes_outrank_inherited() {
        let registry = HolderRegistry::new();
        add_group(&registry, "admin", &["from.group"]);

        let user = Arc::new(User::new(UserId::random()));
        user.nodes().add(Node::builder("own").build());
        user.add_membership(InheritanceEdge::new(group_name("admin")));
        registry.insert_user(Arc::clone(&user));

        let resolution = resolve(
            &registry,
            &user.holder_ref(),
            &ContextSet::new(),
            0,
        );

        assert_eq!(keys(&resolution), vec!["own", "from.group"]);
        assert_eq!(resolution.nodes[0].distance, 0);
        assert_eq!(resolution.nodes[1].distance, 1);
        assert_eq!(resolution.nodes[1].origin, HolderRef::Group(group_name("admin")));
    }

    #[test]
    fn test_diamond_visits_grandparent_once() {
        let registry = HolderRegistry::new();
        let a = add_group(&registry, "a", &["a.node"]);
        let b = add_group(&registry, "b", &["b.node"]);
        add_group(&registry, "c", &["c.node"]);
        a.add_parent(InheritanceEdge::new(group_name("c")));
        b.add_parent(InheritanceEdge::new(group_name("c")));

        let user = Arc::new(User::new(UserId::random()));
        user.add_membership(InheritanceEdge::new(group_name("a")));
        user.add_membership(InheritanceEdge::new(group_name("b")));
        registry.insert_user(Arc::clone(&user));

        let resolution = resolve(&registry, &user.holder_ref(), &ContextSet::new(), 0);

        assert_eq!(keys(&resolution), vec!["a.node", "b.node", "c.node"]);
        let c_count = resolution
            .nodes
            .iter()
            .filter(|r| r.origin == HolderRef::Group(group_name("c")))
            .count();
        assert_eq!(c_count, 1);
    }

    #[test]
    fn test_cycle_terminates() {
        let registry = HolderRegistry::new();
        let a = add_group(&registry, "a", &["a.node"]);
        let b = add_group(&registry, "b", &["b.node"]);
        a.add_parent(InheritanceEdge::new(group_name("b")));
        b.add_parent(InheritanceEdge::new(group_name("a")));

        let resolution = resolve(
            &registry,
            &HolderRef::Group(group_name("a")),
            &ContextSet::new(),
            0,
        );

        assert_eq!(keys(&resolution), vec!["a.node", "b.node"]);
        assert!(resolution.missing.is_empty());
    }

    #[test]
    fn test_sibling_order_weight_then_name() {
        let registry = HolderRegistry::new();
        add_group(&registry, "zeta", &["zeta.node"]);
        add_group(&registry, "alpha", &["alpha.node"]);
        add_group(&registry, "heavy", &["heavy.node"]);

        let user = Arc::new(User::new(UserId::random()));
        user.add_membership(InheritanceEdge::new(group_name("zeta")));
        user.add_membership(InheritanceEdge::new(group_name("heavy")).with_weight(10));
        user.add_membership(InheritanceEdge::new(group_name("alpha")));
        registry.insert_user(Arc::clone(&user));

        let resolution = resolve(&registry, &user.holder_ref(), &ContextSet::new(), 0);

        // Weight 10 first, then equal-weight siblings by name.
        assert_eq!(keys(&resolution), vec!["heavy.node", "alpha.node", "zeta.node"]);
    }

    #[test]
    fn test_expired_and_context_filtered() {
        let registry = HolderRegistry::new();

        let user = Arc::new(User::new(UserId::random()));
        user.nodes().add(Node::builder("expired").expiry(100).build());
        user.nodes().add(Node::builder("global").build());
        user.nodes()
            .add(Node::builder("nether.only").context("world", "nether").build());
        registry.insert_user(Arc::clone(&user));

        let overworld = ContextSet::new().with("world", "overworld");
        let resolution = resolve(&registry, &user.holder_ref(), &overworld, 200);

        assert_eq!(keys(&resolution), vec!["global"]);
    }

    #[test]
    fn test_inactive_membership_not_followed() {
        let registry = HolderRegistry::new();
        add_group(&registry, "expired", &["expired.node"]);
        add_group(&registry, "lobbyonly", &["lobby.node"]);

        let user = Arc::new(User::new(UserId::random()));
        user.add_membership(InheritanceEdge::new(group_name("expired")).with_expiry(100));
        user.add_membership(
            InheritanceEdge::new(group_name("lobbyonly")).with_context("server", "lobby"),
        );
        registry.insert_user(Arc::clone(&user));

        let resolution = resolve(&registry, &user.holder_ref(), &ContextSet::new(), 200);
        assert!(keys(&resolution).is_empty());

        let lobby = ContextSet::new().with("server", "lobby");
        let resolution = resolve(&registry, &user.holder_ref(), &lobby, 200);
        assert_eq!(keys(&resolution), vec!["lobby.node"]);
    }

    #[test]
    fn test_missing_group_skipped_not_fatal() {
        let registry = HolderRegistry::new();
        add_group(&registry, "real", &["real.node"]);

        let user = Arc::new(User::new(UserId::random()));
        user.add_membership(InheritanceEdge::new(group_name("ghost")));
        user.add_membership(InheritanceEdge::new(group_name("real")));
        registry.insert_user(Arc::clone(&user));

        let resolution = resolve(&registry, &user.holder_ref(), &ContextSet::new(), 0);

        assert_eq!(keys(&resolution), vec!["real.node"]);
        assert_eq!(resolution.missing, vec![group_name("ghost")]);
    }

    #[test]
    fn test_unknown_subject_is_empty() {
        let registry = HolderRegistry::new();
        let resolution = resolve(
            &registry,
            &HolderRef::User(UserId::random()),
            &ContextSet::new(),
            0,
        );
        assert!(resolution.nodes.is_empty());
    }
}
