//! Periodic housekeeping sweeps.
//!
//! Two sweeps run on the engine's scheduler: the expiry sweep removes
//! temporary nodes and inheritance edges whose timestamp has elapsed from
//! every loaded holder, and the staleness sweep evicts old cache entries.
//! Expired data is also filtered at resolution time, so the sweeps reclaim
//! memory and fire audit entries rather than gate correctness.

use tracing::debug;

use trellis_core::HolderRef;

use crate::audit::{AuditEntry, AuditLog};
use crate::cache::CacheManager;
use crate::registry::HolderRegistry;

/// Remove expired nodes and edges from every loaded holder.
///
/// Each removal is audited without an actor. Holders that lost anything have
/// their caches invalidated, with descendant fan-out for groups. Returns the
/// number of nodes and edges removed.
pub fn sweep_expired(
    registry: &HolderRegistry,
    caches: &CacheManager,
    audit: &dyn AuditLog,
    now: i64,
) -> usize {
    let mut removed = 0;

    for user in registry.loaded_users() {
        let holder = user.holder_ref();
        let nodes = user.nodes().remove_expired(now);
        let edges = user.remove_expired_memberships(now);
        if nodes.is_empty() && edges.is_empty() {
            continue;
        }
        removed += nodes.len() + edges.len();
        record_removals(audit, &holder, &nodes, &edges);
        caches.invalidate_holder(&holder);
    }

    for group in registry.loaded_groups() {
        let holder = group.holder_ref();
        let nodes = group.nodes().remove_expired(now);
        let edges = group.remove_expired_parents(now);
        if nodes.is_empty() && edges.is_empty() {
            continue;
        }
        removed += nodes.len() + edges.len();
        record_removals(audit, &holder, &nodes, &edges);
        // A group's nodes flow to everything below it.
        caches.invalidate_with_descendants(group.name(), registry);
    }

    if removed > 0 {
        debug!(removed, "expiry sweep removed entries");
    }
    removed
}

fn record_removals(
    audit: &dyn AuditLog,
    holder: &HolderRef,
    nodes: &[trellis_core::Node],
    edges: &[trellis_core::InheritanceEdge],
) {
    for node in nodes {
        audit.record(AuditEntry::new(
            holder.clone(),
            format!("node expired {}", node.key()),
        ));
    }
    for edge in edges {
        audit.record(AuditEntry::new(
            holder.clone(),
            format!("membership expired {}", edge.group),
        ));
    }
}

/// Evict cache entries older than the configured maximum age.
pub fn sweep_stale_caches(caches: &CacheManager, max_age: std::time::Duration) -> usize {
    let evicted = caches.sweep_stale(max_age);
    if evicted > 0 {
        debug!(evicted, "cache sweep evicted stale entries");
    }
    evicted
}
