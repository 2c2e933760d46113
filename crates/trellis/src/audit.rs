//! Audit trail for permission mutations.
//!
//! Every engine mutation records one entry describing who changed what.
//! The [`AuditLog`] trait keeps the sink pluggable; the default sink emits
//! structured log events, and tests capture entries in memory.

use std::sync::Mutex;

use tracing::info;

use trellis_core::HolderRef;

/// One recorded mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditEntry {
    /// Who performed the change, if attributable. Housekeeping sweeps and
    /// remote invalidations have no actor.
    pub actor: Option<HolderRef>,
    /// The holder that was changed.
    pub target: HolderRef,
    /// What happened, e.g. `"node add fly"` or `"promote staff mod -> admin"`.
    pub action: String,
    /// Unix milliseconds when the change was recorded.
    pub at: i64,
}

impl AuditEntry {
    /// Build an entry timestamped now.
    pub fn new(target: HolderRef, action: impl Into<String>) -> Self {
        Self {
            actor: None,
            target,
            action: action.into(),
            at: crate::now_millis(),
        }
    }

    /// Attribute the entry to an actor.
    pub fn by(mut self, actor: HolderRef) -> Self {
        self.actor = Some(actor);
        self
    }
}

/// Sink for audit entries.
pub trait AuditLog: Send + Sync {
    /// Record one entry. Must not fail; a sink that can lose entries should
    /// log the loss itself.
    fn record(&self, entry: AuditEntry);
}

/// Default sink: each entry becomes one structured log event.
#[derive(Debug, Default)]
pub struct TracingAudit;

impl AuditLog for TracingAudit {
    fn record(&self, entry: AuditEntry) {
        match &entry.actor {
            Some(actor) => info!(
                target = %entry.target,
                actor = %actor,
                at = entry.at,
                "audit: {}",
                entry.action
            ),
            None => info!(
                target = %entry.target,
                at = entry.at,
                "audit: {}",
                entry.action
            ),
        }
    }
}

/// In-memory sink for tests.
#[derive(Debug, Default)]
pub struct MemoryAudit {
    entries: Mutex<Vec<AuditEntry>>,
}

impl MemoryAudit {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all recorded entries, oldest first.
    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries.lock().unwrap().clone()
    }

    /// Number of recorded entries.
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    /// True if nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().unwrap().is_empty()
    }
}

impl AuditLog for MemoryAudit {
    fn record(&self, entry: AuditEntry) {
        self.entries.lock().unwrap().push(entry);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trellis_core::{GroupName, UserId};

    #[test]
    fn test_memory_audit_preserves_order() {
        let audit = MemoryAudit::new();
        let user = HolderRef::User(UserId::from_bytes([1; 16]));
        let group = HolderRef::Group(GroupName::new("admin").unwrap());

        audit.record(AuditEntry::new(user.clone(), "node add fly"));
        audit.record(AuditEntry::new(group, "node remove fly").by(user.clone()));

        let entries = audit.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].action, "node add fly");
        assert_eq!(entries[0].actor, None);
        assert_eq!(entries[1].actor, Some(user));
    }
}
