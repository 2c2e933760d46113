//! # Trellis
//!
//! A permission resolution and caching engine.
//!
//! Holders (users and groups) carry permission nodes and inherit from groups
//! through weighted, context-restricted edges. The [`Engine`] resolves a
//! holder's effective permissions by breadth-first traversal of the
//! inheritance graph, reduces them with first-match-wins precedence, and
//! caches the result per (holder, context fingerprint) with single-flight
//! computation. Mutations invalidate affected caches locally and across a
//! cluster via the messaging bus.
//!
//! ## Layout
//!
//! - [`engine`] - The engine facade: loading, mutations, track moves
//! - [`resolver`] - Inheritance graph traversal
//! - [`calculator`] - Node list reduction into [`calculator::PermissionData`]
//! - [`cache`] - Per-holder caches and the cache manager
//! - [`registry`] - Arena of loaded holders
//! - [`scheduler`] / [`housekeeping`] - Background sweeps
//! - [`audit`] - Mutation audit trail

pub mod audit;
pub mod cache;
pub mod calculator;
pub mod config;
pub mod engine;
pub mod error;
pub mod housekeeping;
pub mod registry;
pub mod resolver;
pub mod scheduler;

pub use audit::{AuditEntry, AuditLog, MemoryAudit, TracingAudit};
pub use cache::{CacheManager, CacheOutcome, HolderCache};
pub use calculator::{calculate, PermissionData, Tristate};
pub use config::EngineConfig;
pub use engine::{Engine, PlatformHook};
pub use error::{EngineError, Result};
pub use registry::HolderRegistry;
pub use resolver::{resolve, Resolution, ResolvedNode};
pub use scheduler::{ManualScheduler, Scheduler, SchedulerBackend, TokioScheduler};

/// Current unix time in milliseconds.
pub(crate) fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
