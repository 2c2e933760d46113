//! Test fixtures and helpers.
//!
//! Common setup code for integration tests: an engine over in-memory
//! storage, a manually-driven scheduler, and a capturing audit sink.

use std::sync::Arc;

use trellis::{Engine, EngineConfig, ManualScheduler, MemoryAudit, SchedulerBackend};
use trellis_core::{Group, GroupName, Node, TrackName, User, UserId};
use trellis_store::MemoryStorage;
use trellis_sync::MemoryBusNetwork;

/// A fully wired engine for tests.
///
/// Uses in-memory storage and the manual scheduler, so housekeeping only
/// runs when [`tick`] is called. The audit sink captures entries for
/// assertions.
///
/// [`tick`]: TestFixture::tick
pub struct TestFixture {
    pub engine: Arc<Engine>,
    pub storage: Arc<MemoryStorage>,
    pub scheduler: Arc<ManualScheduler>,
    pub audit: Arc<MemoryAudit>,
}

impl TestFixture {
    /// Create a standalone fixture with no messaging bus.
    pub fn new() -> Self {
        Self::build(Arc::new(MemoryStorage::new()), None, EngineConfig::default())
    }

    /// Create a standalone fixture with a custom config. The scheduler
    /// backend is forced to manual regardless of the config.
    pub fn with_config(config: EngineConfig) -> Self {
        Self::build(Arc::new(MemoryStorage::new()), None, config)
    }

    /// Create `count` fixtures sharing one storage backend and one
    /// invalidation bus, simulating a cluster.
    pub fn cluster(count: usize) -> Vec<Self> {
        Self::cluster_with_network(count).1
    }

    /// Like [`cluster`], also returning the bus network so tests can inject
    /// raw messages.
    ///
    /// [`cluster`]: TestFixture::cluster
    pub fn cluster_with_network(count: usize) -> (MemoryBusNetwork, Vec<Self>) {
        let storage = Arc::new(MemoryStorage::new());
        let network = MemoryBusNetwork::new();
        let fixtures = (0..count)
            .map(|_| {
                Self::build(
                    Arc::clone(&storage),
                    Some(&network),
                    EngineConfig::default(),
                )
            })
            .collect();
        (network, fixtures)
    }

    fn build(
        storage: Arc<MemoryStorage>,
        network: Option<&MemoryBusNetwork>,
        config: EngineConfig,
    ) -> Self {
        init_tracing();
        let scheduler = Arc::new(ManualScheduler::new());
        let audit = Arc::new(MemoryAudit::new());

        let config = EngineConfig {
            scheduler: SchedulerBackend::Manual,
            ..config
        };
        let storage_dyn = Arc::clone(&storage) as Arc<dyn trellis_store::Storage>;
        let scheduler_dyn = Arc::clone(&scheduler) as Arc<dyn trellis::Scheduler>;
        let audit_dyn = Arc::clone(&audit) as Arc<dyn trellis::AuditLog>;
        let mut engine = Engine::new(storage_dyn, config)
            .with_scheduler(scheduler_dyn)
            .with_audit(audit_dyn);
        if let Some(network) = network {
            engine = engine.with_messaging(Arc::new(network.connect()));
        }

        let engine = Arc::new(engine);
        engine.start();

        Self {
            engine,
            storage,
            scheduler,
            audit,
        }
    }

    /// Create and register a user with a random id.
    pub async fn seed_user(&self, name: &str) -> Arc<User> {
        self.engine
            .create_user(UserId::random(), Some(name.to_string()))
            .await
            .unwrap()
    }

    /// Create and register a group.
    pub async fn seed_group(&self, name: &str) -> Arc<Group> {
        self.engine.create_group(group(name)).await.unwrap()
    }

    /// Grant a permission key to a group.
    pub async fn grant_group(&self, name: &str, key: &str) {
        self.engine
            .add_group_node(&group(name), Node::builder(key).build())
            .await
            .unwrap()
    }

    /// Run every registered housekeeping sweep once.
    pub async fn tick(&self) -> usize {
        self.scheduler.tick().await
    }
}

impl Default for TestFixture {
    fn default() -> Self {
        Self::new()
    }
}

/// Route engine logs through the test harness. Safe to call repeatedly;
/// only the first call installs a subscriber.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// Parse a group name, panicking on invalid input.
pub fn group(name: &str) -> GroupName {
    GroupName::new(name).unwrap()
}

/// Parse a track name, panicking on invalid input.
pub fn track(name: &str) -> TrackName {
    TrackName::new(name).unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;
    use trellis_core::{ContextSet, HolderRef};

    #[tokio::test]
    async fn test_fixture_resolves_seeded_data() {
        let fixture = TestFixture::new();
        fixture.seed_group("admin").await;
        fixture.grant_group("admin", "fly").await;

        let data = fixture
            .engine
            .get_permission_data(&HolderRef::Group(group("admin")), &ContextSet::new())
            .await
            .unwrap();
        assert!(data.check("fly").as_bool());
    }

    #[tokio::test]
    async fn test_cluster_shares_storage() {
        let cluster = TestFixture::cluster(2);
        let user = cluster[0].seed_user("alice").await;

        let loaded = cluster[1].engine.load_user(user.id()).await.unwrap();
        assert_eq!(loaded.name().as_deref(), Some("alice"));
    }
}
