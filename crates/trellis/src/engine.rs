//! The permission engine: load, mutate, resolve, cache, invalidate.
//!
//! One `Engine` owns the holder registry, the cache manager, and the wiring
//! to storage, the invalidation bus, the scheduler, and the audit log. Every
//! mutation follows the same shape: mutate the live holder, audit, invalidate
//! caches, persist, broadcast to the cluster. Resolution never touches
//! storage; holders must be loaded first.

use std::sync::{Arc, RwLock};

use tracing::{debug, info, warn};

use trellis_core::{
    ContextSet, Group, GroupName, HolderRef, InheritanceEdge, Node, Track, TrackName, User,
    UserData, UserId,
};
use trellis_store::Storage;
use trellis_sync::{InvalidationMessage, Messaging, SyncError};

use crate::audit::{AuditEntry, AuditLog, TracingAudit};
use crate::cache::CacheManager;
use crate::calculator::{calculate, PermissionData, Tristate};
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::housekeeping;
use crate::registry::HolderRegistry;
use crate::resolver::resolve;
use crate::scheduler::{ManualScheduler, Scheduler, SchedulerBackend, TokioScheduler};

/// Callback surface for the embedding platform.
///
/// Notified whenever permission data is freshly computed so the platform can
/// push updates to live sessions.
pub trait PlatformHook: Send + Sync {
    /// Called after a cache miss produced new permission data.
    fn on_recalculated(&self, holder: &HolderRef, data: &Arc<PermissionData>);
}

/// The permission engine.
pub struct Engine {
    config: EngineConfig,
    storage: Arc<dyn Storage>,
    messaging: Option<Arc<dyn Messaging>>,
    scheduler: Arc<dyn Scheduler>,
    audit: Arc<dyn AuditLog>,
    registry: Arc<HolderRegistry>,
    caches: Arc<CacheManager>,
    hook: RwLock<Option<Arc<dyn PlatformHook>>>,
}

impl Engine {
    /// Create an engine over the given storage backend.
    ///
    /// The scheduler backend comes from the config; messaging is off until
    /// [`with_messaging`] wires a bus in.
    ///
    /// [`with_messaging`]: Engine::with_messaging
    pub fn new(storage: Arc<dyn Storage>, config: EngineConfig) -> Self {
        let scheduler: Arc<dyn Scheduler> = match config.scheduler {
            SchedulerBackend::Tokio => Arc::new(TokioScheduler::new()),
            SchedulerBackend::Manual => Arc::new(ManualScheduler::new()),
        };
        Self {
            config,
            storage,
            messaging: None,
            scheduler,
            audit: Arc::new(TracingAudit),
            registry: Arc::new(HolderRegistry::new()),
            caches: Arc::new(CacheManager::new()),
            hook: RwLock::new(None),
        }
    }

    /// Attach a cluster invalidation bus.
    pub fn with_messaging(mut self, messaging: Arc<dyn Messaging>) -> Self {
        self.messaging = Some(messaging);
        self
    }

    /// Replace the scheduler, keeping a handle for manual driving in tests.
    pub fn with_scheduler(mut self, scheduler: Arc<dyn Scheduler>) -> Self {
        self.scheduler = scheduler;
        self
    }

    /// Replace the audit sink.
    pub fn with_audit(mut self, audit: Arc<dyn AuditLog>) -> Self {
        self.audit = audit;
        self
    }

    /// The registry of loaded holders.
    pub fn registry(&self) -> &HolderRegistry {
        &self.registry
    }

    /// Register the platform callback. At most one hook may be registered.
    pub fn register_platform_hook(&self, hook: Arc<dyn PlatformHook>) -> Result<()> {
        let mut slot = self.hook.write().unwrap();
        if slot.is_some() {
            return Err(EngineError::HookAlreadyRegistered);
        }
        *slot = Some(hook);
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Lifecycle
    // ─────────────────────────────────────────────────────────────────────────

    /// Schedule housekeeping sweeps and the cluster invalidation listener.
    pub fn start(self: &Arc<Self>) {
        let engine = Arc::clone(self);
        self.scheduler.run_periodic(
            "expiry-sweep",
            self.config.expiry_sweep_interval,
            Arc::new(move || {
                let engine = Arc::clone(&engine);
                Box::pin(async move {
                    housekeeping::sweep_expired(
                        &engine.registry,
                        &engine.caches,
                        engine.audit.as_ref(),
                        crate::now_millis(),
                    );
                })
            }),
        );

        let engine = Arc::clone(self);
        self.scheduler.run_periodic(
            "cache-sweep",
            self.config.cache_sweep_interval,
            Arc::new(move || {
                let engine = Arc::clone(&engine);
                Box::pin(async move {
                    housekeeping::sweep_stale_caches(&engine.caches, engine.config.cache_max_age);
                })
            }),
        );

        if let Some(messaging) = self.messaging.clone() {
            let engine = Arc::clone(self);
            self.scheduler.run_async(
                "invalidation-listener",
                Box::pin(async move {
                    engine.listen(messaging).await;
                }),
            );
        }

        info!("engine started");
    }

    /// Stop all scheduled work.
    pub fn shutdown(&self) {
        self.scheduler.shutdown();
        info!("engine stopped");
    }

    async fn listen(&self, messaging: Arc<dyn Messaging>) {
        let local = messaging.local_node_id();
        let mut rx = messaging.subscribe();
        loop {
            match rx.recv().await {
                Ok((origin, _)) if origin == local => continue,
                Ok((origin, InvalidationMessage::Holder(holder))) => {
                    debug!(?origin, %holder, "remote invalidation");
                    // Our registry copy predates the remote mutation; refresh
                    // it from shared storage before dropping the caches.
                    self.refresh_holder(&holder).await;
                    match &holder {
                        HolderRef::Group(name) => {
                            self.caches.invalidate_with_descendants(name, &self.registry);
                        }
                        HolderRef::User(_) => self.caches.invalidate_holder(&holder),
                    }
                }
                Ok((origin, InvalidationMessage::All)) => {
                    debug!(?origin, "remote full invalidation");
                    self.caches.invalidate_all();
                }
                Err(SyncError::Lagged(missed)) => {
                    // Missed signals could be anything; drop every cache
                    // rather than serve data a missed signal invalidated.
                    warn!(missed, "invalidation bus lagged, dropping all caches");
                    self.caches.invalidate_all();
                }
                Err(err) => {
                    warn!(error = %err, "invalidation bus closed, listener exiting");
                    return;
                }
            }
        }
    }

    /// Reload a holder from storage if it is currently loaded. Holders we
    /// never loaded stay unloaded; a holder deleted remotely is unloaded.
    async fn refresh_holder(&self, holder: &HolderRef) {
        match holder {
            HolderRef::User(id) => {
                if self.registry.get_user(*id).is_none() {
                    return;
                }
                match self.storage.load_user(*id).await {
                    Ok(Some(data)) => {
                        self.registry.insert_user(Arc::new(User::from_data(data)));
                    }
                    Ok(None) => {
                        self.registry.remove_user(*id);
                    }
                    Err(err) => warn!(user = %id, error = %err, "failed to refresh user"),
                }
            }
            HolderRef::Group(name) => {
                if self.registry.get_group(name).is_none() {
                    return;
                }
                match self.storage.load_group(name).await {
                    Ok(Some(data)) => {
                        self.registry.insert_group(Arc::new(Group::from_data(data)));
                    }
                    Ok(None) => {
                        self.registry.remove_group(name);
                    }
                    Err(err) => warn!(group = %name, error = %err, "failed to refresh group"),
                }
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Loading and creation
    // ─────────────────────────────────────────────────────────────────────────

    /// Load a user into the registry, from storage if not already loaded.
    pub async fn load_user(&self, id: UserId) -> Result<Arc<User>> {
        if let Some(user) = self.registry.get_user(id) {
            return Ok(user);
        }
        let data = self
            .storage
            .load_user(id)
            .await?
            .ok_or(EngineError::NotFound(HolderRef::User(id)))?;
        let user = Arc::new(User::from_data(data));
        self.registry.insert_user(Arc::clone(&user));
        // An earlier lookup may have cached an empty result for this holder.
        self.caches.invalidate_holder(&user.holder_ref());
        Ok(user)
    }

    /// Load a user by display name.
    pub async fn load_user_by_name(&self, name: &str) -> Result<Arc<User>> {
        match self.storage.lookup_user_id(name).await? {
            Some(id) => self.load_user(id).await,
            None => Err(EngineError::UserNameNotFound(name.to_string())),
        }
    }

    /// Create, persist, and register a new user.
    pub async fn create_user(&self, id: UserId, name: Option<String>) -> Result<Arc<User>> {
        let user = Arc::new(User::from_data(UserData {
            id,
            name,
            nodes: Vec::new(),
            memberships: Vec::new(),
        }));
        self.storage.save_user(&user.to_data()).await?;
        self.registry.insert_user(Arc::clone(&user));
        self.caches.invalidate_holder(&user.holder_ref());
        self.audit
            .record(AuditEntry::new(user.holder_ref(), "user created"));
        Ok(user)
    }

    /// Load a group into the registry, from storage if not already loaded.
    pub async fn load_group(&self, name: &GroupName) -> Result<Arc<Group>> {
        if let Some(group) = self.registry.get_group(name) {
            return Ok(group);
        }
        let data = self
            .storage
            .load_group(name)
            .await?
            .ok_or_else(|| EngineError::GroupNotFound(name.clone()))?;
        let group = Arc::new(Group::from_data(data));
        self.registry.insert_group(Arc::clone(&group));
        self.caches
            .invalidate_with_descendants(name, &self.registry);
        Ok(group)
    }

    /// Load every stored group. Typically called once at startup so group
    /// inheritance resolves without storage round-trips.
    pub async fn load_all_groups(&self) -> Result<usize> {
        let names = self.storage.list_groups().await?;
        let count = names.len();
        for name in names {
            self.load_group(&name).await?;
        }
        debug!(count, "loaded all groups");
        Ok(count)
    }

    /// Create, persist, and register a new group.
    pub async fn create_group(&self, name: GroupName) -> Result<Arc<Group>> {
        let group = Arc::new(Group::new(name));
        self.storage.save_group(&group.to_data()).await?;
        self.registry.insert_group(Arc::clone(&group));
        self.audit
            .record(AuditEntry::new(group.holder_ref(), "group created"));
        Ok(group)
    }

    /// Load a track, from storage if not already loaded.
    pub async fn load_track(&self, name: &TrackName) -> Result<Arc<Track>> {
        if let Some(track) = self.registry.get_track(name) {
            return Ok(track);
        }
        let track = self
            .storage
            .load_track(name)
            .await?
            .ok_or_else(|| EngineError::TrackNotFound(name.clone()))?;
        let track = Arc::new(track);
        self.registry.insert_track(Arc::clone(&track));
        Ok(track)
    }

    /// Create, persist, and register a new track.
    pub async fn create_track(&self, name: TrackName, groups: Vec<GroupName>) -> Result<Arc<Track>> {
        let track = Arc::new(Track::new(name, groups)?);
        self.storage.save_track(&track).await?;
        self.registry.insert_track(Arc::clone(&track));
        Ok(track)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Resolution
    // ─────────────────────────────────────────────────────────────────────────

    /// Get (computing and caching if necessary) the permission data for a
    /// holder under the given active contexts.
    ///
    /// Concurrent calls for the same holder and context set share one
    /// computation and one resulting allocation. An unloaded holder yields
    /// empty data rather than an error.
    pub async fn get_permission_data(
        &self,
        subject: &HolderRef,
        active: &ContextSet,
    ) -> Result<Arc<PermissionData>> {
        let cache = self.caches.cache_for(subject);
        let outcome = cache
            .get_or_compute(active.fingerprint(), || {
                let resolution = resolve(&self.registry, subject, active, crate::now_millis());
                let data = Arc::new(calculate(&resolution, active));
                async move { Ok::<_, EngineError>(data) }
            })
            .await?;

        if outcome.fresh {
            if let Some(hook) = self.hook.read().unwrap().clone() {
                hook.on_recalculated(subject, &outcome.data);
            }
        }
        Ok(outcome.data)
    }

    /// Check one permission key for a holder.
    pub async fn check(
        &self,
        subject: &HolderRef,
        key: &str,
        active: &ContextSet,
    ) -> Result<Tristate> {
        Ok(self.get_permission_data(subject, active).await?.check(key))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // User mutations
    // ─────────────────────────────────────────────────────────────────────────

    /// Grant or deny a permission node on a user.
    pub async fn add_user_node(&self, id: UserId, node: Node) -> Result<()> {
        let user = self.load_user(id).await?;
        let action = format!("node add {}", node.key());
        user.nodes().add(node);
        self.finish_user_mutation(&user, action).await
    }

    /// Remove a node from a user. Returns false if no matching node existed.
    pub async fn remove_user_node(&self, id: UserId, node: &Node) -> Result<bool> {
        let user = self.load_user(id).await?;
        if !user.nodes().remove(node) {
            return Ok(false);
        }
        self.finish_user_mutation(&user, format!("node remove {}", node.key()))
            .await?;
        Ok(true)
    }

    /// Add a group membership to a user. Returns false if the identical edge
    /// already existed.
    pub async fn add_membership(&self, id: UserId, edge: InheritanceEdge) -> Result<bool> {
        let user = self.load_user(id).await?;
        let action = format!("membership add {}", edge.group);
        if !user.add_membership(edge) {
            return Ok(false);
        }
        self.finish_user_mutation(&user, action).await?;
        Ok(true)
    }

    /// Remove every membership edge to a group from a user.
    pub async fn remove_membership(&self, id: UserId, group: &GroupName) -> Result<bool> {
        let user = self.load_user(id).await?;
        if !user.remove_membership(group) {
            return Ok(false);
        }
        self.finish_user_mutation(&user, format!("membership remove {group}"))
            .await?;
        Ok(true)
    }

    /// Replace `to`'s nodes and memberships with a copy of `from`'s.
    pub async fn clone_user(&self, from: UserId, to: UserId) -> Result<()> {
        let source = self.load_user(from).await?;
        let target = self.load_user(to).await?;

        let rebuilt = Arc::new(User::from_data(UserData {
            id: to,
            name: target.name(),
            nodes: source.nodes().snapshot().as_ref().clone(),
            memberships: source.memberships(),
        }));
        self.registry.insert_user(Arc::clone(&rebuilt));
        self.finish_user_mutation(&rebuilt, format!("cloned from user/{from}"))
            .await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Group mutations
    // ─────────────────────────────────────────────────────────────────────────

    /// Grant or deny a permission node on a group.
    pub async fn add_group_node(&self, name: &GroupName, node: Node) -> Result<()> {
        let group = self.load_group(name).await?;
        let action = format!("node add {}", node.key());
        group.nodes().add(node);
        self.finish_group_mutation(&group, action).await
    }

    /// Remove a node from a group. Returns false if no matching node existed.
    pub async fn remove_group_node(&self, name: &GroupName, node: &Node) -> Result<bool> {
        let group = self.load_group(name).await?;
        if !group.nodes().remove(node) {
            return Ok(false);
        }
        self.finish_group_mutation(&group, format!("node remove {}", node.key()))
            .await?;
        Ok(true)
    }

    /// Add a parent edge to a group.
    pub async fn add_group_parent(&self, name: &GroupName, edge: InheritanceEdge) -> Result<bool> {
        let group = self.load_group(name).await?;
        let action = format!("parent add {}", edge.group);
        if !group.add_parent(edge) {
            return Ok(false);
        }
        self.finish_group_mutation(&group, action).await?;
        Ok(true)
    }

    /// Remove every parent edge to another group.
    pub async fn remove_group_parent(&self, name: &GroupName, parent: &GroupName) -> Result<bool> {
        let group = self.load_group(name).await?;
        if !group.remove_parent(parent) {
            return Ok(false);
        }
        self.finish_group_mutation(&group, format!("parent remove {parent}"))
            .await?;
        Ok(true)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Track operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Move a user one rung up a track.
    ///
    /// A user on none of the track's groups is placed on the first rung.
    /// Returns the group the user ends up in.
    pub async fn promote(&self, id: UserId, track_name: &TrackName) -> Result<GroupName> {
        let track = self.load_track(track_name).await?;
        let user = self.load_user(id).await?;

        let current = first_track_group(&user, &track);
        let (action, next) = match current {
            None => {
                let first = track.first().clone();
                self.load_group(&first).await?;
                user.add_membership(InheritanceEdge::new(first.clone()));
                (format!("promote {track_name} (none) -> {first}"), first)
            }
            Some(current) => {
                let next = track
                    .next(&current)
                    .ok_or_else(|| EngineError::EndOfTrack {
                        track: track_name.clone(),
                        end: "top",
                    })?
                    .clone();
                self.load_group(&next).await?;
                user.remove_membership(&current);
                user.add_membership(InheritanceEdge::new(next.clone()));
                (format!("promote {track_name} {current} -> {next}"), next)
            }
        };

        self.finish_user_mutation(&user, action).await?;
        Ok(next)
    }

    /// Move a user one rung down a track. Returns the group the user ends up
    /// in.
    pub async fn demote(&self, id: UserId, track_name: &TrackName) -> Result<GroupName> {
        let track = self.load_track(track_name).await?;
        let user = self.load_user(id).await?;

        let current = first_track_group(&user, &track)
            .ok_or_else(|| EngineError::NotOnTrack(track_name.clone()))?;
        let previous = track
            .previous(&current)
            .ok_or_else(|| EngineError::EndOfTrack {
                track: track_name.clone(),
                end: "bottom",
            })?
            .clone();

        self.load_group(&previous).await?;
        user.remove_membership(&current);
        user.add_membership(InheritanceEdge::new(previous.clone()));
        self.finish_user_mutation(
            &user,
            format!("demote {track_name} {current} -> {previous}"),
        )
        .await?;
        Ok(previous)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Mutation plumbing
    // ─────────────────────────────────────────────────────────────────────────

    /// Audit, invalidate, persist, broadcast. Save failures surface to the
    /// caller; the in-memory mutation is kept so local state stays ahead of
    /// storage rather than silently diverging from what callers observed.
    /// Persistence precedes the broadcast so a peer that reacts to the
    /// signal immediately reads the new state, not the old one.
    async fn finish_user_mutation(&self, user: &Arc<User>, action: String) -> Result<()> {
        let holder = user.holder_ref();
        self.audit.record(AuditEntry::new(holder.clone(), action));
        self.caches.invalidate_holder(&holder);
        self.storage.save_user(&user.to_data()).await?;
        self.broadcast(holder).await;
        Ok(())
    }

    async fn finish_group_mutation(&self, group: &Arc<Group>, action: String) -> Result<()> {
        let holder = group.holder_ref();
        self.audit.record(AuditEntry::new(holder.clone(), action));
        self.caches
            .invalidate_with_descendants(group.name(), &self.registry);
        self.storage.save_group(&group.to_data()).await?;
        self.broadcast(holder).await;
        Ok(())
    }

    async fn broadcast(&self, holder: HolderRef) {
        if !self.config.broadcast_invalidations {
            return;
        }
        let Some(messaging) = &self.messaging else {
            return;
        };
        if let Err(err) = messaging.publish(InvalidationMessage::Holder(holder)).await {
            // Other cluster members may now serve stale data until their
            // staleness sweep; local state is already correct.
            warn!(error = %err, "failed to publish invalidation");
        }
    }
}

/// The first of the user's memberships that lies on the track, in ladder
/// order. Deterministic even if the user somehow holds several rungs.
fn first_track_group(user: &User, track: &Track) -> Option<GroupName> {
    let memberships = user.memberships();
    track
        .groups()
        .iter()
        .find(|g| memberships.iter().any(|e| &e.group == *g))
        .cloned()
}
