//! Cached permission data, keyed by context fingerprint.
//!
//! Each holder owns one cache mapping context fingerprints to computed
//! permission data. Concurrent lookups for the same fingerprint share a
//! single in-flight computation; a failed computation is never cached.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

use tokio::sync::OnceCell;
use tracing::debug;

use trellis_core::{ContextFingerprint, GroupName, HolderRef};

use crate::calculator::PermissionData;
use crate::registry::HolderRegistry;

/// One computed result plus when it was computed (for staleness eviction).
#[derive(Debug, Clone)]
struct CacheEntry {
    data: Arc<PermissionData>,
    computed_at: Instant,
}

/// The result of a cache lookup.
#[derive(Debug, Clone)]
pub struct CacheOutcome {
    /// The permission data, shared with every other caller for this
    /// fingerprint.
    pub data: Arc<PermissionData>,
    /// True if this call performed the computation (cache miss).
    pub fresh: bool,
}

type CacheSlot = Arc<OnceCell<CacheEntry>>;

/// Per-holder cache of calculated permission data.
#[derive(Debug, Default)]
pub struct HolderCache {
    slots: Mutex<HashMap<ContextFingerprint, CacheSlot>>,
}

impl HolderCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the cached data for a fingerprint, or compute it.
    ///
    /// At most one computation runs per fingerprint at a time; concurrent
    /// callers for the same fingerprint await the in-flight computation
    /// instead of duplicating it. On error nothing is cached and the slot is
    /// usable again.
    pub async fn get_or_compute<F, Fut, E>(
        &self,
        fingerprint: ContextFingerprint,
        compute: F,
    ) -> Result<CacheOutcome, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Arc<PermissionData>, E>>,
    {
        let slot = {
            let mut slots = self.slots.lock().unwrap();
            Arc::clone(slots.entry(fingerprint).or_default())
        };

        let mut fresh = false;
        let entry = slot
            .get_or_try_init(|| {
                fresh = true;
                async {
                    let data = compute().await?;
                    Ok(CacheEntry {
                        data,
                        computed_at: Instant::now(),
                    })
                }
            })
            .await?;

        Ok(CacheOutcome {
            data: Arc::clone(&entry.data),
            fresh,
        })
    }

    /// Look up without computing.
    pub fn get(&self, fingerprint: &ContextFingerprint) -> Option<Arc<PermissionData>> {
        let slots = self.slots.lock().unwrap();
        slots
            .get(fingerprint)
            .and_then(|slot| slot.get())
            .map(|entry| Arc::clone(&entry.data))
    }

    /// Drop the entry for one fingerprint.
    pub fn invalidate(&self, fingerprint: &ContextFingerprint) {
        self.slots.lock().unwrap().remove(fingerprint);
    }

    /// Drop every entry.
    pub fn invalidate_all(&self) {
        self.slots.lock().unwrap().clear();
    }

    /// Evict entries computed longer than `max_age` ago.
    ///
    /// Memory-pressure relief for rarely-used fingerprints, not a
    /// correctness mechanism; in-flight computations are left alone.
    pub fn sweep_stale(&self, max_age: Duration) -> usize {
        let mut slots = self.slots.lock().unwrap();
        let before = slots.len();
        slots.retain(|_, slot| {
            slot.get()
                .map_or(true, |entry| entry.computed_at.elapsed() <= max_age)
        });
        before - slots.len()
    }

    /// Number of fingerprint slots (including in-flight ones).
    pub fn len(&self) -> usize {
        self.slots.lock().unwrap().len()
    }

    /// True if no fingerprints are cached or in flight.
    pub fn is_empty(&self) -> bool {
        self.slots.lock().unwrap().is_empty()
    }
}

/// Registry-wide collection of per-holder caches.
#[derive(Debug, Default)]
pub struct CacheManager {
    caches: RwLock<HashMap<HolderRef, Arc<HolderCache>>>,
}

impl CacheManager {
    /// Create an empty manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// The cache for a holder, created on first use.
    pub fn cache_for(&self, holder: &HolderRef) -> Arc<HolderCache> {
        if let Some(cache) = self.caches.read().unwrap().get(holder) {
            return Arc::clone(cache);
        }
        let mut caches = self.caches.write().unwrap();
        Arc::clone(caches.entry(holder.clone()).or_default())
    }

    /// Clear every cached fingerprint for one holder.
    pub fn invalidate_holder(&self, holder: &HolderRef) {
        if let Some(cache) = self.caches.read().unwrap().get(holder) {
            debug!(holder = %holder, "invalidating holder cache");
            cache.invalidate_all();
        }
    }

    /// Clear every cache on this node.
    pub fn invalidate_all(&self) {
        debug!("invalidating all holder caches");
        for cache in self.caches.read().unwrap().values() {
            cache.invalidate_all();
        }
    }

    /// Invalidate a group's cache and the cache of every holder that
    /// transitively inherits from it.
    ///
    /// The fan-out is conservative: edge contexts and expiry are ignored, so
    /// a holder is invalidated even if the relevant edge is currently
    /// inactive.
    pub fn invalidate_with_descendants(&self, group: &GroupName, registry: &HolderRegistry) {
        let affected = descendant_groups(group, registry);

        for name in &affected {
            self.invalidate_holder(&HolderRef::Group(name.clone()));
        }

        for user in registry.loaded_users() {
            let inherits = user
                .memberships()
                .iter()
                .any(|edge| affected.contains(&edge.group));
            if inherits {
                self.invalidate_holder(&user.holder_ref());
            }
        }
    }

    /// Evict stale entries across every holder cache.
    ///
    /// Holder caches left with no entries are dropped from the map, so
    /// unloaded holders do not pin an empty cache forever. In-flight slots
    /// keep their cache alive.
    pub fn sweep_stale(&self, max_age: Duration) -> usize {
        let mut caches = self.caches.write().unwrap();
        let mut evicted = 0;
        caches.retain(|_, cache| {
            evicted += cache.sweep_stale(max_age);
            !cache.is_empty()
        });
        evicted
    }
}

/// The target group plus every loaded group that transitively inherits it.
fn descendant_groups(
    group: &GroupName,
    registry: &HolderRegistry,
) -> std::collections::BTreeSet<GroupName> {
    let groups = registry.loaded_groups();

    // Reverse edges: parent -> children, over loaded groups only.
    let mut children: HashMap<GroupName, Vec<GroupName>> = HashMap::new();
    for g in &groups {
        for edge in g.parents() {
            children
                .entry(edge.group)
                .or_default()
                .push(g.name().clone());
        }
    }

    let mut affected = std::collections::BTreeSet::new();
    let mut queue = std::collections::VecDeque::new();
    affected.insert(group.clone());
    queue.push_back(group.clone());

    while let Some(current) = queue.pop_front() {
        if let Some(kids) = children.get(&current) {
            for kid in kids {
                if affected.insert(kid.clone()) {
                    queue.push_back(kid.clone());
                }
            }
        }
    }

    affected
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use trellis_core::{ContextSet, Group, InheritanceEdge, User, UserId};

    fn fp(set: &ContextSet) -> ContextFingerprint {
        set.fingerprint()
    }

    fn data() -> Arc<PermissionData> {
        Arc::new(PermissionData::empty())
    }

    #[tokio::test]
    async fn test_hit_returns_same_arc() {
        let cache = HolderCache::new();
        let fingerprint = fp(&ContextSet::new());

        let first = cache
            .get_or_compute(fingerprint, || async { Ok::<_, String>(data()) })
            .await
            .unwrap();
        assert!(first.fresh);

        let second = cache
            .get_or_compute::<_, _, String>(fingerprint, || async {
                panic!("must not recompute on hit")
            })
            .await
            .unwrap();
        assert!(!second.fresh);
        assert!(Arc::ptr_eq(&first.data, &second.data));
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_computation() {
        let cache = Arc::new(HolderCache::new());
        let fingerprint = fp(&ContextSet::new());
        let computations = Arc::new(AtomicUsize::new(0));

        let run = |cache: Arc<HolderCache>, counter: Arc<AtomicUsize>| async move {
            cache
                .get_or_compute(fingerprint, || async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    Ok::<_, String>(data())
                })
                .await
                .unwrap()
        };

        let (a, b, c) = tokio::join!(
            run(Arc::clone(&cache), Arc::clone(&computations)),
            run(Arc::clone(&cache), Arc::clone(&computations)),
            run(Arc::clone(&cache), Arc::clone(&computations)),
        );

        assert_eq!(computations.load(Ordering::SeqCst), 1);
        assert!(Arc::ptr_eq(&a.data, &b.data));
        assert!(Arc::ptr_eq(&b.data, &c.data));
    }

    #[tokio::test]
    async fn test_failed_computation_not_cached() {
        let cache = HolderCache::new();
        let fingerprint = fp(&ContextSet::new());

        let err = cache
            .get_or_compute(fingerprint, || async { Err::<Arc<PermissionData>, _>("boom") })
            .await;
        assert!(err.is_err());
        assert!(cache.get(&fingerprint).is_none());

        // The slot must be usable again after a failure.
        let ok = cache
            .get_or_compute(fingerprint, || async { Ok::<_, &str>(data()) })
            .await
            .unwrap();
        assert!(ok.fresh);
    }

    #[tokio::test]
    async fn test_invalidate_forces_recompute() {
        let cache = HolderCache::new();
        let fingerprint = fp(&ContextSet::new());

        let first = cache
            .get_or_compute(fingerprint, || async { Ok::<_, String>(data()) })
            .await
            .unwrap();

        cache.invalidate_all();
        assert!(cache.get(&fingerprint).is_none());

        let second = cache
            .get_or_compute(fingerprint, || async { Ok::<_, String>(data()) })
            .await
            .unwrap();
        assert!(second.fresh);
        assert!(!Arc::ptr_eq(&first.data, &second.data));
    }

    #[tokio::test]
    async fn test_distinct_fingerprints_distinct_entries() {
        let cache = HolderCache::new();
        let empty = fp(&ContextSet::new());
        let nether = fp(&ContextSet::new().with("world", "nether"));

        cache
            .get_or_compute(empty, || async { Ok::<_, String>(data()) })
            .await
            .unwrap();
        cache
            .get_or_compute(nether, || async { Ok::<_, String>(data()) })
            .await
            .unwrap();

        assert_eq!(cache.len(), 2);
        cache.invalidate(&empty);
        assert!(cache.get(&empty).is_none());
        assert!(cache.get(&nether).is_some());
    }

    #[tokio::test]
    async fn test_sweep_stale_evicts_old_entries() {
        let cache = HolderCache::new();
        let fingerprint = fp(&ContextSet::new());

        cache
            .get_or_compute(fingerprint, || async { Ok::<_, String>(data()) })
            .await
            .unwrap();

        // Nothing is older than an hour yet.
        assert_eq!(cache.sweep_stale(Duration::from_secs(3600)), 0);
        assert_eq!(cache.len(), 1);

        // Everything is older than zero.
        assert_eq!(cache.sweep_stale(Duration::ZERO), 1);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_manager_sweep_drops_emptied_holder_caches() {
        let manager = CacheManager::new();
        let holder = HolderRef::Group(GroupName::new("admin").unwrap());

        manager
            .cache_for(&holder)
            .get_or_compute(fp(&ContextSet::new()), || async { Ok::<_, String>(data()) })
            .await
            .unwrap();
        assert_eq!(manager.caches.read().unwrap().len(), 1);

        // Nothing stale yet, so the holder entry stays.
        manager.sweep_stale(Duration::from_secs(3600));
        assert_eq!(manager.caches.read().unwrap().len(), 1);

        // Once its last entry goes, so does the per-holder cache.
        assert_eq!(manager.sweep_stale(Duration::ZERO), 1);
        assert!(manager.caches.read().unwrap().is_empty());
    }

    #[test]
    fn test_descendant_fanout() {
        let registry = HolderRegistry::new();

        let admin = GroupName::new("admin").unwrap();
        let moderator = GroupName::new("mod").unwrap();
        let unrelated = GroupName::new("builder").unwrap();

        let admin_group = Arc::new(Group::new(admin.clone()));
        let mod_group = Arc::new(Group::new(moderator.clone()));
        mod_group.add_parent(InheritanceEdge::new(admin.clone()));
        let other_group = Arc::new(Group::new(unrelated.clone()));
        registry.insert_group(admin_group);
        registry.insert_group(mod_group);
        registry.insert_group(other_group);

        let member = Arc::new(User::new(UserId::from_bytes([1; 16])));
        member.add_membership(InheritanceEdge::new(moderator.clone()));
        let outsider = Arc::new(User::new(UserId::from_bytes([2; 16])));
        outsider.add_membership(InheritanceEdge::new(unrelated.clone()));
        registry.insert_user(Arc::clone(&member));
        registry.insert_user(Arc::clone(&outsider));

        let manager = CacheManager::new();
        let refs = [
            HolderRef::Group(admin.clone()),
            HolderRef::Group(moderator),
            HolderRef::Group(unrelated),
            member.holder_ref(),
            outsider.holder_ref(),
        ];
        // Seed a slot in every cache so invalidation is observable.
        for r in &refs {
            let cache = manager.cache_for(r);
            let slot: CacheSlot = Arc::default();
            slot.set(CacheEntry {
                data: data(),
                computed_at: Instant::now(),
            })
            .unwrap();
            cache
                .slots
                .lock()
                .unwrap()
                .insert(fp(&ContextSet::new()), slot);
        }

        manager.invalidate_with_descendants(&admin, &registry);

        let fingerprint = fp(&ContextSet::new());
        assert!(manager.cache_for(&refs[0]).get(&fingerprint).is_none());
        assert!(manager.cache_for(&refs[1]).get(&fingerprint).is_none());
        assert!(manager.cache_for(&refs[3]).get(&fingerprint).is_none());
        // Unrelated group and its member keep their entries.
        assert!(manager.cache_for(&refs[2]).get(&fingerprint).is_some());
        assert!(manager.cache_for(&refs[4]).get(&fingerprint).is_some());
    }
}
