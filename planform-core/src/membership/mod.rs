//! # Membership snapshots
//!
//! Cached "which objects are inside" answers per planform, each tagged with the
//! [`WorldVersion`] it was computed against. Nothing is recomputed on mutation; the next
//! [`SnapshotManager::request_membership`] notices the version moved and recomputes, either on
//! the caller ([`Urgency::Immediate`]) or on the manager's worker pool
//! ([`Urgency::Deferred`]).
//!
//! Commits are ordered by version. A result computed against older inputs than one already
//! committed, or than one already requested, is discarded, as is one claiming a version the
//! registry hasn't reached.

use crate::config::{ConfigError, EngineConfig};
use crate::containment::{self, ClippedObject, ContainmentPolicy, ContainmentReport};
use crate::io::LoadedPlanform;
use crate::planform::{Planform, PlanformID};
use crate::raster::{CanvasSize, GeometryError, Point};
use crate::registry::{CategoryID, Element, ElementMode, ObjectID, SharedRegistry};
use crate::world::WorldVersion;
use std::sync::Arc;

pub type ObjectSet = hashbrown::HashSet<ObjectID>;

#[derive(Copy, Clone, PartialEq, Eq, Debug, strum::AsRefStr)]
pub enum Urgency {
    /// Block until a snapshot at the current world version exists.
    Immediate,
    /// Answer with whatever is cached, refreshing in the background.
    Deferred,
}

#[derive(Copy, Clone, PartialEq, Eq, Debug, strum::AsRefStr, strum::FromRepr)]
#[repr(u8)]
pub enum Completeness {
    /// Every candidate object was evaluated against the tagged version.
    Full = 0,
    /// Best-effort answer, pending a refresh.
    Partial = 1,
}

#[derive(Clone, Debug)]
pub struct MembershipSnapshot {
    pub planform: PlanformID,
    pub objects: Arc<ObjectSet>,
    pub version: WorldVersion,
    pub completeness: Completeness,
}

#[derive(Copy, Clone, PartialEq, Eq, Debug, strum::AsRefStr)]
pub enum SnapshotState {
    /// Never computed.
    Uncomputed,
    /// A pass is running, and no snapshot for the current version exists yet.
    Computing,
    /// Snapshot matches the current world version.
    Ready,
    /// Snapshot is older than the world. Still usable as a best-effort answer.
    Stale,
}

#[derive(Copy, Clone, PartialEq, Eq, Debug, strum::AsRefStr)]
pub enum Freshness {
    Ready,
    Stale,
    Uncomputed,
}

#[derive(Clone, Debug)]
pub struct MembershipResult {
    pub planform: PlanformID,
    pub objects: Arc<ObjectSet>,
    /// Version the set reflects. `None` if nothing has been computed yet.
    pub version: Option<WorldVersion>,
    pub freshness: Freshness,
    pub completeness: Completeness,
}
impl MembershipResult {
    fn ready(snapshot: &MembershipSnapshot) -> Self {
        Self {
            planform: snapshot.planform,
            objects: snapshot.objects.clone(),
            version: Some(snapshot.version),
            freshness: Freshness::Ready,
            completeness: snapshot.completeness,
        }
    }
    fn uncomputed(planform: PlanformID) -> Self {
        Self {
            planform,
            objects: Arc::default(),
            version: None,
            freshness: Freshness::Uncomputed,
            completeness: Completeness::Partial,
        }
    }
    /// Member ids in a stable order.
    #[must_use]
    pub fn sorted_objects(&self) -> Vec<ObjectID> {
        let mut ids: Vec<_> = self.objects.iter().copied().collect();
        ids.sort_unstable();
        ids
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum MembershipError {
    #[error("no such planform {0}")]
    MissingReference(PlanformID),
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CommitError {
    /// Lost to a result for newer inputs. Not fatal, the next request recomputes.
    #[error("snapshot of {planform} at {version} is older than {newest}")]
    StaleSnapshotRace {
        planform: PlanformID,
        version: WorldVersion,
        newest: WorldVersion,
    },
    /// Tagged with a version the registry hasn't reached.
    #[error("snapshot of {planform} at {version} is ahead of the world at {current}")]
    FutureVersion {
        planform: PlanformID,
        version: WorldVersion,
        current: WorldVersion,
    },
    #[error("no such planform {0}")]
    MissingReference(PlanformID),
}

#[derive(Debug, thiserror::Error)]
pub enum ManagerError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("failed to start refresh workers: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
}

struct Entry {
    planform: Arc<Planform>,
    committed: Option<MembershipSnapshot>,
    /// Newest version any pass has started computing against.
    latest_requested: Option<WorldVersion>,
    /// Passes between `begin` and `finish`.
    in_flight: usize,
    /// Version a background refresh was queued for, until that refresh ends.
    scheduled: Option<WorldVersion>,
}
impl Entry {
    fn new(planform: Arc<Planform>) -> Self {
        Self {
            planform,
            committed: None,
            latest_requested: None,
            in_flight: 0,
            scheduled: None,
        }
    }
    fn state(&self, current: WorldVersion) -> SnapshotState {
        match &self.committed {
            Some(snapshot) if snapshot.version == current => SnapshotState::Ready,
            _ if self.in_flight > 0 || self.scheduled.is_some() => SnapshotState::Computing,
            None => SnapshotState::Uncomputed,
            Some(_) => SnapshotState::Stale,
        }
    }
    /// Swap in `snapshot` unless something newer was committed or requested, or it claims a
    /// version past `current`.
    fn commit(
        &mut self,
        snapshot: MembershipSnapshot,
        current: WorldVersion,
    ) -> Result<(), CommitError> {
        if snapshot.version > current {
            return Err(CommitError::FutureVersion {
                planform: snapshot.planform,
                version: snapshot.version,
                current,
            });
        }
        let newest = [
            self.committed.as_ref().map(|s| s.version),
            self.latest_requested,
        ]
        .into_iter()
        .flatten()
        .max();
        if let Some(newest) = newest.filter(|&newest| snapshot.version < newest) {
            return Err(CommitError::StaleSnapshotRace {
                planform: snapshot.planform,
                version: snapshot.version,
                newest,
            });
        }
        log::debug!(
            "committed {} at {}: {} member(s)",
            snapshot.planform,
            snapshot.version,
            snapshot.objects.len()
        );
        self.committed = Some(snapshot);
        Ok(())
    }
}

/// State shared with background workers.
struct ManagerInner {
    registry: SharedRegistry,
    policy: ContainmentPolicy,
    entries: parking_lot::RwLock<hashbrown::HashMap<PlanformID, Entry>>,
    /// Queued or running background refreshes.
    pending: parking_lot::Mutex<usize>,
    idle: parking_lot::Condvar,
}
impl ManagerInner {
    /// Register a pass against `version`, handing out the planform to compute with.
    fn begin(
        &self,
        id: PlanformID,
        version: WorldVersion,
    ) -> Result<Arc<Planform>, MembershipError> {
        let mut entries = self.entries.write();
        let entry = entries
            .get_mut(&id)
            .ok_or(MembershipError::MissingReference(id))?;
        entry.latest_requested = entry.latest_requested.max(Some(version));
        entry.in_flight += 1;
        Ok(entry.planform.clone())
    }
    /// End a pass started with `begin`, committing its result.
    fn finish(&self, snapshot: MembershipSnapshot) -> Result<MembershipSnapshot, CommitError> {
        let mut entries = self.entries.write();
        let entry = entries
            .get_mut(&snapshot.planform)
            .ok_or(CommitError::MissingReference(snapshot.planform))?;
        entry.in_flight = entry.in_flight.saturating_sub(1);
        entry.commit(snapshot.clone(), self.registry.version())?;
        Ok(snapshot)
    }
    /// One full evaluation pass against a fresh fork of the registry.
    fn compute(
        &self,
        id: PlanformID,
    ) -> Result<Result<MembershipSnapshot, CommitError>, MembershipError> {
        // Fork before touching entries, never hold both locks.
        let (registry, version) = self.registry.fork();
        let planform = self.begin(id, version)?;
        let objects = containment::evaluate_registry(&registry, &planform, &self.policy);
        log::debug!(
            "evaluated {id} at {version}: {}/{} object(s) inside",
            objects.len(),
            registry.object_count()
        );
        Ok(self.finish(MembershipSnapshot {
            planform: id,
            objects: Arc::new(objects),
            version,
            completeness: Completeness::Full,
        }))
    }
    /// Background job body.
    fn refresh(&self, id: PlanformID, scheduled_for: WorldVersion) {
        match self.compute(id) {
            Ok(Ok(_)) => (),
            Ok(Err(race)) => log::warn!("discarded background refresh: {race}"),
            Err(err) => log::debug!("refresh skipped: {err}"),
        }
        if let Some(entry) = self.entries.write().get_mut(&id) {
            if entry.scheduled == Some(scheduled_for) {
                entry.scheduled = None;
            }
        }
    }
}

/// Marks a background refresh finished, even if it panicked.
struct PendingGuard(Arc<ManagerInner>);
impl Drop for PendingGuard {
    fn drop(&mut self) {
        let mut pending = self.0.pending.lock();
        *pending = pending.saturating_sub(1);
        if *pending == 0 {
            self.0.idle.notify_all();
        }
    }
}

pub struct SnapshotManager {
    inner: Arc<ManagerInner>,
    /// `None` when configured with zero workers. Deferred requests then run inline.
    pool: Option<rayon::ThreadPool>,
    config: EngineConfig,
}
impl SnapshotManager {
    pub fn new(registry: SharedRegistry, config: EngineConfig) -> Result<Self, ManagerError> {
        config.validate()?;
        let pool = match config.background_workers {
            0 => None,
            workers => Some(
                rayon::ThreadPoolBuilder::new()
                    .num_threads(workers)
                    .thread_name(|idx| format!("planform-refresh-{idx}"))
                    .build()?,
            ),
        };
        Ok(Self {
            inner: Arc::new(ManagerInner {
                registry,
                policy: config.policy,
                entries: parking_lot::RwLock::default(),
                pending: parking_lot::Mutex::new(0),
                idle: parking_lot::Condvar::new(),
            }),
            pool,
            config,
        })
    }
    #[must_use]
    pub fn registry(&self) -> &SharedRegistry {
        &self.inner.registry
    }
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
    #[must_use]
    pub fn world_version(&self) -> WorldVersion {
        self.inner.registry.version()
    }
    /// Rasterize and register a new planform. It starts out [`SnapshotState::Uncomputed`].
    pub fn create_planform(
        &self,
        canvas: CanvasSize,
        points: &[Point],
    ) -> Result<PlanformID, GeometryError> {
        let planform = Planform::with_tolerance(canvas, points, self.config.boundary_tolerance)?;
        Ok(self.insert_planform(planform))
    }
    /// Rasterize an element with this engine's fill tolerance and stroke width, ready for
    /// the editor to insert into the registry.
    pub fn element_from_points(
        &self,
        category: CategoryID,
        mode: ElementMode,
        canvas: CanvasSize,
        points: &[Point],
    ) -> Result<Element, GeometryError> {
        Element::with_config(category, mode, canvas, points, &self.config)
    }
    /// Register a planform, replacing any previous one with the same id along with its
    /// snapshot.
    pub fn insert_planform(&self, planform: Planform) -> PlanformID {
        let id = planform.id();
        log::debug!(
            "registered {id} with {} mask pixels",
            planform.mask().pixel_count()
        );
        self.inner
            .entries
            .write()
            .insert(id, Entry::new(Arc::new(planform)));
        id
    }
    /// Install a planform read from disk. Its snapshot, if any, stays [`SnapshotState::Stale`]
    /// until revalidated.
    pub fn restore(&self, loaded: LoadedPlanform) -> PlanformID {
        let id = loaded.planform.id();
        let mut entry = Entry::new(Arc::new(loaded.planform));
        entry.committed = loaded.snapshot.map(|snapshot| MembershipSnapshot {
            planform: id,
            version: WorldVersion::RESTORED,
            ..snapshot
        });
        log::debug!(
            "restored {id} (saved at {}, snapshot {})",
            loaded
                .saved_version
                .map_or_else(|| "-".to_owned(), |v| v.to_string()),
            if entry.committed.is_some() {
                "stale"
            } else {
                "missing"
            }
        );
        self.inner.entries.write().insert(id, entry);
        id
    }
    pub fn remove_planform(&self, id: PlanformID) -> Option<Arc<Planform>> {
        self.inner
            .entries
            .write()
            .remove(&id)
            .map(|entry| entry.planform)
    }
    #[must_use]
    pub fn planform(&self, id: PlanformID) -> Option<Arc<Planform>> {
        self.inner
            .entries
            .read()
            .get(&id)
            .map(|entry| entry.planform.clone())
    }
    /// Every registered planform, in a stable order.
    #[must_use]
    pub fn planform_ids(&self) -> Vec<PlanformID> {
        let mut ids: Vec<_> = self.inner.entries.read().keys().copied().collect();
        ids.sort_unstable();
        ids
    }
    pub fn state(&self, id: PlanformID) -> Result<SnapshotState, MembershipError> {
        let current = self.world_version();
        self.inner
            .entries
            .read()
            .get(&id)
            .map(|entry| entry.state(current))
            .ok_or(MembershipError::MissingReference(id))
    }
    /// Last committed snapshot, whatever its version.
    #[must_use]
    pub fn snapshot(&self, id: PlanformID) -> Option<MembershipSnapshot> {
        self.inner
            .entries
            .read()
            .get(&id)
            .and_then(|entry| entry.committed.clone())
    }
    /// Advance the world version. Snapshots become stale and are recomputed on next request.
    pub fn invalidate_all(&self) -> WorldVersion {
        let version = self.inner.registry.bump();
        log::debug!("invalidated all snapshots, now at {version}");
        version
    }
    /// Swap in an externally computed result.
    pub fn commit(
        &self,
        planform: PlanformID,
        objects: ObjectSet,
        version: WorldVersion,
    ) -> Result<(), CommitError> {
        let current = self.world_version();
        let mut entries = self.inner.entries.write();
        let entry = entries
            .get_mut(&planform)
            .ok_or(CommitError::MissingReference(planform))?;
        entry
            .commit(
                MembershipSnapshot {
                    planform,
                    objects: Arc::new(objects),
                    version,
                    completeness: Completeness::Full,
                },
                current,
            )
            .inspect_err(|race| log::warn!("{race}"))
    }
    pub fn request_membership(
        &self,
        id: PlanformID,
        urgency: Urgency,
    ) -> Result<MembershipResult, MembershipError> {
        match (urgency, &self.pool) {
            (Urgency::Deferred, Some(pool)) => self.request_deferred(pool, id),
            _ => self.request_immediate(id),
        }
    }
    fn ready_snapshot(
        &self,
        id: PlanformID,
    ) -> Result<Option<MembershipSnapshot>, MembershipError> {
        let current = self.world_version();
        let entries = self.inner.entries.read();
        let entry = entries
            .get(&id)
            .ok_or(MembershipError::MissingReference(id))?;
        Ok(entry
            .committed
            .as_ref()
            .filter(|snapshot| snapshot.version == current)
            .cloned())
    }
    fn request_immediate(&self, id: PlanformID) -> Result<MembershipResult, MembershipError> {
        loop {
            if let Some(snapshot) = self.ready_snapshot(id)? {
                return Ok(MembershipResult::ready(&snapshot));
            }
            match self.inner.compute(id)? {
                Ok(snapshot) if snapshot.version == self.world_version() => {
                    return Ok(MembershipResult::ready(&snapshot));
                }
                // Registry moved on while computing.
                Ok(_) => (),
                Err(CommitError::MissingReference(id)) => {
                    return Err(MembershipError::MissingReference(id))
                }
                Err(race) => log::debug!("retrying: {race}"),
            }
        }
    }
    fn request_deferred(
        &self,
        pool: &rayon::ThreadPool,
        id: PlanformID,
    ) -> Result<MembershipResult, MembershipError> {
        let current = self.world_version();
        let (committed, schedule) = {
            let mut entries = self.inner.entries.write();
            let entry = entries
                .get_mut(&id)
                .ok_or(MembershipError::MissingReference(id))?;
            if let Some(snapshot) = entry.committed.as_ref().filter(|s| s.version == current) {
                return Ok(MembershipResult::ready(snapshot));
            }
            let schedule = entry.scheduled.map_or(true, |v| v < current);
            if schedule {
                entry.scheduled = Some(current);
            }
            (entry.committed.clone(), schedule)
        };
        if schedule {
            *self.inner.pending.lock() += 1;
            let guard = PendingGuard(self.inner.clone());
            log::debug!("scheduled refresh of {id} for {current}");
            pool.spawn(move || {
                guard.0.refresh(id, current);
                drop(guard);
            });
        }
        Ok(match committed {
            Some(snapshot) => self.pruned(&snapshot),
            None => MembershipResult::uncomputed(id),
        })
    }
    /// A stale snapshot minus members that were deleted or hidden since.
    fn pruned(&self, snapshot: &MembershipSnapshot) -> MembershipResult {
        let registry = self.inner.registry.read();
        let live = |id: &ObjectID| {
            registry
                .object(*id)
                .is_some_and(|object| registry.is_visible(object.category))
        };
        let objects = if snapshot.objects.iter().all(live) {
            snapshot.objects.clone()
        } else {
            let kept: ObjectSet = snapshot.objects.iter().copied().filter(live).collect();
            log::warn!(
                "pruned {} stale member(s) of {}",
                snapshot.objects.len() - kept.len(),
                snapshot.planform
            );
            Arc::new(kept)
        };
        MembershipResult {
            planform: snapshot.planform,
            objects,
            version: Some(snapshot.version),
            freshness: Freshness::Stale,
            completeness: Completeness::Partial,
        }
    }
    /// Authoritative members of `id`, each clipped to the planform mask, sorted by object id.
    pub fn create_view(&self, id: PlanformID) -> Result<Vec<ClippedObject>, MembershipError> {
        loop {
            let membership = self.request_immediate(id)?;
            let planform = self
                .planform(id)
                .ok_or(MembershipError::MissingReference(id))?;
            let registry = self.inner.registry.read();
            // Registry can only advance under its write lock, so this holds until we're done.
            if membership.version != Some(self.world_version()) {
                continue;
            }
            return Ok(membership
                .sorted_objects()
                .into_iter()
                .filter_map(|object| registry.object(object))
                .map(|object| containment::clip_to_planform(object, &planform))
                .collect());
        }
    }
    /// Containment breakdown of every candidate object against `id`, sorted by object id.
    pub fn inspect(&self, id: PlanformID) -> Result<Vec<ContainmentReport>, MembershipError> {
        let planform = self
            .planform(id)
            .ok_or(MembershipError::MissingReference(id))?;
        let registry = self.inner.registry.read();
        let mut reports: Vec<_> = registry
            .objects()
            .filter(|object| registry.is_candidate(object))
            .map(|object| containment::inspect(object, &planform, &self.inner.policy, &registry))
            .collect();
        reports.sort_unstable_by_key(|report| report.object);
        Ok(reports)
    }
    /// Block until every scheduled background refresh has ended.
    pub fn wait_idle(&self) {
        let mut pending = self.inner.pending.lock();
        while *pending > 0 {
            self.inner.idle.wait(&mut pending);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::containment::test::{object_with, registry, CANVAS, SQUARE};

    fn manager(workers: usize) -> (SnapshotManager, CategoryID) {
        let (shared, category) = registry();
        let config = EngineConfig {
            background_workers: workers,
            ..Default::default()
        };
        (SnapshotManager::new(shared, config).unwrap(), category)
    }
    fn insert(
        manager: &SnapshotManager,
        category: CategoryID,
        total: u64,
        overlap: u64,
    ) -> ObjectID {
        manager
            .registry()
            .write_with(|w| w.insert_object(object_with(category, total, overlap)))
            .unwrap()
    }

    #[test]
    fn lifecycle() {
        let (manager, category) = manager(0);
        let a = insert(&manager, category, 400, 40);
        let planform = manager.create_planform(CANVAS, &SQUARE).unwrap();
        assert_eq!(manager.state(planform), Ok(SnapshotState::Uncomputed));

        let first = manager
            .request_membership(planform, Urgency::Immediate)
            .unwrap();
        assert_eq!(first.freshness, Freshness::Ready);
        assert_eq!(first.completeness, Completeness::Full);
        assert_eq!(first.sorted_objects(), vec![a]);
        assert_eq!(manager.state(planform), Ok(SnapshotState::Ready));

        let b = insert(&manager, category, 20, 20);
        assert_eq!(manager.state(planform), Ok(SnapshotState::Stale));
        let second = manager
            .request_membership(planform, Urgency::Immediate)
            .unwrap();
        assert_eq!(second.version, Some(manager.world_version()));
        assert!(second.objects.contains(&a) && second.objects.contains(&b));

        // Asking again reuses the snapshot.
        let third = manager
            .request_membership(planform, Urgency::Immediate)
            .unwrap();
        assert!(Arc::ptr_eq(&second.objects, &third.objects));
    }
    #[test]
    fn hiding_category_excludes() {
        let (manager, category) = manager(0);
        let a = insert(&manager, category, 400, 40);
        let planform = manager.create_planform(CANVAS, &SQUARE).unwrap();
        let before = manager
            .request_membership(planform, Urgency::Immediate)
            .unwrap();
        assert!(before.objects.contains(&a));

        manager
            .registry()
            .write_with(|w| w.set_category_visible(category, false))
            .unwrap();
        let after = manager
            .request_membership(planform, Urgency::Immediate)
            .unwrap();
        assert!(after.objects.is_empty());
    }
    #[test]
    fn out_of_order_commits() {
        let (manager, category) = manager(0);
        let a = insert(&manager, category, 400, 40);
        let planform = manager.create_planform(CANVAS, &SQUARE).unwrap();
        let v1 = manager.world_version();
        let v2 = manager.invalidate_all();
        assert!(v1 < v2);

        manager
            .commit(planform, [a].into_iter().collect(), v2)
            .unwrap();
        let late = manager.commit(planform, ObjectSet::new(), v1);
        assert_eq!(
            late,
            Err(CommitError::StaleSnapshotRace {
                planform,
                version: v1,
                newest: v2
            })
        );
        let snapshot = manager.snapshot(planform).unwrap();
        assert_eq!(snapshot.version, v2);
        assert!(snapshot.objects.contains(&a));
        assert_eq!(manager.state(planform), Ok(SnapshotState::Ready));
    }
    #[test]
    fn future_commit_rejected() {
        let (manager, category) = manager(0);
        let a = insert(&manager, category, 400, 40);
        let planform = manager.create_planform(CANVAS, &SQUARE).unwrap();
        let current = manager.world_version();
        let ahead = WorldVersion::from_raw(current.get() + 100);

        assert_eq!(
            manager.commit(planform, ObjectSet::new(), ahead),
            Err(CommitError::FutureVersion {
                planform,
                version: ahead,
                current
            })
        );
        assert!(manager.snapshot(planform).is_none());
        assert_eq!(manager.state(planform), Ok(SnapshotState::Uncomputed));

        // Nothing is left blocking the next real pass.
        let result = manager
            .request_membership(planform, Urgency::Immediate)
            .unwrap();
        assert_eq!(result.version, Some(current));
        assert_eq!(result.sorted_objects(), vec![a]);
        assert_eq!(manager.state(planform), Ok(SnapshotState::Ready));
    }
    #[test]
    fn older_pass_loses_to_newer_request() {
        let (manager, _) = manager(0);
        let planform = manager.create_planform(CANVAS, &SQUARE).unwrap();
        let v1 = manager.world_version();
        manager.inner.begin(planform, v1).unwrap();
        let v2 = manager.invalidate_all();
        manager.inner.begin(planform, v2).unwrap();
        assert_eq!(manager.state(planform), Ok(SnapshotState::Computing));

        let snapshot = |version| MembershipSnapshot {
            planform,
            objects: Arc::default(),
            version,
            completeness: Completeness::Full,
        };
        // Older than the newest request, so discarded even with nothing committed yet.
        assert!(matches!(
            manager.inner.finish(snapshot(v1)),
            Err(CommitError::StaleSnapshotRace { .. })
        ));
        assert!(manager.snapshot(planform).is_none());
        manager.inner.finish(snapshot(v2)).unwrap();
        assert_eq!(manager.state(planform), Ok(SnapshotState::Ready));
    }
    #[test]
    fn deferred_refreshes_in_background() {
        let (manager, category) = manager(2);
        let a = insert(&manager, category, 400, 40);
        let planform = manager.create_planform(CANVAS, &SQUARE).unwrap();

        let first = manager
            .request_membership(planform, Urgency::Deferred)
            .unwrap();
        assert_eq!(first.freshness, Freshness::Uncomputed);
        assert!(first.objects.is_empty());
        manager.wait_idle();
        assert_eq!(manager.state(planform), Ok(SnapshotState::Ready));

        let second = manager
            .request_membership(planform, Urgency::Deferred)
            .unwrap();
        assert_eq!(second.freshness, Freshness::Ready);
        assert_eq!(second.sorted_objects(), vec![a]);
    }
    #[test]
    fn deferred_and_immediate_race() {
        let (manager, category) = manager(2);
        let a = insert(&manager, category, 400, 40);
        let planform = manager.create_planform(CANVAS, &SQUARE).unwrap();
        for _ in 0..32 {
            let newest = std::thread::scope(|scope| {
                let deferred =
                    scope.spawn(|| manager.request_membership(planform, Urgency::Deferred));
                let newest = manager.invalidate_all();
                let immediate =
                    scope.spawn(|| manager.request_membership(planform, Urgency::Immediate));
                deferred.join().unwrap().unwrap();
                let result = immediate.join().unwrap().unwrap();
                assert_eq!(result.freshness, Freshness::Ready);
                assert!(result.version >= Some(newest));
                newest
            });
            manager.wait_idle();
            assert_eq!(manager.world_version(), newest);
            assert_eq!(manager.state(planform), Ok(SnapshotState::Ready));
            let snapshot = manager.snapshot(planform).unwrap();
            assert_eq!(snapshot.version, newest);
            assert!(snapshot.objects.contains(&a));
        }
    }
    #[test]
    fn elements_use_configured_brush() {
        let (shared, category) = registry();
        let config = |stroke_thickness| EngineConfig {
            stroke_thickness,
            background_workers: 0,
            ..Default::default()
        };
        let line = [[10.0, 30.0], [40.0, 30.0]];
        let thin = SnapshotManager::new(shared.clone(), config(1.0)).unwrap();
        let thick = SnapshotManager::new(shared, config(7.0)).unwrap();
        let thin = thin
            .element_from_points(category, ElementMode::Line, CANVAS, &line)
            .unwrap();
        let thick = thick
            .element_from_points(category, ElementMode::Line, CANVAS, &line)
            .unwrap();
        assert_eq!(thin.pixel_count(), 31);
        assert!(thick.pixel_count() > 5 * 31);
    }
    #[test]
    fn stale_answers_are_pruned() {
        let (manager, category) = manager(1);
        let a = insert(&manager, category, 400, 40);
        let b = insert(&manager, category, 50, 12);
        let planform = manager.create_planform(CANVAS, &SQUARE).unwrap();
        manager
            .request_membership(planform, Urgency::Immediate)
            .unwrap();

        manager
            .registry()
            .write_with(|w| w.remove_object(a).map(|_| ()))
            .unwrap();
        let stale = manager
            .request_membership(planform, Urgency::Deferred)
            .unwrap();
        assert_eq!(stale.freshness, Freshness::Stale);
        assert_eq!(stale.completeness, Completeness::Partial);
        assert_eq!(stale.sorted_objects(), vec![b]);
        // The committed snapshot itself is untouched until the refresh lands.
        manager.wait_idle();
        let fresh = manager
            .request_membership(planform, Urgency::Deferred)
            .unwrap();
        assert_eq!(fresh.freshness, Freshness::Ready);
        assert_eq!(fresh.sorted_objects(), vec![b]);
    }
    #[test]
    fn deferred_without_workers_is_immediate() {
        let (manager, category) = manager(0);
        let a = insert(&manager, category, 400, 40);
        let planform = manager.create_planform(CANVAS, &SQUARE).unwrap();
        let result = manager
            .request_membership(planform, Urgency::Deferred)
            .unwrap();
        assert_eq!(result.freshness, Freshness::Ready);
        assert_eq!(result.sorted_objects(), vec![a]);
    }
    #[test]
    fn unknown_planform() {
        let (manager, _) = manager(0);
        let ghost = PlanformID::default();
        assert_eq!(
            manager
                .request_membership(ghost, Urgency::Immediate)
                .map(|_| ()),
            Err(MembershipError::MissingReference(ghost))
        );
        assert_eq!(
            manager.state(ghost),
            Err(MembershipError::MissingReference(ghost))
        );
        let planform = manager.create_planform(CANVAS, &SQUARE).unwrap();
        assert!(manager.remove_planform(planform).is_some());
        assert!(manager.create_view(planform).is_err());
    }
    #[test]
    fn degenerate_planform_rejected() {
        let (manager, _) = manager(0);
        assert!(manager.create_planform(CANVAS, &SQUARE[..2]).is_err());
        assert!(manager.planform_ids().is_empty());
    }
    #[test]
    fn off_canvas_planform_is_empty() {
        let (manager, category) = manager(0);
        insert(&manager, category, 400, 40);
        let planform = manager
            .create_planform(CANVAS, &[[200.0, 200.0], [300.0, 200.0], [300.0, 300.0]])
            .unwrap();
        let result = manager
            .request_membership(planform, Urgency::Immediate)
            .unwrap();
        assert_eq!(result.freshness, Freshness::Ready);
        assert!(result.objects.is_empty());
    }
    #[test]
    fn view_matches_membership() {
        let (manager, category) = manager(0);
        insert(&manager, category, 400, 40);
        insert(&manager, category, 1000, 15);
        insert(&manager, category, 1000, 8);
        let planform = manager.create_planform(CANVAS, &SQUARE).unwrap();
        let view = manager.create_view(planform).unwrap();
        let membership = manager
            .request_membership(planform, Urgency::Immediate)
            .unwrap();
        let ids: Vec<_> = view.iter().map(|clipped| clipped.object).collect();
        assert_eq!(ids, membership.sorted_objects());
        assert!(view.iter().all(|clipped| clipped.pixel_count() > 0));
        let mut overlaps: Vec<_> = view.iter().map(ClippedObject::pixel_count).collect();
        overlaps.sort_unstable();
        assert_eq!(overlaps, vec![15, 40]);
    }
    #[test]
    fn restored_snapshot_revalidates() {
        let (manager, category) = manager(0);
        let a = insert(&manager, category, 400, 40);
        let planform = Planform::new(CANVAS, &SQUARE).unwrap();
        let id = planform.id();
        let deleted = ObjectID::default();
        let loaded = LoadedPlanform {
            snapshot: Some(MembershipSnapshot {
                planform: id,
                objects: Arc::new([a, deleted].into_iter().collect()),
                version: WorldVersion::INITIAL,
                completeness: Completeness::Full,
            }),
            saved_version: Some(WorldVersion::INITIAL),
            planform,
        };
        manager.restore(loaded);
        assert_eq!(manager.state(id), Ok(SnapshotState::Stale));
        assert_eq!(
            manager.snapshot(id).map(|s| s.version),
            Some(WorldVersion::RESTORED)
        );
        let result = manager.request_membership(id, Urgency::Immediate).unwrap();
        assert_eq!(result.sorted_objects(), vec![a]);
    }
}
