//! LOD actor (placeholder) ownership: creation, reuse, destruction, dirty
//! tracking and the per-level "needs build" cache.
//!
//! The manager owns every [`Placeholder`] and hands out stable
//! [`PlaceholderId`]s. At each level, member handles form a partition: a
//! handle is claimed by at most one placeholder. A placeholder that is itself
//! a member of a higher-level placeholder is that placeholder's child, and
//! destroying a child destroys its ancestors so no placeholder ever points at
//! a missing member.

use nebula_config::{LevelSettings, MergePolicy};
use nebula_math::Aabb;
use rustc_hash::FxHashMap;
use tracing::debug;

use crate::cluster::{Candidate, Cluster};
use crate::error::HlodError;
use crate::key::{KeyCache, object_revisions, policy_key, scene_input_key};
use crate::scene::{BuiltMesh, HlodScene, MeshHandle, MeshSource, NodeHandle, PlaceholderId};

/// Persistent node representing one accepted cluster.
#[derive(Clone, Debug, PartialEq)]
pub struct Placeholder {
    id: PlaceholderId,
    level: usize,
    /// Sorted.
    members: Vec<NodeHandle>,
    bound: Aabb,
    weight: f64,
    forced: bool,
    dirty: bool,
    mesh: Option<BuiltMesh>,
    built_key: Option<u64>,
}

impl Placeholder {
    pub fn id(&self) -> PlaceholderId {
        self.id
    }

    pub fn level(&self) -> usize {
        self.level
    }

    pub fn members(&self) -> &[NodeHandle] {
        &self.members
    }

    /// Union bound of the cluster this placeholder was created from.
    pub fn cluster_bound(&self) -> &Aabb {
        &self.bound
    }

    pub fn is_forced(&self) -> bool {
        self.forced
    }

    /// Needs a (re)build of its merged mesh.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mesh(&self) -> Option<&BuiltMesh> {
        self.mesh.as_ref()
    }

    pub fn is_built(&self) -> bool {
        self.mesh.is_some()
    }

    /// Merged mesh bound when built, the pre-merge cluster bound otherwise.
    pub fn bound(&self) -> Aabb {
        self.mesh.map_or(self.bound, |mesh| mesh.bound)
    }

    /// Merged mesh weight when built, the summed member weight otherwise.
    pub fn weight(&self) -> f64 {
        self.mesh.map_or(self.weight, |mesh| mesh.cost_weight)
    }

    /// This placeholder as an input of the next level.
    pub fn as_candidate(&self) -> Candidate {
        Candidate::new(self.id, self.bound(), self.weight())
    }

    fn is_current(&self, key: u64) -> bool {
        self.is_built() && !self.dirty && self.built_key == Some(key)
    }
}

/// Notifications for collaborators, drained by the caller.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlaceholderEvent {
    Created { id: PlaceholderId, level: usize },
    Destroyed { id: PlaceholderId, level: usize },
    MeshBuilt { id: PlaceholderId, level: usize, mesh: MeshHandle },
    MeshBuildFailed { id: PlaceholderId, level: usize },
}

/// Outcome of [`LodActorManager::accept`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Acceptance {
    /// A new, dirty placeholder.
    Created(PlaceholderId),
    /// An existing built placeholder with the same members and content was kept.
    Reused(PlaceholderId),
}

impl Acceptance {
    pub fn id(self) -> PlaceholderId {
        match self {
            Acceptance::Created(id) | Acceptance::Reused(id) => id,
        }
    }
}

#[derive(Debug, Default)]
struct LevelSlot {
    placeholders: Vec<PlaceholderId>,
    owners: FxHashMap<NodeHandle, PlaceholderId>,
    /// Placeholders from the previous build, waiting to be reused or destroyed.
    retired: FxHashMap<Vec<NodeHandle>, PlaceholderId>,
    building: bool,
    /// Hash of the level's merge policy.
    policy_key: u64,
    /// Scene revision of the last check and its result.
    checked: Option<(u64, bool)>,
}

/// Owns placeholders for every level.
#[derive(Debug, Default)]
pub struct LodActorManager {
    levels: Vec<LevelSlot>,
    placeholders: FxHashMap<PlaceholderId, Placeholder>,
    next_id: u32,
    events: Vec<PlaceholderEvent>,
    input_key: Option<u64>,
}

impl LodActorManager {
    pub fn new(level_count: usize) -> Self {
        let mut manager = Self::default();
        manager.levels.resize_with(level_count, LevelSlot::default);
        manager
    }

    pub fn level_count(&self) -> usize {
        self.levels.len()
    }

    /// Grow or shrink the level list. Removed levels are cleared first.
    pub fn set_level_count(&mut self, count: usize) {
        for level in (count..self.levels.len()).rev() {
            self.clear_slot(level);
        }
        self.levels.resize_with(count, LevelSlot::default);
    }

    /// Record the merge policy of each level, lowest first. Content keys
    /// include it, so placeholders built under another policy stop matching.
    pub fn set_merge_policies<'p>(&mut self, policies: impl IntoIterator<Item = &'p MergePolicy>) {
        for (slot, policy) in self.levels.iter_mut().zip(policies) {
            slot.policy_key = policy_key(policy);
        }
    }

    pub fn policy_key(&self, level: usize) -> u64 {
        self.levels.get(level).map_or(0, |slot| slot.policy_key)
    }

    fn check_level(&self, level: usize) -> Result<(), HlodError> {
        if level < self.levels.len() {
            Ok(())
        } else {
            Err(HlodError::InvalidLevel {
                level,
                count: self.levels.len(),
            })
        }
    }

    // --- Queries ---

    pub fn get(&self, id: PlaceholderId) -> Option<&Placeholder> {
        self.placeholders.get(&id)
    }

    /// Placeholders at `level`, in creation order. Empty for unknown levels.
    pub fn placeholders_at(&self, level: usize) -> impl Iterator<Item = &Placeholder> {
        self.levels
            .get(level)
            .map(|slot| slot.placeholders.as_slice())
            .unwrap_or_default()
            .iter()
            .filter_map(|id| self.placeholders.get(id))
    }

    pub fn ids_at(&self, level: usize) -> Vec<PlaceholderId> {
        self.levels
            .get(level)
            .map(|slot| slot.placeholders.clone())
            .unwrap_or_default()
    }

    /// Placeholder claiming `handle` at `level`.
    pub fn owner_of(&self, level: usize, handle: NodeHandle) -> Option<PlaceholderId> {
        self.levels.get(level)?.owners.get(&handle).copied()
    }

    pub fn len(&self) -> usize {
        self.placeholders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.placeholders.is_empty()
    }

    pub fn is_level_dirty(&self, level: usize) -> bool {
        self.placeholders_at(level).any(Placeholder::is_dirty)
    }

    pub fn is_building(&self, level: usize) -> bool {
        self.levels.get(level).is_some_and(|slot| slot.building)
    }

    /// Take all pending events.
    pub fn drain_events(&mut self) -> Vec<PlaceholderEvent> {
        std::mem::take(&mut self.events)
    }

    // --- Level pass ---

    /// Start rebuilding `level`: current placeholders are retired so matching
    /// clusters can reclaim them.
    pub fn begin_level(&mut self, level: usize) -> Result<(), HlodError> {
        self.check_level(level)?;
        let slot = &mut self.levels[level];
        if slot.building {
            return Err(HlodError::Reentrant { level });
        }
        slot.building = true;
        slot.owners.clear();
        for id in std::mem::take(&mut slot.placeholders) {
            if let Some(placeholder) = self.placeholders.get(&id) {
                slot.retired.insert(placeholder.members.clone(), id);
            }
        }
        Ok(())
    }

    /// Materialize `cluster` at `level` if it meets `settings.min_num_actors`
    /// (forced clusters always do). `key` is the cluster's content key.
    ///
    /// Returns `Ok(None)` when the cluster is dropped; its members then have
    /// no representation at this level.
    pub fn accept(
        &mut self,
        level: usize,
        cluster: &Cluster,
        settings: &LevelSettings,
        key: u64,
    ) -> Result<Option<Acceptance>, HlodError> {
        self.check_level(level)?;
        if !cluster.is_valid()
            || (!cluster.is_forced() && cluster.member_count() < settings.min_num_actors)
        {
            return Ok(None);
        }

        let mut members = cluster.members().to_vec();
        members.sort_unstable();

        let slot = &mut self.levels[level];
        let reusable = slot
            .retired
            .get(&members)
            .copied()
            .filter(|id| self.placeholders.get(id).is_some_and(|p| p.is_current(key)));

        let acceptance = match reusable {
            Some(id) => {
                slot.retired.remove(&members);
                if let Some(placeholder) = self.placeholders.get_mut(&id) {
                    placeholder.forced = cluster.is_forced();
                }
                Acceptance::Reused(id)
            }
            None => {
                let id = PlaceholderId(self.next_id);
                self.next_id += 1;
                self.placeholders.insert(
                    id,
                    Placeholder {
                        id,
                        level,
                        members: members.clone(),
                        bound: *cluster.bound(),
                        weight: cluster.weight(),
                        forced: cluster.is_forced(),
                        dirty: true,
                        mesh: None,
                        built_key: None,
                    },
                );
                self.events.push(PlaceholderEvent::Created { id, level });
                Acceptance::Created(id)
            }
        };

        let id = acceptance.id();
        slot.placeholders.push(id);
        for member in members {
            let previous = slot.owners.insert(member, id);
            debug_assert!(previous.is_none(), "{member} claimed twice at level {level}");
        }
        Ok(Some(acceptance))
    }

    /// Destroy retired placeholders nobody reclaimed.
    pub fn finish_clustering(&mut self, level: usize) -> Result<usize, HlodError> {
        self.check_level(level)?;
        let stale: Vec<PlaceholderId> =
            self.levels[level].retired.drain().map(|(_, id)| id).collect();
        let count = stale.len();
        for id in stale {
            self.destroy(id);
        }
        Ok(count)
    }

    /// Mark `level` as no longer being built.
    pub fn end_level(&mut self, level: usize) -> Result<(), HlodError> {
        self.check_level(level)?;
        self.levels[level].building = false;
        Ok(())
    }

    // --- Destruction ---

    /// Destroy every placeholder at `level` and release its claims. Idempotent.
    pub fn clear_level(&mut self, level: usize) -> Result<usize, HlodError> {
        self.check_level(level)?;
        Ok(self.clear_slot(level))
    }

    fn clear_slot(&mut self, level: usize) -> usize {
        let slot = &mut self.levels[level];
        let mut ids = std::mem::take(&mut slot.placeholders);
        ids.extend(slot.retired.drain().map(|(_, id)| id));
        slot.owners.clear();
        slot.building = false;
        slot.checked = None;

        let count = ids.len();
        for id in ids {
            self.destroy(id);
        }
        count
    }

    /// Destroy every placeholder on every level.
    pub fn clear_all(&mut self) -> usize {
        (0..self.levels.len()).rev().map(|level| self.clear_slot(level)).sum()
    }

    /// Destroy every placeholder without a built mesh (and, by cascade, its ancestors).
    pub fn clear_unbuilt(&mut self) -> usize {
        let before = self.placeholders.len();
        let unbuilt: Vec<PlaceholderId> = (0..self.levels.len())
            .flat_map(|level| self.placeholders_at(level))
            .filter(|p| !p.is_built())
            .map(Placeholder::id)
            .collect();
        for id in unbuilt {
            self.destroy(id);
        }
        before - self.placeholders.len()
    }

    fn parent_of(&self, level: usize, handle: NodeHandle) -> Option<PlaceholderId> {
        let slot = self.levels.get(level + 1)?;
        slot.owners.get(&handle).copied().or_else(|| {
            slot.retired
                .iter()
                .find(|(members, _)| members.contains(&handle))
                .map(|(_, id)| *id)
        })
    }

    fn destroy(&mut self, id: PlaceholderId) {
        let Some(placeholder) = self.placeholders.remove(&id) else {
            return;
        };
        let level = placeholder.level;
        let slot = &mut self.levels[level];
        slot.placeholders.retain(|other| *other != id);
        slot.retired.retain(|_, other| *other != id);
        for member in &placeholder.members {
            if slot.owners.get(member) == Some(&id) {
                slot.owners.remove(member);
            }
        }
        slot.checked = None;
        self.events.push(PlaceholderEvent::Destroyed { id, level });
        debug!(level, %id, "destroyed LOD actor");

        if let Some(parent) = self.parent_of(level, NodeHandle::Placeholder(id)) {
            self.destroy(parent);
        }
    }

    // --- Dirty tracking ---

    /// Mark every placeholder claiming `handle` (at any level) dirty, together
    /// with its ancestors. Returns how many placeholders changed state.
    pub fn mark_member_changed(&mut self, handle: NodeHandle) -> usize {
        let owners: Vec<PlaceholderId> = self
            .levels
            .iter()
            .filter_map(|slot| slot.owners.get(&handle).copied())
            .collect();
        owners.into_iter().map(|id| self.mark_dirty_upwards(id)).sum()
    }

    fn mark_dirty_upwards(&mut self, id: PlaceholderId) -> usize {
        let mut changed = 0;
        let mut next = Some(id);
        while let Some(id) = next {
            let Some(placeholder) = self.placeholders.get_mut(&id) else {
                break;
            };
            if !placeholder.dirty {
                placeholder.dirty = true;
                changed += 1;
            }
            let level = placeholder.level;
            next = self.parent_of(level, NodeHandle::Placeholder(id));
        }
        changed
    }

    /// Record a successful mesh build. Ancestors that were built from the old
    /// mesh become dirty.
    pub fn set_mesh(&mut self, id: PlaceholderId, mesh: BuiltMesh, key: u64) {
        let Some(placeholder) = self.placeholders.get_mut(&id) else {
            return;
        };
        placeholder.mesh = Some(mesh);
        placeholder.dirty = false;
        placeholder.built_key = Some(key);
        let level = placeholder.level;
        self.events.push(PlaceholderEvent::MeshBuilt {
            id,
            level,
            mesh: mesh.handle,
        });

        if let Some(parent) = self.parent_of(level, NodeHandle::Placeholder(id))
            && self.placeholders.get(&parent).is_some_and(Placeholder::is_built)
        {
            self.mark_dirty_upwards(parent);
        }
    }

    /// Record a failed mesh build: the placeholder falls back to its cluster bound.
    pub fn mark_build_failed(&mut self, id: PlaceholderId) {
        let Some(placeholder) = self.placeholders.get_mut(&id) else {
            return;
        };
        placeholder.mesh = None;
        placeholder.built_key = None;
        placeholder.dirty = true;
        self.events.push(PlaceholderEvent::MeshBuildFailed {
            id,
            level: placeholder.level,
        });
    }

    /// Inputs of a merge for `id`: object meshes, lower-level merged meshes,
    /// or, for unbuilt lower-level placeholders, their own sources.
    pub fn mesh_sources(&self, id: PlaceholderId) -> Vec<MeshSource> {
        let mut sources = Vec::new();
        if let Some(placeholder) = self.placeholders.get(&id) {
            self.collect_sources(&placeholder.members, &mut sources);
        }
        sources
    }

    fn collect_sources(&self, members: &[NodeHandle], sources: &mut Vec<MeshSource>) {
        for member in members {
            match *member {
                NodeHandle::Object(object) => sources.push(MeshSource::Object(object)),
                NodeHandle::Placeholder(child) => {
                    let Some(child) = self.placeholders.get(&child) else {
                        continue;
                    };
                    match child.mesh {
                        Some(mesh) => sources.push(MeshSource::Merged(mesh.handle)),
                        None => self.collect_sources(&child.members, sources),
                    }
                }
            }
        }
    }

    // --- Needs-build cache ---

    /// Stamp every level as checked against `revision` after a completed build.
    pub fn record_build(&mut self, revision: u64, input_key: u64) {
        self.input_key = Some(input_key);
        for slot in &mut self.levels {
            slot.checked = Some((revision, false));
        }
    }

    /// Drop every cached check (e.g. after a settings change).
    pub fn invalidate_checks(&mut self) {
        self.input_key = None;
        for slot in &mut self.levels {
            slot.checked = None;
        }
    }

    /// Whether `level` needs rebuilding.
    ///
    /// A dirty placeholder always answers `true`. Otherwise the cheap check
    /// trusts the cached result as long as the scene revision has not moved
    /// since the last check or build; `force` recomputes from the current
    /// scene contents and member revisions and refreshes the cache.
    pub fn needs_build<S: HlodScene + ?Sized>(
        &mut self,
        level: usize,
        force: bool,
        scene: &S,
    ) -> Result<bool, HlodError> {
        self.check_level(level)?;
        if self.is_level_dirty(level) {
            return Ok(true);
        }

        let revision = scene.revision();
        if !force {
            return Ok(match self.levels[level].checked {
                Some((checked, cached)) if checked == revision => cached,
                _ => true,
            });
        }

        let objects = scene.objects();
        let input_stale =
            self.input_key != Some(scene_input_key(&objects, &scene.override_volumes()));
        let revisions = object_revisions(&objects);
        let mut keys = KeyCache::new(&revisions);
        let keys_stale = self.placeholders_at(level).any(|p| {
            p.built_key != Some(keys.members_key(self, p.level, &p.members))
        });

        let result = input_stale || keys_stale;
        self.levels[level].checked = Some((revision, result));
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::{MemoryScene, ObjectId, SceneObject};
    use glam::DVec3;

    fn unit(id: u64, x: f64) -> Candidate {
        Candidate::new(
            ObjectId(id),
            Aabb::new(DVec3::new(x, 0.0, 0.0), DVec3::new(x + 1.0, 1.0, 1.0)),
            1.0,
        )
    }

    fn pair_cluster(a: u64, b: u64) -> Cluster {
        Cluster::merge(
            &Cluster::singleton(&unit(a, a as f64)),
            &Cluster::singleton(&unit(b, b as f64)),
        )
    }

    fn settings(min_num_actors: usize) -> LevelSettings {
        LevelSettings {
            min_num_actors,
            ..LevelSettings::default()
        }
    }

    fn mesh(handle: u64) -> BuiltMesh {
        BuiltMesh {
            handle: MeshHandle(handle),
            bound: Aabb::new(DVec3::ZERO, DVec3::ONE),
            cost_weight: 1.0,
        }
    }

    #[test]
    fn test_accept_respects_min_num_actors() {
        let mut manager = LodActorManager::new(1);
        manager.begin_level(0).unwrap();
        let single = Cluster::singleton(&unit(1, 0.0));
        assert_eq!(manager.accept(0, &single, &settings(2), 0).unwrap(), None);
        let accepted = manager.accept(0, &pair_cluster(2, 3), &settings(2), 0).unwrap();
        assert!(matches!(accepted, Some(Acceptance::Created(_))));
        assert_eq!(manager.len(), 1);
    }

    #[test]
    fn test_forced_cluster_ignores_min_num_actors() {
        let mut manager = LodActorManager::new(1);
        manager.begin_level(0).unwrap();
        let forced = Cluster::forced([&unit(1, 0.0)]).unwrap();
        assert!(manager.accept(0, &forced, &settings(5), 0).unwrap().is_some());
    }

    #[test]
    fn test_accept_claims_members() {
        let mut manager = LodActorManager::new(1);
        manager.begin_level(0).unwrap();
        let id = manager
            .accept(0, &pair_cluster(1, 2), &settings(2), 0)
            .unwrap()
            .unwrap()
            .id();
        assert_eq!(manager.owner_of(0, ObjectId(1).into()), Some(id));
        assert_eq!(manager.owner_of(0, ObjectId(2).into()), Some(id));
        assert_eq!(manager.owner_of(0, ObjectId(3).into()), None);
        assert!(manager.get(id).unwrap().is_dirty());
    }

    #[test]
    fn test_invalid_level_is_rejected() {
        let mut manager = LodActorManager::new(1);
        assert!(matches!(
            manager.begin_level(3),
            Err(HlodError::InvalidLevel { level: 3, count: 1 })
        ));
        assert!(manager.clear_level(1).is_err());
    }

    #[test]
    fn test_begin_level_twice_is_reentrant() {
        let mut manager = LodActorManager::new(1);
        manager.begin_level(0).unwrap();
        assert!(matches!(
            manager.begin_level(0),
            Err(HlodError::Reentrant { level: 0 })
        ));
        manager.end_level(0).unwrap();
        assert!(manager.begin_level(0).is_ok());
    }

    #[test]
    fn test_clear_level_is_idempotent() {
        let mut manager = LodActorManager::new(1);
        manager.begin_level(0).unwrap();
        manager.accept(0, &pair_cluster(1, 2), &settings(2), 0).unwrap();
        manager.end_level(0).unwrap();
        assert_eq!(manager.clear_level(0).unwrap(), 1);
        assert_eq!(manager.clear_level(0).unwrap(), 0);
        assert!(manager.is_empty());
        assert_eq!(manager.owner_of(0, ObjectId(1).into()), None);
    }

    fn two_level_manager() -> (LodActorManager, PlaceholderId, PlaceholderId) {
        let mut manager = LodActorManager::new(2);
        manager.begin_level(0).unwrap();
        let child = manager
            .accept(0, &pair_cluster(1, 2), &settings(2), 0)
            .unwrap()
            .unwrap()
            .id();
        manager.finish_clustering(0).unwrap();
        manager.end_level(0).unwrap();

        manager.begin_level(1).unwrap();
        let child_candidate = manager.get(child).unwrap().as_candidate();
        let parent_cluster = Cluster::merge(
            &Cluster::singleton(&child_candidate),
            &Cluster::singleton(&unit(9, 9.0)),
        );
        let parent = manager
            .accept(1, &parent_cluster, &settings(2), 0)
            .unwrap()
            .unwrap()
            .id();
        manager.finish_clustering(1).unwrap();
        manager.end_level(1).unwrap();
        (manager, child, parent)
    }

    #[test]
    fn test_destroying_child_cascades_to_parent() {
        let (mut manager, child, parent) = two_level_manager();
        manager.drain_events();
        manager.clear_level(0).unwrap();
        assert!(manager.get(child).is_none());
        assert!(manager.get(parent).is_none());
        let events = manager.drain_events();
        assert!(events.contains(&PlaceholderEvent::Destroyed { id: child, level: 0 }));
        assert!(events.contains(&PlaceholderEvent::Destroyed { id: parent, level: 1 }));
    }

    #[test]
    fn test_member_change_marks_ancestors_dirty() {
        let (mut manager, child, parent) = two_level_manager();
        manager.set_mesh(child, mesh(1), 0);
        manager.set_mesh(parent, mesh(2), 0);
        assert!(!manager.is_level_dirty(0));
        assert!(!manager.is_level_dirty(1));

        assert_eq!(manager.mark_member_changed(ObjectId(1).into()), 2);
        assert!(manager.get(child).unwrap().is_dirty());
        assert!(manager.get(parent).unwrap().is_dirty());
    }

    #[test]
    fn test_carried_object_change_marks_owner_dirty() {
        let (mut manager, child, parent) = two_level_manager();
        manager.set_mesh(child, mesh(1), 0);
        manager.set_mesh(parent, mesh(2), 0);
        assert_eq!(manager.mark_member_changed(ObjectId(9).into()), 1);
        assert!(!manager.get(child).unwrap().is_dirty());
        assert!(manager.get(parent).unwrap().is_dirty());
    }

    #[test]
    fn test_rebuilding_child_dirties_built_parent() {
        let (mut manager, child, parent) = two_level_manager();
        manager.set_mesh(child, mesh(1), 0);
        manager.set_mesh(parent, mesh(2), 0);
        manager.set_mesh(child, mesh(3), 0);
        assert!(manager.get(parent).unwrap().is_dirty());
    }

    #[test]
    fn test_mesh_sources_flatten_unbuilt_children() {
        let (mut manager, child, parent) = two_level_manager();
        let mut sources = manager.mesh_sources(parent);
        sources.sort_by_key(|s| format!("{s:?}"));
        assert_eq!(
            sources,
            vec![
                MeshSource::Object(ObjectId(1)),
                MeshSource::Object(ObjectId(2)),
                MeshSource::Object(ObjectId(9)),
            ]
        );

        manager.set_mesh(child, mesh(7), 0);
        let sources = manager.mesh_sources(parent);
        assert!(sources.contains(&MeshSource::Merged(MeshHandle(7))));
        assert!(sources.contains(&MeshSource::Object(ObjectId(9))));
        assert_eq!(sources.len(), 2);
    }

    #[test]
    fn test_failed_build_falls_back_to_cluster_bound() {
        let (mut manager, child, _) = two_level_manager();
        let cluster_bound = *manager.get(child).unwrap().cluster_bound();
        manager.set_mesh(child, mesh(1), 0);
        assert_eq!(manager.get(child).unwrap().bound(), mesh(1).bound);
        manager.mark_build_failed(child);
        let placeholder = manager.get(child).unwrap();
        assert!(placeholder.is_dirty());
        assert_eq!(placeholder.bound(), cluster_bound);
    }

    #[test]
    fn test_clear_unbuilt_keeps_built() {
        let mut manager = LodActorManager::new(1);
        manager.begin_level(0).unwrap();
        let built = manager
            .accept(0, &pair_cluster(1, 2), &settings(2), 0)
            .unwrap()
            .unwrap()
            .id();
        let preview = manager
            .accept(0, &pair_cluster(3, 4), &settings(2), 0)
            .unwrap()
            .unwrap()
            .id();
        manager.end_level(0).unwrap();
        manager.set_mesh(built, mesh(1), 0);

        assert_eq!(manager.clear_unbuilt(), 1);
        assert!(manager.get(built).is_some());
        assert!(manager.get(preview).is_none());
    }

    #[test]
    fn test_reuse_requires_matching_key() {
        let mut manager = LodActorManager::new(1);
        manager.begin_level(0).unwrap();
        let id = manager
            .accept(0, &pair_cluster(1, 2), &settings(2), 11)
            .unwrap()
            .unwrap()
            .id();
        manager.end_level(0).unwrap();
        manager.set_mesh(id, mesh(1), 11);

        manager.begin_level(0).unwrap();
        let again = manager.accept(0, &pair_cluster(1, 2), &settings(2), 11).unwrap();
        assert_eq!(again, Some(Acceptance::Reused(id)));
        manager.finish_clustering(0).unwrap();
        manager.end_level(0).unwrap();

        manager.begin_level(0).unwrap();
        let changed = manager.accept(0, &pair_cluster(1, 2), &settings(2), 12).unwrap();
        assert!(matches!(changed, Some(Acceptance::Created(new_id)) if new_id != id));
        assert_eq!(manager.finish_clustering(0).unwrap(), 1);
        assert!(manager.get(id).is_none());
    }

    #[test]
    fn test_needs_build_cache() {
        let mut scene = MemoryScene::new();
        scene.insert(SceneObject::new(
            ObjectId(1),
            Aabb::new(DVec3::ZERO, DVec3::ONE),
            1.0,
        ));
        let mut manager = LodActorManager::new(1);
        assert!(manager.needs_build(0, false, &scene).unwrap());

        let input_key = scene_input_key(&scene.objects(), &scene.override_volumes());
        manager.record_build(scene.revision(), input_key);
        assert!(!manager.needs_build(0, false, &scene).unwrap());
        assert!(!manager.needs_build(0, true, &scene).unwrap());

        scene.set_bound(ObjectId(1), Aabb::new(DVec3::ONE, DVec3::splat(2.0)));
        assert!(manager.needs_build(0, false, &scene).unwrap());
        assert!(manager.needs_build(0, true, &scene).unwrap());
        // The forced check refreshed the cache with its result.
        assert!(manager.needs_build(0, false, &scene).unwrap());
    }
}
