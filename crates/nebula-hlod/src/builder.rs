//! Build driver: runs the level passes, invokes the mesh builder and answers
//! "does this scene need a rebuild?".
//!
//! Level `L + 1` is clustered from the placeholders of level `L`, so levels
//! are always built in order and each level's meshes are built before the
//! next level starts. A preview build runs the same clustering but never
//! calls the mesh builder.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use nebula_config::{HlodConfig, LevelSettings};
use tracing::{debug, info, warn};

use crate::cluster::Candidate;
use crate::error::{HlodError, MeshBuildError};
use crate::graph::{ClusterGraph, MergeRules, SeedMode};
use crate::key::{KeyCache, object_revisions, scene_input_key};
use crate::manager::{Acceptance, LodActorManager, Placeholder, PlaceholderEvent};
use crate::scene::{
    BuiltMesh, HlodScene, MeshBuildRequest, MeshBuilder, ObjectId, PlaceholderId, SceneObject,
};

/// Shareable flag that stops a running build before its next level.
#[derive(Clone, Debug, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    /// Consume a pending cancellation.
    fn take(&self) -> bool {
        self.0.swap(false, Ordering::Relaxed)
    }
}

/// Counts for one level pass.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LevelReport {
    pub level: usize,
    /// Inputs of the pass (objects and lower-level placeholders).
    pub candidates: usize,
    /// Clusters left after merging, accepted or not.
    pub clusters: usize,
    pub merges: usize,
    pub created: usize,
    pub reused: usize,
    /// Candidates without a placeholder at this level.
    pub dropped_members: usize,
    pub meshes_built: usize,
    pub meshes_failed: usize,
}

impl LevelReport {
    pub fn placeholders(&self) -> usize {
        self.created + self.reused
    }
}

/// Summary of a build, preview build or mesh-only build.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BuildReport {
    pub preview: bool,
    pub levels: Vec<LevelReport>,
    pub elapsed: Duration,
}

impl BuildReport {
    pub fn placeholders(&self) -> usize {
        self.levels.iter().map(LevelReport::placeholders).sum()
    }

    pub fn created(&self) -> usize {
        self.levels.iter().map(|l| l.created).sum()
    }

    pub fn reused(&self) -> usize {
        self.levels.iter().map(|l| l.reused).sum()
    }

    pub fn meshes_built(&self) -> usize {
        self.levels.iter().map(|l| l.meshes_built).sum()
    }

    pub fn meshes_failed(&self) -> usize {
        self.levels.iter().map(|l| l.meshes_failed).sum()
    }
}

/// A built merged mesh, for whoever persists generated assets.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GeneratedMesh {
    pub placeholder: PlaceholderId,
    pub level: usize,
    pub mesh: BuiltMesh,
}

/// Owns the HLOD hierarchy of one scene.
#[derive(Debug)]
pub struct HlodBuilder {
    config: HlodConfig,
    manager: LodActorManager,
    cancel: CancelHandle,
    /// Settings of the last completed full build.
    built_config: Option<HlodConfig>,
}

impl HlodBuilder {
    pub fn new(config: HlodConfig) -> Result<Self, HlodError> {
        config.validate()?;
        let mut manager = LodActorManager::new(config.levels.len());
        manager.set_merge_policies(config.levels.iter().map(|level| &level.merge));
        Ok(Self {
            manager,
            config,
            cancel: CancelHandle::default(),
            built_config: None,
        })
    }

    pub fn config(&self) -> &HlodConfig {
        &self.config
    }

    /// Replace the settings. Placeholders are kept; the next build reclusters
    /// against the new settings and `needs_build` reports `true` until then.
    pub fn set_config(&mut self, config: HlodConfig) -> Result<(), HlodError> {
        config.validate()?;
        self.manager.set_level_count(config.levels.len());
        self.manager.set_merge_policies(config.levels.iter().map(|level| &level.merge));
        self.manager.invalidate_checks();
        self.config = config;
        Ok(())
    }

    pub fn manager(&self) -> &LodActorManager {
        &self.manager
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    pub fn drain_events(&mut self) -> Vec<PlaceholderEvent> {
        self.manager.drain_events()
    }

    fn active_levels(&self) -> usize {
        if self.config.single_cluster {
            self.config.levels.len().min(1)
        } else {
            self.config.levels.len()
        }
    }

    fn level_settings(&self, level: usize) -> Result<&LevelSettings, HlodError> {
        self.config.levels.get(level).ok_or(HlodError::InvalidLevel {
            level,
            count: self.config.levels.len(),
        })
    }

    /// Cluster every level and build a merged mesh for each new or dirty
    /// placeholder.
    ///
    /// Mesh failures do not abort the build; they are logged and counted in
    /// the report, and the placeholder stays dirty.
    pub fn build<S, M>(&mut self, scene: &S, meshes: &mut M) -> Result<BuildReport, HlodError>
    where
        S: HlodScene + ?Sized,
        M: MeshBuilder,
    {
        self.run(scene, Some(meshes as &mut dyn MeshBuilder))
    }

    /// Cluster every level without building meshes. The resulting
    /// placeholders stay dirty.
    pub fn preview_build<S>(&mut self, scene: &S) -> Result<BuildReport, HlodError>
    where
        S: HlodScene + ?Sized,
    {
        self.run(scene, None)
    }

    fn run<S>(
        &mut self,
        scene: &S,
        mut meshes: Option<&mut dyn MeshBuilder>,
    ) -> Result<BuildReport, HlodError>
    where
        S: HlodScene + ?Sized,
    {
        let started = Instant::now();
        let preview = meshes.is_none();
        let objects = scene.objects();
        let volumes = scene.override_volumes();
        let revisions = object_revisions(&objects);
        let mut keys = KeyCache::new(&revisions);

        let active_levels = self.active_levels();
        for level in active_levels..self.config.levels.len() {
            self.manager.clear_level(level)?;
        }

        let mut report = BuildReport {
            preview,
            ..BuildReport::default()
        };
        let mut pending: Vec<&SceneObject> = objects.iter().filter(|o| o.eligible).collect();

        for level in 0..active_levels {
            if self.cancel.take() {
                info!(level, "HLOD build cancelled");
                return Err(HlodError::Cancelled { level });
            }
            let settings = self.level_settings(level)?.clone();

            let (active, deferred): (Vec<&SceneObject>, Vec<&SceneObject>) =
                pending.into_iter().partition(|o| o.is_eligible_at(level));
            let mut candidates: Vec<Candidate> = match level {
                0 => Vec::with_capacity(active.len()),
                _ => self
                    .manager
                    .placeholders_at(level - 1)
                    .map(Placeholder::as_candidate)
                    .collect(),
            };
            candidates.extend(active.iter().map(|o| Candidate::new(o.id, o.bound, o.weight())));

            let mut level_report = LevelReport {
                level,
                candidates: candidates.len(),
                ..LevelReport::default()
            };

            self.manager.begin_level(level)?;

            let rules = MergeRules::from_settings(&settings, self.config.volumes_absorb_neighbors);
            let mode = SeedMode::for_level(level, &settings, self.config.single_cluster);
            let mut graph = ClusterGraph::initialize(level, &candidates, &volumes, rules, mode);
            level_report.merges = graph.run();
            let clusters = graph.into_clusters();
            level_report.clusters = clusters.len();

            for cluster in &clusters {
                let mut members = cluster.members().to_vec();
                members.sort_unstable();
                let key = keys.members_key(&self.manager, level, &members);
                match self.manager.accept(level, cluster, &settings, key)? {
                    Some(Acceptance::Created(_)) => level_report.created += 1,
                    Some(Acceptance::Reused(_)) => level_report.reused += 1,
                    None => {}
                }
            }
            self.manager.finish_clustering(level)?;

            level_report.dropped_members = candidates
                .iter()
                .filter(|c| self.manager.owner_of(level, c.handle).is_none())
                .count();

            if let Some(builder) = meshes.as_deref_mut() {
                for id in self.manager.ids_at(level) {
                    if !self.manager.get(id).is_some_and(Placeholder::is_dirty) {
                        continue;
                    }
                    match self.build_placeholder_mesh(id, builder, &mut keys) {
                        Ok(_) => level_report.meshes_built += 1,
                        Err(HlodError::MeshBuild { .. }) => level_report.meshes_failed += 1,
                        Err(err) => return Err(err),
                    }
                }
            }

            self.manager.end_level(level)?;

            debug!(
                level,
                candidates = level_report.candidates,
                merges = level_report.merges,
                created = level_report.created,
                reused = level_report.reused,
                dropped = level_report.dropped_members,
                "HLOD level clustered"
            );

            pending = deferred;
            if self.config.carry_rejected_forward {
                pending.extend(
                    active
                        .into_iter()
                        .filter(|o| self.manager.owner_of(level, o.id.into()).is_none()),
                );
            }
            report.levels.push(level_report);
        }

        if preview {
            self.manager.invalidate_checks();
        } else {
            self.manager
                .record_build(scene.revision(), scene_input_key(&objects, &volumes));
            self.built_config = Some(self.config.clone());
        }

        report.elapsed = started.elapsed();
        info!(
            preview,
            levels = report.levels.len(),
            placeholders = report.placeholders(),
            created = report.created(),
            reused = report.reused(),
            meshes_built = report.meshes_built(),
            meshes_failed = report.meshes_failed(),
            elapsed_ms = report.elapsed.as_millis() as u64,
            "HLOD build finished"
        );
        Ok(report)
    }

    /// Request a merged mesh for `id` and record the outcome.
    fn build_placeholder_mesh(
        &mut self,
        id: PlaceholderId,
        meshes: &mut dyn MeshBuilder,
        keys: &mut KeyCache<'_>,
    ) -> Result<BuiltMesh, HlodError> {
        let Some(placeholder) = self.manager.get(id) else {
            return Err(HlodError::UnknownPlaceholder { id, level: 0 });
        };
        let level = placeholder.level();
        let bound = *placeholder.cluster_bound();
        let key = keys.placeholder_key(&self.manager, id);

        let request = MeshBuildRequest {
            placeholder: id,
            level,
            sources: self.manager.mesh_sources(id),
            bound,
            policy: &self.level_settings(level)?.merge,
        };
        let result = if request.sources.is_empty() {
            Err(MeshBuildError::NoSources)
        } else {
            meshes.build_merged_mesh(&request)
        };

        match result {
            Ok(mesh) => {
                self.manager.set_mesh(id, mesh, key);
                debug!(level, %id, mesh = mesh.handle.0, "built HLOD mesh");
                Ok(mesh)
            }
            Err(source) => {
                warn!(level, %id, error = %source, "HLOD mesh build failed");
                self.manager.mark_build_failed(id);
                Err(HlodError::MeshBuild { id, source })
            }
        }
    }

    /// Rebuild the mesh of one placeholder without reclustering.
    pub fn build_mesh_for_lod_actor<S, M>(
        &mut self,
        id: PlaceholderId,
        level: usize,
        scene: &S,
        meshes: &mut M,
    ) -> Result<BuiltMesh, HlodError>
    where
        S: HlodScene + ?Sized,
        M: MeshBuilder,
    {
        self.level_settings(level)?;
        if self.manager.get(id).is_none_or(|p| p.level() != level) {
            return Err(HlodError::UnknownPlaceholder { id, level });
        }
        if self.manager.is_building(level) {
            return Err(HlodError::Reentrant { level });
        }
        let revisions = object_revisions(&scene.objects());
        let mut keys = KeyCache::new(&revisions);
        self.build_placeholder_mesh(id, meshes, &mut keys)
    }

    /// Build meshes for every dirty placeholder (every placeholder when
    /// `force` is set), level by level, without reclustering.
    pub fn build_meshes_for_lod_actors<S, M>(
        &mut self,
        scene: &S,
        meshes: &mut M,
        force: bool,
    ) -> Result<BuildReport, HlodError>
    where
        S: HlodScene + ?Sized,
        M: MeshBuilder,
    {
        let started = Instant::now();
        let revisions = object_revisions(&scene.objects());
        let mut keys = KeyCache::new(&revisions);
        let mut report = BuildReport::default();

        for level in 0..self.manager.level_count() {
            if self.manager.is_building(level) {
                return Err(HlodError::Reentrant { level });
            }
            let mut level_report = LevelReport {
                level,
                ..LevelReport::default()
            };
            for id in self.manager.ids_at(level) {
                if !force && !self.manager.get(id).is_some_and(Placeholder::is_dirty) {
                    continue;
                }
                match self.build_placeholder_mesh(id, meshes, &mut keys) {
                    Ok(_) => level_report.meshes_built += 1,
                    Err(HlodError::MeshBuild { .. }) => level_report.meshes_failed += 1,
                    Err(err) => return Err(err),
                }
            }
            report.levels.push(level_report);
        }

        report.elapsed = started.elapsed();
        info!(
            force,
            meshes_built = report.meshes_built(),
            meshes_failed = report.meshes_failed(),
            "HLOD meshes rebuilt"
        );
        Ok(report)
    }

    /// Destroy every placeholder on every level.
    pub fn clear_hlods(&mut self) -> usize {
        let cleared = self.manager.clear_all();
        self.manager.invalidate_checks();
        self.built_config = None;
        info!(cleared, "cleared HLODs");
        cleared
    }

    /// Destroy the placeholders a preview build left without meshes.
    pub fn clear_preview_build(&mut self) -> usize {
        let cleared = self.manager.clear_unbuilt();
        if cleared > 0 {
            self.manager.invalidate_checks();
        }
        info!(cleared, "cleared HLOD preview");
        cleared
    }

    /// Whether any level needs rebuilding. See [`LodActorManager::needs_build`]
    /// for the meaning of `force`.
    pub fn needs_build<S>(&mut self, scene: &S, force: bool) -> bool
    where
        S: HlodScene + ?Sized,
    {
        if self.built_config.as_ref() != Some(&self.config) {
            return true;
        }
        let mut stale = false;
        for level in 0..self.active_levels() {
            // Every level is checked so forced checks refresh each cache.
            stale |= self.manager.needs_build(level, force, scene).unwrap_or(true);
        }
        stale
    }

    pub fn needs_build_level<S>(
        &mut self,
        level: usize,
        scene: &S,
        force: bool,
    ) -> Result<bool, HlodError>
    where
        S: HlodScene + ?Sized,
    {
        self.level_settings(level)?;
        if self.built_config.as_ref() != Some(&self.config) {
            return Ok(true);
        }
        self.manager.needs_build(level, force, scene)
    }

    /// Mark placeholders containing `object` (and their ancestors) dirty.
    pub fn notify_object_changed(&mut self, object: ObjectId) -> usize {
        self.manager.mark_member_changed(object.into())
    }

    /// Every built mesh, lowest level first.
    pub fn generated_meshes(&self) -> Vec<GeneratedMesh> {
        (0..self.manager.level_count())
            .flat_map(|level| self.manager.placeholders_at(level))
            .filter_map(|p| {
                p.mesh().map(|mesh| GeneratedMesh {
                    placeholder: p.id(),
                    level: p.level(),
                    mesh: *mesh,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::{MemoryScene, MeshHandle};
    use glam::DVec3;
    use nebula_math::Aabb;

    struct CountingBuilder {
        next: u64,
    }

    impl MeshBuilder for CountingBuilder {
        fn build_merged_mesh(
            &mut self,
            request: &MeshBuildRequest<'_>,
        ) -> Result<BuiltMesh, MeshBuildError> {
            self.next += 1;
            Ok(BuiltMesh {
                handle: MeshHandle(self.next),
                bound: request.bound,
                cost_weight: request.sources.len() as f64,
            })
        }
    }

    fn one_level(min_num_actors: usize) -> HlodConfig {
        HlodConfig {
            levels: vec![LevelSettings {
                highest_cost: 1.0e3,
                min_num_actors,
                desired_bound_radius: None,
                ..LevelSettings::default()
            }],
            ..HlodConfig::default()
        }
    }

    fn scene_with_pair() -> MemoryScene {
        let mut scene = MemoryScene::new();
        for (id, x) in [(1, 0.0), (2, 1.5)] {
            scene.insert(SceneObject::new(
                ObjectId(id),
                Aabb::new(DVec3::new(x, 0.0, 0.0), DVec3::new(x + 1.0, 1.0, 1.0)),
                1.0,
            ));
        }
        scene
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let mut config = one_level(2);
        config.levels[0].highest_cost = -1.0;
        assert!(matches!(HlodBuilder::new(config), Err(HlodError::Config(_))));
    }

    #[test]
    fn test_cancel_handle_is_shared() {
        let builder = HlodBuilder::new(one_level(2)).unwrap();
        let handle = builder.cancel_handle();
        handle.cancel();
        assert!(builder.cancel.is_cancelled());
        assert!(builder.cancel.take());
        assert!(!handle.is_cancelled());
    }

    #[test]
    fn test_build_then_needs_build_is_false() {
        let scene = scene_with_pair();
        let mut builder = HlodBuilder::new(one_level(2)).unwrap();
        assert!(builder.needs_build(&scene, false));

        let report = builder.build(&scene, &mut CountingBuilder { next: 0 }).unwrap();
        assert_eq!(report.created(), 1);
        assert_eq!(report.meshes_built(), 1);
        assert!(!builder.needs_build(&scene, false));
        assert!(!builder.needs_build(&scene, true));
    }

    #[test]
    fn test_preview_build_leaves_dirty_placeholders() {
        let scene = scene_with_pair();
        let mut builder = HlodBuilder::new(one_level(2)).unwrap();
        let report = builder.preview_build(&scene).unwrap();
        assert!(report.preview);
        assert_eq!(report.placeholders(), 1);
        assert_eq!(report.meshes_built(), 0);
        assert!(builder.needs_build(&scene, false));
        assert_eq!(builder.clear_preview_build(), 1);
        assert!(builder.manager().is_empty());
    }

    #[test]
    fn test_config_change_requires_rebuild() {
        let scene = scene_with_pair();
        let mut builder = HlodBuilder::new(one_level(2)).unwrap();
        builder.build(&scene, &mut CountingBuilder { next: 0 }).unwrap();
        builder.set_config(one_level(3)).unwrap();
        assert!(builder.needs_build(&scene, false));
    }

    #[test]
    fn test_build_mesh_for_unknown_lod_actor() {
        let scene = scene_with_pair();
        let mut builder = HlodBuilder::new(one_level(2)).unwrap();
        let mut meshes = CountingBuilder { next: 0 };
        let err = builder
            .build_mesh_for_lod_actor(PlaceholderId(42), 0, &scene, &mut meshes)
            .unwrap_err();
        assert!(matches!(err, HlodError::UnknownPlaceholder { level: 0, .. }));

        let err = builder
            .build_mesh_for_lod_actor(PlaceholderId(0), 5, &scene, &mut meshes)
            .unwrap_err();
        assert!(matches!(err, HlodError::InvalidLevel { level: 5, count: 1 }));
    }

    #[test]
    fn test_generated_meshes_lists_built_placeholders() {
        let scene = scene_with_pair();
        let mut builder = HlodBuilder::new(one_level(2)).unwrap();
        builder.build(&scene, &mut CountingBuilder { next: 0 }).unwrap();
        let generated = builder.generated_meshes();
        assert_eq!(generated.len(), 1);
        assert_eq!(generated[0].level, 0);
        assert_eq!(generated[0].mesh.handle, MeshHandle(1));
    }
}
