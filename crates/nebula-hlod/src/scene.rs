//! Boundary types shared with the surrounding scene and the mesh merge step.
//!
//! The builder never owns scene objects or geometry. It reads [`SceneObject`]
//! and [`OverrideVolume`] snapshots through [`HlodScene`] and hands merge
//! requests to a [`MeshBuilder`], receiving opaque [`MeshHandle`]s back.

use std::fmt;

use nebula_config::MergePolicy;
use nebula_math::{Aabb, BoundingSphere};

use crate::error::MeshBuildError;

// ---------------------------------------------------------------------------
// Handles
// ---------------------------------------------------------------------------

/// Identity of a scene object, assigned by the scene.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(pub u64);

/// Stable handle of a LOD actor (placeholder), assigned by the manager.
/// Ids are never reused within one manager.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PlaceholderId(pub u32);

/// Identity of an override volume, assigned by the scene.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VolumeId(pub u64);

/// Opaque handle of a merged mesh produced by a [`MeshBuilder`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MeshHandle(pub u64);

/// Anything that can be a cluster member: a scene object at level 0, or a
/// lower-level placeholder (and carried-forward objects) above it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NodeHandle {
    Object(ObjectId),
    Placeholder(PlaceholderId),
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "object#{}", self.0)
    }
}

impl fmt::Display for PlaceholderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "lod-actor#{}", self.0)
    }
}

impl fmt::Display for NodeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeHandle::Object(id) => id.fmt(f),
            NodeHandle::Placeholder(id) => id.fmt(f),
        }
    }
}

impl From<ObjectId> for NodeHandle {
    fn from(id: ObjectId) -> Self {
        NodeHandle::Object(id)
    }
}

impl From<PlaceholderId> for NodeHandle {
    fn from(id: PlaceholderId) -> Self {
        NodeHandle::Placeholder(id)
    }
}

// ---------------------------------------------------------------------------
// Scene objects and volumes
// ---------------------------------------------------------------------------

/// Read-only snapshot of one scene object.
#[derive(Clone, Debug, PartialEq)]
pub struct SceneObject {
    pub id: ObjectId,
    /// World-space bounds.
    pub bound: Aabb,
    /// Relative geometric complexity. Negative values are treated as zero.
    pub cost_weight: f64,
    /// Static, auto-LOD enabled and not excluded by policy.
    pub eligible: bool,
    /// HLOD levels this object must not take part in.
    pub excluded_levels: Vec<usize>,
    /// Bumped by the scene whenever the object's transform or mesh changes.
    pub revision: u64,
}

impl SceneObject {
    /// An eligible object at revision 0.
    pub fn new(id: ObjectId, bound: Aabb, cost_weight: f64) -> Self {
        Self {
            id,
            bound,
            cost_weight,
            eligible: true,
            excluded_levels: Vec::new(),
            revision: 0,
        }
    }

    #[must_use]
    pub fn ineligible(mut self) -> Self {
        self.eligible = false;
        self
    }

    #[must_use]
    pub fn excluded_from(mut self, level: usize) -> Self {
        if !self.excluded_levels.contains(&level) {
            self.excluded_levels.push(level);
        }
        self
    }

    /// Whether the object may be clustered at `level`.
    pub fn is_eligible_at(&self, level: usize) -> bool {
        self.eligible && !self.excluded_levels.contains(&level)
    }

    pub(crate) fn weight(&self) -> f64 {
        self.cost_weight.max(0.0)
    }
}

/// Region shape of an override volume.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum VolumeShape {
    Box(Aabb),
    Sphere(BoundingSphere),
}

impl VolumeShape {
    /// `bound` lies entirely inside the shape.
    pub fn contains(&self, bound: &Aabb) -> bool {
        match self {
            VolumeShape::Box(aabb) => aabb.contains(bound),
            VolumeShape::Sphere(sphere) => sphere.contains_aabb(bound),
        }
    }

    pub fn intersects(&self, bound: &Aabb) -> bool {
        match self {
            VolumeShape::Box(aabb) => aabb.intersects(bound),
            VolumeShape::Sphere(sphere) => sphere.intersects_aabb(bound),
        }
    }
}

/// Which HLOD levels an override volume applies to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum VolumeLevels {
    All,
    Only(Vec<usize>),
}

/// User-authored region forcing its contained objects into one cluster.
#[derive(Clone, Debug, PartialEq)]
pub struct OverrideVolume {
    pub id: VolumeId,
    pub shape: VolumeShape,
    pub levels: VolumeLevels,
    /// Also claim objects that only overlap the volume.
    pub include_overlapping: bool,
}

impl OverrideVolume {
    /// A volume applying to every level that claims fully contained objects.
    pub fn new(id: VolumeId, shape: VolumeShape) -> Self {
        Self {
            id,
            shape,
            levels: VolumeLevels::All,
            include_overlapping: false,
        }
    }

    #[must_use]
    pub fn for_levels(mut self, levels: Vec<usize>) -> Self {
        self.levels = VolumeLevels::Only(levels);
        self
    }

    #[must_use]
    pub fn including_overlapping(mut self) -> Self {
        self.include_overlapping = true;
        self
    }

    pub fn applies_to(&self, level: usize) -> bool {
        match &self.levels {
            VolumeLevels::All => true,
            VolumeLevels::Only(levels) => levels.contains(&level),
        }
    }

    /// Containment test used to claim objects.
    pub fn contains(&self, bound: &Aabb) -> bool {
        self.shape.contains(bound) || (self.include_overlapping && self.shape.intersects(bound))
    }
}

/// Source of objects and volumes for a build.
pub trait HlodScene {
    /// Snapshot of every scene object, eligible or not.
    fn objects(&self) -> Vec<SceneObject>;

    /// Override volumes, in priority order.
    fn override_volumes(&self) -> Vec<OverrideVolume>;

    /// Scene-wide change counter. Must advance whenever any object or volume changes.
    fn revision(&self) -> u64;

    /// Objects that may be clustered at `level`.
    fn eligible_objects(&self, level: usize) -> Vec<SceneObject> {
        self.objects()
            .into_iter()
            .filter(|object| object.is_eligible_at(level))
            .collect()
    }
}

/// Plain in-memory scene, useful for tools and tests.
#[derive(Clone, Debug, Default)]
pub struct MemoryScene {
    objects: Vec<SceneObject>,
    volumes: Vec<OverrideVolume>,
    revision: u64,
}

impl MemoryScene {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace an object.
    pub fn insert(&mut self, object: SceneObject) {
        match self.objects.iter_mut().find(|o| o.id == object.id) {
            Some(existing) => *existing = object,
            None => self.objects.push(object),
        }
        self.revision += 1;
    }

    pub fn remove(&mut self, id: ObjectId) -> Option<SceneObject> {
        let index = self.objects.iter().position(|o| o.id == id)?;
        self.revision += 1;
        Some(self.objects.remove(index))
    }

    /// Move an object, bumping its revision.
    pub fn set_bound(&mut self, id: ObjectId, bound: Aabb) -> bool {
        let Some(object) = self.objects.iter_mut().find(|o| o.id == id) else {
            return false;
        };
        object.bound = bound;
        object.revision += 1;
        self.revision += 1;
        true
    }

    pub fn add_volume(&mut self, volume: OverrideVolume) {
        self.volumes.push(volume);
        self.revision += 1;
    }

    pub fn object(&self, id: ObjectId) -> Option<&SceneObject> {
        self.objects.iter().find(|o| o.id == id)
    }
}

impl HlodScene for MemoryScene {
    fn objects(&self) -> Vec<SceneObject> {
        self.objects.clone()
    }

    fn override_volumes(&self) -> Vec<OverrideVolume> {
        self.volumes.clone()
    }

    fn revision(&self) -> u64 {
        self.revision
    }
}

// ---------------------------------------------------------------------------
// Mesh building
// ---------------------------------------------------------------------------

/// One input of a merge request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MeshSource {
    /// The scene object's own mesh.
    Object(ObjectId),
    /// A previously merged mesh of a lower-level placeholder.
    Merged(MeshHandle),
}

/// Everything the mesh builder needs to produce one LOD actor's mesh.
#[derive(Clone, Debug)]
pub struct MeshBuildRequest<'a> {
    pub placeholder: PlaceholderId,
    pub level: usize,
    pub sources: Vec<MeshSource>,
    /// Bound of the cluster the mesh is built for.
    pub bound: Aabb,
    pub policy: &'a MergePolicy,
}

/// Result of a successful merge.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BuiltMesh {
    pub handle: MeshHandle,
    /// Bound of the merged geometry; replaces the cluster bound for the next level.
    pub bound: Aabb,
    /// Complexity of the merged mesh; replaces the summed member weight for the next level.
    pub cost_weight: f64,
}

/// External mesh merge/simplification collaborator. Calls block until done.
pub trait MeshBuilder {
    fn build_merged_mesh(&mut self, request: &MeshBuildRequest<'_>)
    -> Result<BuiltMesh, MeshBuildError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::DVec3;

    fn unit_at(x: f64) -> Aabb {
        Aabb::new(DVec3::new(x, 0.0, 0.0), DVec3::new(x + 1.0, 1.0, 1.0))
    }

    #[test]
    fn test_exclusion_is_per_level() {
        let object = SceneObject::new(ObjectId(1), unit_at(0.0), 1.0).excluded_from(0);
        assert!(!object.is_eligible_at(0));
        assert!(object.is_eligible_at(1));
        assert!(!object.clone().ineligible().is_eligible_at(1));
    }

    #[test]
    fn test_volume_contains_and_overlap() {
        let shape = VolumeShape::Box(Aabb::new(DVec3::ZERO, DVec3::splat(5.0)));
        let volume = OverrideVolume::new(VolumeId(1), shape);
        assert!(volume.contains(&unit_at(2.0)));
        assert!(!volume.contains(&unit_at(4.5)));
        assert!(volume.clone().including_overlapping().contains(&unit_at(4.5)));
    }

    #[test]
    fn test_volume_level_filter() {
        let shape = VolumeShape::Sphere(BoundingSphere::new(DVec3::ZERO, 10.0));
        let volume = OverrideVolume::new(VolumeId(1), shape).for_levels(vec![1]);
        assert!(!volume.applies_to(0));
        assert!(volume.applies_to(1));
    }

    #[test]
    fn test_memory_scene_revisions() {
        let mut scene = MemoryScene::new();
        scene.insert(SceneObject::new(ObjectId(7), unit_at(0.0), 1.0));
        let before = scene.revision();
        assert!(scene.set_bound(ObjectId(7), unit_at(3.0)));
        assert!(scene.revision() > before);
        assert_eq!(scene.object(ObjectId(7)).map(|o| o.revision), Some(1));
        assert!(!scene.set_bound(ObjectId(8), unit_at(3.0)));
    }

    #[test]
    fn test_eligible_objects_filters() {
        let mut scene = MemoryScene::new();
        scene.insert(SceneObject::new(ObjectId(1), unit_at(0.0), 1.0));
        scene.insert(SceneObject::new(ObjectId(2), unit_at(2.0), 1.0).ineligible());
        scene.insert(SceneObject::new(ObjectId(3), unit_at(4.0), 1.0).excluded_from(0));
        let ids: Vec<_> = scene.eligible_objects(0).iter().map(|o| o.id).collect();
        assert_eq!(ids, vec![ObjectId(1)]);
        assert_eq!(scene.eligible_objects(1).len(), 2);
    }
}
