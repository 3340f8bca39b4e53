//! Content keys used to decide whether built LOD actors are still current.
//!
//! A placeholder's key hashes its sorted members together with each member's
//! current revision (scene objects) or content key (lower-level placeholders),
//! so any change below a placeholder changes its key. The level's merge policy
//! is folded in as well, so new merge settings invalidate built meshes.
//! `FxHasher` keeps keys stable across runs.

use std::hash::{Hash, Hasher};

use nebula_config::MergePolicy;
use nebula_math::Aabb;
use rustc_hash::{FxHashMap, FxHasher};

use crate::manager::LodActorManager;
use crate::scene::{
    NodeHandle, ObjectId, OverrideVolume, PlaceholderId, SceneObject, VolumeLevels, VolumeShape,
};

/// Key used for members that no longer exist.
const MISSING: u64 = u64::MAX;

/// Current revision of every object in a scene snapshot.
pub fn object_revisions(objects: &[SceneObject]) -> FxHashMap<ObjectId, u64> {
    objects.iter().map(|o| (o.id, o.revision)).collect()
}

/// Hash of everything in the scene that influences clustering.
pub fn scene_input_key(objects: &[SceneObject], volumes: &[OverrideVolume]) -> u64 {
    let mut sorted: Vec<&SceneObject> = objects.iter().collect();
    sorted.sort_unstable_by_key(|o| o.id);

    let mut hasher = FxHasher::default();
    for object in sorted {
        object.id.hash(&mut hasher);
        object.revision.hash(&mut hasher);
        object.eligible.hash(&mut hasher);
        object.excluded_levels.hash(&mut hasher);
        object.cost_weight.to_bits().hash(&mut hasher);
        hash_aabb(&object.bound, &mut hasher);
    }
    for volume in volumes {
        volume.id.hash(&mut hasher);
        volume.include_overlapping.hash(&mut hasher);
        match &volume.levels {
            VolumeLevels::All => 0u8.hash(&mut hasher),
            VolumeLevels::Only(levels) => {
                1u8.hash(&mut hasher);
                levels.hash(&mut hasher);
            }
        }
        match &volume.shape {
            VolumeShape::Box(aabb) => {
                0u8.hash(&mut hasher);
                hash_aabb(aabb, &mut hasher);
            }
            VolumeShape::Sphere(sphere) => {
                1u8.hash(&mut hasher);
                sphere.center.to_array().map(f64::to_bits).hash(&mut hasher);
                sphere.radius.to_bits().hash(&mut hasher);
            }
        }
    }
    hasher.finish()
}

/// Hash of the settings that change the merged mesh of a placeholder.
pub fn policy_key(policy: &MergePolicy) -> u64 {
    let mut hasher = FxHasher::default();
    policy.simplify_mesh.hash(&mut hasher);
    policy.screen_size.to_bits().hash(&mut hasher);
    policy.triangle_percentage.to_bits().hash(&mut hasher);
    policy.merge_materials.hash(&mut hasher);
    hasher.finish()
}

fn hash_aabb(aabb: &Aabb, hasher: &mut FxHasher) {
    aabb.min.to_array().map(f64::to_bits).hash(hasher);
    aabb.max.to_array().map(f64::to_bits).hash(hasher);
}

/// Memoizing key calculator for one scene snapshot.
pub struct KeyCache<'a> {
    revisions: &'a FxHashMap<ObjectId, u64>,
    memo: FxHashMap<PlaceholderId, u64>,
}

impl<'a> KeyCache<'a> {
    pub fn new(revisions: &'a FxHashMap<ObjectId, u64>) -> Self {
        Self {
            revisions,
            memo: FxHashMap::default(),
        }
    }

    /// Key of a member list at `level`. `members` must be sorted.
    pub fn members_key(
        &mut self,
        manager: &LodActorManager,
        level: usize,
        members: &[NodeHandle],
    ) -> u64 {
        let mut hasher = FxHasher::default();
        level.hash(&mut hasher);
        manager.policy_key(level).hash(&mut hasher);
        for member in members {
            member.hash(&mut hasher);
            let revision = match *member {
                NodeHandle::Object(id) => self.revisions.get(&id).copied().unwrap_or(MISSING),
                NodeHandle::Placeholder(id) => self.placeholder_key(manager, id),
            };
            revision.hash(&mut hasher);
        }
        hasher.finish()
    }

    /// Current content key of an existing placeholder.
    pub fn placeholder_key(&mut self, manager: &LodActorManager, id: PlaceholderId) -> u64 {
        if let Some(&key) = self.memo.get(&id) {
            return key;
        }
        let key = match manager.get(id) {
            Some(placeholder) => {
                self.members_key(manager, placeholder.level(), placeholder.members())
            }
            None => MISSING,
        };
        self.memo.insert(id, key);
        key
    }
}
