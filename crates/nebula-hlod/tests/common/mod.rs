#![allow(dead_code)]

use glam::DVec3;
use nebula_hlod::{
    BuiltMesh, HlodConfig, LevelSettings, MeshBuildError, MeshBuildRequest, MeshBuilder,
    MeshHandle, MeshSource, NodeHandle, ObjectId, OverrideVolume, SceneObject, VolumeId,
    VolumeShape,
};
use nebula_math::Aabb;

/// Unit cube with its minimum corner at `(x, 0, 0)`.
pub fn cube_at(x: f64) -> Aabb {
    Aabb::new(DVec3::new(x, 0.0, 0.0), DVec3::new(x + 1.0, 1.0, 1.0))
}

pub fn object(id: u64, x: f64) -> SceneObject {
    SceneObject::new(ObjectId(id), cube_at(x), 1.0)
}

/// Box volume spanning `min_x..max_x` and fully enclosing unit cubes in y/z.
pub fn box_volume(id: u64, min_x: f64, max_x: f64) -> OverrideVolume {
    OverrideVolume::new(
        VolumeId(id),
        VolumeShape::Box(Aabb::new(
            DVec3::new(min_x, -1.0, -1.0),
            DVec3::new(max_x, 2.0, 2.0),
        )),
    )
}

pub fn level(highest_cost: f64, min_num_actors: usize) -> LevelSettings {
    LevelSettings {
        highest_cost,
        min_num_actors,
        desired_bound_radius: None,
        ..LevelSettings::default()
    }
}

pub fn config(levels: Vec<LevelSettings>) -> HlodConfig {
    HlodConfig {
        levels,
        ..HlodConfig::default()
    }
}

pub fn objects(members: &[NodeHandle]) -> Vec<u64> {
    members
        .iter()
        .filter_map(|m| match m {
            NodeHandle::Object(id) => Some(id.0),
            NodeHandle::Placeholder(_) => None,
        })
        .collect()
}

/// Mesh builder that returns the cluster bound and counts its calls.
#[derive(Default)]
pub struct RecordingBuilder {
    pub calls: usize,
    pub requests: Vec<Vec<MeshSource>>,
}

impl MeshBuilder for RecordingBuilder {
    fn build_merged_mesh(
        &mut self,
        request: &MeshBuildRequest<'_>,
    ) -> Result<BuiltMesh, MeshBuildError> {
        self.calls += 1;
        self.requests.push(request.sources.clone());
        Ok(BuiltMesh {
            handle: MeshHandle(1000 + self.calls as u64),
            bound: request.bound,
            cost_weight: request.sources.len() as f64,
        })
    }
}

/// Mesh builder that fails whenever a request includes one of `failing`.
pub struct FailingBuilder {
    pub failing: Vec<ObjectId>,
    pub inner: RecordingBuilder,
}

impl MeshBuilder for FailingBuilder {
    fn build_merged_mesh(
        &mut self,
        request: &MeshBuildRequest<'_>,
    ) -> Result<BuiltMesh, MeshBuildError> {
        let hit = request.sources.iter().any(|source| {
            matches!(source, MeshSource::Object(id) if self.failing.contains(id))
        });
        if hit {
            return Err(MeshBuildError::Failed("simplifier crashed".into()));
        }
        self.inner.build_merged_mesh(request)
    }
}

pub struct PanickingBuilder;

impl MeshBuilder for PanickingBuilder {
    fn build_merged_mesh(
        &mut self,
        _request: &MeshBuildRequest<'_>,
    ) -> Result<BuiltMesh, MeshBuildError> {
        panic!("mesh builder blew up");
    }
}
