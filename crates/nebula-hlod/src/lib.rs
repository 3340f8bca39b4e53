//! Hierarchical LOD building: cost-based clustering of scene objects per
//! level, volume overrides, and the persistent LOD actor hierarchy those
//! clusters turn into.

mod builder;
mod cluster;
mod error;
mod graph;
mod key;
mod manager;
mod scene;
mod volume;

pub use builder::{BuildReport, CancelHandle, GeneratedMesh, HlodBuilder, LevelReport};
pub use cluster::{Candidate, Cluster, MergePreview};
pub use error::{HlodError, MeshBuildError};
pub use graph::{ClusterGraph, GraphState, MergePair, MergeRules, SeedMode, StepOutcome};
pub use key::{object_revisions, policy_key, scene_input_key};
pub use manager::{Acceptance, LodActorManager, Placeholder, PlaceholderEvent};
pub use scene::{
    BuiltMesh, HlodScene, MemoryScene, MeshBuildRequest, MeshBuilder, MeshHandle, MeshSource,
    NodeHandle, ObjectId, OverrideVolume, PlaceholderId, SceneObject, VolumeId, VolumeLevels,
    VolumeShape,
};
pub use volume::{VolumeSeeds, seed_volume_clusters};

pub use nebula_config::{HlodConfig, LevelSettings, MergePolicy};
