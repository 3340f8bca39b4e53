//! HLOD builder error types.

use nebula_config::ConfigError;

use crate::scene::PlaceholderId;

/// Errors that abort a builder call.
///
/// Per-placeholder mesh failures during [`build`](crate::HlodBuilder::build)
/// are counted in the report instead; only the single-placeholder entry point
/// surfaces them as [`HlodError::MeshBuild`].
#[derive(Debug, thiserror::Error)]
pub enum HlodError {
    /// The level index is outside the configured level range.
    #[error("HLOD level {level} out of range (configured levels: {count})")]
    InvalidLevel { level: usize, count: usize },

    /// A level is still marked as building from a call that never finished.
    #[error("HLOD level {level} is already being built")]
    Reentrant { level: usize },

    /// The build was cancelled before starting `level`.
    #[error("HLOD build cancelled before level {level}")]
    Cancelled { level: usize },

    /// No placeholder with this id exists at the requested level.
    #[error("no LOD actor {id} at level {level}")]
    UnknownPlaceholder { id: PlaceholderId, level: usize },

    /// The builder settings were rejected.
    #[error("invalid HLOD settings: {0}")]
    Config(#[from] ConfigError),

    /// The mesh builder failed for a single requested placeholder.
    #[error("mesh build failed for LOD actor {id}: {source}")]
    MeshBuild {
        id: PlaceholderId,
        #[source]
        source: MeshBuildError,
    },
}

/// Failure reported by a [`MeshBuilder`](crate::MeshBuilder).
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MeshBuildError {
    /// The request carried no source meshes.
    #[error("no source meshes to merge")]
    NoSources,

    /// The merge/simplification step itself failed.
    #[error("merge failed: {0}")]
    Failed(String),
}
