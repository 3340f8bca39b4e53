//! Configuration structs with sensible defaults and RON persistence.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Top-level configuration for the HLOD tooling.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// HLOD build settings.
    pub hlod: HlodConfig,
    /// Debug/development settings.
    pub debug: DebugConfig,
}

/// Scene-wide HLOD build settings, handed to the builder at call time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HlodConfig {
    /// Per-level settings. Index 0 is the finest HLOD level.
    pub levels: Vec<LevelSettings>,
    /// Let volume-forced clusters absorb cheaper automatic neighbors.
    /// When false, volume clusters are finalized as soon as they are seeded.
    pub volumes_absorb_neighbors: bool,
    /// Put every eligible object into one forced cluster at level 0 and
    /// skip the remaining levels.
    pub single_cluster: bool,
    /// Objects dropped at level N become candidates again at level N+1.
    pub carry_rejected_forward: bool,
}

/// Per-level clustering thresholds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LevelSettings {
    /// Maximum merge cost accepted by the greedy merge loop.
    pub highest_cost: f64,
    /// Clusters with fewer members are not materialized (volume clusters excepted).
    pub min_num_actors: usize,
    /// Upper bound on the radius of a merged cluster, in meters.
    pub desired_bound_radius: Option<f64>,
    /// Minimum filling factor (0.0 - 1.0) of a merged cluster.
    pub desired_filling_percentage: f64,
    /// Skip automatic clustering; only volumes produce clusters at this level.
    pub only_generate_clusters_for_volumes: bool,
    /// Promote every placeholder of the previous level to its own cluster.
    pub reuse_previous_level_clusters: bool,
    /// Merge/simplification policy forwarded to the mesh builder.
    pub merge: MergePolicy,
}

/// Settings consumed only by the external mesh merge/simplification step.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MergePolicy {
    /// Run simplification (proxy mesh) instead of a plain merge.
    pub simplify_mesh: bool,
    /// Screen size the proxy is generated for.
    pub screen_size: f32,
    /// Fraction of source triangles to keep when merging without simplification.
    pub triangle_percentage: f32,
    /// Bake materials into a single atlas.
    pub merge_materials: bool,
}

/// Debug/development configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DebugConfig {
    /// Log level override (e.g., "debug", "info", "warn").
    pub log_level: String,
    /// Write JSON logs next to the config file in debug builds.
    pub log_to_file: bool,
}

// --- Default implementations ---

impl Default for HlodConfig {
    fn default() -> Self {
        Self {
            levels: vec![
                LevelSettings::default(),
                LevelSettings {
                    highest_cost: 1.0e7,
                    min_num_actors: 2,
                    desired_bound_radius: Some(5000.0),
                    merge: MergePolicy {
                        screen_size: 0.15,
                        ..MergePolicy::default()
                    },
                    ..LevelSettings::default()
                },
            ],
            volumes_absorb_neighbors: false,
            single_cluster: false,
            carry_rejected_forward: true,
        }
    }
}

impl Default for LevelSettings {
    fn default() -> Self {
        Self {
            highest_cost: 1.0e5,
            min_num_actors: 2,
            desired_bound_radius: Some(2000.0),
            desired_filling_percentage: 0.0,
            only_generate_clusters_for_volumes: false,
            reuse_previous_level_clusters: false,
            merge: MergePolicy::default(),
        }
    }
}

impl Default for MergePolicy {
    fn default() -> Self {
        Self {
            simplify_mesh: true,
            screen_size: 0.3,
            triangle_percentage: 0.5,
            merge_materials: true,
        }
    }
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_to_file: false,
        }
    }
}

// --- Validation ---

impl HlodConfig {
    /// Reject settings the builder cannot honor.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (index, level) in self.levels.iter().enumerate() {
            level
                .validate()
                .map_err(|reason| ConfigError::Invalid(format!("level {index}: {reason}")))?;
        }
        Ok(())
    }
}

impl LevelSettings {
    fn validate(&self) -> Result<(), String> {
        if !(self.highest_cost >= 0.0) {
            return Err(format!("highest_cost must be >= 0, got {}", self.highest_cost));
        }
        if !(0.0..=1.0).contains(&self.desired_filling_percentage) {
            return Err(format!(
                "desired_filling_percentage must be within 0.0..=1.0, got {}",
                self.desired_filling_percentage
            ));
        }
        if let Some(radius) = self.desired_bound_radius
            && !(radius > 0.0)
        {
            return Err(format!("desired_bound_radius must be > 0, got {radius}"));
        }
        Ok(())
    }
}

// --- Load / Save / Reload ---

/// File name of the persisted settings inside the config directory.
pub const CONFIG_FILE: &str = "config.ron";

/// Default directory holding [`CONFIG_FILE`].
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("nebula-hlod")
}

impl Config {
    /// Load settings from `config_dir`, writing the defaults there first if
    /// no file exists yet. Loaded HLOD settings are validated.
    pub fn load_or_create(config_dir: &Path) -> Result<Self, ConfigError> {
        let path = config_dir.join(CONFIG_FILE);
        if !path.exists() {
            let config = Config::default();
            config.save(config_dir)?;
            log::info!("Wrote default HLOD settings to {}", path.display());
            return Ok(config);
        }

        let config = Self::read(&path)?;
        log::info!(
            "Loaded HLOD settings ({} levels) from {}",
            config.hlod.levels.len(),
            path.display()
        );
        Ok(config)
    }

    /// Write the settings to `config_dir`, creating the directory if needed.
    pub fn save(&self, config_dir: &Path) -> Result<(), ConfigError> {
        std::fs::create_dir_all(config_dir).map_err(ConfigError::WriteError)?;

        let pretty = ron::ser::PrettyConfig::new()
            .depth_limit(4)
            .separate_tuple_members(true);
        let text = ron::ser::to_string_pretty(self, pretty).map_err(ConfigError::SerializeError)?;

        std::fs::write(config_dir.join(CONFIG_FILE), text).map_err(ConfigError::WriteError)
    }

    /// Re-read the file. `Some` carries the new settings when they differ
    /// from `self`; an invalid file is an error and leaves `self` in charge.
    pub fn reload(&self, config_dir: &Path) -> Result<Option<Self>, ConfigError> {
        let fresh = Self::read(&config_dir.join(CONFIG_FILE))?;
        if fresh == *self {
            return Ok(None);
        }
        log::info!("HLOD settings changed on disk");
        Ok(Some(fresh))
    }

    fn read(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        let config: Config = ron::from_str(&text).map_err(ConfigError::ParseError)?;
        config.hlod.validate()?;
        Ok(config)
    }
}
