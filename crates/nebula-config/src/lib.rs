//! Configuration for the Nebula HLOD builder.
//!
//! Settings persist to disk as RON files, support hot-reload detection, and use
//! `#[serde(default)]` throughout so older files keep loading as fields are added.

mod config;
mod error;

pub use config::{
    CONFIG_FILE, Config, DebugConfig, HlodConfig, LevelSettings, MergePolicy, default_config_dir,
};
pub use error::ConfigError;
