//! Registry/environment model and project configuration for Trellis.
//!
//! The [`Environment`] is the value the generator consults for global names
//! and DSL module paths. It is built from presets plus the user's
//! `trellis.toml` and passed around explicitly; there is no process-wide
//! registry.

mod environment;
mod project;
mod registry;

use std::io;
use std::path::{Path, PathBuf};

use toml::de;

pub use environment::{DocumentKind, Environment, Preset, Profile};
pub use project::{
    CONFIG_FILE_NAME, CheckerConfig, ProjectConfig, ProjectSettings, find_config_file,
};
pub use registry::{Registry, TypeRef};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: io::Error,
    },
    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: de::Error,
    },
    #[error("unknown environment preset '{0}'")]
    UnknownPreset(String),
    #[error("invalid exclude pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        source: globset::Error,
    },
}

impl ConfigError {
    /// The config file involved, for read and parse failures.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        match self {
            ConfigError::Read { path, .. } | ConfigError::Parse { path, .. } => Some(path),
            ConfigError::UnknownPreset(_) | ConfigError::InvalidPattern { .. } => None,
        }
    }
}
