//! `trellis.toml` discovery and parsing.
//!
//! ```toml
//! environment = ["loose", "template-imports"]
//! exclude = ["node_modules/**", "dist/**"]
//!
//! [registry]
//! "my-component" = "typeof import('my-app/components/my-component').default"
//!
//! [checker]
//! command = "typescript-language-server"
//! args = ["--stdio"]
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::Deserialize;

use crate::ConfigError;
use crate::environment::{Environment, Preset};
use crate::registry::{Registry, TypeRef};

pub const CONFIG_FILE_NAME: &str = "trellis.toml";

const DEFAULT_CHECKER_COMMAND: &str = "typescript-language-server";
const DEFAULT_CHECKER_TIMEOUT_MS: u64 = 10_000;

fn default_checker_command() -> String {
    DEFAULT_CHECKER_COMMAND.to_string()
}

fn default_checker_args() -> Vec<String> {
    vec![String::from("--stdio")]
}

const fn default_checker_timeout_ms() -> u64 {
    DEFAULT_CHECKER_TIMEOUT_MS
}

/// Raw contents of a `trellis.toml`.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProjectConfig {
    /// Ordered preset names. Absent means every preset.
    pub environment: Option<Vec<String>>,
    /// Glob patterns, relative to the project root, of files to ignore.
    #[serde(default)]
    pub exclude: Vec<String>,
    /// Extra global names and their types.
    #[serde(default)]
    pub registry: BTreeMap<String, TypeRef>,
    #[serde(default)]
    pub checker: CheckerConfig,
}

/// External type checker process.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CheckerConfig {
    #[serde(default = "default_checker_command")]
    pub command: String,
    #[serde(default = "default_checker_args")]
    pub args: Vec<String>,
    /// Per-request timeout in milliseconds.
    #[serde(default = "default_checker_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for CheckerConfig {
    fn default() -> Self {
        Self {
            command: default_checker_command(),
            args: default_checker_args(),
            timeout_ms: DEFAULT_CHECKER_TIMEOUT_MS,
        }
    }
}

impl ProjectConfig {
    pub fn parse(text: &str, path: &Path) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(source) => {
                tracing::warn!("Failed to read config at {}: {source}", path.display());
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        Self::parse(&text, path).inspect_err(|err| {
            tracing::warn!("Failed to parse config at {}: {err}", path.display());
        })
    }

    pub fn environment(&self) -> Result<Environment, ConfigError> {
        let registry: Registry = self
            .registry
            .iter()
            .map(|(name, ty)| (name.clone(), ty.clone()))
            .collect();
        match &self.environment {
            Some(names) => Environment::from_names(names, &registry),
            None => Ok(Environment::new(&Preset::ALL, &registry)),
        }
    }

    pub fn exclusions(&self) -> Result<GlobSet, ConfigError> {
        let mut builder = GlobSetBuilder::new();
        for pattern in &self.exclude {
            let glob = Glob::new(pattern).map_err(|source| ConfigError::InvalidPattern {
                pattern: pattern.clone(),
                source,
            })?;
            builder.add(glob);
        }
        builder.build().map_err(|source| ConfigError::InvalidPattern {
            pattern: self.exclude.join(", "),
            source,
        })
    }
}

/// A project: its root directory and resolved settings.
#[derive(Debug, Clone)]
pub struct ProjectSettings {
    root: PathBuf,
    config_path: Option<PathBuf>,
    environment: Environment,
    exclude: GlobSet,
    checker: CheckerConfig,
}

impl ProjectSettings {
    /// Settings for a project rooted at `root` with no config file.
    #[must_use]
    pub fn defaults(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            config_path: None,
            environment: Environment::default(),
            exclude: GlobSet::empty(),
            checker: CheckerConfig::default(),
        }
    }

    /// Load settings from an explicit config file; the root is its directory.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let config = ProjectConfig::load(path)?;
        let root = path
            .parent()
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
        Ok(Self {
            environment: config.environment()?,
            exclude: config.exclusions()?,
            checker: config.checker,
            config_path: Some(path.to_path_buf()),
            root,
        })
    }

    /// Walk up from `start` (a file or directory) to the nearest
    /// `trellis.toml`. Without one, `fallback_root` becomes the root with
    /// default settings.
    pub fn discover(start: &Path, fallback_root: &Path) -> Result<Self, ConfigError> {
        match find_config_file(start) {
            Some(path) => {
                tracing::debug!(path = %path.display(), "Found project config");
                Self::from_file(&path)
            }
            None => Ok(Self::defaults(fallback_root)),
        }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }

    #[must_use]
    pub fn environment(&self) -> &Environment {
        &self.environment
    }

    #[must_use]
    pub fn checker(&self) -> &CheckerConfig {
        &self.checker
    }

    /// Whether `path` matches an `exclude` pattern (relative to the root).
    #[must_use]
    pub fn is_excluded(&self, path: &Path) -> bool {
        let relative = path.strip_prefix(&self.root).unwrap_or(path);
        self.exclude.is_match(relative)
    }
}

/// Nearest `trellis.toml` in `start` or any ancestor directory.
#[must_use]
pub fn find_config_file(start: &Path) -> Option<PathBuf> {
    let dir = if start.is_dir() {
        start
    } else {
        start.parent()?
    };
    dir.ancestors()
        .map(|ancestor| ancestor.join(CONFIG_FILE_NAME))
        .find(|candidate| candidate.is_file())
}
