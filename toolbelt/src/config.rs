//! Configuration management for Toolbelt
//!
//! Configuration is read once at startup from `TOOLBELT_*` environment
//! variables (falling back to defaults) and may be overridden by the caller
//! before [`ToolbeltConfig::prepare`] resolves it into its final form.

use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

/// Default folder scanned for tool units, relative to the working directory
pub const DEFAULT_TARGET_FOLDER: &str = "tools";

/// Default glob selecting tool units under the target folder
pub const DEFAULT_GLOB: &str = "**/*.md";

/// Default channel buffer between the OS watcher thread and the event task
pub const DEFAULT_WATCH_CHANNEL_BUFFER: usize = 100;

const ENV_PREFIX: &str = "TOOLBELT";

/// Errors that can occur during configuration loading
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The glob pattern does not compile
    #[error("Invalid glob pattern '{pattern}': {reason}")]
    InvalidGlob {
        /// The pattern that was rejected
        pattern: String,
        /// Parser message
        reason: String,
    },

    /// The target folder could not be created or resolved
    #[error("Failed to prepare target folder {path}: {source}")]
    TargetFolder {
        /// Folder that could not be prepared
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Invalid configuration value for a specific field
    #[error("Invalid configuration value for '{field}': {value}")]
    InvalidValue {
        /// Name of the configuration field
        field: String,
        /// The rejected value
        value: String,
    },
}

/// Configuration settings for a [`crate::Toolbelt`]
#[derive(Debug, Clone, PartialEq)]
pub struct ToolbeltConfig {
    /// Folder scanned (recursively) for tool units
    pub target_folder: PathBuf,
    /// Glob pattern, relative to `target_folder`, selecting tool units
    pub glob: String,
    /// Buffer size of the watcher event channel
    pub watch_channel_buffer: usize,
}

impl Default for ToolbeltConfig {
    fn default() -> Self {
        Self {
            target_folder: PathBuf::from(DEFAULT_TARGET_FOLDER),
            glob: DEFAULT_GLOB.to_string(),
            watch_channel_buffer: DEFAULT_WATCH_CHANNEL_BUFFER,
        }
    }
}

impl ToolbeltConfig {
    /// Create a configuration for the given folder with default settings otherwise
    pub fn new(target_folder: impl Into<PathBuf>) -> Self {
        Self {
            target_folder: target_folder.into(),
            ..Self::default()
        }
    }

    /// Load configuration from `TOOLBELT_*` environment variables
    pub fn from_env() -> Self {
        let loader = EnvLoader::new(ENV_PREFIX);
        let defaults = Self::default();
        Self {
            target_folder: loader
                .load_optional::<PathBuf>("TARGET_FOLDER")
                .unwrap_or(defaults.target_folder),
            glob: loader.load_string("GLOB", &defaults.glob),
            watch_channel_buffer: loader.load_validated(
                "WATCH_CHANNEL_BUFFER",
                defaults.watch_channel_buffer,
                |size| *size > 0,
            ),
        }
    }

    /// Replace the glob pattern
    pub fn with_glob(mut self, glob: impl Into<String>) -> Self {
        self.glob = glob.into();
        self
    }

    /// Validate the configuration and resolve the target folder.
    ///
    /// The folder is created if it does not exist and replaced by its
    /// canonical absolute path, so every path the registry hands out is
    /// absolute.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidGlob`] for a pattern that does not
    /// compile, [`ConfigError::InvalidValue`] for a zero channel buffer and
    /// [`ConfigError::TargetFolder`] if the folder cannot be created.
    pub fn prepare(self) -> Result<Self, ConfigError> {
        glob::Pattern::new(&self.glob).map_err(|e| ConfigError::InvalidGlob {
            pattern: self.glob.clone(),
            reason: e.to_string(),
        })?;

        if self.watch_channel_buffer == 0 {
            return Err(ConfigError::InvalidValue {
                field: "watch_channel_buffer".to_string(),
                value: "0".to_string(),
            });
        }

        let target_folder = resolve_folder(&self.target_folder)?;
        Ok(Self {
            target_folder,
            ..self
        })
    }
}

fn resolve_folder(path: &Path) -> Result<PathBuf, ConfigError> {
    let to_err = |source| ConfigError::TargetFolder {
        path: path.to_path_buf(),
        source,
    };
    std::fs::create_dir_all(path).map_err(to_err)?;
    path.canonicalize().map_err(to_err)
}

/// Loads environment variables sharing a common prefix
#[derive(Debug)]
struct EnvLoader {
    prefix: String,
}

impl EnvLoader {
    fn new(prefix: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
        }
    }

    fn key(&self, suffix: &str) -> String {
        format!("{}_{}", self.prefix, suffix)
    }

    fn load_string(&self, suffix: &str, default: &str) -> String {
        env::var(self.key(suffix)).unwrap_or_else(|_| default.to_string())
    }

    fn load_optional<T: FromStr>(&self, suffix: &str) -> Option<T> {
        env::var(self.key(suffix)).ok().and_then(|v| v.parse().ok())
    }

    fn load_validated<T, F>(&self, suffix: &str, default: T, validator: F) -> T
    where
        T: FromStr,
        F: Fn(&T) -> bool,
    {
        match self.load_optional::<T>(suffix) {
            Some(value) if validator(&value) => value,
            _ => default,
        }
    }
}
