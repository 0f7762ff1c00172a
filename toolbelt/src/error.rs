//! Unified error handling for the Toolbelt library
//!
//! Every fallible operation in the crate returns [`Result`], whose error type
//! [`ToolbeltError`] separates per-unit load failures (which a batch load
//! recovers from) from lookup, execution and infrastructure failures.

use crate::config::ConfigError;
use std::path::PathBuf;
use thiserror::Error;

/// The main error type for the Toolbelt library
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ToolbeltError {
    /// A unit was read and parsed but is missing a required export
    #[error("Invalid tool unit {}: {reason}", path.display())]
    InvalidUnit {
        /// File the unit was loaded from
        path: PathBuf,
        /// Which export is missing or malformed
        reason: String,
    },

    /// A unit could not be read, parsed or compiled
    #[error("Failed to import tool unit {}: {reason}", path.display())]
    ImportFailure {
        /// File the unit was loaded from
        path: PathBuf,
        /// Underlying read, YAML or template error
        reason: String,
    },

    /// No file resolves to the requested tool name
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    /// A tool executor failed while producing its result
    #[error("Tool '{tool}' failed: {reason}")]
    Execution {
        /// Name of the tool being executed
        tool: String,
        /// Why the execution failed
        reason: String,
    },

    /// The filesystem change source failed
    #[error("File watcher error: {0}")]
    Watcher(String),

    /// A change subscriber failed to handle a notification
    #[error("Change notification failed: {0}")]
    Notify(String),

    /// Invalid configuration
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Other errors
    #[error("{0}")]
    Other(String),
}

impl ToolbeltError {
    /// Build an [`ToolbeltError::InvalidUnit`] for `path`
    pub fn invalid_unit(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::InvalidUnit {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Build an [`ToolbeltError::ImportFailure`] for `path`
    pub fn import_failure(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::ImportFailure {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Build an [`ToolbeltError::Execution`] for the named tool
    pub fn execution(tool: impl Into<String>, reason: impl ToString) -> Self {
        Self::Execution {
            tool: tool.into(),
            reason: reason.to_string(),
        }
    }

    /// Whether this error came from loading a single unit.
    ///
    /// Batch loads skip units failing this way and keep going.
    pub fn is_unit_failure(&self) -> bool {
        matches!(self, Self::InvalidUnit { .. } | Self::ImportFailure { .. })
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, ToolbeltError>;
