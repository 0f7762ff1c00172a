//! # Toolbelt
//!
//! A hot-reloadable registry of file-backed tools.
//!
//! ## Features
//!
//! - **Discovery**: every file under a folder matching a glob is one tool
//! - **Validation**: broken units are reported and skipped, never fatal
//! - **Caching**: repeated lookups are served from memory
//! - **Hot reload**: a filesystem watcher invalidates the cache and notifies a
//!   subscriber whenever a unit changes
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use toolbelt::{Toolbelt, ToolbeltConfig};
//!
//! # async fn example() -> toolbelt::Result<()> {
//! let toolbelt = Toolbelt::new(ToolbeltConfig::new("./tools"))?;
//! let mut changes = toolbelt.subscribe();
//! toolbelt.start_watching().await?;
//!
//! for tool in toolbelt.load_tools().await? {
//!     println!("{}: {}", tool.name(), tool.description());
//! }
//!
//! let mut args = serde_json::Map::new();
//! args.insert("name".into(), "Ada".into());
//! let greeting = toolbelt.call_tool("hello", args).await?;
//! println!("{greeting}");
//!
//! while let Some(change) = changes.recv().await {
//!     println!("tools changed: {:?}", change.paths);
//! }
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

/// Configuration management
pub mod config;

/// Error types and handling
pub mod error;

/// Watching the tool folder for changes
pub mod file_watcher;

/// Glob-based discovery and filtering
pub mod glob_matcher;

/// Reading unit files into tool definitions
pub mod loader;

/// Tool list change notification
pub mod notifier;

/// Cached tool registry
pub mod registry;

/// Tool definitions and executors
pub mod tool;

/// Composition root
pub mod toolbelt;

/// Test utilities for Toolbelt tests
#[doc(hidden)]
pub mod test_utils;

// Re-export core types
pub use config::{ConfigError, ToolbeltConfig};
pub use error::{Result, ToolbeltError};
pub use glob_matcher::GlobMatcher;
pub use loader::{TemplateUnitLoader, UnitLoader};
pub use notifier::{ChangeNotifier, ChangeSubscriber, ChannelSubscriber, ToolListChanged};
pub use registry::{RegistryStats, ScanReport, ToolRegistry, UnitFailure};
pub use tool::{OutputMode, ToolArguments, ToolDefinition, ToolExecutor};
pub use toolbelt::Toolbelt;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{
        ChangeSubscriber, Result, ToolArguments, ToolDefinition, Toolbelt, ToolbeltConfig,
        ToolbeltError, ToolListChanged,
    };
}
