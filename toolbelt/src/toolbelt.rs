//! The composition root tying registry, watcher and notifier together
//!
//! A [`Toolbelt`] is built once from a [`ToolbeltConfig`] and handed to
//! whatever exposes the tools (a protocol server, the CLI). Cloning it is
//! cheap; clones share the same registry, watcher and subscriber.

use crate::config::{ConfigError, ToolbeltConfig};
use crate::file_watcher::{FileWatcher, FileWatcherCallback, FileWatcherConfig};
use crate::glob_matcher::GlobMatcher;
use crate::loader::{TemplateUnitLoader, UnitLoader};
use crate::notifier::{ChangeNotifier, ChangeSubscriber, ToolListChanged};
use crate::registry::{RegistryStats, ScanReport, ToolRegistry};
use crate::tool::{ToolArguments, ToolDefinition};
use crate::{Result, ToolbeltError};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

const MAX_WATCH_RETRIES: u32 = 3;
const INITIAL_BACKOFF_MS: u64 = 100;

/// Hot-reloadable set of tools backed by one folder
#[derive(Clone)]
pub struct Toolbelt {
    config: Arc<ToolbeltConfig>,
    registry: Arc<ToolRegistry>,
    notifier: ChangeNotifier,
    file_watcher: Arc<Mutex<FileWatcher>>,
}

impl Toolbelt {
    /// Create a toolbelt loading markdown template units.
    ///
    /// The target folder is created if it does not exist and resolved to an
    /// absolute path.
    pub fn new(config: ToolbeltConfig) -> Result<Self> {
        Self::with_loader(config, Arc::new(TemplateUnitLoader::new()?))
    }

    /// Create a toolbelt with a custom unit loader
    pub fn with_loader(config: ToolbeltConfig, loader: Arc<dyn UnitLoader>) -> Result<Self> {
        let config = config.prepare()?;
        let matcher = GlobMatcher::new(&config.glob).map_err(|e| ConfigError::InvalidGlob {
            pattern: config.glob.clone(),
            reason: e.to_string(),
        })?;

        tracing::debug!(
            "Creating toolbelt for {} with pattern {}",
            config.target_folder.display(),
            config.glob
        );

        let registry = ToolRegistry::new(config.target_folder.clone(), matcher, loader);
        Ok(Self {
            config: Arc::new(config),
            registry: Arc::new(registry),
            notifier: ChangeNotifier::new(),
            file_watcher: Arc::new(Mutex::new(FileWatcher::new())),
        })
    }

    /// The prepared configuration
    pub fn config(&self) -> &ToolbeltConfig {
        &self.config
    }

    /// The underlying registry
    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    /// Every currently loadable tool, sorted by name
    pub async fn load_tools(&self) -> Result<Vec<ToolDefinition>> {
        self.registry.load_all().await
    }

    /// The named tool
    ///
    /// # Errors
    ///
    /// [`ToolbeltError::ToolNotFound`] when no unit file has that name.
    pub async fn load_tool(&self, name: &str) -> Result<ToolDefinition> {
        self.registry.load_one(name).await
    }

    /// Load the named tool and run it with `arguments`
    pub async fn call_tool(&self, name: &str, arguments: ToolArguments) -> Result<Value> {
        let tool = self.load_tool(name).await?;
        tracing::debug!("Calling tool '{}' from {}", name, tool.source().display());
        tool.execute(arguments).await
    }

    /// Load every unit once and report failures, leaving the cache alone
    pub async fn validate(&self) -> Result<ScanReport> {
        self.registry.validate_all().await
    }

    /// Mark the cache stale without notifying the subscriber
    pub fn invalidate(&self) -> u64 {
        self.registry.invalidate()
    }

    /// Registry activity counters
    pub fn stats(&self) -> RegistryStats {
        self.registry.stats()
    }

    /// Register the single change subscriber, replacing any previous one
    pub fn on_change(&self, subscriber: Arc<dyn ChangeSubscriber>) {
        self.notifier.set_subscriber(subscriber);
    }

    /// Register a channel subscriber and return the receiving end
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<ToolListChanged> {
        self.notifier.subscribe()
    }

    /// Start watching the target folder.
    ///
    /// Each relevant change invalidates the registry and then notifies the
    /// subscriber. Calling this while already watching restarts the watch.
    ///
    /// # Errors
    ///
    /// Returns [`ToolbeltError::Watcher`] when the watch cannot be
    /// established after a few attempts.
    pub async fn start_watching(&self) -> Result<()> {
        let callback = RegistryWatchCallback {
            registry: self.registry.clone(),
            notifier: self.notifier.clone(),
        };
        let watch_config = FileWatcherConfig {
            channel_buffer_size: self.config.watch_channel_buffer,
            recursive: true,
        };

        let mut last_error = None;
        let mut backoff_ms = INITIAL_BACKOFF_MS;

        for attempt in 1..=MAX_WATCH_RETRIES {
            let result = {
                let mut watcher = self.file_watcher.lock().await;
                watcher
                    .start_watching_with_config(
                        self.registry.root(),
                        self.registry.matcher().clone(),
                        callback.clone(),
                        watch_config.clone(),
                    )
                    .await
            };

            match result {
                Ok(()) => {
                    if attempt > 1 {
                        tracing::info!("✅ File watcher started successfully on attempt {}", attempt);
                    }
                    return Ok(());
                }
                Err(e) => {
                    if attempt < MAX_WATCH_RETRIES {
                        tracing::warn!(
                            "⚠️ File watcher initialization attempt {} failed, retrying in {}ms: {}",
                            attempt,
                            backoff_ms,
                            e
                        );
                        tokio::time::sleep(tokio::time::Duration::from_millis(backoff_ms)).await;
                        backoff_ms *= 2;
                    }
                    last_error = Some(e);
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| ToolbeltError::Watcher("File watcher initialization failed".to_string())))
    }

    /// Stop watching. Idempotent.
    ///
    /// No watcher callback runs after this returns, so the registry is no
    /// longer invalidated. A notification already handed to the subscriber
    /// is delivered on its own task and can still arrive afterwards.
    pub async fn stop_watching(&self) {
        let mut watcher = self.file_watcher.lock().await;
        watcher.stop_watching().await;
    }

    /// Whether the folder is being watched
    pub async fn is_watching(&self) -> bool {
        self.file_watcher.lock().await.is_watching()
    }
}

#[derive(Clone)]
struct RegistryWatchCallback {
    registry: Arc<ToolRegistry>,
    notifier: ChangeNotifier,
}

impl FileWatcherCallback for RegistryWatchCallback {
    async fn on_file_changed(&self, paths: Vec<PathBuf>) -> Result<()> {
        let generation = self.registry.invalidate();
        tracing::info!("🔄 Tool registry invalidated (generation {})", generation);
        self.notifier.notify(ToolListChanged { paths, generation });
        Ok(())
    }

    async fn on_error(&self, error: String) {
        tracing::error!("❌ File watcher error, keeping last known tools: {}", error);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{write_unit, CountingLoader, HELLO_UNIT};
    use serde_json::json;
    use tempfile::TempDir;

    fn toolbelt(dir: &std::path::Path) -> (Toolbelt, Arc<CountingLoader>) {
        let loader = Arc::new(CountingLoader::new());
        let toolbelt = Toolbelt::with_loader(ToolbeltConfig::new(dir), loader.clone()).unwrap();
        (toolbelt, loader)
    }

    #[test]
    fn test_new_creates_target_folder() {
        let temp_dir = TempDir::new().unwrap();
        let folder = temp_dir.path().join("tools");

        let toolbelt = Toolbelt::new(ToolbeltConfig::new(&folder)).unwrap();

        assert!(folder.is_dir());
        assert!(toolbelt.config().target_folder.is_absolute());
    }

    #[test]
    fn test_new_rejects_bad_glob() {
        let temp_dir = TempDir::new().unwrap();
        let config = ToolbeltConfig::new(temp_dir.path()).with_glob("[");

        let result = Toolbelt::new(config);
        assert!(matches!(result, Err(ToolbeltError::Config(_))));
    }

    #[tokio::test]
    async fn test_call_tool() {
        let temp_dir = TempDir::new().unwrap();
        write_unit(temp_dir.path(), "hello.md", HELLO_UNIT);
        let (toolbelt, _) = toolbelt(temp_dir.path());

        let mut args = ToolArguments::new();
        args.insert("name".to_string(), json!("Ada"));

        assert_eq!(toolbelt.call_tool("hello", args).await.unwrap(), json!("Hello, Ada!"));
    }

    #[tokio::test]
    async fn test_call_tool_missing_argument() {
        let temp_dir = TempDir::new().unwrap();
        write_unit(temp_dir.path(), "hello.md", HELLO_UNIT);
        let (toolbelt, _) = toolbelt(temp_dir.path());

        let err = toolbelt.call_tool("hello", ToolArguments::new()).await.unwrap_err();
        assert!(matches!(err, ToolbeltError::Execution { .. }));
    }

    #[tokio::test]
    async fn test_explicit_invalidate_does_not_notify() {
        let temp_dir = TempDir::new().unwrap();
        write_unit(temp_dir.path(), "hello.md", HELLO_UNIT);
        let (toolbelt, loader) = toolbelt(temp_dir.path());
        let mut changes = toolbelt.subscribe();

        toolbelt.load_tools().await.unwrap();
        assert_eq!(toolbelt.invalidate(), 1);
        toolbelt.load_tools().await.unwrap();

        assert_eq!(loader.loads(), 2);
        tokio::task::yield_now().await;
        assert!(changes.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_watch_callback_invalidates_then_notifies() {
        let temp_dir = TempDir::new().unwrap();
        write_unit(temp_dir.path(), "hello.md", HELLO_UNIT);
        let (toolbelt, _) = toolbelt(temp_dir.path());
        let mut changes = toolbelt.subscribe();
        toolbelt.load_tools().await.unwrap();

        let callback = RegistryWatchCallback {
            registry: toolbelt.registry().clone(),
            notifier: toolbelt.notifier.clone(),
        };
        let path = temp_dir.path().join("hello.md");
        callback.on_file_changed(vec![path.clone()]).await.unwrap();

        assert!(!toolbelt.registry().is_valid());
        let event = tokio::time::timeout(std::time::Duration::from_secs(5), changes.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.paths, vec![path]);
        assert_eq!(event.generation, 1);
    }

    #[tokio::test]
    async fn test_watch_error_keeps_cached_tools() {
        let temp_dir = TempDir::new().unwrap();
        write_unit(temp_dir.path(), "hello.md", HELLO_UNIT);
        let (toolbelt, loader) = toolbelt(temp_dir.path());
        let mut changes = toolbelt.subscribe();
        toolbelt.load_tools().await.unwrap();

        let callback = RegistryWatchCallback {
            registry: toolbelt.registry().clone(),
            notifier: toolbelt.notifier.clone(),
        };
        callback.on_error("inotify queue overflow".to_string()).await;

        assert!(toolbelt.registry().is_valid());
        assert_eq!(toolbelt.stats().generation, 0);
        let tools = toolbelt.load_tools().await.unwrap();
        assert_eq!(tools.len(), 1);
        assert_eq!(loader.loads(), 1);
        tokio::task::yield_now().await;
        assert!(changes.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_start_and_stop_watching() {
        let temp_dir = TempDir::new().unwrap();
        let (toolbelt, _) = toolbelt(temp_dir.path());

        toolbelt.start_watching().await.unwrap();
        assert!(toolbelt.is_watching().await);

        toolbelt.stop_watching().await;
        toolbelt.stop_watching().await;
        assert!(!toolbelt.is_watching().await);
    }
}
