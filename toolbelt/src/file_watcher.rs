//! File watching for the tool folder
//!
//! [`FileWatcher`] subscribes to recursive change notifications for one
//! folder, keeps only the events that touch tool units (as decided by the
//! same [`GlobMatcher`] used for discovery) and hands them to a
//! [`FileWatcherCallback`].

use crate::glob_matcher::GlobMatcher;
use crate::{Result, ToolbeltError};
use notify::{
    event::{CreateKind, Event, EventKind, ModifyKind, RemoveKind},
    RecommendedWatcher, RecursiveMode, Watcher,
};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;

/// File watcher for monitoring the tool folder
pub struct FileWatcher {
    /// Handle to the background watcher task
    watcher_handle: Option<tokio::task::JoinHandle<()>>,
}

/// Configuration for file watching behavior
#[derive(Debug, Clone)]
pub struct FileWatcherConfig {
    /// Channel buffer size for file system events
    pub channel_buffer_size: usize,
    /// Whether to watch directories recursively
    pub recursive: bool,
}

impl Default for FileWatcherConfig {
    fn default() -> Self {
        Self {
            channel_buffer_size: crate::config::DEFAULT_WATCH_CHANNEL_BUFFER,
            recursive: true,
        }
    }
}

/// Callback trait for handling file system events
pub trait FileWatcherCallback: Send + Sync + 'static {
    /// Called when one or more tool unit files changed
    fn on_file_changed(
        &self,
        paths: Vec<PathBuf>,
    ) -> impl std::future::Future<Output = Result<()>> + Send;

    /// Called when the file watcher or the callback encounters an error
    fn on_error(&self, error: String) -> impl std::future::Future<Output = ()> + Send;
}

impl FileWatcher {
    /// Create a new, idle file watcher
    pub fn new() -> Self {
        Self {
            watcher_handle: None,
        }
    }

    /// Whether a watch is currently active
    pub fn is_watching(&self) -> bool {
        self.watcher_handle.is_some()
    }

    /// Start watching `root` with the default configuration
    pub async fn start_watching<C>(&mut self, root: &Path, matcher: GlobMatcher, callback: C) -> Result<()>
    where
        C: FileWatcherCallback,
    {
        self.start_watching_with_config(root, matcher, callback, FileWatcherConfig::default())
            .await
    }

    /// Start watching `root`, replacing any watch already running.
    ///
    /// # Errors
    ///
    /// Returns [`ToolbeltError::Watcher`] if the OS watcher cannot be created
    /// or the folder cannot be watched.
    pub async fn start_watching_with_config<C>(
        &mut self,
        root: &Path,
        matcher: GlobMatcher,
        callback: C,
        config: FileWatcherConfig,
    ) -> Result<()>
    where
        C: FileWatcherCallback,
    {
        // Stop existing watcher if running
        self.stop_watching().await;

        tracing::info!("Starting file watching for {}", root.display());

        let (tx, mut rx) = mpsc::channel(config.channel_buffer_size);
        let mut watcher = RecommendedWatcher::new(
            move |result: notify::Result<Event>| {
                if tx.blocking_send(result).is_err() {
                    tracing::trace!("File watch event dropped after watcher shutdown");
                }
            },
            notify::Config::default(),
        )
        .map_err(|e| ToolbeltError::Watcher(format!("Failed to create file watcher: {e}")))?;

        let recursive_mode = if config.recursive {
            RecursiveMode::Recursive
        } else {
            RecursiveMode::NonRecursive
        };

        watcher.watch(root, recursive_mode).map_err(|e| {
            ToolbeltError::Watcher(format!("Failed to watch directory {}: {e}", root.display()))
        })?;
        tracing::info!("Watching directory: {}", root.display());

        let root = root.to_path_buf();
        let handle = tokio::spawn(async move {
            // The OS watcher lives exactly as long as this task
            let _watcher = watcher;

            while let Some(result) = rx.recv().await {
                let event = match result {
                    Ok(event) => event,
                    Err(e) => {
                        tracing::error!("❌ File watcher error: {}", e);
                        callback.on_error(e.to_string()).await;
                        continue;
                    }
                };

                tracing::debug!("📁 File system event: {:?}", event);

                let relevant = relevant_paths(&event, &root, &matcher);
                if relevant.is_empty() {
                    tracing::trace!("🚫 Ignoring event {:?} for {:?}", event.kind, event.paths);
                    continue;
                }

                tracing::info!("📄 Tool file changed: {:?}", relevant);
                if let Err(e) = callback.on_file_changed(relevant).await {
                    tracing::error!("❌ File watcher callback failed: {}", e);
                    callback.on_error(format!("Callback failed: {e}")).await;
                }
            }
        });

        self.watcher_handle = Some(handle);
        Ok(())
    }

    /// Stop file watching.
    ///
    /// Once this returns no further callbacks run. Calling it while idle is
    /// a no-op.
    pub async fn stop_watching(&mut self) {
        if let Some(handle) = self.watcher_handle.take() {
            handle.abort();
            // Wait for the task to finish so the OS watcher is released and a
            // callback cannot still be running
            let _ = handle.await;
            tracing::info!("File watching stopped");
        }
    }
}

/// Paths from `event` that can affect the set of loaded tools.
///
/// Directory moves and removals are relevant even though a directory never
/// matches the glob, since they can take units with them or bring units in.
fn relevant_paths(event: &Event, root: &Path, matcher: &GlobMatcher) -> Vec<PathBuf> {
    match event.kind {
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_) => event
            .paths
            .iter()
            .filter(|p| {
                matcher.matches_under(root, p)
                    || (p.starts_with(root) && p.as_path() != root && is_structural(&event.kind, p))
            })
            .cloned()
            .collect(),
        _ => Vec::new(),
    }
}

/// Whether `path` names a directory entering or leaving the tree.
///
/// A path that is gone after a rename or an untyped removal may have been a
/// directory, so it counts too.
fn is_structural(kind: &EventKind, path: &Path) -> bool {
    match kind {
        EventKind::Create(CreateKind::Folder) | EventKind::Remove(RemoveKind::Folder) => true,
        EventKind::Create(_) => path.is_dir(),
        EventKind::Modify(ModifyKind::Name(_)) => !path.is_file(),
        EventKind::Remove(RemoveKind::Any | RemoveKind::Other) => !path.exists(),
        _ => false,
    }
}

impl Drop for FileWatcher {
    fn drop(&mut self) {
        if let Some(handle) = self.watcher_handle.take() {
            handle.abort();
        }
    }
}

impl Default for FileWatcher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{AccessKind, DataChange, RenameMode};
    use std::sync::Arc;
    use tempfile::TempDir;
    use tokio::sync::Mutex;
    use tokio::time::{timeout, Duration};

    #[derive(Clone)]
    struct TestCallback {
        changes: Arc<Mutex<Vec<Vec<PathBuf>>>>,
        errors: Arc<Mutex<Vec<String>>>,
        tx: mpsc::UnboundedSender<()>,
    }

    impl TestCallback {
        fn new() -> (Self, mpsc::UnboundedReceiver<()>) {
            let (tx, rx) = mpsc::unbounded_channel();
            let callback = Self {
                changes: Arc::new(Mutex::new(Vec::new())),
                errors: Arc::new(Mutex::new(Vec::new())),
                tx,
            };
            (callback, rx)
        }
    }

    impl FileWatcherCallback for TestCallback {
        async fn on_file_changed(&self, paths: Vec<PathBuf>) -> Result<()> {
            self.changes.lock().await.push(paths);
            let _ = self.tx.send(());
            Ok(())
        }

        async fn on_error(&self, error: String) {
            self.errors.lock().await.push(error);
        }
    }

    fn matcher() -> GlobMatcher {
        GlobMatcher::new("**/*.md").unwrap()
    }

    #[test]
    fn test_relevant_paths_filters_by_glob() {
        let root = Path::new("/tools");
        let event = Event::new(EventKind::Create(CreateKind::File))
            .add_path(PathBuf::from("/tools/hello.md"))
            .add_path(PathBuf::from("/tools/notes.txt"));

        assert_eq!(
            relevant_paths(&event, root, &matcher()),
            vec![PathBuf::from("/tools/hello.md")]
        );
    }

    #[test]
    fn test_relevant_paths_ignores_access_events() {
        let root = Path::new("/tools");
        let event = Event::new(EventKind::Access(AccessKind::Any))
            .add_path(PathBuf::from("/tools/hello.md"));
        assert!(relevant_paths(&event, root, &matcher()).is_empty());
    }

    #[test]
    fn test_relevant_paths_includes_removed_folders() {
        let root = Path::new("/tools");
        let event = Event::new(EventKind::Remove(RemoveKind::Folder))
            .add_path(PathBuf::from("/tools/nested"));
        assert_eq!(
            relevant_paths(&event, root, &matcher()),
            vec![PathBuf::from("/tools/nested")]
        );

        let modified = Event::new(EventKind::Modify(ModifyKind::Any))
            .add_path(PathBuf::from("/tools/nested"));
        assert!(relevant_paths(&modified, root, &matcher()).is_empty());
    }

    #[test]
    fn test_relevant_paths_includes_directory_moves() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        std::fs::create_dir(root.join("arrived")).unwrap();
        std::fs::write(root.join("notes.txt"), "content").unwrap();

        let moved_in = Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::To)))
            .add_path(root.join("arrived"));
        assert_eq!(relevant_paths(&moved_in, root, &matcher()), vec![root.join("arrived")]);

        let created = Event::new(EventKind::Create(CreateKind::Any)).add_path(root.join("arrived"));
        assert_eq!(relevant_paths(&created, root, &matcher()), vec![root.join("arrived")]);

        let moved_out = Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::From)))
            .add_path(root.join("departed"));
        assert_eq!(relevant_paths(&moved_out, root, &matcher()), vec![root.join("departed")]);

        let renamed_file = Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::To)))
            .add_path(root.join("notes.txt"));
        assert!(relevant_paths(&renamed_file, root, &matcher()).is_empty());

        let dir_touched = Event::new(EventKind::Modify(ModifyKind::Data(DataChange::Any)))
            .add_path(root.join("arrived"));
        assert!(relevant_paths(&dir_touched, root, &matcher()).is_empty());

        let root_itself = Event::new(EventKind::Create(CreateKind::Folder)).add_path(root.to_path_buf());
        assert!(relevant_paths(&root_itself, root, &matcher()).is_empty());
    }

    #[test]
    fn test_file_watcher_config_default() {
        let config = FileWatcherConfig::default();
        assert_eq!(config.channel_buffer_size, 100);
        assert!(config.recursive);
    }

    #[tokio::test]
    async fn test_file_watcher_creation() {
        let watcher = FileWatcher::new();
        assert!(!watcher.is_watching());
    }

    #[tokio::test]
    async fn test_file_watcher_reports_matching_changes() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().canonicalize().unwrap();
        let (callback, mut rx) = TestCallback::new();

        let mut watcher = FileWatcher::new();
        watcher
            .start_watching(&root, matcher(), callback.clone())
            .await
            .unwrap();
        assert!(watcher.is_watching());

        std::fs::write(root.join("hello.md"), "content").unwrap();

        timeout(Duration::from_secs(10), rx.recv())
            .await
            .expect("no change event within timeout")
            .unwrap();

        let changes = callback.changes.lock().await;
        assert!(changes
            .iter()
            .flatten()
            .all(|p| p.extension().is_some_and(|e| e == "md")));
        drop(changes);

        watcher.stop_watching().await;
        assert!(!watcher.is_watching());
    }

    #[tokio::test]
    async fn test_stop_watching_is_idempotent_and_silences_events() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().canonicalize().unwrap();
        let (callback, mut rx) = TestCallback::new();

        let mut watcher = FileWatcher::new();
        watcher
            .start_watching(&root, matcher(), callback)
            .await
            .unwrap();
        watcher.stop_watching().await;
        watcher.stop_watching().await;

        std::fs::write(root.join("late.md"), "content").unwrap();

        // Every sender was dropped with the watcher task, so the channel closes
        // without delivering anything.
        let received = timeout(Duration::from_secs(2), rx.recv()).await;
        assert!(matches!(received, Ok(None)));
    }

    #[tokio::test]
    async fn test_watching_missing_directory_fails() {
        let temp_dir = TempDir::new().unwrap();
        let (callback, _rx) = TestCallback::new();

        let mut watcher = FileWatcher::new();
        let result = watcher
            .start_watching(&temp_dir.path().join("absent"), matcher(), callback)
            .await;

        assert!(matches!(result, Err(ToolbeltError::Watcher(_))));
        assert!(!watcher.is_watching());
    }
}
