//! In-memory registry of loaded tools
//!
//! The registry caches [`ToolDefinition`]s by name and tracks whether the
//! cache still reflects the target folder. Invalidation clears the cache and
//! bumps a generation counter; a scan only publishes its results if the
//! generation it started under is still current, otherwise it scans again.
//! Together these guarantee that a caller never receives a tool list that an
//! already-observed filesystem change has superseded.

use crate::glob_matcher::GlobMatcher;
use crate::loader::{unit_name, UnitLoader};
use crate::tool::ToolDefinition;
use crate::{Result, ToolbeltError};
use futures::future::join_all;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// A unit that failed to load during a scan
#[derive(Debug)]
pub struct UnitFailure {
    /// File that failed
    pub path: PathBuf,
    /// Why it failed
    pub error: ToolbeltError,
}

/// Outcome of loading every matching file once
#[derive(Debug, Default)]
pub struct ScanReport {
    /// Successfully loaded units, in scan order
    pub loaded: Vec<ToolDefinition>,
    /// Units that were skipped
    pub failures: Vec<UnitFailure>,
}

impl ScanReport {
    /// Number of files the scan visited
    pub fn total(&self) -> usize {
        self.loaded.len() + self.failures.len()
    }

    fn log_failures(&self) {
        for failure in &self.failures {
            tracing::warn!("Skipping tool unit {}: {}", failure.path.display(), failure.error);
        }
    }
}

/// Counters describing registry activity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryStats {
    /// Lookups answered from the cache
    pub hits: u64,
    /// Lookups that had to touch the filesystem
    pub misses: u64,
    /// Full scans published to the cache
    pub scans: u64,
    /// Current invalidation generation
    pub generation: u64,
    /// Number of cached tools
    pub cached: usize,
    /// Whether the cache is marked as reflecting the disk
    pub valid: bool,
}

#[derive(Default)]
struct RegistryState {
    cache: HashMap<String, ToolDefinition>,
    path_index: HashMap<String, PathBuf>,
    valid: bool,
    generation: u64,
}

impl RegistryState {
    fn snapshot(&self) -> Vec<ToolDefinition> {
        let mut tools: Vec<ToolDefinition> = self.cache.values().cloned().collect();
        tools.sort_by(|a, b| a.name().cmp(b.name()));
        tools
    }

    fn insert(&mut self, tool: ToolDefinition) {
        let name = tool.name().to_string();
        if let Some(previous) = self.cache.get(&name) {
            if previous.source() != tool.source() {
                tracing::warn!(
                    "Tool name collision for '{}': {} replaced by {}",
                    name,
                    previous.source().display(),
                    tool.source().display()
                );
            }
        }
        self.path_index
            .insert(name.clone(), tool.source().to_path_buf());
        self.cache.insert(name, tool);
    }
}

/// Cache of tool definitions discovered under one folder
pub struct ToolRegistry {
    root: PathBuf,
    matcher: GlobMatcher,
    loader: Arc<dyn UnitLoader>,
    state: RwLock<RegistryState>,
    hits: AtomicU64,
    misses: AtomicU64,
    scans: AtomicU64,
}

impl ToolRegistry {
    /// Create an empty, invalid registry over `root`
    pub fn new(root: impl Into<PathBuf>, matcher: GlobMatcher, loader: Arc<dyn UnitLoader>) -> Self {
        Self {
            root: root.into(),
            matcher,
            loader,
            state: RwLock::new(RegistryState::default()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            scans: AtomicU64::new(0),
        }
    }

    /// Folder the registry scans
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Matcher used for discovery
    pub fn matcher(&self) -> &GlobMatcher {
        &self.matcher
    }

    /// Return every tool, scanning the folder unless the cache is valid.
    ///
    /// Units that fail to load are logged and left out; a bad file never
    /// fails the whole call.
    pub async fn load_all(&self) -> Result<Vec<ToolDefinition>> {
        loop {
            let generation = {
                let state = self.read_state();
                if state.valid && !state.cache.is_empty() {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    tracing::trace!("Serving {} tools from cache", state.cache.len());
                    return Ok(state.snapshot());
                }
                state.generation
            };
            self.misses.fetch_add(1, Ordering::Relaxed);

            let report = self.scan().await?;
            report.log_failures();

            match self.publish(generation, report.loaded) {
                Some(tools) => {
                    tracing::info!("Loaded {} tools from {}", tools.len(), self.root.display());
                    return Ok(tools);
                }
                None => {
                    tracing::debug!(
                        "Registry was invalidated during scan of generation {}, rescanning",
                        generation
                    );
                }
            }
        }
    }

    /// Return the named tool, loading just that unit on a cache miss.
    ///
    /// # Errors
    ///
    /// [`ToolbeltError::ToolNotFound`] if no matching file has that base
    /// name; the loader's error if the file exists but does not load.
    pub async fn load_one(&self, name: &str) -> Result<ToolDefinition> {
        loop {
            let (generation, indexed) = {
                let state = self.read_state();
                if let Some(tool) = state.cache.get(name) {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    return Ok(tool.clone());
                }
                (state.generation, state.path_index.get(name).cloned())
            };
            self.misses.fetch_add(1, Ordering::Relaxed);

            let indexed = match indexed {
                Some(path) => is_file(&path).await.then_some(path),
                None => None,
            };
            let path = match indexed {
                Some(path) => path,
                None => self
                    .locate(name)
                    .await?
                    .ok_or_else(|| ToolbeltError::ToolNotFound(name.to_string()))?,
            };

            let tool = self.loader.load(&path).await?;
            if self.publish_one(generation, &tool) {
                return Ok(tool);
            }
            tracing::debug!(
                "Registry was invalidated while loading '{}', retrying",
                name
            );
        }
    }

    /// Mark the cache stale and drop every cached tool.
    ///
    /// Returns the new generation. Scans already in flight will notice the
    /// generation change and rescan instead of publishing.
    pub fn invalidate(&self) -> u64 {
        let mut state = self.write_state();
        state.generation += 1;
        state.valid = false;
        state.cache.clear();
        tracing::debug!("Registry invalidated, now at generation {}", state.generation);
        state.generation
    }

    /// Load every matching file without touching the cache
    pub async fn validate_all(&self) -> Result<ScanReport> {
        self.scan().await
    }

    /// Whether the cache is currently trusted
    pub fn is_valid(&self) -> bool {
        self.read_state().valid
    }

    /// Snapshot of the activity counters
    pub fn stats(&self) -> RegistryStats {
        let state = self.read_state();
        RegistryStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            scans: self.scans.load(Ordering::Relaxed),
            generation: state.generation,
            cached: state.cache.len(),
            valid: state.valid,
        }
    }

    async fn scan(&self) -> Result<ScanReport> {
        let paths = self.list_files().await?;
        let outcomes = join_all(paths.into_iter().map(|path| async move {
            let outcome = self.loader.load(&path).await;
            (path, outcome)
        }))
        .await;

        let mut report = ScanReport::default();
        for (path, outcome) in outcomes {
            match outcome {
                Ok(tool) => report.loaded.push(tool),
                Err(error) => report.failures.push(UnitFailure { path, error }),
            }
        }
        Ok(report)
    }

    async fn list_files(&self) -> Result<Vec<PathBuf>> {
        let matcher = self.matcher.clone();
        let root = self.root.clone();
        tokio::task::spawn_blocking(move || matcher.scan(&root))
            .await
            .map_err(|e| ToolbeltError::Other(format!("Directory scan task failed: {e}")))
    }

    /// Find the file a name resolves to; later files in scan order win
    async fn locate(&self, name: &str) -> Result<Option<PathBuf>> {
        Ok(self
            .list_files()
            .await?
            .into_iter()
            .filter(|path| unit_name(path) == Some(name))
            .last())
    }

    fn publish(&self, generation: u64, loaded: Vec<ToolDefinition>) -> Option<Vec<ToolDefinition>> {
        let mut state = self.write_state();
        if state.generation != generation {
            return None;
        }

        state.cache.clear();
        state.path_index.clear();
        for tool in loaded {
            state.insert(tool);
        }
        state.valid = true;
        self.scans.fetch_add(1, Ordering::Relaxed);
        Some(state.snapshot())
    }

    fn publish_one(&self, generation: u64, tool: &ToolDefinition) -> bool {
        let mut state = self.write_state();
        if state.generation != generation {
            return false;
        }
        state.insert(tool.clone());
        true
    }

    fn read_state(&self) -> RwLockReadGuard<'_, RegistryState> {
        match self.state.read() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, RegistryState> {
        match self.state.write() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

async fn is_file(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|metadata| metadata.is_file())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{write_unit, CountingLoader, BROKEN_UNIT, HELLO_UNIT};
    use std::fs;
    use tempfile::TempDir;

    fn registry(dir: &Path) -> (ToolRegistry, Arc<CountingLoader>) {
        let loader = Arc::new(CountingLoader::new());
        let registry = ToolRegistry::new(
            dir,
            GlobMatcher::new("**/*.md").unwrap(),
            loader.clone(),
        );
        (registry, loader)
    }

    #[tokio::test]
    async fn test_load_all_one_tool_per_file() {
        let temp_dir = TempDir::new().unwrap();
        write_unit(temp_dir.path(), "hello.md", HELLO_UNIT);
        write_unit(temp_dir.path(), "nested/echo.md", HELLO_UNIT);
        write_unit(temp_dir.path(), "notes.txt", HELLO_UNIT);

        let (registry, _) = registry(temp_dir.path());
        let tools = registry.load_all().await.unwrap();

        let names: Vec<&str> = tools.iter().map(|t| t.name()).collect();
        assert_eq!(names, vec!["echo", "hello"]);
        assert!(registry.is_valid());
    }

    #[tokio::test]
    async fn test_load_all_skips_broken_units() {
        let temp_dir = TempDir::new().unwrap();
        write_unit(temp_dir.path(), "hello.md", HELLO_UNIT);
        write_unit(temp_dir.path(), "broken.md", BROKEN_UNIT);

        let (registry, _) = registry(temp_dir.path());
        let tools = registry.load_all().await.unwrap();

        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].name(), "hello");
    }

    #[tokio::test]
    async fn test_valid_cache_skips_loader() {
        let temp_dir = TempDir::new().unwrap();
        write_unit(temp_dir.path(), "hello.md", HELLO_UNIT);

        let (registry, loader) = registry(temp_dir.path());
        let first = registry.load_all().await.unwrap();
        assert_eq!(loader.loads(), 1);

        let second = registry.load_all().await.unwrap();
        assert_eq!(first, second);
        assert_eq!(loader.loads(), 1);

        let stats = registry.stats();
        assert_eq!(stats.scans, 1);
        assert_eq!(stats.hits, 1);
    }

    #[tokio::test]
    async fn test_empty_folder_rescans_every_time() {
        let temp_dir = TempDir::new().unwrap();
        let (registry, _) = registry(temp_dir.path());

        assert!(registry.load_all().await.unwrap().is_empty());
        assert!(registry.load_all().await.unwrap().is_empty());
        assert_eq!(registry.stats().scans, 2);
    }

    #[tokio::test]
    async fn test_invalidate_clears_and_forces_rescan() {
        let temp_dir = TempDir::new().unwrap();
        write_unit(temp_dir.path(), "hello.md", HELLO_UNIT);

        let (registry, loader) = registry(temp_dir.path());
        registry.load_all().await.unwrap();

        let generation = registry.invalidate();
        assert_eq!(generation, 1);
        assert!(!registry.is_valid());
        assert_eq!(registry.stats().cached, 0);

        fs::remove_file(temp_dir.path().join("hello.md")).unwrap();
        write_unit(temp_dir.path(), "other.md", HELLO_UNIT);

        let tools = registry.load_all().await.unwrap();
        let names: Vec<&str> = tools.iter().map(|t| t.name()).collect();
        assert_eq!(names, vec!["other"]);
        assert_eq!(loader.loads(), 2);
    }

    #[tokio::test]
    async fn test_load_one_not_found() {
        let temp_dir = TempDir::new().unwrap();
        write_unit(temp_dir.path(), "hello.md", HELLO_UNIT);

        let (registry, _) = registry(temp_dir.path());
        let err = registry.load_one("missing").await.unwrap_err();

        assert!(matches!(err, ToolbeltError::ToolNotFound(ref name) if name == "missing"));
        assert!(err.to_string().contains("missing"));
    }

    #[tokio::test]
    async fn test_load_one_caches_without_validating() {
        let temp_dir = TempDir::new().unwrap();
        write_unit(temp_dir.path(), "hello.md", HELLO_UNIT);
        write_unit(temp_dir.path(), "other.md", HELLO_UNIT);

        let (registry, loader) = registry(temp_dir.path());
        let tool = registry.load_one("hello").await.unwrap();
        assert_eq!(tool.name(), "hello");
        assert_eq!(loader.loads(), 1);
        assert!(!registry.is_valid());

        registry.load_one("hello").await.unwrap();
        assert_eq!(loader.loads(), 1);
    }

    #[tokio::test]
    async fn test_load_one_served_from_full_scan() {
        let temp_dir = TempDir::new().unwrap();
        write_unit(temp_dir.path(), "hello.md", HELLO_UNIT);

        let (registry, loader) = registry(temp_dir.path());
        registry.load_all().await.unwrap();
        registry.load_one("hello").await.unwrap();

        assert_eq!(loader.loads(), 1);
    }

    #[tokio::test]
    async fn test_load_one_uses_path_index_after_invalidate() {
        let temp_dir = TempDir::new().unwrap();
        write_unit(temp_dir.path(), "hello.md", HELLO_UNIT);

        let (registry, loader) = registry(temp_dir.path());
        registry.load_all().await.unwrap();
        registry.invalidate();

        let tool = registry.load_one("hello").await.unwrap();
        assert_eq!(tool.source(), temp_dir.path().join("hello.md"));
        assert_eq!(loader.loads(), 2);
    }

    #[tokio::test]
    async fn test_load_one_stale_index_falls_back_to_scan() {
        let temp_dir = TempDir::new().unwrap();
        write_unit(temp_dir.path(), "hello.md", HELLO_UNIT);

        let (registry, _) = registry(temp_dir.path());
        registry.load_all().await.unwrap();
        registry.invalidate();

        fs::remove_file(temp_dir.path().join("hello.md")).unwrap();
        write_unit(temp_dir.path(), "moved/hello.md", HELLO_UNIT);

        let tool = registry.load_one("hello").await.unwrap();
        assert_eq!(tool.source(), temp_dir.path().join("moved").join("hello.md"));
    }

    #[tokio::test]
    async fn test_load_one_propagates_unit_errors() {
        let temp_dir = TempDir::new().unwrap();
        write_unit(temp_dir.path(), "broken.md", BROKEN_UNIT);

        let (registry, _) = registry(temp_dir.path());
        let err = registry.load_one("broken").await.unwrap_err();
        assert!(matches!(err, ToolbeltError::InvalidUnit { .. }));
    }

    #[tokio::test]
    async fn test_name_collision_later_file_wins() {
        let temp_dir = TempDir::new().unwrap();
        write_unit(temp_dir.path(), "a/dup.md", HELLO_UNIT);
        write_unit(temp_dir.path(), "b/dup.md", HELLO_UNIT);

        let (registry, _) = registry(temp_dir.path());
        let tools = registry.load_all().await.unwrap();

        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].source(), temp_dir.path().join("b").join("dup.md"));
        let tool = registry.load_one("dup").await.unwrap();
        assert_eq!(tool.source(), temp_dir.path().join("b").join("dup.md"));
    }

    #[tokio::test]
    async fn test_validate_all_reports_without_caching() {
        let temp_dir = TempDir::new().unwrap();
        write_unit(temp_dir.path(), "hello.md", HELLO_UNIT);
        write_unit(temp_dir.path(), "broken.md", BROKEN_UNIT);

        let (registry, _) = registry(temp_dir.path());
        let report = registry.validate_all().await.unwrap();

        assert_eq!(report.total(), 2);
        assert_eq!(report.loaded.len(), 1);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].path, temp_dir.path().join("broken.md"));
        assert!(!registry.is_valid());
        assert_eq!(registry.stats().cached, 0);
    }
}
