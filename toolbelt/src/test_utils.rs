//! Test utilities for Toolbelt tests
//!
//! Fixture units plus loader doubles that count loads or pause them so tests
//! can interleave invalidations with an in-flight scan.

use crate::loader::{TemplateUnitLoader, UnitLoader};
use crate::tool::ToolDefinition;
use crate::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::Notify;

/// A valid unit greeting `name`
pub const HELLO_UNIT: &str = "---
description: Says hello
input_schema:
  type: object
  properties:
    name:
      type: string
  required: [name]
---
Hello, {{ name }}!
";

/// [`HELLO_UNIT`] with an upper-casing executor
pub const SHOUTING_HELLO_UNIT: &str = "---
description: Says hello
input_schema:
  type: object
  properties:
    name:
      type: string
  required: [name]
---
Hello, {{ name | upcase }}!
";

/// A unit without a description
pub const BROKEN_UNIT: &str = "---
input_schema:
  type: object
---
Broken {{ name }}
";

/// Write `content` to `relative` under `dir`, creating parent directories
pub fn write_unit(dir: &Path, relative: &str, content: &str) -> PathBuf {
    let path = dir.join(relative);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("Failed to create unit directory");
    }
    std::fs::write(&path, content).expect("Failed to write unit");
    path
}

/// Write a unit through a temporary file and rename so watchers never see a
/// partially written unit
pub fn write_unit_atomically(dir: &Path, relative: &str, content: &str) -> PathBuf {
    let path = dir.join(relative);
    let staging = dir.join(format!(".{}.tmp", relative.replace('/', "_")));
    std::fs::write(&staging, content).expect("Failed to write staging file");
    std::fs::rename(&staging, &path).expect("Failed to move unit into place");
    path
}

/// Template loader that counts how many units it has loaded
pub struct CountingLoader {
    inner: TemplateUnitLoader,
    loads: AtomicUsize,
}

impl CountingLoader {
    /// Create a counting loader
    pub fn new() -> Self {
        Self {
            inner: TemplateUnitLoader::new().expect("Failed to build template loader"),
            loads: AtomicUsize::new(0),
        }
    }

    /// Number of `load` calls so far
    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

impl Default for CountingLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl UnitLoader for CountingLoader {
    async fn load(&self, path: &Path) -> Result<ToolDefinition> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        self.inner.load(path).await
    }
}

/// Loader that parks its first load until released
pub struct GatedLoader {
    inner: CountingLoader,
    hold_next: AtomicBool,
    entered: Notify,
    release: Notify,
}

impl GatedLoader {
    /// Create a loader whose first load blocks
    pub fn new() -> Self {
        Self {
            inner: CountingLoader::new(),
            hold_next: AtomicBool::new(true),
            entered: Notify::new(),
            release: Notify::new(),
        }
    }

    /// Wait until the held load has started
    pub async fn wait_until_held(&self) {
        self.entered.notified().await;
    }

    /// Let the held load continue
    pub fn release(&self) {
        self.release.notify_one();
    }

    /// Number of `load` calls so far
    pub fn loads(&self) -> usize {
        self.inner.loads()
    }
}

impl Default for GatedLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl UnitLoader for GatedLoader {
    async fn load(&self, path: &Path) -> Result<ToolDefinition> {
        if self.hold_next.swap(false, Ordering::SeqCst) {
            self.entered.notify_one();
            self.release.notified().await;
        }
        self.inner.load(path).await
    }
}
