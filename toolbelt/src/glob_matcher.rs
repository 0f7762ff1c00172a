//! Glob-based discovery and filtering of tool unit files
//!
//! One [`GlobMatcher`] is shared by the initial scan and the file watcher so
//! that "what gets loaded" and "what triggers a reload" never drift apart.

use glob::{MatchOptions, Pattern};
use std::path::{Component, Path, PathBuf};
use walkdir::WalkDir;

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// Compiled glob pattern used for unit discovery and event filtering
#[derive(Debug, Clone)]
pub struct GlobMatcher {
    pattern: Pattern,
}

impl GlobMatcher {
    /// Compile a glob pattern such as `**/*.md`
    pub fn new(pattern: &str) -> std::result::Result<Self, glob::PatternError> {
        Ok(Self {
            pattern: Pattern::new(pattern)?,
        })
    }

    /// The pattern source text
    pub fn as_str(&self) -> &str {
        self.pattern.as_str()
    }

    /// Enumerate regular files under `root` whose relative path matches.
    ///
    /// Returned paths are `root` joined with the relative path, sorted so
    /// that repeated scans visit files in the same order. An unreadable root
    /// or entry is reported and skipped; this never fails.
    pub fn scan(&self, root: &Path) -> Vec<PathBuf> {
        let mut found = Vec::new();

        for entry in WalkDir::new(root).follow_links(true) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!("Skipping unreadable path under {}: {}", root.display(), e);
                    continue;
                }
            };

            if !entry.file_type().is_file() {
                continue;
            }

            if let Ok(relative) = entry.path().strip_prefix(root) {
                if self.matches(relative) {
                    found.push(entry.path().to_path_buf());
                }
            }
        }

        found.sort();
        found
    }

    /// Check a path relative to the scan root against the pattern
    pub fn matches(&self, relative: &Path) -> bool {
        match normalize(relative) {
            Some(normalized) => self.pattern.matches_with(&normalized, MATCH_OPTIONS),
            None => false,
        }
    }

    /// Check an absolute or root-relative path against the pattern.
    ///
    /// Absolute paths outside `root` never match.
    pub fn matches_under(&self, root: &Path, path: &Path) -> bool {
        if path.is_absolute() {
            match path.strip_prefix(root) {
                Ok(relative) => self.matches(relative),
                Err(_) => false,
            }
        } else {
            self.matches(path)
        }
    }
}

/// Join the normal components of a relative path with `/`.
///
/// Patterns are always written with `/`, whatever the host separator is.
/// Returns `None` for paths that escape the root or are empty.
fn normalize(relative: &Path) -> Option<String> {
    let mut parts = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_string_lossy()),
            Component::CurDir => {}
            _ => return None,
        }
    }

    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}
