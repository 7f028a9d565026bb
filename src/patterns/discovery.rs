//! Target discovery for the command line: expand paths into files and directories
//!
//! Exclusion patterns follow `.gitignore` ordering: patterns apply in order,
//! the last match wins, and a leading `!` re-includes.

use crate::domain::violations::{WardenError, WardenResult};
use crate::patterns::path_filter::{normalize_path, relative_to};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Walks roots and yields evaluation targets in a stable order
#[derive(Debug, Clone)]
pub struct TargetDiscovery {
    patterns: Vec<FilterPattern>,
    include_directories: bool,
}

#[derive(Debug, Clone)]
struct FilterPattern {
    pattern: glob::Pattern,
    /// Re-include pattern (written with a leading `!`)
    is_include: bool,
    original: String,
}

impl TargetDiscovery {
    /// Create a discovery with the given exclusion patterns
    pub fn new(patterns: &[String]) -> WardenResult<Self> {
        let mut filter_patterns = Vec::new();

        for pattern_str in patterns {
            let (is_include, pattern_str) = match pattern_str.strip_prefix('!') {
                Some(stripped) => (true, stripped.to_string()),
                None => (false, pattern_str.clone()),
            };

            let pattern = glob::Pattern::new(&pattern_str).map_err(|e| {
                WardenError::pattern(format!("Invalid pattern '{pattern_str}': {e}"))
            })?;

            filter_patterns.push(FilterPattern {
                pattern,
                is_include,
                original: pattern_str,
            });
        }

        Ok(Self {
            patterns: filter_patterns,
            include_directories: true,
        })
    }

    /// Also yield directories (needed by Structure validators)
    pub fn include_directories(mut self, include: bool) -> Self {
        self.include_directories = include;
        self
    }

    /// Check a root-relative path against the exclusion patterns
    pub fn should_include(&self, relative: &Path) -> bool {
        let path_str = normalize_path(relative);
        let file_name = relative
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let mut include = true;
        for pattern in &self.patterns {
            let matches = if pattern.original.contains('/') {
                pattern.pattern.matches(&path_str)
            } else {
                pattern.pattern.matches(&file_name)
            };
            if matches {
                include = pattern.is_include;
            }
        }
        include
    }

    /// Expand `paths` (files or directories, relative to `root` or absolute) into targets.
    ///
    /// Explicitly named files are always kept. Directory walks are sorted by
    /// name so repeated runs see the same order; the walk roots themselves are
    /// not yielded. A target reached through several overlapping paths is kept
    /// once, at its first position.
    pub fn discover<P: AsRef<Path>>(&self, root: &Path, paths: &[P]) -> WardenResult<Vec<PathBuf>> {
        let mut targets = Vec::new();
        let mut seen = HashSet::new();
        let mut push = |target: PathBuf| {
            if seen.insert(normalize_path(&relative_to(root, &target))) {
                targets.push(target);
            }
        };

        for path in paths {
            let path = path.as_ref();
            let full = if path.is_absolute() { path.to_path_buf() } else { root.join(path) };

            if full.is_file() {
                push(full);
                continue;
            }
            if !full.is_dir() {
                return Err(WardenError::validation(format!(
                    "Target path does not exist: {}",
                    full.display()
                )));
            }

            for entry in WalkDir::new(&full)
                .min_depth(1)
                .follow_links(false)
                .sort_by_file_name()
                .into_iter()
                .filter_map(|e| e.ok())
            {
                let entry_path = entry.path();
                let is_dir = entry.file_type().is_dir();
                if is_dir && !self.include_directories {
                    continue;
                }
                if self.should_include(&relative_to(root, entry_path)) {
                    push(entry_path.to_path_buf());
                }
            }
        }

        tracing::debug!("Discovered {} targets", targets.len());
        Ok(targets)
    }
}
