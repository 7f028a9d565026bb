//! File applicability: does a validator's `filePattern` cover a target path?
//!
//! Architectural Principle: Service Layer - ApplicabilityResolver owns the path matching rules
//! - Patterns are regular expressions over run-root-relative paths with `/` separators
//! - Each distinct pattern compiles once and is shared across worker threads
//! - Resolution is infallible at evaluation time; bad patterns never get past loading

use crate::config::ValidatorDefinition;
use regex::Regex;
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, RwLock};

/// Decides whether a validator applies to a file path
#[derive(Debug, Default)]
pub struct ApplicabilityResolver {
    /// Compiled patterns keyed by pattern source; `None` marks a pattern that failed to compile
    compiled: RwLock<HashMap<String, Option<Arc<Regex>>>>,
}

impl ApplicabilityResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if `validator` applies to `file_path` (relative to the run root)
    pub fn applies<P: AsRef<Path>>(&self, validator: &ValidatorDefinition, file_path: P) -> bool {
        if !validator.enabled {
            return false;
        }

        let path_str = normalize_path(file_path.as_ref());
        match self.pattern_for(&validator.file_pattern) {
            Some(regex) => regex.is_match(&path_str),
            None => false,
        }
    }

    /// Number of distinct patterns compiled so far
    pub fn cached_patterns(&self) -> usize {
        self.compiled.read().map(|c| c.len()).unwrap_or(0)
    }

    fn pattern_for(&self, pattern: &str) -> Option<Arc<Regex>> {
        if let Ok(cache) = self.compiled.read() {
            if let Some(entry) = cache.get(pattern) {
                return entry.clone();
            }
        }

        let compiled = match Regex::new(pattern) {
            Ok(regex) => Some(Arc::new(regex)),
            Err(e) => {
                // Loading rejects these; reaching here means a definition was built by hand
                tracing::warn!("File pattern '{}' does not compile, treating as non-matching: {}", pattern, e);
                None
            }
        };

        if let Ok(mut cache) = self.compiled.write() {
            cache.entry(pattern.to_string()).or_insert_with(|| compiled.clone());
        }
        compiled
    }
}

/// Render a path with `/` separators and without `.` components
pub fn normalize_path(path: &Path) -> String {
    let parts: Vec<String> = path
        .components()
        .filter(|c| !matches!(c, Component::CurDir))
        .map(|c| match c {
            Component::RootDir => String::new(),
            other => other.as_os_str().to_string_lossy().into_owned(),
        })
        .collect();
    parts.join("/")
}

/// Express `path` relative to `root` when it lies below it
pub fn relative_to(root: &Path, path: &Path) -> PathBuf {
    match path.strip_prefix(root) {
        Ok(relative) if !relative.as_os_str().is_empty() => relative.to_path_buf(),
        _ => path.to_path_buf(),
    }
}
