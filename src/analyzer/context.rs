//! Per-check evaluation context handed to operators and plugins

use crate::config::{EngineConfig, ValidationType};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// What a rule is evaluated against, chosen by the validator's type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EvaluationInput {
    /// Full text of the file (Content validators)
    Content(String),
    /// File name only (Naming validators)
    FileName(String),
    /// Entries of a directory (Structure validators)
    Directory(DirectoryListing),
}

impl EvaluationInput {
    /// Text view that string operators match against.
    ///
    /// Directory listings render one entry per line, directories with a
    /// trailing `/`.
    pub fn text(&self) -> Cow<'_, str> {
        match self {
            Self::Content(content) => Cow::Borrowed(content),
            Self::FileName(name) => Cow::Borrowed(name),
            Self::Directory(listing) => Cow::Owned(listing.render()),
        }
    }

    pub fn as_directory(&self) -> Option<&DirectoryListing> {
        match self {
            Self::Directory(listing) => Some(listing),
            _ => None,
        }
    }
}

/// One entry of a directory listing
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ListingEntry {
    pub name: String,
    pub is_dir: bool,
}

/// Sorted, non-recursive listing of a directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryListing {
    pub path: PathBuf,
    pub entries: Vec<ListingEntry>,
}

impl DirectoryListing {
    /// Read the immediate children of `path`
    pub fn read<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let path = path.as_ref();
        let mut entries = Vec::new();
        for entry in fs::read_dir(path)? {
            let entry = entry?;
            entries.push(ListingEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                is_dir: entry.file_type()?.is_dir(),
            });
        }
        entries.sort();
        Ok(Self {
            path: path.to_path_buf(),
            entries,
        })
    }

    /// Build a listing from known entry names; names ending in `/` are directories
    pub fn from_names<P: Into<PathBuf>>(path: P, names: &[&str]) -> Self {
        let mut entries: Vec<ListingEntry> = names
            .iter()
            .map(|name| match name.strip_suffix('/') {
                Some(dir) => ListingEntry {
                    name: dir.to_string(),
                    is_dir: true,
                },
                None => ListingEntry {
                    name: name.to_string(),
                    is_dir: false,
                },
            })
            .collect();
        entries.sort();
        Self {
            path: path.into(),
            entries,
        }
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.name.as_str())
    }

    fn render(&self) -> String {
        self.entries
            .iter()
            .map(|e| {
                if e.is_dir {
                    format!("{}/", e.name)
                } else {
                    e.name.clone()
                }
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Everything one operator or plugin invocation may look at.
///
/// Built by the engine for a single rule check. Plugins receive a clone and
/// must not keep it beyond the call.
#[derive(Debug, Clone)]
pub struct EvaluationContext {
    /// Target path relative to the run root
    pub file_path: PathBuf,
    pub validator: String,
    pub validation_type: ValidationType,
    pub input: Arc<EvaluationInput>,
    /// Parameters of the rule being evaluated
    pub params: BTreeMap<String, serde_json::Value>,
    pub config: Arc<EngineConfig>,
}

impl EvaluationContext {
    pub fn new(
        file_path: impl Into<PathBuf>,
        validator: impl Into<String>,
        validation_type: ValidationType,
        input: EvaluationInput,
        config: Arc<EngineConfig>,
    ) -> Self {
        Self {
            file_path: file_path.into(),
            validator: validator.into(),
            validation_type,
            input: Arc::new(input),
            params: BTreeMap::new(),
            config,
        }
    }

    pub fn with_params(mut self, params: BTreeMap<String, serde_json::Value>) -> Self {
        self.params = params;
        self
    }

    /// Final path component of the target
    pub fn file_name(&self) -> &str {
        self.file_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
    }

    /// Target path with forward slashes
    pub fn display_path(&self) -> String {
        self.file_path.to_string_lossy().replace('\\', "/")
    }
}
