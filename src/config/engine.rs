//! Engine configuration: run options, plugin manifest and shared plugin settings
//!
//! One `EngineConfig` value is built per run and threaded into every
//! evaluation context. Nothing here is process-global.

use crate::domain::violations::{WardenError, WardenResult};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Configuration file names searched for in the working directory, in order
pub const DEFAULT_CONFIG_FILES: [&str; 3] =
    ["rule_warden.yaml", "rule_warden.yml", ".rule_warden.yaml"];

const SUPPORTED_VERSIONS: [&str; 1] = ["1.0"];

/// Run-wide configuration for the validation engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Configuration format version
    pub version: String,
    /// Files or directories holding validator and profile documents
    pub rules: Vec<PathBuf>,
    /// Violations below this confidence are dropped
    pub min_confidence: f64,
    /// Whether the override store is consulted
    pub apply_overrides: bool,
    /// Location of the persisted override store
    pub overrides_file: PathBuf,
    /// Default bound on a single plugin call
    pub plugin_timeout_ms: u64,
    /// Evaluate files on the rayon pool
    pub parallel: bool,
    /// Glob patterns skipped during target discovery
    pub exclude: Vec<String>,
    /// Plugin manifest keyed by plugin name
    pub plugins: BTreeMap<String, PluginSettings>,
    /// Free-form values any plugin may read
    pub settings: BTreeMap<String, serde_json::Value>,
}

/// Manifest entry for one plugin
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Overrides `plugin_timeout_ms` for this plugin
    pub timeout_ms: Option<u64>,
    #[serde(default)]
    pub settings: BTreeMap<String, serde_json::Value>,
}

impl Default for PluginSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout_ms: None,
            settings: BTreeMap::new(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            rules: vec![PathBuf::from("validators"), PathBuf::from("profiles")],
            min_confidence: 0.0,
            apply_overrides: true,
            overrides_file: PathBuf::from(".rule_warden").join("overrides.json"),
            plugin_timeout_ms: 5_000,
            parallel: true,
            exclude: vec![
                "**/node_modules/**".to_string(),
                "**/.git/**".to_string(),
                "**/target/**".to_string(),
            ],
            plugins: BTreeMap::new(),
            settings: BTreeMap::new(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from a YAML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> WardenResult<Self> {
        let contents = fs::read_to_string(&path).map_err(|e| {
            WardenError::config(format!(
                "Failed to read config file '{}': {}",
                path.as_ref().display(),
                e
            ))
        })?;

        let config: Self = serde_yaml::from_str(&contents).map_err(|e| {
            WardenError::config(format!(
                "Failed to parse config file '{}': {}",
                path.as_ref().display(),
                e
            ))
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from string content
    pub fn load_from_str(content: &str) -> WardenResult<Self> {
        let config: Self = serde_yaml::from_str(content)
            .map_err(|e| WardenError::config(format!("Failed to parse config: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    /// Load the first default config file found under `dir`, or defaults
    pub fn discover<P: AsRef<Path>>(dir: P) -> WardenResult<Self> {
        for name in DEFAULT_CONFIG_FILES {
            let candidate = dir.as_ref().join(name);
            if candidate.exists() {
                tracing::debug!("Using configuration {}", candidate.display());
                return Self::load_from_file(candidate);
            }
        }
        Ok(Self::default())
    }

    /// Validate the configuration for consistency and correctness
    pub fn validate(&self) -> WardenResult<()> {
        if !SUPPORTED_VERSIONS.contains(&self.version.as_str()) {
            return Err(WardenError::config(format!(
                "Unsupported configuration version: {}. Supported versions: {}",
                self.version,
                SUPPORTED_VERSIONS.join(", ")
            )));
        }

        if !(0.0..=1.0).contains(&self.min_confidence) {
            return Err(WardenError::config(format!(
                "min_confidence must be within 0.0..=1.0, got {}",
                self.min_confidence
            )));
        }

        if self.plugin_timeout_ms == 0 {
            return Err(WardenError::config("plugin_timeout_ms must be greater than zero"));
        }

        for (name, plugin) in &self.plugins {
            if plugin.timeout_ms == Some(0) {
                return Err(WardenError::config(format!(
                    "timeout_ms for plugin '{name}' must be greater than zero"
                )));
            }
        }

        for pattern in &self.exclude {
            glob::Pattern::new(pattern).map_err(|e| {
                WardenError::config(format!("Invalid exclude pattern '{pattern}': {e}"))
            })?;
        }

        Ok(())
    }

    /// Manifest entry for a plugin, if declared
    pub fn plugin_settings(&self, name: &str) -> Option<&PluginSettings> {
        self.plugins.get(name)
    }

    /// Effective timeout for one call into the named plugin
    pub fn plugin_timeout(&self, name: &str) -> Duration {
        let ms = self
            .plugins
            .get(name)
            .and_then(|p| p.timeout_ms)
            .unwrap_or(self.plugin_timeout_ms);
        Duration::from_millis(ms)
    }

    /// Shared setting by key
    pub fn setting(&self, key: &str) -> Option<&serde_json::Value> {
        self.settings.get(key)
    }

    /// Create a fingerprint of the configuration for diagnostics
    pub fn fingerprint(&self) -> String {
        // BTreeMap keys keep the serialized form stable
        let canonical = serde_json::to_string(self).unwrap_or_default();
        let digest = Sha256::digest(canonical.as_bytes());
        format!("{digest:x}")[..16].to_string()
    }
}

fn default_true() -> bool {
    true
}
