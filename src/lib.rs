//! Rule Warden - Rule-driven structural and content validation for project trees
//!
//! Architecture: Clean Architecture - Library interface serves as the application layer
//! - Pure domain logic separated from infrastructure concerns
//! - Rule documents, engine configuration and the override store are loaded at the edge
//! - The engine itself only ever sees validated definitions and an immutable override snapshot

pub mod analyzer;
pub mod config;
pub mod domain;
pub mod overrides;
pub mod patterns;
pub mod plugins;
pub mod report;

// Re-export main types for convenient access
pub use domain::violations::{
    EvaluationResult, OverrideStatus, RunSummary, Severity, ValidatorSummary, Violation,
    ViolationKind, WardenError, WardenResult,
};

pub use config::{
    EngineConfig, PluginSettings, ProfileDefinition, Rule, RuleSet, RuleSource, RuleTarget,
    ValidationType, ValidatorDefinition,
};

pub use analyzer::{CancellationToken, Engine, EngineOptions, EvaluationContext};

pub use overrides::{OverrideRecord, OverrideSet, OverrideStats, OverrideStore};

pub use patterns::{Operator, TargetDiscovery};

pub use plugins::{Plugin, PluginError, PluginOutcome, PluginRegistry};

pub use report::{OutputFormat, ReportFormatter, ReportOptions};

use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Main entry point: one project root, its configuration and its rule definitions
#[derive(Debug, Clone)]
pub struct Warden {
    config: EngineConfig,
    rules: RuleSet,
    plugins: PluginRegistry,
    root: PathBuf,
    report_formatter: ReportFormatter,
}

/// Per-run selection and overrides of configured behavior
#[derive(Debug, Clone, Default)]
pub struct CheckOptions {
    /// Profiles to expand, in order
    pub profiles: Vec<String>,
    /// Validators to run in addition to the profiles
    pub validators: Vec<String>,
    /// Replaces the configured confidence threshold
    pub min_confidence: Option<f64>,
    /// Replaces the configured `apply_overrides` flag
    pub apply_overrides: Option<bool>,
    /// Replaces the configured `parallel` flag
    pub parallel: Option<bool>,
    pub cancellation: CancellationToken,
}

impl Warden {
    /// Create a warden from already-loaded parts, with the bundled plugins
    pub fn new<P: Into<PathBuf>>(config: EngineConfig, rules: RuleSet, root: P) -> Self {
        Self {
            config,
            rules,
            plugins: PluginRegistry::with_builtins(),
            root: root.into(),
            report_formatter: ReportFormatter::default(),
        }
    }

    /// Discover the configuration under `root` and load the rule paths it names
    pub fn open<P: AsRef<Path>>(root: P) -> WardenResult<Self> {
        let config = EngineConfig::discover(&root)?;
        Self::with_config(config, root)
    }

    /// Load configuration from an explicit file; rule paths resolve against `root`
    pub fn from_config_file<P: AsRef<Path>, R: AsRef<Path>>(path: P, root: R) -> WardenResult<Self> {
        let config = EngineConfig::load_from_file(path)?;
        Self::with_config(config, root)
    }

    /// Load the rule paths named by `config`
    pub fn with_config<P: AsRef<Path>>(config: EngineConfig, root: P) -> WardenResult<Self> {
        let root = root.as_ref();
        let rule_paths: Vec<PathBuf> = config.rules.iter().map(|p| root.join(p)).collect();
        let rules = RuleSet::load_paths(&rule_paths)?;
        if rules.is_empty() {
            tracing::warn!("No validators found under {:?}", config.rules);
        }
        Ok(Self::new(config, rules, root))
    }

    /// Replace the plugin registry
    pub fn with_plugins(mut self, plugins: PluginRegistry) -> Self {
        self.plugins = plugins;
        self
    }

    /// Register one more plugin instance
    pub fn register_plugin(&mut self, plugin: Arc<dyn Plugin>) -> &mut Self {
        self.plugins.register_instance(plugin);
        self
    }

    /// Set custom report formatter
    pub fn with_report_formatter(mut self, formatter: ReportFormatter) -> Self {
        self.report_formatter = formatter;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    pub fn plugins(&self) -> &PluginRegistry {
        &self.plugins
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Location of the override store, resolved against the root
    pub fn overrides_path(&self) -> PathBuf {
        self.root.join(&self.config.overrides_file)
    }

    /// Open the override store for management commands
    pub fn override_store(&self) -> WardenResult<OverrideStore> {
        OverrideStore::open(self.overrides_path())
    }

    /// Validator names selected by `options`, in run order
    pub fn selection(&self, options: &CheckOptions) -> WardenResult<Vec<String>> {
        self.rules.resolve_selection(&options.profiles, &options.validators)
    }

    /// Expand `paths` into targets, honoring the configured exclusions.
    ///
    /// Directories are only yielded when a selected validator inspects structure.
    pub fn discover<P: AsRef<Path>>(&self, paths: &[P], selection: &[String]) -> WardenResult<Vec<PathBuf>> {
        let wants_directories = selection
            .iter()
            .filter_map(|name| self.rules.validator(name))
            .any(|v| v.validation_type == ValidationType::Structure);

        TargetDiscovery::new(&self.config.exclude)?
            .include_directories(wants_directories)
            .discover(&self.root, paths)
    }

    /// Discover targets under `paths` and evaluate them
    pub fn check<P: AsRef<Path>>(&self, paths: &[P], options: &CheckOptions) -> WardenResult<RunSummary> {
        let selection = self.selection(options)?;
        let targets = self.discover(paths, &selection)?;
        self.engine(options).evaluate(&self.rules, &selection, &targets)
    }

    /// Evaluate exactly the given files, without discovery
    pub fn evaluate<P: AsRef<Path>>(&self, files: &[P], options: &CheckOptions) -> WardenResult<RunSummary> {
        let selection = self.selection(options)?;
        self.engine(options).evaluate(&self.rules, &selection, files)
    }

    /// Run [`Warden::check`] on the blocking pool
    pub async fn validate(&self, paths: Vec<PathBuf>, options: CheckOptions) -> WardenResult<RunSummary> {
        let warden = self.clone();
        tokio::task::spawn_blocking(move || warden.check(&paths, &options))
            .await
            .map_err(|e| WardenError::validation(format!("Validation task failed: {e}")))?
    }

    /// Validators that would evaluate `path`, in definition order
    pub fn explain<P: AsRef<Path>>(&self, path: P) -> Vec<&ValidatorDefinition> {
        let path = path.as_ref();
        let absolute = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        };
        let relative = patterns::path_filter::relative_to(&self.root, &absolute);
        let candidates: Vec<&ValidatorDefinition> = self.rules.validators().iter().collect();
        let options = CheckOptions {
            apply_overrides: Some(false),
            ..Default::default()
        };
        self.engine(&options)
            .applicable(&candidates, &relative, absolute.is_dir())
    }

    /// Format a run summary for output
    pub fn format_report(&self, summary: &RunSummary, format: OutputFormat) -> WardenResult<String> {
        self.report_formatter.format_report(summary, format)
    }

    fn engine(&self, options: &CheckOptions) -> Engine {
        let apply_overrides = options.apply_overrides.unwrap_or(self.config.apply_overrides);
        let overrides = if apply_overrides {
            OverrideStore::load_or_empty(self.overrides_path())
        } else {
            OverrideSet::default()
        };

        let mut engine_options = EngineOptions::from_config(&self.config, &self.root)
            .with_overrides(overrides)
            .with_cancellation(options.cancellation.clone());
        if let Some(min) = options.min_confidence {
            engine_options.min_confidence = min;
        }
        if let Some(parallel) = options.parallel {
            engine_options.parallel = parallel;
        }

        Engine::new(self.config.clone(), self.plugins.clone(), engine_options)
    }
}
