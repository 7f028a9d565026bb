//! Plugin dispatcher: resolve named evaluators and run them in isolation
//!
//! Architecture: Capability Lookup - Plugins are registered as factories at start-up
//! - `PluginRegistry` maps names to factories; nothing is loaded dynamically
//! - `PluginDispatcher` initializes each plugin at most once per run and caches the outcome
//! - Every call runs on a worker thread under `catch_unwind` with a bounded wait
//! - Errors, panics, timeouts and malformed outcomes all become `PluginFailure` values

pub mod builtin;

use crate::analyzer::context::EvaluationContext;
use crate::config::{EngineConfig, PluginSettings, Rule};
use crate::domain::violations::ViolationKind;
use crate::patterns::RuleError;
use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, OnceLock};
use std::thread;
use std::time::Duration;

/// An externally supplied rule evaluator
pub trait Plugin: Send + Sync {
    /// Name the plugin is registered under
    fn name(&self) -> &str;

    /// Evaluate one rule against the input text
    fn evaluate(
        &self,
        content: &str,
        rule: &Rule,
        context: &EvaluationContext,
    ) -> Result<PluginOutcome, PluginError>;
}

/// Error a plugin may return from initialization or evaluation
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PluginError {
    #[error("{0}")]
    Failed(String),

    #[error("invalid rule: {0}")]
    Rule(#[from] RuleError),

    #[error("initialization failed: {0}")]
    Init(String),
}

/// What a plugin reports for one rule
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PluginOutcome {
    pub passed: bool,
    pub message: Option<String>,
    /// Plugin's own certainty; authoritative when present
    pub confidence: Option<f64>,
    pub warnings: Vec<String>,
    pub suggestions: Vec<String>,
    pub metadata: BTreeMap<String, serde_json::Value>,
    pub line: Option<u32>,
    pub matched: Option<String>,
}

impl PluginOutcome {
    pub fn pass() -> Self {
        Self {
            passed: true,
            ..Default::default()
        }
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            passed: false,
            message: Some(message.into()),
            ..Default::default()
        }
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }

    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warnings.push(warning.into());
        self
    }

    pub fn at(mut self, line: u32, matched: impl Into<String>) -> Self {
        self.line = Some(line);
        self.matched = Some(matched.into());
        self
    }

    /// Reject outcomes that cannot be turned into a violation
    fn check(&self) -> Result<(), String> {
        match self.confidence {
            Some(c) if !c.is_finite() => Err(format!("confidence {c} is not a finite number")),
            Some(c) if !(0.0..=1.0).contains(&c) => Err(format!("confidence {c} is outside 0.0..=1.0")),
            _ => Ok(()),
        }
    }
}

/// Why a plugin could not produce a usable outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginFailureKind {
    /// Unknown, disabled, or failed to initialize
    Resolution,
    /// Returned an error or panicked
    Execution,
    /// Did not answer within its timeout
    Timeout,
    /// Returned an outcome that failed validation
    InvalidOutcome,
}

impl PluginFailureKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Resolution => "could not be resolved",
            Self::Execution => "failed",
            Self::Timeout => "timed out",
            Self::InvalidOutcome => "returned an invalid outcome",
        }
    }
}

impl fmt::Display for PluginFailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A contained plugin failure; never propagates past the engine
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("plugin '{plugin}' {kind}: {message}")]
pub struct PluginFailure {
    pub plugin: String,
    pub kind: PluginFailureKind,
    pub message: String,
}

impl PluginFailure {
    fn new(plugin: &str, kind: PluginFailureKind, message: impl Into<String>) -> Self {
        Self {
            plugin: plugin.to_string(),
            kind,
            message: message.into(),
        }
    }

    /// Violation tag this failure is reported under
    pub fn violation_kind(&self) -> ViolationKind {
        match self.kind {
            PluginFailureKind::Resolution => ViolationKind::PluginResolution,
            _ => ViolationKind::PluginExecution,
        }
    }
}

/// Builds a plugin from its manifest entry and the run configuration
pub type PluginFactory =
    Arc<dyn Fn(&PluginSettings, &EngineConfig) -> Result<Arc<dyn Plugin>, PluginError> + Send + Sync>;

/// Capability lookup table populated at start-up
#[derive(Clone, Default)]
pub struct PluginRegistry {
    factories: BTreeMap<String, PluginFactory>,
}

impl fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("plugins", &self.factories.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl PluginRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the bundled plugins
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        builtin::register_all(&mut registry);
        registry
    }

    /// Register (or replace) a factory under `name`
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn(&PluginSettings, &EngineConfig) -> Result<Arc<dyn Plugin>, PluginError> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Arc::new(factory));
        self
    }

    /// Register an already-built plugin instance
    pub fn register_instance(&mut self, plugin: Arc<dyn Plugin>) -> &mut Self {
        let name = plugin.name().to_string();
        self.register(name, move |_, _| Ok(Arc::clone(&plugin)))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Registered names in sorted order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    fn factory(&self, name: &str) -> Option<&PluginFactory> {
        self.factories.get(name)
    }
}

type Resolution = Result<Arc<dyn Plugin>, PluginFailure>;

/// Resolves and invokes plugins for one run
pub struct PluginDispatcher {
    registry: PluginRegistry,
    config: Arc<EngineConfig>,
    /// One cell per name; the map lock is never held while a factory runs
    resolved: Mutex<HashMap<String, Arc<OnceLock<Resolution>>>>,
}

impl fmt::Debug for PluginDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginDispatcher")
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

impl PluginDispatcher {
    pub fn new(registry: PluginRegistry, config: Arc<EngineConfig>) -> Self {
        Self {
            registry,
            config,
            resolved: Mutex::new(HashMap::new()),
        }
    }

    /// Look up and initialize `name`; both success and failure are cached for the run.
    ///
    /// Initialization is bounded by the plugin's timeout. Callers resolving the
    /// same name wait for the first one; other names are not blocked.
    pub fn resolve(&self, name: &str) -> Resolution {
        let cell = {
            let mut resolved = self.resolved.lock().unwrap_or_else(|e| e.into_inner());
            Arc::clone(resolved.entry(name.to_string()).or_default())
        };

        cell.get_or_init(|| {
            let resolution = self.initialize(name);
            match &resolution {
                Ok(_) => tracing::debug!("Resolved plugin '{}'", name),
                Err(failure) => tracing::warn!("{}", failure),
            }
            resolution
        })
        .clone()
    }

    fn initialize(&self, name: &str) -> Resolution {
        let settings = self.config.plugin_settings(name).cloned().unwrap_or_default();
        if !settings.enabled {
            return Err(PluginFailure::new(
                name,
                PluginFailureKind::Resolution,
                "disabled in the plugin manifest",
            ));
        }

        let factory = Arc::clone(self.registry.factory(name).ok_or_else(|| {
            PluginFailure::new(name, PluginFailureKind::Resolution, "no plugin registered under this name")
        })?);

        let config = Arc::clone(&self.config);
        let timeout = self.config.plugin_timeout(name);
        let bounded = run_bounded(format!("plugin-init-{name}"), timeout, move || factory(&settings, &*config));
        let message = match bounded {
            Bounded::Done(Ok(plugin)) => return Ok(plugin),
            Bounded::Done(Err(e)) => e.to_string(),
            Bounded::Panicked(reason) => format!("panicked during initialization: {reason}"),
            Bounded::TimedOut => format!("initialization did not finish within {} ms", timeout.as_millis()),
            Bounded::Lost => "initialization worker exited without an answer".to_string(),
            Bounded::NotStarted(e) => format!("could not start worker thread: {e}"),
        };
        Err(PluginFailure::new(name, PluginFailureKind::Resolution, message))
    }

    /// Run `plugin` for one rule on a worker thread, bounded by the plugin's timeout.
    ///
    /// A plugin that times out keeps running detached; its late answer is discarded.
    pub fn invoke(
        &self,
        plugin: &Arc<dyn Plugin>,
        rule: &Rule,
        context: &EvaluationContext,
    ) -> Result<PluginOutcome, PluginFailure> {
        let name = plugin.name().to_string();
        let timeout = self.config.plugin_timeout(&name);

        let worker_plugin = Arc::clone(plugin);
        let worker_rule = rule.clone();
        let worker_context = context.clone();

        tracing::debug!(
            "Invoking plugin '{}' for rule '{}' on '{}'",
            name,
            rule.id,
            context.display_path()
        );

        let failure = |kind: PluginFailureKind, message: String| PluginFailure::new(&name, kind, message);
        let outcome = match run_bounded(format!("plugin-{name}"), timeout, move || {
            let content = worker_context.input.text();
            worker_plugin.evaluate(&content, &worker_rule, &worker_context)
        }) {
            Bounded::Done(Ok(outcome)) => outcome,
            Bounded::Done(Err(e)) => return Err(failure(PluginFailureKind::Execution, e.to_string())),
            Bounded::Panicked(reason) => return Err(failure(PluginFailureKind::Execution, format!("panicked: {reason}"))),
            Bounded::TimedOut => {
                return Err(failure(
                    PluginFailureKind::Timeout,
                    format!("no answer within {} ms", timeout.as_millis()),
                ))
            }
            Bounded::Lost => {
                return Err(failure(PluginFailureKind::Execution, "worker exited without an answer".to_string()))
            }
            Bounded::NotStarted(e) => {
                return Err(failure(PluginFailureKind::Execution, format!("could not start worker thread: {e}")))
            }
        };

        outcome
            .check()
            .map_err(|reason| failure(PluginFailureKind::InvalidOutcome, reason))?;
        Ok(outcome)
    }
}

/// How a bounded call into plugin code ended
enum Bounded<T> {
    Done(T),
    Panicked(String),
    TimedOut,
    Lost,
    NotStarted(std::io::Error),
}

/// Run `work` on a named thread under `catch_unwind`, waiting at most `timeout`
fn run_bounded<T, F>(thread_name: String, timeout: Duration, work: F) -> Bounded<T>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    let (tx, rx) = mpsc::channel();
    let spawned = thread::Builder::new().name(thread_name).spawn(move || {
        let result = panic::catch_unwind(AssertUnwindSafe(work));
        // The receiver is gone once the call timed out
        let _ = tx.send(result);
    });
    if let Err(e) = spawned {
        return Bounded::NotStarted(e);
    }

    match rx.recv_timeout(timeout) {
        Ok(Ok(value)) => Bounded::Done(value),
        Ok(Err(payload)) => Bounded::Panicked(panic_message(&*payload)),
        Err(RecvTimeoutError::Timeout) => Bounded::TimedOut,
        Err(RecvTimeoutError::Disconnected) => Bounded::Lost,
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
