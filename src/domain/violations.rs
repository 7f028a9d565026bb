//! Core domain models for violations, evaluation results and run summaries
//!
//! Architecture: Rich Domain Models - Violations carry their own identity and provenance
//! - A `Finding` is what a rule check produces; only the annotator turns it into a `Violation`
//! - `EvaluationResult` is the unit of output for one (file, validator) pair
//! - `RunSummary` acts as the aggregate root handed to reporters

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Severity levels for violations
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Informational messages and suggestions
    Info,
    /// Warnings that should be addressed but don't block builds
    Warning,
    /// Errors that fail the validator
    Error,
}

impl Severity {
    /// Convert to string for display
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }
}

/// Where a violation came from.
///
/// Everything except `Rule` is a tooling failure rather than a finding about
/// the target file, and is reported under the internal-error tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum ViolationKind {
    /// The rule ran and the file did not satisfy it
    Rule,
    /// The named plugin could not be found or failed to initialize
    PluginResolution,
    /// The plugin errored, panicked, timed out or returned an invalid outcome
    PluginExecution,
    /// The rule itself could not be evaluated (bad parameter, unreadable input)
    InternalError,
}

impl ViolationKind {
    pub fn is_internal(self) -> bool {
        !matches!(self, Self::Rule)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Rule => "rule",
            Self::PluginResolution => "plugin-resolution",
            Self::PluginExecution => "plugin-execution",
            Self::InternalError => "internal-error",
        }
    }
}

/// Decision recorded against a fingerprinted violation
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum OverrideStatus {
    /// Not a genuine problem; removed from reports
    FalsePositive,
    /// Genuine, but accepted; kept in reports and flagged
    AcceptedRisk,
}

impl OverrideStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::FalsePositive => "false-positive",
            Self::AcceptedRisk => "accepted-risk",
        }
    }

    /// Parse from the kebab-case form used on disk and on the command line
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "false-positive" | "false_positive" | "fp" => Some(Self::FalsePositive),
            "accepted-risk" | "accepted_risk" | "accepted" => Some(Self::AcceptedRisk),
            _ => None,
        }
    }
}

/// A failed rule application before confidence and severity are settled.
///
/// Produced by the evaluation engine; consumed by
/// [`crate::analyzer::confidence::annotate`].
#[derive(Debug, Clone, PartialEq)]
pub struct Finding {
    pub validator: String,
    pub rule_id: String,
    pub kind: ViolationKind,
    pub file_path: PathBuf,
    pub message: String,
    pub line_number: Option<u32>,
    /// Exact excerpt that triggered the rule, when the check has one
    pub matched: Option<String>,
    /// Explicit confidence supplied by a plugin
    pub confidence: Option<f64>,
    pub severity: Option<Severity>,
    pub suggested_fix: Option<String>,
    pub warnings: Vec<String>,
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl Finding {
    pub fn new(
        validator: impl Into<String>,
        rule_id: impl Into<String>,
        kind: ViolationKind,
        file_path: PathBuf,
        message: impl Into<String>,
    ) -> Self {
        Self {
            validator: validator.into(),
            rule_id: rule_id.into(),
            kind,
            file_path,
            message: message.into(),
            line_number: None,
            matched: None,
            confidence: None,
            severity: None,
            suggested_fix: None,
            warnings: Vec::new(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_line(mut self, line: Option<u32>) -> Self {
        self.line_number = line;
        self
    }

    pub fn with_matched(mut self, matched: Option<String>) -> Self {
        self.matched = matched;
        self
    }

    pub fn with_confidence(mut self, confidence: Option<f64>) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn with_suggestion(mut self, suggestion: Option<String>) -> Self {
        self.suggested_fix = suggestion;
        self
    }
}

/// A violation ready for override matching, filtering and reporting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    /// Validator that owns the failing rule
    pub validator: String,
    /// Rule identifier within the validator
    pub rule_id: String,
    /// Whether this is a genuine finding or a tooling failure
    pub kind: ViolationKind,
    /// Path of the target, relative to the run root
    pub file_path: PathBuf,
    /// Human-readable description of the violation
    pub message: String,
    /// Line number (1-indexed) where the violation occurs
    pub line_number: Option<u32>,
    /// Excerpt that triggered the rule
    pub matched: Option<String>,
    /// Certainty that the violation is genuine, in `[0.0, 1.0]`
    pub confidence: f64,
    pub severity: Severity,
    /// Stable hash used for override lookups
    pub fingerprint: String,
    /// Suggested fix for the violation (if available)
    pub suggested_fix: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, serde_json::Value>,
    /// Set when an accepted-risk override matched this violation
    pub override_status: Option<OverrideStatus>,
}

impl Violation {
    /// Whether this violation reports a tooling failure
    pub fn is_internal(&self) -> bool {
        self.kind.is_internal()
    }

    /// Whether this violation still counts against its validator
    pub fn is_blocking(&self) -> bool {
        self.override_status != Some(OverrideStatus::AcceptedRisk)
    }

    /// Format violation for display
    pub fn format_display(&self) -> String {
        let location = match self.line_number {
            Some(line) => format!(":{line}"),
            None => String::new(),
        };

        format!(
            "{}{} [{}] {}/{}: {}",
            self.file_path.display(),
            location,
            self.severity.as_str(),
            self.validator,
            self.rule_id,
            self.message
        )
    }
}

/// Outcome of one validator against one file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub file_path: PathBuf,
    pub validator: String,
    /// True when no violation blocks; a result holding only accepted-risk
    /// violations still passes
    pub passed: bool,
    pub violations: Vec<Violation>,
    /// Set when the validator could not be evaluated as a whole
    pub message: Option<String>,
}

impl EvaluationResult {
    pub fn new(file_path: PathBuf, validator: impl Into<String>, violations: Vec<Violation>) -> Self {
        let passed = violations.iter().all(|v| !v.is_blocking());
        Self {
            file_path,
            validator: validator.into(),
            passed,
            violations,
            message: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Recompute `passed` after violations were filtered or flagged
    pub fn refresh_status(&mut self) {
        self.passed = self.violations.iter().all(|v| !v.is_blocking());
    }
}

/// Count of violations by severity level
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViolationCounts {
    pub error: usize,
    pub warning: usize,
    pub info: usize,
}

impl ViolationCounts {
    /// Total number of violations across all severities
    pub fn total(&self) -> usize {
        self.error + self.warning + self.info
    }

    /// Add a violation to the counts
    pub fn add(&mut self, severity: Severity) {
        match severity {
            Severity::Error => self.error += 1,
            Severity::Warning => self.warning += 1,
            Severity::Info => self.info += 1,
        }
    }
}

/// Pass/fail tally for one validator across all files it applied to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorSummary {
    pub name: String,
    pub files_evaluated: usize,
    pub passed: usize,
    pub failed: usize,
    pub violations: usize,
}

impl ValidatorSummary {
    pub fn is_passing(&self) -> bool {
        self.failed == 0
    }
}

/// Final aggregate of a run, handed to reporters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub total_files: usize,
    pub total_validators: usize,
    /// Number of (file, validator) pairs that were evaluated
    pub evaluations: usize,
    pub passed: usize,
    pub failed: usize,
    pub violations_by_severity: ViolationCounts,
    pub internal_errors: usize,
    /// Violations removed by false-positive overrides
    pub suppressed: usize,
    /// Violations kept but flagged by accepted-risk overrides
    pub accepted_risk: usize,
    /// Scheduling stopped early on request
    pub cancelled: bool,
    pub validators: Vec<ValidatorSummary>,
    pub results: Vec<EvaluationResult>,
}

impl RunSummary {
    /// Whether any evaluated pair failed
    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }

    pub fn has_violations(&self) -> bool {
        self.violations_by_severity.total() > 0
    }

    /// All reported violations in result order
    pub fn violations(&self) -> impl Iterator<Item = &Violation> {
        self.results.iter().flat_map(|r| r.violations.iter())
    }

    /// Result for a specific pair, if it was evaluated
    pub fn result_for(&self, file_path: &std::path::Path, validator: &str) -> Option<&EvaluationResult> {
        self.results
            .iter()
            .find(|r| r.file_path == file_path && r.validator == validator)
    }
}

/// Error types that can occur while loading rules or running the engine
#[derive(Debug, thiserror::Error)]
pub enum WardenError {
    /// Rule, profile or engine configuration is malformed or inconsistent
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// A rule names an operator the registry does not know
    #[error("Unknown operator '{operator}' in rule '{rule}' of validator '{validator}'")]
    Operator {
        validator: String,
        rule: String,
        operator: String,
    },

    /// File could not be read or accessed
    #[error("IO error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    /// Pattern compilation failed
    #[error("Pattern error: {message}")]
    Pattern { message: String },

    /// Override store could not be read or written
    #[error("Override store error: {message}")]
    OverrideStore { message: String },

    /// Validation run could not be completed
    #[error("Validation error: {message}")]
    Validation { message: String },
}

impl WardenError {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create an unknown-operator error
    pub fn operator(
        validator: impl Into<String>,
        rule: impl Into<String>,
        operator: impl Into<String>,
    ) -> Self {
        Self::Operator {
            validator: validator.into(),
            rule: rule.into(),
            operator: operator.into(),
        }
    }

    /// Create a pattern error
    pub fn pattern(message: impl Into<String>) -> Self {
        Self::Pattern {
            message: message.into(),
        }
    }

    /// Create an override store error
    pub fn overrides(message: impl Into<String>) -> Self {
        Self::OverrideStore {
            message: message.into(),
        }
    }

    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Whether this error must stop a run before any evaluation
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Configuration { .. } | Self::Operator { .. } | Self::Pattern { .. })
    }
}

/// Result type for Warden operations
pub type WardenResult<T> = Result<T, WardenError>;
