//! Rule evaluation engine: the orchestrator of a validation run
//!
//! Architecture: Domain Services - Engine coordinates every stage of a run
//! - Resolves which validators apply to each target and builds the matching input
//! - Dispatches each rule to the operator registry or the plugin dispatcher
//! - Turns failures of any kind into annotated violations; nothing escapes a rule
//! - Applies overrides and the confidence threshold, then aggregates in input order

pub mod aggregate;
pub mod confidence;
pub mod context;

use crate::config::{EngineConfig, Rule, RuleSet, RuleTarget, ValidationType, ValidatorDefinition};
use crate::domain::violations::{
    EvaluationResult, Finding, RunSummary, Violation, ViolationKind, WardenError, WardenResult,
};
use crate::overrides::{OverrideCounts, OverrideSet};
use crate::patterns::path_filter::{normalize_path, relative_to};
use crate::patterns::{ApplicabilityResolver, OperatorOutcome, OperatorRegistry};
use crate::plugins::{PluginDispatcher, PluginOutcome, PluginRegistry};
use rayon::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub use aggregate::aggregate;
pub use confidence::{annotate, filter_by_confidence, DEFAULT_CONFIDENCE};
pub use context::{DirectoryListing, EvaluationContext, EvaluationInput, ListingEntry};

/// Rule id used for violations about the target input itself
pub const INPUT_RULE_ID: &str = "<input>";

/// Cooperative stop signal shared with a running evaluation
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stop scheduling new (file, validator) pairs; in-flight ones finish
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Options for one engine run
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Directory that file patterns and reported paths are relative to
    pub root: PathBuf,
    /// Whether to use parallel processing
    pub parallel: bool,
    /// Violations below this confidence are dropped
    pub min_confidence: f64,
    /// Decisions applied to every result
    pub overrides: OverrideSet,
    pub cancellation: CancellationToken,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            parallel: true,
            min_confidence: 0.0,
            overrides: OverrideSet::default(),
            cancellation: CancellationToken::default(),
        }
    }
}

impl EngineOptions {
    /// Options taken from the run configuration, without overrides
    pub fn from_config<P: Into<PathBuf>>(config: &EngineConfig, root: P) -> Self {
        Self {
            root: root.into(),
            parallel: config.parallel,
            min_confidence: config.min_confidence,
            ..Default::default()
        }
    }

    pub fn with_overrides(mut self, overrides: OverrideSet) -> Self {
        self.overrides = overrides;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }
}

/// Typed result of one rule check, whichever evaluator produced it
#[derive(Debug, Clone, PartialEq)]
pub enum RuleOutcome {
    Operator(OperatorOutcome),
    Plugin(PluginOutcome),
}

impl RuleOutcome {
    pub fn passed(&self) -> bool {
        match self {
            Self::Operator(o) => o.passed,
            Self::Plugin(o) => o.passed,
        }
    }

    fn details(&self) -> Option<&str> {
        match self {
            Self::Operator(o) => o.message.as_deref(),
            Self::Plugin(o) => o.message.as_deref(),
        }
    }

    fn matched(&self) -> Option<&str> {
        match self {
            Self::Operator(o) => o.matched.as_deref(),
            Self::Plugin(o) => o.matched.as_deref(),
        }
    }

    /// Finding for a failed check
    fn into_finding(self, rule: &Rule, context: &EvaluationContext) -> Finding {
        let message = render_message(rule, context, self.details(), self.matched());
        let finding = Finding::new(
            context.validator.clone(),
            rule.id.clone(),
            ViolationKind::Rule,
            context.file_path.clone(),
            message,
        );

        match self {
            Self::Operator(outcome) => finding
                .with_line(outcome.line)
                .with_matched(outcome.matched)
                .with_suggestion(rule.suggestion.clone()),
            Self::Plugin(outcome) => {
                let mut suggestions = outcome.suggestions.into_iter();
                let suggestion = rule.suggestion.clone().or_else(|| suggestions.next());
                let mut finding = finding
                    .with_line(outcome.line)
                    .with_matched(outcome.matched)
                    .with_confidence(outcome.confidence)
                    .with_suggestion(suggestion);
                finding.warnings = outcome.warnings;
                finding.metadata = outcome.metadata;
                let rest: Vec<String> = suggestions.collect();
                if !rest.is_empty() {
                    finding
                        .metadata
                        .insert("suggestions".to_string(), serde_json::Value::from(rest));
                }
                finding
            }
        }
    }
}

/// Fill a rule's message template.
///
/// Placeholders: `{file}`, `{validator}`, `{rule}`, `{match}`, `{details}`
/// and any rule parameter by name. Unknown placeholders are left as written.
fn render_message(rule: &Rule, context: &EvaluationContext, details: Option<&str>, matched: Option<&str>) -> String {
    let details = details.unwrap_or("check failed");
    let Some(template) = rule.message.as_deref() else {
        return format!("{}: {}", rule.id, details);
    };

    let mut rendered = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        rendered.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        let Some(end) = after.find('}') else {
            rendered.push_str(&rest[start..]);
            return rendered;
        };
        let key = &after[..end];
        let value = match key {
            "file" => Some(context.display_path()),
            "validator" => Some(context.validator.clone()),
            "rule" => Some(rule.id.clone()),
            "match" => Some(matched.unwrap_or_default().to_string()),
            "details" => Some(details.to_string()),
            _ => rule.param(key).map(param_text),
        };
        match value {
            Some(value) => rendered.push_str(&value),
            None => rendered.push_str(&rest[start..start + end + 2]),
        }
        rest = &after[end + 1..];
    }
    rendered.push_str(rest);
    rendered
}

fn param_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Array(items) => items.iter().map(param_text).collect::<Vec<_>>().join(", "),
        other => other.to_string(),
    }
}

/// Orchestrates validator resolution, rule dispatch and result assembly
#[derive(Debug)]
pub struct Engine {
    config: Arc<EngineConfig>,
    operators: OperatorRegistry,
    dispatcher: PluginDispatcher,
    resolver: ApplicabilityResolver,
    options: EngineOptions,
}

/// One target of a run
struct Target {
    absolute: PathBuf,
    relative: PathBuf,
}

impl Engine {
    /// Create an engine for one run
    pub fn new(config: EngineConfig, plugins: PluginRegistry, options: EngineOptions) -> Self {
        let config = Arc::new(config);
        Self {
            dispatcher: PluginDispatcher::new(plugins, Arc::clone(&config)),
            config,
            operators: OperatorRegistry::new(),
            resolver: ApplicabilityResolver::new(),
            options,
        }
    }

    /// Engine with default configuration and the bundled plugins
    pub fn with_defaults() -> Self {
        Self::new(EngineConfig::default(), PluginRegistry::with_builtins(), EngineOptions::default())
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    /// Evaluate `files` against the named validators, in the given order.
    ///
    /// Unknown validator names fail before anything is evaluated. Every other
    /// problem is reported as a violation inside the summary.
    pub fn evaluate<P: AsRef<Path>>(
        &self,
        rule_set: &RuleSet,
        validator_names: &[String],
        files: &[P],
    ) -> WardenResult<RunSummary> {
        let validators = validator_names
            .iter()
            .map(|name| {
                rule_set
                    .validator(name)
                    .ok_or_else(|| WardenError::config(format!("Unknown validator '{name}'")))
            })
            .collect::<WardenResult<Vec<_>>>()?;

        let targets: Vec<Target> = files
            .iter()
            .map(|file| {
                let file = file.as_ref();
                let absolute = if file.is_absolute() {
                    file.to_path_buf()
                } else {
                    self.options.root.join(file)
                };
                let relative = PathBuf::from(normalize_path(&relative_to(&self.options.root, &absolute)));
                Target { absolute, relative }
            })
            .collect();

        tracing::debug!(
            "Evaluating {} targets against {} validators (parallel: {})",
            targets.len(),
            validators.len(),
            self.options.parallel
        );

        let per_file: Vec<(Vec<EvaluationResult>, OverrideCounts)> = if self.options.parallel && targets.len() > 1 {
            targets
                .par_iter()
                .map(|target| self.evaluate_target(&validators, target))
                .collect()
        } else {
            targets
                .iter()
                .map(|target| self.evaluate_target(&validators, target))
                .collect()
        };

        let mut results = Vec::new();
        let mut overrides = OverrideCounts::default();
        for (file_results, counts) in per_file {
            results.extend(file_results);
            overrides.add(counts);
        }

        let cancelled = self.options.cancellation.is_cancelled();
        let summary = aggregate(results, validator_names, targets.len(), overrides, cancelled);

        tracing::info!(
            "Evaluated {} pairs across {} files: {} passed, {} failed, {} internal errors{}",
            summary.evaluations,
            summary.total_files,
            summary.passed,
            summary.failed,
            summary.internal_errors,
            if cancelled { " (cancelled)" } else { "" }
        );

        Ok(summary)
    }

    /// Validators from `validators` that apply to a target at `relative`
    pub fn applicable<'a>(
        &self,
        validators: &[&'a ValidatorDefinition],
        relative: &Path,
        is_dir: bool,
    ) -> Vec<&'a ValidatorDefinition> {
        validators
            .iter()
            .copied()
            .filter(|v| self.applies(v, relative, is_dir))
            .collect()
    }

    fn applies(&self, validator: &ValidatorDefinition, relative: &Path, is_dir: bool) -> bool {
        if is_dir && validator.validation_type == ValidationType::Content {
            return false;
        }
        self.resolver.applies(validator, relative)
    }

    fn evaluate_target(
        &self,
        validators: &[&ValidatorDefinition],
        target: &Target,
    ) -> (Vec<EvaluationResult>, OverrideCounts) {
        let is_dir = target.absolute.is_dir();
        let mut results = Vec::new();
        let mut counts = OverrideCounts::default();
        let mut content: Option<Result<Arc<EvaluationInput>, String>> = None;

        for validator in validators {
            if self.options.cancellation.is_cancelled() {
                break;
            }
            if !self.applies(validator, &target.relative, is_dir) {
                continue;
            }

            let input = match validator.validation_type {
                ValidationType::Content => content
                    .get_or_insert_with(|| {
                        fs::read_to_string(&target.absolute)
                            .map(|text| Arc::new(EvaluationInput::Content(text)))
                            .map_err(|e| format!("Failed to read file: {e}"))
                    })
                    .clone(),
                ValidationType::Naming => {
                    let name = target
                        .absolute
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_default();
                    Ok(Arc::new(EvaluationInput::FileName(name)))
                }
                ValidationType::Structure => {
                    let dir = if is_dir {
                        target.absolute.as_path()
                    } else {
                        target.absolute.parent().unwrap_or(self.options.root.as_path())
                    };
                    DirectoryListing::read(dir)
                        .map(|listing| Arc::new(EvaluationInput::Directory(listing)))
                        .map_err(|e| format!("Failed to list directory {}: {e}", dir.display()))
                }
            };

            let result = match input {
                Ok(input) => {
                    let violations = self.evaluate_validator(validator, &target.relative, input);
                    let (violations, applied) = self.options.overrides.apply(violations);
                    counts.add(applied);
                    let violations = filter_by_confidence(violations, self.options.min_confidence);
                    EvaluationResult::new(target.relative.clone(), &validator.name, violations)
                }
                Err(message) => {
                    tracing::warn!("{}: {}", target.relative.display(), message);
                    let finding = Finding::new(
                        validator.name.clone(),
                        INPUT_RULE_ID,
                        ViolationKind::InternalError,
                        target.relative.clone(),
                        message.clone(),
                    );
                    EvaluationResult::new(
                        target.relative.clone(),
                        &validator.name,
                        vec![annotate(finding, None, validator)],
                    )
                    .with_message(message)
                }
            };
            results.push(result);
        }

        (results, counts)
    }

    /// Check every rule of one validator against one input, in definition order
    fn evaluate_validator(
        &self,
        validator: &ValidatorDefinition,
        relative: &Path,
        input: Arc<EvaluationInput>,
    ) -> Vec<Violation> {
        let content = input.text().into_owned();
        let mut context = EvaluationContext {
            file_path: relative.to_path_buf(),
            validator: validator.name.clone(),
            validation_type: validator.validation_type,
            input,
            params: Default::default(),
            config: Arc::clone(&self.config),
        };

        let mut violations = Vec::new();
        for rule in &validator.rules {
            context.params = rule.params.clone();
            if let Some(finding) = self.check_rule(rule, &content, &context) {
                violations.push(annotate(finding, Some(rule), validator));
            }
        }
        violations
    }

    /// At most one finding per rule; evaluator failures become internal findings
    fn check_rule(&self, rule: &Rule, content: &str, context: &EvaluationContext) -> Option<Finding> {
        let internal = |kind: ViolationKind, message: String| {
            Finding::new(
                context.validator.clone(),
                rule.id.clone(),
                kind,
                context.file_path.clone(),
                message,
            )
        };

        let outcome = match &rule.target {
            RuleTarget::Operator(operator) => match self.operators.invoke(*operator, content, rule, context) {
                Ok(outcome) => RuleOutcome::Operator(outcome),
                Err(e) => {
                    tracing::warn!(
                        "Rule '{}' of validator '{}' could not be evaluated: {}",
                        rule.id,
                        context.validator,
                        e
                    );
                    return Some(internal(
                        ViolationKind::InternalError,
                        format!("rule '{}' could not be evaluated: {}", rule.id, e),
                    ));
                }
            },
            RuleTarget::Plugin(name) => {
                let invoked = self
                    .dispatcher
                    .resolve(name)
                    .and_then(|plugin| self.dispatcher.invoke(&plugin, rule, context));
                match invoked {
                    Ok(outcome) => RuleOutcome::Plugin(outcome),
                    Err(failure) => {
                        tracing::warn!("{} (rule '{}', {})", failure, rule.id, context.display_path());
                        return Some(internal(failure.violation_kind(), failure.to_string()));
                    }
                }
            }
        };

        if outcome.passed() {
            None
        } else {
            Some(outcome.into_finding(rule, context))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RuleSource;
    use crate::domain::violations::{OverrideStatus, Severity};
    use crate::overrides::OverrideRecord;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    const RULES: &str = r#"
name: requires-default-export
type: content
filePattern: '.*\.js$'
rules:
  - id: default-export
    operator: mustContain
    value: export default
    message: "{file} must contain '{value}'"
---
name: no-console
type: content
filePattern: '.*\.js$'
severity: warning
rules:
  - operator: mustNotContain
    value: console.log
---
name: component-structure
type: structure
filePattern: '^components/[^/]+$'
rules:
  - operator: fileExists
    files: [index.js]
---
name: kebab-files
type: naming
filePattern: '.*\.js$'
rules:
  - plugin: naming-convention
"#;

    fn rule_set() -> RuleSet {
        RuleSet::load(&[RuleSource::yaml("rules", RULES)]).unwrap()
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn engine(root: &Path, options: EngineOptions) -> Engine {
        Engine::new(
            EngineConfig::default(),
            PluginRegistry::with_builtins(),
            EngineOptions {
                root: root.to_path_buf(),
                ..options
            },
        )
    }

    fn fixture() -> TempDir {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::create_dir_all(root.join("components/button")).unwrap();
        fs::create_dir_all(root.join("components/card")).unwrap();
        fs::write(root.join("components/button/index.js"), "export default Button;\n").unwrap();
        fs::write(root.join("components/card/Card.js"), "const a = 1;\nconsole.log(a);\n").unwrap();
        temp_dir
    }

    #[test]
    fn test_content_rules_and_templates() -> WardenResult<()> {
        let temp_dir = fixture();
        let engine = engine(temp_dir.path(), EngineOptions::default());
        let summary = engine.evaluate(
            &rule_set(),
            &names(&["requires-default-export", "no-console"]),
            &["components/button/index.js", "components/card/Card.js"],
        )?;

        assert_eq!(summary.evaluations, 4);
        let button = summary.result_for(Path::new("components/button/index.js"), "requires-default-export").unwrap();
        assert!(button.passed);

        let card = summary.result_for(Path::new("components/card/Card.js"), "requires-default-export").unwrap();
        assert!(!card.passed);
        assert_eq!(card.violations[0].message, "components/card/Card.js must contain 'export default'");

        let console = summary.result_for(Path::new("components/card/Card.js"), "no-console").unwrap();
        assert_eq!(console.violations[0].severity, Severity::Warning);
        assert_eq!(console.violations[0].line_number, Some(2));
        assert_eq!(console.violations[0].rule_id, "mustNotContain#1");
        Ok(())
    }

    #[test]
    fn test_structure_and_naming() -> WardenResult<()> {
        let temp_dir = fixture();
        let engine = engine(temp_dir.path(), EngineOptions::default());
        let summary = engine.evaluate(
            &rule_set(),
            &names(&["component-structure", "kebab-files", "requires-default-export"]),
            &["components/button", "components/card", "components/card/Card.js"],
        )?;

        assert!(summary.result_for(Path::new("components/button"), "component-structure").unwrap().passed);
        assert!(!summary.result_for(Path::new("components/card"), "component-structure").unwrap().passed);
        // Content validators never see directories
        assert!(summary.result_for(Path::new("components/card"), "requires-default-export").is_none());

        let naming = summary.result_for(Path::new("components/card/Card.js"), "kebab-files").unwrap();
        assert!(!naming.passed);
        assert_eq!(naming.violations[0].suggested_fix.as_deref(), Some("rename to 'card.js'"));
        Ok(())
    }

    #[test]
    fn test_non_applicable_pairs_absent() -> WardenResult<()> {
        let temp_dir = fixture();
        fs::write(temp_dir.path().join("README.md"), "# hi").unwrap();
        let summary = engine(temp_dir.path(), EngineOptions::default()).evaluate(
            &rule_set(),
            &names(&["requires-default-export"]),
            &["README.md"],
        )?;
        assert_eq!(summary.evaluations, 0);
        assert_eq!(summary.total_files, 1);
        Ok(())
    }

    #[test]
    fn test_unknown_validator_is_config_error() {
        let temp_dir = fixture();
        let err = engine(temp_dir.path(), EngineOptions::default())
            .evaluate(&rule_set(), &names(&["nope"]), &["components/card/Card.js"])
            .unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_unreadable_content_is_internal_error() -> WardenResult<()> {
        let temp_dir = fixture();
        fs::write(temp_dir.path().join("binary.js"), [0xffu8, 0xfe, 0x00]).unwrap();
        let summary = engine(temp_dir.path(), EngineOptions::default()).evaluate(
            &rule_set(),
            &names(&["requires-default-export"]),
            &["binary.js"],
        )?;

        let result = &summary.results[0];
        assert!(!result.passed);
        assert!(result.message.is_some());
        assert_eq!(result.violations.len(), 1);
        assert_eq!(result.violations[0].kind, ViolationKind::InternalError);
        assert_eq!(summary.internal_errors, 1);
        Ok(())
    }

    #[test]
    fn test_bad_parameter_isolated_to_rule() -> WardenResult<()> {
        let temp_dir = fixture();
        let rules = RuleSet::load(&[RuleSource::yaml(
            "rules",
            "name: v\ntype: content\nfilePattern: '.*'\nrules:\n  - operator: matchesRegex\n    pattern: '(unclosed'\n  - operator: mustContain\n    value: export default\n",
        )])?;
        let summary = engine(temp_dir.path(), EngineOptions::default()).evaluate(
            &rules,
            &names(&["v"]),
            &["components/card/Card.js"],
        )?;

        let kinds: Vec<_> = summary.results[0].violations.iter().map(|v| v.kind).collect();
        assert_eq!(kinds, vec![ViolationKind::InternalError, ViolationKind::Rule]);
        Ok(())
    }

    #[test]
    fn test_overrides_and_threshold() -> WardenResult<()> {
        let temp_dir = fixture();
        let rule_set = rule_set();
        let files = ["components/card/Card.js"];
        let selection = names(&["requires-default-export", "no-console"]);

        let first = engine(temp_dir.path(), EngineOptions::default()).evaluate(&rule_set, &selection, &files)?;
        let violations: Vec<_> = first.violations().cloned().collect();
        assert_eq!(violations.len(), 2);

        let overrides = OverrideSet::from_records([
            OverrideRecord::for_violation(&violations[0], OverrideStatus::FalsePositive, "generated", "dev"),
            OverrideRecord::for_violation(&violations[1], OverrideStatus::AcceptedRisk, "debug build", "dev"),
        ]);
        let second = engine(temp_dir.path(), EngineOptions::default().with_overrides(overrides))
            .evaluate(&rule_set, &selection, &files)?;

        assert_eq!(second.suppressed, 1);
        assert_eq!(second.accepted_risk, 1);
        assert!(!second.has_failures());
        assert_eq!(second.violations().count(), 1);

        let strict = engine(
            temp_dir.path(),
            EngineOptions {
                min_confidence: 1.0,
                ..Default::default()
            },
        )
        .evaluate(&rule_set, &selection, &files)?;
        assert_eq!(strict.violations().count(), 2);
        Ok(())
    }

    #[test]
    fn test_parallel_matches_sequential() -> WardenResult<()> {
        let temp_dir = fixture();
        let files = [
            "components/button/index.js",
            "components/card/Card.js",
            "components/button",
            "components/card",
        ];
        let selection = names(&["requires-default-export", "no-console", "component-structure", "kebab-files"]);

        let parallel = engine(temp_dir.path(), EngineOptions::default()).evaluate(&rule_set(), &selection, &files)?;
        let sequential = engine(
            temp_dir.path(),
            EngineOptions {
                parallel: false,
                ..Default::default()
            },
        )
        .evaluate(&rule_set(), &selection, &files)?;

        assert_eq!(
            serde_json::to_string(&parallel).unwrap(),
            serde_json::to_string(&sequential).unwrap()
        );
        Ok(())
    }

    #[test]
    fn test_cancelled_run_schedules_nothing() -> WardenResult<()> {
        let temp_dir = fixture();
        let token = CancellationToken::new();
        token.cancel();
        let summary = engine(temp_dir.path(), EngineOptions::default().with_cancellation(token)).evaluate(
            &rule_set(),
            &names(&["requires-default-export"]),
            &["components/card/Card.js"],
        )?;
        assert!(summary.cancelled);
        assert_eq!(summary.evaluations, 0);
        Ok(())
    }

    #[test]
    fn test_render_message_placeholders() {
        let rule = Rule::with_operator(
            "r",
            crate::patterns::Operator::ContainsAll,
            BTreeMap::from([("values".to_string(), serde_json::json!(["a", "b"]))]),
        )
        .message("{validator}/{rule} on {file}: {details} [{values}] {unknown} {match}");
        let context = EvaluationContext::new(
            "src/x.js",
            "v",
            ValidationType::Content,
            EvaluationInput::Content(String::new()),
            Arc::new(EngineConfig::default()),
        );
        assert_eq!(
            render_message(&rule, &context, Some("missing 'b'"), Some("m")),
            "v/r on src/x.js: missing 'b' [a, b] {unknown} m"
        );

        let plain = Rule::with_operator("plain", crate::patterns::Operator::MustContain, BTreeMap::new());
        assert_eq!(render_message(&plain, &context, None, None), "plain: check failed");
    }
}
