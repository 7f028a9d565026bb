//! Operator registry: the fixed catalog of built-in matching primitives
//!
//! Architectural Principle: Service Layer - Operators are pure functions behind a closed dispatch table
//! - `Operator` names are resolved while rule documents load, so typos never reach a run
//! - Each operator turns (input, rule parameters) into an `OperatorOutcome`
//! - Parameter problems are reported as `RuleError`s and isolated to the one rule

pub mod discovery;
pub mod path_filter;

use crate::analyzer::context::EvaluationContext;
use crate::config::{Rule, ValidationType};
use regex::{Regex, RegexBuilder};
use std::fmt;

pub use discovery::TargetDiscovery;
pub use path_filter::ApplicabilityResolver;

/// Built-in operators, addressed by their camelCase name in rule documents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    /// `value` must occur in the input
    MustContain,
    /// `value` must not occur in the input
    MustNotContain,
    /// `pattern` must match somewhere in the input
    MatchesRegex,
    /// `pattern` must not match anywhere in the input
    NotMatchesRegex,
    /// every entry of `values` must occur
    ContainsAll,
    /// at least one entry of `values` must occur
    ContainsAny,
    /// every glob in `files` must match an entry of the directory listing
    FileExists,
    /// the target's extension must be one of `extensions`
    ExtensionIn,
    /// the target's file name must match `pattern`
    FilenameMatches,
    /// the input's line count must be within `min`..=`max`
    LineCount,
}

impl Operator {
    pub const ALL: [Operator; 10] = [
        Self::MustContain,
        Self::MustNotContain,
        Self::MatchesRegex,
        Self::NotMatchesRegex,
        Self::ContainsAll,
        Self::ContainsAny,
        Self::FileExists,
        Self::ExtensionIn,
        Self::FilenameMatches,
        Self::LineCount,
    ];

    /// Look up an operator by its document name
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.name() == name)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::MustContain => "mustContain",
            Self::MustNotContain => "mustNotContain",
            Self::MatchesRegex => "matchesRegex",
            Self::NotMatchesRegex => "notMatchesRegex",
            Self::ContainsAll => "containsAll",
            Self::ContainsAny => "containsAny",
            Self::FileExists => "fileExists",
            Self::ExtensionIn => "extensionIn",
            Self::FilenameMatches => "filenameMatches",
            Self::LineCount => "lineCount",
        }
    }

    /// Whether the operator can run against inputs of this validator type
    pub fn supports(self, validation_type: ValidationType) -> bool {
        match self {
            Self::FileExists => validation_type == ValidationType::Structure,
            Self::LineCount => validation_type == ValidationType::Content,
            _ => true,
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Self::MustContain => "input must contain `value`",
            Self::MustNotContain => "input must not contain `value`",
            Self::MatchesRegex => "input must match regex `pattern`",
            Self::NotMatchesRegex => "input must not match regex `pattern`",
            Self::ContainsAll => "input must contain every string in `values`",
            Self::ContainsAny => "input must contain at least one string in `values`",
            Self::FileExists => "directory must contain entries matching every glob in `files`",
            Self::ExtensionIn => "file extension must be listed in `extensions`",
            Self::FilenameMatches => "file name must match regex `pattern`",
            Self::LineCount => "line count must lie within `min`..=`max`",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Rule-local failure to evaluate; becomes an internal-error violation
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RuleError {
    #[error("missing required parameter '{name}'")]
    MissingParam { name: String },

    #[error("invalid parameter '{name}': {reason}")]
    InvalidParam { name: String, reason: String },

    #[error("invalid regex '{pattern}': {reason}")]
    InvalidRegex { pattern: String, reason: String },

    #[error("operator '{operator}' requires {expected}")]
    UnsupportedInput {
        operator: &'static str,
        expected: &'static str,
    },
}

impl RuleError {
    pub fn missing(name: impl Into<String>) -> Self {
        Self::MissingParam { name: name.into() }
    }

    pub fn invalid(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidParam {
            name: name.into(),
            reason: reason.into(),
        }
    }
}

/// Result of one operator invocation
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OperatorOutcome {
    pub passed: bool,
    /// Explanation of the failure, used when the rule has no message template
    pub message: Option<String>,
    /// First offending line (1-indexed)
    pub line: Option<u32>,
    /// Offending excerpt
    pub matched: Option<String>,
}

impl OperatorOutcome {
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

    pub fn at(mut self, line: u32, matched: impl Into<String>) -> Self {
        self.line = Some(line);
        self.matched = Some(matched.into());
        self
    }
}

/// Stateless dispatcher over [`Operator`]
#[derive(Debug, Default, Clone, Copy)]
pub struct OperatorRegistry;

impl OperatorRegistry {
    pub fn new() -> Self {
        Self
    }

    /// All operators the registry can dispatch to
    pub fn operators(&self) -> &'static [Operator] {
        &Operator::ALL
    }

    /// Run `operator` against `content`
    pub fn invoke(
        &self,
        operator: Operator,
        content: &str,
        rule: &Rule,
        context: &EvaluationContext,
    ) -> Result<OperatorOutcome, RuleError> {
        tracing::debug!(
            "Invoking operator '{}' for rule '{}' on '{}'",
            operator,
            rule.id,
            context.display_path()
        );

        match operator {
            Operator::MustContain => {
                let value = rule.str_param("value")?;
                if content.contains(value) {
                    Ok(OperatorOutcome::pass())
                } else {
                    Ok(OperatorOutcome::fail(format!("missing required text '{value}'")))
                }
            }
            Operator::MustNotContain => {
                let value = rule.str_param("value")?;
                match content.find(value) {
                    Some(offset) => Ok(OperatorOutcome::fail(format!("forbidden text '{value}' found"))
                        .at(line_of(content, offset), value)),
                    None => Ok(OperatorOutcome::pass()),
                }
            }
            Operator::MatchesRegex => {
                let regex = compile(rule.str_param("pattern")?, rule.bool_param("caseInsensitive")?)?;
                if regex.is_match(content) {
                    Ok(OperatorOutcome::pass())
                } else {
                    Ok(OperatorOutcome::fail(format!("no match for pattern '{}'", regex.as_str())))
                }
            }
            Operator::NotMatchesRegex => {
                let regex = compile(rule.str_param("pattern")?, rule.bool_param("caseInsensitive")?)?;
                match regex.find(content) {
                    Some(found) => Ok(OperatorOutcome::fail(format!(
                        "forbidden pattern matched '{}'",
                        found.as_str()
                    ))
                    .at(line_of(content, found.start()), found.as_str())),
                    None => Ok(OperatorOutcome::pass()),
                }
            }
            Operator::ContainsAll => {
                let values = rule.list_param("values")?;
                let missing: Vec<_> = values.iter().filter(|v| !content.contains(v.as_str())).collect();
                if missing.is_empty() {
                    Ok(OperatorOutcome::pass())
                } else {
                    Ok(OperatorOutcome::fail(format!(
                        "missing required text: {}",
                        join_quoted(missing.iter().map(|s| s.as_str()))
                    )))
                }
            }
            Operator::ContainsAny => {
                let values = rule.list_param("values")?;
                if values.iter().any(|v| content.contains(v.as_str())) {
                    Ok(OperatorOutcome::pass())
                } else {
                    Ok(OperatorOutcome::fail(format!(
                        "none of {} found",
                        join_quoted(values.iter().map(|s| s.as_str()))
                    )))
                }
            }
            Operator::FileExists => {
                let listing = context.input.as_directory().ok_or(RuleError::UnsupportedInput {
                    operator: "fileExists",
                    expected: "a directory listing",
                })?;
                let wanted = match rule.param("files") {
                    Some(_) => rule.list_param("files")?,
                    None => vec![rule.str_param("file")?.to_string()],
                };
                let mut missing = Vec::new();
                for name in &wanted {
                    let pattern = glob::Pattern::new(name)
                        .map_err(|e| RuleError::invalid("files", format!("'{name}': {e}")))?;
                    if !listing.names().any(|entry| pattern.matches(entry)) {
                        missing.push(name.as_str());
                    }
                }
                if missing.is_empty() {
                    Ok(OperatorOutcome::pass())
                } else {
                    Ok(OperatorOutcome::fail(format!(
                        "missing required entries: {}",
                        join_quoted(missing.into_iter())
                    )))
                }
            }
            Operator::ExtensionIn => {
                let allowed: Vec<String> = rule
                    .list_param("extensions")?
                    .iter()
                    .map(|e| e.trim_start_matches('.').to_lowercase())
                    .collect();
                let extension = context
                    .file_path
                    .extension()
                    .and_then(|e| e.to_str())
                    .map(str::to_lowercase)
                    .unwrap_or_default();
                if allowed.contains(&extension) {
                    Ok(OperatorOutcome::pass())
                } else {
                    let mut outcome = OperatorOutcome::fail(format!(
                        "extension '.{}' is not one of {}",
                        extension,
                        join_quoted(allowed.iter().map(|s| s.as_str()))
                    ));
                    outcome.matched = Some(context.file_name().to_string());
                    Ok(outcome)
                }
            }
            Operator::FilenameMatches => {
                let regex = compile(rule.str_param("pattern")?, rule.bool_param("caseInsensitive")?)?;
                let name = context.file_name();
                if regex.is_match(name) {
                    Ok(OperatorOutcome::pass())
                } else {
                    let mut outcome = OperatorOutcome::fail(format!(
                        "file name '{}' does not match '{}'",
                        name,
                        regex.as_str()
                    ));
                    outcome.matched = Some(name.to_string());
                    Ok(outcome)
                }
            }
            Operator::LineCount => {
                let min = rule.u64_param("min")?;
                let max = rule.u64_param("max")?;
                let bounds = match (min, max) {
                    (Some(lo), Some(hi)) => format!("between {lo} and {hi}"),
                    (Some(lo), None) => format!("at least {lo}"),
                    (None, Some(hi)) => format!("at most {hi}"),
                    (None, None) => return Err(RuleError::missing("min/max")),
                };
                let count = content.lines().count() as u64;
                let too_few = min.is_some_and(|m| count < m);
                let too_many = max.is_some_and(|m| count > m);
                if too_few || too_many {
                    Ok(OperatorOutcome::fail(format!("has {count} lines, expected {bounds}")))
                } else {
                    Ok(OperatorOutcome::pass())
                }
            }
        }
    }
}

fn compile(pattern: &str, case_insensitive: bool) -> Result<Regex, RuleError> {
    RegexBuilder::new(pattern)
        .case_insensitive(case_insensitive)
        .build()
        .map_err(|e| RuleError::InvalidRegex {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })
}

/// 1-indexed line containing byte `offset`
pub(crate) fn line_of(content: &str, offset: usize) -> u32 {
    content[..offset].matches('\n').count() as u32 + 1
}

fn join_quoted<'a>(items: impl Iterator<Item = &'a str>) -> String {
    items.map(|s| format!("'{s}'")).collect::<Vec<_>>().join(", ")
}
