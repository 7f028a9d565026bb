//! Bundled reference plugins

use super::{Plugin, PluginError, PluginOutcome, PluginRegistry};
use crate::analyzer::context::EvaluationContext;
use crate::config::{PluginSettings, Rule};
use crate::patterns::line_of;
use regex::Regex;
use std::sync::Arc;

pub const NAMING_CONVENTION: &str = "naming-convention";
pub const IMPORT_DEPTH: &str = "import-depth";

pub(super) fn register_all(registry: &mut PluginRegistry) {
    registry.register(NAMING_CONVENTION, |settings, config| {
        let style = settings
            .settings
            .get("style")
            .or_else(|| config.setting("namingStyle"))
            .and_then(|v| v.as_str())
            .unwrap_or("kebab-case");
        let style = NamingStyle::parse(style)
            .ok_or_else(|| PluginError::Init(format!("unknown naming style '{style}'")))?;
        Ok(Arc::new(NamingConventionPlugin::new(style)) as Arc<dyn Plugin>)
    });

    registry.register(IMPORT_DEPTH, |settings, _config| {
        let max_depth = max_depth_setting(settings)?;
        Ok(Arc::new(ImportDepthPlugin::new(max_depth)?) as Arc<dyn Plugin>)
    });
}

fn max_depth_setting(settings: &PluginSettings) -> Result<u64, PluginError> {
    match settings.settings.get("maxDepth") {
        None => Ok(ImportDepthPlugin::DEFAULT_MAX_DEPTH),
        Some(value) => value
            .as_u64()
            .ok_or_else(|| PluginError::Init(format!("maxDepth must be a non-negative integer, got {value}"))),
    }
}

/// Case conventions understood by [`NamingConventionPlugin`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NamingStyle {
    KebabCase,
    SnakeCase,
    CamelCase,
    PascalCase,
    ScreamingSnakeCase,
}

impl NamingStyle {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "kebab-case" | "kebab" => Some(Self::KebabCase),
            "snake_case" | "snake" => Some(Self::SnakeCase),
            "camelCase" | "camel" => Some(Self::CamelCase),
            "PascalCase" | "pascal" => Some(Self::PascalCase),
            "SCREAMING_SNAKE_CASE" | "screaming-snake" => Some(Self::ScreamingSnakeCase),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::KebabCase => "kebab-case",
            Self::SnakeCase => "snake_case",
            Self::CamelCase => "camelCase",
            Self::PascalCase => "PascalCase",
            Self::ScreamingSnakeCase => "SCREAMING_SNAKE_CASE",
        }
    }

    /// A stem follows the style when rewriting it in that style is a no-op
    pub fn matches(self, stem: &str) -> bool {
        !stem.is_empty()
            && stem.chars().all(|c| c.is_alphanumeric() || c == '-' || c == '_')
            && self.convert(stem) == stem
    }

    /// Rewrite `stem` in this style
    pub fn convert(self, stem: &str) -> String {
        let words = split_words(stem);
        match self {
            Self::KebabCase => words.join("-"),
            Self::SnakeCase => words.join("_"),
            Self::ScreamingSnakeCase => words.join("_").to_uppercase(),
            Self::CamelCase => words
                .iter()
                .enumerate()
                .map(|(i, w)| if i == 0 { w.clone() } else { capitalize(w) })
                .collect(),
            Self::PascalCase => words.iter().map(|w| capitalize(w)).collect(),
        }
    }
}

/// Lowercase words of an identifier, split on separators and case changes
fn split_words(name: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut prev_lower = false;

    for ch in name.chars() {
        if ch == '-' || ch == '_' || ch == ' ' {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            prev_lower = false;
            continue;
        }
        if ch.is_uppercase() && prev_lower && !current.is_empty() {
            words.push(std::mem::take(&mut current));
        }
        prev_lower = ch.is_lowercase() || ch.is_ascii_digit();
        current.extend(ch.to_lowercase());
    }
    if !current.is_empty() {
        words.push(current);
    }
    words
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Checks that a target's name follows a case convention.
///
/// Only the part before the first `.` is checked, so `button.test.js` is
/// judged by `button`. A rule-level `style` parameter overrides the
/// manifest default.
#[derive(Debug, Clone)]
pub struct NamingConventionPlugin {
    default_style: NamingStyle,
}

impl NamingConventionPlugin {
    pub fn new(default_style: NamingStyle) -> Self {
        Self { default_style }
    }
}

impl Plugin for NamingConventionPlugin {
    fn name(&self) -> &str {
        NAMING_CONVENTION
    }

    fn evaluate(&self, _content: &str, rule: &Rule, context: &EvaluationContext) -> Result<PluginOutcome, PluginError> {
        let style = match rule.param("style") {
            Some(_) => {
                let name = rule.str_param("style")?;
                NamingStyle::parse(name).ok_or_else(|| PluginError::Failed(format!("unknown naming style '{name}'")))?
            }
            None => self.default_style,
        };

        let file_name = context.file_name();
        let stem = file_name.split('.').next().unwrap_or(file_name);
        if stem.is_empty() || style.matches(stem) {
            return Ok(PluginOutcome::pass());
        }

        let suggestion = format!("{}{}", style.convert(stem), &file_name[stem.len()..]);
        let mut outcome = PluginOutcome::fail(format!("'{}' is not {}", file_name, style.as_str()))
            .with_suggestion(format!("rename to '{suggestion}'"));
        outcome.matched = Some(file_name.to_string());
        outcome
            .metadata
            .insert("style".to_string(), serde_json::Value::from(style.as_str()));

        // Leading digits or all-caps acronyms make the expected split ambiguous
        if stem.chars().next().is_some_and(|c| c.is_ascii_digit()) || stem.chars().all(|c| !c.is_lowercase()) {
            outcome.confidence = Some(0.6);
        }
        Ok(outcome)
    }
}

/// Flags relative imports that climb too many directories.
///
/// Reads `import ... from '...'`, `import '...'`, `import('...')` and
/// `require('...')` specifiers. Dynamic forms are reported with reduced
/// confidence.
#[derive(Debug, Clone)]
pub struct ImportDepthPlugin {
    default_max_depth: u64,
    import_pattern: Regex,
}

impl ImportDepthPlugin {
    pub const DEFAULT_MAX_DEPTH: u64 = 2;

    pub fn new(default_max_depth: u64) -> Result<Self, PluginError> {
        let import_pattern =
            Regex::new(r#"(?m)(?:\bfrom\s*|^\s*import\s*|\b(import|require)\s*\(\s*)['"]([^'"]+)['"]"#)
                .map_err(|e| PluginError::Init(e.to_string()))?;
        Ok(Self {
            default_max_depth,
            import_pattern,
        })
    }
}

fn climb_depth(specifier: &str) -> u64 {
    let mut depth = 0;
    let mut rest = specifier.strip_prefix("./").unwrap_or(specifier);
    while let Some(next) = rest.strip_prefix("../") {
        depth += 1;
        rest = next;
    }
    if rest == ".." {
        depth += 1;
    }
    depth
}

impl Plugin for ImportDepthPlugin {
    fn name(&self) -> &str {
        IMPORT_DEPTH
    }

    fn evaluate(&self, content: &str, rule: &Rule, _context: &EvaluationContext) -> Result<PluginOutcome, PluginError> {
        let max_depth = rule.u64_param("maxDepth")?.unwrap_or(self.default_max_depth);

        let offenders: Vec<_> = self
            .import_pattern
            .captures_iter(content)
            .filter_map(|caps| {
                let specifier = caps.get(2)?;
                let depth = climb_depth(specifier.as_str());
                (depth > max_depth).then(|| (specifier, depth, caps.get(1).is_some()))
            })
            .collect();

        let Some(&(first, depth, dynamic)) = offenders.first() else {
            return Ok(PluginOutcome::pass());
        };

        let mut outcome = PluginOutcome::fail(format!(
            "import '{}' climbs {} directories (max {})",
            first.as_str(),
            depth,
            max_depth
        ))
        .at(line_of(content, first.start()), first.as_str())
        .with_suggestion("import through a path alias or a closer index module");

        for &(other, other_depth, _) in offenders.iter().skip(1) {
            outcome = outcome.with_warning(format!(
                "line {}: '{}' climbs {} directories",
                line_of(content, other.start()),
                other.as_str(),
                other_depth
            ));
        }
        if dynamic {
            outcome.confidence = Some(0.75);
        }
        outcome
            .metadata
            .insert("offending_imports".to_string(), serde_json::Value::from(offenders.len()));
        Ok(outcome)
    }
}
