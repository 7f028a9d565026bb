//! Rule definition store: validator and profile documents
//!
//! Architecture: Anti-Corruption Layer - Configuration translates external YAML/JSON documents
//! - Raw documents are converted to typed `ValidatorDefinition`/`ProfileDefinition` values
//! - Every consistency check runs at load time so a run never meets a malformed rule
//! - The resulting `RuleSet` acts as a read-only repository for one run

pub mod engine;

use crate::domain::violations::{Severity, WardenError, WardenResult};
use crate::patterns::{Operator, RuleError};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

pub use engine::{EngineConfig, PluginSettings, DEFAULT_CONFIG_FILES};

/// What a validator's rules are evaluated against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationType {
    /// File content
    #[serde(alias = "Content")]
    Content,
    /// Directory listing
    #[serde(alias = "Structure")]
    Structure,
    /// File name only
    #[serde(alias = "Naming")]
    Naming,
}

impl ValidationType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Content => "content",
            Self::Structure => "structure",
            Self::Naming => "naming",
        }
    }
}

/// What evaluates a rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleTarget {
    Operator(Operator),
    Plugin(String),
}

impl RuleTarget {
    pub fn name(&self) -> &str {
        match self {
            Self::Operator(op) => op.name(),
            Self::Plugin(name) => name,
        }
    }
}

/// A single check within a validator
#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
    /// Unique within the owning validator
    pub id: String,
    pub target: RuleTarget,
    /// Operator- or plugin-specific parameters
    pub params: BTreeMap<String, serde_json::Value>,
    /// Failure message template
    pub message: Option<String>,
    pub severity: Option<Severity>,
    pub confidence: Option<f64>,
    pub suggestion: Option<String>,
}

impl Rule {
    pub fn with_operator(
        id: impl Into<String>,
        operator: Operator,
        params: BTreeMap<String, serde_json::Value>,
    ) -> Self {
        Self::new(id, RuleTarget::Operator(operator), params)
    }

    pub fn with_plugin(
        id: impl Into<String>,
        plugin: impl Into<String>,
        params: BTreeMap<String, serde_json::Value>,
    ) -> Self {
        Self::new(id, RuleTarget::Plugin(plugin.into()), params)
    }

    fn new(id: impl Into<String>, target: RuleTarget, params: BTreeMap<String, serde_json::Value>) -> Self {
        Self {
            id: id.into(),
            target,
            params,
            message: None,
            severity: None,
            confidence: None,
            suggestion: None,
        }
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn severity(mut self, severity: Severity) -> Self {
        self.severity = Some(severity);
        self
    }

    pub fn confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }

    pub fn suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    pub fn param(&self, name: &str) -> Option<&serde_json::Value> {
        self.params.get(name)
    }

    /// Required string parameter
    pub fn str_param(&self, name: &str) -> Result<&str, RuleError> {
        match self.params.get(name) {
            Some(serde_json::Value::String(s)) => Ok(s),
            Some(other) => Err(RuleError::invalid(name, format!("expected a string, got {other}"))),
            None => Err(RuleError::missing(name)),
        }
    }

    /// Required list of strings; a single string is accepted as a one-element list
    pub fn list_param(&self, name: &str) -> Result<Vec<String>, RuleError> {
        match self.params.get(name) {
            Some(serde_json::Value::String(s)) => Ok(vec![s.clone()]),
            Some(serde_json::Value::Array(items)) => items
                .iter()
                .map(|item| match item {
                    serde_json::Value::String(s) => Ok(s.clone()),
                    other => Err(RuleError::invalid(name, format!("expected strings, got {other}"))),
                })
                .collect(),
            Some(other) => Err(RuleError::invalid(name, format!("expected a list, got {other}"))),
            None => Err(RuleError::missing(name)),
        }
    }

    /// Optional non-negative integer parameter
    pub fn u64_param(&self, name: &str) -> Result<Option<u64>, RuleError> {
        match self.params.get(name) {
            None | Some(serde_json::Value::Null) => Ok(None),
            Some(value) => value
                .as_u64()
                .map(Some)
                .ok_or_else(|| RuleError::invalid(name, format!("expected a non-negative integer, got {value}"))),
        }
    }

    /// Optional boolean parameter, `false` when absent
    pub fn bool_param(&self, name: &str) -> Result<bool, RuleError> {
        match self.params.get(name) {
            None | Some(serde_json::Value::Null) => Ok(false),
            Some(serde_json::Value::Bool(b)) => Ok(*b),
            Some(other) => Err(RuleError::invalid(name, format!("expected a boolean, got {other}"))),
        }
    }
}

/// A named bundle of rules scoped by a file pattern
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatorDefinition {
    pub name: String,
    pub description: String,
    pub validation_type: ValidationType,
    /// Regular expression over run-root-relative paths
    pub file_pattern: String,
    pub rules: Vec<Rule>,
    /// Default severity for rules that do not set one
    pub severity: Option<Severity>,
    /// Default confidence for rules that do not set one
    pub confidence: Option<f64>,
    pub enabled: bool,
}

impl ValidatorDefinition {
    pub fn new(name: impl Into<String>, validation_type: ValidationType, file_pattern: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            validation_type,
            file_pattern: file_pattern.into(),
            rules: Vec::new(),
            severity: None,
            confidence: None,
            enabled: true,
        }
    }

    pub fn with_rule(mut self, rule: Rule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn rule(&self, id: &str) -> Option<&Rule> {
        self.rules.iter().find(|r| r.id == id)
    }

    /// Names of all plugins referenced by this validator's rules
    pub fn plugins(&self) -> impl Iterator<Item = &str> {
        self.rules.iter().filter_map(|r| match &r.target {
            RuleTarget::Plugin(name) => Some(name.as_str()),
            RuleTarget::Operator(_) => None,
        })
    }

    /// Check the definition's own invariants
    pub fn validate(&self) -> WardenResult<()> {
        if self.name.trim().is_empty() {
            return Err(WardenError::config("Validator name must not be empty"));
        }

        regex::Regex::new(&self.file_pattern).map_err(|e| {
            WardenError::config(format!(
                "Invalid filePattern in validator '{}': {}",
                self.name, e
            ))
        })?;

        check_confidence(self.confidence, &format!("validator '{}'", self.name))?;

        let mut seen = HashSet::new();
        for rule in &self.rules {
            if !seen.insert(rule.id.as_str()) {
                return Err(WardenError::config(format!(
                    "Duplicate rule id '{}' in validator '{}'",
                    rule.id, self.name
                )));
            }

            check_confidence(
                rule.confidence,
                &format!("rule '{}' of validator '{}'", rule.id, self.name),
            )?;

            match &rule.target {
                RuleTarget::Operator(op) if !op.supports(self.validation_type) => {
                    return Err(WardenError::config(format!(
                        "Operator '{}' in rule '{}' cannot be used by {} validator '{}'",
                        op,
                        rule.id,
                        self.validation_type.as_str(),
                        self.name
                    )));
                }
                RuleTarget::Plugin(name) if name.trim().is_empty() => {
                    return Err(WardenError::config(format!(
                        "Empty plugin name in rule '{}' of validator '{}'",
                        rule.id, self.name
                    )));
                }
                _ => {}
            }
        }

        Ok(())
    }
}

/// An ordered bundle of validator names
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub validators: Vec<String>,
}

/// Document format of a rule source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Yaml,
    Json,
}

impl DocumentFormat {
    /// Infer from a file extension; anything but `.json` is read as YAML
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => Self::Json,
            _ => Self::Yaml,
        }
    }
}

/// Where validator and profile documents come from
#[derive(Debug, Clone)]
pub enum RuleSource {
    File(PathBuf),
    Inline {
        label: String,
        format: DocumentFormat,
        content: String,
    },
}

impl RuleSource {
    pub fn file<P: Into<PathBuf>>(path: P) -> Self {
        Self::File(path.into())
    }

    pub fn yaml(label: impl Into<String>, content: impl Into<String>) -> Self {
        Self::Inline {
            label: label.into(),
            format: DocumentFormat::Yaml,
            content: content.into(),
        }
    }

    pub fn json(label: impl Into<String>, content: impl Into<String>) -> Self {
        Self::Inline {
            label: label.into(),
            format: DocumentFormat::Json,
            content: content.into(),
        }
    }

    fn label(&self) -> String {
        match self {
            Self::File(path) => path.display().to_string(),
            Self::Inline { label, .. } => label.clone(),
        }
    }

    /// Parse into untyped documents
    fn documents(&self) -> WardenResult<Vec<serde_json::Value>> {
        let (format, content) = match self {
            Self::File(path) => {
                let content = fs::read_to_string(path).map_err(|e| {
                    WardenError::config(format!("Failed to read rule file '{}': {}", path.display(), e))
                })?;
                (DocumentFormat::from_path(path), content)
            }
            Self::Inline { format, content, .. } => (*format, content.clone()),
        };

        let label = self.label();
        let documents = match format {
            DocumentFormat::Yaml => {
                let mut documents = Vec::new();
                for document in serde_yaml::Deserializer::from_str(&content) {
                    let value = serde_json::Value::deserialize(document).map_err(|e| {
                        WardenError::config(format!("Failed to parse '{label}': {e}"))
                    })?;
                    documents.push(value);
                }
                documents
            }
            DocumentFormat::Json => {
                match serde_json::from_str::<serde_json::Value>(&content)
                    .map_err(|e| WardenError::config(format!("Failed to parse '{label}': {e}")))?
                {
                    serde_json::Value::Array(items) => items,
                    single => vec![single],
                }
            }
        };

        Ok(documents.into_iter().filter(|d| !d.is_null()).collect())
    }
}

/// Validator document as written on disk
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawValidator {
    name: Option<String>,
    #[serde(default)]
    description: String,
    #[serde(rename = "type")]
    validation_type: Option<ValidationType>,
    file_pattern: Option<String>,
    rules: Vec<RawRule>,
    severity: Option<Severity>,
    confidence: Option<f64>,
    #[serde(default = "default_true")]
    enabled: bool,
}

/// Rule entry as written on disk; unknown keys become parameters
#[derive(Debug, Deserialize)]
struct RawRule {
    id: Option<String>,
    operator: Option<String>,
    plugin: Option<String>,
    message: Option<String>,
    severity: Option<Severity>,
    confidence: Option<f64>,
    suggestion: Option<String>,
    #[serde(flatten)]
    params: BTreeMap<String, serde_json::Value>,
}

impl RawValidator {
    fn into_definition(self, source: &str) -> WardenResult<ValidatorDefinition> {
        let name = self
            .name
            .filter(|n| !n.trim().is_empty())
            .ok_or_else(|| WardenError::config(format!("Validator in '{source}' is missing 'name'")))?;
        let validation_type = self.validation_type.ok_or_else(|| {
            WardenError::config(format!("Validator '{name}' in '{source}' is missing 'type'"))
        })?;
        let file_pattern = self.file_pattern.ok_or_else(|| {
            WardenError::config(format!("Validator '{name}' in '{source}' is missing 'filePattern'"))
        })?;

        let mut rules = Vec::with_capacity(self.rules.len());
        for (index, raw) in self.rules.into_iter().enumerate() {
            rules.push(raw.into_rule(&name, index)?);
        }

        Ok(ValidatorDefinition {
            name,
            description: self.description,
            validation_type,
            file_pattern,
            rules,
            severity: self.severity,
            confidence: self.confidence,
            enabled: self.enabled,
        })
    }
}

impl RawRule {
    fn into_rule(self, validator: &str, index: usize) -> WardenResult<Rule> {
        let target = match (self.operator, self.plugin) {
            (Some(_), Some(_)) => {
                return Err(WardenError::config(format!(
                    "Rule #{} of validator '{}' sets both 'operator' and 'plugin'",
                    index + 1,
                    validator
                )))
            }
            (None, None) => {
                return Err(WardenError::config(format!(
                    "Rule #{} of validator '{}' needs exactly one of 'operator' or 'plugin'",
                    index + 1,
                    validator
                )))
            }
            (Some(operator), None) => match Operator::from_name(&operator) {
                Some(op) => RuleTarget::Operator(op),
                None => {
                    let rule_id = self.id.unwrap_or_else(|| format!("{}#{}", operator, index + 1));
                    return Err(WardenError::operator(validator, rule_id, operator));
                }
            },
            (None, Some(plugin)) => RuleTarget::Plugin(plugin),
        };

        let id = self
            .id
            .unwrap_or_else(|| format!("{}#{}", target.name(), index + 1));

        // An explicit `params:` block merges with inline keys
        let mut params = self.params;
        if let Some(serde_json::Value::Object(nested)) = params.remove("params") {
            for (key, value) in nested {
                params.entry(key).or_insert(value);
            }
        }

        Ok(Rule {
            id,
            target,
            params,
            message: self.message,
            severity: self.severity,
            confidence: self.confidence,
            suggestion: self.suggestion,
        })
    }
}

/// Validators and profiles loaded for one run
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    validators: Vec<ValidatorDefinition>,
    profiles: Vec<ProfileDefinition>,
    validator_index: HashMap<String, usize>,
    profile_index: HashMap<String, usize>,
}

impl RuleSet {
    /// Parse and validate every document in `sources`; the first problem aborts the load
    pub fn load(sources: &[RuleSource]) -> WardenResult<Self> {
        let mut validators = Vec::new();
        let mut profiles = Vec::new();

        for source in sources {
            let label = source.label();
            for document in source.documents()? {
                let is_object = document.is_object();
                let has_rules = document.get("rules").is_some();
                let has_validators = document.get("validators").is_some();

                match (is_object, has_rules, has_validators) {
                    (true, true, false) => {
                        let raw: RawValidator = serde_json::from_value(document).map_err(|e| {
                            WardenError::config(format!("Invalid validator in '{label}': {e}"))
                        })?;
                        validators.push(raw.into_definition(&label)?);
                    }
                    (true, false, true) => {
                        let profile: ProfileDefinition = serde_json::from_value(document).map_err(|e| {
                            WardenError::config(format!("Invalid profile in '{label}': {e}"))
                        })?;
                        profiles.push(profile);
                    }
                    _ => {
                        return Err(WardenError::config(format!(
                            "Document in '{label}' is neither a validator (has 'rules') nor a profile (has 'validators')"
                        )))
                    }
                }
            }
        }

        let rule_set = Self::from_definitions(validators, profiles)?;
        tracing::debug!(
            "Loaded {} validators and {} profiles from {} sources",
            rule_set.validators.len(),
            rule_set.profiles.len(),
            sources.len()
        );
        Ok(rule_set)
    }

    /// Load every rule document below one directory
    pub fn load_dir<P: AsRef<Path>>(dir: P) -> WardenResult<Self> {
        Self::load_paths(&[dir])
    }

    /// Load every `*.yaml`, `*.yml` and `*.json` file below each path, in sorted order
    pub fn load_paths<P: AsRef<Path>>(paths: &[P]) -> WardenResult<Self> {
        let mut sources = Vec::new();
        for path in paths {
            let path = path.as_ref();
            if path.is_file() {
                sources.push(RuleSource::file(path));
                continue;
            }
            if !path.is_dir() {
                tracing::debug!("Rule path {} does not exist, skipping", path.display());
                continue;
            }
            for entry in WalkDir::new(path)
                .sort_by_file_name()
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file())
            {
                let is_rule_file = matches!(
                    entry.path().extension().and_then(|e| e.to_str()),
                    Some("yaml" | "yml" | "json")
                );
                if is_rule_file {
                    sources.push(RuleSource::file(entry.path()));
                }
            }
        }
        Self::load(&sources)
    }

    /// Build from already-typed definitions, applying every load-time check
    pub fn from_definitions(
        validators: Vec<ValidatorDefinition>,
        profiles: Vec<ProfileDefinition>,
    ) -> WardenResult<Self> {
        let mut validator_index = HashMap::new();
        for (i, validator) in validators.iter().enumerate() {
            validator.validate()?;
            if validator_index.insert(validator.name.clone(), i).is_some() {
                return Err(WardenError::config(format!(
                    "Duplicate validator name '{}'",
                    validator.name
                )));
            }
        }

        let mut profile_index = HashMap::new();
        for (i, profile) in profiles.iter().enumerate() {
            if profile.name.trim().is_empty() {
                return Err(WardenError::config("Profile name must not be empty"));
            }
            if profile_index.insert(profile.name.clone(), i).is_some() {
                return Err(WardenError::config(format!("Duplicate profile name '{}'", profile.name)));
            }
            for name in &profile.validators {
                if !validator_index.contains_key(name) {
                    return Err(WardenError::config(format!(
                        "Profile '{}' references unknown validator '{}'",
                        profile.name, name
                    )));
                }
            }
        }

        Ok(Self {
            validators,
            profiles,
            validator_index,
            profile_index,
        })
    }

    pub fn validator(&self, name: &str) -> Option<&ValidatorDefinition> {
        self.validator_index.get(name).map(|&i| &self.validators[i])
    }

    pub fn profile(&self, name: &str) -> Option<&ProfileDefinition> {
        self.profile_index.get(name).map(|&i| &self.profiles[i])
    }

    /// Validators in load order
    pub fn validators(&self) -> &[ValidatorDefinition] {
        &self.validators
    }

    /// Profiles in load order
    pub fn profiles(&self) -> &[ProfileDefinition] {
        &self.profiles
    }

    pub fn is_empty(&self) -> bool {
        self.validators.is_empty()
    }

    /// Ordered validator names of a profile
    pub fn resolve_profile(&self, name: &str) -> WardenResult<Vec<String>> {
        let profile = self
            .profile(name)
            .ok_or_else(|| WardenError::config(format!("Unknown profile '{name}'")))?;

        for validator in &profile.validators {
            if self.validator(validator).is_none() {
                return Err(WardenError::config(format!(
                    "Profile '{}' references unknown validator '{}'",
                    profile.name, validator
                )));
            }
        }
        Ok(profile.validators.clone())
    }

    /// Combine profiles (in order) and explicit validators into one ordered,
    /// de-duplicated list. An empty selection means every enabled validator.
    pub fn resolve_selection(&self, profiles: &[String], validators: &[String]) -> WardenResult<Vec<String>> {
        if profiles.is_empty() && validators.is_empty() {
            return Ok(self
                .validators
                .iter()
                .filter(|v| v.enabled)
                .map(|v| v.name.clone())
                .collect());
        }

        let mut selected = Vec::new();
        let mut seen = HashSet::new();
        for profile in profiles {
            for name in self.resolve_profile(profile)? {
                if seen.insert(name.clone()) {
                    selected.push(name);
                }
            }
        }
        for name in validators {
            if self.validator(name).is_none() {
                return Err(WardenError::config(format!("Unknown validator '{name}'")));
            }
            if seen.insert(name.clone()) {
                selected.push(name.clone());
            }
        }
        Ok(selected)
    }

    /// Stable hash over every definition, for diagnostics
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for validator in &self.validators {
            hasher.update(validator.name.as_bytes());
            hasher.update(validator.validation_type.as_str().as_bytes());
            hasher.update(validator.file_pattern.as_bytes());
            for rule in &validator.rules {
                hasher.update(rule.id.as_bytes());
                hasher.update(rule.target.name().as_bytes());
                hasher.update(serde_json::to_string(&rule.params).unwrap_or_default().as_bytes());
                hasher.update(rule.message.as_deref().unwrap_or_default().as_bytes());
            }
        }
        for profile in &self.profiles {
            hasher.update(profile.name.as_bytes());
            hasher.update(profile.validators.join(",").as_bytes());
        }
        format!("{:x}", hasher.finalize())[..16].to_string()
    }
}

fn check_confidence(confidence: Option<f64>, owner: &str) -> WardenResult<()> {
    match confidence {
        Some(c) if !(0.0..=1.0).contains(&c) => Err(WardenError::config(format!(
            "Confidence for {owner} must be within 0.0..=1.0, got {c}"
        ))),
        _ => Ok(()),
    }
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const DEFAULT_EXPORT: &str = r#"
name: requires-default-export
description: Modules must have a default export
type: content
filePattern: '.*\.js$'
rules:
  - operator: mustContain
    value: export default
    message: "{file} has no default export"
"#;

    #[test]
    fn test_load_validator_document() {
        let rules = RuleSet::load(&[RuleSource::yaml("inline", DEFAULT_EXPORT)]).unwrap();
        let validator = rules.validator("requires-default-export").unwrap();

        assert_eq!(validator.validation_type, ValidationType::Content);
        assert_eq!(validator.rules.len(), 1);
        let rule = &validator.rules[0];
        assert_eq!(rule.id, "mustContain#1");
        assert_eq!(rule.target, RuleTarget::Operator(Operator::MustContain));
        assert_eq!(rule.str_param("value").unwrap(), "export default");
        assert!(!rule.params.contains_key("message"));
    }

    #[test]
    fn test_multi_document_yaml_with_profile() {
        let source = format!(
            "{DEFAULT_EXPORT}\n---\nname: js\nvalidators: [requires-default-export]\n"
        );
        let rules = RuleSet::load(&[RuleSource::yaml("bundle", source)]).unwrap();
        assert_eq!(rules.resolve_profile("js").unwrap(), vec!["requires-default-export"]);
    }

    #[test]
    fn test_json_array_source() {
        let json = r#"[
            {"name": "kebab", "type": "naming", "filePattern": ".*",
             "rules": [{"id": "kebab-name", "operator": "filenameMatches", "pattern": "^[a-z-.]+$"}]},
            {"name": "all", "validators": ["kebab"]}
        ]"#;
        let rules = RuleSet::load(&[RuleSource::json("inline.json", json)]).unwrap();
        assert!(rules.validator("kebab").unwrap().rule("kebab-name").is_some());
        assert!(rules.profile("all").is_some());
    }

    #[test]
    fn test_profile_with_unknown_validator_fails() {
        let source = format!("{DEFAULT_EXPORT}\n---\nname: broken\nvalidators: [requires-default-export, nope]\n");
        let err = RuleSet::load(&[RuleSource::yaml("bundle", source)]).unwrap_err();
        assert!(matches!(err, WardenError::Configuration { .. }));
        assert!(err.to_string().contains("nope"));
    }

    #[test]
    fn test_operator_and_plugin_are_exclusive() {
        let both = "name: x\ntype: content\nfilePattern: '.*'\nrules:\n  - operator: mustContain\n    plugin: p\n";
        assert!(RuleSet::load(&[RuleSource::yaml("both", both)]).is_err());

        let neither = "name: x\ntype: content\nfilePattern: '.*'\nrules:\n  - value: y\n";
        assert!(RuleSet::load(&[RuleSource::yaml("neither", neither)]).is_err());
    }

    #[test]
    fn test_unknown_operator_is_operator_error() {
        let doc = "name: x\ntype: content\nfilePattern: '.*'\nrules:\n  - operator: mustContian\n    value: y\n";
        let err = RuleSet::load(&[RuleSource::yaml("typo", doc)]).unwrap_err();
        match err {
            WardenError::Operator { operator, validator, .. } => {
                assert_eq!(operator, "mustContian");
                assert_eq!(validator, "x");
            }
            other => panic!("expected operator error, got {other}"),
        }
    }

    #[test]
    fn test_missing_required_fields() {
        for doc in [
            "type: content\nfilePattern: '.*'\nrules: []\n",
            "name: x\nfilePattern: '.*'\nrules: []\n",
            "name: x\ntype: content\nrules: []\n",
            "name: x\ntype: content\nfilePattern: '.*'\n",
        ] {
            assert!(RuleSet::load(&[RuleSource::yaml("doc", doc)]).is_err(), "accepted: {doc}");
        }
    }

    #[test]
    fn test_bad_file_pattern_rejected_at_load() {
        let doc = "name: x\ntype: content\nfilePattern: '(unclosed'\nrules: []\n";
        let err = RuleSet::load(&[RuleSource::yaml("doc", doc)]).unwrap_err();
        assert!(err.to_string().contains("filePattern"));
    }

    #[test]
    fn test_operator_type_compatibility() {
        let doc = "name: x\ntype: content\nfilePattern: '.*'\nrules:\n  - operator: fileExists\n    files: [index.js]\n";
        assert!(RuleSet::load(&[RuleSource::yaml("doc", doc)]).is_err());
    }

    #[test]
    fn test_duplicates_rejected() {
        let doc = "name: x\ntype: content\nfilePattern: '.*'\nrules: []\n---\nname: x\ntype: naming\nfilePattern: '.*'\nrules: []\n";
        assert!(RuleSet::load(&[RuleSource::yaml("doc", doc)]).is_err());

        let rule_ids = "name: x\ntype: content\nfilePattern: '.*'\nrules:\n  - id: a\n    operator: mustContain\n    value: q\n  - id: a\n    operator: mustContain\n    value: r\n";
        assert!(RuleSet::load(&[RuleSource::yaml("doc", rule_ids)]).is_err());
    }

    #[test]
    fn test_confidence_range_checked() {
        let doc = "name: x\ntype: content\nfilePattern: '.*'\nconfidence: 1.2\nrules: []\n";
        assert!(RuleSet::load(&[RuleSource::yaml("doc", doc)]).is_err());
    }

    #[test]
    fn test_nested_params_merge() {
        let doc = "name: x\ntype: content\nfilePattern: '.*'\nrules:\n  - plugin: import-depth\n    params:\n      maxDepth: 2\n";
        let rules = RuleSet::load(&[RuleSource::yaml("doc", doc)]).unwrap();
        let rule = &rules.validator("x").unwrap().rules[0];
        assert_eq!(rule.u64_param("maxDepth").unwrap(), Some(2));
        assert_eq!(rule.id, "import-depth#1");
    }

    #[test]
    fn test_resolve_selection_orders_and_dedupes() {
        let doc = "name: a\ntype: content\nfilePattern: '.*'\nrules: []\n---\nname: b\ntype: content\nfilePattern: '.*'\nrules: []\n---\nname: c\ntype: content\nfilePattern: '.*'\nenabled: false\nrules: []\n---\nname: p\nvalidators: [b, a]\n";
        let rules = RuleSet::load(&[RuleSource::yaml("doc", doc)]).unwrap();

        assert_eq!(
            rules.resolve_selection(&["p".into()], &["a".into(), "c".into()]).unwrap(),
            vec!["b", "a", "c"]
        );
        assert_eq!(rules.resolve_selection(&[], &[]).unwrap(), vec!["a", "b"]);
        assert!(rules.resolve_selection(&["missing".into()], &[]).is_err());
        assert!(rules.resolve_selection(&[], &["missing".into()]).is_err());
    }

    #[test]
    fn test_load_paths_reads_directory_in_order() {
        let temp_dir = TempDir::new().unwrap();
        let validators = temp_dir.path().join("validators");
        let profiles = temp_dir.path().join("profiles");
        fs::create_dir_all(&validators).unwrap();
        fs::create_dir_all(&profiles).unwrap();
        fs::write(validators.join("b.yaml"), "name: b\ntype: naming\nfilePattern: '.*'\nrules: []\n").unwrap();
        fs::write(validators.join("a.yml"), "name: a\ntype: naming\nfilePattern: '.*'\nrules: []\n").unwrap();
        fs::write(validators.join("notes.txt"), "ignored").unwrap();
        fs::write(profiles.join("p.json"), r#"{"name": "p", "validators": ["a", "b"]}"#).unwrap();

        let rules = RuleSet::load_paths(&[validators, profiles, temp_dir.path().join("absent")]).unwrap();
        let names: Vec<_> = rules.validators().iter().map(|v| v.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert!(rules.profile("p").is_some());
    }

    #[test]
    fn test_fingerprint_changes_with_rules() {
        let a = RuleSet::load(&[RuleSource::yaml("a", DEFAULT_EXPORT)]).unwrap();
        let b = RuleSet::load(&[RuleSource::yaml("b", DEFAULT_EXPORT.replace("export default", "module.exports"))]).unwrap();
        assert_eq!(a.fingerprint(), a.clone().fingerprint());
        assert_ne!(a.fingerprint(), b.fingerprint());
    }
}
