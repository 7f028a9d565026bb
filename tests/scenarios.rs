//! End-to-end runs of the engine over on-disk projects

use rule_warden::overrides::{OverrideRecord, OverrideStore};
use rule_warden::{
    Engine, EngineConfig, EngineOptions, EvaluationContext, OverrideStatus, Plugin, PluginError,
    PluginOutcome, PluginRegistry, PluginSettings, Rule, RuleSet, RuleSource, RunSummary, ViolationKind,
};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tempfile::TempDir;

const DEFAULT_EXPORT: &str = r#"
name: requires-default-export
type: content
filePattern: '.*\.js$'
rules:
  - id: default-export
    operator: mustContain
    value: "export default"
"#;

struct FixedConfidence(f64);

impl Plugin for FixedConfidence {
    fn name(&self) -> &str {
        "fixed-confidence"
    }

    fn evaluate(&self, _: &str, _: &Rule, _: &EvaluationContext) -> Result<PluginOutcome, PluginError> {
        Ok(PluginOutcome::fail("looks suspicious").with_confidence(self.0))
    }
}

struct Exploding;

impl Plugin for Exploding {
    fn name(&self) -> &str {
        "exploding"
    }

    fn evaluate(&self, content: &str, _: &Rule, _: &EvaluationContext) -> Result<PluginOutcome, PluginError> {
        if content.contains("boom") {
            panic!("plugin blew up");
        }
        Err(PluginError::Failed("cannot parse input".into()))
    }
}

fn project(files: &[(&str, &str)]) -> TempDir {
    let dir = TempDir::new().unwrap();
    for (name, content) in files {
        let path = dir.path().join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }
    dir
}

fn rules(documents: &str) -> RuleSet {
    RuleSet::load(&[RuleSource::yaml("test.yaml", documents)]).unwrap()
}

fn engine(root: &Path, min_confidence: f64, parallel: bool) -> Engine {
    let mut registry = PluginRegistry::with_builtins();
    registry
        .register_instance(Arc::new(FixedConfidence(0.4)))
        .register_instance(Arc::new(Exploding));
    let options = EngineOptions {
        min_confidence,
        parallel,
        ..EngineOptions::from_config(&EngineConfig::default(), root)
    };
    Engine::new(EngineConfig::default(), registry, options)
}

fn run(root: &Path, rule_set: &RuleSet, validators: &[&str], files: &[&str]) -> RunSummary {
    let validators: Vec<String> = validators.iter().map(|v| v.to_string()).collect();
    engine(root, 0.0, true).evaluate(rule_set, &validators, files).unwrap()
}

#[test]
fn missing_default_export_fails() {
    let dir = project(&[("src/index.js", "module.exports = {};\n")]);
    let summary = run(dir.path(), &rules(DEFAULT_EXPORT), &["requires-default-export"], &["src/index.js"]);

    let result = summary
        .result_for(Path::new("src/index.js"), "requires-default-export")
        .unwrap();
    assert!(!result.passed);
    assert_eq!(result.violations.len(), 1);
    assert_eq!(result.violations[0].rule_id, "default-export");
    assert_eq!(result.violations[0].kind, ViolationKind::Rule);
    assert_eq!(summary.failed, 1);
}

#[test]
fn present_default_export_passes() {
    let dir = project(&[("src/index.js", "const X = 1;\nexport default X;\n")]);
    let summary = run(dir.path(), &rules(DEFAULT_EXPORT), &["requires-default-export"], &["src/index.js"]);

    let result = summary
        .result_for(Path::new("src/index.js"), "requires-default-export")
        .unwrap();
    assert!(result.passed);
    assert!(result.violations.is_empty());
    assert!(!summary.has_failures());
}

#[test]
fn profile_with_unknown_validator_is_rejected_at_load() {
    let documents = format!(
        "{DEFAULT_EXPORT}\n---\nname: frontend\nvalidators: [requires-default-export, no-such-validator]\n"
    );
    let err = RuleSet::load(&[RuleSource::yaml("test.yaml", documents)]).unwrap_err();
    assert!(err.is_fatal());
    assert!(err.to_string().contains("no-such-validator"));
}

#[test]
fn unresolved_plugin_does_not_stop_other_rules() {
    let documents = r#"
name: mixed
type: content
filePattern: '\.js$'
rules:
  - id: external
    plugin: not-installed
  - id: default-export
    operator: mustContain
    value: "export default"
"#;
    let dir = project(&[("a.js", "module.exports = 1;\n"), ("b.js", "export default 1;\n")]);
    let summary = run(dir.path(), &rules(documents), &["mixed"], &["a.js", "b.js"]);

    let a = summary.result_for(Path::new("a.js"), "mixed").unwrap();
    let kinds: Vec<_> = a.violations.iter().map(|v| (v.rule_id.as_str(), v.kind)).collect();
    assert_eq!(
        kinds,
        vec![("external", ViolationKind::PluginResolution), ("default-export", ViolationKind::Rule)]
    );

    let b = summary.result_for(Path::new("b.js"), "mixed").unwrap();
    assert_eq!(b.violations.len(), 1);
    assert_eq!(b.violations[0].kind, ViolationKind::PluginResolution);
    assert_eq!(summary.internal_errors, 2);
}

#[test]
fn non_applicable_pairs_are_absent() {
    let dir = project(&[("src/index.js", "export default 1;\n"), ("README.md", "# readme\n")]);
    let summary = run(
        dir.path(),
        &rules(DEFAULT_EXPORT),
        &["requires-default-export"],
        &["src/index.js", "README.md"],
    );

    assert_eq!(summary.total_files, 2);
    assert_eq!(summary.evaluations, 1);
    assert!(summary.result_for(Path::new("README.md"), "requires-default-export").is_none());
}

#[test]
fn repeated_runs_serialize_identically() {
    let documents = format!(
        "{DEFAULT_EXPORT}\n---\nname: naming\ntype: naming\nfilePattern: '\\.js$'\nrules:\n  - plugin: naming-convention\n"
    );
    let files: Vec<String> = (0..12).map(|i| format!("src/File{i}.js")).collect();
    let fixtures: Vec<(&str, &str)> = files.iter().map(|f| (f.as_str(), "module.exports = 1;\n")).collect();
    let dir = project(&fixtures);
    let rule_set = rules(&documents);
    let validators = vec!["requires-default-export".to_string(), "naming".to_string()];

    let first = engine(dir.path(), 0.0, true).evaluate(&rule_set, &validators, &files).unwrap();
    let second = engine(dir.path(), 0.0, true).evaluate(&rule_set, &validators, &files).unwrap();
    let sequential = engine(dir.path(), 0.0, false).evaluate(&rule_set, &validators, &files).unwrap();

    let json = serde_json::to_string(&first).unwrap();
    assert_eq!(json, serde_json::to_string(&second).unwrap());
    assert_eq!(json, serde_json::to_string(&sequential).unwrap());
    assert_eq!(first.evaluations, 24);
}

#[test]
fn plugin_panics_and_errors_are_isolated() {
    let documents = r#"
name: fragile
type: content
filePattern: '\.js$'
rules:
  - id: explode
    plugin: exploding
  - id: default-export
    operator: mustContain
    value: "export default"
"#;
    let dir = project(&[("boom.js", "boom\n"), ("quiet.js", "export default 1;\n")]);
    let summary = run(dir.path(), &rules(documents), &["fragile"], &["boom.js", "quiet.js"]);

    let boom = summary.result_for(Path::new("boom.js"), "fragile").unwrap();
    assert_eq!(boom.violations[0].kind, ViolationKind::PluginExecution);
    assert!(boom.violations[0].message.contains("plugin blew up"));
    assert_eq!(boom.violations[1].rule_id, "default-export");

    let quiet = summary.result_for(Path::new("quiet.js"), "fragile").unwrap();
    assert_eq!(quiet.violations.len(), 1);
    assert!(quiet.violations[0].message.contains("cannot parse input"));

    assert!(summary.violations().all(|v| (0.0..=1.0).contains(&v.confidence)));
}

#[test]
fn failing_validator_leaves_neighbours_untouched() {
    let fragile = r#"
name: fragile
type: content
filePattern: '\.js$'
rules:
  - id: explode
    plugin: exploding
"#;
    let documents = format!("{fragile}\n---\n{DEFAULT_EXPORT}");
    let dir = project(&[("boom.js", "boom\n")]);
    let rule_set = rules(&documents);

    let together = run(dir.path(), &rule_set, &["fragile", "requires-default-export"], &["boom.js"]);
    let alone = run(dir.path(), &rule_set, &["requires-default-export"], &["boom.js"]);

    let failed = together.result_for(Path::new("boom.js"), "fragile").unwrap();
    assert_eq!(failed.violations[0].kind, ViolationKind::PluginExecution);
    assert_eq!(
        together.result_for(Path::new("boom.js"), "requires-default-export"),
        alone.result_for(Path::new("boom.js"), "requires-default-export")
    );
}

#[test]
fn hanging_plugin_initialization_is_bounded() {
    let documents = r#"
name: stalled
type: content
filePattern: '\.js$'
rules:
  - id: external
    plugin: hangs-on-start
"#;
    let dir = project(&[("a.js", "export default 1;\n")]);
    let mut config = EngineConfig::default();
    config.plugins.insert(
        "hangs-on-start".into(),
        PluginSettings {
            timeout_ms: Some(50),
            ..Default::default()
        },
    );
    let mut registry = PluginRegistry::new();
    registry.register("hangs-on-start", |_, _| {
        thread::sleep(Duration::from_secs(3));
        Err(PluginError::Init("gave up".into()))
    });
    let options = EngineOptions::from_config(&config, dir.path());
    let engine = Engine::new(config, registry, options);

    let started = Instant::now();
    let summary = engine
        .evaluate(&rules(documents), &["stalled".to_string()], &["a.js"])
        .unwrap();
    assert!(started.elapsed() < Duration::from_secs(1));

    let result = summary.result_for(Path::new("a.js"), "stalled").unwrap();
    assert_eq!(result.violations.len(), 1);
    assert_eq!(result.violations[0].kind, ViolationKind::PluginResolution);
    assert_eq!(summary.internal_errors, 1);
}

#[test]
fn threshold_keeps_equal_confidence() {
    let documents = r#"
name: heuristic
type: content
filePattern: '\.js$'
rules:
  - plugin: fixed-confidence
"#;
    let dir = project(&[("a.js", "x\n")]);
    let rule_set = rules(documents);
    let validators = vec!["heuristic".to_string()];

    let kept = engine(dir.path(), 0.4, false).evaluate(&rule_set, &validators, &["a.js"]).unwrap();
    assert_eq!(kept.violations().count(), 1);
    assert_eq!(kept.violations().next().unwrap().confidence, 0.4);

    let dropped = engine(dir.path(), 0.5, false).evaluate(&rule_set, &validators, &["a.js"]).unwrap();
    assert_eq!(dropped.violations().count(), 0);
    assert!(!dropped.has_failures());
}

#[test]
fn override_round_trip() {
    let dir = project(&[("src/index.js", "module.exports = {};\n")]);
    let rule_set = rules(DEFAULT_EXPORT);
    let validators = vec!["requires-default-export".to_string()];
    let store_path = dir.path().join(".rule_warden/overrides.json");

    let evaluate = |engine: Engine| engine.evaluate(&rule_set, &validators, &["src/index.js"]).unwrap();
    let with_store = || {
        let options = EngineOptions::from_config(&EngineConfig::default(), dir.path())
            .with_overrides(OverrideStore::load_or_empty(&store_path));
        Engine::new(EngineConfig::default(), PluginRegistry::new(), options)
    };

    let baseline = evaluate(with_store());
    let violation = baseline.violations().next().unwrap().clone();

    let mut store = OverrideStore::open(&store_path).unwrap();
    store
        .add(OverrideRecord::for_violation(&violation, OverrideStatus::FalsePositive, "generated", "qa"))
        .unwrap();
    let suppressed = evaluate(with_store());
    assert_eq!(suppressed.violations().count(), 0);
    assert_eq!(suppressed.suppressed, 1);
    assert!(!suppressed.has_failures());

    store
        .add(OverrideRecord::for_violation(&violation, OverrideStatus::AcceptedRisk, "tracked", "qa"))
        .unwrap();
    let accepted = evaluate(with_store());
    let flagged = accepted.violations().next().unwrap();
    assert_eq!(flagged.override_status, Some(OverrideStatus::AcceptedRisk));
    assert_eq!(accepted.accepted_risk, 1);
    assert!(!accepted.has_failures());

    assert!(store.remove(&violation.fingerprint).unwrap());
    let restored = evaluate(with_store());
    assert_eq!(restored, baseline);
}
