//! Confidence and severity annotation, and the confidence threshold filter

use crate::config::{Rule, ValidatorDefinition};
use crate::domain::violations::{Finding, Severity, Violation};
use crate::overrides::fingerprint;

/// Confidence used when neither the check nor the definitions supply one
pub const DEFAULT_CONFIDENCE: f64 = 1.0;

/// Settle confidence, severity and fingerprint for a finding.
///
/// Confidence comes from the first of: the finding itself (plugin supplied),
/// the rule, the validator, [`DEFAULT_CONFIDENCE`]. Severity comes from the
/// finding, the rule, the validator, then `error`. Tooling failures are
/// always `error` at full confidence.
pub fn annotate(finding: Finding, rule: Option<&Rule>, validator: &ValidatorDefinition) -> Violation {
    let (confidence, severity) = if finding.kind.is_internal() {
        (DEFAULT_CONFIDENCE, Severity::Error)
    } else {
        let confidence = finding
            .confidence
            .or_else(|| rule.and_then(|r| r.confidence))
            .or(validator.confidence)
            .unwrap_or(DEFAULT_CONFIDENCE);
        let severity = finding
            .severity
            .or_else(|| rule.and_then(|r| r.severity))
            .or(validator.severity)
            .unwrap_or(Severity::Error);
        (confidence.clamp(0.0, 1.0), severity)
    };

    let fingerprint = fingerprint(
        &finding.validator,
        &finding.rule_id,
        &finding.file_path,
        finding.matched.as_deref(),
    );

    Violation {
        validator: finding.validator,
        rule_id: finding.rule_id,
        kind: finding.kind,
        file_path: finding.file_path,
        message: finding.message,
        line_number: finding.line_number,
        matched: finding.matched,
        confidence,
        severity,
        fingerprint,
        suggested_fix: finding.suggested_fix,
        warnings: finding.warnings,
        metadata: finding.metadata,
        override_status: None,
    }
}

/// Keep violations whose confidence is at least `min_confidence`, in order
pub fn filter_by_confidence(violations: Vec<Violation>, min_confidence: f64) -> Vec<Violation> {
    violations
        .into_iter()
        .filter(|v| v.confidence >= min_confidence)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ValidationType;
    use crate::domain::violations::ViolationKind;
    use crate::patterns::Operator;
    use std::collections::BTreeMap;
    use std::path::PathBuf;

    fn finding(kind: ViolationKind) -> Finding {
        Finding::new("v", "r", kind, PathBuf::from("src/a.js"), "failed")
    }

    fn validator() -> ValidatorDefinition {
        ValidatorDefinition::new("v", ValidationType::Content, ".*")
    }

    fn rule() -> Rule {
        Rule::with_operator("r", Operator::MustContain, BTreeMap::new())
    }

    #[test]
    fn test_confidence_precedence() {
        let mut validator = validator();
        validator.confidence = Some(0.5);
        let rule = rule().confidence(0.7);

        let explicit = annotate(finding(ViolationKind::Rule).with_confidence(Some(0.2)), Some(&rule), &validator);
        assert_eq!(explicit.confidence, 0.2);

        let from_rule = annotate(finding(ViolationKind::Rule), Some(&rule), &validator);
        assert_eq!(from_rule.confidence, 0.7);

        let from_validator = annotate(finding(ViolationKind::Rule), Some(&self::rule()), &validator);
        assert_eq!(from_validator.confidence, 0.5);

        let default = annotate(finding(ViolationKind::Rule), None, &self::validator());
        assert_eq!(default.confidence, DEFAULT_CONFIDENCE);
    }

    #[test]
    fn test_severity_precedence() {
        let mut validator = validator();
        validator.severity = Some(Severity::Info);

        let from_rule = annotate(
            finding(ViolationKind::Rule),
            Some(&rule().severity(Severity::Warning)),
            &validator,
        );
        assert_eq!(from_rule.severity, Severity::Warning);

        let from_validator = annotate(finding(ViolationKind::Rule), Some(&rule()), &validator);
        assert_eq!(from_validator.severity, Severity::Info);

        let default = annotate(finding(ViolationKind::Rule), None, &self::validator());
        assert_eq!(default.severity, Severity::Error);
    }

    #[test]
    fn test_internal_errors_are_certain_errors() {
        let mut validator = validator();
        validator.severity = Some(Severity::Info);
        validator.confidence = Some(0.1);

        let violation = annotate(finding(ViolationKind::PluginExecution), Some(&rule()), &validator);
        assert_eq!(violation.severity, Severity::Error);
        assert_eq!(violation.confidence, 1.0);
        assert!(violation.is_internal());
    }

    #[test]
    fn test_fingerprint_ignores_line() {
        let a = annotate(finding(ViolationKind::Rule).with_line(Some(3)), None, &validator());
        let b = annotate(finding(ViolationKind::Rule).with_line(Some(40)), None, &validator());
        assert_eq!(a.fingerprint, b.fingerprint);
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let make = |c: f64| annotate(finding(ViolationKind::Rule).with_confidence(Some(c)), None, &validator());
        let kept = filter_by_confidence(vec![make(0.4), make(0.5), make(0.9)], 0.5);
        let confidences: Vec<_> = kept.iter().map(|v| v.confidence).collect();
        assert_eq!(confidences, vec![0.5, 0.9]);

        assert_eq!(filter_by_confidence(vec![make(0.0)], 0.0).len(), 1);
    }
}
