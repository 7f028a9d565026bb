//! Fold per-pair results into a run summary

use crate::domain::violations::{EvaluationResult, RunSummary, ValidatorSummary, ViolationCounts};
use crate::overrides::OverrideCounts;
use std::collections::HashMap;

/// Build the summary for a run.
///
/// `results` must already be in file order then validator order; they are
/// kept as given. Each result's `passed` flag is recomputed, since filtering
/// may have removed or flagged violations after the result was built.
pub fn aggregate(
    mut results: Vec<EvaluationResult>,
    validators: &[String],
    total_files: usize,
    overrides: OverrideCounts,
    cancelled: bool,
) -> RunSummary {
    let mut tallies: Vec<ValidatorSummary> = validators
        .iter()
        .map(|name| ValidatorSummary {
            name: name.clone(),
            files_evaluated: 0,
            passed: 0,
            failed: 0,
            violations: 0,
        })
        .collect();
    let index: HashMap<&str, usize> = validators
        .iter()
        .enumerate()
        .map(|(i, name)| (name.as_str(), i))
        .collect();

    let mut counts = ViolationCounts::default();
    let mut internal_errors = 0;
    let mut passed = 0;
    let mut failed = 0;

    for result in &mut results {
        result.refresh_status();
        if result.passed {
            passed += 1;
        } else {
            failed += 1;
        }

        for violation in &result.violations {
            counts.add(violation.severity);
            if violation.is_internal() {
                internal_errors += 1;
            }
        }

        if let Some(&i) = index.get(result.validator.as_str()) {
            let tally = &mut tallies[i];
            tally.files_evaluated += 1;
            tally.violations += result.violations.len();
            if result.passed {
                tally.passed += 1;
            } else {
                tally.failed += 1;
            }
        }
    }

    RunSummary {
        total_files,
        total_validators: validators.len(),
        evaluations: results.len(),
        passed,
        failed,
        violations_by_severity: counts,
        internal_errors,
        suppressed: overrides.suppressed,
        accepted_risk: overrides.accepted_risk,
        cancelled,
        validators: tallies,
        results,
    }
}
