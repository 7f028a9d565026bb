//! Report generation for run summaries
//!
//! Architecture: Anti-Corruption Layer - Formatters translate domain objects to external formats
//! - RunSummary (domain) is converted to human or JSON representations
//! - Each formatter encapsulates the rules for its specific output format
//! - JSON output is the serialized summary itself, so identical runs print identical bytes

use crate::domain::violations::{RunSummary, Severity, Violation, WardenError, WardenResult};
use std::path::Path;

/// Supported output formats for run summaries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable format with colors
    Human,
    /// JSON format for programmatic consumption
    Json,
}

/// Options for customizing report output
#[derive(Debug, Clone)]
pub struct ReportOptions {
    /// Whether to use colored output (for human format)
    pub use_colors: bool,
    /// Whether to show violation suggestions
    pub show_suggestions: bool,
    /// Maximum number of violations to include
    pub max_violations: Option<usize>,
    /// Minimum severity level to include
    pub min_severity: Option<Severity>,
}

impl Default for ReportOptions {
    fn default() -> Self {
        Self {
            use_colors: true,
            show_suggestions: true,
            max_violations: None,
            min_severity: None,
        }
    }
}

/// Renders a [`RunSummary`] in one of the [`OutputFormat`]s
#[derive(Debug, Clone, Default)]
pub struct ReportFormatter {
    options: ReportOptions,
}

impl ReportFormatter {
    /// Create a new report formatter with options
    pub fn new(options: ReportOptions) -> Self {
        Self { options }
    }

    /// Format a run summary in the specified format
    pub fn format_report(&self, summary: &RunSummary, format: OutputFormat) -> WardenResult<String> {
        match format {
            OutputFormat::Human => Ok(self.format_human(summary)),
            OutputFormat::Json => self.format_json(summary),
        }
    }

    fn keep(&self, violation: &Violation) -> bool {
        self.options.min_severity.map_or(true, |min| violation.severity >= min)
    }

    /// Summary with violations trimmed by severity and count; tallies are untouched
    fn filtered(&self, summary: &RunSummary) -> RunSummary {
        let mut filtered = summary.clone();
        let mut budget = self.options.max_violations.unwrap_or(usize::MAX);
        for result in &mut filtered.results {
            result.violations.retain(|v| {
                if budget == 0 || !self.keep(v) {
                    return false;
                }
                budget -= 1;
                true
            });
        }
        filtered
    }

    fn format_json(&self, summary: &RunSummary) -> WardenResult<String> {
        let filtered = self.filtered(summary);
        let mut json = serde_json::to_string_pretty(&filtered)
            .map_err(|e| WardenError::validation(format!("Failed to serialize report: {e}")))?;
        json.push('\n');
        Ok(json)
    }

    fn paint(&self, code: &str, text: &str) -> String {
        if self.options.use_colors {
            format!("\x1b[{code}m{text}\x1b[0m")
        } else {
            text.to_string()
        }
    }

    fn format_human(&self, summary: &RunSummary) -> String {
        let filtered = self.filtered(summary);
        let mut output = String::new();

        if !filtered.violations().any(|_| true) {
            output.push_str(&format!("✅ {}\n", self.paint("32", "No rule violations found")));
        } else {
            let (icon, color) = if summary.has_failures() { ("❌", "31") } else { ("⚠️", "33") };
            output.push_str(&format!("{} {}\n\n", icon, self.paint(color, "Rule Violations Found")));

            let mut current: Option<&Path> = None;
            for result in filtered.results.iter().filter(|r| !r.violations.is_empty() || r.message.is_some()) {
                if current != Some(result.file_path.as_path()) {
                    output.push_str(&format!("📁 {}\n", result.file_path.display()));
                    current = Some(result.file_path.as_path());
                }
                if let Some(message) = &result.message {
                    output.push_str(&format!("  {}: {}\n", result.validator, self.paint("31", message)));
                }
                for violation in &result.violations {
                    self.push_violation(&mut output, violation);
                }
            }
            output.push('\n');
        }

        output.push_str(&self.format_summary(summary));
        output
    }

    fn push_violation(&self, output: &mut String, violation: &Violation) {
        let severity_color = match violation.severity {
            Severity::Error => "31",
            Severity::Warning => "33",
            Severity::Info => "36",
        };
        let position = violation
            .line_number
            .map(|line| line.to_string())
            .unwrap_or_else(|| "-".to_string());

        let mut flags = Vec::new();
        if violation.is_internal() {
            flags.push(violation.kind.as_str().to_string());
        }
        if let Some(status) = violation.override_status {
            flags.push(status.as_str().to_string());
        }
        if violation.confidence < 1.0 {
            flags.push(format!("confidence {:.2}", violation.confidence));
        }
        let flags = if flags.is_empty() {
            String::new()
        } else {
            format!(" ({})", flags.join(", "))
        };

        output.push_str(&format!(
            "  {} [{}] {}{}\n",
            self.paint("2", &format!("{}:{}/{}", position, violation.validator, violation.rule_id)),
            self.paint(severity_color, violation.severity.as_str()),
            violation.message,
            flags
        ));

        for warning in &violation.warnings {
            output.push_str(&format!("    {}\n", self.paint("33", &format!("! {warning}"))));
        }
        if self.options.show_suggestions {
            if let Some(suggestion) = &violation.suggested_fix {
                output.push_str(&format!("    {}\n", self.paint("32", &format!("💡 {suggestion}"))));
            }
        }
    }

    /// Format the summary section
    fn format_summary(&self, summary: &RunSummary) -> String {
        let counts = &summary.violations_by_severity;
        let mut line = format!("📊 {} ", self.paint("1", "Summary:"));

        if counts.total() == 0 {
            line.push_str(&self.paint("32", "0 violations"));
        } else {
            let mut parts = Vec::new();
            if counts.error > 0 {
                let text = format!("{} error{}", counts.error, if counts.error == 1 { "" } else { "s" });
                parts.push(self.paint("31", &text));
            }
            if counts.warning > 0 {
                let text = format!("{} warning{}", counts.warning, if counts.warning == 1 { "" } else { "s" });
                parts.push(self.paint("33", &text));
            }
            if counts.info > 0 {
                parts.push(self.paint("36", &format!("{} info", counts.info)));
            }
            line.push_str(&parts.join(", "));
        }

        line.push_str(&format!(
            " in {} files ({}/{} checks passed)\n",
            summary.total_files,
            summary.passed,
            summary.evaluations
        ));

        let mut extras = Vec::new();
        if summary.internal_errors > 0 {
            extras.push(format!("{} internal errors", summary.internal_errors));
        }
        if summary.suppressed > 0 {
            extras.push(format!("{} suppressed as false positives", summary.suppressed));
        }
        if summary.accepted_risk > 0 {
            extras.push(format!("{} accepted risks", summary.accepted_risk));
        }
        if summary.cancelled {
            extras.push("run cancelled".to_string());
        }
        if !extras.is_empty() {
            line.push_str(&format!("   {}\n", extras.join(", ")));
        }
        line
    }
}
