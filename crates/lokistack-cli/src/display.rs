//! Display formatting for CLI output
//!
//! Validation issues are grouped by the file they came from.

use console::style;
use std::collections::BTreeMap;

/// Error severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Warning,
    Error,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Warning => "warning",
            Severity::Error => "error",
        }
    }
}

/// A validation error with location information
#[derive(Debug, Clone)]
pub struct ValidationIssue {
    pub severity: Severity,
    pub file: String,
    pub path: String,
    pub message: String,
    pub suggestion: Option<String>,
}

/// Grouped validation results for display
#[derive(Debug, Default)]
pub struct ValidationReport {
    pub issues: Vec<ValidationIssue>,
    /// Objects synthesized when every check passed
    pub validated_count: usize,
}

impl ValidationReport {
    /// Create a new empty report
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an error
    pub fn add_error(&mut self, file: &str, path: &str, message: &str, suggestion: Option<String>) {
        self.push(Severity::Error, file, path, message, suggestion);
    }

    /// Add a warning
    pub fn add_warning(&mut self, file: &str, path: &str, message: &str, suggestion: Option<String>) {
        self.push(Severity::Warning, file, path, message, suggestion);
    }

    fn push(&mut self, severity: Severity, file: &str, path: &str, message: &str, suggestion: Option<String>) {
        self.issues.push(ValidationIssue {
            severity,
            file: file.to_string(),
            path: path.to_string(),
            message: message.to_string(),
            suggestion,
        });
    }

    /// Display errors grouped by file
    pub fn display(&self) {
        let mut by_file: BTreeMap<&str, Vec<&ValidationIssue>> = BTreeMap::new();
        for issue in &self.issues {
            by_file.entry(&issue.file).or_default().push(issue);
        }

        for (file, issues) in by_file {
            println!();
            println!("{}", style(file).cyan().bold());

            for issue in issues {
                let icon = match issue.severity {
                    Severity::Error => style("✗").red(),
                    Severity::Warning => style("⚠").yellow(),
                };

                let path_display = if issue.path.is_empty() {
                    String::new()
                } else {
                    format!(" at {}", style(&issue.path).dim())
                };

                println!("  {} {}{}", icon, issue.message, path_display);

                if let Some(suggestion) = &issue.suggestion {
                    println!("    {} {}", style("hint:").blue(), suggestion);
                }
            }
        }
    }

    /// Error and warning counts
    pub fn summary(&self) -> (usize, usize) {
        let errors = self
            .issues
            .iter()
            .filter(|i| i.severity == Severity::Error)
            .count();
        (errors, self.issues.len() - errors)
    }

    /// Print summary line
    pub fn print_summary(&self) {
        let (errors, warnings) = self.summary();
        if errors > 0 {
            println!(
                "{} Validation failed: {} error(s), {} warning(s)",
                style("✗").red().bold(),
                errors,
                warnings
            );
        } else if warnings > 0 {
            println!(
                "{} Validation passed with {} warning(s)",
                style("⚠").yellow().bold(),
                warnings
            );
        } else {
            println!(
                "{} Validation passed! {} object(s) would be applied",
                style("✓").green().bold(),
                self.validated_count
            );
        }
    }
}
