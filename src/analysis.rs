//! Per-run accumulation of checks and their summaries.

use std::fmt;

use serde::Serialize;

use crate::check::{Check, Outcome};

/// Pass/warn/fail counts of an [`Analysis`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    /// Checks graded OK.
    pub ok: usize,
    /// Checks graded Warning.
    pub warning: usize,
    /// Checks graded KO.
    pub ko: usize,
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} checks OK, {} checks KO, and {} warnings.",
            self.ok, self.ko, self.warning
        )
    }
}

/// The checks evaluated for one release, in evaluation order.
#[derive(Debug, Clone, Default)]
pub struct Analysis {
    subject_path: String,
    checks: Vec<Check>,
}

/// Machine-readable form of an [`Analysis`].
#[derive(Debug, Clone, Serialize)]
pub struct StructuredReport<'a> {
    /// Release path the checks were run against.
    pub path: &'a str,
    /// Every check, in evaluation order.
    pub checks: &'a [Check],
    /// Number of OK checks.
    pub passed: usize,
    /// Number of warnings.
    pub warnings: usize,
    /// Number of KO checks.
    pub errors: usize,
}

impl Analysis {
    /// Start an empty analysis of `subject_path`.
    pub fn new(subject_path: impl Into<String>) -> Self {
        Self {
            subject_path: subject_path.into(),
            checks: Vec::new(),
        }
    }

    /// Path of the analysed release.
    pub fn subject_path(&self) -> &str {
        &self.subject_path
    }

    /// Append an evaluated check.
    pub fn append(&mut self, check: Check) {
        self.checks.push(check);
    }

    /// All checks in evaluation order.
    pub fn checks(&self) -> &[Check] {
        &self.checks
    }

    /// Count outcomes. Recomputed on every call.
    pub fn summary(&self) -> Summary {
        self.checks
            .iter()
            .fold(Summary::default(), |mut acc, c| {
                match c.outcome() {
                    Outcome::Ok => acc.ok = acc.ok.saturating_add(1),
                    Outcome::Warning => acc.warning = acc.warning.saturating_add(1),
                    Outcome::Ko => acc.ko = acc.ko.saturating_add(1),
                    Outcome::NeutralInfo => {}
                }
                acc
            })
    }

    /// Whether any check was graded KO.
    pub fn has_failures(&self) -> bool {
        self.checks.iter().any(|c| c.outcome() == Outcome::Ko)
    }

    /// Checks graded KO, in order.
    pub fn failing_checks(&self) -> impl Iterator<Item = &Check> {
        self.checks.iter().filter(|c| c.outcome() == Outcome::Ko)
    }

    /// Comments of KO checks, in order.
    pub fn errors(&self) -> Vec<&str> {
        self.failing_checks().map(Check::comment).collect()
    }

    /// Comments of warnings, in order.
    pub fn warnings(&self) -> Vec<&str> {
        self.checks
            .iter()
            .filter(|c| c.outcome() == Outcome::Warning)
            .map(Check::comment)
            .collect()
    }

    /// One line per check. With `only_problems`, OK and informational
    /// lines are left out.
    pub fn render(&self, only_problems: bool) -> String {
        let mut out = String::new();
        for check in &self.checks {
            if only_problems && !check.outcome().is_problem() {
                continue;
            }
            out.push_str(&check.to_string());
            out.push('\n');
        }
        out
    }

    /// Full check list with counts, for serialization.
    pub fn render_structured(&self) -> StructuredReport<'_> {
        let summary = self.summary();
        StructuredReport {
            path: &self.subject_path,
            checks: &self.checks,
            passed: summary.ok,
            warnings: summary.warning,
            errors: summary.ko,
        }
    }

    /// Pretty-printed JSON of [`Analysis::render_structured`].
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(&self.render_structured())
            .unwrap_or_else(|_| "could not generate JSON".to_owned())
    }
}
