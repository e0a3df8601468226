//! Graded rule evaluation.
//!
//! A rule is a boolean predicate tagged with a [`Level`]. The level decides
//! how the predicate maps onto an [`Outcome`], so the same predicate can be
//! reused by rules of different weight.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tracing::info;

/// Rule identifier used for checks that are not tied to a numbered rule.
pub const INTERNAL_RULE: &str = "internal";

/// Severity attached to a rule at definition time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Level {
    /// Informational: a failed condition is only a warning.
    Info,
    /// Minor infraction.
    Warning,
    /// Rule violation.
    Critical,
    /// Never fully passes: success is a warning.
    Awful,
    /// Always graded KO regardless of the condition.
    TrulyAwful,
}

impl Level {
    /// Map a condition onto an outcome for this level.
    pub fn grade(self, condition: bool) -> Outcome {
        match (self, condition) {
            (Self::Info, true) => Outcome::NeutralInfo,
            (Self::Info, false) => Outcome::Warning,
            (Self::Warning, true) => Outcome::Ok,
            (Self::Warning, false) => Outcome::Warning,
            (Self::Critical, true) => Outcome::Ok,
            (Self::Critical, false) => Outcome::Ko,
            (Self::Awful, true) => Outcome::Warning,
            (Self::Awful, false) => Outcome::Ko,
            (Self::TrulyAwful, _) => Outcome::Ko,
        }
    }
}

/// Graded outcome of one evaluated check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// Condition satisfied.
    Ok,
    /// Minor problem.
    Warning,
    /// Rule violation.
    Ko,
    /// Informational line, not counted.
    NeutralInfo,
}

impl Outcome {
    /// Aggregation rank: OK and NeutralInfo < Warning < KO.
    pub fn severity(self) -> u8 {
        match self {
            Self::Ok | Self::NeutralInfo => 0,
            Self::Warning => 1,
            Self::Ko => 2,
        }
    }

    /// Whether the outcome is a warning or a KO.
    pub fn is_problem(self) -> bool {
        self.severity() > 0
    }

    /// Short marker printed in front of a check line.
    pub fn bullet(self) -> &'static str {
        match self {
            Self::Ok => "✓",
            Self::NeutralInfo => "·",
            Self::Warning => "!",
            Self::Ko => "✗",
        }
    }
}

/// One evaluated rule instance. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Check {
    rule: String,
    level: Level,
    #[serde(rename = "result")]
    outcome: Outcome,
    #[serde(rename = "result_comment")]
    comment: String,
}

impl Check {
    /// Rule identifier (e.g. `"2.3.12"`).
    pub fn rule(&self) -> &str {
        &self.rule
    }

    /// Severity level the rule was evaluated with.
    pub fn level(&self) -> Level {
        self.level
    }

    /// Graded outcome.
    pub fn outcome(&self) -> Outcome {
        self.outcome
    }

    /// Comment selected by the evaluation.
    pub fn comment(&self) -> &str {
        &self.comment
    }
}

impl fmt::Display for Check {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            " {:>2} | {:<10} | {}",
            self.outcome.bullet(),
            self.rule,
            self.comment
        )
    }
}

/// Receives every evaluated check, e.g. to print progress while a run is
/// still going.
pub trait CheckSink: Send + Sync {
    /// Called once per evaluation.
    fn record(&self, check: &Check);
}

/// Sink that writes check lines through `tracing`.
///
/// With `problems_only` set, OK and NeutralInfo checks are not written.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink {
    problems_only: bool,
}

impl TracingSink {
    /// Create a sink with the given display filter.
    pub fn new(problems_only: bool) -> Self {
        Self { problems_only }
    }
}

impl CheckSink for TracingSink {
    fn record(&self, check: &Check) {
        if self.problems_only && !check.outcome().is_problem() {
            return;
        }
        info!(target: "propolis::check", "{check}");
    }
}

/// Sink that drops everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl CheckSink for NullSink {
    fn record(&self, _check: &Check) {}
}

/// Evaluates rules into [`Check`]s and forwards them to a [`CheckSink`].
#[derive(Clone)]
pub struct CheckEngine {
    sink: Arc<dyn CheckSink>,
}

impl CheckEngine {
    /// Create an engine reporting to `sink`.
    pub fn new(sink: Arc<dyn CheckSink>) -> Self {
        Self { sink }
    }

    /// Create an engine that logs through `tracing`.
    pub fn with_tracing(problems_only: bool) -> Self {
        Self::new(Arc::new(TracingSink::new(problems_only)))
    }

    /// Create an engine that does not log anything.
    pub fn silent() -> Self {
        Self::new(Arc::new(NullSink))
    }

    /// Grade a boolean condition.
    pub fn evaluate(
        &self,
        rule: &str,
        level: Level,
        condition: bool,
        ok_comment: &str,
        ko_comment: &str,
    ) -> Check {
        let comment = if condition { ok_comment } else { ko_comment };
        let check = Check {
            rule: rule.to_owned(),
            level,
            outcome: level.grade(condition),
            comment: comment.to_owned(),
        };
        self.sink.record(&check);
        check
    }

    /// Grade the outcome of a fallible operation; `None` counts as success.
    ///
    /// With `append_error_text`, the error message is appended to the KO
    /// comment as `": <message>"`.
    pub fn evaluate_error(
        &self,
        rule: &str,
        level: Level,
        err: Option<&dyn std::error::Error>,
        append_error_text: bool,
        ok_comment: &str,
        ko_comment: &str,
    ) -> Check {
        let comment = match err {
            None => ok_comment.to_owned(),
            Some(e) if append_error_text => format!("{ko_comment}: {e}"),
            Some(_) => ko_comment.to_owned(),
        };
        let check = Check {
            rule: rule.to_owned(),
            level,
            outcome: level.grade(err.is_none()),
            comment,
        };
        self.sink.record(&check);
        check
    }
}

impl fmt::Debug for CheckEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CheckEngine").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<Check>>,
    }

    impl CheckSink for Recorder {
        fn record(&self, check: &Check) {
            self.seen.lock().expect("lock").push(check.clone());
        }
    }

    #[test]
    fn severity_table_is_complete() {
        let table = [
            (Level::Info, Outcome::NeutralInfo, Outcome::Warning),
            (Level::Warning, Outcome::Ok, Outcome::Warning),
            (Level::Critical, Outcome::Ok, Outcome::Ko),
            (Level::Awful, Outcome::Warning, Outcome::Ko),
            (Level::TrulyAwful, Outcome::Ko, Outcome::Ko),
        ];
        let engine = CheckEngine::silent();
        for (level, when_true, when_false) in table {
            assert_eq!(engine.evaluate("r", level, true, "", "").outcome(), when_true);
            assert_eq!(engine.evaluate("r", level, false, "", "").outcome(), when_false);
        }
    }

    #[test]
    fn comment_follows_condition() {
        let engine = CheckEngine::silent();
        let ok = engine.evaluate("2.3.2", Level::Critical, true, "fine", "broken");
        let ko = engine.evaluate("2.3.2", Level::Critical, false, "fine", "broken");
        assert_eq!(ok.comment(), "fine");
        assert_eq!(ko.comment(), "broken");
    }

    #[test]
    fn error_text_is_appended_on_request() {
        let engine = CheckEngine::silent();
        let err = std::io::Error::new(std::io::ErrorKind::Other, "bad header");

        let appended = engine.evaluate_error("2.3.1", Level::Critical, Some(&err), true, "ok", "parse failed");
        assert_eq!(appended.outcome(), Outcome::Ko);
        assert_eq!(appended.comment(), "parse failed: bad header");

        let plain = engine.evaluate_error("2.3.1", Level::Critical, Some(&err), false, "ok", "parse failed");
        assert_eq!(plain.comment(), "parse failed");

        let fine = engine.evaluate_error("2.3.1", Level::Critical, None, true, "ok", "parse failed");
        assert_eq!(fine.outcome(), Outcome::Ok);
        assert_eq!(fine.comment(), "ok");
    }

    #[test]
    fn every_evaluation_reaches_the_sink() {
        let recorder = Arc::new(Recorder::default());
        let engine = CheckEngine::new(recorder.clone());
        engine.evaluate("a", Level::Info, true, "x", "y");
        engine.evaluate("b", Level::Critical, false, "x", "y");
        let seen = recorder.seen.lock().expect("lock");
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[1].rule(), "b");
    }

    #[test]
    fn line_format_pads_rule_column() {
        let engine = CheckEngine::silent();
        let check = engine.evaluate("2.3.2", Level::Warning, false, "", "missing year");
        assert_eq!(check.to_string(), "  ! | 2.3.2      | missing year");
    }
}
