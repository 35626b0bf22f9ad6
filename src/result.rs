//! Result tree (spec §4.9 "Result model"): every executed statement
//! contributes a `Step`, checks roll up into `CheckResult`, checker scripts
//! into `CheckerResult`, and a whole record into a `RecordResult`. The
//! top-level `Result` aggregates a replay set and is what gets written to
//! `results.json`.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::ast::CommentKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultCode {
    Na,
    Success,
    Fail,
}

/// One checkpoint in a record's step list. A `*`-comment (or any other
/// comment form) appends one of these with `result_code: Na`; a following
/// `check` statement mutates that same entry unless `step` was given or no
/// such pending entry exists, in which case a fresh one is appended (spec
/// §4.8 "check matching rule", grounded on `record3/Check.go`).
#[derive(Debug, Clone, Serialize)]
pub struct CheckResult {
    /// One of `=`, `-`, `#`, `%`, `*`, `_`, or empty when this entry was
    /// created directly by a `check` statement with no preceding comment.
    pub comment_type: &'static str,
    pub comment: String,
    pub result_code: ResultCode,
    pub last_send: Option<String>,
    pub last_output: Vec<String>,
    pub exit_code: i64,
    pub check_condition: Option<String>,
    pub line: u32,
}

impl CheckResult {
    fn from_comment(kind: CommentKind, text: String, line: u32) -> Self {
        CheckResult {
            comment_type: comment_marker(kind),
            comment: text,
            result_code: ResultCode::Na,
            last_send: None,
            last_output: Vec::new(),
            exit_code: -1,
            check_condition: None,
            line,
        }
    }

    /// A `check` statement with no pending comment to attach to (spec §4.8:
    /// "no such result exists" branch of the matching rule).
    fn blank(line: u32) -> Self {
        CheckResult {
            comment_type: "",
            comment: String::new(),
            result_code: ResultCode::Na,
            last_send: None,
            last_output: Vec::new(),
            exit_code: -1,
            check_condition: None,
            line,
        }
    }
}

fn comment_marker(kind: CommentKind) -> &'static str {
    match kind {
        CommentKind::Section1 => "=",
        CommentKind::Section2 => "-",
        CommentKind::Section3 => "#",
        CommentKind::Annotation => "%",
        CommentKind::CheckAnchor => "*",
        CommentKind::Plain => "_",
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Step {
    Check(CheckResult),
    Checker(CheckerResult),
    /// A completed `require`d record, nested whole (spec §3's sum type
    /// includes `RecordResult` itself — `require` runs its target to
    /// completion and hangs the result off the caller's step list rather
    /// than merging its steps in).
    Record(Box<RecordResult>),
    Error(ErrorResult),
    Info { message: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorResult {
    pub message: String,
    pub kind: String,
    pub line: u32,
    pub context: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckerResult {
    pub name: String,
    pub passed: bool,
    pub steps: Vec<Step>,
}

/// Tally of Check/Checker outcomes across a record's step list (spec §3
/// data model); kept current incrementally as steps are pushed/mutated
/// rather than recomputed from scratch on read.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct Counts {
    pub success: u64,
    pub fail: u64,
    pub error: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecordResult {
    pub rid: String,
    pub passed: bool,
    pub steps: Vec<Step>,
    /// True when the record did not reach a terminating statement (e.g. it
    /// raised an uncaught error) — surfaced in `incomplete.set` (spec §4.9).
    pub incomplete: bool,
    /// Position of this record within its replay set (0 for a lone `require`
    /// sub-record or a single-record `check` run).
    pub seq: u32,
    pub start_time: DateTime<Utc>,
    /// Wall-clock execution time in seconds.
    pub run_time: f64,
    /// The uncaught top-level error that ended the record early, if any —
    /// distinct from the same error's `Step::Error` entry in `steps`, which
    /// records its position in the step sequence.
    pub error_result: Option<ErrorResult>,
    pub counts: Counts,
}

impl RecordResult {
    pub fn new(rid: impl Into<String>) -> Self {
        RecordResult {
            rid: rid.into(),
            passed: true,
            steps: Vec::new(),
            incomplete: false,
            seq: 0,
            start_time: chrono::Utc::now(),
            run_time: 0.0,
            error_result: None,
            counts: Counts::default(),
        }
    }

    /// A `*`/`=`/`-`/`#`/`%`/`_` comment always appends a fresh, still-`Na`
    /// `CheckResult` (spec §4.1 "Lexer comment forms").
    pub fn push_comment(&mut self, kind: CommentKind, text: String, line: u32) {
        self.steps.push(Step::Check(CheckResult::from_comment(kind, text, line)));
    }

    /// Applies a `check <expr> [step]` outcome to the "current" `CheckResult`
    /// (spec §4.8 "check matching rule"): the last step if it's a `CheckResult`
    /// still at `Na` and `step` wasn't given, otherwise a freshly appended one.
    pub fn apply_check(&mut self, expr_text: String, passed: bool, step: bool, last_send: Option<String>, last_output: Vec<String>, exit_code: i64, line: u32) {
        if !passed {
            self.passed = false;
        }
        let reuse = !step
            && matches!(
                self.steps.last(),
                Some(Step::Check(CheckResult { result_code: ResultCode::Na, .. }))
            );
        let target = if reuse {
            match self.steps.last_mut() {
                Some(Step::Check(c)) => c,
                _ => unreachable!(),
            }
        } else {
            self.steps.push(Step::Check(CheckResult::blank(line)));
            match self.steps.last_mut() {
                Some(Step::Check(c)) => c,
                _ => unreachable!(),
            }
        };
        target.result_code = if passed { ResultCode::Success } else { ResultCode::Fail };
        target.check_condition = Some(expr_text);
        target.last_send = last_send;
        target.last_output = last_output;
        target.exit_code = exit_code;
        target.line = line;
        self.recompute_counts();
    }

    /// Appends a finished checker-script outcome (spec §4.1 "script checker").
    pub fn push_checker(&mut self, checker: CheckerResult) {
        if !checker.passed {
            self.passed = false;
        }
        self.steps.push(Step::Checker(checker));
        self.recompute_counts();
    }

    /// Hangs a completed `require`d record's result off this one (spec §9).
    pub fn push_required(&mut self, required: RecordResult) {
        if !required.passed {
            self.passed = false;
        }
        self.steps.push(Step::Record(Box::new(required)));
    }

    pub fn push_error(&mut self, err: &crate::error::Error, line: u32) {
        self.passed = false;
        self.steps.push(Step::Error(ErrorResult {
            message: err.message.clone(),
            kind: err.kind.to_string(),
            line,
            context: err.context.clone(),
        }));
        self.recompute_counts();
    }

    /// Like [`push_error`](Self::push_error), but also records the error as
    /// this record's terminating `error_result` (spec §3 data model) — used
    /// when an error escapes all the way out of the record's top-level
    /// block rather than being one error among further steps.
    pub fn push_terminating_error(&mut self, err: &crate::error::Error, line: u32) {
        self.push_error(err, line);
        self.error_result = Some(ErrorResult {
            message: err.message.clone(),
            kind: err.kind.to_string(),
            line,
            context: err.context.clone(),
        });
    }

    fn recompute_counts(&mut self) {
        let mut counts = Counts::default();
        for step in &self.steps {
            match step {
                Step::Check(c) => match c.result_code {
                    ResultCode::Success => counts.success += 1,
                    ResultCode::Fail => counts.fail += 1,
                    ResultCode::Na => {}
                },
                Step::Checker(c) => {
                    if c.passed {
                        counts.success += 1;
                    } else {
                        counts.fail += 1;
                    }
                }
                Step::Error(_) => counts.error += 1,
                Step::Record(_) | Step::Info { .. } => {}
            }
        }
        self.counts = counts;
    }
}

/// Full replay-set aggregate, serialized as `results.json`.
#[derive(Debug, Clone, Serialize)]
pub struct ReplaySetResult {
    pub set_name: String,
    pub records: Vec<RecordResult>,
    pub passed: bool,
}

impl ReplaySetResult {
    pub fn new(set_name: impl Into<String>, records: Vec<RecordResult>) -> Self {
        let passed = records.iter().all(|r| r.passed);
        ReplaySetResult { set_name: set_name.into(), records, passed }
    }

    pub fn to_json(&self) -> crate::error::Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| crate::rerr!(crate::error::ErrorKind::IoError, "failed to serialize results: {}", e))
    }

    /// The set of record ids that never reached a terminating statement
    /// (spec §4.9 "incomplete.set"), one per line.
    pub fn incomplete_set(&self) -> String {
        self.records
            .iter()
            .filter(|r| r.incomplete)
            .map(|r| r.rid.clone())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Process exit code: 0 if every record passed, 1 otherwise (spec §6
    /// "External Interfaces").
    pub fn exit_code(&self) -> i32 {
        if self.passed {
            0
        } else {
            1
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failing_check_marks_record_failed() {
        let mut r = RecordResult::new("rid-1");
        r.apply_check("x == 1".into(), false, false, None, Vec::new(), -1, 3);
        assert!(!r.passed);
    }

    #[test]
    fn check_mutates_pending_comment_anchor() {
        let mut r = RecordResult::new("rid-1");
        r.push_comment(CommentKind::CheckAnchor, "expect x to be 1".into(), 1);
        r.apply_check("x == 1".into(), true, false, None, Vec::new(), 0, 2);
        assert_eq!(r.steps.len(), 1);
        match &r.steps[0] {
            Step::Check(c) => {
                assert_eq!(c.comment_type, "*");
                assert_eq!(c.result_code, ResultCode::Success);
                assert_eq!(c.check_condition.as_deref(), Some("x == 1"));
            }
            _ => panic!("expected a Check step"),
        }
    }

    #[test]
    fn step_flag_always_appends_a_new_check_result() {
        let mut r = RecordResult::new("rid-1");
        r.push_comment(CommentKind::CheckAnchor, "first".into(), 1);
        r.apply_check("a".into(), true, true, None, Vec::new(), 0, 2);
        assert_eq!(r.steps.len(), 2);
    }

    #[test]
    fn replay_set_passes_only_if_all_records_pass() {
        let mut a = RecordResult::new("a");
        a.apply_check("1".into(), true, false, None, Vec::new(), 0, 1);
        let mut b = RecordResult::new("b");
        b.apply_check("0".into(), false, false, None, Vec::new(), 0, 1);
        let set = ReplaySetResult::new("set1", vec![a, b]);
        assert!(!set.passed);
        assert_eq!(set.exit_code(), 1);
    }

    #[test]
    fn incomplete_set_lists_only_incomplete_records() {
        let mut a = RecordResult::new("a");
        a.incomplete = true;
        let b = RecordResult::new("b");
        let set = ReplaySetResult::new("set1", vec![a, b]);
        assert_eq!(set.incomplete_set(), "a");
    }
}
