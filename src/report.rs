// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Run reports.
//!
//! Every invocation of the sequencer produces a [`RunReport`]: the ordered
//! record of what happened to each step. The report always holds exactly one
//! [`StepResult`] per input step, in input order, even when the sequence was
//! halted early by a critical failure or by cancellation. Steps that never got
//! a chance to run are marked [`StepOutcome::NotAttempted`].
//!
//! Rendering is kept separate from the structured report through
//! [`format_report`], so callers can assert on outcomes without parsing text.

use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    time::Duration,
};

/// Every step completed or was skipped.
pub const EXIT_SUCCESS: i32 = 0;

/// A critical step failed.
pub const EXIT_CRITICAL_FAILURE: i32 = 1;

/// Sequence could not start at all.
pub const EXIT_PRECONDITION: i32 = 2;

/// Sequence was cancelled between steps.
pub const EXIT_CANCELLED: i32 = 130;

/// Terminal state of a single step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StepOutcome {
    /// Presence check reported goal as already satisfied.
    Skipped,

    /// Action ran and succeeded.
    Completed,

    /// Presence check errored, or action failed.
    Failed,

    /// Step was never evaluated.
    NotAttempted,

    /// Dry run found goal unsatisfied, so the action would have run.
    WouldRun,
}

impl StepOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Skipped => "skipped",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::NotAttempted => "not attempted",
            Self::WouldRun => "would run",
        }
    }
}

impl Display for StepOutcome {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(self.as_str())
    }
}

/// Outcome of running one step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepResult {
    /// Position of step in sequence, starting from 1.
    pub ordinal: usize,

    /// Name of the step.
    pub name: String,

    /// Whether failure of the step halts the sequence.
    pub critical: bool,

    /// Terminal state reached by the step.
    pub outcome: StepOutcome,

    /// Time spent in the step's action.
    ///
    /// Only set when the action was actually invoked.
    pub elapsed: Option<Duration>,

    /// Error text for failures, or reason a step was not attempted.
    pub detail: Option<String>,
}

/// Ordered record of outcomes for a full sequencer invocation.
///
/// # Invariant
///
/// - One result per input step, in input order.
/// - Immutable once produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    results: Vec<StepResult>,
    elapsed: Duration,
    cancelled: bool,
    dry_run: bool,
}

impl RunReport {
    pub(crate) fn new(
        results: Vec<StepResult>,
        elapsed: Duration,
        cancelled: bool,
        dry_run: bool,
    ) -> Self {
        Self {
            results,
            elapsed,
            cancelled,
            dry_run,
        }
    }

    /// Step results in sequence order.
    pub fn results(&self) -> &[StepResult] {
        &self.results
    }

    /// Number of steps in the run.
    pub fn total(&self) -> usize {
        self.results.len()
    }

    /// Total wall time of the run.
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Count results with a given outcome.
    pub fn count(&self, outcome: StepOutcome) -> usize {
        self.results
            .iter()
            .filter(|result| result.outcome == outcome)
            .count()
    }

    /// First critical step that failed, if any.
    ///
    /// At most one can exist, because a critical failure halts the sequence.
    pub fn critical_failure(&self) -> Option<&StepResult> {
        self.results
            .iter()
            .find(|result| result.critical && result.outcome == StepOutcome::Failed)
    }

    /// Check if run finished without critical failure or cancellation.
    ///
    /// Non-critical failures do not count against success.
    pub fn is_success(&self) -> bool {
        self.critical_failure().is_none() && !self.cancelled
    }

    /// Process exit code that summarizes this run.
    pub fn exit_code(&self) -> i32 {
        if self.critical_failure().is_some() {
            EXIT_CRITICAL_FAILURE
        } else if self.cancelled {
            EXIT_CANCELLED
        } else {
            EXIT_SUCCESS
        }
    }
}

impl Display for RunReport {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(format_report(self).as_str())
    }
}

/// Render run report into human-readable summary.
///
/// One line per step holding its ordinal, name, outcome, and elapsed time,
/// followed by a summary line of outcome counts.
pub fn format_report(report: &RunReport) -> String {
    let total = report.total();
    let name_width = report
        .results
        .iter()
        .map(|result| result.name.chars().count())
        .max()
        .unwrap_or(0);
    let outcome_width = report
        .results
        .iter()
        .map(|result| result.outcome.as_str().len())
        .max()
        .unwrap_or(0);

    let mut out = String::new();
    for result in &report.results {
        let elapsed = match result.elapsed {
            Some(elapsed) => format_elapsed(elapsed),
            None => "-".into(),
        };
        let mut line = format!(
            "[{}/{total}] {:<name_width$}  {:<outcome_width$}  {elapsed}",
            result.ordinal,
            result.name,
            result.outcome.as_str(),
        );
        if let Some(detail) = &result.detail {
            line.push_str(&format!("  ({detail})"));
        }
        out.push_str(line.trim_end());
        out.push('\n');
    }

    out.push_str(&format!(
        "{} completed, {} skipped, {} failed, {} not attempted",
        report.count(StepOutcome::Completed),
        report.count(StepOutcome::Skipped),
        report.count(StepOutcome::Failed),
        report.count(StepOutcome::NotAttempted),
    ));
    if report.dry_run {
        out.push_str(&format!(", {} would run", report.count(StepOutcome::WouldRun)));
    }
    out.push('\n');

    if report.cancelled {
        out.push_str("run cancelled\n");
    }

    out
}

/// Render elapsed time of a step.
///
/// Uses seconds with one decimal place below one minute, and minutes with
/// zero-padded seconds at or above it.
pub fn format_elapsed(elapsed: Duration) -> String {
    // INVARIANT: Pick unit from the rounded value, so 59.96s becomes 1m00s.
    let tenths = (elapsed.as_millis() + 50) / 100;
    if tenths < 600 {
        format!("{}.{}s", tenths / 10, tenths % 10)
    } else {
        let secs = (tenths + 5) / 10;
        format!("{}m{:02}s", secs / 60, secs % 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;
    use pretty_assertions::assert_eq;
    use simple_test_case::test_case;

    fn result(
        ordinal: usize,
        name: &str,
        outcome: StepOutcome,
        elapsed: Option<u64>,
        detail: Option<&str>,
    ) -> StepResult {
        StepResult {
            ordinal,
            name: name.into(),
            critical: false,
            outcome,
            elapsed: elapsed.map(Duration::from_millis),
            detail: detail.map(Into::into),
        }
    }

    #[test]
    fn format_report_lists_every_step() {
        let mut brave = result(
            3,
            "brave",
            StepOutcome::Failed,
            Some(400),
            Some("command \"brave-install\" failed with exit status 1"),
        );
        brave.critical = true;

        let report = RunReport::new(
            vec![
                result(1, "nix", StepOutcome::Completed, Some(12_300), None),
                result(2, "hm", StepOutcome::Skipped, None, None),
                brave,
                result(
                    4,
                    "discord",
                    StepOutcome::NotAttempted,
                    None,
                    Some("halted by critical step \"brave\""),
                ),
            ],
            Duration::from_secs(13),
            false,
            false,
        );

        let expect = indoc! {r#"
            [1/4] nix      completed      12.3s
            [2/4] hm       skipped        -
            [3/4] brave    failed         0.4s  (command "brave-install" failed with exit status 1)
            [4/4] discord  not attempted  -  (halted by critical step "brave")
            1 completed, 1 skipped, 1 failed, 1 not attempted
        "#};
        assert_eq!(format_report(&report), expect);
        assert_eq!(report.to_string(), expect);
        assert_eq!(report.total(), 4);
        assert_eq!(report.exit_code(), EXIT_CRITICAL_FAILURE);
        assert!(!report.is_success());
    }

    #[test]
    fn format_report_dry_run_and_cancelled() {
        let report = RunReport::new(
            vec![
                result(1, "flathub", StepOutcome::WouldRun, None, None),
                result(2, "spotify", StepOutcome::NotAttempted, None, Some("cancelled")),
            ],
            Duration::ZERO,
            true,
            true,
        );

        let expect = indoc! {r#"
            [1/2] flathub  would run      -
            [2/2] spotify  not attempted  -  (cancelled)
            0 completed, 0 skipped, 0 failed, 1 not attempted, 1 would run
            run cancelled
        "#};
        assert_eq!(format_report(&report), expect);
        assert_eq!(report.exit_code(), EXIT_CANCELLED);
    }

    #[test]
    fn non_critical_failure_still_succeeds() {
        let report = RunReport::new(
            vec![
                result(1, "vim-plug", StepOutcome::Failed, Some(10), Some("boom")),
                result(2, "tpm", StepOutcome::Completed, Some(10), None),
            ],
            Duration::from_millis(20),
            false,
            false,
        );

        assert!(report.is_success());
        assert_eq!(report.critical_failure(), None);
        assert_eq!(report.exit_code(), EXIT_SUCCESS);
        assert_eq!(report.count(StepOutcome::Failed), 1);
    }

    #[test_case(0, "0.0s"; "zero")]
    #[test_case(1_500, "1.5s"; "seconds")]
    #[test_case(59_949, "59.9s"; "just under a minute")]
    #[test_case(59_960, "1m00s"; "rounds up to a minute")]
    #[test_case(65_000, "1m05s"; "minutes")]
    #[test_case(3_725_000, "62m05s"; "over an hour")]
    #[test]
    fn elapsed_rendering(millis: u64, expect: &str) {
        pretty_assertions::assert_eq!(format_elapsed(Duration::from_millis(millis)), expect);
    }
}
