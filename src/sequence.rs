// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Provisioning sequencer.
//!
//! The sequencer runs an ordered list of [`Step`]s exactly once per
//! invocation. Each step moves through the following states:
//!
//! ```text
//! Pending -> Skipped
//! Pending -> Running -> Completed
//! Pending -> Running -> Failed
//! ```
//!
//! For each step the sequencer first evaluates its presence check. A satisfied
//! check skips the step without starting a timer. Otherwise the step's action
//! is invoked and timed, whatever its outcome. Steps always run strictly in
//! order, one at a time, because later steps may depend on state that earlier
//! steps create, e.g., a package manager configuration file.
//!
//! # Failure Policy
//!
//! Failing presence checks and failing actions are both recorded as
//! [`StepOutcome::Failed`] in the run report. They never abort the sequencer
//! itself. If the failed step is critical, every remaining step is recorded as
//! [`StepOutcome::NotAttempted`] and the report is returned as usual. Only a
//! violated precondition prevents a report from being produced at all.
//!
//! # Cancellation
//!
//! A started action always runs to completion. Cancellation is only observed
//! between steps through a [`CancelToken`].

use crate::{
    privilege::{EffectiveUidProbe, PrivilegePolicy, PrivilegeProbe},
    report::{RunReport, StepOutcome, StepResult},
    step::Step,
};

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};
use tracing::{debug, info, instrument, warn};

/// Run steps with default options.
///
/// # Errors
///
/// - Return [`PreconditionError::EmptySequence`] if no steps were given.
pub fn run(steps: &[Step]) -> Result<RunReport> {
    Sequencer::new().run(steps)
}

/// Options that alter how a sequence is run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunOptions {
    /// Only evaluate presence checks, never invoke actions.
    pub dry_run: bool,

    /// Resume from given ordinal, starting from 1.
    pub from_step: Option<usize>,
}

/// Coarse-grained cancellation signal.
///
/// Checked by the sequencer only before starting each step.
#[derive(Debug, Default, Clone)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation of remaining steps.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Hooks into sequence progress.
///
/// Every hook does nothing by default.
pub trait SequenceObserver {
    /// Step is about to be evaluated.
    fn step_starting(&mut self, _ordinal: usize, _total: usize, _name: &str) {}

    /// Step's action is about to be invoked.
    fn action_starting(&mut self, _ordinal: usize, _total: usize, _name: &str) {}

    /// Step reached its terminal state.
    fn step_finished(&mut self, _result: &StepResult) {}
}

/// Observer that ignores all progress.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl SequenceObserver for NoopObserver {}

/// Idempotent, resumable provisioning sequencer.
pub struct Sequencer<O = NoopObserver>
where
    O: SequenceObserver,
{
    options: RunOptions,
    cancel: CancelToken,
    policy: PrivilegePolicy,
    probe: Box<dyn PrivilegeProbe>,
    observer: O,
}

impl Sequencer {
    /// Construct new sequencer with default options.
    pub fn new() -> Self {
        Self {
            options: RunOptions::default(),
            cancel: CancelToken::default(),
            policy: PrivilegePolicy::default(),
            probe: Box::new(EffectiveUidProbe),
            observer: NoopObserver,
        }
    }
}

impl Default for Sequencer {
    fn default() -> Self {
        Self::new()
    }
}

impl<O> Sequencer<O>
where
    O: SequenceObserver,
{
    /// Set run options.
    pub fn options(mut self, options: RunOptions) -> Self {
        self.options = options;
        self
    }

    /// Set cancellation token to check between steps.
    pub fn cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Set required privilege level.
    pub fn privilege(mut self, policy: PrivilegePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Set probe used to determine current privilege level.
    pub fn probe(mut self, probe: impl PrivilegeProbe + 'static) -> Self {
        self.probe = Box::new(probe);
        self
    }

    /// Replace progress observer.
    pub fn observer<P>(self, observer: P) -> Sequencer<P>
    where
        P: SequenceObserver,
    {
        Sequencer {
            options: self.options,
            cancel: self.cancel,
            policy: self.policy,
            probe: self.probe,
            observer,
        }
    }

    /// Run all steps in order.
    ///
    /// Individual step failures never escape as errors. They are captured in
    /// the returned [`RunReport`].
    ///
    /// # Errors
    ///
    /// - Return [`PreconditionError::EmptySequence`] if no steps were given.
    /// - Return [`PreconditionError::ResumeOutOfRange`] if resume point does
    ///   not name a step.
    /// - Return [`PreconditionError::Elevated`],
    ///   [`PreconditionError::NotElevated`], or
    ///   [`PreconditionError::PrivilegeUnknown`] if privilege policy is
    ///   violated or cannot be verified.
    #[instrument(skip(self, steps), fields(total = steps.len()), level = "debug")]
    pub fn run(&mut self, steps: &[Step]) -> Result<RunReport> {
        self.verify_preconditions(steps)?;

        let total = steps.len();
        let resume = self.options.from_step.unwrap_or(1);
        let start = Instant::now();
        let mut results = Vec::with_capacity(total);
        let mut halted_by: Option<&str> = None;
        let mut cancelled = false;

        for (index, step) in steps.iter().enumerate() {
            let ordinal = index + 1;

            // INVARIANT: Everything after a halt is recorded, but never evaluated.
            if let Some(name) = halted_by {
                results.push(not_attempted(
                    ordinal,
                    step,
                    format!("halted by critical step {name:?}"),
                ));
                continue;
            }

            if ordinal < resume {
                debug!("step {ordinal}/{total} {:?} is before resume point", step.name());
                results.push(not_attempted(ordinal, step, "before resume point"));
                continue;
            }

            if cancelled || self.cancel.is_cancelled() {
                if !cancelled {
                    warn!("cancelled before step {ordinal}/{total} {:?}", step.name());
                }
                cancelled = true;
                results.push(not_attempted(ordinal, step, "cancelled"));
                continue;
            }

            self.observer.step_starting(ordinal, total, step.name());
            let result = self.run_step(ordinal, total, step);
            self.observer.step_finished(&result);

            if result.outcome == StepOutcome::Failed && step.is_critical() {
                halted_by = Some(step.name());
            }
            results.push(result);
        }

        Ok(RunReport::new(
            results,
            start.elapsed(),
            cancelled,
            self.options.dry_run,
        ))
    }

    fn verify_preconditions(&self, steps: &[Step]) -> Result<()> {
        if steps.is_empty() {
            return Err(PreconditionError::EmptySequence);
        }

        if let Some(from_step) = self.options.from_step {
            if from_step == 0 || from_step > steps.len() {
                return Err(PreconditionError::ResumeOutOfRange {
                    from_step,
                    total: steps.len(),
                });
            }
        }

        if self.policy == PrivilegePolicy::Any {
            return Ok(());
        }

        let elevated = self
            .probe
            .is_elevated()
            .map_err(PreconditionError::PrivilegeUnknown)?;
        match (self.policy, elevated) {
            (PrivilegePolicy::Unprivileged, true) => Err(PreconditionError::Elevated),
            (PrivilegePolicy::Elevated, false) => Err(PreconditionError::NotElevated),
            _ => Ok(()),
        }
    }

    fn run_step(&mut self, ordinal: usize, total: usize, step: &Step) -> StepResult {
        let mut result = StepResult {
            ordinal,
            name: step.name().to_string(),
            critical: step.is_critical(),
            outcome: StepOutcome::Failed,
            elapsed: None,
            detail: None,
        };

        match step.check() {
            Ok(true) => {
                info!("step {ordinal}/{total} {:?} already satisfied", step.name());
                result.outcome = StepOutcome::Skipped;
                return result;
            }
            Ok(false) => {}
            Err(error) => {
                warn!("step {ordinal}/{total} {:?}: {error}", step.name());
                result.detail = Some(error.to_string());
                return result;
            }
        }

        if self.options.dry_run {
            info!("step {ordinal}/{total} {:?} would run", step.name());
            result.outcome = StepOutcome::WouldRun;
            return result;
        }

        info!("step {ordinal}/{total}: {}", step.name());
        self.observer.action_starting(ordinal, total, step.name());
        let timer = Instant::now();
        let outcome = step.perform();
        result.elapsed = Some(timer.elapsed());

        match outcome {
            Ok(()) => {
                result.outcome = StepOutcome::Completed;
                debug!(
                    "step {ordinal}/{total} {:?} completed in {:?}",
                    step.name(),
                    result.elapsed.unwrap_or(Duration::ZERO)
                );
            }
            Err(error) => {
                if step.is_critical() {
                    warn!("critical step {ordinal}/{total} {:?} failed: {error}", step.name());
                } else {
                    warn!("step {ordinal}/{total} {:?} failed, continuing: {error}", step.name());
                }
                result.detail = Some(error.to_string());
            }
        }

        result
    }
}

fn not_attempted(ordinal: usize, step: &Step, reason: impl Into<String>) -> StepResult {
    StepResult {
        ordinal,
        name: step.name().to_string(),
        critical: step.is_critical(),
        outcome: StepOutcome::NotAttempted,
        elapsed: None,
        detail: Some(reason.into()),
    }
}

/// Sequence cannot start at all.
#[derive(Debug, thiserror::Error)]
pub enum PreconditionError {
    /// No steps to run.
    #[error("no steps to run")]
    EmptySequence,

    /// Resume point does not name a step.
    #[error("cannot resume from step {from_step}, sequence has {total} step(s)")]
    ResumeOutOfRange { from_step: usize, total: usize },

    /// Running with elevated rights when that is disallowed.
    #[error("refusing to run with elevated privileges, run as a regular user instead")]
    Elevated,

    /// Running without elevated rights when they are required.
    #[error("elevated privileges are required")]
    NotElevated,

    /// Privilege level of current process cannot be determined.
    #[error("cannot determine privilege level of current process")]
    PrivilegeUnknown(#[source] std::io::Error),
}

/// Friendly result alias :3
pub type Result<T, E = PreconditionError> = std::result::Result<T, E>;
