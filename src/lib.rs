// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Idempotent machine bootstrap.
//!
//! Oxiboot brings a fresh Linux desktop to a preferred state by running an
//! ordered __plan__ of provisioning steps. Each step is skipped when its goal
//! is already satisfied, so the whole plan can be re-run safely at any time.
//! Only the missing pieces get installed.
//!
//! # See Also
//!
//! 1. [`sequence`] for the sequencing rules.
//! 2. [`config`] for the plan file layout.

pub mod config;
pub mod path;
pub mod privilege;
pub mod report;
pub mod sequence;
pub mod shell;
pub mod step;

pub use crate::{
    report::{format_report, RunReport, StepOutcome, StepResult},
    sequence::{run, CancelToken, PreconditionError, RunOptions, Sequencer},
    step::{Action, ActionError, CheckError, PresenceCheck, Step},
};
