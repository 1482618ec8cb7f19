// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Provisioning steps.
//!
//! A __step__ is one named unit of provisioning work. Every step pairs a
//! __presence check__ with an __action__. The presence check reports whether
//! the goal of the step is already satisfied on the current machine, e.g.,
//! "is Nix on PATH?", while the action performs the side-effecting work needed
//! to satisfy that goal, e.g., "run the official Nix installer".
//!
//! # Idempotency
//!
//! The presence check of a step is evaluated before every action attempt,
//! including every repeated run of the whole sequence. Thus, presence checks
//! must be free of side effects, or at least safe to repeat. Actions on the
//! other hand are free to mutate system state, and may even perform their own
//! finer grained checks internally.
//!
//! # Critical Steps
//!
//! A step can be marked __critical__. Failure of a critical step halts the
//! remainder of the sequence. Failure of a non-critical step is recorded, and
//! the sequence moves on.

use std::fmt::{Debug, Formatter, Result as FmtResult};

/// Report whether the goal of a step is already satisfied.
pub trait PresenceCheck: Send {
    /// Evaluate the check.
    ///
    /// # Errors
    ///
    /// - Return [`CheckError`] if the check itself cannot be evaluated. This
    ///   is distinct from returning `false`.
    fn is_present(&self) -> Result<bool, CheckError>;

    /// Brief human-readable description of what gets checked.
    fn describe(&self) -> String {
        "custom check".into()
    }
}

impl<F> PresenceCheck for F
where
    F: Fn() -> Result<bool, CheckError> + Send,
{
    fn is_present(&self) -> Result<bool, CheckError> {
        self()
    }
}

/// Side-effecting work performed when a step's goal is not yet satisfied.
pub trait Action: Send {
    /// Perform the action.
    ///
    /// # Errors
    ///
    /// - Return [`ActionError`] if the external operation fails.
    fn perform(&self) -> Result<(), ActionError>;
}

impl<F> Action for F
where
    F: Fn() -> Result<(), ActionError> + Send,
{
    fn perform(&self) -> Result<(), ActionError> {
        self()
    }
}

/// One unit of idempotent provisioning work.
///
/// Ordinals are never stored here. A step's position in the sequence handed
/// to the sequencer decides its ordinal.
pub struct Step {
    name: String,
    check: Box<dyn PresenceCheck>,
    action: Box<dyn Action>,
    critical: bool,
}

impl Step {
    /// Construct new non-critical step.
    pub fn new(
        name: impl Into<String>,
        check: impl PresenceCheck + 'static,
        action: impl Action + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            check: Box::new(check),
            action: Box::new(action),
            critical: false,
        }
    }

    /// Set whether failure of this step halts the sequence.
    pub fn critical(mut self, critical: bool) -> Self {
        self.critical = critical;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_critical(&self) -> bool {
        self.critical
    }

    /// Describe the presence check of this step.
    pub fn describe_check(&self) -> String {
        self.check.describe()
    }

    pub(crate) fn check(&self) -> Result<bool, CheckError> {
        self.check.is_present()
    }

    pub(crate) fn perform(&self) -> Result<(), ActionError> {
        self.action.perform()
    }
}

impl Debug for Step {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.debug_struct("Step")
            .field("name", &self.name)
            .field("check", &self.check.describe())
            .field("critical", &self.critical)
            .finish_non_exhaustive()
    }
}

/// Presence check could not be evaluated.
#[derive(Debug, thiserror::Error)]
#[error("presence check failed: {message}")]
pub struct CheckError {
    message: String,

    #[source]
    source: Option<std::io::Error>,
}

impl CheckError {
    /// Construct new check error from a plain message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    /// Construct new check error caused by an I/O failure.
    pub fn io(message: impl Into<String>, source: std::io::Error) -> Self {
        Self {
            message: message.into(),
            source: Some(source),
        }
    }
}

/// Step action failed.
#[derive(Debug, thiserror::Error)]
pub enum ActionError {
    /// External command exited unsuccessfully.
    ///
    /// No exit code means the command was terminated by a signal.
    #[error("command {command:?} failed with {}", describe_exit(*code))]
    Exit { command: String, code: Option<i32> },

    /// External command could not be started.
    #[error("command {command:?} could not be started")]
    Spawn {
        command: String,

        #[source]
        source: std::io::Error,
    },

    /// Any other failure reported by the action.
    #[error("{0}")]
    Other(String),
}

fn describe_exit(code: Option<i32>) -> String {
    match code {
        Some(code) => format!("exit status {code}"),
        None => "termination by signal".into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn closure_capabilities() {
        let step = Step::new(
            "closure",
            || Ok::<_, CheckError>(true),
            || Ok::<_, ActionError>(()),
        );
        assert!(step.check().unwrap());
        assert!(step.perform().is_ok());
        assert_eq!(step.describe_check(), "custom check");
    }

    #[test]
    fn critical_builder() {
        let step = Step::new(
            "nix",
            || Ok::<_, CheckError>(false),
            || Ok::<_, ActionError>(()),
        );
        assert!(!step.is_critical());

        let step = step.critical(true);
        assert!(step.is_critical());
        assert_eq!(step.name(), "nix");
    }

    #[test]
    fn action_error_messages() {
        let result = ActionError::Exit {
            command: "flatpak install discord".into(),
            code: Some(3),
        }
        .to_string();
        assert_eq!(
            result,
            r#"command "flatpak install discord" failed with exit status 3"#
        );

        let result = ActionError::Exit {
            command: "nix-shell".into(),
            code: None,
        }
        .to_string();
        assert_eq!(
            result,
            r#"command "nix-shell" failed with termination by signal"#
        );
    }

    #[test]
    fn check_error_message() {
        let error = CheckError::io(
            "cannot stat /nix",
            std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        );
        assert_eq!(error.to_string(), "presence check failed: cannot stat /nix");
    }
}
