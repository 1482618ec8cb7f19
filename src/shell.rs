// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Shell-backed step capabilities.
//!
//! Almost every bootstrap step boils down to "ask the system if X is there,
//! and if not, run X's official installer". This module provides presence
//! checks and actions that do exactly that through an external shell. The
//! sequencer never sees any command output, only booleans and exit statuses.
//!
//! All commands are executed as `<shell> -c <command>`, so pipes, globs, and
//! environment expansion behave like they would in an interactive terminal.

use crate::step::{Action, ActionError, CheckError, PresenceCheck};

use std::{
    ffi::OsStr,
    path::{Path, PathBuf},
    process::{Command, ExitStatus, Stdio},
};
use tracing::{debug, instrument};

/// Default shell used to run commands.
pub const DEFAULT_SHELL: &str = "/bin/sh";

/// Present if a command can be found on PATH.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandCheck {
    shell: PathBuf,
    name: String,
}

impl CommandCheck {
    pub fn new(shell: impl Into<PathBuf>, name: impl Into<String>) -> Self {
        Self {
            shell: shell.into(),
            name: name.into(),
        }
    }
}

impl PresenceCheck for CommandCheck {
    #[instrument(skip(self), fields(name = %self.name), level = "debug")]
    fn is_present(&self) -> Result<bool, CheckError> {
        let script = format!("command -v {}", quote(&self.name));
        syscall_quiet(&self.shell, &script)
    }

    fn describe(&self) -> String {
        format!("command {:?} on PATH", self.name)
    }
}

/// Present if a path exists.
///
/// Paths containing glob metacharacters are present if at least one entry
/// matches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathCheck {
    pattern: String,
}

impl PathCheck {
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
        }
    }

    fn is_glob(&self) -> bool {
        self.pattern.contains(['*', '?', '['])
    }
}

impl PresenceCheck for PathCheck {
    #[instrument(skip(self), fields(pattern = %self.pattern), level = "debug")]
    fn is_present(&self) -> Result<bool, CheckError> {
        if !self.is_glob() {
            return Path::new(&self.pattern).try_exists().map_err(|err| {
                CheckError::io(format!("cannot access {:?}", self.pattern), err)
            });
        }

        let mut entries = glob::glob(&self.pattern).map_err(|err| {
            CheckError::new(format!("invalid pattern {:?}: {err}", self.pattern))
        })?;

        // INVARIANT: Unreadable entries are errors, not absence.
        match entries.next() {
            Some(Ok(path)) => {
                debug!("matched {}", path.display());
                Ok(true)
            }
            Some(Err(err)) => {
                let path = err.path().display().to_string();
                Err(CheckError::io(
                    format!("cannot access {path:?}"),
                    err.into_error(),
                ))
            }
            None => Ok(false),
        }
    }

    fn describe(&self) -> String {
        format!("path {:?} exists", self.pattern)
    }
}

/// Present if a shell command exits successfully.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellCheck {
    shell: PathBuf,
    command: String,
}

impl ShellCheck {
    pub fn new(shell: impl Into<PathBuf>, command: impl Into<String>) -> Self {
        Self {
            shell: shell.into(),
            command: command.into(),
        }
    }
}

impl PresenceCheck for ShellCheck {
    #[instrument(skip(self), fields(command = %self.command), level = "debug")]
    fn is_present(&self) -> Result<bool, CheckError> {
        syscall_quiet(&self.shell, &self.command)
    }

    fn describe(&self) -> String {
        format!("`{}` succeeds", self.command)
    }
}

/// Run a script of shell commands in order.
///
/// Commands inherit standard I/O so installers can prompt the user. The first
/// failing command fails the whole action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellAction {
    shell: PathBuf,
    commands: Vec<String>,
}

impl ShellAction {
    pub fn new(
        shell: impl Into<PathBuf>,
        commands: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            shell: shell.into(),
            commands: commands.into_iter().map(Into::into).collect(),
        }
    }
}

impl Action for ShellAction {
    #[instrument(skip(self), level = "debug")]
    fn perform(&self) -> Result<(), ActionError> {
        for command in &self.commands {
            debug!("run {command:?}");
            syscall_interactive(&self.shell, command)?;
        }

        Ok(())
    }
}

fn syscall_interactive(shell: impl AsRef<OsStr>, command: &str) -> Result<(), ActionError> {
    let status = Command::new(shell.as_ref())
        .arg("-c")
        .arg(command)
        .status()
        .map_err(|err| ActionError::Spawn {
            command: command.into(),
            source: err,
        })?;

    if !status.success() {
        return Err(ActionError::Exit {
            command: command.into(),
            code: status.code(),
        });
    }

    Ok(())
}

fn syscall_quiet(shell: impl AsRef<OsStr>, command: &str) -> Result<bool, CheckError> {
    let status = Command::new(shell.as_ref())
        .arg("-c")
        .arg(command)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map_err(|err| CheckError::io(format!("cannot run {command:?}"), err))?;

    exit_to_presence(command, status)
}

fn exit_to_presence(command: &str, status: ExitStatus) -> Result<bool, CheckError> {
    match status.code() {
        Some(0) => Ok(true),
        Some(code) => {
            debug!("{command:?} exited with {code}");
            Ok(false)
        }
        None => Err(CheckError::new(format!(
            "{command:?} was terminated by signal"
        ))),
    }
}

/// Single-quote word for safe use in a shell command.
fn quote(word: &str) -> String {
    format!("'{}'", word.replace('\'', r"'\''"))
}
