// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Privilege level guard.
//!
//! Bootstrapping a desktop is usually done as a regular user that elevates
//! individual commands through sudo when needed. Running the whole sequence as
//! root would install user-level software into root's home directory instead.
//! So, the sequencer can refuse to start unless the privilege level of the
//! current process matches a [`PrivilegePolicy`].

use nix::unistd::geteuid;
use serde::{Deserialize, Serialize};
use std::io;

/// Required privilege level of the process running the sequence.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PrivilegePolicy {
    /// Any privilege level is fine.
    #[default]
    Any,

    /// Must not run with elevated rights.
    Unprivileged,

    /// Must run with elevated rights.
    Elevated,
}

/// Determine whether current process holds elevated rights.
pub trait PrivilegeProbe: Send {
    /// Check for elevated rights.
    ///
    /// # Errors
    ///
    /// - Return [`io::Error`] if the privilege level cannot be determined.
    fn is_elevated(&self) -> io::Result<bool>;
}

/// Probe effective UID of the current process.
#[derive(Debug, Default, Clone, Copy)]
pub struct EffectiveUidProbe;

impl PrivilegeProbe for EffectiveUidProbe {
    fn is_elevated(&self) -> io::Result<bool> {
        Ok(geteuid().is_root())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn effective_uid_probe_matches_process() -> anyhow::Result<()> {
        assert_eq!(EffectiveUidProbe.is_elevated()?, geteuid().as_raw() == 0);

        Ok(())
    }

    #[test]
    fn policy_deserializes_lowercase() -> anyhow::Result<()> {
        #[derive(Deserialize)]
        struct Wrapper {
            privilege: PrivilegePolicy,
        }

        let wrapper: Wrapper = toml::from_str(r#"privilege = "unprivileged""#)?;
        assert_eq!(wrapper.privilege, PrivilegePolicy::Unprivileged);

        Ok(())
    }
}
