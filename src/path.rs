// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Path resolution utilities.
//!
//! Determine relevent path information for external files that need to be
//! interacted with, or managed in some way.

use std::path::PathBuf;

/// Determine default absolute path to provisioning plan.
///
/// Uses XDG Base Directory path `$XDG_CONFIG_HOME/oxiboot/plan.toml` as the
/// default absolute path for the plan file. Does not check if the path
/// returned actually exists.
///
/// # Errors
///
/// - Return [`NoWayHome`] if home directory path cannot be determined.
///
/// # See Also
///
/// - [XDG Base Directory](https://wiki.archlinux.org/title/XDG_Base_Directory)
pub fn default_plan_path() -> Result<PathBuf> {
    dirs::config_dir()
        .map(|path| path.join("oxiboot").join("plan.toml"))
        .ok_or(NoWayHome)
}

/// No way to determine user's home directory.
///
/// # See Also
///
/// - [`dirs::config_dir`](https://docs.rs/dirs/latest/dirs/fn.config_dir.html)
#[derive(Clone, Debug, thiserror::Error)]
#[error("cannot determine absolute path to user's home directory")]
pub struct NoWayHome;

/// Friendly result alias :3
pub type Result<T, E = NoWayHome> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use sealed_test::prelude::*;

    #[sealed_test(env = [("HOME", "/home/blah"), ("XDG_CONFIG_HOME", "/home/blah/.config")])]
    fn plan_path_follows_xdg() -> anyhow::Result<()> {
        assert_eq!(
            default_plan_path()?,
            PathBuf::from("/home/blah/.config/oxiboot/plan.toml")
        );

        Ok(())
    }
}
