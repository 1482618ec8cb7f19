// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Provisioning plan layout.
//!
//! Specify the layout of the plan file that lists every bootstrap step, to
//! simplify the process of serialization and deserialization. File I/O is left
//! to the caller to figure out.
//!
//! # General Layout
//!
//! A plan is composed of two basic parts: settings and steps. The settings
//! section configures how steps get executed. The step listing defines the
//! ordered sequence of steps itself. Order in the file is execution order.
//!
//! ```toml
//! [settings]
//! shell = "/bin/sh"
//! privilege = "unprivileged"
//!
//! [[step]]
//! name = "Ensure Nix is available"
//! critical = true
//! check = { command = "nix" }
//! run = "curl -L https://nixos.org/nix/install | sh -s -- --daemon"
//! ```
//!
//! # Presence Checks
//!
//! Each step must declare exactly one presence check:
//!
//! - `{ command = "<name>" }` is satisfied if the command is on PATH.
//! - `{ path = "<path>" }` is satisfied if the path exists. Shell expansion
//!   is performed on the path, and glob patterns are allowed.
//! - `{ shell = "<command>" }` is satisfied if the command exits with zero.

use crate::{
    privilege::PrivilegePolicy,
    shell::{CommandCheck, PathCheck, ShellAction, ShellCheck, DEFAULT_SHELL},
    step::Step,
};

use serde::{Deserialize, Serialize};
use std::{
    collections::HashSet,
    fmt::{Display, Error as FmtError, Formatter, Result as FmtResult},
    path::{Path, PathBuf},
    str::FromStr,
};

/// Provisioning plan layout.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct Plan {
    /// Settings for the plan.
    #[serde(default)]
    pub settings: PlanSettings,

    /// Ordered listing of steps.
    #[serde(rename = "step", default)]
    pub steps: Vec<StepDefinition>,
}

impl Plan {
    /// Convert plan into runnable steps.
    ///
    /// Step order is preserved.
    pub fn into_steps(self) -> Vec<Step> {
        let shell = self.settings.shell;
        self.steps
            .into_iter()
            .map(|definition| definition.into_step(&shell))
            .collect()
    }

    /// Starter plan used to bootstrap a fresh desktop.
    ///
    /// Nix and Home Manager come first, because everything else assumes that
    /// the declarative configuration has been applied.
    pub fn starter() -> Self {
        let home_manager = "$HOME/.config/home-manager/home.nix";
        Self {
            settings: PlanSettings::default(),
            steps: vec![
                StepDefinition {
                    name: "Ensure Nix is available".into(),
                    critical: true,
                    check: CheckDefinition::Command("nix".into()),
                    run: Script::Line(
                        "curl --proto '=https' --tlsv1.2 -sSfL https://nixos.org/nix/install \
                         | sh -s -- --daemon"
                            .into(),
                    ),
                },
                StepDefinition {
                    name: "Ensure Home Manager is available".into(),
                    critical: true,
                    check: CheckDefinition::Command("home-manager".into()),
                    run: Script::Lines(vec![
                        "nix-channel --add https://github.com/nix-community/home-manager/archive/master.tar.gz home-manager".into(),
                        "nix-channel --update".into(),
                        "nix-shell '<home-manager>' -A install".into(),
                    ]),
                },
                StepDefinition {
                    name: "Write Home Manager configuration".into(),
                    critical: true,
                    check: CheckDefinition::Path(home_manager.into()),
                    run: Script::Line(
                        "home-manager init --no-switch \"$HOME/.config/home-manager\"".into(),
                    ),
                },
                StepDefinition {
                    name: "Apply Home Manager configuration".into(),
                    critical: true,
                    check: CheckDefinition::Shell(
                        "home-manager generations | grep -q .".into(),
                    ),
                    run: Script::Line("home-manager switch".into()),
                },
                StepDefinition {
                    name: "Ensure Flatpak and Flathub are available".into(),
                    critical: false,
                    check: CheckDefinition::Shell(
                        "flatpak remotes --columns=name | grep -qx flathub".into(),
                    ),
                    run: Script::Line(
                        "flatpak remote-add --user --if-not-exists flathub \
                         https://dl.flathub.org/repo/flathub.flatpakrepo"
                            .into(),
                    ),
                },
                StepDefinition {
                    name: "Install Brave browser".into(),
                    critical: false,
                    check: CheckDefinition::Command("brave-browser".into()),
                    run: Script::Line("curl -fsS https://dl.brave.com/install.sh | sh".into()),
                },
                StepDefinition {
                    name: "Install Discord".into(),
                    critical: false,
                    check: CheckDefinition::Shell(
                        "flatpak info --user com.discordapp.Discord".into(),
                    ),
                    run: Script::Line(
                        "flatpak install --user -y flathub com.discordapp.Discord".into(),
                    ),
                },
                StepDefinition {
                    name: "Install Spotify".into(),
                    critical: false,
                    check: CheckDefinition::Shell("flatpak info --user com.spotify.Client".into()),
                    run: Script::Line(
                        "flatpak install --user -y flathub com.spotify.Client".into(),
                    ),
                },
                StepDefinition {
                    name: "Install tmux plugin manager".into(),
                    critical: false,
                    check: CheckDefinition::Path("$HOME/.tmux/plugins/tpm".into()),
                    run: Script::Line(
                        "git clone https://github.com/tmux-plugins/tpm \"$HOME/.tmux/plugins/tpm\""
                            .into(),
                    ),
                },
                StepDefinition {
                    name: "Install vim-plug".into(),
                    critical: false,
                    check: CheckDefinition::Path("$HOME/.local/share/nvim/site/autoload/plug.vim".into()),
                    run: Script::Line(
                        "curl -fLo \"$HOME/.local/share/nvim/site/autoload/plug.vim\" --create-dirs \
                         https://raw.githubusercontent.com/junegunn/vim-plug/master/plug.vim"
                            .into(),
                    ),
                },
            ],
        }
    }

    fn validate(&self) -> Result<()> {
        if self.steps.is_empty() {
            return Err(ConfigError::NoSteps);
        }

        let mut names = HashSet::new();
        for (index, step) in self.steps.iter().enumerate() {
            let ordinal = index + 1;
            if step.name.trim().is_empty() {
                return Err(ConfigError::EmptyName { ordinal });
            }

            if !names.insert(step.name.as_str()) {
                return Err(ConfigError::DuplicateName {
                    name: step.name.clone(),
                });
            }

            if step.run.is_empty() {
                return Err(ConfigError::EmptyScript {
                    name: step.name.clone(),
                });
            }
        }

        Ok(())
    }
}

impl FromStr for Plan {
    type Err = ConfigError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        let mut plan: Plan = toml::de::from_str(data).map_err(ConfigError::Deserialize)?;

        // INVARIANT: Perform shell expansion on path checks and shell setting.
        plan.settings.shell = PathBuf::from(
            shellexpand::full(plan.settings.shell.to_string_lossy().as_ref())
                .map_err(ConfigError::ShellExpansion)?
                .into_owned(),
        );
        for step in &mut plan.steps {
            if let CheckDefinition::Path(path) = &mut step.check {
                *path = shellexpand::full(path.as_str())
                    .map_err(ConfigError::ShellExpansion)?
                    .into_owned();
            }
        }

        plan.validate()?;

        Ok(plan)
    }
}

impl Display for Plan {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(
            toml::ser::to_string_pretty(self)
                .map_err(ConfigError::Serialize)?
                .as_str(),
        )
    }
}

/// Plan configuration settings.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct PlanSettings {
    /// Shell used to run presence checks and actions.
    #[serde(default = "default_shell")]
    pub shell: PathBuf,

    /// Required privilege level to run the plan.
    #[serde(default = "default_privilege")]
    pub privilege: PrivilegePolicy,
}

impl Default for PlanSettings {
    fn default() -> Self {
        Self {
            shell: default_shell(),
            privilege: default_privilege(),
        }
    }
}

fn default_shell() -> PathBuf {
    PathBuf::from(DEFAULT_SHELL)
}

fn default_privilege() -> PrivilegePolicy {
    PrivilegePolicy::Unprivileged
}

/// Definition of a single step.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct StepDefinition {
    /// Human-readable label of the step.
    pub name: String,

    /// Halt plan if this step fails.
    #[serde(default)]
    pub critical: bool,

    /// Check that decides whether step is already satisfied.
    pub check: CheckDefinition,

    /// Commands to run when step is not satisfied.
    pub run: Script,
}

impl StepDefinition {
    fn into_step(self, shell: &Path) -> Step {
        let action = ShellAction::new(shell, self.run.into_lines());
        let step = match self.check {
            CheckDefinition::Command(name) => {
                Step::new(self.name, CommandCheck::new(shell, name), action)
            }
            CheckDefinition::Path(pattern) => Step::new(self.name, PathCheck::new(pattern), action),
            CheckDefinition::Shell(command) => {
                Step::new(self.name, ShellCheck::new(shell, command), action)
            }
        };

        step.critical(self.critical)
    }
}

/// Presence check kinds.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckDefinition {
    /// Command is on PATH.
    Command(String),

    /// Path or glob pattern exists.
    Path(String),

    /// Shell command exits with zero.
    Shell(String),
}

/// Shell commands of a step, either one line or a listing of lines.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum Script {
    Line(String),
    Lines(Vec<String>),
}

impl Script {
    /// Check if script has no commands to run.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Line(line) => line.trim().is_empty(),
            Self::Lines(lines) => lines.iter().all(|line| line.trim().is_empty()),
        }
    }

    /// Listing of non-blank commands.
    pub fn into_lines(self) -> Vec<String> {
        match self {
            Self::Line(line) => vec![line],
            Self::Lines(lines) => lines
                .into_iter()
                .filter(|line| !line.trim().is_empty())
                .collect(),
        }
    }
}

/// Configuration error types.
#[derive(Clone, Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to deserialize configuration.
    #[error(transparent)]
    Deserialize(#[from] toml::de::Error),

    /// Failed to serialize configuration.
    #[error(transparent)]
    Serialize(#[from] toml::ser::Error),

    /// Failed to perform shell expansion on configuration.
    #[error(transparent)]
    ShellExpansion(#[from] shellexpand::LookupError<std::env::VarError>),

    /// Plan lists no steps.
    #[error("plan lists no steps")]
    NoSteps,

    /// Step has a blank name.
    #[error("step {ordinal} has an empty name")]
    EmptyName { ordinal: usize },

    /// Two steps share a name.
    #[error("step name {name:?} is used more than once")]
    DuplicateName { name: String },

    /// Step has nothing to run.
    #[error("step {name:?} has nothing to run")]
    EmptyScript { name: String },
}

impl From<ConfigError> for FmtError {
    fn from(_: ConfigError) -> Self {
        FmtError
    }
}

/// Friendly result alias :3
type Result<T, E = ConfigError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;
    use pretty_assertions::assert_eq;
    use sealed_test::prelude::*;
    use simple_test_case::test_case;

    #[sealed_test(env = [("BLAH", "/home/blah")])]
    fn deserialize_plan() -> anyhow::Result<()> {
        let result: Plan = r#"
            [settings]
            privilege = "any"

            [[step]]
            name = "nix"
            critical = true
            check = { command = "nix" }
            run = "sh install-nix"

            [[step]]
            name = "tpm"
            check = { path = "$BLAH/.tmux/plugins/tpm" }
            run = ["mkdir -p $BLAH/.tmux/plugins", "git clone tpm"]

            [[step]]
            name = "discord"
            check = { shell = "flatpak info com.discordapp.Discord" }
            run = "flatpak install -y com.discordapp.Discord"
        "#
        .parse()?;

        let expect = Plan {
            settings: PlanSettings {
                shell: PathBuf::from("/bin/sh"),
                privilege: PrivilegePolicy::Any,
            },
            steps: vec![
                StepDefinition {
                    name: "nix".into(),
                    critical: true,
                    check: CheckDefinition::Command("nix".into()),
                    run: Script::Line("sh install-nix".into()),
                },
                StepDefinition {
                    name: "tpm".into(),
                    critical: false,
                    check: CheckDefinition::Path("/home/blah/.tmux/plugins/tpm".into()),
                    run: Script::Lines(vec![
                        "mkdir -p $BLAH/.tmux/plugins".into(),
                        "git clone tpm".into(),
                    ]),
                },
                StepDefinition {
                    name: "discord".into(),
                    critical: false,
                    check: CheckDefinition::Shell("flatpak info com.discordapp.Discord".into()),
                    run: Script::Line("flatpak install -y com.discordapp.Discord".into()),
                },
            ],
        };

        assert_eq!(result, expect);

        Ok(())
    }

    #[test]
    fn serialize_plan() -> anyhow::Result<()> {
        let plan = Plan {
            settings: PlanSettings::default(),
            steps: vec![StepDefinition {
                name: "nix".into(),
                critical: true,
                check: CheckDefinition::Command("nix".into()),
                run: Script::Lines(vec!["sh install-nix".into(), "nix --version".into()]),
            }],
        };
        let result = plan.to_string();

        let expect = indoc! {r#"
            [settings]
            shell = "/bin/sh"
            privilege = "unprivileged"
        "#};
        assert!(result.starts_with(expect));
        assert!(result.contains("[[step]]\nname = \"nix\"\ncritical = true\n"));
        assert!(result.contains("command = \"nix\""));
        assert_eq!(result.parse::<Plan>()?, plan);

        Ok(())
    }

    #[sealed_test(env = [("HOME", "/home/blah")])]
    fn starter_plan_round_trips() -> anyhow::Result<()> {
        let plan = Plan::starter();
        let result: Plan = plan.to_string().parse()?;

        assert_eq!(result.steps.len(), plan.steps.len());
        assert_eq!(result.settings, plan.settings);
        assert_eq!(
            result.steps[2].check,
            CheckDefinition::Path("/home/blah/.config/home-manager/home.nix".into())
        );

        Ok(())
    }

    #[test]
    fn into_steps_preserves_order() -> anyhow::Result<()> {
        let plan: Plan = indoc! {r#"
            [[step]]
            name = "first"
            check = { command = "sh" }
            run = "true"

            [[step]]
            name = "second"
            critical = true
            check = { shell = "false" }
            run = "true"
        "#}
        .parse()?;

        let steps = plan.into_steps();
        let result = steps
            .iter()
            .map(|step| (step.name().to_string(), step.is_critical()))
            .collect::<Vec<_>>();
        assert_eq!(
            result,
            vec![("first".to_string(), false), ("second".to_string(), true)]
        );

        Ok(())
    }

    #[test_case(
        "",
        "plan lists no steps";
        "no steps"
    )]
    #[test_case(
        "[[step]]\nname = \" \"\ncheck = { command = \"nix\" }\nrun = \"true\"",
        "step 1 has an empty name";
        "blank name"
    )]
    #[test_case(
        "[[step]]\nname = \"a\"\ncheck = { command = \"nix\" }\nrun = \"true\"\n\
         [[step]]\nname = \"a\"\ncheck = { command = \"nix\" }\nrun = \"true\"",
        "step name \"a\" is used more than once";
        "duplicate name"
    )]
    #[test_case(
        "[[step]]\nname = \"a\"\ncheck = { command = \"nix\" }\nrun = [\"\", \" \"]",
        "step \"a\" has nothing to run";
        "blank script"
    )]
    #[test]
    fn invalid_plans(data: &str, expect: &str) {
        let result = data.parse::<Plan>().map_err(|err| err.to_string());
        pretty_assertions::assert_eq!(result, Err(expect.to_string()));
    }

    #[test]
    fn unknown_check_kind_fails_to_parse() {
        let result = indoc! {r#"
            [[step]]
            name = "nix"
            check = { url = "https://nixos.org" }
            run = "true"
        "#}
        .parse::<Plan>();

        assert!(matches!(result, Err(ConfigError::Deserialize(_))));
    }
}
