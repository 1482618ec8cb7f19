// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use oxiboot::{
    config::Plan,
    path::default_plan_path,
    report::{StepResult, EXIT_PRECONDITION, EXIT_SUCCESS},
    sequence::{CancelToken, RunOptions, SequenceObserver, Sequencer},
};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use inquire::Confirm;
use std::{fs, path::PathBuf, process::exit};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Clone, Parser)]
#[command(
    about,
    override_usage = "\n  oxiboot [options] [<oxiboot-command>]",
    subcommand_help_heading = "Commands",
    version
)]
struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

impl Cli {
    async fn run(self) -> Result<i32> {
        match self.command {
            Some(Command::Run(opts)) => run_plan(opts).await,
            Some(Command::Init(opts)) => run_init(opts),
            Some(Command::List(opts)) => run_list(opts),
            None => run_plan(RunArgs::default()).await,
        }
    }
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Run every step of plan that is not satisfied yet (default).
    #[command(override_usage = "oxiboot run [options]")]
    Run(RunArgs),

    /// Write starter plan.
    #[command(override_usage = "oxiboot init [options]")]
    Init(InitArgs),

    /// List steps of plan.
    #[command(override_usage = "oxiboot list [options]")]
    List(ListArgs),
}

#[derive(Args, Clone, Debug, Default)]
struct RunArgs {
    /// Path to plan file.
    #[arg(short, long, value_name = "path")]
    pub plan: Option<PathBuf>,

    /// Only evaluate presence checks, and report what would run.
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    /// Resume from given step number.
    #[arg(short, long, value_name = "step")]
    pub from_step: Option<usize>,
}

#[derive(Args, Clone, Debug)]
struct InitArgs {
    /// Path to write plan file to.
    #[arg(short, long, value_name = "path")]
    pub plan: Option<PathBuf>,

    /// Overwrite existing plan without asking.
    #[arg(long)]
    pub force: bool,
}

#[derive(Args, Clone, Debug)]
struct ListArgs {
    /// Path to plan file.
    #[arg(short, long, value_name = "path")]
    pub plan: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    let layer = fmt::layer()
        .compact()
        .with_target(false)
        .without_time();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .init();

    let code = match run().await {
        Ok(code) => code,
        Err(error) => {
            error!("{error:?}");
            EXIT_PRECONDITION
        }
    };

    exit(code)
}

async fn run() -> Result<i32> {
    Cli::parse().run().await
}

async fn run_plan(opts: RunArgs) -> Result<i32> {
    let plan = load_plan(opts.plan)?;
    let policy = plan.settings.privilege;
    let steps = plan.into_steps();
    let options = RunOptions {
        dry_run: opts.dry_run,
        from_step: opts.from_step,
    };

    // INVARIANT: Interrupts only stop the sequence between steps.
    let cancel = CancelToken::new();
    let listener = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, stopping after current step");
            listener.cancel();
        }
    });

    let report = tokio::task::spawn_blocking(move || -> Result<_> {
        let observer = ProgressObserver::new(steps.len())?;
        let mut sequencer = Sequencer::new()
            .options(options)
            .cancel_token(cancel)
            .privilege(policy)
            .observer(observer);
        Ok(sequencer.run(&steps)?)
    })
    .await??;

    print!("{report}");
    Ok(report.exit_code())
}

fn run_init(opts: InitArgs) -> Result<i32> {
    let path = plan_path(opts.plan)?;
    if path.exists() && !opts.force {
        let message = format!("overwrite existing plan at {}?", path.display());
        let overwrite = Confirm::new(&message).with_default(false).prompt()?;
        if !overwrite {
            info!("keep existing plan at {}", path.display());
            return Ok(EXIT_SUCCESS);
        }
    }

    if let Some(parent) = path.parent() {
        mkdirp::mkdirp(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }

    fs::write(&path, Plan::starter().to_string())
        .with_context(|| format!("failed to write plan to {}", path.display()))?;
    info!("wrote starter plan to {}", path.display());

    Ok(EXIT_SUCCESS)
}

fn run_list(opts: ListArgs) -> Result<i32> {
    let steps = load_plan(opts.plan)?.into_steps();
    for (index, step) in steps.iter().enumerate() {
        let critical = if step.is_critical() { " [critical]" } else { "" };
        println!(
            "{}. {}{critical} ({})",
            index + 1,
            step.name(),
            step.describe_check()
        );
    }

    Ok(EXIT_SUCCESS)
}

fn plan_path(path: Option<PathBuf>) -> Result<PathBuf> {
    match path {
        Some(path) => Ok(path),
        None => Ok(default_plan_path()?),
    }
}

fn load_plan(path: Option<PathBuf>) -> Result<Plan> {
    let path = plan_path(path)?;
    let data = fs::read_to_string(&path)
        .with_context(|| format!("failed to read plan at {}", path.display()))?;
    let plan = data
        .parse::<Plan>()
        .with_context(|| format!("invalid plan at {}", path.display()))?;

    Ok(plan)
}

/// Progress bar that tracks steps between actions.
///
/// Hidden while an action runs, because installers own the terminal then.
struct ProgressObserver {
    bar: ProgressBar,
}

impl ProgressObserver {
    fn new(total: usize) -> Result<Self> {
        let style = ProgressStyle::with_template(
            "{elapsed_precise:.green}  [{pos}/{len}]  {msg:<50}  [{wide_bar:.yellow/blue}]",
        )?
        .progress_chars("-Cco.");
        let bar = ProgressBar::new(total as u64);
        bar.set_style(style);

        Ok(Self { bar })
    }
}

impl SequenceObserver for ProgressObserver {
    fn step_starting(&mut self, ordinal: usize, _total: usize, name: &str) {
        self.bar.set_draw_target(ProgressDrawTarget::stderr());
        self.bar.set_position(ordinal as u64 - 1);
        self.bar.set_message(name.to_string());
    }

    fn action_starting(&mut self, _ordinal: usize, _total: usize, _name: &str) {
        self.bar.set_draw_target(ProgressDrawTarget::hidden());
    }

    fn step_finished(&mut self, result: &StepResult) {
        self.bar.set_draw_target(ProgressDrawTarget::stderr());
        self.bar.set_position(result.ordinal as u64);
    }
}

impl Drop for ProgressObserver {
    fn drop(&mut self) {
        self.bar.finish_and_clear();
    }
}
