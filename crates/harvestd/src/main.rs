//! harvestd — the HarvestGrid daemon.
//!
//! Runs cycle controllers against targets described by snapshot files in
//! the data directory, dispatching jobs onto the worker fleet.
//!
//! # Usage
//!
//! ```text
//! harvestd run joesguns                 # one target, forever
//! harvestd drain joesguns               # one harvest-everything cycle
//! harvestd fleet --targets 20           # top 20 targets concurrently
//! harvestd rank                         # refresh and print top_targets.json
//! harvestd plan joesguns --mode batch   # show the next plan, dispatch nothing
//! ```

use std::path::PathBuf;

use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use harvest_core::PlanMode;

mod commands;

const DEFAULT_FILTER: &str =
    "info,harvestd=debug,harvestgrid_scheduler=debug,harvestgrid_planner=debug";

#[derive(Parser)]
#[command(
    name = "harvestd",
    about = "HarvestGrid — batch scheduler for the extraction cycle",
    version,
    propagate_version = true
)]
struct Cli {
    /// Configuration file. Defaults apply when it does not exist.
    #[arg(long, global = true, default_value = "harvest.toml")]
    config: PathBuf,

    /// Override `paths.data_dir` from the configuration.
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Log output format.
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run cycles against one target until interrupted.
    Run {
        /// Target to work.
        target: Option<String>,
        /// Re-place payloads on every node even when already present.
        #[arg(long)]
        force: bool,
        /// Scheduling variant (threshold, batch, drain).
        #[arg(long)]
        mode: Option<PlanMode>,
    },
    /// Harvest a target's entire value in a single cycle.
    Drain {
        target: Option<String>,
        #[arg(long)]
        force: bool,
    },
    /// Rank targets and run the best of them concurrently.
    Fleet {
        /// Number of targets (0 derives it from operator skill).
        #[arg(long, value_parser = clap::value_parser!(u32).range(0..=99))]
        targets: Option<u32>,
        #[arg(long)]
        force: bool,
    },
    /// Refresh and print the ranked-target list.
    Rank {
        #[arg(long, value_parser = clap::value_parser!(u32).range(0..=99))]
        targets: Option<u32>,
    },
    /// Print the next plan for a target without dispatching anything.
    Plan {
        target: Option<String>,
        #[arg(long)]
        mode: Option<PlanMode>,
    },
    /// Print the effective configuration as TOML.
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    let Some(command) = cli.command else {
        Cli::command().print_help()?;
        return Ok(());
    };

    let ctx = commands::Context::load(&cli.config, cli.data_dir.as_deref())?;

    match command {
        Command::Run {
            target,
            force,
            mode,
        } => match target {
            Some(target) => commands::run::run(&ctx, &target, force, mode).await,
            None => print_usage("run"),
        },
        Command::Drain { target, force } => match target {
            Some(target) => commands::run::drain(&ctx, &target, force).await,
            None => print_usage("drain"),
        },
        Command::Fleet { targets, force } => commands::fleet::fleet(&ctx, targets, force).await,
        Command::Rank { targets } => commands::rank::rank(&ctx, targets),
        Command::Plan { target, mode } => match target {
            Some(target) => commands::plan::plan(&ctx, &target, mode),
            None => print_usage("plan"),
        },
        Command::Config => commands::print_config(&ctx),
    }
}

fn init_tracing(format: LogFormat) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    match format {
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
    }
}

/// A missing target is not an error: show how to call the subcommand.
fn print_usage(subcommand: &str) -> anyhow::Result<()> {
    let mut cmd = Cli::command();
    match cmd.find_subcommand_mut(subcommand) {
        Some(sub) => sub.print_help()?,
        None => cmd.print_help()?,
    }
    Ok(())
}
