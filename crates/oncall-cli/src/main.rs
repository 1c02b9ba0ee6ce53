//! # oncall CLI entry point
//!
//! Parses command-line arguments, builds the engine from settings and the
//! environment, and dispatches to the subcommand handlers.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use oncall_cli::commands::{
    run_apply, run_destroy, run_import, run_plan, run_refresh, ApplyArgs, ImportArgs, PlanArgs,
    StateArgs,
};
use oncall_cli::settings::Settings;
use oncall_client::HttpScheduleClient;
use oncall_engine::ScheduleEngine;

/// Declarative on-call schedule management.
#[derive(Parser, Debug)]
#[command(name = "oncall", version, about, long_about = None)]
struct Cli {
    /// Enable verbose output. Repeat for more verbosity (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Path to a YAML settings file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create or update the schedule to match a desired file.
    Apply(ApplyArgs),

    /// Show the changes `apply` would make, without making them.
    Plan(PlanArgs),

    /// Re-read the schedule from the server into the state file.
    Refresh(StateArgs),

    /// Delete the schedule and its state file.
    Destroy(StateArgs),

    /// Adopt an existing schedule by id.
    Import(ImportArgs),
}

async fn run(cli: Cli) -> Result<u8> {
    let settings = Settings::load(cli.config.as_deref())?;
    let client = HttpScheduleClient::new(settings.api_config()?)?;
    let engine = ScheduleEngine::new(client, settings.engine_config());

    match &cli.command {
        Commands::Apply(args) => run_apply(&engine, args).await,
        Commands::Plan(args) => run_plan(&engine, args).await,
        Commands::Refresh(args) => run_refresh(&engine, args).await,
        Commands::Destroy(args) => run_destroy(&engine, args).await,
        Commands::Import(args) => run_import(&engine, args).await,
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => EnvFilter::new("warn"),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    match run(cli).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::from(1)
        }
    }
}
