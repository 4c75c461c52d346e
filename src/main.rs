//! CLI entry point for jobsweep.

use anyhow::Result;
use clap::Parser;
use tracing::debug;

mod cli;
mod commands;
mod progress;

use cli::{Args, Command};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Determine log level based on verbose/quiet flags
    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt().with_env_filter(filter).init();

    debug!(?args, "CLI arguments parsed");

    match &args.command {
        Command::Simulate {
            platform,
            jobs,
            limit_after,
            persist,
        } => {
            commands::run_simulate_command(
                &args.db,
                *platform,
                *jobs,
                *limit_after,
                *persist,
                args.quiet,
            )
            .await
        }
        Command::Salary { text, min_k, max_k } => {
            commands::run_salary_command(text, *min_k, *max_k)
        }
        Command::Blacklist { action } => commands::run_blacklist_command(&args.db, action).await,
        Command::History { platform, status } => {
            commands::run_history_command(&args.db, *platform, *status).await
        }
        Command::Auth { action } => commands::run_auth_command(action),
        Command::Config { action } => commands::run_config_command(&args.db, action).await,
    }
}
