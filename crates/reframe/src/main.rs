//! Reframe - session-scoped image transform service
//!
//! Main entry point for the Reframe CLI.

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;

use commands::{config, start, worker};

// ─────────────────────────────────────────────────────────────────────────────
// CLI Structure
// ─────────────────────────────────────────────────────────────────────────────

/// Reframe - session-scoped image transform service
#[derive(Parser)]
#[command(name = "reframe")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the Reframe service
    Start(start::StartArgs),

    /// Run a single transform worker (spawned by `start`)
    #[command(hide = true)]
    Worker(worker::WorkerArgs),

    /// Configuration management
    Config(config::ConfigArgs),
}

// ─────────────────────────────────────────────────────────────────────────────
// Main
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Workers share the log directory but write their own file.
    let log_file = match &cli.command {
        Commands::Worker(args) => format!("reframe-worker-{}.log", args.index),
        _ => "reframe.log".to_string(),
    };

    // Console (human-readable) + rotating JSON file
    let filter = if cli.verbose {
        "reframe=debug,reframe_server=debug,reframe_session=debug,reframe_image=debug,reframe_config=debug,info"
    } else {
        "reframe=info,reframe_server=info,reframe_session=info,warn"
    };

    let log_dir = reframe_config::xdg_config_dir()
        .map(|d| d.join("logs"))
        .unwrap_or_else(|| std::path::PathBuf::from("logs"));
    let file_appender = tracing_appender::rolling::daily(&log_dir, log_file);
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    use tracing_subscriber::prelude::*;
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_writer(std::io::stderr)
                .with_filter(tracing_subscriber::EnvFilter::new(filter)),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(non_blocking)
                .with_filter(tracing_subscriber::EnvFilter::new(
                    "reframe=trace,reframe_server=trace,reframe_session=trace,reframe_image=trace,reframe_config=trace,info",
                )),
        )
        .init();

    let ctx = commands::Context {
        verbose: cli.verbose,
    };

    match cli.command {
        Commands::Start(args) => start::run(args, &ctx).await,
        Commands::Worker(args) => worker::run(args, &ctx).await,
        Commands::Config(args) => config::run(args, &ctx).await,
    }
}
