mod cli;

use anyhow::Result;
use clap::{Parser, Subcommand};
use cli::handlers;
use cli::settings::{ModeOverride, Settings};
use infrautomater_core::models::LogLevel;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "infrautomater")]
#[command(version)]
#[command(about = "Provisioning worker for approved infrastructure requests")]
#[command(
    help_template = "{name} - {version}\n{about}\n\n{usage-heading}\n  {usage}\n\n{all-args}{options}\n"
)]
struct Cli {
    /// Path to the worker configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Apply plans for real
    #[arg(long, global = true, conflicts_with = "dry_run")]
    live: bool,

    /// Plan only, never apply (the default)
    #[arg(long, global = true)]
    dry_run: bool,

    /// Logging level (error, warn, info, debug, trace)
    #[arg(long, global = true)]
    log_level: Option<LogLevel>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Provision one approved request, retrying transient failures
    ///
    /// Examples:
    ///   infrautomater provision 42
    ///   infrautomater --live provision 42 --json
    Provision {
        /// Request id
        request_id: i64,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Destroy the resource of a request and remove its workspace
    Destroy {
        /// Request id
        request_id: i64,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Run the worker loop, provisioning approved requests as they appear
    Run {
        /// Seconds between store polls (overrides the configuration)
        #[arg(long)]
        poll_interval: Option<u64>,

        /// Do not re-drive requests stuck in provisioning
        #[arg(long)]
        no_reconcile: bool,
    },

    /// List requests stuck in provisioning
    Reconcile {
        /// Move them back to approved and provision them again
        #[arg(long)]
        redrive: bool,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Show a request's status and audit notes
    Status {
        /// Request id
        request_id: i64,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Validate the configuration and look for the provisioning binary
    Check {
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mode = if cli.live {
        Some(ModeOverride::Live)
    } else if cli.dry_run {
        Some(ModeOverride::DryRun)
    } else {
        None
    };
    let settings = Settings::load(cli.config.as_deref(), mode, cli.log_level)?;

    // A second subscriber (e.g. under test harnesses) is not fatal
    if let Err(e) = infrautomater_core::services::logging::init_logging(settings.config.log_level)
    {
        eprintln!("Logging not initialised: {}", e);
    }

    match cli.command {
        Commands::Provision { request_id, json } => {
            handlers::handle_provision(&settings, request_id, json).await?;
        }
        Commands::Destroy { request_id, json } => {
            handlers::handle_destroy(&settings, request_id, json).await?;
        }
        Commands::Run {
            poll_interval,
            no_reconcile,
        } => {
            handlers::handle_run(&settings, poll_interval, !no_reconcile).await?;
        }
        Commands::Reconcile { redrive, json } => {
            handlers::handle_reconcile(&settings, redrive, json).await?;
        }
        Commands::Status { request_id, json } => {
            handlers::handle_status(&settings, request_id, json)?;
        }
        Commands::Check { json } => {
            handlers::handle_check(&settings, json).await?;
        }
    }

    Ok(())
}
