//! NavPilot CLI — the main entry point.
//!
//! Commands:
//! - `run`      — Drive a surface toward a goal
//! - `plan`     — Run a multi-step toolset plan from a file
//! - `onboard`  — Write a default configuration
//! - `doctor`   — Diagnose configuration and provider health

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(
    name = "navpilot",
    about = "NavPilot — goal-driven web and desktop automation",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the agent until the goal is met
    Run {
        /// The goal, in plain language
        goal: String,

        /// Override the configured surface (web or desktop)
        #[arg(short, long)]
        surface: Option<String>,

        /// Abort after this many iterations
        #[arg(long)]
        max_iterations: Option<u32>,
    },

    /// Run a toolset plan (TOML or JSON)
    Plan {
        /// Path to the plan file
        file: PathBuf,

        /// Override the configured surface (web or desktop)
        #[arg(short, long)]
        surface: Option<String>,
    },

    /// Initialize configuration
    Onboard,

    /// Diagnose system health
    Doctor,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    match cli.command {
        Commands::Run {
            goal,
            surface,
            max_iterations,
        } => commands::run::run(goal, surface, max_iterations).await?,
        Commands::Plan { file, surface } => commands::plan::run(file, surface).await?,
        Commands::Onboard => commands::onboard::run().await?,
        Commands::Doctor => commands::doctor::run().await?,
    }

    Ok(())
}
