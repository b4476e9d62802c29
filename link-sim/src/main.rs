//! # wristlink-sim
//!
//! Drives a primary and a companion endpoint over the in-memory loopback
//! link and reports what was delivered where.
//!
//! ## Commands
//!
//! - `run`: Run a scripted session with outages and a dropped session
//! - `check-config`: Validate an engine configuration file
//!
//! ## Example
//!
//! ```bash
//! # Default session
//! wristlink-sim run
//!
//! # Longer session, outage every 12 steps, JSON summary
//! wristlink-sim run --steps 120 --outage-every 12 --json
//!
//! # Validate a config file
//! wristlink-sim check-config wristlink.toml
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;

use commands::{check, run};

/// Scripted primary/companion session simulator.
#[derive(Parser, Debug)]
#[command(name = "wristlink-sim")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(long, short, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Only log warnings and errors
    #[arg(long, short, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a scripted session and print a delivery summary
    Run {
        /// Engine configuration file (TOML)
        #[arg(long, short)]
        config: Option<PathBuf>,

        /// Number of script steps
        #[arg(long, default_value = "40")]
        steps: u32,

        /// Wall-clock duration of one step in milliseconds
        #[arg(long, default_value = "50")]
        step_ms: u64,

        /// Take the link down for half of every N steps (0 = never)
        #[arg(long, default_value = "16")]
        outage_every: u32,

        /// Print the summary as JSON
        #[arg(long)]
        json: bool,
    },

    /// Validate an engine configuration file
    CheckConfig {
        /// Path to the TOML file
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.quiet {
        EnvFilter::new("warn")
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Run {
            config,
            steps,
            step_ms,
            outage_every,
            json,
        } => {
            let script = run::Script {
                steps,
                step_ms,
                outage_every,
            };
            run::run(config.as_deref(), script, json).await?;
        }
        Commands::CheckConfig { path } => {
            check::run(&path)?;
        }
    }

    Ok(())
}
