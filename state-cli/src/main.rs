//! # state-cli
//!
//! CLI tool for inspecting and evolving persisted 0k-Sync client state.
//!
//! ## Commands
//!
//! - `init`: Create the identity and persist a fresh snapshot
//! - `show`: Print the persisted snapshot (never key bytes)
//! - `rename`: Change the client display name
//! - `set-control`: Cache a fetched control record
//! - `clear-timestamps`: Forget fetch and upload timestamps
//!
//! ## Example
//!
//! ```bash
//! # Initialize client state
//! state-cli init --name "Kitchen iPad"
//!
//! # Cache a control record fetched at server time 1700000000
//! state-cli set-control --file global.json --timestamp 1700000000
//!
//! # Inspect
//! state-cli show
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;
mod config;
mod session;

use commands::{clear_timestamps, init, rename, set_control, show};
use config::Config;

/// CLI tool for inspecting and evolving persisted 0k-Sync client state.
#[derive(Parser, Debug)]
#[command(name = "state-cli")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Data directory holding the identity, config and state files
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Configuration file (default: state.toml in the data directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Passphrase (will prompt if not provided)
    #[arg(long, short, global = true)]
    passphrase: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create the identity and persist a fresh snapshot
    Init {
        /// Client name (defaults to the configured name)
        #[arg(long, short)]
        name: Option<String>,
    },

    /// Print the persisted snapshot
    Show,

    /// Change the client display name
    Rename {
        /// New client name
        #[arg(long, short)]
        name: String,
    },

    /// Cache a fetched control record
    SetControl {
        /// JSON file holding the control record
        #[arg(long, short)]
        file: PathBuf,

        /// Server timestamp the record was fetched at
        #[arg(long, short)]
        timestamp: u64,

        /// Treat the record as a new sync epoch
        #[arg(long, conflicts_with = "adopt_engines")]
        fresh_start: bool,

        /// Mirror the record's engine choices into the local configuration
        #[arg(long)]
        adopt_engines: bool,
    },

    /// Forget every fetch and upload timestamp
    ClearTimestamps,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Determine data directory
    let data_dir = match cli.data_dir {
        Some(dir) => dir,
        None => default_data_dir()?,
    };

    // Ensure data directory exists
    std::fs::create_dir_all(&data_dir).context("Failed to create data directory")?;

    let config = Config::load(cli.config.as_deref(), &data_dir)?;
    init_tracing(&config);

    let passphrase = session::resolve_passphrase(cli.passphrase.as_deref())?;

    match cli.command {
        Commands::Init { name } => {
            init::run(&data_dir, &config, &passphrase, name.as_deref())?;
        }
        Commands::Show => {
            show::run(&data_dir, &config, &passphrase)?;
        }
        Commands::Rename { name } => {
            rename::run(&data_dir, &config, &passphrase, &name)?;
        }
        Commands::SetControl {
            file,
            timestamp,
            fresh_start,
            adopt_engines,
        } => {
            let options = set_control::SetControlOptions {
                file: &file,
                timestamp,
                fresh_start,
                adopt_engines,
            };
            set_control::run(&data_dir, &config, &passphrase, &options)?;
        }
        Commands::ClearTimestamps => {
            clear_timestamps::run(&data_dir, &config, &passphrase)?;
        }
    }

    Ok(())
}

/// Log to stderr. `RUST_LOG` overrides the configured filter.
fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Get the default data directory for state-cli.
fn default_data_dir() -> Result<PathBuf> {
    let dirs = directories::ProjectDirs::from("io", "zerok", "state-cli")
        .context("Could not determine home directory")?;
    Ok(dirs.data_dir().to_path_buf())
}
