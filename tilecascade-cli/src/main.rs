//! tilecascade CLI - command-line interface
//!
//! Fetches single tiles through the full provider chain and manages the
//! disk cache and configuration file.

mod commands;
mod error;
mod runner;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use commands::cache::CacheAction;
use commands::config::ConfigCommands;
use commands::fetch::FetchArgs;
use error::CliError;

#[derive(Parser)]
#[command(name = "tilecascade")]
#[command(version, about = "Layered map tile resolution with offline fallback", long_about = None)]
struct Cli {
    /// Configuration file (default: ~/.tilecascade/config.ini)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Also log to the console
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve one tile and write it to a file
    Fetch(FetchArgs),

    /// Disk cache management
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },

    /// Configuration file management
    Config {
        #[command(subcommand)]
        action: ConfigCommands,
    },
}

fn main() {
    let cli = Cli::parse();

    let result: Result<(), CliError> = match cli.command {
        Commands::Fetch(args) => commands::fetch::run(args, cli.config.as_deref(), cli.verbose),
        Commands::Cache { action } => commands::cache::run(action, cli.config.as_deref()),
        Commands::Config { action } => commands::config::run(action, cli.config.as_deref()),
    };

    if let Err(e) = result {
        e.exit();
    }
}
