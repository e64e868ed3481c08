//! TileCache CLI - Command-line interface
//!
//! Runs the read-through tile cache server and manages its configuration and
//! on-disk cache.

mod commands;
mod error;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use commands::cache::CacheAction;
use commands::config::ConfigCommands;
use commands::serve::ServeArgs;
use error::CliError;

#[derive(Debug, Parser)]
#[command(name = "tilecache", version, about = "Read-through disk cache for map tiles")]
struct Cli {
    /// Path to config.ini (default: ~/.config/tilecache/config.ini)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run the tile cache server
    Serve {
        /// Upstream tile server base URL
        #[arg(long)]
        upstream: Option<String>,

        /// Address to bind (default: 0.0.0.0)
        #[arg(long)]
        bind: Option<String>,

        /// Port to listen on (default: 8080)
        #[arg(long, short)]
        port: Option<u16>,

        /// Worker threads (default: max(CPU count, 4))
        #[arg(long)]
        workers: Option<usize>,

        /// Tile cache directory
        #[arg(long)]
        cache_dir: Option<PathBuf>,

        /// Upstream fetch timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,

        /// Reject coordinates outside the tile grid for their zoom
        #[arg(long)]
        strict_bounds: bool,

        /// Log level or filter directive (e.g. debug, tilecache=trace)
        #[arg(long)]
        log_level: Option<String>,
    },

    /// Manage the disk cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },

    /// View or edit configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Serve {
            upstream,
            bind,
            port,
            workers,
            cache_dir,
            timeout,
            strict_bounds,
            log_level,
        } => commands::serve::run(
            ServeArgs {
                upstream,
                bind,
                port,
                workers,
                cache_dir,
                timeout,
                strict_bounds,
                log_level,
            },
            config_path,
        ),
        Commands::Cache { action } => commands::cache::run(action, config_path),
        Commands::Config { command } => commands::config::run(command, config_path),
    }
}
