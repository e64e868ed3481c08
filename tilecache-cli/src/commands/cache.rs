//! Cache management CLI commands.

use std::path::Path;

use clap::Subcommand;
use tilecache::storage::scan_stats;
use tilecache::telemetry::format_bytes;

use super::common::load_config;
use crate::error::CliError;

/// Cache action subcommands.
#[derive(Debug, Subcommand)]
pub enum CacheAction {
    /// Show disk cache statistics
    Stats,
}

/// Run a cache subcommand.
pub fn run(action: CacheAction, config_path: Option<&Path>) -> Result<(), CliError> {
    let config = load_config(config_path)?;
    let cache_dir = &config.cache.directory;

    match action {
        CacheAction::Stats => {
            println!("Disk cache: {}", cache_dir.display());

            match scan_stats(cache_dir) {
                Ok(stats) => {
                    println!("  Tiles: {}", stats.tiles);
                    println!("  Size:  {}", format_bytes(stats.bytes));
                    if stats.staged > 0 {
                        println!("  Incomplete writes: {}", stats.staged);
                    }
                    Ok(())
                }
                Err(e) => Err(CliError::CacheStats(e.to_string())),
            }
        }
    }
}
