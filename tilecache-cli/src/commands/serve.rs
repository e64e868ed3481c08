//! Serve command - run the tile cache server.

use std::path::{Path, PathBuf};

use tilecache::app::{ServerConfig, TileCacheApp};
use tilecache::config::ConfigFile;
use tilecache::logging::{init_logging, LoggingConfig};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::common::load_config;
use crate::error::CliError;

/// Command-line overrides for the serve command.
///
/// Every field left unset keeps the value from the config file.
#[derive(Debug, Default, Clone)]
pub struct ServeArgs {
    pub upstream: Option<String>,
    pub bind: Option<String>,
    pub port: Option<u16>,
    pub workers: Option<usize>,
    pub cache_dir: Option<PathBuf>,
    pub timeout: Option<u64>,
    pub strict_bounds: bool,
    pub log_level: Option<String>,
}

impl ServeArgs {
    /// Apply overrides on top of the loaded file.
    pub fn apply(&self, config: &mut ConfigFile) {
        if let Some(upstream) = &self.upstream {
            config.upstream.base_url = Some(upstream.clone());
        }
        if let Some(bind) = &self.bind {
            config.server.bind = bind.clone();
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(workers) = self.workers {
            config.server.workers = workers;
        }
        if let Some(dir) = &self.cache_dir {
            config.cache.directory = dir.clone();
        }
        if let Some(timeout) = self.timeout {
            config.upstream.timeout = timeout;
        }
        if self.strict_bounds {
            config.cache.strict_bounds = true;
        }
        if let Some(level) = &self.log_level {
            config.logging.level = level.clone();
        }
    }
}

/// Run the serve command.
pub fn run(args: ServeArgs, config_path: Option<&Path>) -> Result<(), CliError> {
    let mut config = load_config(config_path)?;
    args.apply(&mut config);

    let server_config = ServerConfig::from_config_file(&config)?;
    let _log_guard = init_logging(&LoggingConfig::from_config_file(&config))?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(server_config.workers)
        .thread_name("tilecache-worker")
        .enable_all()
        .build()
        .map_err(|e| CliError::Runtime(e.to_string()))?;

    runtime.block_on(serve(server_config))
}

async fn serve(config: ServerConfig) -> Result<(), CliError> {
    let workers = config.workers;
    let app = TileCacheApp::start(config).await?;

    println!("TileCache v{}", tilecache::VERSION);
    println!("  Listening: http://{}", app.local_addr());
    println!("  Upstream:  {}", app.config().upstream_url);
    println!("  Cache:     {}", app.config().cache_dir.display());
    println!("  Workers:   {}", workers);
    println!();
    println!("Press Ctrl+C to stop.");

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Shutdown requested");
                signal_token.cancel();
            }
            Err(e) => warn!(error = %e, "Failed to listen for Ctrl+C"),
        }
    });

    let summary = app.run_until(shutdown).await?;

    println!();
    println!("Session summary");
    if !summary.has_activity() {
        println!("  No requests served.");
        println!("  Uptime:    {}", summary.uptime_human());
        return Ok(());
    }
    println!("  Requests:  {}", summary.requests);
    println!(
        "  Hit rate:  {:.1}% ({} hits, {} misses)",
        summary.hit_rate() * 100.0,
        summary.hits,
        summary.misses
    );
    println!(
        "  Fetches:   {} ok, {} failed, {} coalesced",
        summary.fetches_succeeded, summary.fetches_failed, summary.coalesced
    );
    println!("  Fetched:   {}", summary.bytes_fetched_human());
    println!("  Uptime:    {}", summary.uptime_human());

    Ok(())
}
