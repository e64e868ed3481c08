//! CLI error type.

use thiserror::Error;
use tilecache::app::AppError;
use tilecache::config::ConfigError;
use tilecache::logging::LoggingError;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("{0}")]
    Config(String),

    #[error(transparent)]
    ConfigFile(#[from] ConfigError),

    #[error(transparent)]
    Logging(#[from] LoggingError),

    #[error("Failed to create Tokio runtime: {0}")]
    Runtime(String),

    #[error(transparent)]
    Serve(#[from] AppError),

    #[error("Failed to read cache statistics: {0}")]
    CacheStats(String),
}
