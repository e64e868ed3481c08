//! Configuration file handling.
//!
//! Settings live in `~/.config/tilecache/config.ini`:
//!
//! ```ini
//! [upstream]
//! base_url = https://tiles.example.com/styles/osm-bright/
//! timeout = 10
//!
//! [server]
//! bind = 0.0.0.0
//! port = 8080
//! workers = 0
//!
//! [cache]
//! directory = ~/.cache/tilecache/tiles
//! io_timeout = 5
//! follower_grace = 5
//! strict_bounds = false
//!
//! [logging]
//! level = info
//! directory =
//! ```
//!
//! A missing file means all defaults. `upstream.base_url` has no default and
//! must be set (in the file or on the command line) before serving.

mod file;
mod keys;

pub use file::{
    config_directory, config_file_path, default_cache_directory, expand_tilde, CacheSettings,
    ConfigFile, LoggingSettings, ServerSettings, UpstreamSettings, DEFAULT_BIND,
    DEFAULT_FOLLOWER_GRACE_SECS, DEFAULT_IO_TIMEOUT_SECS, DEFAULT_LOG_LEVEL, DEFAULT_PORT,
    DEFAULT_UPSTREAM_TIMEOUT_SECS,
};
pub use keys::ConfigKey;

use std::path::PathBuf;

use thiserror::Error;

/// Errors loading, saving, or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {}: {reason}", path.display())]
    Read { path: PathBuf, reason: String },

    #[error("Failed to write config file {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid value '{value}' for {key}")]
    InvalidValue { key: String, value: String },

    #[error("Unknown configuration key '{0}'")]
    UnknownKey(String),

    #[error("No upstream configured: set upstream.base_url or pass --upstream")]
    MissingUpstream,

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
