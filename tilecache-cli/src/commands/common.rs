//! Common helpers shared across CLI commands.

use std::path::{Path, PathBuf};

use tilecache::config::{config_file_path, ConfigFile};

use crate::error::CliError;

/// Config file in effect: `--config` if given, else the default location.
pub fn resolve_config_path(explicit: Option<&Path>) -> PathBuf {
    explicit
        .map(Path::to_path_buf)
        .unwrap_or_else(config_file_path)
}

/// Load the config file in effect; a missing file yields defaults.
pub fn load_config(explicit: Option<&Path>) -> Result<ConfigFile, CliError> {
    Ok(ConfigFile::load_from(&resolve_config_path(explicit))?)
}
