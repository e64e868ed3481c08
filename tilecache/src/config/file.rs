//! INI configuration file.

use std::path::{Path, PathBuf};

use ini::Ini;

use super::ConfigError;

/// Directory name used under the platform config and cache directories.
const APP_DIR: &str = "tilecache";

/// Configuration file name.
const CONFIG_FILE: &str = "config.ini";

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_BIND: &str = "0.0.0.0";
pub const DEFAULT_UPSTREAM_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_IO_TIMEOUT_SECS: u64 = 5;
pub const DEFAULT_FOLLOWER_GRACE_SECS: u64 = 5;
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// `~/.config/tilecache`
pub fn config_directory() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}

/// `~/.config/tilecache/config.ini`
pub fn config_file_path() -> PathBuf {
    config_directory().join(CONFIG_FILE)
}

/// `~/.cache/tilecache/tiles`
pub fn default_cache_directory() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
        .join("tiles")
}

/// Expand a leading `~/` to the home directory.
pub fn expand_tilde(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ if path == "~" => dirs::home_dir().unwrap_or_else(|| PathBuf::from(path)),
        _ => PathBuf::from(path),
    }
}

/// `[upstream]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamSettings {
    /// Base URL tiles are fetched from. Required to serve.
    pub base_url: Option<String>,
    /// Fetch timeout in seconds.
    pub timeout: u64,
}

/// `[server]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSettings {
    pub bind: String,
    pub port: u16,
    /// Worker threads; 0 selects automatically.
    pub workers: usize,
}

/// `[cache]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheSettings {
    pub directory: PathBuf,
    /// Tile read timeout in seconds.
    pub io_timeout: u64,
    /// Extra seconds a coalesced request waits beyond the fetch timeout.
    pub follower_grace: u64,
    /// Reject coordinates outside the `2^zoom` grid.
    pub strict_bounds: bool,
}

/// `[logging]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingSettings {
    pub level: String,
    /// Directory for daily log files; `None` logs to stderr only.
    pub directory: Option<PathBuf>,
}

/// Contents of `config.ini`.
///
/// Missing sections and keys fall back to defaults; unknown keys are ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigFile {
    pub upstream: UpstreamSettings,
    pub server: ServerSettings,
    pub cache: CacheSettings,
    pub logging: LoggingSettings,
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            upstream: UpstreamSettings {
                base_url: None,
                timeout: DEFAULT_UPSTREAM_TIMEOUT_SECS,
            },
            server: ServerSettings {
                bind: DEFAULT_BIND.to_string(),
                port: DEFAULT_PORT,
                workers: 0,
            },
            cache: CacheSettings {
                directory: default_cache_directory(),
                io_timeout: DEFAULT_IO_TIMEOUT_SECS,
                follower_grace: DEFAULT_FOLLOWER_GRACE_SECS,
                strict_bounds: false,
            },
            logging: LoggingSettings {
                level: DEFAULT_LOG_LEVEL.to_string(),
                directory: None,
            },
        }
    }
}

impl ConfigFile {
    /// Load from the default location, or defaults if the file is absent.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&config_file_path())
    }

    /// Load from `path`, or defaults if the file is absent.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let ini = Ini::load_from_file(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Self::from_ini(&ini)
    }

    /// Parse an already loaded INI document.
    pub fn from_ini(ini: &Ini) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(section) = ini.section(Some("upstream")) {
            if let Some(v) = non_empty(section.get("base_url")) {
                config.upstream.base_url = Some(v.to_string());
            }
            if let Some(v) = non_empty(section.get("timeout")) {
                config.upstream.timeout = parse_value("upstream", "timeout", v)?;
            }
        }

        if let Some(section) = ini.section(Some("server")) {
            if let Some(v) = non_empty(section.get("bind")) {
                config.server.bind = v.to_string();
            }
            if let Some(v) = non_empty(section.get("port")) {
                config.server.port = parse_value("server", "port", v)?;
            }
            if let Some(v) = non_empty(section.get("workers")) {
                config.server.workers = parse_value("server", "workers", v)?;
            }
        }

        if let Some(section) = ini.section(Some("cache")) {
            if let Some(v) = non_empty(section.get("directory")) {
                config.cache.directory = expand_tilde(v);
            }
            if let Some(v) = non_empty(section.get("io_timeout")) {
                config.cache.io_timeout = parse_value("cache", "io_timeout", v)?;
            }
            if let Some(v) = non_empty(section.get("follower_grace")) {
                config.cache.follower_grace = parse_value("cache", "follower_grace", v)?;
            }
            if let Some(v) = non_empty(section.get("strict_bounds")) {
                config.cache.strict_bounds = parse_bool("cache", "strict_bounds", v)?;
            }
        }

        if let Some(section) = ini.section(Some("logging")) {
            if let Some(v) = non_empty(section.get("level")) {
                config.logging.level = v.to_string();
            }
            if let Some(v) = non_empty(section.get("directory")) {
                config.logging.directory = Some(expand_tilde(v));
            }
        }

        Ok(config)
    }

    /// Render as an INI document.
    pub fn to_ini(&self) -> Ini {
        let mut ini = Ini::new();
        ini.with_section(Some("upstream"))
            .set(
                "base_url",
                self.upstream.base_url.clone().unwrap_or_default(),
            )
            .set("timeout", self.upstream.timeout.to_string());
        ini.with_section(Some("server"))
            .set("bind", self.server.bind.clone())
            .set("port", self.server.port.to_string())
            .set("workers", self.server.workers.to_string());
        ini.with_section(Some("cache"))
            .set("directory", self.cache.directory.display().to_string())
            .set("io_timeout", self.cache.io_timeout.to_string())
            .set("follower_grace", self.cache.follower_grace.to_string())
            .set("strict_bounds", self.cache.strict_bounds.to_string());
        ini.with_section(Some("logging"))
            .set("level", self.logging.level.clone())
            .set(
                "directory",
                self.logging
                    .directory
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_default(),
            );
        ini
    }

    /// Save to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&config_file_path())
    }

    /// Save to `path`, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Write {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }
        self.to_ini()
            .write_to_file(path)
            .map_err(|e| ConfigError::Write {
                path: path.to_path_buf(),
                source: e,
            })
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

pub(crate) fn parse_value<T: std::str::FromStr>(
    section: &'static str,
    key: &'static str,
    value: &str,
) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: format!("{}.{}", section, key),
        value: value.to_string(),
    })
}

pub(crate) fn parse_bool(
    section: &'static str,
    key: &'static str,
    value: &str,
) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Ok(true),
        "false" | "no" | "off" | "0" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: format!("{}.{}", section, key),
            value: value.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = ConfigFile::load_from(&dir.path().join("absent.ini")).unwrap();
        assert_eq!(config, ConfigFile::default());
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.upstream.timeout, 10);
        assert!(config.upstream.base_url.is_none());
    }

    #[test]
    fn test_parse_all_sections() {
        let ini = Ini::load_from_str(
            "[upstream]\n\
             base_url = https://tiles.example.com/osm\n\
             timeout = 20\n\
             [server]\n\
             bind = 127.0.0.1\n\
             port = 9000\n\
             workers = 16\n\
             [cache]\n\
             directory = /var/cache/tiles\n\
             io_timeout = 3\n\
             follower_grace = 7\n\
             strict_bounds = yes\n\
             [logging]\n\
             level = debug\n\
             directory = /var/log/tilecache\n",
        )
        .unwrap();

        let config = ConfigFile::from_ini(&ini).unwrap();

        assert_eq!(
            config.upstream.base_url.as_deref(),
            Some("https://tiles.example.com/osm")
        );
        assert_eq!(config.upstream.timeout, 20);
        assert_eq!(config.server.bind, "127.0.0.1");
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.workers, 16);
        assert_eq!(config.cache.directory, PathBuf::from("/var/cache/tiles"));
        assert_eq!(config.cache.io_timeout, 3);
        assert_eq!(config.cache.follower_grace, 7);
        assert!(config.cache.strict_bounds);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(
            config.logging.directory,
            Some(PathBuf::from("/var/log/tilecache"))
        );
    }

    #[test]
    fn test_empty_values_keep_defaults() {
        let ini = Ini::load_from_str("[upstream]\nbase_url =\n[logging]\ndirectory =\n").unwrap();
        let config = ConfigFile::from_ini(&ini).unwrap();
        assert!(config.upstream.base_url.is_none());
        assert!(config.logging.directory.is_none());
    }

    #[test]
    fn test_invalid_number_is_reported() {
        let ini = Ini::load_from_str("[server]\nport = eighty\n").unwrap();
        let err = ConfigFile::from_ini(&ini).unwrap_err();
        assert!(err.to_string().contains("server.port"));
        assert!(err.to_string().contains("eighty"));
    }

    #[test]
    fn test_invalid_bool_is_reported() {
        let ini = Ini::load_from_str("[cache]\nstrict_bounds = maybe\n").unwrap();
        assert!(matches!(
            ConfigFile::from_ini(&ini),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.ini");

        let mut config = ConfigFile::default();
        config.upstream.base_url = Some("http://localhost:9999/".to_string());
        config.server.port = 8181;
        config.logging.directory = Some(dir.path().join("logs"));
        config.save_to(&path).unwrap();

        assert_eq!(ConfigFile::load_from(&path).unwrap(), config);
    }

    #[test]
    fn test_expand_tilde() {
        assert_eq!(expand_tilde("/abs/path"), PathBuf::from("/abs/path"));
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_tilde("~/tiles"), home.join("tiles"));
        }
    }
}
