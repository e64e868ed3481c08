//! Addressable configuration keys (`section.key`) for the CLI.

use std::str::FromStr;

use super::file::{expand_tilde, parse_bool, parse_value, ConfigFile};
use super::ConfigError;

/// A single settable value in [`ConfigFile`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigKey {
    UpstreamBaseUrl,
    UpstreamTimeout,
    ServerBind,
    ServerPort,
    ServerWorkers,
    CacheDirectory,
    CacheIoTimeout,
    CacheFollowerGrace,
    CacheStrictBounds,
    LoggingLevel,
    LoggingDirectory,
}

impl ConfigKey {
    /// Every key, in file order.
    pub fn all() -> &'static [ConfigKey] {
        &[
            ConfigKey::UpstreamBaseUrl,
            ConfigKey::UpstreamTimeout,
            ConfigKey::ServerBind,
            ConfigKey::ServerPort,
            ConfigKey::ServerWorkers,
            ConfigKey::CacheDirectory,
            ConfigKey::CacheIoTimeout,
            ConfigKey::CacheFollowerGrace,
            ConfigKey::CacheStrictBounds,
            ConfigKey::LoggingLevel,
            ConfigKey::LoggingDirectory,
        ]
    }

    pub fn section(&self) -> &'static str {
        match self {
            ConfigKey::UpstreamBaseUrl | ConfigKey::UpstreamTimeout => "upstream",
            ConfigKey::ServerBind | ConfigKey::ServerPort | ConfigKey::ServerWorkers => "server",
            ConfigKey::CacheDirectory
            | ConfigKey::CacheIoTimeout
            | ConfigKey::CacheFollowerGrace
            | ConfigKey::CacheStrictBounds => "cache",
            ConfigKey::LoggingLevel | ConfigKey::LoggingDirectory => "logging",
        }
    }

    pub fn key_name(&self) -> &'static str {
        match self {
            ConfigKey::UpstreamBaseUrl => "base_url",
            ConfigKey::UpstreamTimeout => "timeout",
            ConfigKey::ServerBind => "bind",
            ConfigKey::ServerPort => "port",
            ConfigKey::ServerWorkers => "workers",
            ConfigKey::CacheDirectory => "directory",
            ConfigKey::CacheIoTimeout => "io_timeout",
            ConfigKey::CacheFollowerGrace => "follower_grace",
            ConfigKey::CacheStrictBounds => "strict_bounds",
            ConfigKey::LoggingLevel => "level",
            ConfigKey::LoggingDirectory => "directory",
        }
    }

    /// Full `section.key` name.
    pub fn name(&self) -> String {
        format!("{}.{}", self.section(), self.key_name())
    }

    /// Current value rendered as text; empty when unset.
    pub fn get(&self, config: &ConfigFile) -> String {
        match self {
            ConfigKey::UpstreamBaseUrl => config.upstream.base_url.clone().unwrap_or_default(),
            ConfigKey::UpstreamTimeout => config.upstream.timeout.to_string(),
            ConfigKey::ServerBind => config.server.bind.clone(),
            ConfigKey::ServerPort => config.server.port.to_string(),
            ConfigKey::ServerWorkers => config.server.workers.to_string(),
            ConfigKey::CacheDirectory => config.cache.directory.display().to_string(),
            ConfigKey::CacheIoTimeout => config.cache.io_timeout.to_string(),
            ConfigKey::CacheFollowerGrace => config.cache.follower_grace.to_string(),
            ConfigKey::CacheStrictBounds => config.cache.strict_bounds.to_string(),
            ConfigKey::LoggingLevel => config.logging.level.clone(),
            ConfigKey::LoggingDirectory => config
                .logging
                .directory
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_default(),
        }
    }

    /// Parse `value` and store it. An empty value clears optional keys.
    pub fn set(&self, config: &mut ConfigFile, value: &str) -> Result<(), ConfigError> {
        let value = value.trim();
        let section = self.section();
        let key = self.key_name();
        match self {
            ConfigKey::UpstreamBaseUrl => {
                config.upstream.base_url = (!value.is_empty()).then(|| value.to_string());
            }
            ConfigKey::UpstreamTimeout => config.upstream.timeout = parse_value(section, key, value)?,
            ConfigKey::ServerBind => config.server.bind = value.to_string(),
            ConfigKey::ServerPort => config.server.port = parse_value(section, key, value)?,
            ConfigKey::ServerWorkers => config.server.workers = parse_value(section, key, value)?,
            ConfigKey::CacheDirectory => config.cache.directory = expand_tilde(value),
            ConfigKey::CacheIoTimeout => config.cache.io_timeout = parse_value(section, key, value)?,
            ConfigKey::CacheFollowerGrace => {
                config.cache.follower_grace = parse_value(section, key, value)?
            }
            ConfigKey::CacheStrictBounds => {
                config.cache.strict_bounds = parse_bool(section, key, value)?
            }
            ConfigKey::LoggingLevel => config.logging.level = value.to_string(),
            ConfigKey::LoggingDirectory => {
                config.logging.directory = (!value.is_empty()).then(|| expand_tilde(value));
            }
        }
        Ok(())
    }
}

impl FromStr for ConfigKey {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ConfigKey::all()
            .iter()
            .copied()
            .find(|k| k.name() == s)
            .ok_or_else(|| ConfigError::UnknownKey(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_parse_key_names() {
        assert_eq!(
            "upstream.base_url".parse::<ConfigKey>().unwrap(),
            ConfigKey::UpstreamBaseUrl
        );
        assert_eq!(
            "cache.directory".parse::<ConfigKey>().unwrap(),
            ConfigKey::CacheDirectory
        );
        assert_eq!(
            "logging.directory".parse::<ConfigKey>().unwrap(),
            ConfigKey::LoggingDirectory
        );
        assert!(matches!(
            "cache.size".parse::<ConfigKey>(),
            Err(ConfigError::UnknownKey(_))
        ));
    }

    #[test]
    fn test_names_are_unique() {
        let mut names: Vec<String> = ConfigKey::all().iter().map(|k| k.name()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), ConfigKey::all().len());
    }

    #[test]
    fn test_set_and_get() {
        let mut config = ConfigFile::default();

        ConfigKey::ServerPort.set(&mut config, "9090").unwrap();
        ConfigKey::CacheStrictBounds.set(&mut config, "true").unwrap();
        ConfigKey::CacheDirectory.set(&mut config, "/srv/tiles").unwrap();
        ConfigKey::UpstreamBaseUrl
            .set(&mut config, "https://tiles.example.com/")
            .unwrap();

        assert_eq!(ConfigKey::ServerPort.get(&config), "9090");
        assert_eq!(ConfigKey::CacheStrictBounds.get(&config), "true");
        assert_eq!(config.cache.directory, PathBuf::from("/srv/tiles"));
        assert_eq!(
            ConfigKey::UpstreamBaseUrl.get(&config),
            "https://tiles.example.com/"
        );
    }

    #[test]
    fn test_empty_value_clears_optional_key() {
        let mut config = ConfigFile::default();
        ConfigKey::UpstreamBaseUrl.set(&mut config, "http://a/").unwrap();
        ConfigKey::UpstreamBaseUrl.set(&mut config, "").unwrap();
        assert!(config.upstream.base_url.is_none());
        assert_eq!(ConfigKey::UpstreamBaseUrl.get(&config), "");
    }

    #[test]
    fn test_set_rejects_bad_number() {
        let mut config = ConfigFile::default();
        assert!(ConfigKey::ServerWorkers.set(&mut config, "-1").is_err());
        assert_eq!(config.server.workers, 0);
    }
}
