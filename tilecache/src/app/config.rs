//! Resolved server configuration for `TileCacheApp`.
//!
//! `ServerConfig` is what [`TileCacheApp::start`](super::TileCacheApp::start)
//! consumes. It is derived from the CLI's `ConfigFile` after command-line
//! overrides are applied, and validated once up front so the running server
//! never has to second-guess its settings.

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use crate::coalesce::CoalescerConfig;
use crate::config::{
    ConfigError, ConfigFile, DEFAULT_FOLLOWER_GRACE_SECS, DEFAULT_IO_TIMEOUT_SECS, DEFAULT_PORT,
    DEFAULT_UPSTREAM_TIMEOUT_SECS,
};
use crate::handler::HandlerOptions;

/// Interval between periodic metrics log lines.
pub const DEFAULT_METRICS_INTERVAL_SECS: u64 = 60;

/// Minimum worker count when the platform reports low parallelism.
const MIN_WORKERS: usize = 4;

/// Worker threads used when none are configured.
pub fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(MIN_WORKERS)
        .max(MIN_WORKERS)
}

/// Fully resolved server settings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerConfig {
    /// Upstream base URL tiles are fetched from.
    pub upstream_url: String,

    /// Address the HTTP listener binds to.
    pub bind_addr: SocketAddr,

    /// Runtime worker threads.
    pub workers: usize,

    /// Root of the on-disk tile store.
    pub cache_dir: PathBuf,

    /// Bound on one upstream fetch including the disk write.
    pub fetch_timeout: Duration,

    /// Bound on reading a cached tile.
    pub io_timeout: Duration,

    /// Extra time a coalesced request waits beyond `fetch_timeout`.
    pub follower_grace: Duration,

    /// Reject coordinates outside the `2^zoom` grid.
    pub strict_bounds: bool,

    /// Interval between periodic metrics reports.
    pub metrics_interval: Duration,
}

impl ServerConfig {
    /// Create a config with default timeouts, listening on all interfaces.
    pub fn new(upstream_url: impl Into<String>, cache_dir: PathBuf) -> Self {
        Self {
            upstream_url: upstream_url.into(),
            bind_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            workers: default_workers(),
            cache_dir,
            fetch_timeout: Duration::from_secs(DEFAULT_UPSTREAM_TIMEOUT_SECS),
            io_timeout: Duration::from_secs(DEFAULT_IO_TIMEOUT_SECS),
            follower_grace: Duration::from_secs(DEFAULT_FOLLOWER_GRACE_SECS),
            strict_bounds: false,
            metrics_interval: Duration::from_secs(DEFAULT_METRICS_INTERVAL_SECS),
        }
    }

    /// Resolve and validate settings from a loaded configuration file.
    pub fn from_config_file(config: &ConfigFile) -> Result<Self, ConfigError> {
        let upstream_url = config
            .upstream
            .base_url
            .clone()
            .ok_or(ConfigError::MissingUpstream)?;

        let ip: IpAddr = config.server.bind.trim().parse().map_err(|_| ConfigError::InvalidValue {
            key: "server.bind".to_string(),
            value: config.server.bind.clone(),
        })?;

        if config.server.port == 0 {
            return Err(ConfigError::Invalid("server.port must be non-zero".into()));
        }

        let workers = match config.server.workers {
            0 => default_workers(),
            n => n,
        };

        let resolved = Self {
            upstream_url,
            bind_addr: SocketAddr::new(ip, config.server.port),
            workers,
            cache_dir: config.cache.directory.clone(),
            fetch_timeout: Duration::from_secs(config.upstream.timeout),
            io_timeout: Duration::from_secs(config.cache.io_timeout),
            follower_grace: Duration::from_secs(config.cache.follower_grace),
            strict_bounds: config.cache.strict_bounds,
            metrics_interval: Duration::from_secs(DEFAULT_METRICS_INTERVAL_SECS),
        };
        resolved.validate()?;
        Ok(resolved)
    }

    pub fn with_bind_addr(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    pub fn with_follower_grace(mut self, grace: Duration) -> Self {
        self.follower_grace = grace;
        self
    }

    pub fn with_strict_bounds(mut self, strict: bool) -> Self {
        self.strict_bounds = strict;
        self
    }

    pub fn with_metrics_interval(mut self, interval: Duration) -> Self {
        self.metrics_interval = interval;
        self
    }

    /// Check settings that cannot be expressed in the types.
    ///
    /// Port 0 is rejected only in [`from_config_file`](Self::from_config_file)
    /// so an ephemeral port can still be bound through
    /// [`with_bind_addr`](Self::with_bind_addr).
    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = self.upstream_url.trim();
        if url.is_empty() {
            return Err(ConfigError::MissingUpstream);
        }
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ConfigError::InvalidValue {
                key: "upstream.base_url".to_string(),
                value: self.upstream_url.clone(),
            });
        }
        if self.workers == 0 {
            return Err(ConfigError::Invalid("worker count must be at least 1".into()));
        }
        if self.fetch_timeout.is_zero() {
            return Err(ConfigError::Invalid("upstream.timeout must be non-zero".into()));
        }
        if self.io_timeout.is_zero() {
            return Err(ConfigError::Invalid("cache.io_timeout must be non-zero".into()));
        }
        Ok(())
    }

    pub fn coalescer_config(&self) -> CoalescerConfig {
        CoalescerConfig {
            fetch_timeout: self.fetch_timeout,
            follower_grace: self.follower_grace,
        }
    }

    pub fn handler_options(&self) -> HandlerOptions {
        HandlerOptions {
            strict_bounds: self.strict_bounds,
            io_timeout: self.io_timeout,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_file(base_url: Option<&str>) -> ConfigFile {
        let mut file = ConfigFile::default();
        file.upstream.base_url = base_url.map(str::to_string);
        file.cache.directory = PathBuf::from("/tmp/tiles");
        file
    }

    #[test]
    fn test_from_config_file_defaults() {
        let config =
            ServerConfig::from_config_file(&config_file(Some("https://tiles.example.com/")))
                .unwrap();

        assert_eq!(config.upstream_url, "https://tiles.example.com/");
        assert_eq!(config.bind_addr, "0.0.0.0:8080".parse().unwrap());
        assert!(config.workers >= 4);
        assert_eq!(config.cache_dir, PathBuf::from("/tmp/tiles"));
        assert_eq!(config.fetch_timeout, Duration::from_secs(10));
        assert_eq!(config.follower_grace, Duration::from_secs(5));
        assert!(!config.strict_bounds);
    }

    #[test]
    fn test_explicit_workers_kept() {
        let mut file = config_file(Some("http://localhost:9000"));
        file.server.workers = 2;
        assert_eq!(ServerConfig::from_config_file(&file).unwrap().workers, 2);
    }

    #[test]
    fn test_missing_upstream_rejected() {
        assert!(matches!(
            ServerConfig::from_config_file(&config_file(None)),
            Err(ConfigError::MissingUpstream)
        ));
    }

    #[test]
    fn test_non_http_upstream_rejected() {
        let err = ServerConfig::from_config_file(&config_file(Some("ftp://tiles.example.com")))
            .unwrap_err();
        assert!(err.to_string().contains("upstream.base_url"));
    }

    #[test]
    fn test_invalid_bind_rejected() {
        let mut file = config_file(Some("http://localhost:9000"));
        file.server.bind = "not-an-ip".to_string();
        assert!(ServerConfig::from_config_file(&file).is_err());
    }

    #[test]
    fn test_ipv6_bind() {
        let mut file = config_file(Some("http://localhost:9000"));
        file.server.bind = "::1".to_string();
        file.server.port = 9999;
        let config = ServerConfig::from_config_file(&file).unwrap();
        assert_eq!(config.bind_addr, "[::1]:9999".parse().unwrap());
    }

    #[test]
    fn test_zero_port_rejected() {
        let mut file = config_file(Some("http://localhost:9000"));
        file.server.port = 0;
        assert!(ServerConfig::from_config_file(&file).is_err());
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let mut file = config_file(Some("http://localhost:9000"));
        file.upstream.timeout = 0;
        assert!(matches!(
            ServerConfig::from_config_file(&file),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_derived_component_configs() {
        let config = ServerConfig::new("http://localhost", PathBuf::from("/tmp"))
            .with_fetch_timeout(Duration::from_secs(3))
            .with_follower_grace(Duration::from_secs(2))
            .with_strict_bounds(true);

        assert_eq!(
            config.coalescer_config().follower_wait(),
            Duration::from_secs(5)
        );
        assert!(config.handler_options().strict_bounds);
    }
}
