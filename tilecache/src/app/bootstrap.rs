//! Application bootstrap implementation.
//!
//! `TileCacheApp` wires the tile store, upstream fetcher, coalescer, and
//! request handler together in one place, binds the listener, and owns the
//! serve loop and the periodic metrics reporter.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::config::ServerConfig;
use super::error::AppError;
use crate::coalesce::FetchCoalescer;
use crate::coord::TileCodec;
use crate::handler::TileService;
use crate::provider::{RemoteFetcher, ReqwestFetcher};
use crate::server;
use crate::storage::DiskStore;
use crate::telemetry::{CacheMetrics, MetricsSnapshot};

/// A started tile cache server.
///
/// # Example
///
/// ```ignore
/// use tilecache::app::{ServerConfig, TileCacheApp};
/// use tokio_util::sync::CancellationToken;
///
/// let config = ServerConfig::new("https://tiles.example.com/", cache_dir);
/// let app = TileCacheApp::start(config).await?;
///
/// let shutdown = CancellationToken::new();
/// app.run_until(shutdown.clone()).await?;
/// ```
pub struct TileCacheApp {
    config: ServerConfig,
    service: Arc<TileService>,
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl TileCacheApp {
    /// Start the application with the reqwest upstream fetcher.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid, the cache root
    /// cannot be created, or the listener cannot be bound.
    pub async fn start(config: ServerConfig) -> Result<Self, AppError> {
        config.validate()?;
        let fetcher = ReqwestFetcher::with_timeout(config.fetch_timeout)?;
        Self::start_with_fetcher(config, Arc::new(fetcher)).await
    }

    /// Start the application with a caller-supplied fetcher.
    pub async fn start_with_fetcher(
        config: ServerConfig,
        fetcher: Arc<dyn RemoteFetcher>,
    ) -> Result<Self, AppError> {
        config.validate()?;

        let store = Arc::new(DiskStore::new(&config.cache_dir));
        store.prepare().await?;

        let metrics = Arc::new(CacheMetrics::new());
        let codec = TileCodec::new(&config.upstream_url);
        let upstream = codec.base_url().to_owned();
        let coalescer = FetchCoalescer::new(
            store.clone(),
            fetcher,
            codec,
            config.coalescer_config(),
            Arc::clone(&metrics),
        );
        let service = Arc::new(TileService::new(
            store,
            coalescer,
            metrics,
            config.handler_options(),
        ));

        let listener = server::bind(config.bind_addr)
            .await
            .map_err(|source| AppError::Bind {
                addr: config.bind_addr,
                source,
            })?;
        let local_addr = listener.local_addr().map_err(AppError::Serve)?;

        info!(
            addr = %local_addr,
            upstream = %upstream,
            cache_dir = %config.cache_dir.display(),
            fetch_timeout_secs = config.fetch_timeout.as_secs(),
            strict_bounds = config.strict_bounds,
            "Tile cache started"
        );

        Ok(Self {
            config,
            service,
            listener,
            local_addr,
        })
    }

    /// Address actually bound (resolves port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn service(&self) -> &Arc<TileService> {
        &self.service
    }

    pub fn metrics(&self) -> Arc<CacheMetrics> {
        Arc::clone(self.service.metrics())
    }

    /// Serve until `shutdown` is cancelled, then return the final metrics.
    pub async fn run_until(self, shutdown: CancellationToken) -> Result<MetricsSnapshot, AppError> {
        let metrics = self.metrics();
        let reporter_cancel = shutdown.child_token();
        let reporter = spawn_metrics_reporter(
            Arc::clone(&metrics),
            self.config.metrics_interval,
            reporter_cancel.clone(),
        );

        let served = server::serve(self.listener, self.service, shutdown).await;

        reporter_cancel.cancel();
        let _ = reporter.await;

        let snapshot = metrics.snapshot();
        info!("Session summary: {}", snapshot);

        served.map_err(AppError::Serve)?;
        Ok(snapshot)
    }
}

/// Log a metrics line every `interval` while there is new traffic.
fn spawn_metrics_reporter(
    metrics: Arc<CacheMetrics>,
    interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // First tick completes immediately
        ticker.tick().await;

        let mut last_requests = 0;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let snapshot = metrics.snapshot();
                    if snapshot.requests != last_requests {
                        last_requests = snapshot.requests;
                        info!(
                            hits = snapshot.hits,
                            misses = snapshot.misses,
                            coalesced = snapshot.coalesced,
                            "{}",
                            snapshot
                        );
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::MockFetcher;

    fn test_config(dir: &std::path::Path) -> ServerConfig {
        ServerConfig::new("http://upstream.test/", dir.join("tiles"))
            .with_bind_addr("127.0.0.1:0".parse().unwrap())
    }

    #[tokio::test]
    async fn test_start_prepares_cache_and_binds() {
        let dir = tempfile::tempdir().unwrap();
        let app = TileCacheApp::start_with_fetcher(
            test_config(dir.path()),
            Arc::new(MockFetcher::serving(b"png".to_vec())),
        )
        .await
        .unwrap();

        assert!(dir.path().join("tiles").is_dir());
        assert_ne!(app.local_addr().port(), 0);
    }

    #[tokio::test]
    async fn test_start_rejects_invalid_config() {
        let dir = tempfile::tempdir().unwrap();
        let config = ServerConfig::new("tiles.example.com", dir.path().to_path_buf())
            .with_bind_addr("127.0.0.1:0".parse().unwrap());

        let result = TileCacheApp::start(config).await;
        assert!(matches!(result, Err(AppError::Config(_))));
    }

    #[tokio::test]
    async fn test_run_until_returns_on_cancel() {
        let dir = tempfile::tempdir().unwrap();
        let app = TileCacheApp::start_with_fetcher(
            test_config(dir.path()).with_metrics_interval(Duration::from_millis(10)),
            Arc::new(MockFetcher::serving(b"png".to_vec())),
        )
        .await
        .unwrap();

        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(app.run_until(shutdown.clone()));
        tokio::time::sleep(Duration::from_millis(50)).await;
        shutdown.cancel();

        let snapshot = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(snapshot.requests, 0);
    }

    #[tokio::test]
    async fn test_reporter_stops_on_cancel() {
        let metrics = Arc::new(CacheMetrics::new());
        let cancel = CancellationToken::new();
        let handle =
            spawn_metrics_reporter(Arc::clone(&metrics), Duration::from_millis(5), cancel.clone());

        metrics.request_received();
        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
