//! Tile request handling.
//!
//! [`TileService`] turns one inbound request into one [`TileResponse`]:
//!
//! ```text
//! Received ─► KeyValidated ─┬─► CacheHit ─────────────────────────► Responded
//!                           └─► CacheMiss ─► Coalesced ─┬─► Fetched ► Responded
//!                                                       └─► FetchFailed ► Responded
//! ```
//!
//! Requests rejected before key validation never touch storage or the
//! network.

mod response;

pub use response::{TileResponse, TileSource};

use std::sync::Arc;
use std::time::Duration;

use axum::http::{Method, StatusCode};
use tracing::{debug, error, warn};

use crate::coalesce::{CoalesceError, FetchCoalescer, Role};
use crate::coord::{self, InvalidPath, TileKey};
use crate::storage::{StorageError, TileStore};
use crate::telemetry::CacheMetrics;

/// Default bound on a single storage lookup or read, in seconds.
pub const DEFAULT_IO_TIMEOUT_SECS: u64 = 5;

/// Request-level behaviour switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandlerOptions {
    /// Reject keys outside the `2^zoom` grid with 400.
    pub strict_bounds: bool,
    /// Upper bound on each storage lookup and read.
    pub io_timeout: Duration,
}

impl Default for HandlerOptions {
    fn default() -> Self {
        Self {
            strict_bounds: false,
            io_timeout: Duration::from_secs(DEFAULT_IO_TIMEOUT_SECS),
        }
    }
}

/// Read-through tile cache service.
///
/// Owns everything a request needs. Constructed once and shared by every
/// worker; independent instances do not interact.
pub struct TileService {
    store: Arc<dyn TileStore>,
    coalescer: FetchCoalescer,
    metrics: Arc<CacheMetrics>,
    options: HandlerOptions,
}

impl TileService {
    pub fn new(
        store: Arc<dyn TileStore>,
        coalescer: FetchCoalescer,
        metrics: Arc<CacheMetrics>,
        options: HandlerOptions,
    ) -> Self {
        Self {
            store,
            coalescer,
            metrics,
            options,
        }
    }

    pub fn metrics(&self) -> &Arc<CacheMetrics> {
        &self.metrics
    }

    /// Handle one request for `path`.
    pub async fn handle(&self, method: &Method, path: &str) -> TileResponse {
        self.metrics.request_received();

        if method != Method::GET {
            debug!(method = %method, path, "Rejected non-GET request");
            return self.reject(StatusCode::METHOD_NOT_ALLOWED, "Only GET allowed");
        }

        let key = match coord::decode(path) {
            Ok(key) => key,
            Err(e) => {
                debug!(path, error = %e, "Rejected invalid tile path");
                let message = match e {
                    InvalidPath::Extension => "Expected .png extension",
                    _ => "Invalid path format",
                };
                return self.reject(StatusCode::BAD_REQUEST, message);
            }
        };

        if self.options.strict_bounds && !key.is_within_grid() {
            debug!(tile = %key, "Rejected tile outside the grid");
            return self.reject(StatusCode::BAD_REQUEST, "Tile coordinates outside the grid");
        }

        match self.is_resident(&key).await {
            Ok(true) => {
                self.metrics.cache_hit();
                debug!(zoom = key.zoom, x = key.x, y = key.y, "Cache hit");
                return self.serve(key, TileSource::Cache).await;
            }
            Ok(false) => {}
            Err(response) => return response,
        }

        self.metrics.cache_miss();
        debug!(zoom = key.zoom, x = key.x, y = key.y, "Cache miss");

        let fetch = self.coalescer.fetch(key).await;
        let source = match fetch.role {
            Role::Owner => TileSource::Fetched,
            Role::Follower => TileSource::Coalesced,
            Role::Fallback => TileSource::Fallback,
        };

        match fetch.outcome {
            Ok(_) => self.serve(key, source).await,
            Err(CoalesceError::Fetch(e)) if e.is_upstream_status() => {
                self.reject(StatusCode::NOT_FOUND, "Tile not found remotely")
            }
            Err(e) => {
                warn!(tile = %key, error = %e, "Fetch failed");
                self.reject(StatusCode::BAD_GATEWAY, "Failed to fetch tile from upstream")
            }
        }
    }

    /// Ask storage whether `key` is present, bounded by the I/O timeout.
    async fn is_resident(&self, key: &TileKey) -> Result<bool, TileResponse> {
        match tokio::time::timeout(self.options.io_timeout, self.store.exists(key)).await {
            Ok(Ok(present)) => Ok(present),
            Ok(Err(e)) => {
                error!(tile = %key, error = %e, "Failed to check cache");
                Err(self.fail("Failed to check cache"))
            }
            Err(_) => {
                error!(
                    tile = %key,
                    timeout_ms = self.options.io_timeout.as_millis() as u64,
                    "Timed out checking cache"
                );
                Err(self.fail("Failed to check cache"))
            }
        }
    }

    /// Read a resident tile and build the success response.
    async fn serve(&self, key: TileKey, source: TileSource) -> TileResponse {
        let read = tokio::time::timeout(self.options.io_timeout, self.store.read(&key)).await;

        let result = match read {
            Ok(result) => result,
            Err(_) => {
                error!(
                    tile = %key,
                    timeout_ms = self.options.io_timeout.as_millis() as u64,
                    "Timed out reading cached tile"
                );
                return self.fail("Failed to open cached file");
            }
        };

        match result {
            Ok(data) => {
                self.metrics.tile_served(data.len() as u64);
                TileResponse::Tile { data, source }
            }
            Err(StorageError::NotFound(path)) => {
                error!(tile = %key, path = %path.display(), "Cached tile vanished before read");
                self.fail("Failed to open cached file")
            }
            Err(e) => {
                error!(tile = %key, error = %e, "Failed to read cached tile");
                self.fail("Failed to open cached file")
            }
        }
    }

    fn reject(&self, status: StatusCode, message: &'static str) -> TileResponse {
        if status.is_client_error() {
            self.metrics.client_error();
        } else {
            self.metrics.server_error();
        }
        TileResponse::Error { status, message }
    }

    fn fail(&self, message: &'static str) -> TileResponse {
        self.reject(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coalesce::CoalescerConfig;
    use crate::coord::TileCodec;
    use crate::provider::{FetchError, MockFetcher};
    use crate::storage::{BoxFuture, DiskStore, StagedTile};
    use bytes::Bytes;
    use std::sync::atomic::Ordering::SeqCst;

    const BODY: &[u8] = b"\x89PNG\r\n\x1a\nhandler";

    struct Fixture {
        dir: tempfile::TempDir,
        store: Arc<DiskStore>,
        fetcher: Arc<MockFetcher>,
        service: Arc<TileService>,
    }

    fn fixture_with(fetcher: MockFetcher, options: HandlerOptions) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(DiskStore::new(dir.path()));
        let fetcher = Arc::new(fetcher);
        let metrics = Arc::new(CacheMetrics::new());
        let coalescer = FetchCoalescer::new(
            store.clone(),
            fetcher.clone(),
            TileCodec::new("https://tiles.example.com"),
            CoalescerConfig {
                fetch_timeout: Duration::from_secs(5),
                follower_grace: Duration::from_secs(1),
            },
            Arc::clone(&metrics),
        );
        let service = Arc::new(TileService::new(
            store.clone(),
            coalescer,
            metrics,
            options,
        ));
        Fixture {
            dir,
            store,
            fetcher,
            service,
        }
    }

    fn fixture(fetcher: MockFetcher) -> Fixture {
        fixture_with(fetcher, HandlerOptions::default())
    }

    fn is_empty_dir(path: &std::path::Path) -> bool {
        std::fs::read_dir(path).unwrap().next().is_none()
    }

    #[tokio::test]
    async fn test_miss_fetches_stores_and_serves() {
        let f = fixture(MockFetcher::serving(BODY));

        let response = f.service.handle(&Method::GET, "/7/34/21.png").await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.body(), BODY);
        assert_eq!(response.source(), Some(TileSource::Fetched));
        assert_eq!(f.fetcher.calls(), 1);
        assert_eq!(f.fetcher.urls(), vec!["https://tiles.example.com/7/34/21.png"]);
        assert_eq!(
            std::fs::read(f.dir.path().join("7/34/21.png")).unwrap(),
            BODY
        );
    }

    #[tokio::test]
    async fn test_repeat_request_served_from_disk() {
        let f = fixture(MockFetcher::serving(BODY));

        f.service.handle(&Method::GET, "/7/34/21.png").await;
        let response = f.service.handle(&Method::GET, "/7/34/21.png").await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.source(), Some(TileSource::Cache));
        assert_eq!(response.body(), BODY);
        assert_eq!(f.fetcher.calls(), 1);

        let snapshot = f.service.metrics().snapshot();
        assert_eq!(snapshot.hits, 1);
        assert_eq!(snapshot.misses, 1);
    }

    #[tokio::test]
    async fn test_prepopulated_tile_never_fetched() {
        let f = fixture(MockFetcher::serving(BODY));
        let key = TileKey::new(3, 2, 1);
        f.store.write(&key, b"local").await.unwrap();

        let response = f.service.handle(&Method::GET, "/3/2/1.png").await;

        assert_eq!(response.body(), b"local");
        assert_eq!(f.fetcher.calls(), 0);
    }

    #[tokio::test]
    async fn test_invalid_path_has_no_side_effects() {
        let f = fixture(MockFetcher::serving(BODY));

        let response = f.service.handle(&Method::GET, "/abc/1/2.png").await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(response.body(), b"Invalid path format");
        assert_eq!(f.fetcher.calls(), 0);
        assert!(is_empty_dir(f.dir.path()));
    }

    #[tokio::test]
    async fn test_wrong_extension() {
        let f = fixture(MockFetcher::serving(BODY));

        let response = f.service.handle(&Method::GET, "/7/34/21.jpg").await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(response.body(), b"Expected .png extension");
        assert_eq!(f.fetcher.calls(), 0);
    }

    #[tokio::test]
    async fn test_non_get_rejected() {
        let f = fixture(MockFetcher::serving(BODY));

        for method in [Method::POST, Method::PUT, Method::DELETE, Method::HEAD] {
            let response = f.service.handle(&method, "/7/34/21.png").await;
            assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        }
        assert_eq!(f.fetcher.calls(), 0);
        assert!(is_empty_dir(f.dir.path()));
        assert_eq!(f.service.metrics().snapshot().client_errors, 4);
    }

    #[tokio::test]
    async fn test_out_of_grid_allowed_unless_strict() {
        let lenient = fixture(MockFetcher::serving(BODY));
        let response = lenient.service.handle(&Method::GET, "/1/5/5.png").await;
        assert_eq!(response.status(), StatusCode::OK);

        let strict = fixture_with(
            MockFetcher::serving(BODY),
            HandlerOptions {
                strict_bounds: true,
                ..Default::default()
            },
        );
        let response = strict.service.handle(&Method::GET, "/1/5/5.png").await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(strict.fetcher.calls(), 0);
    }

    #[tokio::test]
    async fn test_upstream_status_maps_to_not_found() {
        let f = fixture(MockFetcher::failing(FetchError::Status {
            url: "u".to_string(),
            status: 404,
        }));

        let response = f.service.handle(&Method::GET, "/7/34/21.png").await;

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(response.body(), b"Tile not found remotely");
        assert!(!f.dir.path().join("7/34/21.png").exists());
    }

    #[tokio::test]
    async fn test_transport_failure_maps_to_bad_gateway() {
        let f = fixture(MockFetcher::failing(FetchError::Transport {
            url: "u".to_string(),
            reason: "connection refused".to_string(),
        }));

        let response = f.service.handle(&Method::GET, "/7/34/21.png").await;

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(f.service.metrics().snapshot().server_errors, 1);
    }

    #[tokio::test]
    async fn test_failed_fetch_retried_on_next_request() {
        let f = fixture(MockFetcher::serving(BODY).with_failures(
            FetchError::Status {
                url: "u".to_string(),
                status: 503,
            },
            1,
        ));

        let first = f.service.handle(&Method::GET, "/2/1/1.png").await;
        let second = f.service.handle(&Method::GET, "/2/1/1.png").await;

        assert_eq!(first.status(), StatusCode::NOT_FOUND);
        assert_eq!(second.status(), StatusCode::OK);
        assert_eq!(f.fetcher.calls(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_misses_share_one_fetch() {
        let f = fixture(MockFetcher::serving(BODY).with_delay(Duration::from_millis(200)));

        let handles: Vec<_> = (0..10)
            .map(|_| {
                let service = Arc::clone(&f.service);
                tokio::spawn(async move { service.handle(&Method::GET, "/12/2048/1361.png").await })
            })
            .collect();

        for response in futures::future::join_all(handles).await {
            let response = response.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            assert_eq!(response.body(), BODY);
        }
        assert_eq!(f.fetcher.calls(), 1);
    }

    #[tokio::test]
    async fn test_storage_lookup_error_is_internal() {
        let f = fixture(MockFetcher::serving(BODY));
        // A regular file where the zoom directory should be
        std::fs::write(f.dir.path().join("7"), b"x").unwrap();

        let response = f.service.handle(&Method::GET, "/7/34/21.png").await;

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.body(), b"Failed to check cache");
        assert_eq!(f.fetcher.calls(), 0);
    }

    /// Reads the disk immediately but reports back late, as a lookup queued
    /// behind a busy blocking pool does.
    struct LaggingStore {
        inner: DiskStore,
        lag: Duration,
        lookups: std::sync::atomic::AtomicUsize,
        stalled_lookups: std::sync::atomic::AtomicUsize,
    }

    impl TileStore for LaggingStore {
        fn exists(&self, key: &TileKey) -> BoxFuture<'_, Result<bool, StorageError>> {
            let key = *key;
            Box::pin(async move {
                let present = self.inner.exists(&key).await;
                // Every lookup after the first answers late
                if self.lookups.fetch_add(1, SeqCst) > 0 {
                    self.stalled_lookups.fetch_add(1, SeqCst);
                    tokio::time::sleep(self.lag).await;
                }
                present
            })
        }

        fn read(&self, key: &TileKey) -> BoxFuture<'_, Result<Bytes, StorageError>> {
            self.inner.read(key)
        }

        fn stage(&self, key: &TileKey) -> BoxFuture<'_, Result<StagedTile, StorageError>> {
            self.inner.stage(key)
        }
    }

    #[tokio::test]
    async fn test_late_miss_after_commit_does_not_refetch() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(LaggingStore {
            inner: DiskStore::new(dir.path()),
            lag: Duration::from_millis(300),
            lookups: Default::default(),
            stalled_lookups: Default::default(),
        });
        let fetcher = Arc::new(MockFetcher::serving(BODY).with_delay(Duration::from_millis(100)));
        let metrics = Arc::new(CacheMetrics::new());
        let coalescer = FetchCoalescer::new(
            store.clone(),
            fetcher.clone(),
            TileCodec::new("https://tiles.example.com"),
            CoalescerConfig {
                fetch_timeout: Duration::from_secs(5),
                follower_grace: Duration::from_secs(1),
            },
            Arc::clone(&metrics),
        );
        let service = Arc::new(TileService::new(
            store.clone(),
            coalescer,
            metrics,
            HandlerOptions::default(),
        ));

        let first = {
            let service = Arc::clone(&service);
            tokio::spawn(async move { service.handle(&Method::GET, "/6/10/20.png").await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        let second = {
            let service = Arc::clone(&service);
            tokio::spawn(async move { service.handle(&Method::GET, "/6/10/20.png").await })
        };

        for response in [first.await.unwrap(), second.await.unwrap()] {
            assert_eq!(response.status(), StatusCode::OK);
            assert_eq!(response.body(), BODY);
        }
        assert!(store.stalled_lookups.load(SeqCst) > 0);
        assert_eq!(fetcher.calls(), 1);
    }

    #[tokio::test]
    async fn test_local_write_failure_is_bad_gateway() {
        let f = fixture(MockFetcher::serving(BODY));
        // A non-empty directory occupies the tile path, so the commit rename fails
        std::fs::create_dir_all(f.dir.path().join("1/0/0.png/inner")).unwrap();

        let response = f.service.handle(&Method::GET, "/1/0/0.png").await;

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(f.fetcher.calls(), 1);
    }
}
