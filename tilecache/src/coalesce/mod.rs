//! Fetch coalescing for cache misses.
//!
//! When many requests miss on the same tile at once, exactly one of them (the
//! *owner*) downloads it; the rest (*followers*) wait for the owner's outcome
//! instead of issuing duplicate upstream requests. Unrelated tiles never wait
//! on each other.
//!
//! # Architecture
//!
//! ```text
//!            ┌───────────────────────────────────────────────┐
//!  miss ───► │ register(key)   [in-flight map, short lock]   │
//!            └──────┬──────────────────────────┬─────────────┘
//!                   │ NewRequest               │ Coalesced
//!                   ▼                          ▼
//!        spawn fetch task (detached)     wait on outcome (no lock held,
//!        stage ─► stream ─► commit       bounded by timeout + grace)
//!                   │                          │
//!                   ▼                          │ timed out?
//!        complete(): remove entry +            └──► fetch independently
//!        publish outcome (one lock)
//! ```
//!
//! The owner's fetch runs on its own task, so a client that disconnects
//! mid-fetch never strands the followers waiting on that tile.
//!
//! Failed fetches are not remembered: the next miss for the same key starts a
//! fresh fetch.

mod guard;

pub use guard::FetchGuard;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::coord::{TileCodec, TileKey};
use crate::provider::{FetchError, RemoteFetcher, DEFAULT_FETCH_TIMEOUT_SECS};
use crate::storage::TileStore;
use crate::telemetry::CacheMetrics;

/// Default extra time a follower waits beyond the fetch timeout.
pub const DEFAULT_FOLLOWER_GRACE_SECS: u64 = 5;

/// Why a coalesced fetch failed.
///
/// Cloneable so the same outcome can be handed to every waiter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoalesceError {
    /// The upstream fetch failed.
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// Staging or committing the tile locally failed.
    #[error("Failed to store tile: {0}")]
    Storage(String),

    /// Fetch plus write did not finish in time.
    #[error("Fetch did not complete within {}ms", .0.as_millis())]
    Timeout(Duration),

    /// The owner went away without publishing an outcome.
    #[error("Fetch owner exited without a result")]
    Abandoned,
}

/// Outcome shared by the owner and all followers of one fetch.
///
/// `Ok` carries the number of bytes committed to storage (0 when the tile
/// turned out to be resident already and nothing was downloaded).
pub type FetchOutcome = Result<u64, CoalesceError>;

/// Receiver side of an in-flight fetch.
pub type OutcomeReceiver = watch::Receiver<Option<FetchOutcome>>;

pub(crate) type InFlightMap = Arc<Mutex<HashMap<TileKey, OutcomeReceiver>>>;

/// Result of registering interest in a tile.
pub enum CoalesceResult {
    /// No fetch was in flight; the caller now owns it.
    NewRequest(FetchGuard),
    /// A fetch is already in flight; wait on the receiver.
    Coalesced(OutcomeReceiver),
}

/// How a request took part in a fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Started the fetch.
    Owner,
    /// Waited for another request's fetch.
    Follower,
    /// Waited, gave up on a stalled owner, and fetched independently.
    Fallback,
}

/// Outcome of [`FetchCoalescer::fetch`] together with the caller's role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoalescedFetch {
    pub role: Role,
    pub outcome: FetchOutcome,
}

/// Timing configuration for the coalescer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoalescerConfig {
    /// Upper bound on one fetch, covering the download and the disk write.
    pub fetch_timeout: Duration,
    /// Extra time a follower waits beyond `fetch_timeout` before fetching
    /// on its own.
    pub follower_grace: Duration,
}

impl Default for CoalescerConfig {
    fn default() -> Self {
        Self {
            fetch_timeout: Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECS),
            follower_grace: Duration::from_secs(DEFAULT_FOLLOWER_GRACE_SECS),
        }
    }
}

impl CoalescerConfig {
    /// How long a follower waits for an owner.
    pub fn follower_wait(&self) -> Duration {
        self.fetch_timeout + self.follower_grace
    }
}

/// Everything an owner's detached fetch task needs.
struct FetchContext {
    store: Arc<dyn TileStore>,
    fetcher: Arc<dyn RemoteFetcher>,
    codec: TileCodec,
    config: CoalescerConfig,
    metrics: Arc<CacheMetrics>,
}

/// Ensures at most one upstream fetch per tile is in flight.
pub struct FetchCoalescer {
    in_flight: InFlightMap,
    ctx: Arc<FetchContext>,
}

impl FetchCoalescer {
    /// Create a coalescer writing into `store` and downloading via `fetcher`.
    pub fn new(
        store: Arc<dyn TileStore>,
        fetcher: Arc<dyn RemoteFetcher>,
        codec: TileCodec,
        config: CoalescerConfig,
        metrics: Arc<CacheMetrics>,
    ) -> Self {
        Self {
            in_flight: Arc::new(Mutex::new(HashMap::new())),
            ctx: Arc::new(FetchContext {
                store,
                fetcher,
                codec,
                config,
                metrics,
            }),
        }
    }

    /// Number of fetches currently in flight.
    pub fn in_flight(&self) -> usize {
        self.in_flight.lock().len()
    }

    /// Register interest in `key`.
    ///
    /// The check and the insert happen under one lock, so exactly one caller
    /// per demand-wave receives [`CoalesceResult::NewRequest`].
    pub fn register(&self, key: TileKey) -> CoalesceResult {
        let mut in_flight = self.in_flight.lock();
        if let Some(rx) = in_flight.get(&key) {
            return CoalesceResult::Coalesced(rx.clone());
        }

        let (tx, rx) = watch::channel(None);
        in_flight.insert(key, rx);
        CoalesceResult::NewRequest(FetchGuard::new(key, tx, Arc::clone(&self.in_flight)))
    }

    /// Obtain `key` from upstream into storage, coalescing with any fetch
    /// already in flight.
    ///
    /// Callers are expected to have checked storage already.
    pub async fn fetch(&self, key: TileKey) -> CoalescedFetch {
        match self.register(key) {
            CoalesceResult::NewRequest(guard) => {
                let mut rx = guard.subscribe();
                let ctx = Arc::clone(&self.ctx);

                // Detached: keeps running if this request is dropped.
                tokio::spawn(async move {
                    let outcome = fetch_if_absent(&ctx, key).await;
                    guard.complete(outcome);
                });

                let outcome = match wait_for_outcome(&mut rx, self.ctx.config.follower_wait()).await
                {
                    Some(outcome) => outcome,
                    None => Err(CoalesceError::Timeout(self.ctx.config.follower_wait())),
                };
                CoalescedFetch {
                    role: Role::Owner,
                    outcome,
                }
            }
            CoalesceResult::Coalesced(mut rx) => {
                self.ctx.metrics.request_coalesced();
                debug!(tile = %key, "Request coalesced - waiting for in-flight fetch");

                match wait_for_outcome(&mut rx, self.ctx.config.follower_wait()).await {
                    Some(outcome) => CoalescedFetch {
                        role: Role::Follower,
                        outcome,
                    },
                    None => {
                        warn!(
                            tile = %key,
                            waited_ms = self.ctx.config.follower_wait().as_millis() as u64,
                            "In-flight fetch stalled - fetching independently"
                        );
                        let outcome = fetch_if_absent(&self.ctx, key).await;
                        CoalescedFetch {
                            role: Role::Fallback,
                            outcome,
                        }
                    }
                }
            }
        }
    }
}

/// Wait until an outcome is published, for at most `bound`.
///
/// Returns `None` if the bound elapsed first.
async fn wait_for_outcome(rx: &mut OutcomeReceiver, bound: Duration) -> Option<FetchOutcome> {
    match tokio::time::timeout(bound, rx.wait_for(Option::is_some)).await {
        Ok(Ok(value)) => (*value).clone(),
        Ok(Err(_)) => Some(Err(CoalesceError::Abandoned)),
        Err(_) => None,
    }
}

/// Download `key` unless it is already in storage.
///
/// A caller's miss can be observed before an earlier owner commits and
/// answered only after that owner has left the in-flight map, so winning
/// ownership does not by itself mean the tile is still missing.
async fn fetch_if_absent(ctx: &FetchContext, key: TileKey) -> FetchOutcome {
    match ctx.store.exists(&key).await {
        Ok(true) => {
            debug!(tile = %key, "Tile already stored - skipping download");
            Ok(0)
        }
        Ok(false) => run_fetch(ctx, key).await,
        Err(e) => {
            warn!(tile = %key, error = %e, "Presence check failed - fetching anyway");
            run_fetch(ctx, key).await
        }
    }
}

/// Download one tile into storage.
///
/// The whole stage → stream → commit sequence is bounded by the fetch
/// timeout. Any failure, including the timeout, drops the staged file so no
/// partial tile is ever visible.
async fn run_fetch(ctx: &FetchContext, key: TileKey) -> FetchOutcome {
    let url = ctx.codec.remote_url(&key);
    let start = Instant::now();

    ctx.metrics.fetch_started();
    info!(tile = %key, url = %url, "Fetching remote tile");

    let attempt = async {
        let mut staged = ctx
            .store
            .stage(&key)
            .await
            .map_err(|e| CoalesceError::Storage(e.to_string()))?;

        let fetched = ctx.fetcher.fetch(&url, &mut staged).await;
        match fetched {
            Ok(_) => staged
                .commit()
                .await
                .map_err(|e| CoalesceError::Storage(e.to_string())),
            Err(e) => {
                staged.abort().await;
                Err(CoalesceError::Fetch(e))
            }
        }
    };

    let outcome = match tokio::time::timeout(ctx.config.fetch_timeout, attempt).await {
        Ok(outcome) => outcome,
        Err(_) => Err(CoalesceError::Timeout(ctx.config.fetch_timeout)),
    };

    let duration_ms = start.elapsed().as_millis() as u64;
    match &outcome {
        Ok(bytes) => {
            ctx.metrics.fetch_succeeded(*bytes);
            debug!(tile = %key, bytes, duration_ms, "Remote tile stored");
        }
        Err(e) => {
            ctx.metrics.fetch_failed();
            warn!(tile = %key, url = %url, error = %e, duration_ms, "Remote fetch failed");
        }
    }

    outcome
}
