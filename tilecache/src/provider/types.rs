//! Remote fetcher trait and error types.

use thiserror::Error;
use tokio::io::AsyncWrite;

pub use crate::storage::BoxFuture;

/// Destination for a streamed tile body.
pub type TileSink<'a> = dyn AsyncWrite + Send + Unpin + 'a;

/// Errors from fetching a tile upstream.
///
/// Cloneable so a single outcome can be handed to every coalesced waiter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// Upstream answered with a non-success status.
    #[error("HTTP {status} from {url}")]
    Status { url: String, status: u16 },

    /// Connection, TLS, or protocol failure.
    #[error("Request to {url} failed: {reason}")]
    Transport { url: String, reason: String },

    /// The request did not complete within the configured timeout.
    #[error("Request to {url} timed out after {timeout_ms}ms")]
    Timeout { url: String, timeout_ms: u64 },

    /// Writing the body into the sink failed.
    #[error("Failed to write tile body: {0}")]
    Sink(String),

    /// The HTTP client could not be constructed.
    #[error("Failed to create HTTP client: {0}")]
    Client(String),
}

impl FetchError {
    /// Whether the upstream explicitly reported the tile missing or refused it.
    pub fn is_upstream_status(&self) -> bool {
        matches!(self, FetchError::Status { .. })
    }
}

/// Capability to download a tile from the remote source.
///
/// This abstraction allows for dependency injection and easier testing
/// by enabling mock fetchers in tests.
///
/// # Contract
///
/// - Redirects are followed
/// - The whole request is bounded by a timeout
/// - The body is streamed into `sink` as it arrives, never buffered whole
/// - Any non-success status yields [`FetchError::Status`]
pub trait RemoteFetcher: Send + Sync {
    /// Performs an HTTP GET, streaming the body into `sink`.
    ///
    /// # Returns
    ///
    /// The number of body bytes written.
    fn fetch<'a>(
        &'a self,
        url: &'a str,
        sink: &'a mut TileSink<'a>,
    ) -> BoxFuture<'a, Result<u64, FetchError>>;
}
