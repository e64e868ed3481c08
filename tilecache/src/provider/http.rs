//! HTTP remote fetcher backed by reqwest.

use std::time::Duration;

use reqwest::redirect::Policy;
use tokio::io::AsyncWriteExt;
use tracing::trace;

use super::types::{BoxFuture, FetchError, RemoteFetcher, TileSink};

/// Default timeout for upstream requests in seconds.
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 10;

/// Maximum number of redirects followed per request.
const MAX_REDIRECTS: usize = 10;

/// Real remote fetcher using reqwest's async client.
///
/// The client follows up to ten redirects, and the configured timeout covers
/// the whole exchange from connect to the last body byte.
#[derive(Debug, Clone)]
pub struct ReqwestFetcher {
    client: reqwest::Client,
    timeout: Duration,
}

impl ReqwestFetcher {
    /// Creates a new fetcher with the default timeout.
    pub fn new() -> Result<Self, FetchError> {
        Self::with_timeout(Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECS))
    }

    /// Creates a new fetcher with a custom timeout.
    pub fn with_timeout(timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(Policy::limited(MAX_REDIRECTS))
            .user_agent(concat!("tilecache/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FetchError::Client(e.to_string()))?;

        Ok(Self { client, timeout })
    }

    /// The configured request timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn classify(&self, url: &str, error: reqwest::Error) -> FetchError {
        if error.is_timeout() {
            FetchError::Timeout {
                url: url.to_string(),
                timeout_ms: self.timeout.as_millis() as u64,
            }
        } else {
            FetchError::Transport {
                url: url.to_string(),
                reason: error.to_string(),
            }
        }
    }

    async fn fetch_into(&self, url: &str, sink: &mut TileSink<'_>) -> Result<u64, FetchError> {
        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| self.classify(url, e))?;

        // Check HTTP status
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        // Stream body chunks into the sink as they arrive
        let mut total = 0u64;
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| self.classify(url, e))?
        {
            sink.write_all(&chunk)
                .await
                .map_err(|e| FetchError::Sink(e.to_string()))?;
            total += chunk.len() as u64;
        }
        sink.flush()
            .await
            .map_err(|e| FetchError::Sink(e.to_string()))?;

        trace!(url = %url, bytes = total, "Upstream body streamed");
        Ok(total)
    }
}

impl RemoteFetcher for ReqwestFetcher {
    fn fetch<'a>(
        &'a self,
        url: &'a str,
        sink: &'a mut TileSink<'a>,
    ) -> BoxFuture<'a, Result<u64, FetchError>> {
        Box::pin(self.fetch_into(url, sink))
    }
}
