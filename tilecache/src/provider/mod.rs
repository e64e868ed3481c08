//! Remote tile source abstraction
//!
//! The cache never talks HTTP directly: it consumes the narrow
//! [`RemoteFetcher`] capability, which streams an upstream tile into a sink.
//! [`ReqwestFetcher`] is the production implementation.
//!
//! ```ignore
//! use std::time::Duration;
//! use tilecache::provider::{ReqwestFetcher, RemoteFetcher};
//!
//! let fetcher = ReqwestFetcher::with_timeout(Duration::from_secs(10))?;
//! let mut body = Vec::new();
//! fetcher.fetch("https://tiles.example.com/7/34/21.png", &mut body).await?;
//! ```

mod http;
mod types;

pub use http::{ReqwestFetcher, DEFAULT_FETCH_TIMEOUT_SECS};
pub use types::{FetchError, RemoteFetcher, TileSink};

#[cfg(test)]
pub use http::tests::MockFetcher;
