//! Application bootstrap and lifecycle management.
//!
//! This module provides the `TileCacheApp` type which constructs every
//! component in dependency order and runs the server until shutdown.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        TileCacheApp                          │
//! │                                                              │
//! │  1. DiskStore (cache root prepared)                          │
//! │  2. ReqwestFetcher (upstream client, fetch timeout)          │
//! │  3. FetchCoalescer ──► DiskStore + ReqwestFetcher            │
//! │  4. TileService ─────► DiskStore + FetchCoalescer + metrics  │
//! │  5. Listener bound; axum router serving TileService          │
//! │  6. Metrics reporter (periodic log line)                     │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use tilecache::app::{ServerConfig, TileCacheApp};
//!
//! let app = TileCacheApp::start(config).await?;
//! println!("listening on {}", app.local_addr());
//! let summary = app.run_until(shutdown).await?;
//! ```

mod bootstrap;
mod config;
mod error;

pub use bootstrap::TileCacheApp;
pub use config::{default_workers, ServerConfig, DEFAULT_METRICS_INTERVAL_SECS};
pub use error::AppError;
