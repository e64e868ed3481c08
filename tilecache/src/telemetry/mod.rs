//! Cache telemetry for observability.
//!
//! This module provides metrics collection and reporting for the tile cache.
//! It uses lock-free atomic counters for high-performance instrumentation
//! with minimal overhead on the request path.
//!
//! # Architecture
//!
//! ```text
//! Handler / Coalescer ─────► CacheMetrics ─────► MetricsSnapshot ─────► Logs
//!                            (atomic counters)   (point-in-time copy)
//! ```
//!
//! # Example
//!
//! ```
//! use tilecache::telemetry::CacheMetrics;
//!
//! let metrics = CacheMetrics::new();
//! metrics.request_received();
//! metrics.cache_hit();
//!
//! let snapshot = metrics.snapshot();
//! assert_eq!(snapshot.hits, 1);
//! assert_eq!(snapshot.hit_rate(), 1.0);
//! ```

mod metrics;
mod snapshot;

pub use metrics::CacheMetrics;
pub use snapshot::{format_bytes, MetricsSnapshot};
