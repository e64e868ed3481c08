//! TileCache - read-through disk cache for slippy map tiles
//!
//! Serves `/{zoom}/{x}/{y}.png` from a local directory tree, fetching missing
//! tiles from an upstream tile server exactly once no matter how many clients
//! ask for them at the same time.
//!
//! # Modules
//!
//! - [`coord`]: request path ⇄ [`coord::TileKey`] ⇄ storage path / upstream URL
//! - [`storage`]: on-disk tile store with atomic staged writes
//! - [`provider`]: upstream fetcher abstraction and reqwest implementation
//! - [`coalesce`]: one in-flight fetch per tile
//! - [`handler`]: request state machine
//! - [`server`]: axum front end
//! - [`app`]: bootstrap and lifecycle
//! - [`config`], [`logging`], [`telemetry`]: ambient support

pub mod app;
pub mod coalesce;
pub mod config;
pub mod coord;
pub mod handler;
pub mod logging;
pub mod provider;
pub mod server;
pub mod storage;
pub mod telemetry;

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
