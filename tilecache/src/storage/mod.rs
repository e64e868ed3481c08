//! Tile storage backends.
//!
//! The [`TileStore`] trait is the single source of truth for whether a tile is
//! resident. There is no in-memory index; presence is always answered by the
//! backend itself.
//!
//! # Atomic Writes
//!
//! Writers never touch a tile's final path directly. A write is first
//! *staged* into a temporary file in the same directory; only after every byte
//! is flushed and synced is it renamed over the final path. Readers therefore
//! see either no tile or a complete tile, never a truncated one.
//!
//! ```text
//! stage(key) ──► StagedTile ──write──► .21.png.<pid>.<n>.tmp
//!                    │
//!                    ├── commit() ──► rename ──► 7/34/21.png
//!                    └── drop/abort() ──► temp removed, final path untouched
//! ```

mod disk;

pub use disk::{scan_stats, DiskStore, StagedTile, StoreStats};

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;

use bytes::Bytes;
use thiserror::Error;

use crate::coord::TileKey;

/// Boxed future type for dyn-compatible async methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Errors from tile storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The tile is not present in the store.
    #[error("Tile not found: {0}")]
    NotFound(PathBuf),

    /// An I/O operation failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl StorageError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StorageError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Hierarchical byte store keyed by tile.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`; a single store is shared by every
/// request worker. Directory creation must tolerate concurrent attempts.
pub trait TileStore: Send + Sync {
    /// Whether a complete tile exists for `key`.
    ///
    /// An absent tile is `Ok(false)`; any other backend failure is an error.
    fn exists(&self, key: &TileKey) -> BoxFuture<'_, Result<bool, StorageError>>;

    /// Read a tile's bytes.
    ///
    /// # Errors
    ///
    /// - [`StorageError::NotFound`] if no tile exists
    /// - [`StorageError::Io`] for any other failure
    fn read(&self, key: &TileKey) -> BoxFuture<'_, Result<Bytes, StorageError>>;

    /// Begin an atomic write for `key`.
    ///
    /// Creates any missing parent directories and returns a staged sink. The
    /// tile becomes visible only when [`StagedTile::commit`] succeeds.
    fn stage(&self, key: &TileKey) -> BoxFuture<'_, Result<StagedTile, StorageError>>;

    /// Atomically write a complete tile.
    fn write<'a>(
        &'a self,
        key: &'a TileKey,
        data: &'a [u8],
    ) -> BoxFuture<'a, Result<u64, StorageError>> {
        Box::pin(async move {
            let mut staged = self.stage(key).await?;
            staged.append(data).await?;
            staged.commit().await
        })
    }
}
