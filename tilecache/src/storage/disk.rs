//! Filesystem tile store.
//!
//! Tiles live at `{root}/{zoom}/{x}/{y}.png`. The tree is plain files, so it
//! can be inspected, backed up, or pre-populated out of band while the server
//! runs.

use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll};

use bytes::Bytes;
use tokio::fs::File;
use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};
use tracing::{debug, warn};

use super::{BoxFuture, StorageError, TileStore};
use crate::coord::{storage_path, TileKey, TILE_EXTENSION};

/// Buffer size for staged writes (64KB).
const WRITE_BUFFER_SIZE: usize = 64 * 1024;

/// Suffix of staged (uncommitted) files.
const TEMP_SUFFIX: &str = "tmp";

/// Distinguishes concurrent staged files within this process.
static STAGE_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Tile store backed by a directory tree.
#[derive(Debug, Clone)]
pub struct DiskStore {
    root: PathBuf,
}

impl DiskStore {
    /// Create a store rooted at `root`.
    ///
    /// The directory is not touched until [`prepare`](Self::prepare) or the
    /// first write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Create the root directory if needed.
    pub async fn prepare(&self) -> Result<(), StorageError> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| StorageError::io(&self.root, e))
    }

    /// Returns the root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute path of a tile.
    pub fn tile_path(&self, key: &TileKey) -> PathBuf {
        self.root.join(storage_path(key))
    }

    async fn stage_tile(&self, key: &TileKey) -> Result<StagedTile, StorageError> {
        let final_path = self.tile_path(key);
        let dir = final_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.root.clone());

        // create_dir_all treats a directory created concurrently as success
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| StorageError::io(&dir, e))?;

        let temp_path = dir.join(format!(
            ".{}.{}.{}.{}.{}",
            key.y,
            TILE_EXTENSION,
            std::process::id(),
            STAGE_COUNTER.fetch_add(1, Ordering::Relaxed),
            TEMP_SUFFIX
        ));

        let file = File::create(&temp_path)
            .await
            .map_err(|e| StorageError::io(&temp_path, e))?;

        Ok(StagedTile {
            writer: Some(BufWriter::with_capacity(WRITE_BUFFER_SIZE, file)),
            temp_path,
            final_path,
            written: 0,
            finished: false,
        })
    }
}

impl TileStore for DiskStore {
    fn exists(&self, key: &TileKey) -> BoxFuture<'_, Result<bool, StorageError>> {
        let path = self.tile_path(key);
        Box::pin(async move {
            match tokio::fs::metadata(&path).await {
                Ok(meta) => Ok(meta.is_file()),
                Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
                Err(e) => Err(StorageError::io(path, e)),
            }
        })
    }

    fn read(&self, key: &TileKey) -> BoxFuture<'_, Result<Bytes, StorageError>> {
        let path = self.tile_path(key);
        Box::pin(async move {
            match tokio::fs::read(&path).await {
                Ok(data) => Ok(Bytes::from(data)),
                Err(e) if e.kind() == io::ErrorKind::NotFound => Err(StorageError::NotFound(path)),
                Err(e) => Err(StorageError::io(path, e)),
            }
        })
    }

    fn stage(&self, key: &TileKey) -> BoxFuture<'_, Result<StagedTile, StorageError>> {
        let key = *key;
        Box::pin(async move { self.stage_tile(&key).await })
    }
}

/// An in-progress atomic tile write.
///
/// Bytes go to a temporary file beside the final path. [`commit`](Self::commit)
/// publishes the tile with a rename; dropping the value (or calling
/// [`abort`](Self::abort)) discards the temporary file and leaves the final
/// path untouched.
///
/// Implements [`AsyncWrite`] so upstream bodies can be streamed straight in.
#[derive(Debug)]
pub struct StagedTile {
    writer: Option<BufWriter<File>>,
    temp_path: PathBuf,
    final_path: PathBuf,
    written: u64,
    finished: bool,
}

impl StagedTile {
    /// Path the tile will occupy once committed.
    pub fn final_path(&self) -> &Path {
        &self.final_path
    }

    /// Path of the temporary file.
    pub fn temp_path(&self) -> &Path {
        &self.temp_path
    }

    /// Bytes accepted so far.
    pub fn bytes_written(&self) -> u64 {
        self.written
    }

    /// Append bytes to the staged tile.
    pub async fn append(&mut self, data: &[u8]) -> Result<(), StorageError> {
        let temp_path = self.temp_path.clone();
        AsyncWriteExt::write_all(self, data)
            .await
            .map_err(|e| StorageError::io(temp_path, e))
    }

    /// Flush, sync, and atomically move the tile into place.
    ///
    /// Returns the number of bytes committed. On error the temporary file is
    /// removed.
    pub async fn commit(mut self) -> Result<u64, StorageError> {
        let mut writer = self.writer.take().ok_or_else(|| {
            StorageError::io(&self.temp_path, io::Error::other("staged tile already closed"))
        })?;

        writer
            .flush()
            .await
            .map_err(|e| StorageError::io(&self.temp_path, e))?;
        let file = writer.into_inner();
        file.sync_all()
            .await
            .map_err(|e| StorageError::io(&self.temp_path, e))?;
        drop(file);

        tokio::fs::rename(&self.temp_path, &self.final_path)
            .await
            .map_err(|e| StorageError::io(&self.final_path, e))?;

        self.finished = true;
        debug!(path = %self.final_path.display(), bytes = self.written, "Committed tile");
        Ok(self.written)
    }

    /// Discard the staged tile.
    pub async fn abort(mut self) {
        drop(self.writer.take());
        if let Err(e) = tokio::fs::remove_file(&self.temp_path).await {
            if e.kind() != io::ErrorKind::NotFound {
                warn!(path = %self.temp_path.display(), error = %e, "Failed to remove staged tile");
            }
        }
        self.finished = true;
    }

    fn writer_mut(&mut self) -> io::Result<Pin<&mut BufWriter<File>>> {
        self.writer
            .as_mut()
            .map(Pin::new)
            .ok_or_else(|| io::Error::other("staged tile already closed"))
    }
}

impl AsyncWrite for StagedTile {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        let poll = match this.writer_mut() {
            Ok(writer) => writer.poll_write(cx, buf),
            Err(e) => return Poll::Ready(Err(e)),
        };
        if let Poll::Ready(Ok(n)) = poll {
            this.written += n as u64;
        }
        poll
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut().writer_mut() {
            Ok(writer) => writer.poll_flush(cx),
            Err(e) => Poll::Ready(Err(e)),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut().writer_mut() {
            Ok(writer) => writer.poll_shutdown(cx),
            Err(e) => Poll::Ready(Err(e)),
        }
    }
}

impl Drop for StagedTile {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        drop(self.writer.take());
        let temp_path = std::mem::take(&mut self.temp_path);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn_blocking(move || remove_staged(&temp_path));
            }
            Err(_) => remove_staged(&temp_path),
        }
    }
}

/// Unlink a staged file, tolerating one that is already gone.
fn remove_staged(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        if e.kind() != io::ErrorKind::NotFound {
            warn!(path = %path.display(), error = %e, "Failed to remove staged tile");
        }
    }
}

/// Summary of a tile store's contents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// Number of committed tiles.
    pub tiles: u64,
    /// Total size of committed tiles in bytes.
    pub bytes: u64,
    /// Leftover staged files (from a crash mid-write).
    pub staged: u64,
}

/// Walk a store directory and count its tiles.
///
/// A missing root is reported as an empty store.
pub fn scan_stats(root: &Path) -> io::Result<StoreStats> {
    let mut stats = StoreStats::default();
    if !root.exists() {
        return Ok(stats);
    }

    let tile_suffix = format!(".{}", TILE_EXTENSION);
    let temp_suffix = format!(".{}", TEMP_SUFFIX);
    let mut pending = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            let file_type = entry.file_type()?;
            if file_type.is_dir() {
                pending.push(entry.path());
                continue;
            }
            if !file_type.is_file() {
                continue;
            }

            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.starts_with('.') && name.ends_with(&temp_suffix) {
                stats.staged += 1;
            } else if name.ends_with(&tile_suffix) {
                stats.tiles += 1;
                stats.bytes += entry.metadata()?.len();
            }
        }
    }

    Ok(stats)
}
