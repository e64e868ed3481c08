//! Tile key type and codec errors.

use std::fmt;

use thiserror::Error;

/// File extension carried by every tile, in request paths and on disk.
pub const TILE_EXTENSION: &str = "png";

/// Content type served for every tile.
pub const TILE_CONTENT_TYPE: &str = "image/png";

/// Highest zoom level considered part of a standard slippy-map grid.
///
/// Only consulted when strict bounds checking is enabled.
pub const MAX_ZOOM: u8 = 22;

/// Canonical identifier of a single map tile.
///
/// Tiles are addressed in the usual slippy-map scheme:
/// - `x` (column) increases eastward
/// - `y` (row) increases southward
///
/// # Example
///
/// ```
/// use tilecache::coord::TileKey;
///
/// let key = TileKey::new(7, 34, 21);
/// assert_eq!(key.to_string(), "7/34/21");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileKey {
    /// Zoom level
    pub zoom: u8,
    /// Tile column
    pub x: u32,
    /// Tile row
    pub y: u32,
}

impl TileKey {
    /// Create a new tile key.
    pub fn new(zoom: u8, x: u32, y: u32) -> Self {
        Self { zoom, x, y }
    }

    /// Number of tiles along one axis at this key's zoom level.
    ///
    /// Returns `None` when the grid size does not fit in a `u64`.
    pub fn grid_size(&self) -> Option<u64> {
        1u64.checked_shl(self.zoom as u32)
    }

    /// Whether the key falls inside the standard grid (`x, y < 2^zoom`,
    /// `zoom <= MAX_ZOOM`).
    pub fn is_within_grid(&self) -> bool {
        if self.zoom > MAX_ZOOM {
            return false;
        }
        match self.grid_size() {
            Some(n) => (self.x as u64) < n && (self.y as u64) < n,
            None => false,
        }
    }
}

impl fmt::Display for TileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.zoom, self.x, self.y)
    }
}

/// Reasons a request path is rejected by the codec.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidPath {
    /// Path is not made of exactly three segments.
    #[error("Invalid path format: expected /zoom/x/y.png")]
    Malformed,

    /// Row segment lacks the tile extension.
    #[error("Expected .png extension")]
    Extension,

    /// Zoom segment is not a non-negative integer.
    #[error("Invalid zoom level: {0:?}")]
    Zoom(String),

    /// Column segment is not a non-negative integer.
    #[error("Invalid column: {0:?}")]
    Column(String),

    /// Row segment is not a non-negative integer.
    #[error("Invalid row: {0:?}")]
    Row(String),
}
