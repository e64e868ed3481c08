//! Tile key codec
//!
//! Converts between request paths (`/{zoom}/{x}/{y}.png`), canonical
//! [`TileKey`] values, relative storage paths, and upstream URLs.
//!
//! The codec is deliberately permissive about coordinate ranges: any
//! non-negative integers are accepted. Range checks against the tile grid are
//! available through [`TileKey::is_within_grid`] for callers that want them.

mod types;

pub use types::{InvalidPath, TileKey, MAX_ZOOM, TILE_CONTENT_TYPE, TILE_EXTENSION};

use std::path::PathBuf;

/// Parses a request path into a tile key.
///
/// Strips a single leading `/`, then requires exactly three segments
/// `zoom/x/y.png`. Each coordinate must be a plain run of ASCII digits.
///
/// # Examples
///
/// ```
/// use tilecache::coord::{decode, TileKey};
///
/// assert_eq!(decode("/7/34/21.png").unwrap(), TileKey::new(7, 34, 21));
/// assert!(decode("/abc/1/2.png").is_err());
/// ```
pub fn decode(path: &str) -> Result<TileKey, InvalidPath> {
    let path = path.strip_prefix('/').unwrap_or(path);

    let mut segments = path.split('/');
    let (zoom, x, y_file) = match (segments.next(), segments.next(), segments.next()) {
        (Some(zoom), Some(x), Some(y_file)) => (zoom, x, y_file),
        _ => return Err(InvalidPath::Malformed),
    };
    if segments.next().is_some() {
        return Err(InvalidPath::Malformed);
    }

    let y = y_file
        .strip_suffix(TILE_EXTENSION)
        .and_then(|s| s.strip_suffix('.'))
        .ok_or(InvalidPath::Extension)?;

    let zoom = parse_digits::<u8>(zoom).ok_or_else(|| InvalidPath::Zoom(zoom.to_string()))?;
    let x = parse_digits::<u32>(x).ok_or_else(|| InvalidPath::Column(x.to_string()))?;
    let y = parse_digits::<u32>(y).ok_or_else(|| InvalidPath::Row(y.to_string()))?;

    Ok(TileKey { zoom, x, y })
}

/// Renders the canonical request path for a key (`/{zoom}/{x}/{y}.png`).
pub fn request_path(key: &TileKey) -> String {
    format!("/{}/{}/{}.{}", key.zoom, key.x, key.y, TILE_EXTENSION)
}

/// Relative storage path for a key: nested by zoom, then column, with the
/// row as the file name.
pub fn storage_path(key: &TileKey) -> PathBuf {
    PathBuf::from(key.zoom.to_string())
        .join(key.x.to_string())
        .join(format!("{}.{}", key.y, TILE_EXTENSION))
}

/// Ensures an upstream base URL ends with exactly one trailing `/`.
pub fn normalize_base_url(base_url: &str) -> String {
    let trimmed = base_url.trim();
    if trimmed.ends_with('/') {
        trimmed.to_string()
    } else {
        format!("{}/", trimmed)
    }
}

/// Renders keys into storage paths and upstream URLs.
///
/// Holds only static configuration, so the same key always renders to the
/// same locations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileCodec {
    base_url: String,
}

impl TileCodec {
    /// Create a codec for the given upstream base URL.
    ///
    /// The base URL is normalized to end with `/`.
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: normalize_base_url(base_url),
        }
    }

    /// The normalized upstream base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Renders a key into `(storage_path, remote_url)`.
    pub fn encode(&self, key: &TileKey) -> (PathBuf, String) {
        (storage_path(key), self.remote_url(key))
    }

    /// Upstream URL for a key.
    pub fn remote_url(&self, key: &TileKey) -> String {
        format!(
            "{}{}/{}/{}.{}",
            self.base_url, key.zoom, key.x, key.y, TILE_EXTENSION
        )
    }
}

/// Parses a segment made only of ASCII digits.
///
/// `str::parse` accepts a leading `+`, which is not a valid path segment here.
fn parse_digits<T: std::str::FromStr>(segment: &str) -> Option<T> {
    if segment.is_empty() || !segment.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    segment.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_decode_valid_path() {
        let key = decode("/7/34/21.png").unwrap();
        assert_eq!(key, TileKey::new(7, 34, 21));
    }

    #[test]
    fn test_decode_without_leading_slash() {
        let key = decode("0/0/0.png").unwrap();
        assert_eq!(key, TileKey::new(0, 0, 0));
    }

    #[test]
    fn test_decode_strips_only_one_separator() {
        assert_eq!(decode("//7/34/21.png"), Err(InvalidPath::Malformed));
    }

    #[test]
    fn test_decode_non_numeric_zoom() {
        assert_eq!(
            decode("/abc/1/2.png"),
            Err(InvalidPath::Zoom("abc".to_string()))
        );
    }

    #[test]
    fn test_decode_non_numeric_column_and_row() {
        assert_eq!(
            decode("/1/x/2.png"),
            Err(InvalidPath::Column("x".to_string()))
        );
        assert_eq!(
            decode("/1/2/y.png"),
            Err(InvalidPath::Row("y".to_string()))
        );
    }

    #[test]
    fn test_decode_missing_segment() {
        assert_eq!(decode("/7/21.png"), Err(InvalidPath::Malformed));
        assert_eq!(decode("/"), Err(InvalidPath::Malformed));
        assert_eq!(decode(""), Err(InvalidPath::Malformed));
    }

    #[test]
    fn test_decode_extra_segment() {
        assert_eq!(decode("/7/34/21/5.png"), Err(InvalidPath::Malformed));
        assert_eq!(decode("/7/34/21.png/"), Err(InvalidPath::Malformed));
    }

    #[test]
    fn test_decode_wrong_or_missing_extension() {
        assert_eq!(decode("/7/34/21.jpg"), Err(InvalidPath::Extension));
        assert_eq!(decode("/7/34/21"), Err(InvalidPath::Extension));
        assert_eq!(decode("/7/34/21png"), Err(InvalidPath::Extension));
    }

    #[test]
    fn test_decode_empty_row_before_extension() {
        assert_eq!(decode("/7/34/.png"), Err(InvalidPath::Row(String::new())));
    }

    #[test]
    fn test_decode_rejects_signs_and_whitespace() {
        assert!(decode("/+7/34/21.png").is_err());
        assert!(decode("/7/-34/21.png").is_err());
        assert!(decode("/7/34/ 21.png").is_err());
    }

    #[test]
    fn test_decode_rejects_overflow() {
        assert!(decode("/256/0/0.png").is_err());
        assert!(decode("/1/4294967296/0.png").is_err());
    }

    #[test]
    fn test_decode_is_permissive_about_range() {
        // Outside the zoom-1 grid, but the codec does not judge that.
        let key = decode("/1/500/900.png").unwrap();
        assert!(!key.is_within_grid());
    }

    #[test]
    fn test_storage_path_layout() {
        let path = storage_path(&TileKey::new(7, 34, 21));
        assert_eq!(path, PathBuf::from("7/34/21.png"));
    }

    #[test]
    fn test_normalize_base_url() {
        assert_eq!(
            normalize_base_url("https://tiles.example.com/styles/osm-bright"),
            "https://tiles.example.com/styles/osm-bright/"
        );
        assert_eq!(
            normalize_base_url("https://tiles.example.com/"),
            "https://tiles.example.com/"
        );
        assert_eq!(
            TileCodec::new("https://tiles.example.com").base_url(),
            "https://tiles.example.com/"
        );
    }

    #[test]
    fn test_encode_renders_both_locations() {
        let codec = TileCodec::new("https://tiles.example.com/styles/osm-bright");
        let (path, url) = codec.encode(&TileKey::new(7, 34, 21));
        assert_eq!(path, PathBuf::from("7/34/21.png"));
        assert_eq!(
            url,
            "https://tiles.example.com/styles/osm-bright/7/34/21.png"
        );
    }

    proptest! {
        #[test]
        fn prop_request_path_roundtrip(zoom in 0u8..=30, x in any::<u32>(), y in any::<u32>()) {
            let key = TileKey::new(zoom, x, y);
            let path = request_path(&key);
            let decoded = decode(&path).unwrap();
            prop_assert_eq!(decoded, key);
            prop_assert_eq!(request_path(&decoded), path);
        }
    }
}
