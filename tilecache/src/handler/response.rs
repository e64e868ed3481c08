//! Handler responses and their HTTP rendering.

use axum::body::Body;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;

use crate::coord::TILE_CONTENT_TYPE;

/// Where a served tile came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileSource {
    /// Already resident in storage.
    Cache,
    /// Fetched by this request.
    Fetched,
    /// Fetched by a concurrent request this one waited on.
    Coalesced,
    /// Fetched by this request after the concurrent owner stalled.
    Fallback,
}

impl TileSource {
    fn as_str(&self) -> &'static str {
        match self {
            TileSource::Cache => "hit",
            TileSource::Fetched => "miss",
            TileSource::Coalesced => "coalesced",
            TileSource::Fallback => "fallback",
        }
    }
}

/// Outcome of one tile request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TileResponse {
    Tile { data: Bytes, source: TileSource },
    Error { status: StatusCode, message: &'static str },
}

impl TileResponse {
    pub fn status(&self) -> StatusCode {
        match self {
            TileResponse::Tile { .. } => StatusCode::OK,
            TileResponse::Error { status, .. } => *status,
        }
    }

    /// Response body: tile bytes or the error message.
    pub fn body(&self) -> &[u8] {
        match self {
            TileResponse::Tile { data, .. } => data,
            TileResponse::Error { message, .. } => message.as_bytes(),
        }
    }

    pub fn source(&self) -> Option<TileSource> {
        match self {
            TileResponse::Tile { source, .. } => Some(*source),
            TileResponse::Error { .. } => None,
        }
    }
}

impl IntoResponse for TileResponse {
    fn into_response(self) -> Response {
        match self {
            TileResponse::Tile { data, source } => {
                let length = data.len();
                let mut response = Response::new(Body::from(data));
                let headers = response.headers_mut();
                headers.insert(
                    header::CONTENT_TYPE,
                    HeaderValue::from_static(TILE_CONTENT_TYPE),
                );
                headers.insert(header::CONTENT_LENGTH, HeaderValue::from(length));
                headers.insert("x-tile-cache", HeaderValue::from_static(source.as_str()));
                response
            }
            TileResponse::Error { status, message } => (
                status,
                [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
                message,
            )
                .into_response(),
        }
    }
}
