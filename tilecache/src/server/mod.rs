//! HTTP front end.
//!
//! Every request, whatever its path or method, is routed to
//! [`TileService::handle`]; the service itself decides what is a valid tile
//! request. Connection handling and HTTP framing belong to axum/hyper.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::http::{Method, Uri};
use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::handler::{TileResponse, TileService};

/// Build the router serving tiles from `service`.
pub fn router(service: Arc<TileService>) -> Router {
    Router::new().fallback(serve_tile).with_state(service)
}

async fn serve_tile(
    State(service): State<Arc<TileService>>,
    method: Method,
    uri: Uri,
) -> TileResponse {
    service.handle(&method, uri.path()).await
}

/// Bind the listening socket.
pub async fn bind(addr: SocketAddr) -> io::Result<TcpListener> {
    TcpListener::bind(addr).await
}

/// Serve requests on `listener` until `shutdown` is cancelled.
///
/// In-flight requests are allowed to finish before this returns.
pub async fn serve(
    listener: TcpListener,
    service: Arc<TileService>,
    shutdown: CancellationToken,
) -> io::Result<()> {
    let addr = listener.local_addr()?;
    info!(addr = %addr, "Tile server listening");

    axum::serve(listener, router(service))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    info!("Tile server stopped");
    Ok(())
}
