use anyhow::{Context, Result};
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

pub const HEALTH_BODY: &str = "viewfleet is running";

/// Keep-alive endpoint for hosts that restart idle processes
pub fn health_router() -> Router {
    Router::new().route("/", get(|| async { HEALTH_BODY }))
}

/// Bind the health endpoint on all interfaces
pub async fn bind_health(port: u16) -> Result<TcpListener> {
    TcpListener::bind(("0.0.0.0", port))
        .await
        .with_context(|| format!("failed to bind health endpoint on port {port}"))
}

/// Answer health checks on `listener` until `cancel` fires
pub async fn serve_health(listener: TcpListener, cancel: CancellationToken) -> Result<()> {
    let local_addr = listener
        .local_addr()
        .context("failed to resolve bound health endpoint address")?;
    info!("Health endpoint listening on {local_addr}");

    axum::serve(listener, health_router())
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await
        .context("health endpoint exited with an error")
}
