//! Schedule API stub server, standalone development binary.
//!
//! Storage is in-memory (DashMap) with no persistence; data is lost on
//! restart.

use std::net::SocketAddr;

use oncall_stub::{router, AppState, DEFAULT_PORT};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> std::io::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let port: u16 = std::env::var("ONCALL_STUB_PORT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(DEFAULT_PORT);

    let app = router(AppState::new());

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("oncall-stub listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service()).await
}
