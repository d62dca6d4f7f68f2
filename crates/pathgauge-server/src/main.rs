//! pathgauge server
//!
//! Single binary that serves:
//! - `/api/ping`, `/api/download`, `/api/upload` for path measurement
//! - `/api/network-info` for client attribution
//! - an optional static front-end directory

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use pathgauge_common::config::PathgaugeConfig;
use pathgauge_server::attribution::HttpAttributionProvider;
use pathgauge_server::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── Logging ─────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // ── Config ──────────────────────────────────────────────────
    let config = match std::env::var("PATHGAUGE_CONFIG") {
        Ok(path) => {
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("reading config {path}"))?;
            PathgaugeConfig::from_toml_str(&text).with_context(|| format!("parsing config {path}"))?
        }
        Err(_) => PathgaugeConfig::default(),
    };

    let listen_addr =
        std::env::var("LISTEN_ADDR").unwrap_or_else(|_| config.server.listen_addr.clone());
    let static_dir = std::env::var("STATIC_DIR")
        .ok()
        .or_else(|| config.server.static_dir.clone());

    // ── Shared state ────────────────────────────────────────────
    let provider = HttpAttributionProvider::new(&config.attribution)
        .context("building attribution HTTP client")?;
    let state = AppState::new(&config.server, &config.attribution, Arc::new(provider));

    let app = pathgauge_server::app(state, static_dir.as_deref());

    // ── Listen ──────────────────────────────────────────────────
    let addr: SocketAddr = listen_addr
        .parse()
        .with_context(|| format!("invalid listen address {listen_addr}"))?;

    tracing::info!(
        %addr,
        static_dir = static_dir.as_deref().unwrap_or("-"),
        upload_limit = ?config.server.upload_limit_bytes,
        "pathgauge-server listening"
    );
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
