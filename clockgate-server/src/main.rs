//! Clockgate Server - REST API for biometric-verified attendance
//!
//! Configuration comes from environment variables (see `Config::from_env`
//! and `WebAuthnConfig::from_env`). Log verbosity follows `RUST_LOG`.

use std::net::SocketAddr;
use std::time::Duration;

use clockgate_server::{create_router_with_config, AppState, Config, WebAuthnConfig};
use tracing_subscriber::EnvFilter;

/// How often expired pending ceremonies are dropped
const CLEANUP_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if let Err(e) = run().await {
        tracing::error!(error = %e, "Server failed");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::from_env();
    let webauthn = WebAuthnConfig::from_env()?;
    tracing::info!(
        rp_id = webauthn.rp_id(),
        rp_origin = %webauthn.origin(),
        mode = %config.ceremony_mode,
        "Relying party configured"
    );

    let state = AppState::new(&config, webauthn)?;

    let relying_party = state.relying_party.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(CLEANUP_INTERVAL);
        loop {
            ticker.tick().await;
            relying_party.cleanup_expired();
        }
    });

    let app = create_router_with_config(&config, state);
    let addr = config.socket_addr();
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Listening on http://{}", addr);
    tracing::info!("API docs at http://{}/docs", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
