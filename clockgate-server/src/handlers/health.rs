//! Health check handlers
//!
//! Provides health and readiness endpoints for monitoring and orchestration.

use axum::{extract::State, Json};
use serde::Serialize;
use utoipa::ToSchema;

use crate::state::AppState;

/// Health check response
#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    /// Service status
    #[schema(example = "healthy")]
    pub status: String,
    /// Server version from Cargo.toml
    pub version: String,
    /// Assertion verification mode: "webauthn" or "simulated"
    #[schema(example = "webauthn")]
    pub ceremony_mode: String,
    /// Service name
    pub service: String,
}

/// GET /health - Health check endpoint
///
/// Returns JSON with service status, version and ceremony mode.
#[utoipa::path(
    get,
    path = "/health",
    tag = "Health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse)
    )
)]
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        ceremony_mode: state.relying_party.mode().to_string(),
        service: "clockgate-server".to_string(),
    })
}

/// Readiness response
#[derive(Serialize, ToSchema)]
pub struct ReadyResponse {
    /// Whether the service is ready to accept traffic
    pub ready: bool,
    /// Optional message explaining status
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// GET /ready - Readiness probe
///
/// Ready once the employee directory is loaded.
#[utoipa::path(
    get,
    path = "/ready",
    tag = "Health",
    responses(
        (status = 200, description = "Service is ready", body = ReadyResponse)
    )
)]
pub async fn ready(State(state): State<AppState>) -> Json<ReadyResponse> {
    let employees = state.ledger.users().len();
    if employees == 0 {
        return Json(ReadyResponse {
            ready: false,
            message: Some("No employees loaded".to_string()),
        });
    }
    Json(ReadyResponse {
        ready: true,
        message: None,
    })
}
