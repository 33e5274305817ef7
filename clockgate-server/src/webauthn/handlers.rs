//! WebAuthn HTTP endpoint handlers
//!
//! Implements the enrollment flow and the challenge half of the clock-action
//! verification. The assertion itself is checked by the clock endpoints.

use axum::{extract::State, Json};
use serde_json::Value;

use super::types::{BeginLoginRequest, RegistrationStatusResponse, VerifiedResponse};
use crate::auth::AuthenticatedUser;
use crate::error::ApiError;
use crate::state::AppState;

/// POST /webauthn/login/begin
///
/// Issue a fresh challenge for the caller's registered credentials. The
/// response is `{"publicKey": {...}}` for `navigator.credentials.get`.
#[utoipa::path(
    post,
    path = "/webauthn/login/begin",
    tag = "WebAuthn",
    request_body = BeginLoginRequest,
    responses(
        (status = 200, description = "Request options (JSON with publicKey)"),
        (status = 401, description = "Missing or invalid session token"),
        (status = 403, description = "userId is not the caller"),
        (status = 404, description = "No credential registered")
    ),
    security(("session_token" = []))
)]
pub async fn begin_login(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    Json(req): Json<BeginLoginRequest>,
) -> Result<Json<Value>, ApiError> {
    if req.user_id != auth.user.id {
        return Err(ApiError::forbidden(
            "Verification can only be started for yourself",
        ));
    }

    let options = state.relying_party.begin_authentication(&auth.user).await?;
    tracing::info!(user_id = %auth.user.id, "Verification challenge issued");

    Ok(Json(options))
}

/// POST /webauthn/register/begin
///
/// Start enrolling a platform credential for the caller.
#[utoipa::path(
    post,
    path = "/webauthn/register/begin",
    tag = "WebAuthn",
    responses(
        (status = 200, description = "Creation options (JSON with publicKey)"),
        (status = 401, description = "Missing or invalid session token")
    ),
    security(("session_token" = []))
)]
pub async fn begin_registration(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
) -> Result<Json<Value>, ApiError> {
    let options = state.relying_party.begin_registration(&auth.user)?;
    tracing::info!(user_id = %auth.user.id, "WebAuthn registration started");
    Ok(Json(options))
}

/// POST /webauthn/register/finish
///
/// Complete enrollment with the authenticator's attestation.
///
/// Request body is the `PublicKeyCredential` returned by
/// `navigator.credentials.create`.
#[utoipa::path(
    post,
    path = "/webauthn/register/finish",
    tag = "WebAuthn",
    request_body(content_type = "application/json", description = "WebAuthn registration response from the authenticator"),
    responses(
        (status = 200, description = "Credential enrolled", body = VerifiedResponse),
        (status = 400, description = "No pending registration or invalid response"),
        (status = 401, description = "Missing or invalid session token")
    ),
    security(("session_token" = []))
)]
pub async fn finish_registration(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    Json(credential): Json<Value>,
) -> Result<Json<VerifiedResponse>, ApiError> {
    state
        .relying_party
        .finish_registration(&auth.user.id, &credential)?;
    Ok(Json(VerifiedResponse { verified: true }))
}

/// GET /webauthn/registration-status
#[utoipa::path(
    get,
    path = "/webauthn/registration-status",
    tag = "WebAuthn",
    responses(
        (status = 200, description = "Enrollment status of the caller", body = RegistrationStatusResponse),
        (status = 401, description = "Missing or invalid session token")
    ),
    security(("session_token" = []))
)]
pub async fn registration_status(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
) -> Json<RegistrationStatusResponse> {
    Json(RegistrationStatusResponse {
        is_registered: state.relying_party.is_registered(&auth.user.id),
    })
}
