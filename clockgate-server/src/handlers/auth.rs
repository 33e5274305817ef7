//! Login handler

use axum::{extract::State, Json};
use clockgate_core::LoginResponse;
use serde::Deserialize;
use utoipa::ToSchema;

use crate::error::ApiError;
use crate::state::AppState;

/// Email and password login
#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginRequest {
    #[schema(example = "employee@pardee.com")]
    pub email: String,
    #[schema(example = "password")]
    pub password: String,
}

/// POST /auth/login
///
/// Any non-empty password is accepted for an active employee. Returns a
/// session token and the employee profile.
#[utoipa::path(
    post,
    path = "/auth/login",
    tag = "Auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Session token and user (JSON with token and user)"),
        (status = 401, description = "Invalid credentials")
    )
)]
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let user = state
        .ledger
        .find_by_email(req.email.trim())
        .filter(|user| user.is_active() && !req.password.is_empty())
        .ok_or_else(|| ApiError::auth_error("AUTH_INVALID_CREDENTIALS", "Invalid credentials"))?;

    let token = state.tokens.issue(&user)?;
    tracing::info!(user_id = %user.id, role = ?user.role, "Login successful");

    Ok(Json(LoginResponse { token, user }))
}
