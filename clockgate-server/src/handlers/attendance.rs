//! Attendance handlers: history and verified clock actions
//!
//! A clock action is committed only after the relying party has verified
//! the caller's assertion over the challenge from `/webauthn/login/begin`.

use axum::{
    extract::{Query, State},
    Json,
};
use chrono::Utc;
use clockgate_core::{AttendanceRecord, ClockAction, ClockResponse, GeoLocation};
use serde::Deserialize;
use serde_json::Value;
use utoipa::{IntoParams, ToSchema};

use crate::auth::AuthenticatedUser;
use crate::error::ApiError;
use crate::state::AppState;

/// Query for `/attendance/history`
#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct HistoryQuery {
    /// Employee id (default: the caller)
    pub user_id: Option<String>,
}

/// A clock action backed by a platform authenticator assertion
#[derive(Debug, Deserialize, ToSchema)]
pub struct ClockRequest {
    /// Serialized `PublicKeyCredential` assertion
    #[schema(value_type = Object)]
    pub assertion: Value,
    /// Device position, when the client could read one
    #[serde(default)]
    #[schema(value_type = Option<Object>)]
    pub location: Option<GeoLocation>,
}

/// GET /attendance/history
///
/// Attendance records of an employee, newest first. Employees may only read
/// their own history; admin and HR may read anyone's.
#[utoipa::path(
    get,
    path = "/attendance/history",
    tag = "Attendance",
    params(HistoryQuery),
    responses(
        (status = 200, description = "Attendance records, newest first"),
        (status = 401, description = "Missing or invalid session token"),
        (status = 403, description = "Another employee's history")
    ),
    security(("session_token" = []))
)]
pub async fn history(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<AttendanceRecord>>, ApiError> {
    let user_id = query.user_id.unwrap_or_else(|| auth.user.id.clone());
    auth.require_self_or_staff(&user_id)?;
    Ok(Json(state.ledger.history(&user_id)))
}

/// POST /attendance/clock-in
#[utoipa::path(
    post,
    path = "/attendance/clock-in",
    tag = "Attendance",
    request_body = ClockRequest,
    responses(
        (status = 200, description = "Clock-in recorded (JSON with message and record)"),
        (status = 401, description = "Missing or invalid session token"),
        (status = 409, description = "Already clocked in today"),
        (status = 422, description = "Biometric verification failed")
    ),
    security(("session_token" = []))
)]
pub async fn clock_in(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    Json(req): Json<ClockRequest>,
) -> Result<Json<ClockResponse>, ApiError> {
    commit(&state, &auth, &req, ClockAction::ClockIn).map(Json)
}

/// POST /attendance/clock-out
#[utoipa::path(
    post,
    path = "/attendance/clock-out",
    tag = "Attendance",
    request_body = ClockRequest,
    responses(
        (status = 200, description = "Clock-out recorded (JSON with message and record)"),
        (status = 401, description = "Missing or invalid session token"),
        (status = 409, description = "Not clocked in, or already clocked out today"),
        (status = 422, description = "Biometric verification failed")
    ),
    security(("session_token" = []))
)]
pub async fn clock_out(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    Json(req): Json<ClockRequest>,
) -> Result<Json<ClockResponse>, ApiError> {
    commit(&state, &auth, &req, ClockAction::ClockOut).map(Json)
}

fn commit(
    state: &AppState,
    auth: &AuthenticatedUser,
    req: &ClockRequest,
    action: ClockAction,
) -> Result<ClockResponse, ApiError> {
    let user_id = auth.user.id.as_str();
    state.relying_party.verify_assertion(user_id, &req.assertion)?;

    let now = Utc::now().naive_utc();
    let record = match action {
        ClockAction::ClockIn => state.ledger.clock_in(user_id, now)?,
        ClockAction::ClockOut => state.ledger.clock_out(user_id, now)?,
    };

    tracing::info!(
        user_id,
        action = %action,
        located = req.location.is_some(),
        is_late = record.is_late,
        "Clock action recorded"
    );

    Ok(ClockResponse {
        message: format!("{} successful", action.label()),
        record: Some(record),
    })
}
