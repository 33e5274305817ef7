//! Employee management and attendance log handlers (admin and HR only)

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::NaiveDate;
use clockgate_core::{AttendanceRecord, EmployeeDraft, LogFilter, User};
use serde::Deserialize;
use utoipa::IntoParams;

use crate::auth::AuthenticatedUser;
use crate::error::ApiError;
use crate::state::AppState;

/// Query for `/admin/attendance-logs`
#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct LogQuery {
    /// Only records of this day (YYYY-MM-DD)
    pub date: Option<NaiveDate>,
    /// Case-insensitive substring of the employee name
    pub search: Option<String>,
}

impl From<LogQuery> for LogFilter {
    fn from(query: LogQuery) -> Self {
        LogFilter {
            date: query.date,
            search: query.search,
        }
    }
}

/// GET /admin/employees
#[utoipa::path(
    get,
    path = "/admin/employees",
    tag = "Admin",
    responses(
        (status = 200, description = "All employees"),
        (status = 403, description = "Admin or HR role required")
    ),
    security(("session_token" = []))
)]
pub async fn list_employees(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
) -> Result<Json<Vec<User>>, ApiError> {
    auth.require_staff()?;
    Ok(Json(state.ledger.users()))
}

/// POST /admin/employees
///
/// Name, email, role and department are required; new employees start
/// active.
#[utoipa::path(
    post,
    path = "/admin/employees",
    tag = "Admin",
    request_body(content_type = "application/json", description = "Employee fields: name, email, role, department"),
    responses(
        (status = 201, description = "Employee created"),
        (status = 400, description = "Missing required field"),
        (status = 403, description = "Admin or HR role required"),
        (status = 409, description = "Email already in use")
    ),
    security(("session_token" = []))
)]
pub async fn create_employee(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    Json(draft): Json<EmployeeDraft>,
) -> Result<(StatusCode, Json<User>), ApiError> {
    auth.require_staff()?;
    let user = state.ledger.create_user(draft)?;
    tracing::info!(user_id = %user.id, by = %auth.user.id, "Employee created");
    Ok((StatusCode::CREATED, Json(user)))
}

/// PUT /admin/employees/{id}
#[utoipa::path(
    put,
    path = "/admin/employees/{id}",
    tag = "Admin",
    params(("id" = String, Path, description = "Employee id")),
    request_body(content_type = "application/json", description = "Fields to change"),
    responses(
        (status = 200, description = "Employee updated"),
        (status = 403, description = "Admin or HR role required"),
        (status = 404, description = "Unknown employee")
    ),
    security(("session_token" = []))
)]
pub async fn update_employee(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    Path(id): Path<String>,
    Json(draft): Json<EmployeeDraft>,
) -> Result<Json<User>, ApiError> {
    auth.require_staff()?;
    let user = state.ledger.update_user(&id, draft)?;
    tracing::info!(user_id = %user.id, by = %auth.user.id, "Employee updated");
    Ok(Json(user))
}

/// DELETE /admin/employees/{id}
///
/// Employees are deactivated, never removed; their records stay.
#[utoipa::path(
    delete,
    path = "/admin/employees/{id}",
    tag = "Admin",
    params(("id" = String, Path, description = "Employee id")),
    responses(
        (status = 200, description = "Employee deactivated"),
        (status = 403, description = "Admin or HR role required"),
        (status = 404, description = "Unknown employee")
    ),
    security(("session_token" = []))
)]
pub async fn deactivate_employee(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    Path(id): Path<String>,
) -> Result<Json<User>, ApiError> {
    auth.require_staff()?;
    let user = state.ledger.deactivate_user(&id)?;
    tracing::info!(user_id = %user.id, by = %auth.user.id, "Employee deactivated");
    Ok(Json(user))
}

/// GET /admin/attendance-logs
#[utoipa::path(
    get,
    path = "/admin/attendance-logs",
    tag = "Admin",
    params(LogQuery),
    responses(
        (status = 200, description = "Matching attendance records"),
        (status = 403, description = "Admin or HR role required")
    ),
    security(("session_token" = []))
)]
pub async fn attendance_logs(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    Query(query): Query<LogQuery>,
) -> Result<Json<Vec<AttendanceRecord>>, ApiError> {
    auth.require_staff()?;
    Ok(Json(state.ledger.logs(&query.into())))
}
