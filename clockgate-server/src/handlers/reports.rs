//! Report handlers (admin and HR only)

use axum::{extract::State, Json};
use clockgate_core::{AbsenteeismPoint, WorkingHoursPoint};

use crate::auth::AuthenticatedUser;
use crate::error::ApiError;
use crate::state::AppState;

/// GET /reports/absenteeism-trends
#[utoipa::path(
    get,
    path = "/reports/absenteeism-trends",
    tag = "Reports",
    responses(
        (status = 200, description = "Present and absent counts per weekday"),
        (status = 403, description = "Admin or HR role required")
    ),
    security(("session_token" = []))
)]
pub async fn absenteeism_trends(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
) -> Result<Json<Vec<AbsenteeismPoint>>, ApiError> {
    auth.require_staff()?;
    Ok(Json(state.ledger.reports().absenteeism_trends))
}

/// GET /reports/working-hours
#[utoipa::path(
    get,
    path = "/reports/working-hours",
    tag = "Reports",
    responses(
        (status = 200, description = "Average working hours per weekday"),
        (status = 403, description = "Admin or HR role required")
    ),
    security(("session_token" = []))
)]
pub async fn working_hours(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
) -> Result<Json<Vec<WorkingHoursPoint>>, ApiError> {
    auth.require_staff()?;
    Ok(Json(state.ledger.reports().working_hours))
}
