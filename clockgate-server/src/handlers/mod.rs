//! HTTP request handlers
//!
//! This module contains all the request handlers for the API endpoints.

pub mod admin;
pub mod attendance;
pub mod auth;
pub mod health;
pub mod reports;

pub use crate::state::AppState;
pub use admin::{
    attendance_logs, create_employee, deactivate_employee, list_employees, update_employee,
    LogQuery,
};
pub use attendance::{clock_in, clock_out, history, ClockRequest, HistoryQuery};
pub use auth::{login, LoginRequest};
pub use health::{health, ready, HealthResponse, ReadyResponse};
pub use reports::{absenteeism_trends, working_hours};
