//! Attendance and registration service interfaces.
//!
//! Implemented in process by [`crate::backend::MemoryBackend`] and over HTTP
//! by `HttpBackend` (feature `network`).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;
use crate::types::{
    AttendanceRecord, ClockEvent, LogFilter, Reports, SerializedAssertion, User,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: User,
}

/// A verified clock action ready to be committed.
#[derive(Debug, Clone, PartialEq)]
pub struct ClockSubmission {
    pub event: ClockEvent,
    pub assertion: SerializedAssertion,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClockResponse {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record: Option<AttendanceRecord>,
}

/// The system of record for attendance.
#[async_trait]
pub trait AttendanceService: Send + Sync {
    async fn login(&self, email: &str, password: &str) -> Result<LoginResponse>;

    /// Attendance records of `user_id`, newest first.
    async fn fetch_history(&self, user_id: &str) -> Result<Vec<AttendanceRecord>>;

    async fn clock_in(&self, submission: &ClockSubmission) -> Result<ClockResponse>;

    async fn clock_out(&self, submission: &ClockSubmission) -> Result<ClockResponse>;

    async fn list_employees(&self) -> Result<Vec<User>>;

    async fn list_attendance_logs(&self, filter: &LogFilter) -> Result<Vec<AttendanceRecord>>;

    async fn get_reports(&self) -> Result<Reports>;
}

/// Credential enrollment. Payloads are WebAuthn JSON, opaque to callers.
#[async_trait]
pub trait RegistrationService: Send + Sync {
    /// Creation options (`{"publicKey": {...}}`) for `user_id`.
    async fn begin_registration(&self, user_id: &str) -> Result<Value>;

    /// Submit the authenticator's attestation. Returns whether it verified.
    async fn finish_registration(&self, user_id: &str, credential: &Value) -> Result<bool>;

    async fn registration_status(&self, user_id: &str) -> Result<bool>;
}
