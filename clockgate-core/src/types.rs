//! Domain types shared by the ceremony, the coordinator and the services.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use crate::codec;
use crate::error::DecodeError;

/// The business action a ceremony gates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ClockAction {
    ClockIn,
    ClockOut,
}

impl ClockAction {
    /// Label used in user-facing messages ("Clock-in", "Clock-out").
    pub fn label(&self) -> &'static str {
        match self {
            Self::ClockIn => "Clock-in",
            Self::ClockOut => "Clock-out",
        }
    }
}

impl std::fmt::Display for ClockAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ClockIn => write!(f, "clock-in"),
            Self::ClockOut => write!(f, "clock-out"),
        }
    }
}

/// One ceremony as requested by the main window.
#[derive(Debug, Clone)]
pub struct VerificationRequest {
    pub subject_id: String,
    pub action: ClockAction,
    /// Random bytes identifying this ceremony.
    pub nonce: [u8; 32],
}

/// Why a ceremony did not produce an assertion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// No user-verifying platform authenticator on this device.
    NotSupported,
    /// The subject has no enrolled credential.
    NoCredential,
    /// Explicit cancel, popup closed, or the platform timed out.
    UserCancelled,
    /// Insecure context/origin or tampered ceremony material.
    SecurityViolation,
    /// Backend unreachable during begin/finish.
    NetworkError,
    Unknown,
}

impl FailureReason {
    /// Whether the user may immediately try again on the same device.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::UserCancelled | Self::NetworkError | Self::Unknown
        )
    }

    /// Human-readable message shown for this reason.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::NotSupported => {
                "Biometric verification is not supported on this device or browser."
            }
            Self::NoCredential => {
                "No biometric credential is registered for your account. Please register a device first."
            }
            Self::UserCancelled => "Verification cancelled.",
            Self::SecurityViolation => {
                "Verification was blocked for security reasons. Please contact your administrator."
            }
            Self::NetworkError => {
                "Could not reach the verification service. Check your connection and try again."
            }
            Self::Unknown => "Verification failed. Please try again.",
        }
    }
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tag = match self {
            Self::NotSupported => "not_supported",
            Self::NoCredential => "no_credential",
            Self::UserCancelled => "user_cancelled",
            Self::SecurityViolation => "security_violation",
            Self::NetworkError => "network_error",
            Self::Unknown => "unknown",
        };
        f.write_str(tag)
    }
}

/// Authenticator response fields of a serialized assertion, all base64url.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssertionResponse {
    #[serde(rename = "clientDataJSON")]
    pub client_data_json: String,
    #[serde(rename = "authenticatorData")]
    pub authenticator_data: String,
    pub signature: String,
    #[serde(rename = "userHandle", default, skip_serializing_if = "Option::is_none")]
    pub user_handle: Option<String>,
}

/// Transport form of a WebAuthn `PublicKeyCredential` assertion.
///
/// Field names follow the browser JSON serialization so the server can hand
/// the value straight to a relying-party library.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializedAssertion {
    pub id: String,
    #[serde(rename = "rawId")]
    pub raw_id: String,
    #[serde(rename = "type")]
    pub credential_type: String,
    pub response: AssertionResponse,
}

/// Binary view of a [`SerializedAssertion`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedAssertion {
    pub credential_id: Vec<u8>,
    pub client_data_json: Vec<u8>,
    pub authenticator_data: Vec<u8>,
    pub signature: Vec<u8>,
    pub user_handle: Option<Vec<u8>>,
}

impl SerializedAssertion {
    /// Decode every binary field through the challenge codec.
    pub fn decode(&self) -> Result<DecodedAssertion, DecodeError> {
        let credential_id = codec::decode(&self.raw_id)?;
        if codec::encode(&credential_id) != self.id {
            return Err(DecodeError("credential id does not match raw id".into()));
        }
        Ok(DecodedAssertion {
            credential_id,
            client_data_json: codec::decode(&self.response.client_data_json)?,
            authenticator_data: codec::decode(&self.response.authenticator_data)?,
            signature: codec::decode(&self.response.signature)?,
            user_handle: self
                .response
                .user_handle
                .as_deref()
                .map(codec::decode)
                .transpose()?,
        })
    }
}

impl From<&DecodedAssertion> for SerializedAssertion {
    fn from(decoded: &DecodedAssertion) -> Self {
        let id = codec::encode(&decoded.credential_id);
        Self {
            raw_id: id.clone(),
            id,
            credential_type: "public-key".to_string(),
            response: AssertionResponse {
                client_data_json: codec::encode(&decoded.client_data_json),
                authenticator_data: codec::encode(&decoded.authenticator_data),
                signature: codec::encode(&decoded.signature),
                user_handle: decoded.user_handle.as_deref().map(codec::encode),
            },
        }
    }
}

/// Result of one ceremony.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationOutcome {
    Success {
        assertion: SerializedAssertion,
    },
    Failure {
        reason: FailureReason,
        detail: Option<String>,
    },
}

impl VerificationOutcome {
    pub fn failure(reason: FailureReason) -> Self {
        Self::Failure {
            reason,
            detail: None,
        }
    }

    pub fn failure_with(reason: FailureReason, detail: impl Into<String>) -> Self {
        Self::Failure {
            reason,
            detail: Some(detail.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    pub fn failure_reason(&self) -> Option<FailureReason> {
        match self {
            Self::Success { .. } => None,
            Self::Failure { reason, .. } => Some(*reason),
        }
    }

    pub fn kind(&self) -> OutcomeKind {
        match self {
            Self::Success { .. } => OutcomeKind::Success,
            Self::Failure { reason, .. } => OutcomeKind::Failure(*reason),
        }
    }
}

/// A platform-owned credential as enrolled for a subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    /// Base64url credential id.
    pub id: String,
    /// COSE algorithm identifier (-7 = ES256).
    pub public_key_algorithm: i64,
    /// Attestation or assertion response blob, opaque to the application.
    #[serde(default)]
    pub response: Vec<u8>,
}

/// Entry of an allow-list handed to the platform authenticator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialDescriptor {
    /// Base64url credential id.
    pub id: String,
    #[serde(rename = "type", default = "public_key_type")]
    pub credential_type: String,
}

fn public_key_type() -> String {
    "public-key".to_string()
}

impl CredentialDescriptor {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            credential_type: public_key_type(),
        }
    }
}

/// Device position attached to a clock event.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoLocation {
    pub lat: f64,
    pub lng: f64,
}

/// A committed clock action, as submitted to the attendance service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClockEvent {
    pub user_id: String,
    pub action: ClockAction,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<GeoLocation>,
}

/// Success or failure tag of a resolved ceremony.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeKind {
    Success,
    Failure(FailureReason),
}

/// UI-visible state of a verification session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    AwaitingPopup,
    AwaitingMessage,
    Resolved(OutcomeKind),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Employee,
    Hr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UserStatus {
    Active,
    Inactive,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub department: String,
    pub status: UserStatus,
}

impl User {
    pub fn is_active(&self) -> bool {
        self.status == UserStatus::Active
    }
}

/// Fields accepted when creating or updating an employee.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmployeeDraft {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<UserStatus>,
}

/// One user's attendance for one day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceRecord {
    pub id: String,
    pub user_id: String,
    pub user_name: String,
    pub date: NaiveDate,
    pub clock_in: Option<NaiveTime>,
    pub clock_out: Option<NaiveTime>,
    pub total_hours: Option<f64>,
    #[serde(default)]
    pub is_late: bool,
}

/// Filters for the attendance log listing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
    /// Case-insensitive substring of the employee name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AbsenteeismPoint {
    pub name: String,
    #[serde(rename = "Present")]
    pub present: u32,
    #[serde(rename = "Absent")]
    pub absent: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkingHoursPoint {
    pub name: String,
    pub avg_hours: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reports {
    pub absenteeism_trends: Vec<AbsenteeismPoint>,
    pub working_hours: Vec<WorkingHoursPoint>,
}

/// Headcount for one day, as on the admin dashboard.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailySummary {
    pub total_employees: usize,
    pub present_today: usize,
    pub absent_today: usize,
    pub late_arrivals: usize,
}

impl DailySummary {
    /// Count active `employees` against the records of a single day.
    /// Inactive employees are left out of every figure.
    pub fn tally(employees: &[User], records: &[AttendanceRecord]) -> Self {
        let active: Vec<&User> = employees
            .iter()
            .filter(|user| user.status == UserStatus::Active)
            .collect();
        let arrived: Vec<&AttendanceRecord> = records
            .iter()
            .filter(|record| record.clock_in.is_some())
            .filter(|record| active.iter().any(|user| user.id == record.user_id))
            .collect();

        let present = arrived.len().min(active.len());
        Self {
            total_employees: active.len(),
            present_today: present,
            absent_today: active.len() - present,
            late_arrivals: arrived.iter().filter(|record| record.is_late).count(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_decoded() -> DecodedAssertion {
        DecodedAssertion {
            credential_id: b"cred-1".to_vec(),
            client_data_json: br#"{"type":"webauthn.get"}"#.to_vec(),
            authenticator_data: vec![1, 2, 3, 4, 5],
            signature: vec![9; 32],
            user_handle: Some(b"u-42".to_vec()),
        }
    }

    fn staff(id: &str, status: UserStatus) -> User {
        User {
            id: id.into(),
            name: format!("User {id}"),
            email: format!("user{id}@pardee.com"),
            role: Role::Employee,
            department: "Engineering".into(),
            status,
        }
    }

    fn arrival(user_id: &str, at: (u32, u32), is_late: bool) -> AttendanceRecord {
        AttendanceRecord {
            id: format!("a{user_id}"),
            user_id: user_id.into(),
            user_name: format!("User {user_id}"),
            date: NaiveDate::from_ymd_opt(2024, 5, 6).unwrap(),
            clock_in: NaiveTime::from_hms_opt(at.0, at.1, 0),
            clock_out: None,
            total_hours: None,
            is_late,
        }
    }

    #[test]
    fn test_daily_summary_counts_active_staff() {
        let employees = [
            staff("1", UserStatus::Active),
            staff("2", UserStatus::Active),
            staff("3", UserStatus::Active),
            staff("4", UserStatus::Inactive),
        ];
        let records = [
            arrival("1", (8, 50), false),
            arrival("2", (9, 20), true),
            // Inactive staff do not count
            arrival("4", (9, 30), true),
        ];

        let summary = DailySummary::tally(&employees, &records);
        assert_eq!(
            summary,
            DailySummary {
                total_employees: 3,
                present_today: 2,
                absent_today: 1,
                late_arrivals: 1,
            }
        );
        assert_eq!(DailySummary::tally(&employees, &[]).absent_today, 3);
    }

    #[test]
    fn test_serialized_assertion_json_shape() {
        let assertion = SerializedAssertion::from(&sample_decoded());
        let json = serde_json::to_value(&assertion).unwrap();
        assert_eq!(json["type"], "public-key");
        assert_eq!(json["id"], json["rawId"]);
        assert!(json["response"]["clientDataJSON"].is_string());
        assert!(json["response"]["authenticatorData"].is_string());
        assert_eq!(json["response"]["userHandle"], "dS00Mg");
    }

    #[test]
    fn test_serialized_assertion_decodes_back() {
        let decoded = sample_decoded();
        let assertion = SerializedAssertion::from(&decoded);
        assert_eq!(assertion.decode().unwrap(), decoded);
    }

    #[test]
    fn test_tampered_assertion_fails_decode() {
        let mut assertion = SerializedAssertion::from(&sample_decoded());
        assertion.response.signature = "not*base64".to_string();
        assert!(assertion.decode().is_err());

        let mut mismatched = SerializedAssertion::from(&sample_decoded());
        mismatched.id = "other".to_string();
        assert!(mismatched.decode().is_err());
    }

    #[test]
    fn test_failure_messages_are_distinct() {
        let reasons = [
            FailureReason::NotSupported,
            FailureReason::NoCredential,
            FailureReason::UserCancelled,
            FailureReason::SecurityViolation,
            FailureReason::NetworkError,
            FailureReason::Unknown,
        ];
        let messages: std::collections::HashSet<_> =
            reasons.iter().map(|r| r.user_message()).collect();
        assert_eq!(messages.len(), reasons.len());
    }

    #[test]
    fn test_retryable_reasons() {
        assert!(FailureReason::UserCancelled.is_retryable());
        assert!(FailureReason::NetworkError.is_retryable());
        assert!(!FailureReason::NotSupported.is_retryable());
        assert!(!FailureReason::NoCredential.is_retryable());
        assert!(!FailureReason::SecurityViolation.is_retryable());
    }

    #[test]
    fn test_attendance_record_wire_format() {
        let record = AttendanceRecord {
            id: "a1".into(),
            user_id: "2".into(),
            user_name: "Bob".into(),
            date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            clock_in: NaiveTime::from_hms_opt(8, 55, 12),
            clock_out: None,
            total_hours: None,
            is_late: false,
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["userId"], "2");
        assert_eq!(json["date"], "2024-03-01");
        assert_eq!(json["clockIn"], "08:55:12");
        assert!(json["clockOut"].is_null());
    }

    #[test]
    fn test_failure_reason_serialization() {
        let json = serde_json::to_string(&FailureReason::UserCancelled).unwrap();
        assert_eq!(json, "\"user_cancelled\"");
        assert_eq!(FailureReason::UserCancelled.to_string(), "user_cancelled");
    }
}
