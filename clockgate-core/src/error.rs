use thiserror::Error;

/// Malformed transport text handed to the challenge codec.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid base64url value: {0}")]
pub struct DecodeError(pub String);

/// Errors returned by [`crate::session::VerificationSession`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("A verification ceremony is already in progress")]
    Busy,
}

/// Errors raised by a window host when opening a popup.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WindowError {
    #[error("Popup blocked: {0}")]
    Blocked(String),

    #[error("Invalid popup address: {0}")]
    InvalidAddress(String),
}

/// Errors surfaced by the attendance and registration services.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    /// The service could not be reached.
    #[error("Network error: {0}")]
    Network(String),

    /// The service refused the request; carries the service-defined text.
    #[error("{0}")]
    Rejected(String),

    #[error("Not authenticated")]
    Unauthorized,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unexpected response: {0}")]
    Decode(String),
}

/// Attendance business-rule violations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("You have already clocked in today.")]
    AlreadyClockedIn,

    #[error("You haven't clocked in today.")]
    NotClockedIn,

    #[error("You have already clocked out today.")]
    AlreadyClockedOut,

    #[error("Unknown user: {0}")]
    UnknownUser(String),

    #[error("User {0} is inactive")]
    InactiveUser(String),

    #[error("Email already in use: {0}")]
    DuplicateEmail(String),

    #[error("Missing required field: {0}")]
    MissingField(&'static str),
}

impl From<LedgerError> for ServiceError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::UnknownUser(id) => Self::NotFound(format!("user {id}")),
            other => Self::Rejected(other.to_string()),
        }
    }
}

pub type Result<T, E = ServiceError> = std::result::Result<T, E>;
