//! Exit codes following sysexits.h conventions.
//!
//! These codes let scripts tell a refused clock action from a failed
//! verification or an unreachable server.

/// Successful execution.
pub const SUCCESS: i32 = 0;

/// General error (catch-all).
pub const GENERAL_ERROR: i32 = 1;

/// Command line usage error (invalid arguments).
/// Maps to EX_USAGE from sysexits.h.
pub const USAGE_ERROR: i32 = 64;

/// The attendance rules refused the action (already clocked in, not
/// clocked in, missing location).
/// Maps to EX_DATAERR from sysexits.h.
pub const ACTION_REFUSED: i32 = 65;

/// Server unreachable or verification service down.
/// Maps to EX_UNAVAILABLE from sysexits.h.
pub const NETWORK_ERROR: i32 = 69;

/// Login refused, biometric verification failed or role not allowed.
/// Maps to EX_NOPERM from sysexits.h.
pub const NOT_PERMITTED: i32 = 77;

/// An error that already knows its exit code.
#[derive(Debug)]
pub struct CliFailure {
    pub code: i32,
    pub message: String,
}

impl CliFailure {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for CliFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for CliFailure {}

/// Represents an exit code with optional error context.
pub struct ExitCode {
    pub code: i32,
    pub message: Option<String>,
}

impl ExitCode {
    pub const fn success() -> Self {
        Self {
            code: SUCCESS,
            message: None,
        }
    }

    pub fn from_anyhow(err: &anyhow::Error) -> Self {
        if let Some(failure) = err.downcast_ref::<CliFailure>() {
            return Self {
                code: failure.code,
                message: Some(format!("{err:#}")),
            };
        }

        let message = format!("{err:#}");

        // Classify error by inspecting the chain
        let code = if message.contains("Network error") || message.contains("Failed to connect") {
            NETWORK_ERROR
        } else if message.contains("Not authenticated") || message.contains("Invalid credentials") {
            NOT_PERMITTED
        } else if message.contains("Invalid server URL") || message.contains("Invalid location") {
            USAGE_ERROR
        } else {
            GENERAL_ERROR
        };

        Self {
            code,
            message: Some(message),
        }
    }
}
