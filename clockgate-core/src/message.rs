//! Cross-window message contract between the popup and its opener.
//!
//! The popup posts exactly one `webauthn-result` message per ceremony:
//!
//! ```json
//! { "type": "webauthn-result", "success": true, "credential": { ... } }
//! { "type": "webauthn-result", "success": false, "error": "...", "reason": "user_cancelled" }
//! ```

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::types::{FailureReason, SerializedAssertion, VerificationOutcome};

/// Payload tag identifying a verification outcome message.
pub const RESULT_MESSAGE_TYPE: &str = "webauthn-result";

/// Wire form of a [`VerificationOutcome`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultMessage {
    #[serde(rename = "type")]
    pub kind: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Unrecognized tags read as [`FailureReason::Unknown`].
    #[serde(
        default,
        deserialize_with = "lenient_reason",
        skip_serializing_if = "Option::is_none"
    )]
    pub reason: Option<FailureReason>,
}

fn lenient_reason<'de, D>(deserializer: D) -> Result<Option<FailureReason>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(raw.map(|value| serde_json::from_value(value).unwrap_or(FailureReason::Unknown)))
}

impl ResultMessage {
    pub fn from_outcome(outcome: &VerificationOutcome) -> Self {
        match outcome {
            VerificationOutcome::Success { assertion } => Self {
                kind: RESULT_MESSAGE_TYPE.to_string(),
                success: true,
                // Serializing a struct of strings cannot fail
                credential: serde_json::to_value(assertion).ok(),
                error: None,
                reason: None,
            },
            VerificationOutcome::Failure { reason, detail } => Self {
                kind: RESULT_MESSAGE_TYPE.to_string(),
                success: false,
                credential: None,
                error: Some(
                    detail
                        .clone()
                        .unwrap_or_else(|| reason.user_message().to_string()),
                ),
                reason: Some(*reason),
            },
        }
    }

    /// Parse a raw message payload. `None` unless it carries the
    /// `webauthn-result` tag; an error if the tagged body is malformed.
    pub fn parse(data: &Value) -> Option<Result<Self, serde_json::Error>> {
        if data.get("type").and_then(Value::as_str) != Some(RESULT_MESSAGE_TYPE) {
            return None;
        }
        Some(serde_json::from_value(data.clone()))
    }

    /// Outcome carried by a raw payload, `None` for unrelated traffic.
    ///
    /// A tagged payload that does not parse is a
    /// [`FailureReason::SecurityViolation`].
    pub fn outcome_of(data: &Value) -> Option<VerificationOutcome> {
        Some(match Self::parse(data)? {
            Ok(message) => message.into_outcome(),
            Err(e) => VerificationOutcome::failure_with(
                FailureReason::SecurityViolation,
                format!("malformed result message: {e}"),
            ),
        })
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// Convert into an outcome, validating the credential on success.
    ///
    /// A credential that does not deserialize or whose binary fields do not
    /// decode is a [`FailureReason::SecurityViolation`].
    pub fn into_outcome(self) -> VerificationOutcome {
        if self.success {
            let Some(credential) = self.credential else {
                return VerificationOutcome::failure_with(
                    FailureReason::Unknown,
                    "verification reported success without a credential",
                );
            };
            let assertion: SerializedAssertion = match serde_json::from_value(credential) {
                Ok(assertion) => assertion,
                Err(e) => {
                    return VerificationOutcome::failure_with(
                        FailureReason::SecurityViolation,
                        format!("malformed credential: {e}"),
                    )
                }
            };
            if let Err(e) = assertion.decode() {
                return VerificationOutcome::failure_with(
                    FailureReason::SecurityViolation,
                    format!("malformed credential: {e}"),
                );
            }
            VerificationOutcome::Success { assertion }
        } else {
            VerificationOutcome::Failure {
                reason: self.reason.unwrap_or(FailureReason::Unknown),
                detail: self.error,
            }
        }
    }
}
