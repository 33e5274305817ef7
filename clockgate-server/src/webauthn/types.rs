//! WebAuthn request/response types
//!
//! Ceremony options and credentials travel as raw WebAuthn JSON; only the
//! envelopes around them are typed here.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Request to start a verification ceremony before a clock action
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BeginLoginRequest {
    /// Employee id; must be the caller's own
    #[schema(example = "2")]
    pub user_id: String,
}

/// Result of a credential registration
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct VerifiedResponse {
    pub verified: bool,
}

/// Whether the caller has a credential enrolled
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationStatusResponse {
    pub is_registered: bool,
}
