//! Application state module
//!
//! Defines shared state accessible across all request handlers.

use std::sync::Arc;

use chrono::Utc;
use clockgate_core::AttendanceLedger;

use crate::auth::TokenIssuer;
use crate::config::Config;
use crate::error::ApiError;
use crate::webauthn::{RelyingParty, WebAuthnConfig};

/// Application state containing shared resources.
#[derive(Clone)]
pub struct AppState {
    /// Employees and attendance records
    pub ledger: Arc<AttendanceLedger>,
    /// Session token issuer/validator
    pub tokens: Arc<TokenIssuer>,
    /// Verifies clock-action assertions and enrolls credentials
    pub relying_party: Arc<RelyingParty>,
}

impl AppState {
    /// Build state from config with the fixture employees loaded.
    pub fn new(config: &Config, webauthn: WebAuthnConfig) -> Result<Self, ApiError> {
        let ledger = AttendanceLedger::with_fixtures(Utc::now().date_naive());
        Ok(Self {
            ledger: Arc::new(ledger),
            tokens: Arc::new(TokenIssuer::from_config(config)?),
            relying_party: Arc::new(RelyingParty::for_mode(config.ceremony_mode, webauthn)),
        })
    }

    /// State with the local relying party (`localhost`, `http://localhost:3000`)
    pub fn local(config: &Config) -> Result<Self, ApiError> {
        let webauthn = WebAuthnConfig::local().map_err(|e| {
            ApiError::internal(format!("Failed to create WebAuthn config: {:?}", e))
        })?;
        Self::new(config, webauthn)
    }
}
