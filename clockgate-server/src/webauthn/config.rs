//! WebAuthn Relying Party configuration
//!
//! Configures the WebAuthn library with Relying Party (RP) identity.

use url::Url;
use webauthn_rs::prelude::*;

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid origin URL: {0}")]
    InvalidOrigin(String),
    #[error("WebAuthn error: {0:?}")]
    Webauthn(WebauthnError),
}

/// WebAuthn configuration wrapper
pub struct WebAuthnConfig {
    webauthn: Webauthn,
    rp_id: String,
    rp_origin: Url,
    rp_name: String,
}

impl WebAuthnConfig {
    /// Create a new WebAuthn configuration
    ///
    /// # Arguments
    ///
    /// * `rp_id` - Relying Party ID (typically the domain name)
    /// * `rp_origin` - Origin of the dashboard that opens the verification popup
    /// * `rp_name` - Human-readable name for the Relying Party
    pub fn new(rp_id: &str, rp_origin: &Url, rp_name: &str) -> Result<Self, WebauthnError> {
        let builder = WebauthnBuilder::new(rp_id, rp_origin)?
            .rp_name(rp_name)
            .allow_subdomains(false);

        Ok(Self {
            webauthn: builder.build()?,
            rp_id: rp_id.to_string(),
            rp_origin: rp_origin.clone(),
            rp_name: rp_name.to_string(),
        })
    }

    /// Create configuration from environment variables
    ///
    /// Environment variables:
    /// - `WEBAUTHN_RP_ID` - Relying Party ID (default: "localhost")
    /// - `WEBAUTHN_RP_ORIGIN` - RP origin URL (default: "http://localhost:3000")
    /// - `WEBAUTHN_RP_NAME` - RP display name (default: "Clockgate")
    pub fn from_env() -> Result<Self, ConfigError> {
        let rp_id = std::env::var("WEBAUTHN_RP_ID").unwrap_or_else(|_| "localhost".to_string());
        let rp_origin = std::env::var("WEBAUTHN_RP_ORIGIN")
            .unwrap_or_else(|_| "http://localhost:3000".to_string());
        let rp_name = std::env::var("WEBAUTHN_RP_NAME").unwrap_or_else(|_| "Clockgate".to_string());

        let origin =
            Url::parse(&rp_origin).map_err(|e| ConfigError::InvalidOrigin(format!("{}", e)))?;

        Self::new(&rp_id, &origin, &rp_name).map_err(ConfigError::Webauthn)
    }

    /// Local development defaults (`localhost`, `http://localhost:3000`)
    pub fn local() -> Result<Self, ConfigError> {
        let origin = Url::parse("http://localhost:3000")
            .map_err(|e| ConfigError::InvalidOrigin(format!("{}", e)))?;
        Self::new("localhost", &origin, "Clockgate").map_err(ConfigError::Webauthn)
    }

    /// Get a reference to the Webauthn instance
    pub fn webauthn(&self) -> &Webauthn {
        &self.webauthn
    }

    pub fn rp_id(&self) -> &str {
        &self.rp_id
    }

    pub fn rp_name(&self) -> &str {
        &self.rp_name
    }

    /// ASCII serialization of the RP origin, as client data carries it.
    pub fn origin(&self) -> String {
        self.rp_origin.origin().ascii_serialization()
    }
}

impl std::fmt::Debug for WebAuthnConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebAuthnConfig")
            .field("rp_id", &self.rp_id)
            .field("rp_origin", &self.rp_origin.as_str())
            .field("webauthn", &"<Webauthn instance>")
            .finish()
    }
}
