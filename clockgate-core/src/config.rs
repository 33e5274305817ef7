//! Verification configuration
//!
//! Loaded from `CLOCKGATE_*` environment variables with sensible defaults.

use std::time::Duration;

use url::Url;

use crate::popup::PopupTimings;

const DEFAULT_APP_URL: &str = "http://localhost:3000";

/// Settings shared by the verification session, the popup and the
/// clock-action coordinator.
#[derive(Debug, Clone)]
pub struct VerificationConfig {
    /// Dashboard base URL; its origin is the trusted message origin
    /// (default: http://localhost:3000)
    pub app_url: Url,
    /// Route the popup is opened at (default: /auth-popup)
    pub popup_route: String,
    /// Relying party id (default: host of `app_url`)
    pub rp_id: String,
    /// How often the session checks whether the popup was closed (default: 500ms)
    pub poll_interval: Duration,
    /// Upper bound on the platform prompt (default: 60s)
    pub ceremony_timeout: Duration,
    /// Popup self-close delays
    pub popup_timings: PopupTimings,
    /// Refuse clock actions without a device location (default: true)
    pub require_location: bool,
}

impl VerificationConfig {
    pub fn new(app_url: Url) -> Self {
        let rp_id = app_url.host_str().unwrap_or("localhost").to_string();
        Self {
            app_url,
            popup_route: "/auth-popup".to_string(),
            rp_id,
            poll_interval: Duration::from_millis(500),
            ceremony_timeout: Duration::from_secs(60),
            popup_timings: PopupTimings::default(),
            require_location: true,
        }
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let app_url = std::env::var("CLOCKGATE_APP_URL")
            .ok()
            .and_then(|u| Url::parse(&u).ok())
            .unwrap_or_else(default_app_url);

        let mut config = Self::new(app_url);

        if let Ok(rp_id) = std::env::var("CLOCKGATE_RP_ID") {
            config.rp_id = rp_id;
        }

        if let Some(ms) = std::env::var("CLOCKGATE_POLL_INTERVAL_MS")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            config.poll_interval = Duration::from_millis(ms);
        }

        if let Some(secs) = std::env::var("CLOCKGATE_CEREMONY_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            config.ceremony_timeout = Duration::from_secs(secs);
        }

        config.require_location = std::env::var("CLOCKGATE_REQUIRE_LOCATION")
            .map(|v| v.to_lowercase() != "false")
            .unwrap_or(true);

        config
    }

    /// Origin of the dashboard, e.g. `http://localhost:3000`.
    pub fn app_origin(&self) -> String {
        self.app_url.origin().ascii_serialization()
    }
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self::new(default_app_url())
    }
}

fn default_app_url() -> Url {
    Url::parse(DEFAULT_APP_URL).unwrap_or_else(|_| unreachable!("default app URL is valid"))
}
