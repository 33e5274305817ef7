//! Server configuration module
//!
//! Handles loading configuration from environment variables with sensible defaults.

use std::net::SocketAddr;
use std::str::FromStr;

use axum::http::{header, HeaderValue, Method};
use tower_http::cors::{Any, CorsLayer};

/// How clock-action assertions are verified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CeremonyMode {
    /// Real passkeys, verified with webauthn-rs.
    WebAuthn,
    /// Simulated authenticator signatures (demos and tests only).
    Simulated,
}

impl FromStr for CeremonyMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "webauthn" | "passkey" => Ok(Self::WebAuthn),
            "simulated" | "mock" => Ok(Self::Simulated),
            other => Err(format!("unknown ceremony mode '{other}'")),
        }
    }
}

impl std::fmt::Display for CeremonyMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::WebAuthn => f.write_str("webauthn"),
            Self::Simulated => f.write_str("simulated"),
        }
    }
}

/// Server configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Server port (default: 3000)
    pub port: u16,
    /// Server host (default: 127.0.0.1)
    pub host: [u8; 4],
    /// Allowed CORS origins, comma-separated (default: allow all in dev)
    pub allowed_origins: Option<Vec<String>>,
    /// Request body limit in KB (default: 64)
    pub body_limit_kb: usize,
    /// Request timeout in seconds (default: 30)
    pub timeout_secs: u64,
    /// Enable rate limiting (default: false for tests, true when loaded from env)
    pub rate_limit_enabled: bool,
    /// Rate limit: requests per second (default: 10)
    pub rate_limit_per_sec: u64,
    /// Rate limit: burst size (default: 20)
    pub rate_limit_burst: u32,
    /// HS256 signing secret for session tokens (random per process when unset)
    pub jwt_secret: Option<String>,
    /// Session token lifetime in seconds (default: 8 hours)
    pub token_ttl_secs: u64,
    /// Assertion verification mode (default: simulated for tests, webauthn from env)
    pub ceremony_mode: CeremonyMode,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 3000,
            host: [127, 0, 0, 1],
            allowed_origins: None, // None = allow all (dev mode)
            body_limit_kb: 64,
            timeout_secs: 30,
            rate_limit_enabled: false, // Disabled by default (for tests)
            rate_limit_per_sec: 10,
            rate_limit_burst: 20,
            jwt_secret: None,
            token_ttl_secs: 8 * 3600,
            ceremony_mode: CeremonyMode::Simulated, // from_env() defaults to webauthn
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let port = env_parse("PORT").unwrap_or(3000);

        let host = std::env::var("HOST")
            .ok()
            .map(|h| {
                if h == "0.0.0.0" {
                    [0, 0, 0, 0]
                } else {
                    [127, 0, 0, 1]
                }
            })
            .unwrap_or([127, 0, 0, 1]);

        let allowed_origins = std::env::var("ALLOWED_ORIGINS").ok().map(|origins| {
            origins
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        });

        // Rate limiting enabled by default in production, can be disabled with RATE_LIMIT_ENABLED=false
        let rate_limit_enabled = std::env::var("RATE_LIMIT_ENABLED")
            .map(|v| v.to_lowercase() != "false")
            .unwrap_or(true);

        let jwt_secret = std::env::var("JWT_SECRET").ok().filter(|s| !s.is_empty());

        let ceremony_mode = match std::env::var("CEREMONY_MODE") {
            Ok(value) => value.parse().unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Invalid CEREMONY_MODE, using webauthn");
                CeremonyMode::WebAuthn
            }),
            Err(_) => CeremonyMode::WebAuthn,
        };

        Self {
            port,
            host,
            allowed_origins,
            body_limit_kb: env_parse("BODY_LIMIT_KB").unwrap_or(64),
            timeout_secs: env_parse("REQUEST_TIMEOUT_SECS").unwrap_or(30),
            rate_limit_enabled,
            rate_limit_per_sec: env_parse("RATE_LIMIT_PER_SEC").unwrap_or(10),
            rate_limit_burst: env_parse("RATE_LIMIT_BURST").unwrap_or(20),
            jwt_secret,
            token_ttl_secs: env_parse("TOKEN_TTL_SECS").unwrap_or(8 * 3600),
            ceremony_mode,
        }
    }

    /// Get socket address from config
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::from((self.host, self.port))
    }

    /// CORS for the dashboard origins, or any origin when none are configured.
    ///
    /// Bearer tokens travel in `Authorization`, so restricted mode allows
    /// that header explicitly.
    pub fn cors_layer(&self) -> CorsLayer {
        match &self.allowed_origins {
            Some(origins) if !origins.is_empty() => {
                let origins: Vec<HeaderValue> =
                    origins.iter().filter_map(|o| o.parse().ok()).collect();
                tracing::info!(count = origins.len(), "CORS restricted to configured origins");
                CorsLayer::new()
                    .allow_origin(origins)
                    .allow_methods([
                        Method::GET,
                        Method::POST,
                        Method::PUT,
                        Method::DELETE,
                        Method::OPTIONS,
                    ])
                    .allow_headers([header::CONTENT_TYPE, header::ACCEPT, header::AUTHORIZATION])
            }
            _ => {
                tracing::warn!("CORS: Allowing all origins (dev mode)");
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any)
            }
        }
    }
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}
