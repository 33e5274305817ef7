//! Clockgate Server Library - REST API for biometric-verified attendance
//!
//! This library exposes the server components for use in integration tests.
//! The main binary uses these same components.

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod openapi;
pub mod routes;
pub mod state;
pub mod webauthn;

pub use auth::{AuthenticatedUser, SessionClaims, TokenIssuer};
pub use config::{CeremonyMode, Config};
pub use error::ApiError;
pub use openapi::ApiDoc;
pub use routes::{create_router, create_router_with_config};
pub use state::AppState;
pub use webauthn::{RelyingParty, WebAuthnConfig};
