//! WebAuthn/FIDO2 module for Clockgate
//!
//! Every clock action must be backed by a user-verified platform
//! authenticator assertion.
//!
//! ## Architecture
//!
//! - `config`: WebAuthn Relying Party configuration
//! - `relying_party`: challenge issue and assertion verification (passkey or simulated)
//! - `handlers`: HTTP endpoints for enrollment and challenges
//! - `storage`: in-memory pending ceremonies and passkeys
//! - `types`: request/response envelopes

mod config;
pub mod handlers;
pub mod relying_party;
pub mod storage;
mod types;

pub use config::{ConfigError, WebAuthnConfig};
pub use handlers::{begin_login, begin_registration, finish_registration, registration_status};
pub use relying_party::{PasskeyRelyingParty, RelyingParty, SimulatedRelyingParty};
pub use storage::{PasskeyStore, PendingStore};
pub use types::{BeginLoginRequest, RegistrationStatusResponse, VerifiedResponse};
