//! Platform authenticator abstraction.
//!
//! The popup never talks to hardware directly. It asks a
//! [`PlatformAuthenticator`] whether a user-verifying platform authenticator
//! exists and, if so, for an assertion over the ceremony challenge.
//!
//! [`crate::simulated::SimulatedAuthenticator`] is the in-process
//! implementation used by the CLI demo and the tests.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::codec;
use crate::error::DecodeError;
use crate::types::{CredentialDescriptor, DecodedAssertion};

/// WebAuthn `userVerification` requirement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserVerification {
    Required,
    Preferred,
    Discouraged,
}

/// Parameters of a `navigator.credentials.get()` call.
#[derive(Debug, Clone)]
pub struct AssertionOptions {
    pub challenge: Vec<u8>,
    pub rp_id: String,
    /// Origin of the calling page, embedded in the client data.
    pub origin: String,
    pub allow_credentials: Vec<CredentialDescriptor>,
    pub timeout: Duration,
    pub user_verification: UserVerification,
}

/// Parameters of a `navigator.credentials.create()` call.
#[derive(Debug, Clone)]
pub struct CreationOptions {
    pub challenge: Vec<u8>,
    pub rp_id: String,
    pub origin: String,
    pub user_id: Vec<u8>,
    pub user_name: String,
    pub timeout: Duration,
}

impl CreationOptions {
    /// Read WebAuthn creation options (`{"publicKey": {...}}`) as returned
    /// by a registration begin endpoint.
    pub fn from_public_key_json(
        value: &Value,
        origin: &str,
        default_timeout: Duration,
    ) -> Result<Self, DecodeError> {
        let public_key = value.get("publicKey").unwrap_or(value);
        let text = |pointer: &str| {
            public_key
                .pointer(pointer)
                .and_then(Value::as_str)
                .ok_or_else(|| DecodeError(format!("missing {pointer}")))
        };

        Ok(Self {
            challenge: codec::decode(text("/challenge")?)?,
            rp_id: text("/rp/id")?.to_string(),
            origin: origin.to_string(),
            user_id: codec::decode(text("/user/id")?)?,
            user_name: text("/user/name")?.to_string(),
            timeout: public_key
                .get("timeout")
                .and_then(Value::as_u64)
                .map_or(default_timeout, Duration::from_millis),
        })
    }
}

/// Output of a successful credential creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCredential {
    pub credential_id: Vec<u8>,
    pub client_data_json: Vec<u8>,
    pub attestation_object: Vec<u8>,
}

/// Errors a platform authenticator may raise, mirroring the DOM exceptions
/// browsers throw from the credentials API.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthenticatorError {
    /// The user dismissed the prompt, no credential matched, or the
    /// platform timed out.
    #[error("Operation not allowed: {0}")]
    NotAllowed(String),

    /// Insecure context or an RP id that does not match the origin.
    #[error("Security error: {0}")]
    Security(String),

    #[error("Authenticator not supported: {0}")]
    NotSupported(String),

    #[error("{0}")]
    Other(String),
}

/// A user-verifying platform authenticator (fingerprint, face, PIN).
///
/// Implementations must be thread-safe (`Send + Sync`).
#[async_trait]
pub trait PlatformAuthenticator: Send + Sync {
    /// `isUserVerifyingPlatformAuthenticatorAvailable()`.
    async fn is_available(&self) -> bool;

    /// Produce an assertion over `options.challenge` with one of the
    /// allowed credentials.
    async fn get_assertion(
        &self,
        options: &AssertionOptions,
    ) -> Result<DecodedAssertion, AuthenticatorError>;

    /// Enroll a new credential for `options.user_id`.
    async fn create_credential(
        &self,
        options: &CreationOptions,
    ) -> Result<NewCredential, AuthenticatorError>;
}

/// Transport form of a newly created credential
/// (`PublicKeyCredential` with an attestation response).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializedRegistration {
    pub id: String,
    #[serde(rename = "rawId")]
    pub raw_id: String,
    #[serde(rename = "type")]
    pub credential_type: String,
    pub response: AttestationResponse,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttestationResponse {
    #[serde(rename = "clientDataJSON")]
    pub client_data_json: String,
    #[serde(rename = "attestationObject")]
    pub attestation_object: String,
}

impl From<&NewCredential> for SerializedRegistration {
    fn from(credential: &NewCredential) -> Self {
        let id = codec::encode(&credential.credential_id);
        Self {
            raw_id: id.clone(),
            id,
            credential_type: "public-key".to_string(),
            response: AttestationResponse {
                client_data_json: codec::encode(&credential.client_data_json),
                attestation_object: codec::encode(&credential.attestation_object),
            },
        }
    }
}

impl SerializedRegistration {
    pub fn decode(&self) -> Result<NewCredential, DecodeError> {
        let credential_id = codec::decode(&self.raw_id)?;
        if codec::encode(&credential_id) != self.id {
            return Err(DecodeError("credential id does not match raw id".into()));
        }
        Ok(NewCredential {
            credential_id,
            client_data_json: codec::decode(&self.response.client_data_json)?,
            attestation_object: codec::decode(&self.response.attestation_object)?,
        })
    }
}
