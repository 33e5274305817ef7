//! Simulated platform authenticator for demos and testing.
//!
//! WARNING: Do not use in production. "Signatures" are SHA3 digests keyed
//! by the credential id, so anyone who knows a credential id can forge them.
//! This proves wiring, not possession.
//!
//! Layouts follow WebAuthn so the popup, the in-memory backend and the
//! server exercise the same decoding path as with a real authenticator:
//!
//! - client data: `{"type","challenge","origin","crossOrigin"}` JSON
//! - authenticator data: `SHA3-256(rp_id) || flags || counter (u32 BE)`
//! - signature: `SHA3-256(domain || credential_id || auth_data || SHA3-256(client_data))`

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashSet;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha3::{Digest, Sha3_256};
use thiserror::Error;

use crate::authenticator::{
    AssertionOptions, AuthenticatorError, CreationOptions, NewCredential, PlatformAuthenticator,
};
use crate::codec;
use crate::types::DecodedAssertion;

/// COSE algorithm id recorded for simulated credentials (private-use range).
pub const SIMULATED_ALGORITHM: i64 = -65537;

const SIGNATURE_DOMAIN: &[u8] = b"clockgate-simulated-assertion";
const FLAG_USER_PRESENT: u8 = 0x01;
const FLAG_USER_VERIFIED: u8 = 0x04;
const AUTH_DATA_LEN: usize = 37;
const CREDENTIAL_ID_LEN: usize = 16;

const GET_CEREMONY: &str = "webauthn.get";
const CREATE_CEREMONY: &str = "webauthn.create";

/// How the simulated user reacts to a prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimulatedBehavior {
    Approve,
    /// User dismisses the prompt.
    Cancel,
    /// Platform fails with an arbitrary error message.
    Fail(String),
    /// Page is not a secure context.
    InsecureContext,
    /// Prompt never completes.
    Hang,
}

/// In-process stand-in for a fingerprint/face authenticator.
pub struct SimulatedAuthenticator {
    available: bool,
    behavior: SimulatedBehavior,
    delay: Duration,
    credentials: DashSet<Vec<u8>>,
    counter: AtomicU32,
}

impl SimulatedAuthenticator {
    pub fn new() -> Self {
        Self {
            available: true,
            behavior: SimulatedBehavior::Approve,
            delay: Duration::ZERO,
            credentials: DashSet::new(),
            counter: AtomicU32::new(0),
        }
    }

    /// A device without a user-verifying platform authenticator.
    pub fn unsupported() -> Self {
        Self {
            available: false,
            ..Self::new()
        }
    }

    pub fn with_behavior(mut self, behavior: SimulatedBehavior) -> Self {
        self.behavior = behavior;
        self
    }

    /// Time the simulated user takes to respond.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Hold an already-enrolled credential.
    pub fn with_credential(self, credential_id: impl AsRef<[u8]>) -> Self {
        self.credentials.insert(credential_id.as_ref().to_vec());
        self
    }

    pub fn holds(&self, credential_id: &[u8]) -> bool {
        self.credentials.contains(credential_id)
    }

    /// Current signature counter.
    pub fn sign_count(&self) -> u32 {
        self.counter.load(Ordering::Relaxed)
    }

    /// Play out the prompt: wait, then apply the configured behavior.
    async fn prompt(&self) -> Result<(), AuthenticatorError> {
        if self.behavior == SimulatedBehavior::Hang {
            std::future::pending::<()>().await;
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        match &self.behavior {
            SimulatedBehavior::Approve | SimulatedBehavior::Hang => Ok(()),
            SimulatedBehavior::Cancel => Err(AuthenticatorError::NotAllowed(
                "The user cancelled the verification prompt".into(),
            )),
            SimulatedBehavior::Fail(message) => Err(AuthenticatorError::Other(message.clone())),
            SimulatedBehavior::InsecureContext => Err(AuthenticatorError::Security(
                "The operation is insecure".into(),
            )),
        }
    }
}

impl Default for SimulatedAuthenticator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PlatformAuthenticator for SimulatedAuthenticator {
    async fn is_available(&self) -> bool {
        self.available
    }

    async fn get_assertion(
        &self,
        options: &AssertionOptions,
    ) -> Result<DecodedAssertion, AuthenticatorError> {
        if !self.available {
            return Err(AuthenticatorError::NotSupported(
                "no platform authenticator".into(),
            ));
        }
        self.prompt().await?;

        // An empty allow-list means any discoverable credential will do
        let credential_id = if options.allow_credentials.is_empty() {
            self.credentials.iter().next().map(|id| id.key().clone())
        } else {
            options
                .allow_credentials
                .iter()
                .filter_map(|descriptor| codec::decode(&descriptor.id).ok())
                .find(|id| self.credentials.contains(id))
        }
        .ok_or_else(|| {
            AuthenticatorError::NotAllowed("No matching credential on this device".into())
        })?;

        let counter = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        let client_data_json = client_data(GET_CEREMONY, &options.challenge, &options.origin);
        let authenticator_data = authenticator_data(&options.rp_id, counter);
        let signature = sign(&credential_id, &authenticator_data, &client_data_json);

        Ok(DecodedAssertion {
            credential_id,
            client_data_json,
            authenticator_data,
            signature,
            user_handle: None,
        })
    }

    async fn create_credential(
        &self,
        options: &CreationOptions,
    ) -> Result<NewCredential, AuthenticatorError> {
        if !self.available {
            return Err(AuthenticatorError::NotSupported(
                "no platform authenticator".into(),
            ));
        }
        self.prompt().await?;

        let mut credential_id = vec![0u8; CREDENTIAL_ID_LEN];
        getrandom::fill(&mut credential_id)
            .map_err(|e| AuthenticatorError::Other(format!("entropy unavailable: {e}")))?;

        let mut attestation_object = authenticator_data(&options.rp_id, 0);
        attestation_object.extend_from_slice(&credential_id);

        self.credentials.insert(credential_id.clone());
        Ok(NewCredential {
            client_data_json: client_data(CREATE_CEREMONY, &options.challenge, &options.origin),
            credential_id,
            attestation_object,
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct ClientData {
    #[serde(rename = "type")]
    kind: String,
    challenge: String,
    origin: String,
    #[serde(rename = "crossOrigin", default)]
    cross_origin: bool,
}

fn client_data(kind: &str, challenge: &[u8], origin: &str) -> Vec<u8> {
    let data = ClientData {
        kind: kind.to_string(),
        challenge: codec::encode(challenge),
        origin: origin.to_string(),
        cross_origin: false,
    };
    // A struct of strings always serializes
    serde_json::to_vec(&data).unwrap_or_default()
}

fn authenticator_data(rp_id: &str, counter: u32) -> Vec<u8> {
    let mut data = Vec::with_capacity(AUTH_DATA_LEN);
    data.extend_from_slice(&Sha3_256::digest(rp_id.as_bytes()));
    data.push(FLAG_USER_PRESENT | FLAG_USER_VERIFIED);
    data.extend_from_slice(&counter.to_be_bytes());
    data
}

fn sign(credential_id: &[u8], authenticator_data: &[u8], client_data_json: &[u8]) -> Vec<u8> {
    let client_hash = Sha3_256::digest(client_data_json);
    let mut hasher = Sha3_256::new();
    hasher.update(SIGNATURE_DOMAIN);
    hasher.update(credential_id);
    hasher.update(authenticator_data);
    hasher.update(client_hash);
    hasher.finalize().to_vec()
}

/// `{"publicKey": ...}` creation options for a simulated registration.
pub fn creation_options(
    challenge: &[u8],
    rp_id: &str,
    rp_name: &str,
    user_id: &str,
    user_name: &str,
    display_name: &str,
) -> Value {
    json!({
        "publicKey": {
            "challenge": codec::encode(challenge),
            "rp": { "id": rp_id, "name": rp_name },
            "user": {
                "id": codec::encode(user_id.as_bytes()),
                "name": user_name,
                "displayName": display_name,
            },
            "pubKeyCredParams": [
                { "type": "public-key", "alg": -7 },
                { "type": "public-key", "alg": -257 },
            ],
            "timeout": 60000,
            "attestation": "none",
            "authenticatorSelection": {
                "authenticatorAttachment": "platform",
                "userVerification": "required",
                "residentKey": "preferred",
            },
        }
    })
}

/// What the relying party expects a ceremony to be bound to.
#[derive(Debug, Clone, Copy)]
pub struct ExpectedCeremony<'a> {
    pub challenge: &'a [u8],
    pub origin: &'a str,
    pub rp_id: &'a str,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SimulatedVerifyError {
    #[error("malformed client data: {0}")]
    ClientData(String),

    #[error("unexpected ceremony type: {0}")]
    CeremonyType(String),

    #[error("challenge mismatch")]
    Challenge,

    #[error("origin mismatch: {0}")]
    Origin(String),

    #[error("malformed authenticator data")]
    AuthenticatorData,

    #[error("relying party mismatch")]
    RelyingParty,

    #[error("user was not verified")]
    UserNotVerified,

    #[error("invalid signature")]
    Signature,
}

fn check_client_data(
    raw: &[u8],
    kind: &str,
    expected: &ExpectedCeremony<'_>,
) -> Result<(), SimulatedVerifyError> {
    let data: ClientData =
        serde_json::from_slice(raw).map_err(|e| SimulatedVerifyError::ClientData(e.to_string()))?;
    if data.kind != kind {
        return Err(SimulatedVerifyError::CeremonyType(data.kind));
    }
    if data.challenge != codec::encode(expected.challenge) {
        return Err(SimulatedVerifyError::Challenge);
    }
    if data.origin != expected.origin {
        return Err(SimulatedVerifyError::Origin(data.origin));
    }
    Ok(())
}

/// Validate the 37-byte authenticator data prefix, returning the counter.
fn check_authenticator_data(
    data: &[u8],
    expected: &ExpectedCeremony<'_>,
) -> Result<u32, SimulatedVerifyError> {
    if data.len() < AUTH_DATA_LEN {
        return Err(SimulatedVerifyError::AuthenticatorData);
    }
    if data[..32] != Sha3_256::digest(expected.rp_id.as_bytes())[..] {
        return Err(SimulatedVerifyError::RelyingParty);
    }
    if data[32] & FLAG_USER_VERIFIED == 0 {
        return Err(SimulatedVerifyError::UserNotVerified);
    }
    let mut counter = [0u8; 4];
    counter.copy_from_slice(&data[33..AUTH_DATA_LEN]);
    Ok(u32::from_be_bytes(counter))
}

/// Verify a simulated assertion, returning its signature counter.
pub fn verify_assertion(
    assertion: &DecodedAssertion,
    expected: &ExpectedCeremony<'_>,
) -> Result<u32, SimulatedVerifyError> {
    check_client_data(&assertion.client_data_json, GET_CEREMONY, expected)?;
    if assertion.authenticator_data.len() != AUTH_DATA_LEN {
        return Err(SimulatedVerifyError::AuthenticatorData);
    }
    let counter = check_authenticator_data(&assertion.authenticator_data, expected)?;
    let signature = sign(
        &assertion.credential_id,
        &assertion.authenticator_data,
        &assertion.client_data_json,
    );
    if signature != assertion.signature {
        return Err(SimulatedVerifyError::Signature);
    }
    Ok(counter)
}

/// Verify a simulated credential creation.
pub fn verify_registration(
    credential: &NewCredential,
    expected: &ExpectedCeremony<'_>,
) -> Result<(), SimulatedVerifyError> {
    check_client_data(&credential.client_data_json, CREATE_CEREMONY, expected)?;
    check_authenticator_data(&credential.attestation_object, expected)?;
    if credential.attestation_object[AUTH_DATA_LEN..] != credential.credential_id[..] {
        return Err(SimulatedVerifyError::AuthenticatorData);
    }
    Ok(())
}
