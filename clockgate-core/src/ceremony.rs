//! Ceremony backends: where the popup gets its challenge and allow-list.
//!
//! The popup calls [`CeremonyBackend::begin`] once per ceremony. The local
//! backend generates challenges in process from a credential store; the
//! HTTP backend (feature `network`) asks `clockgate-server`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::codec;
use crate::error::DecodeError;
use crate::types::{Credential, CredentialDescriptor};

/// Challenge length in bytes.
pub const CHALLENGE_LEN: usize = 32;

/// Options returned by a successful `begin`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CeremonyOptions {
    pub challenge: Vec<u8>,
    pub allow_credentials: Vec<CredentialDescriptor>,
    pub rp_id: Option<String>,
    pub timeout: Option<Duration>,
}

impl CeremonyOptions {
    /// Read WebAuthn request options (`{"publicKey": {...}}`) as returned by
    /// an authentication begin endpoint.
    pub fn from_public_key_json(value: &Value) -> Result<Self, BackendError> {
        let public_key = value.get("publicKey").unwrap_or(value);
        let challenge = public_key
            .get("challenge")
            .and_then(Value::as_str)
            .ok_or_else(|| DecodeError("missing challenge".into()))?;

        let allow_credentials = match public_key.get("allowCredentials") {
            None | Some(Value::Null) => Vec::new(),
            Some(list) => serde_json::from_value(list.clone())
                .map_err(|e| DecodeError(format!("invalid allowCredentials: {e}")))?,
        };

        Ok(Self {
            challenge: codec::decode(challenge)?,
            allow_credentials,
            rp_id: public_key
                .get("rpId")
                .and_then(Value::as_str)
                .map(str::to_string),
            timeout: public_key
                .get("timeout")
                .and_then(Value::as_u64)
                .map(Duration::from_millis),
        })
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("No credential registered for {0}")]
    NoCredential(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Ceremony rejected: {0}")]
    Rejected(String),

    #[error("Entropy unavailable: {0}")]
    Entropy(String),

    #[error(transparent)]
    Decode(#[from] DecodeError),
}

/// Issues authentication challenges for a subject.
#[async_trait]
pub trait CeremonyBackend: Send + Sync {
    /// Start an authentication ceremony for `subject_id`.
    async fn begin(&self, subject_id: &str) -> Result<CeremonyOptions, BackendError>;
}

/// Fresh random challenge. Never reused across ceremonies.
pub fn fresh_challenge() -> Result<[u8; CHALLENGE_LEN], BackendError> {
    let mut challenge = [0u8; CHALLENGE_LEN];
    getrandom::fill(&mut challenge).map_err(|e| BackendError::Entropy(e.to_string()))?;
    Ok(challenge)
}

/// Credentials enrolled per subject.
#[derive(Debug, Default)]
pub struct CredentialStore {
    by_subject: DashMap<String, Vec<Credential>>,
}

impl CredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enroll `credential` for `subject_id`, replacing one with the same id.
    pub fn register(&self, subject_id: &str, credential: Credential) {
        let mut entry = self.by_subject.entry(subject_id.to_string()).or_default();
        entry.retain(|existing| existing.id != credential.id);
        entry.push(credential);
    }

    pub fn credentials_for(&self, subject_id: &str) -> Vec<Credential> {
        self.by_subject
            .get(subject_id)
            .map(|entry| entry.clone())
            .unwrap_or_default()
    }

    pub fn is_registered(&self, subject_id: &str) -> bool {
        self.by_subject
            .get(subject_id)
            .is_some_and(|entry| !entry.is_empty())
    }

    /// Whether `credential_id` (base64url) belongs to `subject_id`.
    pub fn owns(&self, subject_id: &str, credential_id: &str) -> bool {
        self.by_subject
            .get(subject_id)
            .is_some_and(|entry| entry.iter().any(|c| c.id == credential_id))
    }

    pub fn remove(&self, subject_id: &str) -> Vec<Credential> {
        self.by_subject
            .remove(subject_id)
            .map(|(_, credentials)| credentials)
            .unwrap_or_default()
    }
}

/// In-process ceremony backend over a [`CredentialStore`].
///
/// Keeps the last challenge issued per subject so a relying party in the
/// same process can check what the authenticator signed.
pub struct LocalCeremonyBackend {
    store: Arc<CredentialStore>,
    rp_id: String,
    timeout: Duration,
    issued: DashMap<String, Vec<u8>>,
}

impl LocalCeremonyBackend {
    pub fn new(store: Arc<CredentialStore>, rp_id: impl Into<String>) -> Self {
        Self {
            store,
            rp_id: rp_id.into(),
            timeout: Duration::from_secs(60),
            issued: DashMap::new(),
        }
    }

    pub fn store(&self) -> &Arc<CredentialStore> {
        &self.store
    }

    pub fn rp_id(&self) -> &str {
        &self.rp_id
    }

    /// Consume the challenge pending for `subject_id`.
    pub fn take_challenge(&self, subject_id: &str) -> Option<Vec<u8>> {
        self.issued.remove(subject_id).map(|(_, challenge)| challenge)
    }
}

#[async_trait]
impl CeremonyBackend for LocalCeremonyBackend {
    async fn begin(&self, subject_id: &str) -> Result<CeremonyOptions, BackendError> {
        let credentials = self.store.credentials_for(subject_id);
        if credentials.is_empty() {
            return Err(BackendError::NoCredential(subject_id.to_string()));
        }

        let challenge = fresh_challenge()?.to_vec();
        debug!(
            subject_id,
            challenge = %codec::encode(&challenge[..8]),
            credentials = credentials.len(),
            "Issued local authentication challenge"
        );
        // A new begin supersedes any challenge still pending
        self.issued.insert(subject_id.to_string(), challenge.clone());

        Ok(CeremonyOptions {
            challenge,
            allow_credentials: credentials
                .into_iter()
                .map(|credential| CredentialDescriptor::new(credential.id))
                .collect(),
            rp_id: Some(self.rp_id.clone()),
            timeout: Some(self.timeout),
        })
    }
}
