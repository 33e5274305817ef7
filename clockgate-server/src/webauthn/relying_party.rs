//! Relying party: issues ceremony challenges and verifies what comes back.
//!
//! Two modes share one interface. `Passkey` runs real WebAuthn through
//! webauthn-rs; `Simulated` checks the signature scheme of
//! `clockgate_core::simulated` and is meant for demos and tests.

use clockgate_core::simulated::{self, ExpectedCeremony};
use clockgate_core::{
    codec, fresh_challenge, BackendError, CeremonyBackend, Credential, CredentialStore,
    LocalCeremonyBackend, SerializedAssertion, SerializedRegistration, User, FIXTURE_CREDENTIAL,
    FIXTURE_CREDENTIAL_OWNER, SIMULATED_ALGORITHM,
};
use serde_json::{json, Value};
use std::sync::Arc;
use webauthn_rs::prelude::*;

use super::config::WebAuthnConfig;
use super::storage::{PasskeyStore, PendingStore};
use crate::config::CeremonyMode;
use crate::error::ApiError;

/// Passkey relying party backed by webauthn-rs
pub struct PasskeyRelyingParty {
    config: WebAuthnConfig,
    passkeys: PasskeyStore,
    registrations: PendingStore<PasskeyRegistration>,
    authentications: PendingStore<PasskeyAuthentication>,
}

impl PasskeyRelyingParty {
    pub fn new(config: WebAuthnConfig) -> Self {
        Self {
            config,
            passkeys: PasskeyStore::new(),
            registrations: PendingStore::new(),
            authentications: PendingStore::new(),
        }
    }

    fn begin_authentication(&self, user: &User) -> Result<Value, ApiError> {
        let passkeys = self.passkeys.passkeys_for(&user.id);
        if passkeys.is_empty() {
            return Err(ApiError::not_found("No credential registered for this user"));
        }

        let (rcr, auth_state) = self
            .config
            .webauthn()
            .start_passkey_authentication(&passkeys)
            .map_err(|e| ApiError::internal(format!("Failed to start authentication: {:?}", e)))?;
        self.authentications.insert(user.id.clone(), auth_state);

        serde_json::to_value(rcr)
            .map_err(|e| ApiError::internal(format!("Failed to encode request options: {e}")))
    }

    fn verify_assertion(&self, user_id: &str, assertion: &Value) -> Result<(), ApiError> {
        let credential: PublicKeyCredential = serde_json::from_value(assertion.clone())
            .map_err(|e| ApiError::bad_request(format!("Malformed assertion: {e}")))?;
        let auth_state = self
            .authentications
            .take(user_id)
            .ok_or_else(|| ApiError::verification_failed("No verification challenge is pending."))?;

        let result = self
            .config
            .webauthn()
            .finish_passkey_authentication(&credential, &auth_state)
            .map_err(|e| {
                ApiError::verification_failed(format!("Biometric verification failed: {:?}", e))
            })?;
        self.passkeys.record_use(user_id, &result);

        tracing::info!(
            user_id,
            sign_count = result.counter(),
            "Passkey assertion verified"
        );
        Ok(())
    }

    fn begin_registration(&self, user: &User) -> Result<Value, ApiError> {
        let exclude: Vec<CredentialID> = self
            .passkeys
            .passkeys_for(&user.id)
            .iter()
            .map(|p| p.cred_id().clone())
            .collect();

        let (ccr, reg_state) = self
            .config
            .webauthn()
            .start_passkey_registration(
                self.passkeys.handle_for(&user.id),
                &user.email,
                &user.name,
                Some(exclude).filter(|ids| !ids.is_empty()),
            )
            .map_err(|e| ApiError::internal(format!("Failed to start registration: {:?}", e)))?;
        self.registrations.insert(user.id.clone(), reg_state);

        serde_json::to_value(ccr)
            .map_err(|e| ApiError::internal(format!("Failed to encode creation options: {e}")))
    }

    fn finish_registration(&self, user_id: &str, credential: &Value) -> Result<(), ApiError> {
        let response: RegisterPublicKeyCredential = serde_json::from_value(credential.clone())
            .map_err(|e| ApiError::bad_request(format!("Malformed credential: {e}")))?;
        let reg_state = self
            .registrations
            .take(user_id)
            .ok_or_else(|| ApiError::bad_request("No registration is pending for this user."))?;

        let passkey = self
            .config
            .webauthn()
            .finish_passkey_registration(&response, &reg_state)
            .map_err(|e| ApiError::bad_request(format!("Registration failed: {:?}", e)))?;

        tracing::info!(
            user_id,
            credential_id = ?passkey.cred_id(),
            "Passkey registered"
        );
        self.passkeys.add(user_id, passkey);
        Ok(())
    }
}

/// Relying party for the simulated authenticator.
///
/// WARNING: Demo and testing only. Simulated signatures can be forged by
/// anyone who knows a credential id.
pub struct SimulatedRelyingParty {
    ceremonies: LocalCeremonyBackend,
    origin: String,
    rp_name: String,
    registrations: PendingStore<Vec<u8>>,
}

impl SimulatedRelyingParty {
    pub fn new(config: &WebAuthnConfig) -> Self {
        Self {
            ceremonies: LocalCeremonyBackend::new(
                Arc::new(CredentialStore::new()),
                config.rp_id(),
            ),
            origin: config.origin(),
            rp_name: config.rp_name().to_string(),
            registrations: PendingStore::new(),
        }
    }

    /// Enroll the demo device of the fixture employee.
    pub fn with_fixture_credential(self) -> Self {
        self.credentials().register(
            FIXTURE_CREDENTIAL_OWNER,
            Credential {
                id: codec::encode(FIXTURE_CREDENTIAL),
                public_key_algorithm: SIMULATED_ALGORITHM,
                response: Vec::new(),
            },
        );
        self
    }

    pub fn credentials(&self) -> &Arc<CredentialStore> {
        self.ceremonies.store()
    }

    fn expected<'a>(&'a self, challenge: &'a [u8]) -> ExpectedCeremony<'a> {
        ExpectedCeremony {
            challenge,
            origin: &self.origin,
            rp_id: self.ceremonies.rp_id(),
        }
    }

    async fn begin_authentication(&self, user: &User) -> Result<Value, ApiError> {
        let options = self.ceremonies.begin(&user.id).await.map_err(|e| match e {
            BackendError::NoCredential(_) => {
                ApiError::not_found("No credential registered for this user")
            }
            other => ApiError::internal(other.to_string()),
        })?;

        Ok(json!({
            "publicKey": {
                "challenge": codec::encode(&options.challenge),
                "allowCredentials": options.allow_credentials,
                "rpId": options.rp_id,
                "timeout": options.timeout.map(|t| t.as_millis() as u64),
                "userVerification": "required",
            }
        }))
    }

    fn verify_assertion(&self, user_id: &str, assertion: &Value) -> Result<(), ApiError> {
        let assertion: SerializedAssertion = serde_json::from_value(assertion.clone())
            .map_err(|e| ApiError::bad_request(format!("Malformed assertion: {e}")))?;
        let decoded = assertion
            .decode()
            .map_err(|e| ApiError::bad_request(format!("Malformed assertion: {e}")))?;

        let challenge = self
            .ceremonies
            .take_challenge(user_id)
            .ok_or_else(|| ApiError::verification_failed("No verification challenge is pending."))?;

        if !self
            .credentials()
            .owns(user_id, &codec::encode(&decoded.credential_id))
        {
            return Err(ApiError::verification_failed(
                "Credential is not registered to this user.",
            ));
        }

        let counter = simulated::verify_assertion(&decoded, &self.expected(&challenge))
            .map_err(|e| ApiError::verification_failed(format!("Biometric verification failed: {e}")))?;

        tracing::info!(user_id, sign_count = counter, "Simulated assertion verified");
        Ok(())
    }

    fn begin_registration(&self, user: &User) -> Result<Value, ApiError> {
        let challenge = fresh_challenge()
            .map_err(|e| ApiError::internal(e.to_string()))?
            .to_vec();
        self.registrations.insert(user.id.clone(), challenge.clone());

        Ok(simulated::creation_options(
            &challenge,
            self.ceremonies.rp_id(),
            &self.rp_name,
            &user.id,
            &user.email,
            &user.name,
        ))
    }

    fn finish_registration(&self, user_id: &str, credential: &Value) -> Result<(), ApiError> {
        let registration: SerializedRegistration = serde_json::from_value(credential.clone())
            .map_err(|e| ApiError::bad_request(format!("Malformed credential: {e}")))?;
        let created = registration
            .decode()
            .map_err(|e| ApiError::bad_request(format!("Malformed credential: {e}")))?;

        let challenge = self
            .registrations
            .take(user_id)
            .ok_or_else(|| ApiError::bad_request("No registration is pending for this user."))?;
        simulated::verify_registration(&created, &self.expected(&challenge))
            .map_err(|e| ApiError::bad_request(format!("Registration failed: {e}")))?;

        self.credentials().register(
            user_id,
            Credential {
                id: registration.id,
                public_key_algorithm: SIMULATED_ALGORITHM,
                response: created.attestation_object,
            },
        );
        tracing::info!(user_id, "Simulated credential registered");
        Ok(())
    }
}

/// The relying party the server runs with
pub enum RelyingParty {
    Passkey(PasskeyRelyingParty),
    Simulated(SimulatedRelyingParty),
}

impl RelyingParty {
    /// Build the relying party for `mode`. The simulated one starts with the
    /// fixture employee's demo device enrolled.
    pub fn for_mode(mode: CeremonyMode, config: WebAuthnConfig) -> Self {
        match mode {
            CeremonyMode::WebAuthn => Self::Passkey(PasskeyRelyingParty::new(config)),
            CeremonyMode::Simulated => {
                tracing::warn!("Simulated ceremonies enabled - do not use in production!");
                Self::Simulated(SimulatedRelyingParty::new(&config).with_fixture_credential())
            }
        }
    }

    pub fn mode(&self) -> CeremonyMode {
        match self {
            Self::Passkey(_) => CeremonyMode::WebAuthn,
            Self::Simulated(_) => CeremonyMode::Simulated,
        }
    }

    /// Start an authentication ceremony for `user`; returns request options.
    pub async fn begin_authentication(&self, user: &User) -> Result<Value, ApiError> {
        match self {
            Self::Passkey(rp) => rp.begin_authentication(user),
            Self::Simulated(rp) => rp.begin_authentication(user).await,
        }
    }

    /// Verify `assertion` against the pending challenge of `user_id`.
    /// The challenge is consumed whatever the result.
    pub fn verify_assertion(&self, user_id: &str, assertion: &Value) -> Result<(), ApiError> {
        match self {
            Self::Passkey(rp) => rp.verify_assertion(user_id, assertion),
            Self::Simulated(rp) => rp.verify_assertion(user_id, assertion),
        }
    }

    /// Start registering a new credential for `user`; returns creation options.
    pub fn begin_registration(&self, user: &User) -> Result<Value, ApiError> {
        match self {
            Self::Passkey(rp) => rp.begin_registration(user),
            Self::Simulated(rp) => rp.begin_registration(user),
        }
    }

    pub fn finish_registration(&self, user_id: &str, credential: &Value) -> Result<(), ApiError> {
        match self {
            Self::Passkey(rp) => rp.finish_registration(user_id, credential),
            Self::Simulated(rp) => rp.finish_registration(user_id, credential),
        }
    }

    pub fn is_registered(&self, user_id: &str) -> bool {
        match self {
            Self::Passkey(rp) => rp.passkeys.is_registered(user_id),
            Self::Simulated(rp) => rp.credentials().is_registered(user_id),
        }
    }

    /// Drop expired pending ceremonies.
    pub fn cleanup_expired(&self) {
        match self {
            Self::Passkey(rp) => {
                rp.registrations.cleanup_expired();
                rp.authentications.cleanup_expired();
            }
            Self::Simulated(rp) => rp.registrations.cleanup_expired(),
        }
    }
}
