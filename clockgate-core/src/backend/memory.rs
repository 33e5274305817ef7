//! In-process attendance backend.
//!
//! Acts as both the relying party and the system of record: issues
//! ceremony challenges, checks simulated assertions against them, and
//! commits clock actions to an [`AttendanceLedger`].
//!
//! WARNING: Demo and testing only. Any non-empty password logs in and
//! assertions are checked with the simulated scheme.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use serde_json::Value;
use tracing::{info, warn};

use crate::authenticator::SerializedRegistration;
use crate::ceremony::{fresh_challenge, CredentialStore, LocalCeremonyBackend};
use crate::codec;
use crate::config::VerificationConfig;
use crate::error::{Result, ServiceError};
use crate::ledger::{AttendanceLedger, FIXTURE_CREDENTIAL, FIXTURE_CREDENTIAL_OWNER};
use crate::service::{
    AttendanceService, ClockResponse, ClockSubmission, LoginResponse, RegistrationService,
};
use crate::simulated::{self, ExpectedCeremony, SIMULATED_ALGORITHM};
use crate::types::{AttendanceRecord, ClockAction, Credential, LogFilter, Reports, User};

const RP_NAME: &str = "Clockgate";

pub struct MemoryBackend {
    ledger: Arc<AttendanceLedger>,
    ceremonies: Arc<LocalCeremonyBackend>,
    origin: String,
    registrations: DashMap<String, Vec<u8>>,
}

impl MemoryBackend {
    pub fn new(ledger: AttendanceLedger, config: &VerificationConfig) -> Self {
        let store = Arc::new(CredentialStore::new());
        Self {
            ledger: Arc::new(ledger),
            ceremonies: Arc::new(LocalCeremonyBackend::new(store, config.rp_id.clone())),
            origin: config.app_origin(),
            registrations: DashMap::new(),
        }
    }

    /// Demo data: fixture employees, recent attendance, and one enrolled
    /// device for the fixture employee.
    pub fn with_fixtures(config: &VerificationConfig) -> Self {
        let backend = Self::new(
            AttendanceLedger::with_fixtures(Utc::now().date_naive()),
            config,
        );
        backend.credentials().register(
            FIXTURE_CREDENTIAL_OWNER,
            Credential {
                id: codec::encode(FIXTURE_CREDENTIAL),
                public_key_algorithm: SIMULATED_ALGORITHM,
                response: Vec::new(),
            },
        );
        backend
    }

    pub fn ledger(&self) -> &Arc<AttendanceLedger> {
        &self.ledger
    }

    pub fn credentials(&self) -> &Arc<CredentialStore> {
        self.ceremonies.store()
    }

    /// Ceremony backend the popup should use with this service.
    pub fn ceremony_backend(&self) -> Arc<LocalCeremonyBackend> {
        Arc::clone(&self.ceremonies)
    }

    /// Check that `submission` carries a fresh assertion by a credential
    /// of the submitting user.
    fn verify(&self, submission: &ClockSubmission) -> Result<()> {
        let user_id = submission.event.user_id.as_str();
        let assertion = submission
            .assertion
            .decode()
            .map_err(|e| ServiceError::Rejected(format!("Malformed assertion: {e}")))?;

        let challenge = self.ceremonies.take_challenge(user_id).ok_or_else(|| {
            ServiceError::Rejected("No verification challenge is pending.".into())
        })?;

        if !self
            .credentials()
            .owns(user_id, &codec::encode(&assertion.credential_id))
        {
            return Err(ServiceError::Rejected(
                "Credential is not registered to this user.".into(),
            ));
        }

        let expected = ExpectedCeremony {
            challenge: &challenge,
            origin: &self.origin,
            rp_id: self.ceremonies.rp_id(),
        };
        simulated::verify_assertion(&assertion, &expected).map_err(|e| {
            warn!(user_id, error = %e, "Assertion rejected");
            ServiceError::Rejected(format!("Biometric verification failed: {e}"))
        })?;
        Ok(())
    }

    fn commit(&self, submission: &ClockSubmission, expected: ClockAction) -> Result<ClockResponse> {
        if submission.event.action != expected {
            return Err(ServiceError::Rejected(format!(
                "Submission is for {}, not {expected}",
                submission.event.action
            )));
        }
        self.verify(submission)?;

        let now = Utc::now().naive_utc();
        let user_id = submission.event.user_id.as_str();
        let record = match expected {
            ClockAction::ClockIn => self.ledger.clock_in(user_id, now)?,
            ClockAction::ClockOut => self.ledger.clock_out(user_id, now)?,
        };
        Ok(ClockResponse {
            message: format!("{} successful", expected.label()),
            record: Some(record),
        })
    }
}

#[async_trait]
impl AttendanceService for MemoryBackend {
    async fn login(&self, email: &str, password: &str) -> Result<LoginResponse> {
        match self.ledger.find_by_email(email) {
            Some(user) if user.is_active() && !password.is_empty() => {
                info!(user_id = %user.id, "Demo login");
                Ok(LoginResponse {
                    token: format!("mock-token-for-{}", user.id),
                    user,
                })
            }
            _ => Err(ServiceError::Rejected("Invalid credentials".into())),
        }
    }

    async fn fetch_history(&self, user_id: &str) -> Result<Vec<AttendanceRecord>> {
        Ok(self.ledger.history(user_id))
    }

    async fn clock_in(&self, submission: &ClockSubmission) -> Result<ClockResponse> {
        self.commit(submission, ClockAction::ClockIn)
    }

    async fn clock_out(&self, submission: &ClockSubmission) -> Result<ClockResponse> {
        self.commit(submission, ClockAction::ClockOut)
    }

    async fn list_employees(&self) -> Result<Vec<User>> {
        Ok(self.ledger.users())
    }

    async fn list_attendance_logs(&self, filter: &LogFilter) -> Result<Vec<AttendanceRecord>> {
        Ok(self.ledger.logs(filter))
    }

    async fn get_reports(&self) -> Result<Reports> {
        Ok(self.ledger.reports())
    }
}

#[async_trait]
impl RegistrationService for MemoryBackend {
    async fn begin_registration(&self, user_id: &str) -> Result<Value> {
        let user = self
            .ledger
            .user(user_id)
            .ok_or_else(|| ServiceError::NotFound(format!("user {user_id}")))?;
        let challenge = fresh_challenge()
            .map_err(|e| ServiceError::Rejected(e.to_string()))?
            .to_vec();
        self.registrations
            .insert(user_id.to_string(), challenge.clone());

        Ok(simulated::creation_options(
            &challenge,
            self.ceremonies.rp_id(),
            RP_NAME,
            &user.id,
            &user.email,
            &user.name,
        ))
    }

    async fn finish_registration(&self, user_id: &str, credential: &Value) -> Result<bool> {
        let registration: SerializedRegistration = serde_json::from_value(credential.clone())
            .map_err(|e| ServiceError::Rejected(format!("Malformed credential: {e}")))?;
        let created = registration
            .decode()
            .map_err(|e| ServiceError::Rejected(format!("Malformed credential: {e}")))?;

        let (_, challenge) = self.registrations.remove(user_id).ok_or_else(|| {
            ServiceError::Rejected("No registration is pending for this user.".into())
        })?;
        let expected = ExpectedCeremony {
            challenge: &challenge,
            origin: &self.origin,
            rp_id: self.ceremonies.rp_id(),
        };
        simulated::verify_registration(&created, &expected)
            .map_err(|e| ServiceError::Rejected(format!("Registration failed: {e}")))?;

        self.credentials().register(
            user_id,
            Credential {
                id: registration.id,
                public_key_algorithm: SIMULATED_ALGORITHM,
                response: created.attestation_object,
            },
        );
        info!(user_id, "Credential registered");
        Ok(true)
    }

    async fn registration_status(&self, user_id: &str) -> Result<bool> {
        Ok(self.credentials().is_registered(user_id))
    }
}
