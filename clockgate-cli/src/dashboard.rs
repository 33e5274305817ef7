//! Signed-in dashboard: the attendance service, the ceremony backend and the
//! simulated device, wired the way the web dashboard wires them.

use std::sync::Arc;

use anyhow::{Context, Result};
use clockgate_core::{
    codec, AttendanceService, CeremonyBackend, ClockCoordinator, FixedLocation, GeoLocation,
    HttpBackend, HttpBackendConfig, MemoryBackend, MessageHub, PopupEnvironment,
    RegistrationService, Role, ServiceError, SimulatedAuthenticator, SimulatedBehavior,
    TaskWindowHost, User, VerificationConfig, VerificationSession, FIXTURE_CREDENTIAL,
};
use tracing::{debug, info};
use url::Url;

use crate::exit_codes::{CliFailure, GENERAL_ERROR, NETWORK_ERROR, NOT_PERMITTED, USAGE_ERROR};

/// Where to sign in and with which account.
pub struct Connection {
    /// `None` runs against the built-in demo data.
    pub server: Option<String>,
    pub email: String,
    pub password: String,
}

/// How the simulated platform prompt ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptBehavior {
    Approve,
    Cancel,
    Unsupported,
    Insecure,
}

/// The device the verification popup runs on.
pub struct Device {
    pub prompt: PromptBehavior,
    /// Base64url credential id; the demo device when unset.
    pub credential: Option<String>,
    pub location: Option<GeoLocation>,
}

impl Device {
    pub fn authenticator(&self) -> Result<SimulatedAuthenticator> {
        let authenticator = match self.prompt {
            PromptBehavior::Approve => SimulatedAuthenticator::new(),
            PromptBehavior::Cancel => {
                SimulatedAuthenticator::new().with_behavior(SimulatedBehavior::Cancel)
            }
            PromptBehavior::Unsupported => SimulatedAuthenticator::unsupported(),
            PromptBehavior::Insecure => {
                SimulatedAuthenticator::new().with_behavior(SimulatedBehavior::InsecureContext)
            }
        };
        let credential = match &self.credential {
            Some(id) => codec::decode(id)
                .map_err(|e| CliFailure::new(USAGE_ERROR, format!("Invalid credential id: {e}")))?,
            None => FIXTURE_CREDENTIAL.to_vec(),
        };
        Ok(authenticator.with_credential(credential))
    }
}

pub struct Dashboard {
    pub user: User,
    pub config: VerificationConfig,
    pub attendance: Arc<dyn AttendanceService>,
    pub registration: Arc<dyn RegistrationService>,
    ceremonies: Arc<dyn CeremonyBackend>,
}

impl Dashboard {
    /// Pick the backend and sign in.
    pub async fn connect(connection: Connection) -> Result<Self> {
        let config = VerificationConfig::from_env();

        let (attendance, registration, ceremonies): (
            Arc<dyn AttendanceService>,
            Arc<dyn RegistrationService>,
            Arc<dyn CeremonyBackend>,
        ) = match &connection.server {
            Some(server) => {
                let url = Url::parse(server)
                    .with_context(|| format!("Invalid server URL: {server}"))?;
                debug!(%url, "Using attendance server");
                let backend = Arc::new(HttpBackend::new(HttpBackendConfig::new(url))?);
                (backend.clone(), backend.clone(), backend)
            }
            None => {
                debug!("Using built-in demo data");
                let backend = Arc::new(MemoryBackend::with_fixtures(&config));
                let ceremonies = backend.ceremony_backend();
                (backend.clone(), backend, ceremonies)
            }
        };

        let login = attendance
            .login(&connection.email, &connection.password)
            .await
            .map_err(|e| service_failure("Login failed", e, NOT_PERMITTED))?;
        info!(user_id = %login.user.id, role = ?login.user.role, "Signed in");

        Ok(Self {
            user: login.user,
            config,
            attendance,
            registration,
            ceremonies,
        })
    }

    pub fn is_staff(&self) -> bool {
        matches!(self.user.role, Role::Admin | Role::Hr)
    }

    /// Admin and HR pages are not offered to employees.
    pub fn require_staff(&self) -> Result<()> {
        if self.is_staff() {
            Ok(())
        } else {
            Err(CliFailure::new(NOT_PERMITTED, "Admin or HR role required").into())
        }
    }

    /// Clock controls for the signed-in user on `device`.
    pub fn coordinator(&self, device: &Device) -> Result<ClockCoordinator> {
        let host = TaskWindowHost::new(PopupEnvironment {
            authenticator: Arc::new(device.authenticator()?),
            backend: self.ceremonies.clone(),
            rp_id: self.config.rp_id.clone(),
            ceremony_timeout: self.config.ceremony_timeout,
            timings: self.config.popup_timings.clone(),
        });
        let session = VerificationSession::new(
            &self.config,
            Arc::new(host),
            MessageHub::new(self.config.app_origin()),
        );

        Ok(ClockCoordinator::new(
            self.user.id.clone(),
            self.attendance.clone(),
            session,
            Arc::new(FixedLocation(device.location)),
        )
        .require_location(self.config.require_location))
    }
}

/// Attach an exit code to a service error. `refused` is used when the
/// service turned the request down.
pub fn service_failure(context: &str, err: ServiceError, refused: i32) -> CliFailure {
    let code = match err {
        ServiceError::Network(_) => NETWORK_ERROR,
        ServiceError::Unauthorized => NOT_PERMITTED,
        ServiceError::Rejected(_) => refused,
        ServiceError::NotFound(_) | ServiceError::Decode(_) => GENERAL_ERROR,
    };
    CliFailure::new(code, format!("{context}: {err}"))
}
