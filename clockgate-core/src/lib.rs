//! Clockgate Core - biometric verification for attendance clock actions
//!
//! This crate gates every clock-in and clock-out behind a platform
//! authenticator ceremony that runs in a separate verification window.
//!
//! # Features
//!
//! - Popup-based verification sessions with origin-checked messaging
//! - Exactly one outcome per ceremony, including cancelled or closed popups
//! - Ceremony backends: in-process challenges or `clockgate-server` over HTTP
//! - In-memory attendance ledger with one record per employee per day
//! - Simulated platform authenticator for demos and tests
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use clockgate_core::{
//!     ClockCoordinator, FixedLocation, MemoryBackend, MessageHub, PopupEnvironment,
//!     PopupTimings, SimulatedAuthenticator, TaskWindowHost, VerificationConfig,
//!     VerificationSession, FIXTURE_CREDENTIAL,
//! };
//!
//! # async fn example() {
//! let config = VerificationConfig::default();
//! let backend = Arc::new(MemoryBackend::with_fixtures(&config));
//!
//! // Demo device holding the fixture credential of employee "2"
//! let host = TaskWindowHost::new(PopupEnvironment {
//!     authenticator: Arc::new(SimulatedAuthenticator::new().with_credential(FIXTURE_CREDENTIAL)),
//!     backend: backend.ceremony_backend(),
//!     rp_id: config.rp_id.clone(),
//!     ceremony_timeout: config.ceremony_timeout,
//!     timings: PopupTimings::default(),
//! });
//! let session = VerificationSession::new(&config, Arc::new(host), MessageHub::new(config.app_origin()));
//!
//! let coordinator = ClockCoordinator::new("2", backend, session, Arc::new(FixedLocation::default()))
//!     .require_location(false);
//! println!("{}", coordinator.clock_in().await);
//! # }
//! ```

pub mod authenticator;
pub mod backend;
pub mod ceremony;
pub mod codec;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod ledger;
pub mod message;
pub mod popup;
pub mod service;
pub mod session;
pub mod simulated;
pub mod types;
pub mod window;

// Re-export main types for convenience
pub use authenticator::{
    AssertionOptions, AuthenticatorError, CreationOptions, NewCredential, PlatformAuthenticator,
    SerializedRegistration, UserVerification,
};
pub use backend::MemoryBackend;
pub use ceremony::{
    fresh_challenge, BackendError, CeremonyBackend, CeremonyOptions, CredentialStore,
    LocalCeremonyBackend, CHALLENGE_LEN,
};
pub use config::VerificationConfig;
pub use coordinator::{
    ActionFailure, ClockControls, ClockCoordinator, ClockStatus, FixedLocation, LocationProvider,
    StatusKind, StatusMessage,
};
pub use error::{
    DecodeError, LedgerError, Result, ServiceError, SessionError, WindowError,
};
pub use ledger::{AttendanceLedger, FIXTURE_CREDENTIAL, FIXTURE_CREDENTIAL_OWNER};
pub use message::ResultMessage;
pub use popup::{PopupEnvironment, PopupStatus, PopupTimings, TaskWindowHost, VerificationPopup};
pub use service::{
    AttendanceService, ClockResponse, ClockSubmission, LoginResponse, RegistrationService,
};
pub use session::VerificationSession;
pub use simulated::{SimulatedAuthenticator, SimulatedBehavior, SIMULATED_ALGORITHM};
pub use types::{
    AbsenteeismPoint, AttendanceRecord, ClockAction, ClockEvent, Credential, CredentialDescriptor,
    DailySummary, DecodedAssertion, EmployeeDraft, FailureReason, GeoLocation, LogFilter,
    OutcomeKind, Reports, Role, SerializedAssertion, SessionState, User, UserStatus,
    VerificationOutcome, VerificationRequest, WorkingHoursPoint,
};
pub use window::{
    MessageHub, MessageListener, PopupAddress, PopupHandle, PopupWindow, WindowHost, WindowId,
    WindowMessage,
};

// Network-dependent exports
#[cfg(feature = "network")]
pub use backend::{HttpBackend, HttpBackendConfig};
