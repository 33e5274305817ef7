//! Clock-action coordinator: gates clock-in/clock-out behind a verification
//! ceremony and commits verified actions to the attendance service.
//!
//! Every action returns a [`StatusMessage`]; nothing is ever raised to the
//! caller. Local state (today's clock-in/out and the in-flight action) is
//! held in `watch` channels so a UI can follow it.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tracing::{info, instrument, warn};

use crate::error::{ServiceError, SessionError};
use crate::service::{AttendanceService, ClockSubmission};
use crate::session::VerificationSession;
use crate::types::{
    ClockAction, ClockEvent, FailureReason, GeoLocation, SerializedAssertion, VerificationOutcome,
};

/// Source of the device's current position.
#[async_trait]
pub trait LocationProvider: Send + Sync {
    async fn current_location(&self) -> Option<GeoLocation>;
}

/// A location provider with a fixed answer.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedLocation(pub Option<GeoLocation>);

#[async_trait]
impl LocationProvider for FixedLocation {
    async fn current_location(&self) -> Option<GeoLocation> {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusKind {
    Success,
    Error,
    Info,
}

/// Why a clock action did not go through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionFailure {
    /// Turned down locally before any ceremony: attendance state, missing
    /// location or a ceremony already running.
    Refused,
    /// The ceremony ended without an assertion.
    Verification(FailureReason),
    /// The attendance service failed or refused the request.
    Service(ServiceError),
}

/// User-facing result of a coordinator call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusMessage {
    pub kind: StatusKind,
    pub text: String,
    /// Set on errors.
    pub failure: Option<ActionFailure>,
}

impl StatusMessage {
    pub fn success(text: impl Into<String>) -> Self {
        Self {
            kind: StatusKind::Success,
            text: text.into(),
            failure: None,
        }
    }

    /// A local refusal.
    pub fn error(text: impl Into<String>) -> Self {
        Self::failed(ActionFailure::Refused, text)
    }

    pub fn failed(failure: ActionFailure, text: impl Into<String>) -> Self {
        Self {
            kind: StatusKind::Error,
            text: text.into(),
            failure: Some(failure),
        }
    }

    /// A failed ceremony, with the reason's user-facing text.
    pub fn verification_failed(reason: FailureReason, detail: Option<String>) -> Self {
        Self::failed(
            ActionFailure::Verification(reason),
            failure_text(reason, detail),
        )
    }

    pub fn info(text: impl Into<String>) -> Self {
        Self {
            kind: StatusKind::Info,
            text: text.into(),
            failure: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.kind == StatusKind::Success
    }
}

impl std::fmt::Display for StatusMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.text)
    }
}

/// Today's clock-in/out as last observed by this client.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClockStatus {
    pub clock_in: Option<DateTime<Utc>>,
    pub clock_out: Option<DateTime<Utc>>,
}

impl ClockStatus {
    /// Advisory check of `action` against the observed state.
    pub fn check(&self, action: ClockAction) -> Result<(), &'static str> {
        match action {
            ClockAction::ClockIn if self.clock_out.is_some() => {
                Err("You have already clocked out today.")
            }
            ClockAction::ClockIn if self.clock_in.is_some() => Err("You have already clocked in."),
            ClockAction::ClockOut if self.clock_in.is_none() => Err("You haven't clocked in yet."),
            ClockAction::ClockOut if self.clock_out.is_some() => {
                Err("You have already clocked out.")
            }
            _ => Ok(()),
        }
    }
}

/// Which controls a UI should offer right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockControls {
    pub clock_in_enabled: bool,
    pub clock_out_enabled: bool,
    /// Action currently being verified, if any.
    pub verifying: Option<ClockAction>,
}

pub struct ClockCoordinator {
    user_id: String,
    service: Arc<dyn AttendanceService>,
    session: VerificationSession,
    location: Arc<dyn LocationProvider>,
    require_location: bool,
    status: watch::Sender<ClockStatus>,
    verifying: watch::Sender<Option<ClockAction>>,
}

impl ClockCoordinator {
    pub fn new(
        user_id: impl Into<String>,
        service: Arc<dyn AttendanceService>,
        session: VerificationSession,
        location: Arc<dyn LocationProvider>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            service,
            session,
            location,
            require_location: true,
            status: watch::channel(ClockStatus::default()).0,
            verifying: watch::channel(None).0,
        }
    }

    /// Whether a missing location blocks clock actions (default: true).
    pub fn require_location(mut self, required: bool) -> Self {
        self.require_location = required;
        self
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn session(&self) -> &VerificationSession {
        &self.session
    }

    pub fn clock_status(&self) -> ClockStatus {
        *self.status.borrow()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<ClockStatus> {
        self.status.subscribe()
    }

    pub fn controls(&self) -> ClockControls {
        let status = self.clock_status();
        let verifying = *self.verifying.borrow();
        ClockControls {
            clock_in_enabled: verifying.is_none() && status.check(ClockAction::ClockIn).is_ok(),
            clock_out_enabled: verifying.is_none() && status.check(ClockAction::ClockOut).is_ok(),
            verifying,
        }
    }

    /// Load today's record from the service. Returns an error message if the
    /// history could not be fetched.
    pub async fn refresh(&self) -> Option<StatusMessage> {
        let history = match self.service.fetch_history(&self.user_id).await {
            Ok(history) => history,
            Err(e) => {
                warn!(user_id = %self.user_id, error = %e, "Could not fetch attendance history");
                return Some(StatusMessage::failed(
                    ActionFailure::Service(e),
                    "Could not fetch today's attendance status.",
                ));
            }
        };

        let today = Utc::now().date_naive();
        let observed = history
            .iter()
            .find(|record| record.date == today)
            .map(|record| ClockStatus {
                clock_in: record.clock_in.map(|t| today.and_time(t).and_utc()),
                clock_out: record.clock_out.map(|t| today.and_time(t).and_utc()),
            })
            .unwrap_or_default();
        self.status.send_replace(observed);
        None
    }

    pub async fn clock_in(&self) -> StatusMessage {
        self.perform(ClockAction::ClockIn).await
    }

    pub async fn clock_out(&self) -> StatusMessage {
        self.perform(ClockAction::ClockOut).await
    }

    #[instrument(skip(self), fields(user_id = %self.user_id))]
    async fn perform(&self, action: ClockAction) -> StatusMessage {
        let location = self.location.current_location().await;
        if self.require_location && location.is_none() {
            return StatusMessage::error("Location not available. Cannot clock in/out.");
        }

        if let Err(message) = self.clock_status().check(action) {
            info!(%action, reason = message, "Clock action refused by local state");
            return StatusMessage::error(message);
        }

        let claimed = self.verifying.send_if_modified(|verifying| {
            if verifying.is_none() {
                *verifying = Some(action);
                true
            } else {
                false
            }
        });
        if !claimed {
            return StatusMessage::error("A verification is already in progress.");
        }
        let _verifying = VerifyingGuard(&self.verifying);

        let outcome = match self.session.start_verification(&self.user_id, action).await {
            Ok(outcome) => outcome,
            Err(SessionError::Busy) => {
                return StatusMessage::error("A verification is already in progress.")
            }
        };

        match outcome {
            VerificationOutcome::Success { assertion } => {
                self.commit(action, assertion, location).await
            }
            VerificationOutcome::Failure { reason, detail } => {
                warn!(%action, %reason, detail = ?detail, "Verification failed");
                StatusMessage::verification_failed(reason, detail)
            }
        }
    }

    async fn commit(
        &self,
        action: ClockAction,
        assertion: SerializedAssertion,
        location: Option<GeoLocation>,
    ) -> StatusMessage {
        let now = Utc::now();
        let submission = ClockSubmission {
            event: ClockEvent {
                user_id: self.user_id.clone(),
                action,
                timestamp: now,
                location,
            },
            assertion,
        };

        let result = match action {
            ClockAction::ClockIn => self.service.clock_in(&submission).await,
            ClockAction::ClockOut => self.service.clock_out(&submission).await,
        };

        match result {
            Ok(response) => {
                self.status.send_modify(|status| match action {
                    ClockAction::ClockIn => {
                        status.clock_in = Some(now);
                        status.clock_out = None;
                    }
                    ClockAction::ClockOut => status.clock_out = Some(now),
                });
                info!(%action, "Clock action committed");
                StatusMessage::success(format!(
                    "{} at {}",
                    response.message,
                    now.format("%H:%M:%S UTC")
                ))
            }
            Err(e) => {
                warn!(%action, error = %e, "Service rejected clock action");
                let text = format!("{} failed: {e}", action.label());
                StatusMessage::failed(ActionFailure::Service(e), text)
            }
        }
    }
}

fn failure_text(reason: FailureReason, detail: Option<String>) -> String {
    match (reason, detail) {
        (FailureReason::Unknown, Some(detail)) => format!("Verification failed: {detail}"),
        (reason, _) => reason.user_message().to_string(),
    }
}

struct VerifyingGuard<'a>(&'a watch::Sender<Option<ClockAction>>);

impl Drop for VerifyingGuard<'_> {
    fn drop(&mut self) {
        self.0.send_replace(None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use crate::ceremony::{
        BackendError, CeremonyBackend, CeremonyOptions, CredentialStore, LocalCeremonyBackend,
    };
    use crate::codec;
    use crate::config::VerificationConfig;
    use crate::error::{Result as ServiceResult, ServiceError, WindowError};
    use crate::ledger::FIXTURE_CREDENTIAL;
    use crate::popup::{PopupEnvironment, PopupTimings, TaskWindowHost};
    use crate::service::{ClockResponse, LoginResponse};
    use crate::simulated::SimulatedAuthenticator;
    use crate::types::{AttendanceRecord, Credential, LogFilter, Reports, User};
    use crate::window::{MessageHub, PopupAddress, PopupHandle, PopupWindow, WindowHost};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    const SUBJECT: &str = "u-42";
    const CRED: &[u8] = b"cred-u42";
    const HERE: GeoLocation = GeoLocation {
        lat: 51.5,
        lng: -0.12,
    };

    /// Attendance service that records submissions.
    #[derive(Default)]
    struct RecordingService {
        submissions: Mutex<Vec<ClockSubmission>>,
        reject_with: Option<String>,
    }

    impl RecordingService {
        fn submissions(&self) -> Vec<ClockSubmission> {
            self.submissions.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl AttendanceService for RecordingService {
        async fn login(&self, _email: &str, _password: &str) -> ServiceResult<LoginResponse> {
            Err(ServiceError::Unauthorized)
        }

        async fn fetch_history(&self, _user_id: &str) -> ServiceResult<Vec<AttendanceRecord>> {
            Err(ServiceError::Network("offline".into()))
        }

        async fn clock_in(&self, submission: &ClockSubmission) -> ServiceResult<ClockResponse> {
            self.submissions.lock().unwrap().push(submission.clone());
            match &self.reject_with {
                Some(message) => Err(ServiceError::Rejected(message.clone())),
                None => Ok(ClockResponse {
                    message: "Clock-in successful".into(),
                    record: None,
                }),
            }
        }

        async fn clock_out(&self, submission: &ClockSubmission) -> ServiceResult<ClockResponse> {
            self.submissions.lock().unwrap().push(submission.clone());
            Ok(ClockResponse {
                message: "Clock-out successful".into(),
                record: None,
            })
        }

        async fn list_employees(&self) -> ServiceResult<Vec<User>> {
            Ok(Vec::new())
        }

        async fn list_attendance_logs(
            &self,
            _filter: &LogFilter,
        ) -> ServiceResult<Vec<AttendanceRecord>> {
            Ok(Vec::new())
        }

        async fn get_reports(&self) -> ServiceResult<Reports> {
            Err(ServiceError::NotFound("reports".into()))
        }
    }

    struct CountingBackend {
        inner: LocalCeremonyBackend,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl CeremonyBackend for CountingBackend {
        async fn begin(&self, subject_id: &str) -> std::result::Result<CeremonyOptions, BackendError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.begin(subject_id).await
        }
    }

    /// Counts popups opened through the wrapped host.
    struct CountingHost<H> {
        inner: H,
        opened: Arc<AtomicUsize>,
    }

    impl<H: WindowHost> WindowHost for CountingHost<H> {
        fn open_popup(
            &self,
            address: &PopupAddress,
            opener: &MessageHub,
        ) -> std::result::Result<PopupHandle, WindowError> {
            self.opened.fetch_add(1, Ordering::SeqCst);
            self.inner.open_popup(address, opener)
        }
    }

    /// A popup the user closes after `after` without completing.
    struct AbandonedPopupHost {
        after: Duration,
    }

    impl WindowHost for AbandonedPopupHost {
        fn open_popup(
            &self,
            address: &PopupAddress,
            opener: &MessageHub,
        ) -> std::result::Result<PopupHandle, WindowError> {
            let (window, handle) = PopupWindow::open(address.clone(), Some(opener.clone()));
            let after = self.after;
            tokio::spawn(async move {
                tokio::time::sleep(after).await;
                window.close();
            });
            Ok(handle)
        }
    }

    struct Harness {
        coordinator: ClockCoordinator,
        service: Arc<RecordingService>,
        opened: Arc<AtomicUsize>,
        begins: Arc<CountingBackend>,
    }

    fn harness_with(authenticator: SimulatedAuthenticator, service: RecordingService) -> Harness {
        let config = VerificationConfig::default();
        let store = Arc::new(CredentialStore::new());
        store.register(
            SUBJECT,
            Credential {
                id: codec::encode(CRED),
                public_key_algorithm: -7,
                response: Vec::new(),
            },
        );
        let begins = Arc::new(CountingBackend {
            inner: LocalCeremonyBackend::new(store, config.rp_id.clone()),
            calls: AtomicUsize::new(0),
        });
        let opened = Arc::new(AtomicUsize::new(0));
        let host = CountingHost {
            inner: TaskWindowHost::new(PopupEnvironment {
                authenticator: Arc::new(authenticator),
                backend: begins.clone(),
                rp_id: config.rp_id.clone(),
                ceremony_timeout: config.ceremony_timeout,
                timings: PopupTimings::default(),
            }),
            opened: opened.clone(),
        };
        let session = VerificationSession::new(
            &config,
            Arc::new(host),
            MessageHub::new(config.app_origin()),
        );
        let service = Arc::new(service);
        let coordinator = ClockCoordinator::new(
            SUBJECT,
            service.clone(),
            session,
            Arc::new(FixedLocation(Some(HERE))),
        );
        Harness {
            coordinator,
            service,
            opened,
            begins,
        }
    }

    fn harness(authenticator: SimulatedAuthenticator) -> Harness {
        harness_with(authenticator, RecordingService::default())
    }

    #[tokio::test(start_paused = true)]
    async fn test_verified_clock_in_is_submitted_once() {
        let h = harness(SimulatedAuthenticator::new().with_credential(CRED));

        let message = h.coordinator.clock_in().await;

        assert_eq!(message.kind, StatusKind::Success);
        assert!(message.text.starts_with("Clock-in successful at "));
        assert!(message.text.contains(':'));

        let submissions = h.service.submissions();
        assert_eq!(submissions.len(), 1);
        let submission = &submissions[0];
        assert_eq!(submission.event.user_id, SUBJECT);
        assert_eq!(submission.event.action, ClockAction::ClockIn);
        assert_eq!(submission.event.location, Some(HERE));
        assert_eq!(submission.assertion.decode().unwrap().credential_id, CRED);

        let controls = h.coordinator.controls();
        assert!(!controls.clock_in_enabled);
        assert!(controls.clock_out_enabled);
        assert_eq!(controls.verifying, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clock_out_before_clock_in_is_refused_locally() {
        let h = harness(SimulatedAuthenticator::new().with_credential(CRED));

        let message = h.coordinator.clock_out().await;

        assert_eq!(message.kind, StatusKind::Error);
        assert!(message.text.contains("haven't clocked in"));
        assert_eq!(h.opened.load(Ordering::SeqCst), 0);
        assert!(h.service.submissions().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_closed_popup_is_cancellation() {
        let config = VerificationConfig::default();
        let session = VerificationSession::new(
            &config,
            Arc::new(AbandonedPopupHost {
                after: Duration::from_secs(2),
            }),
            MessageHub::new(config.app_origin()),
        );
        let service = Arc::new(RecordingService::default());
        let coordinator = ClockCoordinator::new(
            SUBJECT,
            service.clone(),
            session,
            Arc::new(FixedLocation(Some(HERE))),
        );

        let message = coordinator.clock_in().await;

        assert_eq!(
            message,
            StatusMessage::verification_failed(FailureReason::UserCancelled, None)
        );
        assert!(service.submissions().is_empty());
        let controls = coordinator.controls();
        assert!(controls.clock_in_enabled);
        assert_eq!(controls.verifying, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unsupported_device_never_reaches_backend() {
        let h = harness(SimulatedAuthenticator::unsupported());

        let message = h.coordinator.clock_in().await;

        assert_eq!(
            message,
            StatusMessage::verification_failed(FailureReason::NotSupported, None)
        );
        assert_eq!(h.opened.load(Ordering::SeqCst), 1);
        assert_eq!(h.begins.calls.load(Ordering::SeqCst), 0);
        assert!(h.service.submissions().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_location_blocks_when_required() {
        let h = harness(SimulatedAuthenticator::new().with_credential(CRED));
        let coordinator = ClockCoordinator::new(
            SUBJECT,
            h.service.clone(),
            VerificationSession::new(
                &VerificationConfig::default(),
                Arc::new(AbandonedPopupHost {
                    after: Duration::ZERO,
                }),
                MessageHub::new("http://localhost:3000"),
            ),
            Arc::new(FixedLocation(None)),
        );

        let message = coordinator.clock_in().await;
        assert_eq!(
            message,
            StatusMessage::error("Location not available. Cannot clock in/out.")
        );

        // Optional location: proceeds to verification
        let relaxed = coordinator.require_location(false);
        let message = relaxed.clock_in().await;
        assert_eq!(
            message,
            StatusMessage::verification_failed(FailureReason::UserCancelled, None)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_service_rejection_keeps_state() {
        let h = harness_with(
            SimulatedAuthenticator::new().with_credential(CRED),
            RecordingService {
                reject_with: Some("You have already clocked in today.".into()),
                ..RecordingService::default()
            },
        );

        let message = h.coordinator.clock_in().await;

        assert_eq!(
            message,
            StatusMessage::failed(
                ActionFailure::Service(ServiceError::Rejected(
                    "You have already clocked in today.".into()
                )),
                "Clock-in failed: You have already clocked in today."
            )
        );
        assert_eq!(h.coordinator.clock_status(), ClockStatus::default());
        assert!(h.coordinator.controls().clock_in_enabled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_action_is_rejected() {
        let h = harness(
            SimulatedAuthenticator::new()
                .with_credential(CRED)
                .with_delay(Duration::from_secs(1)),
        );

        let (first, second) = tokio::join!(h.coordinator.clock_in(), async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            assert_eq!(h.coordinator.controls().verifying, Some(ClockAction::ClockIn));
            assert!(!h.coordinator.controls().clock_in_enabled);
            h.coordinator.clock_in().await
        });

        assert!(first.is_success());
        assert_eq!(
            second,
            StatusMessage::error("A verification is already in progress.")
        );
        assert_eq!(h.opened.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_failure_is_reported() {
        let h = harness(SimulatedAuthenticator::new());
        assert_eq!(
            h.coordinator.refresh().await,
            Some(StatusMessage::failed(
                ActionFailure::Service(ServiceError::Network("offline".into())),
                "Could not fetch today's attendance status."
            ))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_end_to_end_with_memory_backend() {
        let config = VerificationConfig::default();
        let backend = Arc::new(MemoryBackend::with_fixtures(&config));
        let host = TaskWindowHost::new(PopupEnvironment {
            authenticator: Arc::new(
                SimulatedAuthenticator::new().with_credential(FIXTURE_CREDENTIAL),
            ),
            backend: backend.ceremony_backend(),
            rp_id: config.rp_id.clone(),
            ceremony_timeout: config.ceremony_timeout,
            timings: PopupTimings::default(),
        });
        let session =
            VerificationSession::new(&config, Arc::new(host), MessageHub::new(config.app_origin()));
        let coordinator = ClockCoordinator::new(
            "2",
            backend.clone(),
            session,
            Arc::new(FixedLocation(Some(HERE))),
        );

        assert_eq!(coordinator.refresh().await, None);
        assert!(coordinator.controls().clock_in_enabled);

        assert!(coordinator.clock_in().await.is_success());
        assert!(coordinator.clock_out().await.is_success());

        // A fresh client sees the committed day
        assert_eq!(coordinator.refresh().await, None);
        let status = coordinator.clock_status();
        assert!(status.clock_in.is_some() && status.clock_out.is_some());
        let controls = coordinator.controls();
        assert!(!controls.clock_in_enabled && !controls.clock_out_enabled);
    }

    #[test]
    fn test_local_checks() {
        let fresh = ClockStatus::default();
        assert!(fresh.check(ClockAction::ClockIn).is_ok());
        assert_eq!(
            fresh.check(ClockAction::ClockOut),
            Err("You haven't clocked in yet.")
        );

        let working = ClockStatus {
            clock_in: Some(Utc::now()),
            clock_out: None,
        };
        assert!(working.check(ClockAction::ClockIn).is_err());
        assert!(working.check(ClockAction::ClockOut).is_ok());
    }
}
