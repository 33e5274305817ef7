//! The verification popup: runs one platform-authenticator ceremony in an
//! isolated context and reports the outcome to its opener exactly once.
//!
//! ## Steps
//!
//! 1. Read the subject id from the popup address.
//! 2. Check for a user-verifying platform authenticator.
//! 3. `begin` against the ceremony backend for a challenge and allow-list.
//! 4. Ask the authenticator for an assertion, bounded by the ceremony timeout.
//! 5. Post a `webauthn-result` message to the opener, then self-close.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

use crate::authenticator::{
    AssertionOptions, AuthenticatorError, PlatformAuthenticator, UserVerification,
};
use crate::ceremony::{BackendError, CeremonyBackend};
use crate::error::WindowError;
use crate::message::ResultMessage;
use crate::types::{FailureReason, SerializedAssertion, VerificationOutcome};
use crate::window::{MessageHub, PopupAddress, PopupHandle, PopupWindow, WindowHost};

/// Shortest grace period before a popup closes after telling the user
/// biometrics are unsupported.
pub const MIN_UNSUPPORTED_GRACE: Duration = Duration::from_secs(2);

/// How long the popup stays open after emitting, so the user can read
/// the final status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PopupTimings {
    /// After success (default: 500ms)
    pub success_close: Duration,
    /// After any failure (default: 3s)
    pub failure_close: Duration,
    /// After reporting no platform authenticator (default: 3s, at least 2s)
    pub unsupported_close: Duration,
}

impl Default for PopupTimings {
    fn default() -> Self {
        Self {
            success_close: Duration::from_millis(500),
            failure_close: Duration::from_secs(3),
            unsupported_close: Duration::from_secs(3),
        }
    }
}

impl PopupTimings {
    pub fn close_delay(&self, outcome: &VerificationOutcome) -> Duration {
        match outcome.failure_reason() {
            None => self.success_close,
            Some(FailureReason::NotSupported) => self.unsupported_close.max(MIN_UNSUPPORTED_GRACE),
            Some(_) => self.failure_close,
        }
    }
}

/// Collaborators of a popup.
pub struct PopupEnvironment {
    pub authenticator: Arc<dyn PlatformAuthenticator>,
    pub backend: Arc<dyn CeremonyBackend>,
    /// Used when the backend does not name a relying party.
    pub rp_id: String,
    pub ceremony_timeout: Duration,
    pub timings: PopupTimings,
}

/// Text the popup shows its user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PopupStatus {
    Info(String),
    Success(String),
    Error(String),
}

impl PopupStatus {
    fn from_outcome(outcome: &VerificationOutcome) -> Self {
        match outcome {
            VerificationOutcome::Success { .. } => {
                Self::Success("Verification successful. This window will close.".into())
            }
            VerificationOutcome::Failure {
                reason: FailureReason::Unknown,
                detail: Some(detail),
            } => Self::Error(format!("Verification failed: {detail}")),
            VerificationOutcome::Failure { reason, .. } => Self::Error(reason.user_message().into()),
        }
    }
}

pub struct VerificationPopup {
    env: Arc<PopupEnvironment>,
    window: PopupWindow,
    status: watch::Sender<PopupStatus>,
}

impl VerificationPopup {
    pub fn new(env: Arc<PopupEnvironment>, window: PopupWindow) -> Self {
        let (status, _) = watch::channel(PopupStatus::Info("Initializing...".into()));
        Self {
            env,
            window,
            status,
        }
    }

    /// Follow the popup's displayed status.
    pub fn status(&self) -> watch::Receiver<PopupStatus> {
        self.status.subscribe()
    }

    /// Run the ceremony to completion, emit, and close the window.
    #[instrument(skip_all, fields(window = %self.window.id()))]
    pub async fn run(self) {
        let outcome = self.perform_ceremony().await;

        self.status.send_replace(PopupStatus::from_outcome(&outcome));
        self.emit(&outcome);

        tokio::time::sleep(self.env.timings.close_delay(&outcome)).await;
        self.window.close();
    }

    async fn perform_ceremony(&self) -> VerificationOutcome {
        let Some(subject_id) = self.window.address().subject_id() else {
            warn!("Popup opened without a subject id");
            return VerificationOutcome::failure_with(
                FailureReason::Unknown,
                "subject id not provided",
            );
        };

        if !self.env.authenticator.is_available().await {
            info!("No user-verifying platform authenticator");
            return VerificationOutcome::failure(FailureReason::NotSupported);
        }

        self.status.send_replace(PopupStatus::Info(
            "Waiting for biometric verification...".into(),
        ));

        let options = match self.env.backend.begin(&subject_id).await {
            Ok(options) => options,
            Err(e) => return backend_failure(e),
        };
        if options.allow_credentials.is_empty() {
            return VerificationOutcome::failure(FailureReason::NoCredential);
        }

        let request = AssertionOptions {
            challenge: options.challenge,
            rp_id: options.rp_id.unwrap_or_else(|| self.env.rp_id.clone()),
            origin: self.window.origin(),
            allow_credentials: options.allow_credentials,
            timeout: options
                .timeout
                .map_or(self.env.ceremony_timeout, |t| t.min(self.env.ceremony_timeout)),
            user_verification: UserVerification::Required,
        };

        debug!(
            credentials = request.allow_credentials.len(),
            rp_id = %request.rp_id,
            "Requesting assertion"
        );

        match tokio::time::timeout(
            request.timeout,
            self.env.authenticator.get_assertion(&request),
        )
        .await
        {
            Err(_) => VerificationOutcome::failure_with(
                FailureReason::UserCancelled,
                "verification timed out",
            ),
            Ok(Err(e)) => authenticator_failure(e),
            Ok(Ok(assertion)) => VerificationOutcome::Success {
                assertion: SerializedAssertion::from(&assertion),
            },
        }
    }

    /// Post the outcome to the opener's exact origin. Called once per run.
    fn emit(&self, outcome: &VerificationOutcome) {
        let message = ResultMessage::from_outcome(outcome).to_value();
        let origin = self.window.origin();
        if self.window.post_to_opener(message, &origin) {
            info!(outcome = ?outcome.kind(), "Posted verification result to opener");
        } else {
            warn!(outcome = ?outcome.kind(), "Opener unavailable, verification result dropped");
        }
    }
}

fn backend_failure(err: BackendError) -> VerificationOutcome {
    warn!(error = %err, "Ceremony begin failed");
    match err {
        BackendError::NoCredential(_) => VerificationOutcome::failure(FailureReason::NoCredential),
        BackendError::Network(detail) => {
            VerificationOutcome::failure_with(FailureReason::NetworkError, detail)
        }
        BackendError::Decode(e) => {
            VerificationOutcome::failure_with(FailureReason::SecurityViolation, e.to_string())
        }
        other => VerificationOutcome::failure_with(FailureReason::Unknown, other.to_string()),
    }
}

fn authenticator_failure(err: AuthenticatorError) -> VerificationOutcome {
    warn!(error = %err, "Platform authenticator failed");
    match err {
        AuthenticatorError::NotAllowed(detail) => {
            VerificationOutcome::failure_with(FailureReason::UserCancelled, detail)
        }
        AuthenticatorError::Security(detail) => {
            VerificationOutcome::failure_with(FailureReason::SecurityViolation, detail)
        }
        AuthenticatorError::NotSupported(_) => {
            VerificationOutcome::failure(FailureReason::NotSupported)
        }
        AuthenticatorError::Other(detail) => {
            VerificationOutcome::failure_with(FailureReason::Unknown, detail)
        }
    }
}

/// Window host that runs each popup as a tokio task.
pub struct TaskWindowHost {
    env: Arc<PopupEnvironment>,
}

impl TaskWindowHost {
    pub fn new(env: PopupEnvironment) -> Self {
        Self { env: Arc::new(env) }
    }
}

impl WindowHost for TaskWindowHost {
    fn open_popup(
        &self,
        address: &PopupAddress,
        opener: &MessageHub,
    ) -> Result<PopupHandle, WindowError> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| WindowError::Blocked(e.to_string()))?;

        let (window, handle) = PopupWindow::open(address.clone(), Some(opener.clone()));
        debug!(window = %window.id(), address = %address, "Opening verification popup");

        let popup = VerificationPopup::new(Arc::clone(&self.env), window);
        let task = runtime.spawn(popup.run());
        Ok(handle.with_task(task.abort_handle()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ceremony::{CeremonyOptions, CredentialStore, LocalCeremonyBackend};
    use crate::codec;
    use crate::message::ResultMessage;
    use crate::simulated::{SimulatedAuthenticator, SimulatedBehavior};
    use crate::types::Credential;
    use crate::window::{MessageListener, WindowMessage};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::Instant;
    use url::Url;

    const ORIGIN: &str = "http://localhost:3000";
    const CRED: &[u8] = b"cred-u42";

    struct CountingBackend {
        inner: LocalCeremonyBackend,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl CeremonyBackend for CountingBackend {
        async fn begin(&self, subject_id: &str) -> Result<CeremonyOptions, BackendError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.begin(subject_id).await
        }
    }

    struct FailingBackend(BackendError);

    #[async_trait]
    impl CeremonyBackend for FailingBackend {
        async fn begin(&self, _subject_id: &str) -> Result<CeremonyOptions, BackendError> {
            Err(self.0.clone())
        }
    }

    fn enrolled_backend() -> Arc<CountingBackend> {
        let store = Arc::new(CredentialStore::new());
        store.register(
            "u-42",
            Credential {
                id: codec::encode(CRED),
                public_key_algorithm: -7,
                response: Vec::new(),
            },
        );
        Arc::new(CountingBackend {
            inner: LocalCeremonyBackend::new(store, "localhost"),
            calls: AtomicUsize::new(0),
        })
    }

    fn env(
        authenticator: SimulatedAuthenticator,
        backend: Arc<dyn CeremonyBackend>,
    ) -> Arc<PopupEnvironment> {
        Arc::new(PopupEnvironment {
            authenticator: Arc::new(authenticator),
            backend,
            rp_id: "localhost".into(),
            ceremony_timeout: Duration::from_secs(60),
            timings: PopupTimings::default(),
        })
    }

    fn open(subject: Option<&str>) -> (PopupWindow, PopupHandle, MessageListener) {
        let hub = MessageHub::new(ORIGIN);
        let listener = hub.subscribe();
        let app = Url::parse(ORIGIN).unwrap();
        let address = match subject {
            Some(id) => PopupAddress::for_subject(&app, "/auth-popup", id).unwrap(),
            None => PopupAddress::parse("http://localhost:3000/auth-popup").unwrap(),
        };
        let (window, handle) = PopupWindow::open(address, Some(hub));
        (window, handle, listener)
    }

    fn outcome_of(message: WindowMessage) -> VerificationOutcome {
        ResultMessage::outcome_of(&message.data).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_posts_assertion_and_closes_quickly() {
        let backend = enrolled_backend();
        let env = env(
            SimulatedAuthenticator::new().with_credential(CRED),
            backend.clone(),
        );
        let (window, handle, mut listener) = open(Some("u-42"));
        let popup_id = handle.id();

        let started = Instant::now();
        VerificationPopup::new(env, window).run().await;

        let message = listener.try_recv().unwrap();
        assert_eq!(message.source, Some(popup_id));
        assert_eq!(message.origin, ORIGIN);
        assert!(outcome_of(message).is_success());
        assert!(listener.try_recv().is_none(), "exactly one message");
        assert!(handle.is_closed());
        assert_eq!(started.elapsed(), Duration::from_millis(500));
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unsupported_device_reports_without_backend_call() {
        let backend = enrolled_backend();
        let env = env(SimulatedAuthenticator::unsupported(), backend.clone());
        let (window, handle, mut listener) = open(Some("u-42"));

        let popup = VerificationPopup::new(env, window);
        let status = popup.status();
        let task = tokio::spawn(popup.run());

        // Emitted on the first tick, window still open for the grace period
        tokio::time::sleep(Duration::from_millis(10)).await;
        let outcome = outcome_of(listener.try_recv().unwrap());
        assert_eq!(outcome.failure_reason(), Some(FailureReason::NotSupported));
        assert!(!handle.is_closed());
        assert!(matches!(*status.borrow(), PopupStatus::Error(_)));

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(handle.is_closed());
        task.await.unwrap();
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_subject_is_unknown_failure() {
        let env = env(SimulatedAuthenticator::new(), enrolled_backend());
        let (window, _handle, mut listener) = open(None);

        VerificationPopup::new(env, window).run().await;

        assert_eq!(
            outcome_of(listener.try_recv().unwrap()),
            VerificationOutcome::failure_with(FailureReason::Unknown, "subject id not provided")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_subject_without_credential() {
        let env = env(
            SimulatedAuthenticator::new().with_credential(CRED),
            enrolled_backend(),
        );
        let (window, _handle, mut listener) = open(Some("u-7"));

        VerificationPopup::new(env, window).run().await;

        assert_eq!(
            outcome_of(listener.try_recv().unwrap()).failure_reason(),
            Some(FailureReason::NoCredential)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_backend_unreachable_is_network_error() {
        let env = env(
            SimulatedAuthenticator::new(),
            Arc::new(FailingBackend(BackendError::Network("connection refused".into()))),
        );
        let (window, _handle, mut listener) = open(Some("u-42"));

        VerificationPopup::new(env, window).run().await;

        assert_eq!(
            outcome_of(listener.try_recv().unwrap()),
            VerificationOutcome::failure_with(FailureReason::NetworkError, "connection refused")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_authenticator_errors_are_classified() {
        let cases = [
            (SimulatedBehavior::Cancel, FailureReason::UserCancelled),
            (SimulatedBehavior::InsecureContext, FailureReason::SecurityViolation),
            (SimulatedBehavior::Fail("sensor fault".into()), FailureReason::Unknown),
        ];
        for (behavior, expected) in cases {
            let env = env(
                SimulatedAuthenticator::new()
                    .with_credential(CRED)
                    .with_behavior(behavior),
                enrolled_backend(),
            );
            let (window, _handle, mut listener) = open(Some("u-42"));
            VerificationPopup::new(env, window).run().await;
            assert_eq!(
                outcome_of(listener.try_recv().unwrap()).failure_reason(),
                Some(expected)
            );
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_failure_keeps_raw_message() {
        let env = env(
            SimulatedAuthenticator::new()
                .with_credential(CRED)
                .with_behavior(SimulatedBehavior::Fail("sensor fault".into())),
            enrolled_backend(),
        );
        let (window, _handle, mut listener) = open(Some("u-42"));
        VerificationPopup::new(env, window).run().await;

        let value = listener.try_recv().unwrap().data;
        assert_eq!(value["error"], "sensor fault");
        assert_eq!(value["reason"], "unknown");
    }

    #[tokio::test(start_paused = true)]
    async fn test_platform_timeout_is_user_cancelled() {
        let env = env(
            SimulatedAuthenticator::new()
                .with_credential(CRED)
                .with_behavior(SimulatedBehavior::Hang),
            enrolled_backend(),
        );
        let (window, _handle, mut listener) = open(Some("u-42"));

        let started = Instant::now();
        VerificationPopup::new(env, window).run().await;

        assert_eq!(
            outcome_of(listener.try_recv().unwrap()),
            VerificationOutcome::failure_with(FailureReason::UserCancelled, "verification timed out")
        );
        assert_eq!(started.elapsed(), Duration::from_secs(63));
    }

    #[test]
    fn test_unsupported_grace_has_a_floor() {
        let timings = PopupTimings {
            unsupported_close: Duration::from_millis(100),
            ..PopupTimings::default()
        };
        let outcome = VerificationOutcome::failure(FailureReason::NotSupported);
        assert_eq!(timings.close_delay(&outcome), MIN_UNSUPPORTED_GRACE);
    }
}
