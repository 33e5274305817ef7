//! Main-window side of a verification ceremony.
//!
//! A [`VerificationSession`] opens the popup, waits for exactly one trusted
//! `webauthn-result` message, and resolves to a [`VerificationOutcome`].
//! A session runs one ceremony at a time; a second `start_verification`
//! while one is pending returns [`SessionError::Busy`]. The state passes
//! through `Resolved` and is back at `Idle` once the call returns;
//! [`VerificationSession::last_outcome`] keeps the kind of the last result.
//!
//! Every exit path (resolution, popup closed, the caller dropping the
//! future) unregisters the message listener and closes the popup.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, info_span, warn, Instrument};
use url::Url;

use crate::ceremony::fresh_challenge;
use crate::codec;
use crate::config::VerificationConfig;
use crate::error::SessionError;
use crate::message::ResultMessage;
use crate::types::{
    ClockAction, FailureReason, OutcomeKind, SessionState, VerificationOutcome,
    VerificationRequest,
};
use crate::window::{
    MessageHub, MessageListener, PopupAddress, PopupHandle, WindowHost, WindowId, WindowMessage,
};

pub struct VerificationSession {
    host: Arc<dyn WindowHost>,
    hub: MessageHub,
    app_url: Url,
    popup_route: String,
    poll_interval: Duration,
    state: watch::Sender<SessionState>,
    last_outcome: watch::Sender<Option<OutcomeKind>>,
    watchers: Arc<AtomicUsize>,
}

impl VerificationSession {
    /// Create a session whose main window receives messages on `hub`.
    ///
    /// Only messages whose origin equals the hub's origin are trusted.
    pub fn new(config: &VerificationConfig, host: Arc<dyn WindowHost>, hub: MessageHub) -> Self {
        let (state, _) = watch::channel(SessionState::Idle);
        Self {
            host,
            hub,
            app_url: config.app_url.clone(),
            popup_route: config.popup_route.clone(),
            poll_interval: config.poll_interval,
            state,
            last_outcome: watch::channel(None).0,
            watchers: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Follow state transitions.
    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Kind of the most recently settled ceremony.
    pub fn last_outcome(&self) -> Option<OutcomeKind> {
        *self.last_outcome.borrow()
    }

    pub fn hub(&self) -> &MessageHub {
        &self.hub
    }

    /// Number of popup-closure watchers currently running.
    pub fn active_watchers(&self) -> usize {
        self.watchers.load(Ordering::SeqCst)
    }

    /// Run one ceremony for `subject_id` and wait for its outcome.
    ///
    /// Never fails except with [`SessionError::Busy`]; every ceremony
    /// failure is a [`VerificationOutcome::Failure`].
    pub async fn start_verification(
        &self,
        subject_id: &str,
        action: ClockAction,
    ) -> Result<VerificationOutcome, SessionError> {
        let claimed = self.state.send_if_modified(|state| {
            if *state == SessionState::Idle {
                *state = SessionState::AwaitingPopup;
                true
            } else {
                false
            }
        });
        if !claimed {
            warn!(subject_id, %action, "Verification already in progress");
            return Err(SessionError::Busy);
        }

        let mut ceremony = CeremonyGuard {
            state: &self.state,
            last_outcome: &self.last_outcome,
            popup: None,
        };

        let nonce = match fresh_challenge() {
            Ok(nonce) => nonce,
            Err(e) => {
                let outcome = VerificationOutcome::failure_with(FailureReason::Unknown, e.to_string());
                ceremony.settle(&outcome);
                return Ok(outcome);
            }
        };
        let request = VerificationRequest {
            subject_id: subject_id.to_string(),
            action,
            nonce,
        };
        let span = info_span!(
            "verification",
            ceremony = %codec::encode(&request.nonce[..6]),
            subject_id = %request.subject_id,
            action = %request.action,
        );

        let outcome = self
            .run_ceremony(&request, &mut ceremony)
            .instrument(span)
            .await;
        ceremony.settle(&outcome);
        // Give watchers a chance to observe Resolved before the guard resets to Idle
        tokio::task::yield_now().await;
        Ok(outcome)
    }

    async fn run_ceremony(
        &self,
        request: &VerificationRequest,
        ceremony: &mut CeremonyGuard<'_>,
    ) -> VerificationOutcome {
        // Listen before the popup exists so its message cannot be missed
        let mut listener = self.hub.subscribe();

        let address = match PopupAddress::for_subject(
            &self.app_url,
            &self.popup_route,
            &request.subject_id,
        ) {
            Ok(address) => address,
            Err(e) => {
                warn!(error = %e, "Could not build popup address");
                return VerificationOutcome::failure_with(FailureReason::Unknown, e.to_string());
            }
        };

        let popup = match self.host.open_popup(&address, &self.hub) {
            Ok(popup) => popup,
            Err(e) => {
                warn!(error = %e, "Verification popup could not be opened");
                return VerificationOutcome::failure_with(
                    FailureReason::Unknown,
                    "verification window could not be opened",
                );
            }
        };
        let popup_id = popup.id();
        info!(window = %popup_id, "Verification popup opened");
        ceremony.popup = Some(popup);
        self.state.send_replace(SessionState::AwaitingMessage);

        let _watcher = WatcherGuard::register(&self.watchers);
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                message = listener.recv() => match message {
                    Some(message) => {
                        if let Some(outcome) = self.accept(&message, popup_id) {
                            return outcome;
                        }
                    }
                    None => {
                        return VerificationOutcome::failure_with(
                            FailureReason::Unknown,
                            "message channel closed",
                        );
                    }
                },

                _ = ticker.tick() => {
                    if ceremony.popup_closed() {
                        // A popup posts before it closes, so drain first
                        if let Some(outcome) = self.drain(&mut listener, popup_id) {
                            return outcome;
                        }
                        if listener.skipped() > 0 {
                            // The result may have been among the dropped messages
                            warn!(
                                skipped = listener.skipped(),
                                "Popup closed after messages were lost"
                            );
                            return VerificationOutcome::failure_with(
                                FailureReason::Unknown,
                                "verification result was lost",
                            );
                        }
                        info!("Popup closed before reporting");
                        return VerificationOutcome::failure(FailureReason::UserCancelled);
                    }
                }
            }
        }
    }

    /// Outcome carried by `message` if it is the trusted result of `popup`.
    fn accept(&self, message: &WindowMessage, popup: WindowId) -> Option<VerificationOutcome> {
        if message.origin != self.hub.origin() {
            debug!(origin = %message.origin, "Ignoring message from foreign origin");
            return None;
        }
        if message.source != Some(popup) {
            debug!("Ignoring message from another window");
            return None;
        }
        let outcome = ResultMessage::outcome_of(&message.data);
        if let Some(VerificationOutcome::Failure {
            reason: FailureReason::SecurityViolation,
            detail,
        }) = &outcome
        {
            warn!(detail = ?detail, "Popup reported an unusable result");
        }
        outcome
    }

    fn drain(&self, listener: &mut MessageListener, popup: WindowId) -> Option<VerificationOutcome> {
        while let Some(message) = listener.try_recv() {
            if let Some(outcome) = self.accept(&message, popup) {
                return Some(outcome);
            }
        }
        None
    }
}

/// Cleanup for one ceremony. Runs on every exit path, including the
/// caller dropping the `start_verification` future.
struct CeremonyGuard<'a> {
    state: &'a watch::Sender<SessionState>,
    last_outcome: &'a watch::Sender<Option<OutcomeKind>>,
    popup: Option<PopupHandle>,
}

impl CeremonyGuard<'_> {
    fn popup_closed(&self) -> bool {
        self.popup.as_ref().map_or(true, PopupHandle::is_closed)
    }

    fn close_popup(&mut self) {
        if let Some(popup) = self.popup.take() {
            popup.close();
        }
    }

    fn settle(&mut self, outcome: &VerificationOutcome) {
        self.close_popup();
        self.last_outcome.send_replace(Some(outcome.kind()));
        self.state.send_replace(SessionState::Resolved(outcome.kind()));
    }
}

impl Drop for CeremonyGuard<'_> {
    fn drop(&mut self) {
        self.close_popup();
        self.state.send_replace(SessionState::Idle);
    }
}

struct WatcherGuard(Arc<AtomicUsize>);

impl WatcherGuard {
    fn register(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(counter))
    }
}

impl Drop for WatcherGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}
