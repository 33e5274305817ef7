//! Window plumbing between the main dashboard context and the popup.
//!
//! The two contexts share no state besides:
//! - the main window's [`MessageHub`], which the popup can post into, and
//! - the popup's open/closed flag, observed by the opener through a
//!   [`PopupHandle`].
//!
//! Posting follows `postMessage` rules: a message whose target origin does
//! not match the receiving window's origin is silently dropped.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::broadcast;
use tokio::task::AbortHandle;
use tracing::{debug, warn};
use url::Url;

use crate::error::WindowError;

/// Query parameter carrying the subject id in the popup address.
pub const SUBJECT_PARAM: &str = "userId";

/// Wildcard target origin. Accepted by the hub, never used by the popup.
pub const ANY_ORIGIN: &str = "*";

/// Messages buffered per listener before the oldest are dropped.
pub const HUB_CAPACITY: usize = 64;

static NEXT_WINDOW_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a browsing context, used as the message `source`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WindowId(u64);

impl WindowId {
    pub fn next() -> Self {
        Self(NEXT_WINDOW_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl std::fmt::Display for WindowId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "window-{}", self.0)
    }
}

/// A message event as seen by the receiving window.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowMessage {
    /// Posting window, if known.
    pub source: Option<WindowId>,
    /// Origin of the posting window.
    pub origin: String,
    pub data: Value,
}

/// Inbound message target of one window.
#[derive(Debug, Clone)]
pub struct MessageHub {
    origin: String,
    tx: broadcast::Sender<WindowMessage>,
}

impl MessageHub {
    /// Create the hub of a window living at `origin`
    /// (e.g. `http://localhost:3000`).
    pub fn new(origin: impl Into<String>) -> Self {
        let (tx, _) = broadcast::channel(HUB_CAPACITY);
        Self {
            origin: origin.into(),
            tx,
        }
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Register a message listener. Dropping it unregisters.
    pub fn subscribe(&self) -> MessageListener {
        MessageListener {
            rx: self.tx.subscribe(),
            skipped: 0,
        }
    }

    /// Number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Deliver `message` if `target_origin` matches this window.
    ///
    /// Returns whether the message reached at least one listener.
    pub fn post(&self, message: WindowMessage, target_origin: &str) -> bool {
        if target_origin != ANY_ORIGIN && target_origin != self.origin {
            debug!(
                target_origin = %target_origin,
                window_origin = %self.origin,
                "Dropping message for mismatched target origin"
            );
            return false;
        }
        self.tx.send(message).is_ok()
    }
}

/// A registered message listener.
#[derive(Debug)]
pub struct MessageListener {
    rx: broadcast::Receiver<WindowMessage>,
    skipped: u64,
}

impl MessageListener {
    /// Wait for the next message. `None` once the hub is gone.
    pub async fn recv(&mut self) -> Option<WindowMessage> {
        loop {
            match self.rx.recv().await {
                Ok(message) => return Some(message),
                Err(broadcast::error::RecvError::Lagged(skipped)) => self.lagged(skipped),
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Take an already-delivered message without waiting.
    pub fn try_recv(&mut self) -> Option<WindowMessage> {
        loop {
            match self.rx.try_recv() {
                Ok(message) => return Some(message),
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => self.lagged(skipped),
                Err(_) => return None,
            }
        }
    }

    /// Messages this listener lost to lag so far.
    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    fn lagged(&mut self, skipped: u64) {
        self.skipped += skipped;
        warn!(skipped, total = self.skipped, "Message listener lagged, oldest messages dropped");
    }
}

/// Address a popup is opened at: `<app>/auth-popup?userId=<id>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PopupAddress {
    url: Url,
}

impl PopupAddress {
    /// Build the popup address for `subject_id` under `app_url`.
    pub fn for_subject(app_url: &Url, route: &str, subject_id: &str) -> Result<Self, WindowError> {
        let mut url = app_url
            .join(route)
            .map_err(|e| WindowError::InvalidAddress(e.to_string()))?;
        url.query_pairs_mut().append_pair(SUBJECT_PARAM, subject_id);
        Ok(Self { url })
    }

    pub fn parse(address: &str) -> Result<Self, WindowError> {
        let url = Url::parse(address).map_err(|e| WindowError::InvalidAddress(e.to_string()))?;
        Ok(Self { url })
    }

    /// Origin of the page at this address.
    pub fn origin(&self) -> String {
        self.url.origin().ascii_serialization()
    }

    /// Subject id carried by the address, if present and non-blank.
    ///
    /// Looks at the query string first, then at a query embedded in the
    /// fragment (`/#/auth-popup?userId=...`).
    pub fn subject_id(&self) -> Option<String> {
        let from_query = self
            .url
            .query_pairs()
            .find(|(key, _)| key == SUBJECT_PARAM)
            .map(|(_, value)| value.into_owned());

        let from_fragment = || {
            let fragment = self.url.fragment()?;
            let (_, query) = fragment.split_once('?')?;
            url::form_urlencoded::parse(query.as_bytes())
                .find(|(key, _)| key == SUBJECT_PARAM)
                .map(|(_, value)| value.into_owned())
        };

        from_query
            .or_else(from_fragment)
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
    }

    pub fn as_str(&self) -> &str {
        self.url.as_str()
    }
}

impl std::fmt::Display for PopupAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.url.as_str())
    }
}

#[derive(Debug)]
struct WindowShared {
    id: WindowId,
    closed: AtomicBool,
}

/// The opener's handle on a popup window.
#[derive(Debug)]
pub struct PopupHandle {
    shared: Arc<WindowShared>,
    task: Option<AbortHandle>,
}

impl PopupHandle {
    /// Attach the task running the popup so closing the window stops it.
    pub fn with_task(mut self, task: AbortHandle) -> Self {
        self.task = Some(task);
        self
    }

    pub fn id(&self) -> WindowId {
        self.shared.id
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    /// Close the popup. Idempotent.
    pub fn close(&self) {
        if !self.shared.closed.swap(true, Ordering::AcqRel) {
            debug!(window = %self.shared.id, "Popup closed by opener");
        }
        if let Some(task) = &self.task {
            task.abort();
        }
    }
}

/// The popup's own view of its window.
///
/// Dropping it marks the window closed, so a popup task that dies without
/// emitting looks to the opener like a window the user closed.
#[derive(Debug)]
pub struct PopupWindow {
    shared: Arc<WindowShared>,
    address: PopupAddress,
    opener: Option<MessageHub>,
}

impl PopupWindow {
    /// Create a popup window at `address`, returning the popup side and
    /// the opener's handle.
    pub fn open(address: PopupAddress, opener: Option<MessageHub>) -> (Self, PopupHandle) {
        let shared = Arc::new(WindowShared {
            id: WindowId::next(),
            closed: AtomicBool::new(false),
        });
        let handle = PopupHandle {
            shared: Arc::clone(&shared),
            task: None,
        };
        (
            Self {
                shared,
                address,
                opener,
            },
            handle,
        )
    }

    pub fn id(&self) -> WindowId {
        self.shared.id
    }

    pub fn address(&self) -> &PopupAddress {
        &self.address
    }

    /// Origin this popup runs at.
    pub fn origin(&self) -> String {
        self.address.origin()
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    /// `window.opener.postMessage(data, target_origin)`.
    ///
    /// Returns `false` if there is no opener, the window is closed, or the
    /// opener's origin does not match `target_origin`.
    pub fn post_to_opener(&self, data: Value, target_origin: &str) -> bool {
        if self.is_closed() {
            return false;
        }
        match &self.opener {
            Some(hub) => hub.post(
                WindowMessage {
                    source: Some(self.id()),
                    origin: self.origin(),
                    data,
                },
                target_origin,
            ),
            None => false,
        }
    }

    /// `window.close()`.
    pub fn close(&self) {
        if !self.shared.closed.swap(true, Ordering::AcqRel) {
            debug!(window = %self.shared.id, "Popup closed itself");
        }
    }
}

impl Drop for PopupWindow {
    fn drop(&mut self) {
        self.shared.closed.store(true, Ordering::Release);
    }
}

/// Opens popup windows on behalf of a verification session.
pub trait WindowHost: Send + Sync {
    /// Open a popup at `address` whose opener is the window owning `opener`.
    fn open_popup(
        &self,
        address: &PopupAddress,
        opener: &MessageHub,
    ) -> Result<PopupHandle, WindowError>;
}
