// ── Connection manager ──
//
// Owns the single logical connection to the sync server: the transport
// link, the heartbeat, and the reconnect backoff. All of that lives in
// one background task per `connect()`; `disconnect()` cancels the task
// as a unit so no stray timer can bring the connection back.

pub(crate) mod outbox;
mod state;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use secrecy::SecretString;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use crmsync_api::{Connector, OutboundMessage, TransportEvent, TransportLink, WebSocketConnector, redacted};

use crate::config::SyncConfig;
use crate::dispatch::Dispatcher;
use crate::error::CoreError;
use crate::invalidation::{CacheInvalidationBridge, CacheKey, QueryCache};
use crate::lock;
use crate::model::{PresenceStatus, PresenceUser};
use crate::notify::{Notifier, TracingNotifier};
use crate::presence::{PresenceTracker, Visibility};
use crate::registry::{ChannelRegistry, Subscription};
use crate::status::ConnectionStatus;

use self::outbox::Outbox;
pub use self::state::ConnectionState;

// ── ConnectionManager ────────────────────────────────────────────────

/// The one connection the rest of the application talks through.
///
/// Cheaply cloneable via `Arc<ManagerInner>`. Construct one per process
/// (or per test) and hand clones to whatever needs it.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<ManagerInner>,
}

struct ManagerInner {
    config: SyncConfig,
    connector: Arc<dyn Connector>,
    state: watch::Sender<ConnectionState>,
    outbox: Arc<Outbox>,
    registry: Arc<ChannelRegistry>,
    presence: Arc<PresenceTracker>,
    invalidation: Arc<CacheInvalidationBridge>,
    dispatcher: Dispatcher,
    session: Mutex<Option<Session>>,
    /// Why the last loop gave up for good, as `(url, reason)`.
    failure: Mutex<Option<(String, String)>>,
}

/// A running connection loop and the token that stops it.
struct Session {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl ConnectionManager {
    /// Manager backed by the WebSocket connector and the logging notifier.
    /// Does NOT connect -- call [`connect()`](Self::connect).
    pub fn new(config: SyncConfig) -> Self {
        Self::builder(config).build()
    }

    pub fn builder(config: SyncConfig) -> ConnectionManagerBuilder {
        ConnectionManagerBuilder {
            config,
            connector: None,
            notifier: None,
            query_cache: None,
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.inner.config
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Start connecting with `token`.
    ///
    /// Without a token this is a no-op and the manager stays
    /// disconnected. Calling it while a session is already running is
    /// also a no-op. Must be called from within a tokio runtime.
    pub fn connect(&self, token: Option<SecretString>) {
        let Some(token) = token else {
            debug!("no authentication token, staying disconnected");
            return;
        };

        let mut session = lock(&self.inner.session);
        if session.as_ref().is_some_and(|s| !s.task.is_finished()) {
            debug!("connect() while a session is running, ignoring");
            return;
        }

        let target = self.inner.config.target(&token);
        let cancel = CancellationToken::new();
        lock(&self.inner.failure).take();
        self.inner.transition(&cancel, ConnectionState::Connecting);

        let task = tokio::spawn(connection_loop(
            Arc::clone(&self.inner),
            target,
            cancel.clone(),
        ));
        *session = Some(Session { cancel, task });
    }

    /// Tear the connection down and stay down.
    ///
    /// Heartbeat and any pending reconnect timer are cancelled before
    /// this returns.
    pub fn disconnect(&self) {
        let session = lock(&self.inner.session).take();
        if let Some(session) = session {
            session.cancel.cancel();
            session.task.abort();
            info!("disconnected by request");
        }
        self.inner.outbox.detach();
        self.inner.state.send_replace(ConnectionState::Disconnected);
    }

    /// Wait until the state reads `Connected`, bounded by `timeout`.
    ///
    /// Returns [`CoreError::ConnectionFailed`] as soon as the connection
    /// loop gives up instead of waiting out the deadline.
    pub async fn wait_until_connected(&self, timeout: Duration) -> Result<(), CoreError> {
        let mut states = self.inner.state.subscribe();
        let settled = states.wait_for(|s| {
            s.is_connected()
                || (*s == ConnectionState::Disconnected && lock(&self.inner.failure).is_some())
        });
        let connected = match time::timeout(timeout, settled).await {
            Ok(Ok(state)) => state.is_connected(),
            Ok(Err(_)) => return Err(CoreError::Disconnected),
            Err(_) => {
                return Err(CoreError::Timeout {
                    timeout_secs: timeout.as_secs(),
                });
            }
        };
        if connected {
            return Ok(());
        }
        Err(self.last_failure().unwrap_or(CoreError::Disconnected))
    }

    /// Why the connection loop stopped retrying, if it has.
    ///
    /// Cleared by the next [`connect()`](Self::connect).
    pub fn last_failure(&self) -> Option<CoreError> {
        lock(&self.inner.failure)
            .clone()
            .map(|(url, reason)| CoreError::ConnectionFailed { url, reason })
    }

    // ── Messaging ────────────────────────────────────────────────────

    /// Publish `payload` on `channel`.
    ///
    /// Dropped silently (returns `false`) unless connected. There is no
    /// outbound queue.
    pub fn send(&self, channel: &str, payload: serde_json::Value) -> bool {
        self.inner.outbox.send(&OutboundMessage::Message {
            channel: channel.to_owned(),
            payload,
        })
    }

    /// Same as [`send`](Self::send).
    pub fn publish(&self, channel: &str, payload: serde_json::Value) -> bool {
        self.send(channel, payload)
    }

    /// Register `callback` for every message on `channel`.
    pub fn subscribe<F>(&self, channel: impl Into<String>, callback: F) -> Subscription
    where
        F: Fn(&serde_json::Value) + Send + Sync + 'static,
    {
        self.inner.registry.subscribe(channel, callback)
    }

    pub fn registry(&self) -> &Arc<ChannelRegistry> {
        &self.inner.registry
    }

    // ── Presence ─────────────────────────────────────────────────────

    pub fn presence(&self) -> Arc<Vec<PresenceUser>> {
        self.inner.presence.users()
    }

    pub fn watch_presence(&self) -> watch::Receiver<Arc<Vec<PresenceUser>>> {
        self.inner.presence.subscribe()
    }

    /// Announce the local status. Best effort: dropped while disconnected.
    pub fn set_presence(&self, status: PresenceStatus, current_page: Option<String>) -> bool {
        self.inner.presence.set_presence(status, current_page)
    }

    pub fn visibility_changed(&self, visibility: Visibility) -> bool {
        self.inner.presence.visibility_changed(visibility)
    }

    // ── Observability ────────────────────────────────────────────────

    pub fn state(&self) -> ConnectionState {
        *self.inner.state.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    /// Receiver that wakes on every state transition.
    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    pub fn status(&self) -> ConnectionStatus {
        ConnectionStatus::from(self.state())
    }

    /// When the server last answered a heartbeat.
    pub fn last_pong(&self) -> Option<DateTime<Utc>> {
        self.inner.dispatcher.last_pong()
    }

    /// Cache keys invalidated by inbound `data_update` events.
    pub fn invalidations(&self) -> broadcast::Receiver<CacheKey> {
        self.inner.invalidation.subscribe()
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("endpoint", &self.inner.config.endpoint.as_str())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

// ── Builder ──────────────────────────────────────────────────────────

/// Swaps out the collaborators a [`ConnectionManager`] talks to.
#[must_use]
pub struct ConnectionManagerBuilder {
    config: SyncConfig,
    connector: Option<Arc<dyn Connector>>,
    notifier: Option<Arc<dyn Notifier>>,
    query_cache: Option<Arc<dyn QueryCache>>,
}

impl ConnectionManagerBuilder {
    pub fn connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = Some(connector);
        self
    }

    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn query_cache(mut self, cache: Arc<dyn QueryCache>) -> Self {
        self.query_cache = Some(cache);
        self
    }

    pub fn build(self) -> ConnectionManager {
        let connector = self
            .connector
            .unwrap_or_else(|| Arc::new(WebSocketConnector::new()));
        let notifier = self.notifier.unwrap_or_else(|| Arc::new(TracingNotifier));

        let outbox = Arc::new(Outbox::new());
        let registry = Arc::new(ChannelRegistry::new(Arc::clone(&outbox)));
        let presence = Arc::new(PresenceTracker::new(Arc::clone(&outbox)));
        let invalidation = Arc::new(CacheInvalidationBridge::new(self.query_cache));
        let dispatcher = Dispatcher::new(
            Arc::clone(&registry),
            Arc::clone(&presence),
            Arc::clone(&invalidation),
            notifier,
        );
        let (state, _) = watch::channel(ConnectionState::Disconnected);

        ConnectionManager {
            inner: Arc::new(ManagerInner {
                config: self.config,
                connector,
                state,
                outbox,
                registry,
                presence,
                invalidation,
                dispatcher,
                session: Mutex::new(None),
                failure: Mutex::new(None),
            }),
        }
    }
}

// ── State transitions ────────────────────────────────────────────────

impl ManagerInner {
    /// Move to `next` unless the session has been cancelled.
    ///
    /// Checked under the watch lock, so once `disconnect()` has cancelled
    /// the token no transition from the old session can land after its
    /// final `Disconnected`. Returns `false` once cancelled.
    fn transition(&self, cancel: &CancellationToken, next: ConnectionState) -> bool {
        self.state.send_if_modified(|state| {
            if cancel.is_cancelled() || *state == next {
                return false;
            }
            debug!(from = %state, to = %next, "connection state changed");
            *state = next;
            true
        });
        !cancel.is_cancelled()
    }

    /// Record why the loop stopped, then settle in `Disconnected`.
    ///
    /// The failure lands before the state change so a waiter woken by
    /// `Disconnected` always sees it.
    fn give_up(&self, cancel: &CancellationToken, url: &str, reason: String) {
        if cancel.is_cancelled() {
            return;
        }
        *lock(&self.failure) = Some((url.to_owned(), reason));
        self.transition(cancel, ConnectionState::Disconnected);
    }
}

// ── Background tasks ─────────────────────────────────────────────────

/// Why a connected session ended.
enum SessionEnd {
    Cancelled,
    Closed { code: u16, reason: String },
    Failed(String),
}

/// Connect, run the session, back off, repeat, until cancelled or out of retries.
async fn connection_loop(inner: Arc<ManagerInner>, target: Url, cancel: CancellationToken) {
    let reconnect = inner.config.reconnect.clone();
    let endpoint = redacted(&target);
    let mut attempt: u32 = 0;

    loop {
        if !inner.transition(&cancel, ConnectionState::Connecting) {
            return;
        }

        let opened = tokio::select! {
            biased;
            () = cancel.cancelled() => return,
            opened = inner.connector.connect(target.clone()) => opened,
        };

        match opened {
            Ok(link) => {
                attempt = 0;
                info!(endpoint = %endpoint, "sync connection established");
                match run_session(&inner, link, &cancel).await {
                    SessionEnd::Cancelled => return,
                    SessionEnd::Closed { code, reason } => {
                        info!(code, reason = %reason, "sync connection closed");
                    }
                    SessionEnd::Failed(reason) => {
                        warn!(reason = %reason, "sync connection failed");
                    }
                }
            }
            Err(e) if !e.is_transient() => {
                warn!(endpoint = %endpoint, error = %e, "connection attempt rejected, not retrying");
                inner.give_up(&cancel, endpoint.as_str(), e.to_string());
                return;
            }
            Err(e) => {
                warn!(endpoint = %endpoint, error = %e, attempt, "connection attempt failed");
            }
        }

        if reconnect.max_retries.is_some_and(|max| attempt >= max) {
            warn!(attempts = attempt, "reconnect attempts exhausted, giving up");
            inner.give_up(
                &cancel,
                endpoint.as_str(),
                format!("gave up after {attempt} reconnect attempts"),
            );
            return;
        }
        if !inner.transition(&cancel, ConnectionState::Disconnected) {
            return;
        }

        let delay = reconnect.delay_for(attempt);
        attempt = attempt.saturating_add(1);
        if !inner.transition(&cancel, ConnectionState::Reconnecting { attempt }) {
            return;
        }
        debug!(attempt, delay_ms = delay.as_millis(), "reconnect scheduled");

        tokio::select! {
            biased;
            () = cancel.cancelled() => return,
            () = time::sleep(delay) => {}
        }
    }
}

/// Drive one open link: replay subscriptions, heartbeat, route inbound frames.
async fn run_session(
    inner: &ManagerInner,
    link: TransportLink,
    cancel: &CancellationToken,
) -> SessionEnd {
    let TransportLink {
        outbound,
        mut inbound,
    } = link;

    if !inner.transition(cancel, ConnectionState::Connected) {
        return SessionEnd::Cancelled;
    }
    let replayed = inner.registry.attach(outbound.clone(), cancel);
    debug!(channels = replayed, "subscriptions replayed");

    // A zero period turns the heartbeat off; the interval still needs a
    // non-zero period to exist.
    let period = inner.config.heartbeat_interval;
    let beating = !period.is_zero();
    let period = period.max(Duration::from_millis(1));
    let mut heartbeat = time::interval_at(Instant::now() + period, period);
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let end = loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break SessionEnd::Cancelled,
            event = inbound.recv() => match event {
                Some(TransportEvent::Frame(text)) => {
                    inner.dispatcher.handle_frame(&text);
                }
                Some(TransportEvent::Closed { code, reason }) => {
                    break SessionEnd::Closed { code, reason };
                }
                Some(TransportEvent::Failed(reason)) => break SessionEnd::Failed(reason),
                None => {
                    break SessionEnd::Closed {
                        code: 1006,
                        reason: "transport ended".into(),
                    };
                }
            },
            _ = heartbeat.tick(), if beating => {
                inner.outbox.send(&OutboundMessage::Ping);
            }
        }
    };

    inner.outbox.detach_if(&outbound);
    end
}
