// ── Channel registry ──
//
// De-duplicates local interest in named channels. A channel is present
// exactly while it has at least one listener; the first listener sends
// `subscribe`, the last one leaving sends `unsubscribe`. Listeners are
// removed by handle, never by value.

use std::collections::HashMap;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use indexmap::IndexMap;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crmsync_api::OutboundMessage;

use crate::connection::outbox::Outbox;
use crate::lock;

/// Callback invoked with the decoded payload of every message on a channel.
pub type Listener = Arc<dyn Fn(&serde_json::Value) + Send + Sync>;

/// Opaque handle identifying one registered listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

pub struct ChannelRegistry {
    channels: Mutex<HashMap<String, IndexMap<ListenerId, Listener>>>,
    next_id: AtomicU64,
    outbox: Arc<Outbox>,
}

impl ChannelRegistry {
    pub(crate) fn new(outbox: Arc<Outbox>) -> Self {
        Self {
            channels: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            outbox,
        }
    }

    /// Register `callback` for `channel`.
    ///
    /// The callback is kept whether or not the connection is up; the
    /// server-side `subscribe` goes out immediately only when connected,
    /// otherwise on the next successful connect.
    pub fn subscribe<F>(self: &Arc<Self>, channel: impl Into<String>, callback: F) -> Subscription
    where
        F: Fn(&serde_json::Value) + Send + Sync + 'static,
    {
        let channel = channel.into();
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));

        {
            let mut channels = lock(&self.channels);
            let listeners = channels.entry(channel.clone()).or_default();
            let first = listeners.is_empty();
            listeners.insert(id, Arc::new(callback));

            if first {
                let sent = self.outbox.send(&OutboundMessage::Subscribe {
                    channel: channel.clone(),
                });
                debug!(channel = %channel, sent, "channel added");
            }
        }

        Subscription {
            registry: Arc::downgrade(self),
            channel,
            id,
            active: AtomicBool::new(true),
        }
    }

    /// Remove one listener. Returns `true` if it was registered.
    fn remove(&self, channel: &str, id: ListenerId) -> bool {
        let mut channels = lock(&self.channels);
        let Some(listeners) = channels.get_mut(channel) else {
            return false;
        };
        let removed = listeners.shift_remove(&id).is_some();

        if listeners.is_empty() {
            channels.remove(channel);
            let sent = self.outbox.send(&OutboundMessage::Unsubscribe {
                channel: channel.to_owned(),
            });
            debug!(channel, sent, "channel removed");
        }
        removed
    }

    /// Deliver `payload` to every listener on `channel`.
    ///
    /// A panicking listener is logged and skipped; the rest still run.
    /// Returns how many listeners completed normally.
    pub fn dispatch(&self, channel: &str, payload: &serde_json::Value) -> usize {
        // Snapshot outside the lock so listeners may (un)subscribe re-entrantly.
        let listeners: Vec<(ListenerId, Listener)> = match lock(&self.channels).get(channel) {
            Some(listeners) => listeners
                .iter()
                .map(|(id, listener)| (*id, Arc::clone(listener)))
                .collect(),
            None => return 0,
        };

        let mut delivered = 0;
        for (id, listener) in listeners {
            // An earlier listener may have removed this one
            if !self.is_registered(channel, id) {
                continue;
            }
            match catch_unwind(AssertUnwindSafe(|| listener(payload))) {
                Ok(()) => delivered += 1,
                Err(panic) => {
                    error!(channel, reason = panic_message(&*panic), "channel listener panicked");
                }
            }
        }
        delivered
    }

    fn is_registered(&self, channel: &str, id: ListenerId) -> bool {
        lock(&self.channels)
            .get(channel)
            .is_some_and(|listeners| listeners.contains_key(&id))
    }

    /// Install a new connection's sender and replay `subscribe` for every channel.
    ///
    /// Runs under the registry lock so a concurrent `subscribe()` cannot
    /// produce a second control message for the same channel.
    pub(crate) fn attach(
        &self,
        sender: mpsc::UnboundedSender<String>,
        session: &CancellationToken,
    ) -> usize {
        let channels = lock(&self.channels);
        if !self.outbox.attach(sender, session) {
            return 0;
        }
        channels
            .keys()
            .filter(|channel| {
                self.outbox.send(&OutboundMessage::Subscribe {
                    channel: (*channel).clone(),
                })
            })
            .count()
    }

    /// Channels that currently have at least one listener.
    pub fn channels(&self) -> Vec<String> {
        let mut names: Vec<String> = lock(&self.channels).keys().cloned().collect();
        names.sort();
        names
    }

    pub fn listener_count(&self, channel: &str) -> usize {
        lock(&self.channels).get(channel).map_or(0, IndexMap::len)
    }

    pub fn is_subscribed(&self, channel: &str) -> bool {
        lock(&self.channels).contains_key(channel)
    }
}

impl fmt::Debug for ChannelRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelRegistry")
            .field("channels", &self.channels())
            .finish_non_exhaustive()
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("<non-string panic>")
}

// ── Subscription handle ──────────────────────────────────────────────

/// Handle to one registered listener.
///
/// [`unsubscribe`](Self::unsubscribe) is idempotent, and dropping the
/// handle unsubscribes, so a component releases exactly what it registered.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    registry: Weak<ChannelRegistry>,
    channel: String,
    id: ListenerId,
    active: AtomicBool,
}

impl Subscription {
    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn id(&self) -> ListenerId {
        self.id
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Remove this listener. Later calls are no-ops.
    pub fn unsubscribe(&self) {
        if !self.active.swap(false, Ordering::AcqRel) {
            return;
        }
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(&self.channel, self.id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("channel", &self.channel)
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}

// ── Tests ────────────────────────────────────────────────────────────
