// ── Message dispatcher ──
//
// Decodes inbound text frames into envelopes and routes them by `type`.
// A frame that fails to decode is logged and dropped; it never tears
// down the connection. Unrecognized types are ignored.

use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use strum::EnumString;
use tokio::sync::watch;
use tracing::{debug, trace, warn};

use crmsync_api::Envelope;

use crate::invalidation::{CacheInvalidationBridge, CacheKey};
use crate::model::{DataUpdate, Notification, NotificationStyle, decode_payload, decode_presence};
use crate::notify::Notifier;
use crate::presence::PresenceTracker;
use crate::registry::ChannelRegistry;

/// Envelope types the client understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString)]
#[strum(serialize_all = "snake_case")]
enum InboundKind {
    Pong,
    Message,
    Presence,
    DataUpdate,
    Notification,
}

/// Where a decoded envelope ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// Heartbeat reply; liveness timestamp updated.
    Pong,
    /// Channel message delivered to `delivered` listeners.
    Message { channel: String, delivered: usize },
    /// Presence snapshot of `users` peers applied.
    Presence { users: usize },
    /// Entity change; these cache keys were invalidated.
    DataUpdate { invalidated: Vec<CacheKey> },
    /// Notification surfaced with this style.
    Notification(NotificationStyle),
    /// Known type whose payload did not decode.
    Malformed { kind: String },
    /// Type the client does not handle.
    Unrecognized { kind: String },
}

pub(crate) struct Dispatcher {
    registry: Arc<ChannelRegistry>,
    presence: Arc<PresenceTracker>,
    invalidation: Arc<CacheInvalidationBridge>,
    notifier: Arc<dyn Notifier>,
    last_pong: watch::Sender<Option<DateTime<Utc>>>,
}

impl Dispatcher {
    pub(crate) fn new(
        registry: Arc<ChannelRegistry>,
        presence: Arc<PresenceTracker>,
        invalidation: Arc<CacheInvalidationBridge>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let (last_pong, _) = watch::channel(None);
        Self {
            registry,
            presence,
            invalidation,
            notifier,
            last_pong,
        }
    }

    /// When the most recent `pong` arrived, if any.
    pub(crate) fn last_pong(&self) -> Option<DateTime<Utc>> {
        *self.last_pong.borrow()
    }

    /// Decode and route one text frame. `None` means the frame was not an envelope.
    pub(crate) fn handle_frame(&self, text: &str) -> Option<Route> {
        match Envelope::decode(text) {
            Ok(envelope) => Some(self.route(envelope)),
            Err(e) => {
                warn!(error = %e, "dropping undecodable frame");
                None
            }
        }
    }

    pub(crate) fn route(&self, envelope: Envelope) -> Route {
        let Ok(kind) = InboundKind::from_str(&envelope.kind) else {
            debug!(kind = %envelope.kind, "ignoring unrecognized envelope type");
            return Route::Unrecognized {
                kind: envelope.kind,
            };
        };

        match kind {
            InboundKind::Pong => {
                self.last_pong.send_replace(Some(Utc::now()));
                trace!("pong");
                Route::Pong
            }
            InboundKind::Message => {
                let delivered = self.registry.dispatch(&envelope.channel, &envelope.payload);
                trace!(channel = %envelope.channel, delivered, "message dispatched");
                Route::Message {
                    channel: envelope.channel,
                    delivered,
                }
            }
            InboundKind::Presence => match decode_presence(&envelope.payload) {
                Ok(users) => Route::Presence {
                    users: self.presence.replace(users),
                },
                Err(e) => malformed(envelope.kind, &e),
            },
            InboundKind::DataUpdate => {
                match decode_payload::<DataUpdate>("data_update", &envelope.payload) {
                    Ok(update) => Route::DataUpdate {
                        invalidated: self.invalidation.apply(&update),
                    },
                    Err(e) => malformed(envelope.kind, &e),
                }
            }
            InboundKind::Notification => {
                match decode_payload::<Notification>("notification", &envelope.payload) {
                    Ok(notification) => {
                        let style = notification.style();
                        debug!(title = %notification.title, ?style, "notification received");
                        self.notifier.notify(&notification, style);
                        Route::Notification(style)
                    }
                    Err(e) => malformed(envelope.kind, &e),
                }
            }
        }
    }
}

fn malformed(kind: String, error: &crate::error::CoreError) -> Route {
    warn!(kind = %kind, error = %error, "dropping malformed payload");
    Route::Malformed { kind }
}
