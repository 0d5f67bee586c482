// ── Collaborative editing overlay ──
//
// Relays cursor positions and opaque document changes between everyone
// editing the same document. One channel per document; the latest
// cursor per peer wins. Conflict resolution of concurrent edits is the
// editor's business, not ours.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::{broadcast, watch};
use tracing::{debug, warn};

use crate::connection::ConnectionManager;
use crate::model::{CursorPosition, Point, SelectionRange};
use crate::registry::Subscription;

const CHANGE_CHANNEL_CAPACITY: usize = 128;

/// Display colors handed out to collaborators, picked by user id.
const CURSOR_PALETTE: &[&str] = &[
    "#e6194b", "#3cb44b", "#4363d8", "#f58231", "#911eb4", "#42d4f4", "#f032e6", "#469990",
];

/// Stable display color for `user_id`.
pub fn cursor_color(user_id: &str) -> &'static str {
    // FNV-1a: stable across runs and builds
    let hash = user_id
        .bytes()
        .fold(0xcbf2_9ce4_8422_2325_u64, |hash, byte| {
            (hash ^ u64::from(byte)).wrapping_mul(0x0100_0000_01b3)
        });
    let len = u64::try_from(CURSOR_PALETTE.len()).unwrap_or(1);
    let index = usize::try_from(hash % len).unwrap_or(0);
    CURSOR_PALETTE[index]
}

/// Channel carrying collaboration traffic for `document_id`.
pub fn document_channel(document_id: &str) -> String {
    format!("document:{document_id}")
}

/// The local participant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalUser {
    pub id: String,
    pub name: String,
}

/// An edit published by a peer. `change` is passed through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentChange {
    pub user_id: String,
    pub user_name: String,
    pub change: serde_json::Value,
}

/// Events on a document channel, tagged by their inner `type`.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
enum CollabEvent {
    Cursor(CursorPosition),
    Change(DocumentChange),
    Leave { user_id: String },
}

impl CollabEvent {
    fn user_id(&self) -> &str {
        match self {
            Self::Cursor(cursor) => &cursor.user_id,
            Self::Change(change) => &change.user_id,
            Self::Leave { user_id } => user_id,
        }
    }
}

struct Overlay {
    local_id: String,
    cursors: watch::Sender<HashMap<String, CursorPosition>>,
    changes: broadcast::Sender<DocumentChange>,
}

impl Overlay {
    fn apply(&self, payload: &serde_json::Value) {
        let event = match CollabEvent::deserialize(payload) {
            Ok(event) => event,
            Err(e) => {
                warn!(error = %e, "ignoring malformed collaboration event");
                return;
            }
        };
        // Our own events come back from the server too
        if event.user_id() == self.local_id {
            return;
        }

        match event {
            CollabEvent::Cursor(cursor) => {
                self.cursors.send_modify(|cursors| {
                    cursors.insert(cursor.user_id.clone(), cursor);
                });
            }
            CollabEvent::Change(change) => {
                // Ignore send errors -- just means nobody is listening right now
                let _ = self.changes.send(change);
            }
            CollabEvent::Leave { user_id } => {
                self.cursors.send_if_modified(|cursors| cursors.remove(&user_id).is_some());
                debug!(user_id = %user_id, "collaborator left");
            }
        }
    }
}

/// One local participant editing one document.
///
/// Dropping the session unsubscribes from the document channel without
/// telling peers; [`leave`](Self::leave) does both.
pub struct CollaborationSession {
    manager: ConnectionManager,
    document_id: String,
    channel: String,
    user: LocalUser,
    overlay: Arc<Overlay>,
    subscription: Subscription,
}

impl CollaborationSession {
    pub fn join(manager: &ConnectionManager, document_id: impl Into<String>, user: LocalUser) -> Self {
        let document_id = document_id.into();
        let channel = document_channel(&document_id);

        let (cursors, _) = watch::channel(HashMap::new());
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        let overlay = Arc::new(Overlay {
            local_id: user.id.clone(),
            cursors,
            changes,
        });

        let listener = Arc::clone(&overlay);
        let subscription = manager.subscribe(channel.clone(), move |payload| listener.apply(payload));
        debug!(document_id = %document_id, "joined document");

        Self {
            manager: manager.clone(),
            document_id,
            channel,
            user,
            overlay,
            subscription,
        }
    }

    pub fn document_id(&self) -> &str {
        &self.document_id
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Latest cursor per peer, keyed by user id.
    pub fn cursors(&self) -> HashMap<String, CursorPosition> {
        self.overlay.cursors.borrow().clone()
    }

    pub fn watch_cursors(&self) -> watch::Receiver<HashMap<String, CursorPosition>> {
        self.overlay.cursors.subscribe()
    }

    /// Peer edits as they arrive.
    pub fn changes(&self) -> broadcast::Receiver<DocumentChange> {
        self.overlay.changes.subscribe()
    }

    /// Publish the local cursor. Dropped while disconnected.
    pub fn update_cursor(&self, position: Point, selection: Option<SelectionRange>) -> bool {
        let cursor = CursorPosition {
            user_id: self.user.id.clone(),
            user_name: self.user.name.clone(),
            color: cursor_color(&self.user.id).to_owned(),
            position,
            selection,
        };
        let mut payload = match serde_json::to_value(&cursor) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, "failed to encode cursor");
                return false;
            }
        };
        payload["type"] = json!("cursor");
        self.manager.send(&self.channel, payload)
    }

    /// Publish an opaque edit. Dropped while disconnected.
    pub fn publish_change(&self, change: serde_json::Value) -> bool {
        self.manager.send(
            &self.channel,
            json!({
                "type": "change",
                "userId": self.user.id,
                "userName": self.user.name,
                "change": change,
            }),
        )
    }

    /// Tell peers we are gone and stop listening.
    pub fn leave(self) {
        self.manager.send(
            &self.channel,
            json!({ "type": "leave", "userId": self.user.id }),
        );
        self.subscription.unsubscribe();
        debug!(document_id = %self.document_id, "left document");
    }
}
