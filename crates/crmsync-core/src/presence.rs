// ── Presence tracker ──
//
// Holds the latest peer snapshot from the server and announces the
// local user's status. Snapshots replace the whole list; nothing is
// merged field by field.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::debug;

use crmsync_api::{OutboundMessage, PresenceStatus};

use crate::connection::outbox::Outbox;
use crate::model::PresenceUser;

/// Host-application visibility, fed in by whatever owns the window/app lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Visibility {
    /// Backgrounded or minimized.
    Hidden,
    /// In the foreground, showing `page`.
    Visible { page: Option<String> },
}

pub struct PresenceTracker {
    users: watch::Sender<Arc<Vec<PresenceUser>>>,
    outbox: Arc<Outbox>,
}

impl PresenceTracker {
    pub(crate) fn new(outbox: Arc<Outbox>) -> Self {
        let (users, _) = watch::channel(Arc::new(Vec::new()));
        Self { users, outbox }
    }

    /// Current peer list.
    pub fn users(&self) -> Arc<Vec<PresenceUser>> {
        self.users.borrow().clone()
    }

    /// Receiver that wakes on every snapshot.
    pub fn subscribe(&self) -> watch::Receiver<Arc<Vec<PresenceUser>>> {
        self.users.subscribe()
    }

    /// Replace the peer list wholesale. Returns the new size.
    pub(crate) fn replace(&self, users: Vec<PresenceUser>) -> usize {
        let count = users.len();
        // `send_modify` updates unconditionally, even with zero receivers.
        self.users.send_modify(|current| *current = Arc::new(users));
        debug!(count, "presence snapshot applied");
        count
    }

    /// Announce the local status. Dropped (returns `false`) while disconnected.
    pub fn set_presence(&self, status: PresenceStatus, current_page: Option<String>) -> bool {
        self.outbox.send(&OutboundMessage::Presence {
            status,
            current_page,
        })
    }

    /// Map a visibility transition onto a presence announcement:
    /// hidden → `away`, visible → `online` with the page label.
    pub fn visibility_changed(&self, visibility: Visibility) -> bool {
        match visibility {
            Visibility::Hidden => self.set_presence(PresenceStatus::Away, None),
            Visibility::Visible { page } => self.set_presence(PresenceStatus::Online, page),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    fn user(id: &str) -> PresenceUser {
        PresenceUser {
            id: id.into(),
            name: format!("User {id}"),
            avatar: None,
            status: PresenceStatus::Online,
            last_seen: Utc::now(),
            current_page: None,
        }
    }

    #[test]
    fn snapshot_replaces_previous_list() {
        let tracker = PresenceTracker::new(Arc::new(Outbox::new()));
        tracker.replace(vec![user("a"), user("b"), user("c")]);
        tracker.replace(vec![user("d")]);

        let users = tracker.users();
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].id, "d");
    }

    #[test]
    fn subscribers_see_new_snapshots() {
        let tracker = PresenceTracker::new(Arc::new(Outbox::new()));
        let mut rx = tracker.subscribe();
        tracker.replace(vec![user("a")]);
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().len(), 1);
    }

    #[test]
    fn set_presence_is_dropped_while_disconnected() {
        let tracker = PresenceTracker::new(Arc::new(Outbox::new()));
        assert!(!tracker.set_presence(PresenceStatus::Busy, None));
    }

    #[test]
    fn visibility_maps_to_status() {
        let outbox = Arc::new(Outbox::new());
        let (tx, mut rx) = mpsc::unbounded_channel();
        outbox.attach(tx, &CancellationToken::new());
        let tracker = PresenceTracker::new(outbox);

        assert!(tracker.visibility_changed(Visibility::Hidden));
        assert!(tracker.visibility_changed(Visibility::Visible {
            page: Some("/contacts".into()),
        }));

        let hidden: OutboundMessage = serde_json::from_str(&rx.try_recv().unwrap()).unwrap();
        let visible: OutboundMessage = serde_json::from_str(&rx.try_recv().unwrap()).unwrap();
        assert_eq!(
            hidden,
            OutboundMessage::Presence {
                status: PresenceStatus::Away,
                current_page: None
            }
        );
        assert_eq!(
            visible,
            OutboundMessage::Presence {
                status: PresenceStatus::Online,
                current_page: Some("/contacts".into())
            }
        );
    }
}
