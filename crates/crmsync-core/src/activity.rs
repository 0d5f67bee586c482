// ── Live activity feed ──
//
// Follows an activity channel and keeps the newest entries, most recent
// first, in a fixed-capacity list. Nothing is persisted: a new feed
// starts empty.

use std::fmt;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{trace, warn};

use crate::connection::ConnectionManager;
use crate::model::{Activity, decode_payload};
use crate::registry::Subscription;

/// Which activity stream to follow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedScope {
    Global,
    Entity {
        entity_type: String,
        entity_id: String,
    },
}

impl FeedScope {
    pub fn entity(entity_type: impl Into<String>, entity_id: impl Into<String>) -> Self {
        Self::Entity {
            entity_type: entity_type.into(),
            entity_id: entity_id.into(),
        }
    }

    /// `activity:global` or `activity:<type>:<id>`.
    pub fn channel(&self) -> String {
        match self {
            Self::Global => "activity:global".to_owned(),
            Self::Entity {
                entity_type,
                entity_id,
            } => format!("activity:{entity_type}:{entity_id}"),
        }
    }
}

impl fmt::Display for FeedScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.channel())
    }
}

pub struct ActivityFeed {
    scope: FeedScope,
    capacity: usize,
    entries: Arc<watch::Sender<Arc<Vec<Activity>>>>,
    _subscription: Subscription,
}

impl ActivityFeed {
    /// Follow `scope` with the manager's configured capacity.
    pub fn open(manager: &ConnectionManager, scope: FeedScope) -> Self {
        Self::with_capacity(manager, scope, manager.config().activity_capacity)
    }

    pub fn with_capacity(manager: &ConnectionManager, scope: FeedScope, capacity: usize) -> Self {
        let (entries, _) = watch::channel(Arc::new(Vec::new()));
        let entries = Arc::new(entries);

        let sink = Arc::clone(&entries);
        let subscription = manager.subscribe(scope.channel(), move |payload| {
            match decode_payload::<Activity>("activity", payload) {
                Ok(activity) => {
                    trace!(id = %activity.id, action = %activity.action, "activity received");
                    sink.send_modify(|list| prepend(Arc::make_mut(list), activity, capacity));
                }
                Err(e) => warn!(error = %e, "ignoring malformed activity"),
            }
        });

        Self {
            scope,
            capacity,
            entries,
            _subscription: subscription,
        }
    }

    pub fn scope(&self) -> &FeedScope {
        &self.scope
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Current entries, most recent first.
    pub fn entries(&self) -> Arc<Vec<Activity>> {
        self.entries.borrow().clone()
    }

    /// Receiver that wakes whenever an entry arrives.
    pub fn watch(&self) -> watch::Receiver<Arc<Vec<Activity>>> {
        self.entries.subscribe()
    }
}

fn prepend(list: &mut Vec<Activity>, activity: Activity, capacity: usize) {
    list.insert(0, activity);
    list.truncate(capacity);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_names() {
        assert_eq!(FeedScope::Global.channel(), "activity:global");
        assert_eq!(
            FeedScope::entity("deal", "42").to_string(),
            "activity:deal:42"
        );
    }
}
