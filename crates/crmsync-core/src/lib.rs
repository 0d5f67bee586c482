// crmsync-core: Real-time sync layer between crmsync-api and consumers (CLI/UI).

pub mod activity;
pub mod collab;
pub mod config;
pub mod connection;
pub mod dispatch;
pub mod error;
pub mod invalidation;
pub mod model;
pub mod notify;
pub mod presence;
pub mod registry;
pub mod status;

use std::sync::{Mutex, MutexGuard, PoisonError};

// ── Primary re-exports ──────────────────────────────────────────────
pub use activity::{ActivityFeed, FeedScope};
pub use collab::{CollaborationSession, DocumentChange, LocalUser};
pub use config::{ReconnectConfig, SyncConfig};
pub use connection::{ConnectionManager, ConnectionManagerBuilder, ConnectionState};
pub use dispatch::Route;
pub use error::CoreError;
pub use invalidation::{CacheInvalidationBridge, CacheKey, QueryCache};
pub use notify::{Notifier, TracingNotifier};
pub use presence::{PresenceTracker, Visibility};
pub use registry::{ChannelRegistry, ListenerId, Subscription};
pub use status::{ConnectionStatus, StatusColor};

// Re-export model types at the crate root for ergonomics.
pub use model::{
    Activity, Actor, CursorPosition, DataAction, DataUpdate, Notification, NotificationStyle,
    Point, PresenceStatus, PresenceUser, SelectionRange,
};

/// Lock a std mutex, recovering the data if a previous holder panicked.
///
/// Listener panics are caught and isolated, so a poisoned lock carries
/// no broken invariant here.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
