// ── Sync domain model ──
//
// Payload shapes carried inside envelopes: presence snapshots, cursor
// relays, activity entries, entity-change and notification events.
// Everything here decodes from the `payload` of an inbound envelope.

pub mod activity;
pub mod common;
pub mod cursor;
pub mod presence;
pub mod update;

// ── Re-exports ──────────────────────────────────────────────────────

pub use activity::{Activity, Actor};
pub use common::decode_payload;
pub use cursor::{CursorPosition, Point, SelectionRange};
pub use presence::{PresenceUser, decode_presence};
pub use update::{DataAction, DataUpdate, Notification, NotificationStyle};

pub use crmsync_api::PresenceStatus;
