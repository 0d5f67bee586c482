// ── Presence domain types ──

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::common::{decode_payload, deserialize_id};
use crate::error::CoreError;
use crmsync_api::PresenceStatus;

/// A peer as last reported by the server's presence broadcast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceUser {
    #[serde(deserialize_with = "deserialize_id")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub avatar: Option<String>,
    pub status: PresenceStatus,
    #[serde(default = "Utc::now")]
    pub last_seen: DateTime<Utc>,
    #[serde(default)]
    pub current_page: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PresenceSnapshot {
    Bare(Vec<PresenceUser>),
    Wrapped { users: Vec<PresenceUser> },
}

/// Decode a `presence` payload: either a bare user array or `{ "users": [...] }`.
pub fn decode_presence(payload: &serde_json::Value) -> Result<Vec<PresenceUser>, CoreError> {
    Ok(match decode_payload::<PresenceSnapshot>("presence", payload)? {
        PresenceSnapshot::Bare(users) | PresenceSnapshot::Wrapped { users } => users,
    })
}
