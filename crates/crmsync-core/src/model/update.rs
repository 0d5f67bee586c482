// ── Entity-change and notification events ──

use serde::{Deserialize, Serialize};

use super::common::deserialize_opt_id;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataAction {
    Created,
    Updated,
    Deleted,
    #[serde(other)]
    Other,
}

/// Server-side notice that an entity changed: `{ entity, id?, action }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataUpdate {
    pub entity: String,
    #[serde(default, deserialize_with = "deserialize_opt_id")]
    pub id: Option<String>,
    pub action: DataAction,
}

/// How a notification should be styled when surfaced to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationStyle {
    Destructive,
    Informational,
}

/// User-visible alert pushed by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub title: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub severity: Option<String>,
}

impl Notification {
    /// `error` severity renders destructively; anything else is informational.
    pub fn style(&self) -> NotificationStyle {
        match self.severity.as_deref() {
            Some("error") => NotificationStyle::Destructive,
            _ => NotificationStyle::Informational,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn data_update_accepts_numeric_ids_and_unknown_actions() {
        let update: DataUpdate =
            serde_json::from_value(json!({ "entity": "deal", "id": 42, "action": "archived" }))
                .unwrap();
        assert_eq!(update.id.as_deref(), Some("42"));
        assert_eq!(update.action, DataAction::Other);

        let bulk: DataUpdate =
            serde_json::from_value(json!({ "entity": "lead", "action": "updated" })).unwrap();
        assert!(bulk.id.is_none());
    }

    #[test]
    fn only_error_severity_is_destructive() {
        let mk = |severity: Option<&str>| Notification {
            title: "t".into(),
            message: String::new(),
            severity: severity.map(String::from),
        };
        assert_eq!(mk(Some("error")).style(), NotificationStyle::Destructive);
        assert_eq!(mk(Some("warning")).style(), NotificationStyle::Informational);
        assert_eq!(mk(None).style(), NotificationStyle::Informational);
    }
}
