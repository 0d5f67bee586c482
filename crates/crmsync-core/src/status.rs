// ── Connection status indicator ──
//
// Presentation-ready view of the connection state: a short label and a
// traffic-light color. Rendering is left to the consumer.

use std::fmt;

use serde::Serialize;
use strum::Display;

use crate::connection::ConnectionState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum StatusColor {
    Green,
    Yellow,
    Red,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionStatus {
    pub label: String,
    pub color: StatusColor,
}

impl From<ConnectionState> for ConnectionStatus {
    fn from(state: ConnectionState) -> Self {
        let (label, color) = match state {
            ConnectionState::Connected => ("Live".to_owned(), StatusColor::Green),
            ConnectionState::Connecting => ("Connecting".to_owned(), StatusColor::Yellow),
            ConnectionState::Reconnecting { attempt } => {
                (format!("Reconnecting ({attempt})"), StatusColor::Yellow)
            }
            ConnectionState::Disconnected => ("Offline".to_owned(), StatusColor::Red),
        };
        Self { label, color }
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label)
    }
}
