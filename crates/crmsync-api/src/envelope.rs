//! Structured message envelopes exchanged with the sync server.
//!
//! Inbound traffic is always an [`Envelope`] `{ type, channel, payload, timestamp }`
//! encoded as UTF-8 JSON text. Outbound traffic is one of the control messages
//! in [`OutboundMessage`], tagged by `type` and stamped with the send time.

use chrono::{DateTime, Utc};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use strum::{Display, EnumString};

use crate::error::Error;

// ── Envelope ─────────────────────────────────────────────────────────

/// A decoded inbound message.
///
/// Immutable once built. `channel` is empty for connection-level messages
/// (`pong`, `presence`, `notification`, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Type tag that drives routing, e.g. `"message"` or `"presence"`.
    #[serde(rename = "type")]
    pub kind: String,

    #[serde(default)]
    pub channel: String,

    #[serde(default)]
    pub payload: serde_json::Value,

    /// Server send time. Epoch milliseconds or RFC 3339 on the wire;
    /// receive time when absent.
    #[serde(default = "Utc::now", deserialize_with = "deserialize_timestamp")]
    pub timestamp: DateTime<Utc>,
}

impl Envelope {
    /// Decode a single text frame.
    pub fn decode(text: &str) -> Result<Self, Error> {
        serde_json::from_str(text).map_err(|e| Error::decode(&e, text))
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawTimestamp {
    Millis(i64),
    Text(String),
}

fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<RawTimestamp>::deserialize(deserializer)? {
        Some(RawTimestamp::Millis(ms)) => DateTime::from_timestamp_millis(ms)
            .ok_or_else(|| D::Error::custom(format!("timestamp {ms} out of range"))),
        Some(RawTimestamp::Text(text)) => DateTime::parse_from_rfc3339(&text)
            .map(|t| t.with_timezone(&Utc))
            .map_err(D::Error::custom),
        None => Ok(Utc::now()),
    }
}

// ── PresenceStatus ───────────────────────────────────────────────────

/// Peer availability as broadcast by the server and announced locally.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum PresenceStatus {
    #[default]
    Online,
    Away,
    Busy,
    Offline,
}

// ── OutboundMessage ──────────────────────────────────────────────────

/// Control and data messages the client puts on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundMessage {
    Subscribe {
        channel: String,
    },
    Unsubscribe {
        channel: String,
    },
    Message {
        channel: String,
        payload: serde_json::Value,
    },
    Presence {
        status: PresenceStatus,
        #[serde(
            rename = "currentPage",
            default,
            skip_serializing_if = "Option::is_none"
        )]
        current_page: Option<String>,
    },
    /// Liveness ping, answered by a `pong` envelope.
    Ping,
}

#[derive(Serialize)]
struct OutboundFrame<'a> {
    #[serde(flatten)]
    message: &'a OutboundMessage,
    timestamp: i64,
}

impl OutboundMessage {
    /// Wire tag of this message.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Subscribe { .. } => "subscribe",
            Self::Unsubscribe { .. } => "unsubscribe",
            Self::Message { .. } => "message",
            Self::Presence { .. } => "presence",
            Self::Ping => "ping",
        }
    }

    /// Encode as a JSON text frame stamped with the current time.
    pub fn to_frame(&self) -> Result<String, Error> {
        let frame = OutboundFrame {
            message: self,
            timestamp: Utc::now().timestamp_millis(),
        };
        Ok(serde_json::to_string(&frame)?)
    }
}

// ── Tests ────────────────────────────────────────────────────────────
