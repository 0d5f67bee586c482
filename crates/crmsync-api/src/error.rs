use thiserror::Error;

/// Top-level error type for the `crmsync-api` crate.
///
/// Covers every failure mode of the wire layer: building the connection
/// target, the WebSocket handshake, and envelope (de)serialization. A
/// connection that ends after the handshake is reported as a
/// [`TransportEvent`](crate::TransportEvent), not an error.
#[derive(Debug, Error)]
pub enum Error {
    // ── Target ──────────────────────────────────────────────────────
    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Endpoint uses a scheme the transport cannot speak.
    #[error("Unsupported endpoint scheme '{0}' (expected ws or wss)")]
    UnsupportedScheme(String),

    // ── WebSocket ───────────────────────────────────────────────────
    /// WebSocket connection failed.
    #[error("WebSocket connection failed: {0}")]
    WebSocketConnect(String),

    // ── Data ────────────────────────────────────────────────────────
    /// Inbound frame could not be decoded, with the raw body for debugging.
    #[error("Decode error: {message}")]
    Decode { message: String, body: String },

    /// Outbound message could not be encoded.
    #[error("Encode error: {0}")]
    Encode(#[from] serde_json::Error),
}

impl Error {
    /// Returns `true` if this is a transient error worth reconnecting over.
    ///
    /// A bad target never heals by retrying; a refused or failed
    /// handshake might.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::WebSocketConnect(_))
    }

    /// Build a decode error, keeping the offending frame.
    pub fn decode(err: &serde_json::Error, body: &str) -> Self {
        Self::Decode {
            message: err.to_string(),
            body: body.to_owned(),
        }
    }
}
