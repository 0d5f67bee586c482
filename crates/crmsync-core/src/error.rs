// ── Core error types ──
//
// User-facing errors from crmsync-core. The background connection loop
// never surfaces these to callers: transport failures become state
// changes and log records. They come back from payload decoding helpers
// and from waits with a deadline.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Connection errors ────────────────────────────────────────────
    /// The connection loop stopped for good and will not retry.
    #[error("Cannot connect to {url}: {reason}")]
    ConnectionFailed { url: String, reason: String },

    #[error("Not connected to the sync server")]
    Disconnected,

    #[error("Connection not established after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    // ── Data errors ──────────────────────────────────────────────────
    #[error("Malformed {what} payload: {message}")]
    Decode { what: &'static str, message: String },
}
