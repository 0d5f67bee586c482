// Transport seam between the connection manager and the wire.
//
// A `Connector` opens one connection and hands back a pair of channels.
// The manager never sees sockets directly, so tests swap in a scripted
// connector and production uses `WebSocketConnector`.

use futures_util::future::BoxFuture;
use tokio::sync::mpsc;
use url::Url;

use crate::error::Error;

/// Something that happened on an open connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A UTF-8 text frame, not yet decoded.
    Frame(String),
    /// The peer closed the connection.
    Closed { code: u16, reason: String },
    /// The connection failed mid-stream.
    Failed(String),
}

/// Both directions of a single open connection.
///
/// Dropping `outbound` asks the transport to close the connection.
/// `inbound` yields `None` once the transport has shut down.
#[derive(Debug)]
pub struct TransportLink {
    pub outbound: mpsc::UnboundedSender<String>,
    pub inbound: mpsc::UnboundedReceiver<TransportEvent>,
}

impl TransportLink {
    /// Build a link plus the far ends of its channels.
    ///
    /// Returns `(link, outbound_rx, inbound_tx)`: whoever drives the wire
    /// reads outgoing frames from `outbound_rx` and reports traffic on
    /// `inbound_tx`.
    pub fn pair() -> (
        Self,
        mpsc::UnboundedReceiver<String>,
        mpsc::UnboundedSender<TransportEvent>,
    ) {
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound) = mpsc::unbounded_channel();
        (Self { outbound, inbound }, outbound_rx, inbound_tx)
    }
}

/// Opens connections to a target URL.
pub trait Connector: Send + Sync + 'static {
    /// Open a single connection. Resolves once the handshake completes.
    fn connect(&self, target: Url) -> BoxFuture<'static, Result<TransportLink, Error>>;
}
