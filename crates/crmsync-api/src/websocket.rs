//! WebSocket transport built on tokio-tungstenite.
//!
//! [`WebSocketConnector`] performs the handshake and then spawns one pump
//! task per connection that shuttles text frames between the socket and
//! the [`TransportLink`] channels. Reconnection is not handled here: the
//! connection manager in `crmsync-core` decides when to open a new link.
//!
//! # Example
//!
//! ```rust,ignore
//! use crmsync_api::{Connector, TransportEvent, WebSocketConnector};
//! use url::Url;
//!
//! let target = Url::parse("wss://crm.example.com/ws?token=...")?;
//! let mut link = WebSocketConnector::new().connect(target).await?;
//!
//! link.outbound.send(r#"{"type":"ping"}"#.into())?;
//! while let Some(TransportEvent::Frame(text)) = link.inbound.recv().await {
//!     println!("{text}");
//! }
//! ```

use futures_util::future::BoxFuture;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::{self, ClientRequestBuilder, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use url::Url;

use crate::error::Error;
use crate::transport::{Connector, TransportEvent, TransportLink};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

const USER_AGENT: &str = concat!("crmsync/", env!("CARGO_PKG_VERSION"));

// ── WebSocketConnector ───────────────────────────────────────────────

/// Production [`Connector`] speaking `ws://` and `wss://`.
#[derive(Debug, Clone, Default)]
pub struct WebSocketConnector {
    _private: (),
}

impl WebSocketConnector {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Connector for WebSocketConnector {
    fn connect(&self, target: Url) -> BoxFuture<'static, Result<TransportLink, Error>> {
        Box::pin(open(target))
    }
}

/// The target with its query string stripped, safe to log.
///
/// The credential travels as a query parameter, so the full URL must
/// never reach a log line.
pub fn redacted(target: &Url) -> Url {
    let mut shown = target.clone();
    shown.set_query(None);
    shown
}

// ── Handshake ────────────────────────────────────────────────────────

async fn open(target: Url) -> Result<TransportLink, Error> {
    match target.scheme() {
        "ws" | "wss" => {}
        other => return Err(Error::UnsupportedScheme(other.to_owned())),
    }

    tracing::info!(endpoint = %redacted(&target), "Connecting to WebSocket");

    let uri: tungstenite::http::Uri = target
        .as_str()
        .parse()
        .map_err(|e: tungstenite::http::uri::InvalidUri| Error::WebSocketConnect(e.to_string()))?;

    let request = ClientRequestBuilder::new(uri).with_header("User-Agent", USER_AGENT);

    let (socket, _response) = tokio_tungstenite::connect_async(request)
        .await
        .map_err(|e| Error::WebSocketConnect(e.to_string()))?;

    tracing::info!("WebSocket connected");

    let (link, outbound_rx, inbound_tx) = TransportLink::pair();
    tokio::spawn(pump(socket, outbound_rx, inbound_tx));
    Ok(link)
}

// ── Connection pump ──────────────────────────────────────────────────

/// Move frames both ways until either side goes away.
async fn pump(
    socket: Socket,
    mut outbound_rx: mpsc::UnboundedReceiver<String>,
    inbound_tx: mpsc::UnboundedSender<TransportEvent>,
) {
    let (mut write, mut read) = socket.split();

    loop {
        tokio::select! {
            biased;
            outgoing = outbound_rx.recv() => {
                let Some(text) = outgoing else {
                    tracing::debug!("Outbound side dropped, closing WebSocket");
                    let _ = write.close().await;
                    break;
                };
                if let Err(e) = write.send(Message::text(text)).await {
                    let _ = inbound_tx.send(TransportEvent::Failed(e.to_string()));
                    break;
                }
            }
            frame = read.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        if inbound_tx
                            .send(TransportEvent::Frame(text.as_str().to_owned()))
                            .is_err()
                        {
                            // Nobody is listening any more
                            let _ = write.close().await;
                            break;
                        }
                    }
                    Some(Ok(Message::Ping(_))) => {
                        // tungstenite handles pong replies automatically
                        tracing::trace!("WebSocket ping");
                    }
                    Some(Ok(Message::Close(frame))) => {
                        let (code, reason) = frame.map_or_else(
                            || (1005, String::new()),
                            |cf| (u16::from(cf.code), cf.reason.as_str().to_owned()),
                        );
                        tracing::info!(code, reason = %reason, "WebSocket close frame received");
                        let _ = inbound_tx.send(TransportEvent::Closed { code, reason });
                        break;
                    }
                    Some(Err(e)) => {
                        let _ = inbound_tx.send(TransportEvent::Failed(e.to_string()));
                        break;
                    }
                    None => {
                        tracing::info!("WebSocket stream ended");
                        let _ = inbound_tx.send(TransportEvent::Closed {
                            code: 1006,
                            reason: "stream ended".into(),
                        });
                        break;
                    }
                    _ => {
                        // Binary, Pong, Frame -- ignore
                    }
                }
            }
        }
    }

    tracing::debug!("WebSocket pump exiting");
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn redacted_strips_credentials() {
        let url = Url::parse("wss://crm.example.com/ws?token=secret").unwrap();
        let shown = redacted(&url);
        assert_eq!(shown.as_str(), "wss://crm.example.com/ws");
        assert!(!shown.as_str().contains("secret"));
    }

    #[tokio::test]
    async fn rejects_non_websocket_schemes() {
        let url = Url::parse("https://crm.example.com/ws").unwrap();
        let err = WebSocketConnector::new().connect(url).await.unwrap_err();
        assert!(matches!(err, Error::UnsupportedScheme(ref s) if s == "https"));
    }
}
