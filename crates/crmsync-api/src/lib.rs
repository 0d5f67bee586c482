// crmsync-api: wire layer for the CRM real-time sync client (envelopes + transport)

pub mod envelope;
pub mod error;
pub mod transport;
pub mod websocket;

pub use envelope::{Envelope, OutboundMessage, PresenceStatus};
pub use error::Error;
pub use transport::{Connector, TransportEvent, TransportLink};
pub use websocket::{WebSocketConnector, redacted};
