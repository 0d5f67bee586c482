// Shared fixtures for crmsync-core integration tests.
#![allow(dead_code, clippy::unwrap_used)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crmsync_api::{Connector, Error, TransportEvent, TransportLink};
use crmsync_core::{ConnectionManager, SyncConfig};
use futures_util::future::BoxFuture;
use secrecy::SecretString;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::time::Instant;
use url::Url;

/// What the scripted server does with the next connection attempt.
#[derive(Debug, Clone, Copy)]
pub enum Step {
    Accept,
    Refuse,
    /// Fails with an error retrying cannot fix.
    Reject,
}

/// In-memory [`Connector`] that follows a script and hands the server
/// side of every accepted link to the test.
pub struct ScriptedConnector {
    script: Mutex<VecDeque<Step>>,
    attempts: Mutex<Vec<(Instant, Url)>>,
    sessions: mpsc::UnboundedSender<ServerSide>,
}

impl ScriptedConnector {
    /// Attempts past the end of `script` are accepted.
    pub fn new(script: impl IntoIterator<Item = Step>) -> (Arc<Self>, mpsc::UnboundedReceiver<ServerSide>) {
        let (sessions, rx) = mpsc::unbounded_channel();
        let connector = Arc::new(Self {
            script: Mutex::new(script.into_iter().collect()),
            attempts: Mutex::new(Vec::new()),
            sessions,
        });
        (connector, rx)
    }

    pub fn attempt_count(&self) -> usize {
        self.attempts.lock().unwrap().len()
    }

    pub fn attempt_times(&self) -> Vec<Instant> {
        self.attempts.lock().unwrap().iter().map(|(at, _)| *at).collect()
    }

    pub fn targets(&self) -> Vec<Url> {
        self.attempts.lock().unwrap().iter().map(|(_, url)| url.clone()).collect()
    }
}

impl Connector for ScriptedConnector {
    fn connect(&self, target: Url) -> BoxFuture<'static, Result<TransportLink, Error>> {
        self.attempts.lock().unwrap().push((Instant::now(), target));
        let step = self.script.lock().unwrap().pop_front().unwrap_or(Step::Accept);

        let result = match step {
            Step::Refuse => Err(Error::WebSocketConnect("connection refused".into())),
            Step::Reject => Err(Error::UnsupportedScheme("https".into())),
            Step::Accept => {
                let (link, from_client, to_client) = TransportLink::pair();
                let _ = self.sessions.send(ServerSide {
                    from_client,
                    to_client,
                });
                Ok(link)
            }
        };
        Box::pin(async move { result })
    }
}

/// The server's end of one accepted connection.
pub struct ServerSide {
    pub from_client: mpsc::UnboundedReceiver<String>,
    pub to_client: mpsc::UnboundedSender<TransportEvent>,
}

impl ServerSide {
    /// Next frame the client sent, decoded.
    pub async fn next_message(&mut self) -> Value {
        let text = self.from_client.recv().await.expect("client link closed");
        serde_json::from_str(&text).unwrap()
    }

    /// Push an envelope to the client.
    pub fn push(&self, kind: &str, channel: &str, payload: Value) {
        let frame = serde_json::json!({
            "type": kind,
            "channel": channel,
            "payload": payload,
            "timestamp": 1_767_225_600_000_i64,
        });
        self.push_raw(&frame.to_string());
    }

    pub fn push_raw(&self, text: &str) {
        self.to_client
            .send(TransportEvent::Frame(text.to_owned()))
            .unwrap();
    }

    pub fn close(&self, code: u16, reason: &str) {
        let _ = self.to_client.send(TransportEvent::Closed {
            code,
            reason: reason.into(),
        });
    }
}

pub fn config() -> SyncConfig {
    SyncConfig::new(Url::parse("wss://crm.test/ws").unwrap())
}

pub fn token() -> Option<SecretString> {
    Some(SecretString::from("t0ken".to_owned()))
}

pub fn manager(connector: Arc<ScriptedConnector>) -> ConnectionManager {
    manager_with(config(), connector)
}

pub fn manager_with(config: SyncConfig, connector: Arc<ScriptedConnector>) -> ConnectionManager {
    ConnectionManager::builder(config).connector(connector).build()
}

/// Connect and wait until the scripted server has accepted.
pub async fn connected(
    manager: &ConnectionManager,
    sessions: &mut mpsc::UnboundedReceiver<ServerSide>,
) -> ServerSide {
    manager.connect(token());
    let server = sessions.recv().await.unwrap();
    manager
        .wait_until_connected(Duration::from_secs(5))
        .await
        .unwrap();
    server
}
