// ── Outbound side of the live connection ──
//
// Holds the sender half of the current transport link, if any. Every
// component that writes to the wire goes through here; while no link is
// attached, sends are dropped (there is no outbound queue).

use std::sync::Mutex;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{trace, warn};

use crmsync_api::OutboundMessage;

use crate::lock;

#[derive(Debug, Default)]
pub(crate) struct Outbox {
    link: Mutex<Option<mpsc::UnboundedSender<String>>>,
}

impl Outbox {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Install the sender for a freshly opened connection.
    ///
    /// Refuses (and returns `false`) once `session` is cancelled, so a
    /// session torn down by `disconnect()` cannot re-attach itself.
    pub(crate) fn attach(
        &self,
        sender: mpsc::UnboundedSender<String>,
        session: &CancellationToken,
    ) -> bool {
        let mut link = lock(&self.link);
        if session.is_cancelled() {
            return false;
        }
        *link = Some(sender);
        true
    }

    /// Drop the current sender unconditionally.
    pub(crate) fn detach(&self) {
        lock(&self.link).take();
    }

    /// Drop the current sender only if it is still `sender`'s channel.
    pub(crate) fn detach_if(&self, sender: &mpsc::UnboundedSender<String>) {
        let mut link = lock(&self.link);
        if link.as_ref().is_some_and(|current| current.same_channel(sender)) {
            link.take();
        }
    }

    #[cfg(test)]
    pub(crate) fn is_attached(&self) -> bool {
        lock(&self.link).as_ref().is_some_and(|tx| !tx.is_closed())
    }

    /// Put a message on the wire. Returns `false` when it was dropped.
    pub(crate) fn send(&self, message: &OutboundMessage) -> bool {
        let link = lock(&self.link);
        let Some(tx) = link.as_ref() else {
            trace!(kind = message.kind(), "not connected, dropping outbound message");
            return false;
        };

        match message.to_frame() {
            Ok(frame) => tx.send(frame).is_ok(),
            Err(e) => {
                warn!(error = %e, kind = message.kind(), "failed to encode outbound message");
                false
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn send_without_link_is_dropped() {
        let outbox = Outbox::new();
        assert!(!outbox.is_attached());
        assert!(!outbox.send(&OutboundMessage::Ping));
    }

    #[test]
    fn send_with_link_writes_frame() {
        let outbox = Outbox::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        assert!(outbox.attach(tx, &CancellationToken::new()));

        assert!(outbox.send(&OutboundMessage::Ping));
        assert!(rx.try_recv().unwrap().contains(r#""type":"ping""#));
    }

    #[test]
    fn cancelled_session_cannot_attach() {
        let outbox = Outbox::new();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let (tx, _rx) = mpsc::unbounded_channel();
        assert!(!outbox.attach(tx, &cancel));
        assert!(!outbox.is_attached());
    }

    #[test]
    fn detach_if_ignores_foreign_links() {
        let outbox = Outbox::new();
        let (old_tx, _old_rx) = mpsc::unbounded_channel();
        let (new_tx, _new_rx) = mpsc::unbounded_channel();
        outbox.attach(new_tx, &CancellationToken::new());

        outbox.detach_if(&old_tx);
        assert!(outbox.is_attached());

        outbox.detach();
        assert!(!outbox.is_attached());
    }
}
