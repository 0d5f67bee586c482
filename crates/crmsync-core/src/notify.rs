// ── Notification surface ──
//
// The sync layer only decides *that* something should be shown and how
// it is styled; showing it belongs to the host application.

use tracing::{info, warn};

use crate::model::{Notification, NotificationStyle};

/// External collaborator that puts alerts in front of the user.
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: &Notification, style: NotificationStyle);
}

/// Default notifier: writes alerts to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, notification: &Notification, style: NotificationStyle) {
        match style {
            NotificationStyle::Destructive => {
                warn!(title = %notification.title, message = %notification.message, "notification");
            }
            NotificationStyle::Informational => {
                info!(title = %notification.title, message = %notification.message, "notification");
            }
        }
    }
}
