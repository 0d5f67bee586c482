//! `crmsync presence`: announce status and follow the peer list.

use std::sync::Arc;

use tabled::Tabled;

use crmsync_core::PresenceUser;

use super::Session;
use crate::cli::{GlobalOpts, PresenceArgs};
use crate::error::CliError;
use crate::output;

// ── Table row ───────────────────────────────────────────────────────

#[derive(Tabled)]
struct PresenceRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Page")]
    page: String,
    #[tabled(rename = "Last seen")]
    last_seen: String,
}

impl From<&PresenceUser> for PresenceRow {
    fn from(u: &PresenceUser) -> Self {
        Self {
            id: u.id.clone(),
            name: u.name.clone(),
            status: u.status.to_string(),
            page: u.current_page.clone().unwrap_or_default(),
            last_seen: u.last_seen.format("%Y-%m-%d %H:%M:%S").to_string(),
        }
    }
}

fn render(users: &Arc<Vec<PresenceUser>>, global: &GlobalOpts) {
    let out = output::render_list(&global.output, users.as_slice(), |u| PresenceRow::from(u), |u| {
        format!("{}\t{}\t{}", u.id, u.status, u.name)
    });
    output::print_output(&out, global.quiet);
}

// ── Handler ─────────────────────────────────────────────────────────

pub async fn handle(
    session: &Session,
    args: PresenceArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let PresenceArgs { status, page } = args;
    let manager = &session.manager;
    let mut peers = manager.watch_presence();
    let mut states = manager.state_changes();

    session.connect().await?;
    manager.set_presence(status, page.clone());
    states.mark_unchanged();

    let interrupt = tokio::signal::ctrl_c();
    tokio::pin!(interrupt);

    loop {
        tokio::select! {
            _ = &mut interrupt => break,
            changed = peers.changed() => {
                if changed.is_err() {
                    break;
                }
                let users = peers.borrow_and_update().clone();
                render(&users, global);
            }
            changed = states.changed() => {
                if changed.is_err() {
                    break;
                }
                // The server forgets us across reconnects
                if states.borrow_and_update().is_connected() {
                    manager.set_presence(status, page.clone());
                }
            }
        }
    }
    Ok(())
}
