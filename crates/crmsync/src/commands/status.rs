//! `crmsync status`: print connection-status transitions until connected.

use serde::Serialize;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::WatchStream;

use crmsync_core::ConnectionStatus;

use super::Session;
use crate::cli::GlobalOpts;
use crate::error::CliError;
use crate::output;

#[derive(Serialize)]
struct StatusReport {
    state: String,
    #[serde(flatten)]
    status: ConnectionStatus,
}

pub async fn handle(session: &Session, global: &GlobalOpts) -> Result<(), CliError> {
    let color = output::should_color(&global.color);
    let mut states = WatchStream::new(session.manager.state_changes());
    session.start();

    let deadline = tokio::time::sleep(session.timeout);
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            () = &mut deadline => {
                return Err(CliError::Timeout {
                    seconds: session.timeout.as_secs(),
                });
            }
            next = states.next() => {
                let Some(state) = next else {
                    return Err(CliError::Disconnected);
                };
                let report = StatusReport {
                    state: state.to_string(),
                    status: ConnectionStatus::from(state),
                };
                let out = output::render_record(&global.output, &report, |r| {
                    output::paint_status(&r.status, color)
                });
                output::print_output(&out, global.quiet);

                if state.is_connected() {
                    return Ok(());
                }
                if let Some(err) = session.manager.last_failure() {
                    return Err(err.into());
                }
            }
        }
    }
}
