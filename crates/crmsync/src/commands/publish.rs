//! `crmsync publish`: send one message and exit.

use std::time::Duration;

use super::Session;
use crate::cli::{GlobalOpts, PublishArgs};
use crate::error::CliError;

/// Time the transport gets to write the frame before the process exits.
const FLUSH_GRACE: Duration = Duration::from_millis(250);

pub async fn handle(
    session: &Session,
    args: PublishArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let PublishArgs { channel, payload } = args;
    let payload: serde_json::Value = serde_json::from_str(&payload)?;

    session.connect().await?;
    if !session.manager.publish(&channel, payload) {
        return Err(CliError::Disconnected);
    }
    tokio::time::sleep(FLUSH_GRACE).await;

    if !global.quiet {
        eprintln!("Published to '{channel}'");
    }
    Ok(())
}
