//! `crmsync watch`: stream channel messages to stdout.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;

use crmsync_core::Subscription;

use super::Session;
use crate::cli::{GlobalOpts, WatchArgs};
use crate::error::CliError;
use crate::output;

#[derive(Debug, Serialize)]
struct ChannelMessage {
    channel: String,
    received_at: DateTime<Utc>,
    payload: serde_json::Value,
}

fn line(msg: &ChannelMessage) -> String {
    format!(
        "{}  {}  {}",
        msg.received_at.format("%H:%M:%S%.3f"),
        msg.channel,
        msg.payload
    )
}

pub async fn handle(
    session: &Session,
    args: WatchArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let label = args.channels.join(", ");

    let _subscriptions: Vec<Subscription> = args
        .channels
        .into_iter()
        .map(|channel| {
            let tx = tx.clone();
            let name = channel.clone();
            session.manager.subscribe(channel, move |payload| {
                let _ = tx.send(ChannelMessage {
                    channel: name.clone(),
                    received_at: Utc::now(),
                    payload: payload.clone(),
                });
            })
        })
        .collect();
    drop(tx);

    session.connect().await?;
    if !global.quiet {
        eprintln!("Watching {label} (Ctrl-C to stop)");
    }

    let interrupt = tokio::signal::ctrl_c();
    tokio::pin!(interrupt);

    loop {
        tokio::select! {
            _ = &mut interrupt => break,
            Some(msg) = rx.recv() => {
                let out = output::render_record(&global.output, &msg, line);
                output::print_output(&out, global.quiet);
            }
            else => break,
        }
    }
    Ok(())
}
