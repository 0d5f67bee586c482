//! `crmsync activity`: follow a live activity feed.

use crmsync_core::{Activity, ActivityFeed, FeedScope};

use super::Session;
use crate::cli::{ActivityArgs, GlobalOpts};
use crate::error::CliError;
use crate::output;

fn line(a: &Activity) -> String {
    format!(
        "{}  {}  {} {}",
        a.timestamp.format("%Y-%m-%d %H:%M:%S"),
        a.actor.name,
        a.action,
        a.target
    )
}

pub async fn handle(
    session: &Session,
    args: ActivityArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let scope = match (args.entity, args.id) {
        (Some(entity_type), Some(entity_id)) => FeedScope::entity(entity_type, entity_id),
        _ => FeedScope::Global,
    };
    let capacity = args.limit.unwrap_or(session.activity_capacity);
    let feed = ActivityFeed::with_capacity(&session.manager, scope, capacity);
    let mut updates = feed.watch();

    session.connect().await?;
    if !global.quiet {
        eprintln!("Following {} (Ctrl-C to stop)", feed.scope());
    }

    let interrupt = tokio::signal::ctrl_c();
    tokio::pin!(interrupt);
    let mut newest: Option<String> = None;

    loop {
        tokio::select! {
            _ = &mut interrupt => break,
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let entries = updates.borrow_and_update().clone();
                let fresh: Vec<&Activity> = entries
                    .iter()
                    .take_while(|a| newest.as_deref() != Some(a.id.as_str()))
                    .collect();
                for activity in fresh.iter().rev() {
                    let out = output::render_record(&global.output, *activity, line);
                    output::print_output(&out, global.quiet);
                }
                if let Some(latest) = entries.first() {
                    newest = Some(latest.id.clone());
                }
            }
        }
    }
    Ok(())
}
