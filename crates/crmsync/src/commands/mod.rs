//! Command dispatch: resolves the connection setup, then hands a live
//! session to the command handler.

pub mod activity;
pub mod config_cmd;
pub mod presence;
pub mod publish;
pub mod status;
pub mod watch;

use std::time::Duration;

use secrecy::SecretString;

use crmsync_core::ConnectionManager;

use crate::cli::{Command, GlobalOpts};
use crate::config;
use crate::error::CliError;

/// One connection to the sync server for the lifetime of a command.
///
/// Dropping the session disconnects.
pub struct Session {
    pub manager: ConnectionManager,
    token: SecretString,
    pub timeout: Duration,
    pub activity_capacity: usize,
}

impl Session {
    fn open(global: &GlobalOpts) -> Result<Self, CliError> {
        let resolved = config::resolve(global)?;
        let token = resolved.require_token()?;
        let activity_capacity = resolved.sync.activity_capacity;
        Ok(Self {
            manager: ConnectionManager::new(resolved.sync),
            token,
            timeout: resolved.timeout,
            activity_capacity,
        })
    }

    /// Start connecting in the background.
    pub fn start(&self) {
        self.manager.connect(Some(self.token.clone()));
    }

    /// Start connecting and wait until connected, bounded by the timeout.
    pub async fn connect(&self) -> Result<(), CliError> {
        self.start();
        self.manager.wait_until_connected(self.timeout).await?;
        Ok(())
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.manager.disconnect();
    }
}

/// Dispatch a server-bound command to the appropriate handler.
pub async fn dispatch(cmd: Command, global: &GlobalOpts) -> Result<(), CliError> {
    let session = Session::open(global)?;

    match cmd {
        Command::Watch(args) => watch::handle(&session, args, global).await,
        Command::Publish(args) => publish::handle(&session, args, global).await,
        Command::Presence(args) => presence::handle(&session, args, global).await,
        Command::Activity(args) => activity::handle(&session, args, global).await,
        Command::Status => status::handle(&session, global).await,
        // Config and Completions are handled before dispatch
        Command::Config(_) | Command::Completions(_) => Err(CliError::Internal(
            "local command routed to the server dispatcher".into(),
        )),
    }
}
