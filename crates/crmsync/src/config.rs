//! Flag-aware configuration: layers `GlobalOpts` over the profiles from
//! `crmsync-config` and produces everything a command needs to connect.
//!
//! Core never sees these types -- it receives a pre-built `SyncConfig`.

use std::time::Duration;

use secrecy::SecretString;

use crmsync_config::{Config, Profile, config_path, load_config, profile_to_sync_config, resolve_token};
use crmsync_core::SyncConfig;

use crate::cli::GlobalOpts;
use crate::error::CliError;

/// A profile resolved against the command-line flags.
pub struct Resolved {
    pub profile_name: String,
    pub sync: SyncConfig,
    pub token: Option<SecretString>,
    pub timeout: Duration,
}

impl Resolved {
    /// The token, or the `NoCredentials` diagnostic.
    ///
    /// The sync layer would silently stay offline without one; a one-shot
    /// command reports it instead.
    pub fn require_token(&self) -> Result<SecretString, CliError> {
        self.token.clone().ok_or_else(|| CliError::NoCredentials {
            profile: self.profile_name.clone(),
        })
    }
}

/// Resolve the active profile name from CLI flags and config.
pub fn active_profile_name(global: &GlobalOpts, config: &Config) -> String {
    config.active_profile_name(global.profile.as_deref())
}

/// Translate the config file + global flags into a connectable setup.
///
/// Precedence: flag > environment > profile > defaults.
pub fn resolve(global: &GlobalOpts) -> Result<Resolved, CliError> {
    let cfg = load_config()?;
    let profile_name = active_profile_name(global, &cfg);

    let mut profile = match (cfg.profiles.get(&profile_name), global.endpoint.as_deref()) {
        (Some(profile), _) => profile.clone(),
        // No profile -- run from flags / env vars alone
        (None, Some(endpoint)) => Profile::new(endpoint),
        (None, None) if global.profile.is_some() => {
            return Err(CliError::ProfileNotFound {
                name: profile_name,
                available: available_profiles(&cfg),
            });
        }
        (None, None) => {
            return Err(CliError::NoConfig {
                path: config_path().display().to_string(),
            });
        }
    };
    if let Some(endpoint) = &global.endpoint {
        profile.endpoint.clone_from(endpoint);
    }

    let sync = profile_to_sync_config(&profile, &cfg.defaults)?;
    let token = global
        .token
        .clone()
        .map(SecretString::from)
        .or_else(|| resolve_token(&profile, &profile_name));
    let timeout = global
        .timeout
        .map_or_else(|| profile.timeout(&cfg.defaults), Duration::from_secs);

    Ok(Resolved {
        profile_name,
        sync,
        token,
        timeout,
    })
}

/// Comma-separated profile names, for help text.
pub fn available_profiles(cfg: &Config) -> String {
    let mut names: Vec<&str> = cfg.profiles.keys().map(String::as_str).collect();
    if names.is_empty() {
        return "(none)".into();
    }
    names.sort_unstable();
    names.join(", ")
}
