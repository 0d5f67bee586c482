//! Shared configuration for the crmsync CLI and embedding applications.
//!
//! TOML profiles, token resolution (env + keyring + plaintext), and
//! translation to `crmsync_core::SyncConfig`. The CLI adds flag-aware
//! wrappers on top.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crmsync_core::{ReconnectConfig, SyncConfig};

/// Keyring service all tokens are stored under.
const KEYRING_SERVICE: &str = "crmsync";

/// Environment variable consulted when a profile names none of its own.
pub const TOKEN_ENV: &str = "CRMSYNC_TOKEN";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("unknown profile '{profile}'")]
    UnknownProfile { profile: String },

    #[error("keyring error: {0}")]
    Keyring(#[from] keyring::Error),

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    /// Default profile name.
    pub default_profile: Option<String>,

    /// Global defaults.
    #[serde(default)]
    pub defaults: Defaults,

    /// Named server profiles.
    #[serde(default)]
    pub profiles: HashMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some("default".into()),
            defaults: Defaults::default(),
            profiles: HashMap::new(),
        }
    }
}

impl Config {
    /// Profile name in effect: explicit override, then `default_profile`, then `"default"`.
    pub fn active_profile_name(&self, requested: Option<&str>) -> String {
        requested
            .map(str::to_owned)
            .or_else(|| self.default_profile.clone())
            .unwrap_or_else(|| "default".into())
    }

    pub fn profile(&self, name: &str) -> Result<&Profile, ConfigError> {
        self.profiles
            .get(name)
            .ok_or_else(|| ConfigError::UnknownProfile {
                profile: name.into(),
            })
    }
}

/// Tuning shared by every profile unless a profile overrides it.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Defaults {
    /// Seconds to wait for a connection before giving up (CLI).
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    #[serde(default = "default_heartbeat_secs")]
    pub heartbeat_secs: u64,

    #[serde(default = "default_reconnect_initial_ms")]
    pub reconnect_initial_ms: u64,

    #[serde(default = "default_reconnect_max_secs")]
    pub reconnect_max_secs: u64,

    /// Consecutive failed attempts before giving up. Unset retries forever.
    #[serde(default)]
    pub max_retries: Option<u32>,

    #[serde(default = "default_activity_capacity")]
    pub activity_capacity: usize,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            timeout: default_timeout(),
            heartbeat_secs: default_heartbeat_secs(),
            reconnect_initial_ms: default_reconnect_initial_ms(),
            reconnect_max_secs: default_reconnect_max_secs(),
            max_retries: None,
            activity_capacity: default_activity_capacity(),
        }
    }
}

fn default_timeout() -> u64 {
    10
}
fn default_heartbeat_secs() -> u64 {
    30
}
fn default_reconnect_initial_ms() -> u64 {
    1_000
}
fn default_reconnect_max_secs() -> u64 {
    30
}
fn default_activity_capacity() -> usize {
    crmsync_core::config::DEFAULT_ACTIVITY_CAPACITY
}

/// A named sync server profile.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Profile {
    /// WebSocket endpoint (e.g., "wss://crm.example.com/ws").
    pub endpoint: String,

    /// Token (plaintext -- prefer keyring or env var).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    /// Environment variable name containing the token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_env: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heartbeat_secs: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reconnect_initial_ms: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reconnect_max_secs: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activity_capacity: Option<usize>,
}

impl Profile {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Self::default()
        }
    }

    /// Connection wait for this profile, falling back to `defaults`.
    pub fn timeout(&self, defaults: &Defaults) -> Duration {
        Duration::from_secs(self.timeout.unwrap_or(defaults.timeout))
    }
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("com", "crmsync", "crmsync").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("crmsync");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load Config from `path` + environment.
///
/// Nested keys use a double underscore, e.g. `CRMSYNC_DEFAULTS__TIMEOUT=20`.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("CRMSYNC_").split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

/// Load config, returning a default if the file doesn't exist.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<PathBuf, ConfigError> {
    let path = config_path();
    save_config_to(cfg, &path)?;
    Ok(path)
}

pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Token resolution (without CLI flags) ────────────────────────────

fn keyring_entry(profile_name: &str) -> Result<keyring::Entry, ConfigError> {
    Ok(keyring::Entry::new(
        KEYRING_SERVICE,
        &format!("{profile_name}/token"),
    )?)
}

/// Resolve a token from the credential chain (no CLI flag step).
///
/// A missing token is not an error: the sync layer simply stays
/// disconnected until one exists.
pub fn resolve_token(profile: &Profile, profile_name: &str) -> Option<SecretString> {
    resolve_token_from(
        profile,
        |name| std::env::var(name).ok(),
        || {
            keyring_entry(profile_name)
                .ok()
                .and_then(|entry| entry.get_password().ok())
        },
    )
}

fn resolve_token_from(
    profile: &Profile,
    env: impl Fn(&str) -> Option<String>,
    keyring: impl FnOnce() -> Option<String>,
) -> Option<SecretString> {
    // 1. Profile's token_env → env var lookup
    if let Some(val) = profile.token_env.as_deref().and_then(&env) {
        return Some(SecretString::from(val));
    }

    // 2. Well-known env var
    if let Some(val) = env(TOKEN_ENV) {
        return Some(SecretString::from(val));
    }

    // 3. System keyring
    if let Some(secret) = keyring() {
        return Some(SecretString::from(secret));
    }

    // 4. Plaintext in config
    profile.token.clone().map(SecretString::from)
}

/// Store `token` in the system keyring for `profile_name`.
pub fn store_token(profile_name: &str, token: &SecretString) -> Result<(), ConfigError> {
    keyring_entry(profile_name)?.set_password(token.expose_secret())?;
    Ok(())
}

// ── Translation to SyncConfig ───────────────────────────────────────

/// Build a `SyncConfig` from a profile and the global defaults.
pub fn profile_to_sync_config(
    profile: &Profile,
    defaults: &Defaults,
) -> Result<SyncConfig, ConfigError> {
    let endpoint: url::Url = profile
        .endpoint
        .parse()
        .map_err(|_| ConfigError::Validation {
            field: "endpoint".into(),
            reason: format!("invalid URL: {}", profile.endpoint),
        })?;

    if !matches!(endpoint.scheme(), "ws" | "wss") {
        return Err(ConfigError::Validation {
            field: "endpoint".into(),
            reason: format!("expected a ws:// or wss:// URL, got '{}'", endpoint.scheme()),
        });
    }

    let heartbeat_secs = profile.heartbeat_secs.unwrap_or(defaults.heartbeat_secs);
    if heartbeat_secs == 0 {
        return Err(ConfigError::Validation {
            field: "heartbeat_secs".into(),
            reason: "must be greater than zero".into(),
        });
    }

    let mut config = SyncConfig::new(endpoint);
    config.heartbeat_interval = Duration::from_secs(heartbeat_secs);
    config.reconnect = ReconnectConfig {
        initial_delay: Duration::from_millis(
            profile
                .reconnect_initial_ms
                .unwrap_or(defaults.reconnect_initial_ms),
        ),
        max_delay: Duration::from_secs(
            profile
                .reconnect_max_secs
                .unwrap_or(defaults.reconnect_max_secs),
        ),
        max_retries: profile.max_retries.or(defaults.max_retries),
    };
    config.activity_capacity = profile
        .activity_capacity
        .unwrap_or(defaults.activity_capacity);
    Ok(config)
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const SAMPLE: &str = r#"
default_profile = "prod"

[defaults]
timeout = 15
max_retries = 5

[profiles.prod]
endpoint = "wss://crm.example.com/ws"
token_env = "PROD_CRM_TOKEN"
heartbeat_secs = 10

[profiles.local]
endpoint = "ws://localhost:4000/ws"
token = "dev-token"
"#;

    fn sample() -> Config {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, SAMPLE).unwrap();
        load_config_from(&path).unwrap()
    }

    #[test]
    fn loads_profiles_and_defaults() {
        let cfg = sample();
        assert_eq!(cfg.active_profile_name(None), "prod");
        assert_eq!(cfg.active_profile_name(Some("local")), "local");
        assert_eq!(cfg.defaults.timeout, 15);
        assert_eq!(cfg.defaults.heartbeat_secs, 30);

        let prod = cfg.profile("prod").unwrap();
        assert_eq!(prod.token_env.as_deref(), Some("PROD_CRM_TOKEN"));
        assert!(matches!(
            cfg.profile("staging"),
            Err(ConfigError::UnknownProfile { .. })
        ));
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = load_config_from(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(cfg.default_profile.as_deref(), Some("default"));
        assert!(cfg.profiles.is_empty());
    }

    #[test]
    fn profile_overrides_defaults() {
        let cfg = sample();
        let sync = profile_to_sync_config(cfg.profile("prod").unwrap(), &cfg.defaults).unwrap();

        assert_eq!(sync.endpoint.as_str(), "wss://crm.example.com/ws");
        assert_eq!(sync.heartbeat_interval, Duration::from_secs(10));
        assert_eq!(sync.reconnect.initial_delay, Duration::from_secs(1));
        assert_eq!(sync.reconnect.max_delay, Duration::from_secs(30));
        assert_eq!(sync.reconnect.max_retries, Some(5));
        assert_eq!(sync.activity_capacity, 50);
    }

    #[test]
    fn rejects_non_websocket_endpoints() {
        let defaults = Defaults::default();
        let err = profile_to_sync_config(&Profile::new("https://crm.example.com"), &defaults)
            .unwrap_err();
        assert!(matches!(err, ConfigError::Validation { ref field, .. } if field == "endpoint"));

        assert!(profile_to_sync_config(&Profile::new("not a url"), &defaults).is_err());
    }

    #[test]
    fn token_chain_order() {
        let profile = Profile {
            token_env: Some("PROFILE_TOKEN".into()),
            token: Some("plain".into()),
            ..Profile::new("wss://crm.example.com/ws")
        };
        let reveal = |token: Option<SecretString>| token.map(|t| t.expose_secret().to_owned());

        let everything = |name: &str| Some(format!("from-{name}"));
        assert_eq!(
            reveal(resolve_token_from(&profile, everything, || Some("kr".into()))),
            Some("from-PROFILE_TOKEN".into())
        );

        let global_only = |name: &str| (name == TOKEN_ENV).then(|| "global".to_owned());
        assert_eq!(
            reveal(resolve_token_from(&profile, global_only, || Some("kr".into()))),
            Some("global".into())
        );

        assert_eq!(
            reveal(resolve_token_from(&profile, |_| None, || Some("kr".into()))),
            Some("kr".into())
        );
        assert_eq!(
            reveal(resolve_token_from(&profile, |_| None, || None)),
            Some("plain".into())
        );
    }

    #[test]
    fn missing_token_is_none() {
        let profile = Profile::new("wss://crm.example.com/ws");
        assert!(resolve_token_from(&profile, |_| None, || None).is_none());
    }

    #[test]
    fn save_round_trips_through_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut cfg = Config::default();
        cfg.profiles
            .insert("default".into(), Profile::new("wss://crm.example.com/ws"));
        save_config_to(&cfg, &path).unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.contains("[profiles.default]"));
        assert!(!written.contains("token"));

        let loaded = load_config_from(&path).unwrap();
        assert_eq!(loaded.profiles["default"], cfg.profiles["default"]);
    }
}
