//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` into user-facing errors with
//! actionable help text.

use miette::Diagnostic;
use thiserror::Error;

use crmsync_config::ConfigError;
use crmsync_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────

    #[error("Could not connect to sync server at {url}")]
    #[diagnostic(
        code(crmsync::connection_failed),
        help(
            "Check that the server is running and the endpoint is correct.\n\
             Endpoint: {url}"
        )
    )]
    ConnectionFailed { url: String, reason: String },

    #[error("Not connected to the sync server")]
    #[diagnostic(
        code(crmsync::disconnected),
        help("The connection dropped before the message could be sent. Try again.")
    )]
    Disconnected,

    // ── Authentication ───────────────────────────────────────────────

    #[error("No token configured for profile '{profile}'")]
    #[diagnostic(
        code(crmsync::no_credentials),
        help(
            "Store one with: crmsync config set-token\n\
             Or set the CRMSYNC_TOKEN environment variable."
        )
    )]
    NoCredentials { profile: String },

    // ── Validation ───────────────────────────────────────────────────

    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(crmsync::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────

    #[error("Profile '{name}' not found in configuration")]
    #[diagnostic(
        code(crmsync::profile_not_found),
        help(
            "Available profiles: {available}\n\
             Create one with: crmsync config init"
        )
    )]
    ProfileNotFound { name: String, available: String },

    #[error("No sync server configured")]
    #[diagnostic(
        code(crmsync::no_config),
        help(
            "Create a config with: crmsync config init\n\
             Or pass --endpoint. Expected config at: {path}"
        )
    )]
    NoConfig { path: String },

    #[error(transparent)]
    #[diagnostic(code(crmsync::config))]
    Config(Box<ConfigError>),

    // ── Timeout ──────────────────────────────────────────────────────

    #[error("Connection not established after {seconds}s")]
    #[diagnostic(
        code(crmsync::timeout),
        help("Increase the wait with --timeout or check the server's availability.")
    )]
    Timeout { seconds: u64 },

    // ── Interactive ──────────────────────────────────────────────────

    #[error("Prompt failed: {0}")]
    #[diagnostic(code(crmsync::prompt))]
    Prompt(String),

    // ── IO / Serialization ───────────────────────────────────────────

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON payload: {0}")]
    #[diagnostic(code(crmsync::json), help("Payloads must be a single JSON value, e.g. '{{\"id\": 7}}'."))]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    #[diagnostic(code(crmsync::internal))]
    Internal(String),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } | Self::Disconnected => exit_code::CONNECTION,
            Self::NoCredentials { .. } => exit_code::AUTH,
            Self::ProfileNotFound { .. } => exit_code::NOT_FOUND,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::Validation { .. } | Self::Json(_) => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ConnectionFailed { url, reason } => Self::ConnectionFailed { url, reason },
            CoreError::Disconnected => Self::Disconnected,
            CoreError::Timeout { timeout_secs } => Self::Timeout {
                seconds: timeout_secs,
            },
            CoreError::Decode { what, message } => Self::Validation {
                field: what.into(),
                reason: message,
            },
        }
    }
}

// ── ConfigError → CliError mapping ───────────────────────────────────

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Validation { field, reason } => Self::Validation { field, reason },
            ConfigError::UnknownProfile { profile } => Self::ProfileNotFound {
                name: profile,
                available: String::new(),
            },
            other => Self::Config(Box::new(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes() {
        assert_eq!(
            CliError::NoCredentials {
                profile: "default".into()
            }
            .exit_code(),
            exit_code::AUTH
        );
        assert_eq!(
            CliError::from(CoreError::Timeout { timeout_secs: 5 }).exit_code(),
            exit_code::TIMEOUT
        );
        assert_eq!(
            CliError::from(ConfigError::Validation {
                field: "endpoint".into(),
                reason: "bad".into()
            })
            .exit_code(),
            exit_code::USAGE
        );
        assert_eq!(CliError::Internal("x".into()).exit_code(), exit_code::GENERAL);
    }

    #[test]
    fn terminal_connect_failure_is_a_connection_error() {
        let err = CliError::from(CoreError::ConnectionFailed {
            url: "wss://crm.test/ws".into(),
            reason: "unsupported URL scheme".into(),
        });
        assert!(matches!(err, CliError::ConnectionFailed { ref url, .. } if url == "wss://crm.test/ws"));
        assert_eq!(err.exit_code(), exit_code::CONNECTION);
    }
}
