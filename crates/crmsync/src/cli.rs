//! Clap derive structures for the `crmsync` CLI.
//!
//! Defines the command tree, global flags, and shared types.

use clap::{Args, Parser, Subcommand, ValueEnum};

use crmsync_core::PresenceStatus;

// ── Top-Level CLI ────────────────────────────────────────────────────

/// crmsync -- live channel, presence and activity client for the CRM sync server
#[derive(Debug, Parser)]
#[command(
    name = "crmsync",
    version,
    about = "Watch and publish CRM real-time sync traffic from the command line",
    long_about = "A command-line client for the CRM real-time sync server.\n\n\
        Subscribes to channels, announces presence, follows activity feeds\n\
        and reports connection health over a single WebSocket connection.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Server profile to use
    #[arg(long, short = 'p', env = "CRMSYNC_PROFILE", global = true)]
    pub profile: Option<String>,

    /// WebSocket endpoint (overrides profile)
    #[arg(long, short = 'e', env = "CRMSYNC_ENDPOINT", global = true)]
    pub endpoint: Option<String>,

    /// Authentication token
    #[arg(long, env = "CRMSYNC_TOKEN", global = true, hide_env_values = true, hide = true)]
    pub token: Option<String>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "CRMSYNC_OUTPUT",
        default_value = "table",
        global = true
    )]
    pub output: OutputFormat,

    /// When to use color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Seconds to wait for the connection (overrides profile)
    #[arg(long, env = "CRMSYNC_TIMEOUT", global = true)]
    pub timeout: Option<u64>,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// Plain text, one value per line (scripting)
    Plain,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Subscribe to channels and print every message until interrupted
    #[command(alias = "w")]
    Watch(WatchArgs),

    /// Publish one message to a channel
    #[command(alias = "pub")]
    Publish(PublishArgs),

    /// Announce presence and follow who else is online
    Presence(PresenceArgs),

    /// Follow a live activity feed
    #[command(alias = "feed")]
    Activity(ActivityArgs),

    /// Report connection status until connected
    Status,

    /// Manage configuration and stored tokens
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── Sync commands ────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct WatchArgs {
    /// Channels to subscribe to (e.g., "leads", "document:42")
    #[arg(required = true)]
    pub channels: Vec<String>,
}

#[derive(Debug, Args)]
pub struct PublishArgs {
    /// Channel to publish on
    pub channel: String,

    /// JSON payload
    pub payload: String,
}

#[derive(Debug, Args)]
pub struct PresenceArgs {
    /// Status to announce
    #[arg(long, short = 's', default_value = "online", value_parser = parse_status)]
    pub status: PresenceStatus,

    /// Page label to announce alongside the status
    #[arg(long)]
    pub page: Option<String>,
}

fn parse_status(raw: &str) -> Result<PresenceStatus, String> {
    raw.parse()
        .map_err(|_| format!("expected one of online, away, busy, offline; got '{raw}'"))
}

#[derive(Debug, Args)]
pub struct ActivityArgs {
    /// Entity type to scope the feed to (e.g., "deal")
    #[arg(long, requires = "id")]
    pub entity: Option<String>,

    /// Entity id to scope the feed to
    #[arg(long, requires = "entity")]
    pub id: Option<String>,

    /// Entries to keep (overrides profile)
    #[arg(long, short = 'l')]
    pub limit: Option<usize>,
}

// ── Config ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Create initial config file with guided setup
    Init,

    /// Display current configuration (tokens redacted)
    Show,

    /// Print the config file location
    Path,

    /// Set a value on the active profile
    Set {
        /// Profile key (endpoint, token_env, heartbeat_secs, max_retries, ...)
        key: String,

        /// Value to set
        value: String,
    },

    /// Set the default profile
    Use {
        /// Profile name to set as default
        name: String,
    },

    /// Store a token for the active profile in the system keyring
    SetToken,
}

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
