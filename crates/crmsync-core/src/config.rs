// ── Runtime sync configuration ──
//
// Describes *where* to connect and how the connection manager paces
// itself. Never touches disk: crmsync-config (or any host application)
// builds a `SyncConfig` and hands it in. The token is supplied per
// `connect()` call and is not part of the config.

use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use url::Url;

/// Default heartbeat period while connected.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Default number of entries an activity feed retains.
pub const DEFAULT_ACTIVITY_CAPACITY: usize = 50;

/// Exponential backoff configuration for reconnection.
///
/// `delay = min(initial_delay * 2^attempt, max_delay)`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectConfig {
    /// Delay before the first reconnection attempt. Default: 1s.
    pub initial_delay: Duration,

    /// Upper bound on backoff delay. Default: 30s.
    pub max_delay: Duration,

    /// Maximum consecutive failed attempts before giving up.
    /// `None` means retry forever.
    pub max_retries: Option<u32>,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            max_retries: None,
        }
    }
}

impl ReconnectConfig {
    /// Backoff delay after `attempt` consecutive failures (0-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.initial_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// Configuration for a single sync connection.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// WebSocket endpoint, e.g. `wss://crm.example.com/ws`.
    pub endpoint: Url,
    /// Query parameter the token is appended under.
    pub token_param: String,
    /// Liveness ping period while connected. Zero disables the heartbeat.
    pub heartbeat_interval: Duration,
    /// Reconnection pacing.
    pub reconnect: ReconnectConfig,
    /// Entries kept per activity feed.
    pub activity_capacity: usize,
}

impl SyncConfig {
    pub fn new(endpoint: Url) -> Self {
        Self {
            endpoint,
            token_param: "token".into(),
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            reconnect: ReconnectConfig::default(),
            activity_capacity: DEFAULT_ACTIVITY_CAPACITY,
        }
    }

    /// Connection target: the endpoint with the token appended as a credential parameter.
    pub fn target(&self, token: &SecretString) -> Url {
        let mut target = self.endpoint.clone();
        target
            .query_pairs_mut()
            .append_pair(&self.token_param, token.expose_secret());
        target
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn default_reconnect_config() {
        let config = ReconnectConfig::default();
        assert_eq!(config.initial_delay, Duration::from_secs(1));
        assert_eq!(config.max_delay, Duration::from_secs(30));
        assert!(config.max_retries.is_none());
    }

    #[test]
    fn backoff_doubles_then_caps() {
        let config = ReconnectConfig::default();
        let delays: Vec<u64> = (0..9).map(|a| config.delay_for(a).as_secs()).collect();
        assert_eq!(delays, vec![1, 2, 4, 8, 16, 30, 30, 30, 30]);
    }

    #[test]
    fn backoff_never_overflows() {
        let config = ReconnectConfig::default();
        assert_eq!(config.delay_for(40), Duration::from_secs(30));
        assert_eq!(config.delay_for(u32::MAX), Duration::from_secs(30));
    }

    #[test]
    fn backoff_is_monotonic_for_custom_bounds() {
        let config = ReconnectConfig {
            initial_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(5),
            max_retries: Some(10),
        };
        let delays: Vec<Duration> = (0..12).map(|a| config.delay_for(a)).collect();
        assert!(delays.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(delays[0], Duration::from_millis(250));
        assert_eq!(*delays.last().unwrap(), Duration::from_secs(5));
    }

    #[test]
    fn target_appends_token_parameter() {
        let config = SyncConfig::new(Url::parse("wss://crm.example.com/ws?v=2").unwrap());
        let target = config.target(&SecretString::from("abc 123".to_string()));
        assert_eq!(target.as_str(), "wss://crm.example.com/ws?v=2&token=abc+123");
    }

    #[test]
    fn new_uses_defaults() {
        let config = SyncConfig::new(Url::parse("ws://localhost:3001/ws").unwrap());
        assert_eq!(config.token_param, "token");
        assert_eq!(config.heartbeat_interval, Duration::from_secs(30));
        assert_eq!(config.activity_capacity, 50);
    }
}
