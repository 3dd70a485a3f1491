//! Client and relay configuration parsed from environment variables.

use std::time::Duration;

pub const DEFAULT_API_BASE_URL: &str = "http://127.0.0.1:8000/api";
pub const DEFAULT_WS_URL: &str = "ws://127.0.0.1:8000/ws/chat/";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_RECONNECT_INITIAL_MS: u64 = 1000;
pub const DEFAULT_RECONNECT_MAX_MS: u64 = 10_000;
pub const DEFAULT_RELAY_PORT: u16 = 8000;

/// Exponential backoff used when reconnection is enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub initial: Duration,
    pub max: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(DEFAULT_RECONNECT_INITIAL_MS),
            max: Duration::from_millis(DEFAULT_RECONNECT_MAX_MS),
        }
    }
}

impl Backoff {
    /// Delay after `delay`: doubled, capped at `max`.
    #[must_use]
    pub fn next_delay(&self, delay: Duration) -> Duration {
        delay.saturating_mul(2).min(self.max)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub api_base_url: String,
    pub ws_url: String,
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
    /// `None` keeps the channel closed after a drop.
    pub reconnect: Option<Backoff>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_owned(),
            ws_url: DEFAULT_WS_URL.to_owned(),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            reconnect: None,
        }
    }
}

impl ClientConfig {
    /// Build client config from environment variables.
    ///
    /// Optional:
    /// - `LIVECHAT_API_BASE_URL`: default `http://127.0.0.1:8000/api`
    /// - `LIVECHAT_WS_URL`: default `ws://127.0.0.1:8000/ws/chat/`
    /// - `LIVECHAT_REQUEST_TIMEOUT_SECS`: default 30
    /// - `LIVECHAT_CONNECT_TIMEOUT_SECS`: default 10
    /// - `LIVECHAT_RECONNECT`: `true` or `1` enables reconnection (default off)
    /// - `LIVECHAT_RECONNECT_INITIAL_MS`: default 1000
    /// - `LIVECHAT_RECONNECT_MAX_MS`: default 10000
    #[must_use]
    pub fn from_env() -> Self {
        let reconnect = parse_flag(std::env::var("LIVECHAT_RECONNECT").ok().as_deref()).then(|| Backoff {
            initial: Duration::from_millis(env_parse("LIVECHAT_RECONNECT_INITIAL_MS", DEFAULT_RECONNECT_INITIAL_MS)),
            max: Duration::from_millis(env_parse("LIVECHAT_RECONNECT_MAX_MS", DEFAULT_RECONNECT_MAX_MS)),
        });

        Self {
            api_base_url: env_string("LIVECHAT_API_BASE_URL", DEFAULT_API_BASE_URL)
                .trim_end_matches('/')
                .to_owned(),
            ws_url: env_string("LIVECHAT_WS_URL", DEFAULT_WS_URL),
            request_timeout: Duration::from_secs(env_parse(
                "LIVECHAT_REQUEST_TIMEOUT_SECS",
                DEFAULT_REQUEST_TIMEOUT_SECS,
            )),
            connect_timeout: Duration::from_secs(env_parse(
                "LIVECHAT_CONNECT_TIMEOUT_SECS",
                DEFAULT_CONNECT_TIMEOUT_SECS,
            )),
            reconnect,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayConfig {
    pub port: u16,
}

impl RelayConfig {
    #[must_use]
    pub fn from_env() -> Self {
        Self { port: env_parse("PORT", DEFAULT_RELAY_PORT) }
    }
}

pub(crate) fn env_parse<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

fn env_string(key: &str, default: &str) -> String {
    std::env::var(key)
        .ok()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| default.to_owned())
}

fn parse_flag(raw: Option<&str>) -> bool {
    matches!(raw.map(str::trim), Some("1" | "true" | "TRUE" | "yes"))
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
