//! Session configuration.

use std::time::Duration;

use agentation_protocols::DEFAULT_RELAY_URL;

/// Client session configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Relay URL the host application connects to.
    pub server_url: String,
    /// Deadline of each `submit_feedback` call.
    pub request_timeout: Duration,
    /// Fixed delay before each reconnection attempt.
    pub reconnect_delay: Duration,
    /// Reconnection attempts after an unexpected close.
    pub max_reconnect_attempts: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_RELAY_URL.to_string(),
            request_timeout: Duration::from_secs(120),
            reconnect_delay: Duration::from_secs(3),
            max_reconnect_attempts: 3,
        }
    }
}

impl From<&agentation_config::ClientConfig> for SessionConfig {
    fn from(config: &agentation_config::ClientConfig) -> Self {
        Self {
            server_url: config.server_url.clone(),
            request_timeout: config.request_timeout(),
            reconnect_delay: config.reconnect_delay(),
            max_reconnect_attempts: config.max_reconnect_attempts,
        }
    }
}
