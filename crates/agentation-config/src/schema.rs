//! Configuration schema definitions.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default relay port.
pub const DEFAULT_PORT: u16 = 19989;

/// Default system prompt sent with every sampling request.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are an AI assistant helping to implement UI feedback from users. \nYou will receive annotations and feedback about specific UI elements on a web page.\nYour job is to understand the feedback and suggest or implement the requested changes.\nFocus on being helpful, specific, and actionable.";

/// Root configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub client: ClientConfig,

    #[serde(default)]
    pub sampling: SamplingConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Relay server configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl ServerConfig {
    /// `host:port` bind address.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

/// Client session configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default = "default_server_url")]
    pub server_url: String,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay_secs: u64,

    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: default_server_url(),
            request_timeout_secs: default_request_timeout(),
            reconnect_delay_secs: default_reconnect_delay(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
        }
    }
}

impl ClientConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_secs)
    }
}

fn default_server_url() -> String {
    format!("ws://localhost:{}", DEFAULT_PORT)
}

fn default_request_timeout() -> u64 {
    120
}

fn default_reconnect_delay() -> u64 {
    3
}

fn default_max_reconnect_attempts() -> u32 {
    3
}

/// AI sampling configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamplingConfig {
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,

    #[serde(default = "default_model_hints")]
    pub model_hints: Vec<String>,

    #[serde(default = "default_intelligence_priority")]
    pub intelligence_priority: f64,

    #[serde(default = "default_speed_priority")]
    pub speed_priority: f64,

    #[serde(default = "default_sampling_timeout")]
    pub timeout_secs: u64,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            max_tokens: default_max_tokens(),
            system_prompt: default_system_prompt(),
            model_hints: default_model_hints(),
            intelligence_priority: default_intelligence_priority(),
            speed_priority: default_speed_priority(),
            timeout_secs: default_sampling_timeout(),
        }
    }
}

impl SamplingConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_system_prompt() -> String {
    DEFAULT_SYSTEM_PROMPT.to_string()
}

fn default_model_hints() -> Vec<String> {
    vec!["claude-3-5-sonnet".to_string(), "claude".to_string()]
}

fn default_intelligence_priority() -> f64 {
    0.8
}

fn default_speed_priority() -> f64 {
    0.5
}

fn default_sampling_timeout() -> u64 {
    300
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_level")]
    pub level: String,

    /// Also write a daily rolling log file.
    #[serde(default = "default_true")]
    pub file: bool,

    /// Log directory. Defaults to `~/.agentation/logs`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub directory: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            file: default_true(),
            directory: None,
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}
