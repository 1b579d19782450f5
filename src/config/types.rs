//! Configuration Types

use serde::{Deserialize, Deserializer, Serialize};
use std::net::{AddrParseError, SocketAddr};
use std::time::Duration;

use crate::protocol::types::HandshakeSettings;
use crate::protocol::DEFAULT_MAX_FIELD_LEN;
use crate::relay::engine::DEFAULT_BUFFER_SIZE;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// SOCKS4/4a listener; `"off"` in the file disables it
    #[serde(deserialize_with = "deserialize_listener_addr")]
    pub socks4_bind_addr: Option<SocketAddr>,
    /// SOCKS5 listener; `"off"` in the file disables it
    #[serde(deserialize_with = "deserialize_listener_addr")]
    pub socks5_bind_addr: Option<SocketAddr>,
    /// Deadline for reading a complete handshake; unset waits forever
    #[serde(with = "humantime_serde")]
    pub handshake_timeout: Option<Duration>,
    /// Deadline for DNS resolution and the destination connect
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Option<Duration>,
    /// Longest SOCKS4 user id or hostname accepted
    pub max_field_len: usize,
    pub buffer_size: usize,
    #[serde(with = "humantime_serde")]
    pub shutdown_timeout: Duration,
}

/// Authentication configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    /// SOCKS5 methods in server preference order
    pub methods: Vec<AuthMethodConfig>,
    pub users: Vec<UserConfig>,
}

/// A SOCKS5 authentication method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethodConfig {
    None,
    UsernamePassword,
}

/// User configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UserConfig {
    pub username: String,
    pub password: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

fn default_enabled() -> bool {
    true
}

/// `off` or `none` disables a listener
pub(crate) fn parse_listener_addr(value: &str) -> Result<Option<SocketAddr>, AddrParseError> {
    match value {
        "off" | "none" => Ok(None),
        other => other.parse().map(Some),
    }
}

fn deserialize_listener_addr<'de, D>(deserializer: D) -> Result<Option<SocketAddr>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = String::deserialize(deserializer)?;
    parse_listener_addr(&value).map_err(serde::de::Error::custom)
}

impl ServerConfig {
    /// Limits applied to every handshake
    pub fn handshake_settings(&self) -> HandshakeSettings {
        HandshakeSettings {
            timeout: self.handshake_timeout,
            max_field_len: self.max_field_len,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            socks4_bind_addr: Some(SocketAddr::from(([127, 0, 0, 1], 1080))),
            socks5_bind_addr: Some(SocketAddr::from(([127, 0, 0, 1], 1081))),
            handshake_timeout: None,
            connect_timeout: None,
            max_field_len: DEFAULT_MAX_FIELD_LEN,
            buffer_size: DEFAULT_BUFFER_SIZE,
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            methods: vec![AuthMethodConfig::None],
            users: vec![],
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}
