//! Configuration Manager

use super::types::parse_listener_addr;
use super::{AuthMethodConfig, Config};
use crate::Result;
use anyhow::{bail, Context};
use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::Path;

const VALID_LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Manages configuration loading and validation
pub struct ConfigManager;

impl ConfigManager {
    /// Load configuration from a TOML file; missing sections take their defaults
    pub fn load_from_file(path: &Path) -> Result<Config> {
        tracing::info!("Loading configuration from: {}", path.display());
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        config
            .validate()
            .with_context(|| "Configuration validation failed")?;

        tracing::info!("Configuration loaded and validated successfully");
        Ok(config)
    }

    /// Load configuration from `SOCKSD_*` environment variables over the defaults
    pub fn load_from_env() -> Result<Config> {
        let mut config = Config::default();

        if let Ok(addr) = std::env::var("SOCKSD_SOCKS4_BIND_ADDR") {
            config.server.socks4_bind_addr = parse_listener_addr(&addr)
                .with_context(|| format!("Invalid SOCKSD_SOCKS4_BIND_ADDR: {}", addr))?;
        }

        if let Ok(addr) = std::env::var("SOCKSD_SOCKS5_BIND_ADDR") {
            config.server.socks5_bind_addr = parse_listener_addr(&addr)
                .with_context(|| format!("Invalid SOCKSD_SOCKS5_BIND_ADDR: {}", addr))?;
        }

        if let Ok(timeout) = std::env::var("SOCKSD_HANDSHAKE_TIMEOUT") {
            config.server.handshake_timeout = Some(
                humantime::parse_duration(&timeout)
                    .with_context(|| format!("Invalid SOCKSD_HANDSHAKE_TIMEOUT: {}", timeout))?,
            );
        }

        if let Ok(timeout) = std::env::var("SOCKSD_CONNECT_TIMEOUT") {
            config.server.connect_timeout = Some(
                humantime::parse_duration(&timeout)
                    .with_context(|| format!("Invalid SOCKSD_CONNECT_TIMEOUT: {}", timeout))?,
            );
        }

        if let Ok(buffer_size) = std::env::var("SOCKSD_BUFFER_SIZE") {
            config.server.buffer_size = buffer_size
                .parse::<usize>()
                .with_context(|| format!("Invalid SOCKSD_BUFFER_SIZE: {}", buffer_size))?;
        }

        if let Ok(methods) = std::env::var("SOCKSD_AUTH_METHODS") {
            config.auth.methods = methods
                .split(',')
                .map(|m| parse_auth_method(m.trim()))
                .collect::<Result<Vec<_>>>()
                .with_context(|| format!("Invalid SOCKSD_AUTH_METHODS: {}", methods))?;
        }

        if let Ok(log_level) = std::env::var("SOCKSD_LOG_LEVEL") {
            config.logging.level = log_level;
        }

        config.validate()?;
        Ok(config)
    }
}

fn parse_auth_method(value: &str) -> Result<AuthMethodConfig> {
    match value {
        "none" => Ok(AuthMethodConfig::None),
        "username_password" => Ok(AuthMethodConfig::UsernamePassword),
        other => bail!("unknown authentication method '{}'", other),
    }
}

impl Config {
    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.validate_server_config()
            .with_context(|| "Server configuration validation failed")?;

        self.validate_auth_config()
            .with_context(|| "Authentication configuration validation failed")?;

        self.validate_logging_config()
            .with_context(|| "Logging configuration validation failed")?;

        Ok(())
    }

    fn validate_server_config(&self) -> Result<()> {
        match (self.server.socks4_bind_addr, self.server.socks5_bind_addr) {
            (None, None) => bail!("at least one of socks4_bind_addr and socks5_bind_addr must be set"),
            (Some(v4), Some(v5)) if v4 == v5 && v4.port() != 0 => {
                bail!("SOCKS4 and SOCKS5 listeners cannot share the address {}", v4)
            }
            _ => {}
        }

        if self.server.max_field_len == 0 || self.server.max_field_len > 65535 {
            bail!("max_field_len must be between 1 and 65535");
        }

        if self.server.buffer_size < 1024 {
            bail!("buffer_size must be at least 1024 bytes");
        }

        if self.server.buffer_size > 1048576 {
            bail!("buffer_size cannot exceed 1MB");
        }

        Ok(())
    }

    fn validate_auth_config(&self) -> Result<()> {
        if self.server.socks5_bind_addr.is_some() && self.auth.methods.is_empty() {
            bail!("at least one authentication method must be configured for SOCKS5");
        }

        let mut seen = HashSet::new();
        for method in &self.auth.methods {
            if !seen.insert(method) {
                bail!("authentication method {:?} is listed more than once", method);
            }
        }

        if self.auth.methods.contains(&AuthMethodConfig::UsernamePassword)
            && self.auth.users.is_empty()
        {
            bail!("username_password authentication requires at least one user");
        }

        for (i, user) in self.auth.users.iter().enumerate() {
            if user.username.is_empty() {
                bail!("User {} has empty username", i);
            }

            if user.username.len() > 255 {
                bail!("User {} username exceeds 255 bytes", i);
            }

            if user.password.is_empty() {
                bail!("User {} has empty password", i);
            }

            if user.password.len() > 255 {
                bail!("User {} password exceeds 255 bytes", i);
            }
        }

        Ok(())
    }

    fn validate_logging_config(&self) -> Result<()> {
        if !VALID_LOG_LEVELS.contains(&self.logging.level.as_str()) {
            bail!("logging.level must be one of: {}", VALID_LOG_LEVELS.join(", "));
        }

        Ok(())
    }

    /// Merge with CLI arguments
    pub fn merge_with_cli_args(
        &mut self,
        socks4: Option<SocketAddr>,
        socks5: Option<SocketAddr>,
        disable_socks4: bool,
        disable_socks5: bool,
        no_auth: bool,
        log_level: Option<&str>,
    ) {
        if let Some(addr) = socks4 {
            self.server.socks4_bind_addr = Some(addr);
            tracing::info!("CLI override: SOCKS4 bind address set to {}", addr);
        }

        if let Some(addr) = socks5 {
            self.server.socks5_bind_addr = Some(addr);
            tracing::info!("CLI override: SOCKS5 bind address set to {}", addr);
        }

        if disable_socks4 {
            self.server.socks4_bind_addr = None;
            tracing::info!("CLI override: SOCKS4 listener disabled");
        }

        if disable_socks5 {
            self.server.socks5_bind_addr = None;
            tracing::info!("CLI override: SOCKS5 listener disabled");
        }

        if no_auth {
            self.auth.methods = vec![AuthMethodConfig::None];
            tracing::info!("CLI override: authentication disabled");
        }

        if let Some(level) = log_level {
            self.logging.level = level.to_string();
            tracing::info!("CLI override: log level set to {}", level);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::UserConfig;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert!(config.server.handshake_timeout.is_none());
        assert!(config.server.connect_timeout.is_none());
        assert_eq!(config.server.max_field_len, 255);
    }

    #[test]
    fn test_no_listeners_rejected() {
        let mut config = Config::default();
        config.server.socks4_bind_addr = None;
        config.server.socks5_bind_addr = None;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_shared_address_rejected() {
        let mut config = Config::default();
        config.server.socks5_bind_addr = config.server.socks4_bind_addr;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_auth_rules() {
        let mut config = Config::default();
        config.auth.methods = vec![AuthMethodConfig::UsernamePassword];
        assert!(config.validate().is_err());

        config.auth.users.push(UserConfig {
            username: "alice".to_string(),
            password: "secret".to_string(),
            enabled: true,
        });
        assert!(config.validate().is_ok());

        config.auth.methods.push(AuthMethodConfig::UsernamePassword);
        assert!(config.validate().is_err());

        config.auth.methods = vec![];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_limits() {
        let mut config = Config::default();
        config.server.buffer_size = 512;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.server.max_field_len = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.logging.level = "loud".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_cli_overrides() {
        let mut config = Config::default();
        config.auth.methods = vec![AuthMethodConfig::UsernamePassword];
        config.merge_with_cli_args(
            None,
            Some("0.0.0.0:9050".parse().unwrap()),
            true,
            false,
            true,
            Some("debug"),
        );
        assert!(config.server.socks4_bind_addr.is_none());
        assert_eq!(config.server.socks5_bind_addr, Some("0.0.0.0:9050".parse().unwrap()));
        assert_eq!(config.auth.methods, vec![AuthMethodConfig::None]);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_parse_helpers() {
        assert_eq!(parse_listener_addr("off").unwrap(), None);
        assert!(parse_listener_addr("not-an-addr").is_err());
        assert_eq!(
            parse_auth_method("username_password").unwrap(),
            AuthMethodConfig::UsernamePassword
        );
        assert!(parse_auth_method("gssapi").is_err());
    }
}
