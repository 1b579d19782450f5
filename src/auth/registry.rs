//! Ordered registry of configured authentication methods

use anyhow::{bail, Context};
use tracing::info;

use super::authenticator::Authenticator;
use super::store::UserStore;
use crate::config::{AuthConfig, AuthMethodConfig};
use crate::error::{SocksError, SocksResult};

/// Authentication methods offered by the SOCKS5 listener.
///
/// Built once at server construction and read-only afterwards, so it is
/// shared between connection tasks behind an `Arc` without locking.
#[derive(Debug, Clone, Default)]
pub struct AuthRegistry {
    methods: Vec<Authenticator>,
}

impl AuthRegistry {
    /// Build a registry; two methods with the same id are rejected
    pub fn new(methods: Vec<Authenticator>) -> SocksResult<Self> {
        for (i, method) in methods.iter().enumerate() {
            if methods[..i].iter().any(|m| m.method_id() == method.method_id()) {
                return Err(SocksError::DuplicateAuthMethod(method.method_id()));
            }
        }
        Ok(Self { methods })
    }

    /// Build the registry described by the auth configuration
    pub fn from_config(config: &AuthConfig) -> crate::Result<Self> {
        let mut methods = Vec::with_capacity(config.methods.len());
        for method in &config.methods {
            match method {
                AuthMethodConfig::None => methods.push(Authenticator::NoAuth),
                AuthMethodConfig::UsernamePassword => {
                    if config.users.is_empty() {
                        bail!("username_password authentication requires at least one user");
                    }
                    let store = UserStore::from_config(&config.users);
                    info!("Loaded {} users for username/password authentication", store.len());
                    methods.push(Authenticator::UsernamePassword(store.into_verifier()));
                }
            }
        }
        Self::new(methods).context("Invalid authentication method list")
    }

    /// Look up a configured method by id
    pub fn get(&self, method_id: u8) -> Option<&Authenticator> {
        self.methods.iter().find(|m| m.method_id() == method_id)
    }

    /// First method in the client's offer order that is configured here
    pub fn select(&self, offered: &[u8]) -> Option<&Authenticator> {
        offered.iter().find_map(|id| self.get(*id))
    }

    pub fn method_ids(&self) -> Vec<u8> {
        self.methods.iter().map(Authenticator::method_id).collect()
    }
}
