//! Connection Manager Implementation

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::bail;
use tracing::info;

use super::listener::Listener;
use crate::auth::AuthRegistry;
use crate::config::Config;
use crate::protocol::{ProtocolHandler, Socks4Handler, Socks5Handler, SocksVersion};
use crate::relay::RelayEngine;
use crate::Result;

/// Owns one listener per enabled protocol version
pub struct ConnectionManager {
    config: Arc<Config>,
    relay: Arc<RelayEngine>,
    auth: Arc<AuthRegistry>,
    listeners: Vec<Listener>,
    connection_counters: Vec<Arc<AtomicUsize>>,
}

impl ConnectionManager {
    /// Create a manager whose authentication methods come from the config
    pub fn new(config: Arc<Config>) -> Result<Self> {
        let auth = AuthRegistry::from_config(&config.auth)?;
        Ok(Self::with_auth(config, auth))
    }

    /// Create a manager with an embedder-supplied method registry
    pub fn with_auth(config: Arc<Config>, auth: AuthRegistry) -> Self {
        let relay = Arc::new(RelayEngine::from_config(&config));
        Self {
            config,
            relay,
            auth: Arc::new(auth),
            listeners: Vec::new(),
            connection_counters: Vec::new(),
        }
    }

    /// Bind every enabled listener and start accepting
    pub async fn start(&mut self) -> Result<()> {
        if !self.listeners.is_empty() {
            bail!("Connection manager already started");
        }

        let settings = self.config.server.handshake_settings();

        if let Some(addr) = self.config.server.socks4_bind_addr {
            let handler = Socks4Handler::new(Arc::clone(&self.relay), settings);
            self.add_listener(Listener::start(addr, ProtocolHandler::Socks4(handler)).await?);
        }

        if let Some(addr) = self.config.server.socks5_bind_addr {
            let handler =
                Socks5Handler::new(Arc::clone(&self.relay), Arc::clone(&self.auth), settings);
            self.add_listener(Listener::start(addr, ProtocolHandler::Socks5(handler)).await?);
        }

        info!(
            "Started {} listener(s); SOCKS5 methods {:?}",
            self.listeners.len(),
            self.auth.method_ids()
        );
        Ok(())
    }

    fn add_listener(&mut self, listener: Listener) {
        self.connection_counters.push(listener.connection_counter());
        self.listeners.push(listener);
    }

    /// Address the listener for `version` is bound to, if it is running
    pub fn local_addr(&self, version: SocksVersion) -> Option<SocketAddr> {
        self.listeners
            .iter()
            .find(|l| l.version() == version)
            .map(Listener::local_addr)
    }

    /// Connections currently being handled, including those accepted by
    /// listeners that have since been closed
    pub fn active_connections(&self) -> usize {
        self.connection_counters
            .iter()
            .map(|counter| counter.load(Ordering::Relaxed))
            .sum()
    }

    pub fn is_running(&self) -> bool {
        self.listeners.iter().any(Listener::is_running)
    }

    /// Stop accepting on every listener
    pub async fn close(&mut self) {
        for listener in self.listeners.drain(..) {
            listener.close().await;
        }
    }
}
