//! Graceful Shutdown Handling
//!
//! Waits for SIGTERM/SIGINT, then stops every listener. Relays already in
//! flight are given until the shutdown timeout to finish on their own.

use std::time::{Duration, Instant};

use tokio::signal;
use tracing::{debug, info, warn};

use crate::connection::ConnectionManager;
use crate::Result;

/// Shutdown coordinator that manages graceful shutdown process
pub struct ShutdownCoordinator {
    timeout: Duration,
}

impl ShutdownCoordinator {
    /// Create a new shutdown coordinator
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Resolve once SIGTERM, SIGINT or Ctrl+C arrives
    pub async fn listen_for_signals(&self) -> Result<()> {
        info!("Starting shutdown signal listener");

        #[cfg(unix)]
        {
            let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;
            let mut sigint = signal::unix::signal(signal::unix::SignalKind::interrupt())?;

            tokio::select! {
                _ = sigterm.recv() => {
                    info!("Received SIGTERM, initiating graceful shutdown");
                }
                _ = sigint.recv() => {
                    info!("Received SIGINT, initiating graceful shutdown");
                }
                _ = signal::ctrl_c() => {
                    info!("Received Ctrl+C, initiating graceful shutdown");
                }
            }
        }

        #[cfg(not(unix))]
        {
            signal::ctrl_c().await?;
            info!("Received Ctrl+C, initiating graceful shutdown");
        }

        Ok(())
    }

    /// Close every listener, then wait up to the timeout for active connections
    pub async fn shutdown(&self, manager: &mut ConnectionManager) -> Result<()> {
        let start_time = Instant::now();

        if tokio::time::timeout(self.timeout, manager.close()).await.is_err() {
            warn!("Listeners did not close within {:?}", self.timeout);
        }

        let mut last_count = manager.active_connections();
        info!(
            "Waiting for {} active connections to close (timeout: {:?})",
            last_count, self.timeout
        );

        while last_count > 0 && start_time.elapsed() < self.timeout {
            tokio::time::sleep(Duration::from_millis(100)).await;

            let current_count = manager.active_connections();
            if current_count != last_count {
                debug!("Active connections: {} -> {}", last_count, current_count);
                last_count = current_count;
            }
        }

        let elapsed = start_time.elapsed();
        if last_count == 0 {
            info!("All connections closed gracefully in {:?}", elapsed);
        } else {
            warn!(
                "Shutdown timeout reached after {:?} with {} connections still active",
                elapsed, last_count
            );
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::protocol::SocksVersion;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_shutdown_closes_listeners() {
        let mut config = Config::default();
        config.server.socks4_bind_addr = Some("127.0.0.1:0".parse().unwrap());
        config.server.socks5_bind_addr = None;

        let mut manager = ConnectionManager::new(Arc::new(config)).unwrap();
        manager.start().await.unwrap();
        let addr = manager.local_addr(SocksVersion::V4).unwrap();
        assert!(manager.is_running());

        let coordinator = ShutdownCoordinator::new(Duration::from_secs(1));
        coordinator.shutdown(&mut manager).await.unwrap();

        assert!(!manager.is_running());
        assert!(manager.local_addr(SocksVersion::V4).is_none());
        assert!(tokio::net::TcpStream::connect(addr).await.is_err());
    }
}
