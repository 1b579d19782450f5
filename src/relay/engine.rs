//! Relay Engine
//!
//! Opens destination sockets and pumps bytes both ways between a client and
//! its destination. The destination-to-client pump runs in its own task; the
//! client-to-destination pump runs in the caller's task. The first pump to
//! finish flushes and shuts down its writer, then the other pump is stopped
//! and both streams are closed.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{lookup_host, TcpStream};
use tokio::time::timeout;
use tracing::{debug, warn};

use super::session::{ConnectionStats, Direction, RelaySession};
use crate::config::Config;
use crate::error::{is_closed_condition, SocksError, SocksResult};

/// Default copy buffer per direction
pub const DEFAULT_BUFFER_SIZE: usize = 8192;

/// Handles data relay between client and target connections
#[derive(Debug, Clone)]
pub struct RelayEngine {
    connect_timeout: Option<Duration>,
    buffer_size: usize,
}

impl Default for RelayEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl RelayEngine {
    /// Create a relay engine without a connect timeout
    pub fn new() -> Self {
        Self {
            connect_timeout: None,
            buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }

    pub fn with_connect_timeout(mut self, connect_timeout: Option<Duration>) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size.max(1);
        self
    }

    /// Create a new relay engine from configuration
    pub fn from_config(config: &Config) -> Self {
        Self::new()
            .with_connect_timeout(config.server.connect_timeout)
            .with_buffer_size(config.server.buffer_size)
    }

    /// Resolve a hostname to the first address the system resolver returns
    pub async fn resolve(&self, host: &str, port: u16) -> io::Result<SocketAddr> {
        debug!("Resolving {}:{}", host, port);
        let lookup = async {
            lookup_host((host, port)).await?.next().ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("no addresses found for {}", host),
                )
            })
        };
        self.bounded(lookup, "DNS resolution").await
    }

    /// Open a fresh TCP connection to the destination
    pub async fn connect(&self, addr: SocketAddr) -> io::Result<TcpStream> {
        debug!("Connecting to destination {}", addr);
        let stream = self.bounded(TcpStream::connect(addr), "connect").await?;
        if let Err(e) = stream.set_nodelay(true) {
            debug!("Failed to set TCP_NODELAY on {}: {}", addr, e);
        }
        Ok(stream)
    }

    async fn bounded<F, T>(&self, fut: F, what: &str) -> io::Result<T>
    where
        F: std::future::Future<Output = io::Result<T>>,
    {
        match self.connect_timeout {
            Some(limit) => timeout(limit, fut).await.map_err(|_| {
                io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("{} timed out after {:?}", what, limit),
                )
            })?,
            None => fut.await,
        }
    }

    /// Relay until either side reaches end-of-stream, then report the totals.
    ///
    /// Peer closures (EOF, reset, broken pipe) end a direction normally. The
    /// bytes already read in that direction are delivered before its writer is
    /// shut down; the opposite direction is then cancelled without waiting for
    /// its peer. Both streams are dropped, and therefore closed, before this
    /// returns.
    pub async fn relay<C, T>(
        &self,
        session: Arc<RelaySession>,
        client: C,
        target: T,
    ) -> SocksResult<ConnectionStats>
    where
        C: AsyncRead + AsyncWrite + Send + 'static,
        T: AsyncRead + AsyncWrite + Send + 'static,
    {
        debug!("Starting bidirectional relay for session {}", session.session_id);

        let (client_read, client_write) = tokio::io::split(client);
        let (target_read, target_write) = tokio::io::split(target);

        let mut downstream = tokio::spawn(pump(
            target_read,
            client_write,
            self.buffer_size,
            Arc::clone(&session),
            Direction::Downstream,
        ));
        let upstream = pump(
            client_read,
            target_write,
            self.buffer_size,
            Arc::clone(&session),
            Direction::Upstream,
        );
        tokio::pin!(upstream);

        let result = tokio::select! {
            up = &mut upstream => {
                debug!("Client side finished first, stopping downstream pump");
                downstream.abort();
                let down = join_pump((&mut downstream).await);
                up.map(|_| ()).and(down)
            }
            down = &mut downstream => {
                debug!("Destination side finished first, stopping upstream pump");
                join_pump(down)
            }
        };

        match result {
            Ok(()) => {
                session.log_stats();
                Ok(session.to_stats())
            }
            Err(e) => {
                warn!("Relay session {} failed: {}", session.session_id, e);
                Err(SocksError::Relay(e))
            }
        }
    }
}

fn join_pump(joined: Result<io::Result<u64>, tokio::task::JoinError>) -> io::Result<()> {
    match joined {
        Ok(result) => result.map(|_| ()),
        Err(e) if e.is_cancelled() => {
            debug!("Relay task cancelled");
            Ok(())
        }
        Err(e) => Err(io::Error::new(io::ErrorKind::Other, e)),
    }
}

/// Copy one direction until EOF, then half-close the writer
async fn pump<R, W>(
    mut reader: R,
    mut writer: W,
    buffer_size: usize,
    session: Arc<RelaySession>,
    direction: Direction,
) -> io::Result<u64>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; buffer_size];
    let mut total = 0u64;

    loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if is_closed_condition(&e) => break,
            Err(e) => return Err(e),
        };

        match writer.write_all(&buf[..n]).await {
            Ok(()) => {}
            Err(e) if is_closed_condition(&e) => break,
            Err(e) => return Err(e),
        }

        total += n as u64;
        session.add_bytes(direction, n as u64);
    }

    if let Err(e) = writer.shutdown().await {
        debug!("{:?} shutdown after EOF: {}", direction, e);
    }
    debug!("{:?} finished after {} bytes", direction, total);
    Ok(total)
}
