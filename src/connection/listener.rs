//! TCP listener and accept loop

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::Context;
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::error::SocksError;
use crate::protocol::{ProtocolHandler, SocksVersion};
use crate::Result;

const LISTEN_BACKLOG: u32 = 1024;

/// A bound listening socket dispatching each connection to its own task.
///
/// Dropping or closing the listener stops the accept loop and releases the
/// socket. Connections already being served run until their peers close.
pub struct Listener {
    version: SocksVersion,
    local_addr: SocketAddr,
    running: Arc<AtomicBool>,
    shutdown_tx: broadcast::Sender<()>,
    active_connections: Arc<AtomicUsize>,
    accept_task: Option<JoinHandle<()>>,
}

impl Listener {
    /// Bind `addr` with address reuse enabled and start accepting
    pub async fn start(addr: SocketAddr, handler: ProtocolHandler) -> Result<Self> {
        let version = handler.version();
        let listener = bind(addr)
            .with_context(|| format!("Failed to bind {} listener to {}", version, addr))?;
        let local_addr = listener.local_addr()?;

        let running = Arc::new(AtomicBool::new(true));
        let active_connections = Arc::new(AtomicUsize::new(0));
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let accept_task = tokio::spawn(accept_loop(
            listener,
            Arc::new(handler),
            Arc::clone(&running),
            shutdown_rx,
            Arc::clone(&active_connections),
        ));

        info!("{} listener accepting on {}", version, local_addr);

        Ok(Self {
            version,
            local_addr,
            running,
            shutdown_tx,
            active_connections,
            accept_task: Some(accept_task),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn version(&self) -> SocksVersion {
        self.version
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Connections currently being handled
    pub fn active_connections(&self) -> usize {
        self.active_connections.load(Ordering::Relaxed)
    }

    /// Shared counter of in-flight connections; it outlives [`Listener::close`]
    pub fn connection_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.active_connections)
    }

    /// Stop accepting and wait for the accept loop to release the socket
    pub async fn close(mut self) {
        self.stop();
        if let Some(task) = self.accept_task.take() {
            if let Err(e) = task.await {
                if !e.is_cancelled() {
                    error!("{} accept loop failed: {}", self.version, e);
                }
            }
        }
        info!("{} listener on {} closed", self.version, self.local_addr);
    }

    fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        let _ = self.shutdown_tx.send(());
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        self.stop();
    }
}

fn bind(addr: SocketAddr) -> std::io::Result<TcpListener> {
    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()?
    } else {
        TcpSocket::new_v6()?
    };
    socket.set_reuseaddr(true)?;
    socket.bind(addr)?;
    socket.listen(LISTEN_BACKLOG)
}

async fn accept_loop(
    listener: TcpListener,
    handler: Arc<ProtocolHandler>,
    running: Arc<AtomicBool>,
    mut shutdown_rx: broadcast::Receiver<()>,
    active_connections: Arc<AtomicUsize>,
) {
    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    if !running.load(Ordering::SeqCst) {
                        break;
                    }
                    spawn_connection(
                        stream,
                        peer,
                        Arc::clone(&handler),
                        Arc::clone(&active_connections),
                    );
                }
                Err(e) => {
                    if !running.load(Ordering::SeqCst) {
                        break;
                    }
                    error!("Error accepting connection: {}", e);
                }
            },
            _ = shutdown_rx.recv() => break,
        }
    }
    debug!("{} accept loop stopped", handler.version());
}

fn spawn_connection(
    stream: TcpStream,
    peer: SocketAddr,
    handler: Arc<ProtocolHandler>,
    active_connections: Arc<AtomicUsize>,
) {
    let span = info_span!(
        "connection",
        id = %Uuid::new_v4(),
        peer = %peer,
        version = %handler.version()
    );
    let guard = ActiveGuard::new(active_connections);

    tokio::spawn(
        async move {
            let _guard = guard;
            debug!("Accepted connection");
            if let Err(e) = stream.set_nodelay(true) {
                debug!("Failed to set TCP_NODELAY: {}", e);
            }
            match handler.handle(stream, peer).await {
                Ok(()) => debug!("Connection closed"),
                Err(e) => log_outcome(&e),
            }
        }
        .instrument(span),
    );
}

fn log_outcome(error: &SocksError) {
    match error {
        e if e.is_disconnect() => debug!("Peer disconnected: {}", e),
        SocksError::Relay(_) | SocksError::Io(_) | SocksError::HandshakeTimeout => {
            warn!("Connection failed: {}", error)
        }
        e => debug!("Connection ended: {}", e),
    }
}

/// Counts a connection as active for as long as it is held
struct ActiveGuard(Arc<AtomicUsize>);

impl ActiveGuard {
    fn new(counter: Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::Relaxed);
        Self(counter)
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }
}
