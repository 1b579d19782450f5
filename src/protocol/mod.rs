//! SOCKS Protocol Implementation
//!
//! Wire codec, reply frames and the per-version handshake state machines.

pub mod codec;
pub mod constants;
pub mod reply;
pub mod socks4;
pub mod socks5;
pub mod types;

use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::{SocksError, SocksResult};

pub use constants::*;
pub use reply::{Socks4Reply, Socks5Reply};
pub use socks4::Socks4Handler;
pub use socks5::Socks5Handler;
pub use types::*;

/// Handler for whichever protocol version a listener serves
#[derive(Debug, Clone)]
pub enum ProtocolHandler {
    Socks4(Socks4Handler),
    Socks5(Socks5Handler),
}

impl ProtocolHandler {
    pub fn version(&self) -> SocksVersion {
        match self {
            ProtocolHandler::Socks4(_) => SocksVersion::V4,
            ProtocolHandler::Socks5(_) => SocksVersion::V5,
        }
    }

    /// Serve one accepted connection
    pub async fn handle<S>(&self, stream: S, peer: SocketAddr) -> SocksResult<()>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        match self {
            ProtocolHandler::Socks4(handler) => handler.handle(stream, peer).await,
            ProtocolHandler::Socks5(handler) => handler.handle(stream, peer).await,
        }
    }
}

/// Bound a handshake step by the optional deadline
pub(crate) async fn with_deadline<F, T>(limit: Option<Duration>, fut: F) -> SocksResult<T>
where
    F: Future<Output = SocksResult<T>>,
{
    match limit {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| SocksError::HandshakeTimeout)?,
        None => fut.await,
    }
}
