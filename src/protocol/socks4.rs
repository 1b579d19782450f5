//! SOCKS4 / SOCKS4a Protocol Handler

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::codec::{
    read_cstring, read_fixed_address, read_port, read_u8, write_frame, write_frame_best_effort,
};
use super::constants::SOCKS4_VERSION;
use super::reply::Socks4Reply;
use super::types::{
    Command, ConnectRequest, HandshakeSettings, RequestFrame, SocksVersion, TargetAddr,
};
use super::with_deadline;
use crate::error::{SocksError, SocksResult};
use crate::relay::{RelayEngine, RelaySession};

/// Serves SOCKS4 and SOCKS4a CONNECT requests
#[derive(Debug, Clone)]
pub struct Socks4Handler {
    relay: Arc<RelayEngine>,
    settings: HandshakeSettings,
}

impl Socks4Handler {
    pub fn new(relay: Arc<RelayEngine>, settings: HandshakeSettings) -> Self {
        Self { relay, settings }
    }

    /// Run one connection from handshake to the end of the relay
    pub async fn handle<S>(&self, mut stream: S, peer: SocketAddr) -> SocksResult<()>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        // The deadline covers reading the frame; name resolution is bounded by
        // the connect timeout instead
        let deadline = self.settings.timeout;
        let parsed = match with_deadline(deadline, self.read_frame(&mut stream)).await {
            Ok(frame) => frame.resolve(&self.relay).await,
            Err(e) => Err(e),
        };
        let request = match parsed {
            Ok(request) => request,
            Err(e) => {
                reject(&mut stream, &e).await;
                return Err(e);
            }
        };

        info!(
            "DO {} TO {} AUTH {}",
            request.command,
            request.target_display(),
            request.identifier.as_deref().unwrap_or("")
        );

        if request.command != Command::Connect {
            let err = SocksError::CommandNotSupported(request.command);
            reject(&mut stream, &err).await;
            return Err(err);
        }

        let target = match self.relay.connect(request.destination).await {
            Ok(target) => target,
            Err(source) => {
                let err = SocksError::DestinationUnreachable {
                    target: request.target_display(),
                    source,
                };
                reject(&mut stream, &err).await;
                return Err(err);
            }
        };

        write_frame(&mut stream, &Socks4Reply::Granted.encode()).await?;
        debug!("REPLY {}", Socks4Reply::Granted);

        let target_addr = target.peer_addr().unwrap_or(request.destination);
        let session = RelaySession::new(Uuid::new_v4().to_string(), peer, target_addr)
            .with_user(request.identifier.clone());
        self.relay.relay(Arc::new(session), stream, target).await?;
        Ok(())
    }

    /// Read and resolve a complete request frame
    pub async fn read_request<R>(&self, stream: &mut R) -> SocksResult<ConnectRequest>
    where
        R: AsyncRead + Unpin,
    {
        self.read_frame(stream).await?.resolve(&self.relay).await
    }

    /// Read a complete request frame without resolving its hostname
    pub async fn read_frame<R>(&self, stream: &mut R) -> SocksResult<RequestFrame>
    where
        R: AsyncRead + Unpin,
    {
        let version = read_u8(stream).await?;
        if version != SOCKS4_VERSION {
            return Err(SocksError::UnsupportedVersion {
                expected: SOCKS4_VERSION,
                found: version,
            });
        }

        let command_byte = read_u8(stream).await?;
        let command = Command::from_byte(command_byte)
            .ok_or(SocksError::UnsupportedCommand(command_byte))?;

        let port = read_port(stream).await?;
        let ip = read_fixed_address(stream, 4).await?;
        let identifier = read_cstring(stream, self.settings.max_field_len).await?;

        let target = if is_socks4a(ip) {
            TargetAddr::Domain(read_cstring(stream, self.settings.max_field_len).await?)
        } else {
            TargetAddr::Ip(ip)
        };

        Ok(RequestFrame {
            version: SocksVersion::V4,
            command,
            target,
            port,
            identifier: Some(identifier),
        })
    }
}

/// `0.0.0.x` signals that a hostname follows the user id
fn is_socks4a(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            let octets = v4.octets();
            octets[0] == 0 && octets[1] == 0 && octets[2] == 0
        }
        IpAddr::V6(_) => false,
    }
}

async fn reject<S>(stream: &mut S, error: &SocksError)
where
    S: AsyncWrite + Unpin,
{
    if let Some(reply) = Socks4Reply::for_error(error) {
        warn!("REPLY {} BECAUSE {}", reply, error);
        write_frame_best_effort(stream, &reply.encode()).await;
    }
}
