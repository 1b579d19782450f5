//! SOCKS5 Protocol Handler

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::codec::{
    read_byte_string, read_fixed_address, read_port, read_u8, write_frame, write_frame_best_effort,
};
use super::constants::*;
use super::reply::Socks5Reply;
use super::types::{
    AddressType, Command, ConnectRequest, HandshakeSettings, RequestFrame, SocksVersion,
    TargetAddr,
};
use super::with_deadline;
use crate::auth::{AuthRegistry, AuthResult, Authenticator};
use crate::error::{SocksError, SocksResult};
use crate::relay::{RelayEngine, RelaySession};

/// Serves SOCKS5 method negotiation and CONNECT requests
#[derive(Debug, Clone)]
pub struct Socks5Handler {
    relay: Arc<RelayEngine>,
    auth: Arc<AuthRegistry>,
    settings: HandshakeSettings,
}

impl Socks5Handler {
    pub fn new(
        relay: Arc<RelayEngine>,
        auth: Arc<AuthRegistry>,
        settings: HandshakeSettings,
    ) -> Self {
        Self {
            relay,
            auth,
            settings,
        }
    }

    /// Run one connection from handshake to the end of the relay
    pub async fn handle<S>(&self, mut stream: S, peer: SocketAddr) -> SocksResult<()>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        // The deadline covers negotiation and the request frame; name
        // resolution is bounded by the connect timeout instead
        let deadline = self.settings.timeout;
        let parsed = match with_deadline(deadline, self.read_handshake(&mut stream)).await {
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

        match &request.identifier {
            Some(id) => info!("DO {} TO {} AUTH {}", request.command, request.target_display(), id),
            None => info!("DO {} TO {}", request.command, request.target_display()),
        }

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

        write_frame(&mut stream, &Socks5Reply::Granted.encode()).await?;
        debug!("REPLY {}", Socks5Reply::Granted);

        let target_addr = target.peer_addr().unwrap_or(request.destination);
        let session = RelaySession::new(Uuid::new_v4().to_string(), peer, target_addr)
            .with_user(request.identifier.clone());
        self.relay.relay(Arc::new(session), stream, target).await?;
        Ok(())
    }

    /// Method negotiation, authentication and the request frame.
    ///
    /// Negotiation and authentication replies are written here; negative
    /// replies to the request frame are left to the caller.
    pub async fn handshake<S>(&self, stream: &mut S) -> SocksResult<ConnectRequest>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        self.read_handshake(stream).await?.resolve(&self.relay).await
    }

    async fn read_handshake<S>(&self, stream: &mut S) -> SocksResult<RequestFrame>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let auth = self.negotiate(stream).await?;
        let mut frame = self.read_frame(stream).await?;
        frame.identifier = auth.identifier;
        Ok(frame)
    }

    /// Select a method from the client's offer and run its sub-negotiation
    pub async fn negotiate<S>(&self, stream: &mut S) -> SocksResult<AuthResult>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        expect_version(read_u8(stream).await?)?;

        let offered = read_byte_string(stream).await?;
        let method = match self.auth.select(&offered) {
            Some(method) => method,
            None => {
                warn!(
                    "No acceptable authentication method among {:?} (configured {:?})",
                    offered,
                    self.auth.method_ids()
                );
                write_frame_best_effort(stream, &[SOCKS5_VERSION, SOCKS5_AUTH_UNSUPPORTED]).await;
                return Err(SocksError::NoAcceptableMethod(offered));
            }
        };

        write_frame(stream, &[SOCKS5_VERSION, method.method_id()]).await?;
        debug!("Selected authentication method {:#04x}", method.method_id());

        if let Authenticator::NoAuth = method {
            return method.negotiate(stream).await;
        }

        let result = method.negotiate(stream).await?;
        if result.success {
            write_frame(stream, &[result.version, SOCKS5_USERPASS_SUCCESS]).await?;
            Ok(result)
        } else {
            write_frame_best_effort(stream, &[result.version, SOCKS5_USERPASS_FAILURE]).await;
            Err(SocksError::AuthenticationFailed {
                identifier: result.identifier.unwrap_or_default(),
            })
        }
    }

    /// Read and resolve the request frame that follows negotiation
    pub async fn read_request<R>(&self, stream: &mut R) -> SocksResult<ConnectRequest>
    where
        R: AsyncRead + Unpin,
    {
        self.read_frame(stream).await?.resolve(&self.relay).await
    }

    /// Read the request frame without resolving a domain name target
    pub async fn read_frame<R>(&self, stream: &mut R) -> SocksResult<RequestFrame>
    where
        R: AsyncRead + Unpin,
    {
        expect_version(read_u8(stream).await?)?;

        let command_byte = read_u8(stream).await?;
        let command = Command::from_byte(command_byte)
            .ok_or(SocksError::UnsupportedCommand(command_byte))?;
        let _reserved = read_u8(stream).await?;

        let atyp = read_u8(stream).await?;
        let target = match AddressType::from_byte(atyp) {
            Some(AddressType::Ipv4) => TargetAddr::Ip(read_fixed_address(stream, 4).await?),
            Some(AddressType::Ipv6) => TargetAddr::Ip(read_fixed_address(stream, 16).await?),
            Some(AddressType::DomainName) => TargetAddr::Domain(
                String::from_utf8_lossy(&read_byte_string(stream).await?).into_owned(),
            ),
            None => return Err(SocksError::UnsupportedAddressType(atyp)),
        };
        let port = read_port(stream).await?;

        Ok(RequestFrame {
            version: SocksVersion::V5,
            command,
            target,
            port,
            identifier: None,
        })
    }
}

fn expect_version(found: u8) -> SocksResult<()> {
    if found == SOCKS5_VERSION {
        Ok(())
    } else {
        Err(SocksError::UnsupportedVersion {
            expected: SOCKS5_VERSION,
            found,
        })
    }
}

async fn reject<S>(stream: &mut S, error: &SocksError)
where
    S: AsyncWrite + Unpin,
{
    if let Some(reply) = Socks5Reply::for_error(error) {
        warn!("REPLY {} BECAUSE {}", reply, error);
        write_frame_best_effort(stream, &reply.encode()).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::CredentialVerifier;
    use std::time::Duration;
    use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt};
    use tokio_test::io::Builder;

    fn handler(methods: Vec<Authenticator>) -> Socks5Handler {
        Socks5Handler::new(
            Arc::new(RelayEngine::new()),
            Arc::new(AuthRegistry::new(methods).unwrap()),
            HandshakeSettings::default(),
        )
    }

    fn userpass() -> Authenticator {
        let verifier: CredentialVerifier =
            Arc::new(|id: &str, secret: &[u8]| id == "alice" && secret == b"pw");
        Authenticator::UsernamePassword(verifier)
    }

    #[tokio::test]
    async fn test_no_auth_handshake() {
        let mut stream = Builder::new()
            .read(&[0x05, 0x01, 0x00])
            .write(&[0x05, 0x00])
            .read(&[0x05, 0x01, 0x00, 0x01, 127, 0, 0, 1, 0x04, 0xD2])
            .build();
        let request = handler(vec![Authenticator::NoAuth])
            .handshake(&mut stream)
            .await
            .unwrap();
        assert_eq!(request.version, SocksVersion::V5);
        assert_eq!(request.command, Command::Connect);
        assert_eq!(request.destination, "127.0.0.1:1234".parse().unwrap());
        assert!(request.identifier.is_none());
    }

    #[tokio::test]
    async fn test_no_acceptable_method() {
        let mut stream = Builder::new()
            .read(&[0x05, 0x01, 0x00])
            .write(&[0x05, 0xFF])
            .build();
        let err = handler(vec![userpass()])
            .handshake(&mut stream)
            .await
            .unwrap_err();
        assert!(matches!(err, SocksError::NoAcceptableMethod(ref m) if m == &[0x00]));
    }

    #[tokio::test]
    async fn test_empty_method_list() {
        let mut stream = Builder::new()
            .read(&[0x05, 0x00])
            .write(&[0x05, 0xFF])
            .build();
        assert!(handler(vec![Authenticator::NoAuth])
            .negotiate(&mut stream)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_first_offered_method_wins() {
        let mut stream = Builder::new()
            .read(&[0x05, 0x02, 0x02, 0x00])
            .write(&[0x05, 0x02])
            .read(&[0x01, 5, b'a', b'l', b'i', b'c', b'e', 2, b'p', b'w'])
            .write(&[0x01, 0x00])
            .build();
        let result = handler(vec![Authenticator::NoAuth, userpass()])
            .negotiate(&mut stream)
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(result.identifier.as_deref(), Some("alice"));
    }

    #[tokio::test]
    async fn test_authentication_failure() {
        let mut stream = Builder::new()
            .read(&[0x05, 0x01, 0x02])
            .write(&[0x05, 0x02])
            .read(&[0x01, 5, b'a', b'l', b'i', b'c', b'e', 2, b'n', b'o'])
            .write(&[0x01, 0x01])
            .build();
        let err = handler(vec![userpass()])
            .handshake(&mut stream)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SocksError::AuthenticationFailed { ref identifier } if identifier == "alice"
        ));
    }

    #[tokio::test]
    async fn test_request_ipv6_and_domain() {
        let h = handler(vec![Authenticator::NoAuth]);

        let mut frame = vec![0x05, 0x01, 0x00, 0x04];
        frame.extend_from_slice(&[0u8; 15]);
        frame.push(1);
        frame.extend_from_slice(&[0x00, 0x50]);
        let mut stream = Builder::new().read(&frame).build();
        let request = h.read_request(&mut stream).await.unwrap();
        assert_eq!(request.address_type, AddressType::Ipv6);
        assert_eq!(request.destination, "[::1]:80".parse().unwrap());

        let mut frame = vec![0x05, 0x01, 0x00, 0x03, 9];
        frame.extend_from_slice(b"127.0.0.1");
        frame.extend_from_slice(&[0x1F, 0x90]);
        let mut stream = Builder::new().read(&frame).build();
        let request = h.read_request(&mut stream).await.unwrap();
        assert_eq!(request.address_type, AddressType::DomainName);
        assert_eq!(request.hostname.as_deref(), Some("127.0.0.1"));
        assert_eq!(request.destination, "127.0.0.1:8080".parse().unwrap());
    }

    #[tokio::test]
    async fn test_request_errors() {
        let h = handler(vec![Authenticator::NoAuth]);

        let mut stream = Builder::new().read(&[0x04]).build();
        assert!(matches!(
            h.read_request(&mut stream).await.unwrap_err(),
            SocksError::UnsupportedVersion { expected: 5, found: 4 }
        ));

        let mut stream = Builder::new().read(&[0x05, 0x03]).build();
        assert!(matches!(
            h.read_request(&mut stream).await.unwrap_err(),
            SocksError::UnsupportedCommand(0x03)
        ));

        let mut stream = Builder::new().read(&[0x05, 0x01, 0x00, 0x02]).build();
        assert!(matches!(
            h.read_request(&mut stream).await.unwrap_err(),
            SocksError::UnsupportedAddressType(0x02)
        ));
    }

    #[tokio::test]
    async fn test_handle_replies_address_type_not_supported() {
        let (mut client, server) = duplex(64);
        let peer = "127.0.0.1:40000".parse().unwrap();
        let h = handler(vec![Authenticator::NoAuth]);
        let task = tokio::spawn(async move { h.handle(server, peer).await });

        client.write_all(&[0x05, 0x01, 0x00]).await.unwrap();
        let mut selection = [0u8; 2];
        client.read_exact(&mut selection).await.unwrap();
        assert_eq!(selection, [0x05, 0x00]);

        client.write_all(&[0x05, 0x01, 0x00, 0x09]).await.unwrap();
        let mut reply = [0u8; 10];
        client.read_exact(&mut reply).await.unwrap();
        assert_eq!(reply, [0x05, 0x08, 0x00, 0x01, 0, 0, 0, 0, 0, 0]);

        assert!(task.await.unwrap().is_err());
    }

    #[tokio::test]
    async fn test_domain_lookup_not_bounded_by_handshake_deadline() {
        let settings = HandshakeSettings {
            timeout: Some(Duration::ZERO),
            ..HandshakeSettings::default()
        };
        let h = Socks5Handler::new(
            Arc::new(RelayEngine::new()),
            Arc::new(AuthRegistry::new(vec![Authenticator::NoAuth]).unwrap()),
            settings,
        );
        let closed = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = closed.local_addr().unwrap().port();
        drop(closed);

        let (mut client, server) = duplex(64);
        let mut frames = vec![0x05, 0x01, 0x00, 0x05, 0x01, 0x00, 0x03, 9];
        frames.extend_from_slice(b"localhost");
        frames.extend_from_slice(&port.to_be_bytes());
        client.write_all(&frames).await.unwrap();

        let peer = "127.0.0.1:40000".parse().unwrap();
        let task = tokio::spawn(async move { h.handle(server, peer).await });

        let mut selection = [0u8; 2];
        client.read_exact(&mut selection).await.unwrap();
        assert_eq!(selection, [0x05, 0x00]);
        let mut reply = [0u8; 10];
        client.read_exact(&mut reply).await.unwrap();
        assert_eq!(reply, [0x05, 0x04, 0x00, 0x01, 0, 0, 0, 0, 0, 0]);
        assert!(matches!(
            task.await.unwrap().unwrap_err(),
            SocksError::DestinationUnreachable { .. }
        ));
    }

    #[test]
    fn test_read_frame_keeps_domain() {
        let h = handler(vec![Authenticator::NoAuth]);
        let mut frame = vec![0x05, 0x01, 0x00, 0x03, 7];
        frame.extend_from_slice(b"a.local");
        frame.extend_from_slice(&[0x01, 0xBB]);
        let mut stream = std::io::Cursor::new(frame);
        let parsed = tokio_test::block_on(h.read_frame(&mut stream)).unwrap();
        assert_eq!(parsed.target, TargetAddr::Domain("a.local".to_string()));
        assert_eq!(parsed.port, 443);
    }

    #[tokio::test]
    async fn test_handle_wrong_version_replies_command_not_supported() {
        let (mut client, server) = duplex(64);
        let peer = "127.0.0.1:40000".parse().unwrap();
        let h = handler(vec![Authenticator::NoAuth]);
        let task = tokio::spawn(async move { h.handle(server, peer).await });

        client.write_all(&[0x04]).await.unwrap();
        let mut reply = [0u8; 10];
        client.read_exact(&mut reply).await.unwrap();
        assert_eq!(reply[1], 0x07);

        assert!(task.await.unwrap().is_err());
    }
}
