//! Shared helpers for the integration tests
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;

use socksd::config::{AuthMethodConfig, UserConfig};
use socksd::{Config, ConnectionManager};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{sleep, timeout, Duration, Instant};

pub const IO_TIMEOUT: Duration = Duration::from_secs(5);

/// Both listeners on ephemeral loopback ports, no authentication
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.server.socks4_bind_addr = Some("127.0.0.1:0".parse().unwrap());
    config.server.socks5_bind_addr = Some("127.0.0.1:0".parse().unwrap());
    config
}

/// Config whose SOCKS5 listener only offers username/password for alice/secret
pub fn userpass_config() -> Config {
    let mut config = test_config();
    config.auth.methods = vec![AuthMethodConfig::UsernamePassword];
    config.auth.users = vec![UserConfig {
        username: "alice".to_string(),
        password: "secret".to_string(),
        enabled: true,
    }];
    config
}

pub async fn start_proxy(config: Config) -> ConnectionManager {
    let mut manager = ConnectionManager::new(Arc::new(config)).unwrap();
    manager.start().await.unwrap();
    manager
}

/// Poll until the manager reports `expected` in-flight connections
pub async fn wait_for_active(manager: &ConnectionManager, expected: usize) {
    let deadline = Instant::now() + IO_TIMEOUT;
    while manager.active_connections() != expected {
        assert!(Instant::now() < deadline, "expected {} active connections", expected);
        sleep(Duration::from_millis(10)).await;
    }
}

/// Accept one client and hold it without reading or writing
pub async fn spawn_idle_server() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        if let Ok((stream, _)) = listener.accept().await {
            sleep(Duration::from_secs(30)).await;
            drop(stream);
        }
    });
    addr
}

/// Echo every byte back until the peer closes
pub async fn spawn_echo_server() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        loop {
            let Ok((mut stream, _)) = listener.accept().await else {
                break;
            };
            tokio::spawn(async move {
                let (mut reader, mut writer) = stream.split();
                let _ = tokio::io::copy(&mut reader, &mut writer).await;
            });
        }
    });
    addr
}

/// Send `payload` to the first client, then close
pub async fn spawn_one_shot_server(payload: &'static [u8]) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        if let Ok((mut stream, _)) = listener.accept().await {
            let _ = stream.write_all(payload).await;
            let _ = stream.shutdown().await;
        }
    });
    addr
}

/// An address nothing is listening on
pub async fn closed_port() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}

pub async fn read_exact<const N: usize>(stream: &mut TcpStream) -> [u8; N] {
    let mut buf = [0u8; N];
    timeout(IO_TIMEOUT, stream.read_exact(&mut buf))
        .await
        .expect("read timed out")
        .expect("read failed");
    buf
}

/// Read until the proxy closes the connection
pub async fn read_to_end(stream: &mut TcpStream) -> Vec<u8> {
    let mut buf = Vec::new();
    timeout(IO_TIMEOUT, stream.read_to_end(&mut buf))
        .await
        .expect("read timed out")
        .expect("read failed");
    buf
}

/// SOCKS5 CONNECT frame for an IPv4 destination
pub fn socks5_connect_frame(addr: SocketAddr) -> Vec<u8> {
    let SocketAddr::V4(v4) = addr else {
        panic!("IPv4 destination expected");
    };
    let mut frame = vec![0x05, 0x01, 0x00, 0x01];
    frame.extend_from_slice(&v4.ip().octets());
    frame.extend_from_slice(&v4.port().to_be_bytes());
    frame
}

/// SOCKS4 CONNECT frame for an IPv4 destination with the given user id
pub fn socks4_connect_frame(addr: SocketAddr, user_id: &[u8]) -> Vec<u8> {
    let SocketAddr::V4(v4) = addr else {
        panic!("IPv4 destination expected");
    };
    let mut frame = vec![0x04, 0x01];
    frame.extend_from_slice(&v4.port().to_be_bytes());
    frame.extend_from_slice(&v4.ip().octets());
    frame.extend_from_slice(user_id);
    frame.push(0);
    frame
}
