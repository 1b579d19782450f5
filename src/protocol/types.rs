//! SOCKS Protocol Types

use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use crate::error::{SocksError, SocksResult};
use crate::protocol::constants::*;
use crate::relay::RelayEngine;

/// Protocol version served by a handler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SocksVersion {
    V4,
    V5,
}

impl SocksVersion {
    /// Version byte on the wire
    pub fn byte(self) -> u8 {
        match self {
            SocksVersion::V4 => SOCKS4_VERSION,
            SocksVersion::V5 => SOCKS5_VERSION,
        }
    }
}

impl fmt::Display for SocksVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SocksVersion::V4 => write!(f, "socks4"),
            SocksVersion::V5 => write!(f, "socks5"),
        }
    }
}

/// Commands a client may request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Connect,
    Bind,
}

impl Command {
    /// Map a command byte; anything outside CONNECT/BIND is unmapped
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            SOCKS_CMD_CONNECT => Some(Command::Connect),
            SOCKS_CMD_BIND => Some(Command::Bind),
            _ => None,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Connect => write!(f, "CONNECT"),
            Command::Bind => write!(f, "BIND"),
        }
    }
}

/// How the destination was encoded in the request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressType {
    Ipv4,
    DomainName,
    Ipv6,
}

impl AddressType {
    /// Map a SOCKS5 ATYP byte
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            SOCKS5_ADDR_IPV4 => Some(AddressType::Ipv4),
            SOCKS5_ADDR_DOMAIN => Some(AddressType::DomainName),
            SOCKS5_ADDR_IPV6 => Some(AddressType::Ipv6),
            _ => None,
        }
    }
}

/// Destination exactly as the client encoded it
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetAddr {
    Ip(IpAddr),
    Domain(String),
}

impl TargetAddr {
    pub fn address_type(&self) -> AddressType {
        match self {
            TargetAddr::Ip(IpAddr::V4(_)) => AddressType::Ipv4,
            TargetAddr::Ip(IpAddr::V6(_)) => AddressType::Ipv6,
            TargetAddr::Domain(_) => AddressType::DomainName,
        }
    }
}

/// A request frame read off the wire, before any name resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestFrame {
    pub version: SocksVersion,
    pub command: Command,
    pub target: TargetAddr,
    pub port: u16,
    pub identifier: Option<String>,
}

impl RequestFrame {
    /// Resolve a hostname target; literal addresses are used as-is.
    ///
    /// A failed lookup is reported as [`SocksError::DestinationUnreachable`].
    pub async fn resolve(self, relay: &RelayEngine) -> SocksResult<ConnectRequest> {
        let address_type = self.target.address_type();
        let (destination, hostname) = match self.target {
            TargetAddr::Ip(ip) => (SocketAddr::new(ip, self.port), None),
            TargetAddr::Domain(host) => {
                let resolved = relay.resolve(&host, self.port).await.map_err(|source| {
                    SocksError::DestinationUnreachable {
                        target: format!("{}:{}", host, self.port),
                        source,
                    }
                })?;
                (resolved, Some(host))
            }
        };

        Ok(ConnectRequest {
            version: self.version,
            command: self.command,
            address_type,
            destination,
            hostname,
            identifier: self.identifier,
        })
    }
}

/// A fully parsed and resolved CONNECT/BIND request.
///
/// Built once per accepted connection after the handshake has been read in
/// full; the relay engine only ever sees it immutably.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectRequest {
    pub version: SocksVersion,
    pub command: Command,
    pub address_type: AddressType,
    /// Resolved destination socket address
    pub destination: SocketAddr,
    /// Hostname as sent by the client, when the request named one
    pub hostname: Option<String>,
    /// SOCKS4 user id, logged but never verified
    pub identifier: Option<String>,
}

impl ConnectRequest {
    /// Destination as the client expressed it, for logging
    pub fn target_display(&self) -> String {
        match &self.hostname {
            Some(host) => format!("{}:{} ({})", host, self.destination.port(), self.destination),
            None => self.destination.to_string(),
        }
    }
}

/// Per-handshake limits shared by both protocol handlers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandshakeSettings {
    /// Deadline for reading the request; `None` waits indefinitely
    pub timeout: Option<Duration>,
    /// Longest null-terminated field accepted before the frame is malformed
    pub max_field_len: usize,
}

impl Default for HandshakeSettings {
    fn default() -> Self {
        Self {
            timeout: None,
            max_field_len: DEFAULT_MAX_FIELD_LEN,
        }
    }
}
