//! Error types for socksd
//!
//! Protocol handling reports failures through [`SocksError`]. Every variant is
//! contained to the connection that produced it; the listener only logs them.

use std::io;
use thiserror::Error;

use crate::protocol::types::Command;

/// Result alias for protocol and relay operations
pub type SocksResult<T> = std::result::Result<T, SocksError>;

/// Errors raised while serving a single SOCKS connection
#[derive(Error, Debug)]
pub enum SocksError {
    /// The version byte did not match the protocol being served
    #[error("invalid version: expected {expected:#04x}, found {found:#04x}")]
    UnsupportedVersion { expected: u8, found: u8 },

    /// Command byte outside the known command set
    #[error("invalid command: {0:#04x}")]
    UnsupportedCommand(u8),

    /// A known command this server does not serve
    #[error("command not supported: {0}")]
    CommandNotSupported(Command),

    /// Address type byte outside IPv4 / domain / IPv6
    #[error("invalid address type: {0:#04x}")]
    UnsupportedAddressType(u8),

    /// None of the offered authentication methods is configured
    #[error("no acceptable authentication method among {0:?}")]
    NoAcceptableMethod(Vec<u8>),

    /// The credential predicate rejected the client
    #[error("authentication failed for '{identifier}'")]
    AuthenticationFailed { identifier: String },

    /// The peer closed the connection in the middle of a field
    #[error("stream ended in the middle of a frame")]
    TruncatedStream,

    /// The peer sent a frame that cannot be decoded
    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    /// DNS resolution or the TCP connect to the destination failed
    #[error("destination {target} unreachable: {source}")]
    DestinationUnreachable {
        target: String,
        #[source]
        source: io::Error,
    },

    /// The configured handshake deadline elapsed
    #[error("handshake timed out")]
    HandshakeTimeout,

    /// A relay copy failed for a reason other than peer closure
    #[error("relay failed: {0}")]
    Relay(#[source] io::Error),

    /// Two configured authenticators share the same method id
    #[error("authentication method {0:#04x} configured more than once")]
    DuplicateAuthMethod(u8),

    /// Any other transport error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl SocksError {
    /// Whether the peer broke the wire protocol (answered with a negative reply)
    pub fn is_protocol_violation(&self) -> bool {
        matches!(
            self,
            SocksError::UnsupportedVersion { .. }
                | SocksError::UnsupportedCommand(_)
                | SocksError::CommandNotSupported(_)
                | SocksError::UnsupportedAddressType(_)
                | SocksError::NoAcceptableMethod(_)
        )
    }

    /// Whether the error only reflects the peer going away
    pub fn is_disconnect(&self) -> bool {
        match self {
            SocksError::TruncatedStream => true,
            SocksError::Io(e) => is_closed_condition(e),
            _ => false,
        }
    }

    /// Convert a read error, mapping a premature EOF to [`SocksError::TruncatedStream`]
    pub fn from_read(error: io::Error) -> Self {
        if error.kind() == io::ErrorKind::UnexpectedEof {
            SocksError::TruncatedStream
        } else {
            SocksError::Io(error)
        }
    }
}

/// Whether an IO error means the connection was closed rather than failed
pub fn is_closed_condition(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        io::ErrorKind::BrokenPipe
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::NotConnected
            | io::ErrorKind::UnexpectedEof
    )
}
