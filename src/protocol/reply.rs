//! Reply frames
//!
//! Both protocol versions answer with a fixed-size frame whose bound address
//! and port are always zero; clients ignore them for CONNECT.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr};

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::SocksError;
use crate::protocol::codec::{put_address, put_port};
use crate::protocol::constants::*;

/// SOCKS4 reply codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Socks4Reply {
    Granted,
    RejectedOrFailed,
}

impl Socks4Reply {
    pub fn code(self) -> u8 {
        match self {
            Socks4Reply::Granted => SOCKS4_REPLY_GRANTED,
            Socks4Reply::RejectedOrFailed => SOCKS4_REPLY_REJECTED,
        }
    }

    pub fn is_success(self) -> bool {
        self == Socks4Reply::Granted
    }

    /// Encode the 8-byte reply frame
    pub fn encode(self) -> Bytes {
        let mut buf = BytesMut::with_capacity(SOCKS4_REPLY_LEN);
        buf.put_u8(SOCKS4_REPLY_VERSION);
        buf.put_u8(self.code());
        put_port(&mut buf, 0);
        put_address(&mut buf, IpAddr::V4(Ipv4Addr::UNSPECIFIED));
        buf.freeze()
    }

    /// Negative reply owed to the client for a failed handshake, if any
    pub fn for_error(error: &SocksError) -> Option<Self> {
        match error {
            SocksError::UnsupportedVersion { .. }
            | SocksError::UnsupportedCommand(_)
            | SocksError::CommandNotSupported(_)
            | SocksError::UnsupportedAddressType(_)
            | SocksError::MalformedFrame(_)
            | SocksError::DestinationUnreachable { .. } => Some(Socks4Reply::RejectedOrFailed),
            _ => None,
        }
    }
}

impl fmt::Display for Socks4Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Socks4Reply::Granted => write!(f, "REQUEST_GRANTED"),
            Socks4Reply::RejectedOrFailed => write!(f, "REQUEST_REJECTED_OR_FAILED"),
        }
    }
}

/// SOCKS5 reply codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Socks5Reply {
    Granted,
    GeneralFailure,
    ConnectionNotAllowed,
    NetworkUnreachable,
    HostUnreachable,
    ConnectionRefused,
    TtlExpired,
    CommandNotSupported,
    AddressTypeNotSupported,
}

impl Socks5Reply {
    pub fn code(self) -> u8 {
        match self {
            Socks5Reply::Granted => SOCKS5_REPLY_SUCCESS,
            Socks5Reply::GeneralFailure => SOCKS5_REPLY_GENERAL_FAILURE,
            Socks5Reply::ConnectionNotAllowed => SOCKS5_REPLY_CONNECTION_NOT_ALLOWED,
            Socks5Reply::NetworkUnreachable => SOCKS5_REPLY_NETWORK_UNREACHABLE,
            Socks5Reply::HostUnreachable => SOCKS5_REPLY_HOST_UNREACHABLE,
            Socks5Reply::ConnectionRefused => SOCKS5_REPLY_CONNECTION_REFUSED,
            Socks5Reply::TtlExpired => SOCKS5_REPLY_TTL_EXPIRED,
            Socks5Reply::CommandNotSupported => SOCKS5_REPLY_COMMAND_NOT_SUPPORTED,
            Socks5Reply::AddressTypeNotSupported => SOCKS5_REPLY_ADDRESS_TYPE_NOT_SUPPORTED,
        }
    }

    pub fn is_success(self) -> bool {
        self == Socks5Reply::Granted
    }

    /// Encode the 10-byte reply frame.
    ///
    /// The address type is always IPv4 with a zero address and port, whatever
    /// the real destination was.
    pub fn encode(self) -> Bytes {
        let mut buf = BytesMut::with_capacity(SOCKS5_REPLY_LEN);
        buf.put_u8(SOCKS5_VERSION);
        buf.put_u8(self.code());
        buf.put_u8(SOCKS5_RESERVED);
        buf.put_u8(SOCKS5_ADDR_IPV4);
        put_address(&mut buf, IpAddr::V4(Ipv4Addr::UNSPECIFIED));
        put_port(&mut buf, 0);
        buf.freeze()
    }

    /// Negative reply owed to the client for a failed request, if any.
    ///
    /// Method negotiation and authentication failures are answered inline by
    /// the handler and map to `None` here.
    pub fn for_error(error: &SocksError) -> Option<Self> {
        match error {
            SocksError::UnsupportedVersion { .. }
            | SocksError::UnsupportedCommand(_)
            | SocksError::CommandNotSupported(_) => Some(Socks5Reply::CommandNotSupported),
            SocksError::UnsupportedAddressType(_) => Some(Socks5Reply::AddressTypeNotSupported),
            SocksError::DestinationUnreachable { .. } => Some(Socks5Reply::HostUnreachable),
            SocksError::MalformedFrame(_) => Some(Socks5Reply::GeneralFailure),
            _ => None,
        }
    }
}

impl fmt::Display for Socks5Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Socks5Reply::Granted => "REQUEST_GRANTED",
            Socks5Reply::GeneralFailure => "GENERAL_FAILURE",
            Socks5Reply::ConnectionNotAllowed => "CONNECTION_NOT_ALLOWED",
            Socks5Reply::NetworkUnreachable => "NETWORK_UNREACHABLE",
            Socks5Reply::HostUnreachable => "HOST_UNREACHABLE",
            Socks5Reply::ConnectionRefused => "CONNECTION_REFUSED",
            Socks5Reply::TtlExpired => "TTL_EXPIRED",
            Socks5Reply::CommandNotSupported => "COMMAND_NOT_SUPPORTED_OR_PROTOCOL_ERROR",
            Socks5Reply::AddressTypeNotSupported => "ADDRESS_TYPE_NOT_SUPPORTED",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::types::Command;
    use std::io;

    #[test]
    fn test_socks4_frames() {
        assert_eq!(&Socks4Reply::Granted.encode()[..], &[0x00, 0x5A, 0, 0, 0, 0, 0, 0]);
        assert_eq!(
            &Socks4Reply::RejectedOrFailed.encode()[..],
            &[0x00, 0x5B, 0, 0, 0, 0, 0, 0]
        );
        assert!(Socks4Reply::Granted.is_success());
        assert!(!Socks4Reply::RejectedOrFailed.is_success());
    }

    #[test]
    fn test_socks5_frames_are_ten_bytes() {
        for reply in [
            Socks5Reply::Granted,
            Socks5Reply::HostUnreachable,
            Socks5Reply::CommandNotSupported,
            Socks5Reply::AddressTypeNotSupported,
        ] {
            let frame = reply.encode();
            assert_eq!(frame.len(), SOCKS5_REPLY_LEN);
            assert_eq!(frame[0], 0x05);
            assert_eq!(frame[1], reply.code());
            assert_eq!(frame[3], 0x01);
            assert!(frame[4..].iter().all(|b| *b == 0));
        }
        assert_eq!(
            &Socks5Reply::Granted.encode()[..],
            &[0x05, 0x00, 0x00, 0x01, 0, 0, 0, 0, 0, 0]
        );
    }

    #[test]
    fn test_socks5_success_predicate() {
        assert!(Socks5Reply::Granted.is_success());
        assert!(!Socks5Reply::GeneralFailure.is_success());
        assert_eq!(Socks5Reply::AddressTypeNotSupported.code(), 0x08);
    }

    #[test]
    fn test_error_mapping() {
        let unreachable = SocksError::DestinationUnreachable {
            target: "127.0.0.1:1".to_string(),
            source: io::Error::from(io::ErrorKind::ConnectionRefused),
        };
        assert_eq!(Socks4Reply::for_error(&unreachable), Some(Socks4Reply::RejectedOrFailed));
        assert_eq!(Socks5Reply::for_error(&unreachable), Some(Socks5Reply::HostUnreachable));

        let bind = SocksError::CommandNotSupported(Command::Bind);
        assert_eq!(Socks4Reply::for_error(&bind), Some(Socks4Reply::RejectedOrFailed));
        assert_eq!(Socks5Reply::for_error(&bind), Some(Socks5Reply::CommandNotSupported));

        assert_eq!(
            Socks5Reply::for_error(&SocksError::UnsupportedAddressType(0x02)),
            Some(Socks5Reply::AddressTypeNotSupported)
        );

        assert_eq!(Socks4Reply::for_error(&SocksError::TruncatedStream), None);
        assert_eq!(Socks5Reply::for_error(&SocksError::TruncatedStream), None);
        assert_eq!(Socks5Reply::for_error(&SocksError::NoAcceptableMethod(vec![0])), None);
        assert_eq!(Socks5Reply::for_error(&SocksError::HandshakeTimeout), None);
    }
}
