//! SOCKS Protocol Constants

// Protocol versions
pub const SOCKS4_VERSION: u8 = 0x04;
pub const SOCKS5_VERSION: u8 = 0x05;

// SOCKS4 reply frames start with a null version byte
pub const SOCKS4_REPLY_VERSION: u8 = 0x00;

// Commands (shared by both versions)
pub const SOCKS_CMD_CONNECT: u8 = 0x01;
pub const SOCKS_CMD_BIND: u8 = 0x02;

// SOCKS5 address types
pub const SOCKS5_ADDR_IPV4: u8 = 0x01;
pub const SOCKS5_ADDR_DOMAIN: u8 = 0x03;
pub const SOCKS5_ADDR_IPV6: u8 = 0x04;

// SOCKS5 authentication methods
pub const SOCKS5_AUTH_NONE: u8 = 0x00;
pub const SOCKS5_AUTH_USERPASS: u8 = 0x02;
pub const SOCKS5_AUTH_UNSUPPORTED: u8 = 0xFF;

// SOCKS4 reply codes
pub const SOCKS4_REPLY_GRANTED: u8 = 0x5A;
pub const SOCKS4_REPLY_REJECTED: u8 = 0x5B;

// SOCKS5 reply codes
pub const SOCKS5_REPLY_SUCCESS: u8 = 0x00;
pub const SOCKS5_REPLY_GENERAL_FAILURE: u8 = 0x01;
pub const SOCKS5_REPLY_CONNECTION_NOT_ALLOWED: u8 = 0x02;
pub const SOCKS5_REPLY_NETWORK_UNREACHABLE: u8 = 0x03;
pub const SOCKS5_REPLY_HOST_UNREACHABLE: u8 = 0x04;
pub const SOCKS5_REPLY_CONNECTION_REFUSED: u8 = 0x05;
pub const SOCKS5_REPLY_TTL_EXPIRED: u8 = 0x06;
pub const SOCKS5_REPLY_COMMAND_NOT_SUPPORTED: u8 = 0x07;
pub const SOCKS5_REPLY_ADDRESS_TYPE_NOT_SUPPORTED: u8 = 0x08;

// Reserved field value
pub const SOCKS5_RESERVED: u8 = 0x00;

// Username/Password sub-negotiation status codes
pub const SOCKS5_USERPASS_SUCCESS: u8 = 0x00;
pub const SOCKS5_USERPASS_FAILURE: u8 = 0x01;

// Encoded reply sizes
pub const SOCKS4_REPLY_LEN: usize = 8;
pub const SOCKS5_REPLY_LEN: usize = 10;

/// Default cap on SOCKS4 null-terminated fields (user id, v4a hostname)
pub const DEFAULT_MAX_FIELD_LEN: usize = 255;
