//! socksd library
//!
//! A SOCKS4/4a and SOCKS5 proxy server: per-version handshake state machines,
//! pluggable SOCKS5 authentication and a bidirectional TCP relay, each
//! accepted connection served by its own task.

pub mod auth;
pub mod config;
pub mod connection;
pub mod error;
pub mod protocol;
pub mod relay;
pub mod shutdown;

pub use auth::{AuthRegistry, Authenticator};
pub use config::Config;
pub use connection::{ConnectionManager, Listener};
pub use error::{SocksError, SocksResult};
pub use relay::RelayEngine;
pub use shutdown::ShutdownCoordinator;

/// Common error type for the proxy server
pub type Result<T> = anyhow::Result<T>;
