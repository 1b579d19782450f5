//! SOCKS5 authentication methods

use std::fmt;

use tokio::io::AsyncRead;
use tracing::debug;

use super::types::{verify_and_scrub, AuthResult, CredentialVerifier, SecretBytes};
use crate::error::SocksResult;
use crate::protocol::codec::{read_byte_string, read_u8};
use crate::protocol::constants::{SOCKS5_AUTH_NONE, SOCKS5_AUTH_USERPASS, SOCKS5_VERSION};

/// A configured authentication method
#[derive(Clone)]
pub enum Authenticator {
    /// Method 0x00, always succeeds without further I/O
    NoAuth,
    /// Method 0x02, RFC 1929 username/password sub-negotiation
    UsernamePassword(CredentialVerifier),
}

impl Authenticator {
    pub fn method_id(&self) -> u8 {
        match self {
            Authenticator::NoAuth => SOCKS5_AUTH_NONE,
            Authenticator::UsernamePassword(_) => SOCKS5_AUTH_USERPASS,
        }
    }

    /// Run the method's sub-negotiation on the client stream.
    ///
    /// Only I/O and framing errors are returned as `Err`; rejected credentials
    /// are reported through [`AuthResult::success`].
    pub async fn negotiate<S>(&self, stream: &mut S) -> SocksResult<AuthResult>
    where
        S: AsyncRead + Unpin,
    {
        match self {
            Authenticator::NoAuth => Ok(AuthResult::new(true, SOCKS5_VERSION)),
            Authenticator::UsernamePassword(verifier) => {
                let version = read_u8(stream).await?;
                let identifier = String::from_utf8_lossy(&read_byte_string(stream).await?).into_owned();
                let mut secret = SecretBytes::read_from(stream).await?;

                let success = verify_and_scrub(verifier, &identifier, &mut secret);
                debug!("Credential check for '{}': {}", identifier, success);

                Ok(AuthResult::new(success, version).with_identifier(identifier))
            }
        }
    }
}

impl fmt::Debug for Authenticator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Authenticator::NoAuth => write!(f, "NoAuth"),
            Authenticator::UsernamePassword(_) => write!(f, "UsernamePassword(..)"),
        }
    }
}
