//! Authentication Types

use std::fmt;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::{SocksError, SocksResult};

/// External predicate deciding whether an identifier/secret pair is valid
pub type CredentialVerifier = Arc<dyn Fn(&str, &[u8]) -> bool + Send + Sync>;

/// Outcome of one authentication sub-negotiation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthResult {
    pub success: bool,
    /// Version byte echoed back in the status reply
    pub version: u8,
    /// Identifier the client presented, when the method carries one
    pub identifier: Option<String>,
}

impl AuthResult {
    pub fn new(success: bool, version: u8) -> Self {
        Self {
            success,
            version,
            identifier: None,
        }
    }

    pub fn with_identifier(mut self, identifier: String) -> Self {
        self.identifier = Some(identifier);
        self
    }
}

/// Password bytes that are zeroed when scrubbed and again when dropped
pub struct SecretBytes(Vec<u8>);

impl SecretBytes {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Read a length-prefixed secret straight into a scrubbed buffer
    pub async fn read_from<R>(reader: &mut R) -> SocksResult<Self>
    where
        R: AsyncRead + Unpin,
    {
        let len = reader.read_u8().await.map_err(SocksError::from_read)? as usize;
        let mut secret = Self(vec![0u8; len]);
        reader
            .read_exact(&mut secret.0)
            .await
            .map_err(SocksError::from_read)?;
        Ok(secret)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Overwrite every byte with zero, keeping the length
    pub fn scrub(&mut self) {
        self.0.fill(0);
        std::hint::black_box(&self.0);
    }
}

impl Drop for SecretBytes {
    fn drop(&mut self) {
        self.scrub();
    }
}

impl fmt::Debug for SecretBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretBytes([REDACTED; {}])", self.0.len())
    }
}

struct ScrubGuard<'a>(&'a mut SecretBytes);

impl Drop for ScrubGuard<'_> {
    fn drop(&mut self) {
        self.0.scrub();
    }
}

/// Run the verifier and zero the secret afterwards, even if the verifier panics
pub fn verify_and_scrub(
    verifier: &CredentialVerifier,
    identifier: &str,
    secret: &mut SecretBytes,
) -> bool {
    let guard = ScrubGuard(secret);
    verifier(identifier, guard.0.as_bytes())
}
