//! Authentication Module
//!
//! SOCKS5 method negotiation: the method variants, the registry of configured
//! methods and the built-in user table.

pub mod authenticator;
pub mod registry;
pub mod store;
pub mod types;

pub use authenticator::Authenticator;
pub use registry::AuthRegistry;
pub use store::UserStore;
pub use types::{verify_and_scrub, AuthResult, CredentialVerifier, SecretBytes};
