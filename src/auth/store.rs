//! Built-in user table backing the username/password method

use std::collections::HashMap;
use std::sync::Arc;

use super::types::CredentialVerifier;
use crate::config::UserConfig;

#[derive(Debug, Clone)]
struct User {
    password: Vec<u8>,
    enabled: bool,
}

/// User store for managing user credentials
#[derive(Debug, Default)]
pub struct UserStore {
    users: HashMap<String, User>,
}

impl UserStore {
    /// Create a new empty user store
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a user to the store, replacing any previous entry
    pub fn add_user(&mut self, username: String, password: impl Into<Vec<u8>>, enabled: bool) {
        self.users.insert(
            username,
            User {
                password: password.into(),
                enabled,
            },
        );
    }

    /// Load users from configuration
    pub fn from_config(users: &[UserConfig]) -> Self {
        let mut store = Self::new();
        for user in users {
            store.add_user(user.username.clone(), user.password.as_bytes(), user.enabled);
        }
        store
    }

    /// Validate user credentials
    pub fn validate_credentials(&self, username: &str, password: &[u8]) -> bool {
        match self.users.get(username) {
            Some(user) => user.enabled && secure_compare(password, &user.password),
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    /// Turn the store into the predicate consumed by the authenticator
    pub fn into_verifier(self) -> CredentialVerifier {
        let store = Arc::new(self);
        Arc::new(move |username: &str, password: &[u8]| {
            store.validate_credentials(username, password)
        })
    }
}

/// Constant-time comparison for equal-length inputs
fn secure_compare(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (byte_a, byte_b) in a.iter().zip(b.iter()) {
        result |= byte_a ^ byte_b;
    }

    result == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secure_compare() {
        assert!(secure_compare(b"password123", b"password123"));
        assert!(!secure_compare(b"password123", b"password124"));
        assert!(!secure_compare(b"password123", b"password12"));
    }

    #[test]
    fn test_validate_credentials() {
        let mut store = UserStore::new();
        store.add_user("alice".to_string(), "secret", true);
        store.add_user("bob".to_string(), "secret", false);

        assert!(store.validate_credentials("alice", b"secret"));
        assert!(!store.validate_credentials("alice", b"Secret"));
        assert!(!store.validate_credentials("bob", b"secret"));
        assert!(!store.validate_credentials("carol", b"secret"));
    }

    #[test]
    fn test_from_config_and_verifier() {
        let users = vec![UserConfig {
            username: "alice".to_string(),
            password: "secret".to_string(),
            enabled: true,
        }];
        let store = UserStore::from_config(&users);
        assert_eq!(store.len(), 1);

        let verifier = store.into_verifier();
        assert!(verifier("alice", b"secret"));
        assert!(!verifier("alice", b"nope"));
    }
}
