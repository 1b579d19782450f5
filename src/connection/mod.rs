//! Connection Management Module
//!
//! Handles TCP connection acceptance, management, and lifecycle.

pub mod listener;
pub mod manager;

pub use listener::Listener;
pub use manager::ConnectionManager;
