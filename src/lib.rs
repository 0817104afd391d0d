//! Vault Ops Library
//!
//! Operator tooling for vault and strategy contracts deployed across
//! several EVM networks: network and fork resolution, credential
//! persistence, and administrative transactions with confirmation.

pub mod cli;
pub mod config;
pub mod contracts;
pub mod credentials;
pub mod error;
pub mod network;
pub mod ops;

// Re-export commonly used types
pub use config::Config;
pub use error::{Error, Result};
