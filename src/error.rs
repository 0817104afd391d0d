//! Error types for operator commands

use thiserror::Error;

/// Result type alias using our custom Error
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for vault operations
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unknown network: {0}")]
    UnknownNetwork(String),

    #[error("Network {0} has no RPC endpoint configured")]
    EmptyEndpoint(String),

    #[error("Missing named account '{account}' for network {network}")]
    MissingNamedAccount { network: String, account: String },

    // Credential errors
    #[error("No {role} credential available. {remedy}")]
    MissingCredential { role: String, remedy: String },

    #[error("Invalid private key: {0}")]
    InvalidKey(String),

    #[error("Credential I/O failed for {role}: {reason}")]
    CredentialIo { role: String, reason: String },

    // Contract resolution errors
    #[error("Cannot resolve contract '{name}' on {network}: {reason}")]
    Resolution {
        network: String,
        name: String,
        reason: String,
    },

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Cannot encode call: {0}")]
    Encoding(String),

    // Transaction errors
    #[error("RPC connection failed: {0}")]
    RpcConnection(String),

    #[error("Transaction submission failed: {0}")]
    Submission(String),

    #[error("Waiting for confirmation failed: {0}")]
    Confirmation(String),

    #[error("Transaction {0} reverted")]
    Reverted(String),

    // Local node errors
    #[error("Local node failed: {0}")]
    Node(String),
}

impl Error {
    /// Missing or unusable signing material
    pub fn is_credential_error(&self) -> bool {
        matches!(
            self,
            Error::MissingCredential { .. } | Error::InvalidKey(_) | Error::CredentialIo { .. }
        )
    }

    /// Unknown network / fork target, reported but not fatal
    pub fn is_resolution_error(&self) -> bool {
        matches!(
            self,
            Error::UnknownNetwork(_) | Error::EmptyEndpoint(_) | Error::Resolution { .. }
        )
    }
}
