//! Credential roles and signing identity resolution

use std::fmt;
use std::str::FromStr;

use ethers::signers::{LocalWallet, Signer};
use ethers::types::Address;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{parse_address, SigningSource};
use crate::error::{Error, Result};

use super::store::CredentialStore;

/// Credential role managed by the store
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
    clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Primary identity used for administrative calls
    #[default]
    Deployer,

    /// Secondary identity
    Other,
}

impl Role {
    pub const ALL: [Role; 2] = [Role::Deployer, Role::Other];

    /// File name inside the credentials directory
    pub fn file_name(&self) -> &'static str {
        match self {
            Role::Deployer => "deployer.key",
            Role::Other => "other.key",
        }
    }

    /// Environment variable that overrides the file
    pub fn default_env_var(&self) -> &'static str {
        match self {
            Role::Deployer => "DEPLOYER_PK",
            Role::Other => "OTHER_PK",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Deployer => write!(f, "deployer"),
            Role::Other => write!(f, "other"),
        }
    }
}

impl FromStr for Role {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "deployer" => Ok(Role::Deployer),
            "other" => Ok(Role::Other),
            _ => Err(Error::Config(format!(
                "Unknown credential role: {}. Use: deployer, other",
                s
            ))),
        }
    }
}

/// Identity that authorizes submitted transactions
#[derive(Debug, Clone)]
pub enum SigningIdentity {
    /// Key held by this process
    Local(LocalWallet),

    /// Account managed by the node; transactions carry only `from`
    Remote(Address),
}

impl SigningIdentity {
    /// Parse explicit key material (hex, optional 0x prefix)
    pub fn from_key(key: &str) -> Result<Self> {
        let wallet = parse_wallet(key)?;
        Ok(SigningIdentity::Local(wallet))
    }

    /// Address transactions are sent from
    pub fn address(&self) -> Address {
        match self {
            SigningIdentity::Local(wallet) => wallet.address(),
            SigningIdentity::Remote(address) => *address,
        }
    }

    /// Pick the identity for one invocation.
    ///
    /// An explicit key wins, then an explicit role, then the network's
    /// configured signing source.
    pub fn resolve(
        source: &SigningSource,
        store: &CredentialStore,
        override_key: Option<&str>,
        override_role: Option<Role>,
    ) -> Result<Self> {
        if let Some(key) = override_key {
            debug!("Using externally supplied signing key");
            return Self::from_key(key);
        }

        if let Some(role) = override_role {
            return Self::from_store(store, role);
        }

        match source {
            SigningSource::Key { key } => Self::from_key(key),
            SigningSource::Remote { address } => Ok(SigningIdentity::Remote(parse_address(address)?)),
            SigningSource::Persisted { role } => Self::from_store(store, *role),
        }
    }

    fn from_store(store: &CredentialStore, role: Role) -> Result<Self> {
        match store.load(role)? {
            Some(credential) => {
                debug!("Using {} credential from {}", role, credential.source);
                Ok(SigningIdentity::Local(credential.wallet))
            }
            None => {
                let generate = format!(
                    "run `vault-ops generate-accounts` to create {}",
                    store.path(role).display()
                );
                let remedy = match store.env_var(role) {
                    Some(var) => format!("Set {} or {}", var, generate),
                    None => format!("Please {}", generate),
                };
                Err(Error::MissingCredential {
                    role: role.to_string(),
                    remedy,
                })
            }
        }
    }
}

/// Parse a private key into a wallet
pub(crate) fn parse_wallet(key: &str) -> Result<LocalWallet> {
    let trimmed = key.trim();
    if trimmed.is_empty() {
        return Err(Error::InvalidKey("empty key".to_string()));
    }
    // Never echo the key itself
    trimmed
        .parse::<LocalWallet>()
        .map_err(|e| Error::InvalidKey(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const KEY: &str = "0x4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318";

    #[test]
    fn test_role_roundtrip_names() {
        assert_eq!("deployer".parse::<Role>().unwrap(), Role::Deployer);
        assert_eq!(" Other ".parse::<Role>().unwrap(), Role::Other);
        assert!("keeper".parse::<Role>().is_err());
        assert_ne!(Role::Deployer.file_name(), Role::Other.file_name());
    }

    #[test]
    fn test_from_key_accepts_prefix_and_bare_hex() {
        let a = SigningIdentity::from_key(KEY).unwrap();
        let b = SigningIdentity::from_key(KEY.trim_start_matches("0x")).unwrap();
        assert_eq!(a.address(), b.address());
        assert!(SigningIdentity::from_key("zz").is_err());
        assert!(SigningIdentity::from_key("").is_err());
    }

    #[test]
    fn test_override_key_wins() {
        let dir = tempdir().unwrap();
        let store = CredentialStore::new(dir.path());
        let source = SigningSource::Remote {
            address: "0x0000000000000000000000000000000000000009".to_string(),
        };
        let identity = SigningIdentity::resolve(&source, &store, Some(KEY), None).unwrap();
        assert!(matches!(identity, SigningIdentity::Local(_)));
    }

    #[test]
    fn test_remote_source() {
        let dir = tempdir().unwrap();
        let store = CredentialStore::new(dir.path());
        let source = SigningSource::Remote {
            address: "0x0000000000000000000000000000000000000009".to_string(),
        };
        let identity = SigningIdentity::resolve(&source, &store, None, None).unwrap();
        assert_eq!(identity.address(), Address::from_low_u64_be(9));
    }

    #[test]
    fn test_missing_persisted_credential_is_actionable() {
        let dir = tempdir().unwrap();
        let store = CredentialStore::new(dir.path());
        let err = SigningIdentity::resolve(&SigningSource::default(), &store, None, None)
            .unwrap_err();
        assert!(err.is_credential_error());
        let msg = err.to_string();
        assert!(msg.contains("deployer"));
        assert!(msg.contains("generate-accounts"));
    }

    #[test]
    fn test_persisted_credential_after_generate() {
        let dir = tempdir().unwrap();
        let store = CredentialStore::new(dir.path());
        let generated = store.generate(Role::Other).unwrap();

        let identity =
            SigningIdentity::resolve(&SigningSource::default(), &store, None, Some(Role::Other))
                .unwrap();
        assert_eq!(Some(identity.address()), generated.address());
    }
}
