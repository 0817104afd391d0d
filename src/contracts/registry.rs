//! Logical contract name to deployed address lookup
//!
//! Deployment records follow the hardhat-deploy layout:
//! `<root>/<network>/<name>.json` with a top-level `"address"` field.

use std::io::ErrorKind;
use std::path::PathBuf;

use ethers::types::Address;
use serde::Deserialize;
use tracing::debug;

use crate::error::{Error, Result};

use super::handle::{ContractHandle, ContractKind, ContractRef};

/// Maps logical contract names to deployed addresses per network
pub trait ContractResolver: Send + Sync {
    fn resolve(&self, network: &str, name: &str) -> Result<Address>;

    /// Handle for an address or logical name
    fn handle(&self, network: &str, reference: &ContractRef, kind: ContractKind) -> Result<ContractHandle> {
        match reference {
            ContractRef::Address(address) => Ok(ContractHandle::new(*address, kind)),
            ContractRef::Name(name) => {
                let address = self.resolve(network, name)?;
                Ok(ContractHandle::named(name.clone(), address, kind))
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct DeploymentRecord {
    address: String,
}

/// File-backed deployment registry
#[derive(Debug, Clone)]
pub struct DeploymentRegistry {
    root: PathBuf,
}

impl DeploymentRegistry {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn record_path(&self, network: &str, name: &str) -> PathBuf {
        self.root.join(network).join(format!("{}.json", name))
    }
}

impl ContractResolver for DeploymentRegistry {
    fn resolve(&self, network: &str, name: &str) -> Result<Address> {
        let path = self.record_path(network, name);
        let fail = |reason: String| Error::Resolution {
            network: network.to_string(),
            name: name.to_string(),
            reason,
        };

        debug!("Resolving {} on {} from {}", name, network, path.display());

        let content = std::fs::read_to_string(&path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => fail(format!("no deployment record at {}", path.display())),
            _ => fail(format!("cannot read {}: {}", path.display(), e)),
        })?;

        let record: DeploymentRecord = serde_json::from_str(&content)
            .map_err(|e| fail(format!("malformed {}: {}", path.display(), e)))?;

        record
            .address
            .parse()
            .map_err(|e| fail(format!("invalid address {}: {}", record.address, e)))
    }
}
