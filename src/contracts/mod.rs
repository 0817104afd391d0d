//! Deployed contract access
//!
//! Logical names (`cake-vault`, `cake-strat`) resolve to addresses through a
//! [`ContractResolver`]; the resulting [`ContractHandle`] knows which
//! administrative actions it can encode.

pub mod bindings;
pub mod handle;
pub mod registry;

pub use handle::{AdminAction, ContractHandle, ContractKind, ContractRef};
pub use registry::{ContractResolver, DeploymentRegistry};

/// Logical name of the vault deployment for `base`
pub fn vault_name(base: &str) -> String {
    format!("{}-vault", base)
}

/// Logical name of the strategy paired with the vault for `base`
pub fn strategy_name(base: &str) -> String {
    format!("{}-strat", base)
}
