//! Contract handles and administrative actions

use std::fmt;
use std::str::FromStr;

use ethers::abi::token::{LenientTokenizer, Tokenizer};
use ethers::abi::{AbiParser, ParamType};
use ethers::core::abi::AbiEncode;
use ethers::types::{Address, Bytes};
use ethers::utils::to_checksum;

use crate::error::{Error, Result};

use super::bindings::{strategy, vault};

/// Which administrative surface a contract exposes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContractKind {
    Vault,
    Strategy,
    /// Raw address with no known surface; every action is allowed
    Unknown,
}

impl fmt::Display for ContractKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContractKind::Vault => write!(f, "vault"),
            ContractKind::Strategy => write!(f, "strategy"),
            ContractKind::Unknown => write!(f, "contract"),
        }
    }
}

/// A state-changing call the executor may submit
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminAction {
    /// Emergency withdraw and halt
    Panic,
    Pause,
    Unpause,
    Harvest,
    TransferOwnership(Address),
    /// Arbitrary function given by human-readable signature
    Call { signature: String, args: Vec<String> },
}

impl AdminAction {
    /// Solidity function name, for reporting
    pub fn name(&self) -> String {
        match self {
            AdminAction::Panic => "panic".to_string(),
            AdminAction::Pause => "pause".to_string(),
            AdminAction::Unpause => "unpause".to_string(),
            AdminAction::Harvest => "harvest".to_string(),
            AdminAction::TransferOwnership(_) => "transferOwnership".to_string(),
            AdminAction::Call { signature, .. } => signature
                .trim()
                .trim_start_matches("function ")
                .split('(')
                .next()
                .unwrap_or_default()
                .trim()
                .to_string(),
        }
    }

    fn encode(&self, kind: ContractKind) -> Result<Bytes> {
        let data = match (self, kind) {
            (AdminAction::Panic, _) => strategy::PanicCall.encode(),
            (AdminAction::Pause, _) => strategy::PauseCall.encode(),
            (AdminAction::Unpause, _) => strategy::UnpauseCall.encode(),
            (AdminAction::Harvest, _) => strategy::HarvestCall.encode(),
            (AdminAction::TransferOwnership(new_owner), ContractKind::Vault) => {
                vault::TransferOwnershipCall {
                    new_owner: *new_owner,
                }
                .encode()
            }
            (AdminAction::TransferOwnership(new_owner), _) => strategy::TransferOwnershipCall {
                new_owner: *new_owner,
            }
            .encode(),
            (AdminAction::Call { signature, args }, _) => encode_signature(signature, args)?,
        };
        Ok(Bytes::from(data))
    }
}

impl fmt::Display for AdminAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AdminAction::TransferOwnership(owner) => {
                write!(f, "transferOwnership({})", to_checksum(owner, None))
            }
            AdminAction::Call { signature, args } => {
                write!(f, "{} [{}]", signature, args.join(", "))
            }
            other => write!(f, "{}()", other.name()),
        }
    }
}

fn encode_signature(signature: &str, args: &[String]) -> Result<Vec<u8>> {
    let trimmed = signature.trim();
    let normalized = if trimmed.starts_with("function ") {
        trimmed.to_string()
    } else {
        format!("function {}", trimmed)
    };

    let function = AbiParser::default()
        .parse_function(&normalized)
        .map_err(|e| Error::Encoding(format!("{}: {}", signature, e)))?;

    if function.inputs.len() != args.len() {
        return Err(Error::Encoding(format!(
            "{} takes {} argument(s), got {}",
            function.name,
            function.inputs.len(),
            args.len()
        )));
    }

    let tokens = function
        .inputs
        .iter()
        .zip(args)
        .map(|(param, arg)| {
            let arg = match param.kind {
                ParamType::Address | ParamType::Bytes | ParamType::FixedBytes(_) => {
                    arg.trim().trim_start_matches("0x")
                }
                _ => arg.trim(),
            };
            LenientTokenizer::tokenize(&param.kind, arg)
                .map_err(|e| Error::Encoding(format!("argument {}: {}", param.name, e)))
        })
        .collect::<Result<Vec<_>>>()?;

    function
        .encode_input(&tokens)
        .map_err(|e| Error::Encoding(e.to_string()))
}

/// Resolved address plus the actions it may be asked to perform
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractHandle {
    /// Logical deployment name, when resolved by name
    pub name: Option<String>,
    pub address: Address,
    pub kind: ContractKind,
}

impl ContractHandle {
    pub fn new(address: Address, kind: ContractKind) -> Self {
        Self {
            name: None,
            address,
            kind,
        }
    }

    pub fn named(name: impl Into<String>, address: Address, kind: ContractKind) -> Self {
        Self {
            name: Some(name.into()),
            address,
            kind,
        }
    }

    /// Whether this contract exposes `action`
    pub fn supports(&self, action: &AdminAction) -> bool {
        match self.kind {
            ContractKind::Strategy | ContractKind::Unknown => true,
            ContractKind::Vault => matches!(
                action,
                AdminAction::TransferOwnership(_) | AdminAction::Call { .. }
            ),
        }
    }

    /// Calldata for `action` against this contract
    pub fn calldata(&self, action: &AdminAction) -> Result<Bytes> {
        if !self.supports(action) {
            return Err(Error::Encoding(format!(
                "{} does not expose {}",
                self.kind,
                action.name()
            )));
        }
        action.encode(self.kind)
    }

    /// `name (0x..)` or just the checksummed address
    pub fn label(&self) -> String {
        let address = to_checksum(&self.address, None);
        match &self.name {
            Some(name) => format!("{} ({})", name, address),
            None => address,
        }
    }
}

/// A contract given on the command line: address or logical name
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContractRef {
    Address(Address),
    Name(String),
}

impl ContractRef {
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(Error::InvalidAddress("empty contract reference".to_string()));
        }
        if raw.starts_with("0x") || raw.starts_with("0X") {
            return Address::from_str(raw)
                .map(ContractRef::Address)
                .map_err(|e| Error::InvalidAddress(format!("{}: {}", raw, e)));
        }
        Ok(ContractRef::Name(raw.to_string()))
    }
}

impl fmt::Display for ContractRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContractRef::Address(address) => write!(f, "{}", to_checksum(address, None)),
            ContractRef::Name(name) => write!(f, "{}", name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::utils::id;

    fn selector(signature: &str) -> Vec<u8> {
        id(signature).to_vec()
    }

    #[test]
    fn test_fixed_actions_encode_selectors() {
        let handle = ContractHandle::new(Address::zero(), ContractKind::Strategy);
        assert_eq!(
            handle.calldata(&AdminAction::Panic).unwrap().to_vec(),
            selector("panic()")
        );
        assert_eq!(
            handle.calldata(&AdminAction::Harvest).unwrap().to_vec(),
            selector("harvest()")
        );
        assert_eq!(
            handle.calldata(&AdminAction::Unpause).unwrap().to_vec(),
            selector("unpause()")
        );
        assert_eq!(
            handle.calldata(&AdminAction::Pause).unwrap().to_vec(),
            selector("pause()")
        );
    }

    #[test]
    fn test_transfer_ownership_encodes_owner() {
        let owner = Address::from_low_u64_be(0xbeef);
        let handle = ContractHandle::new(Address::zero(), ContractKind::Vault);
        let data = handle
            .calldata(&AdminAction::TransferOwnership(owner))
            .unwrap();

        assert_eq!(data.len(), 4 + 32);
        assert_eq!(&data[..4], &selector("transferOwnership(address)")[..]);
        assert_eq!(&data[16..], owner.as_bytes());
    }

    #[test]
    fn test_vault_rejects_strategy_actions() {
        let handle = ContractHandle::new(Address::zero(), ContractKind::Vault);
        assert!(!handle.supports(&AdminAction::Panic));
        assert!(matches!(
            handle.calldata(&AdminAction::Harvest),
            Err(Error::Encoding(_))
        ));
    }

    #[test]
    fn test_generic_call_matches_typed_encoding() {
        let owner = Address::from_low_u64_be(7);
        let handle = ContractHandle::new(Address::zero(), ContractKind::Unknown);

        let generic = handle
            .calldata(&AdminAction::Call {
                signature: "transferOwnership(address)".to_string(),
                args: vec![format!("{:?}", owner)],
            })
            .unwrap();
        let typed = handle
            .calldata(&AdminAction::TransferOwnership(owner))
            .unwrap();

        assert_eq!(generic, typed);
    }

    #[test]
    fn test_generic_call_checks_arity() {
        let handle = ContractHandle::new(Address::zero(), ContractKind::Unknown);
        let err = handle
            .calldata(&AdminAction::Call {
                signature: "setWithdrawalFee(uint256)".to_string(),
                args: vec![],
            })
            .unwrap_err();
        assert!(err.to_string().contains("takes 1 argument"));
    }

    #[test]
    fn test_action_names() {
        assert_eq!(AdminAction::Panic.name(), "panic");
        assert_eq!(
            AdminAction::Call {
                signature: "function setKeeper(address)".to_string(),
                args: vec![],
            }
            .name(),
            "setKeeper"
        );
    }

    #[test]
    fn test_contract_ref_parse() {
        assert_eq!(
            ContractRef::parse("0x0000000000000000000000000000000000000001").unwrap(),
            ContractRef::Address(Address::from_low_u64_be(1))
        );
        assert_eq!(
            ContractRef::parse("cake-strat").unwrap(),
            ContractRef::Name("cake-strat".to_string())
        );
        assert!(ContractRef::parse("0x12").is_err());
        assert!(ContractRef::parse("  ").is_err());
    }
}
