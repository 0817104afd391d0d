//! Administrative operations against deployed contracts

pub mod client;
pub mod executor;
pub mod report;
pub mod transfer;

#[cfg(test)]
pub(crate) mod test_support;

pub use client::{ChainClient, Confirmation, EthersClient};
pub use executor::{OperationExecutor, OperationResult};
pub use report::{ConsoleReporter, FailureStage, OperationEvent, Reporter};
pub use transfer::{base_name, StepOutcome, TransferOrchestrator, TransferReport, TransferStep};
