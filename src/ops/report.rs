//! Operator-facing progress reporting

use std::fmt;

use ethers::types::{TxHash, U256};
use tracing::{error, info, warn};

/// Where an operation stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureStage {
    /// Contract name could not be mapped to an address
    Resolution,
    /// Call could not be encoded for the target
    Encoding,
    /// Node rejected the transaction or signing failed
    Submission,
    /// Transaction was broadcast but did not confirm successfully
    Confirmation,
}

impl fmt::Display for FailureStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureStage::Resolution => write!(f, "resolution"),
            FailureStage::Encoding => write!(f, "encoding"),
            FailureStage::Submission => write!(f, "submission"),
            FailureStage::Confirmation => write!(f, "confirmation"),
        }
    }
}

/// Progress of a command, in the order it happened
#[derive(Debug, Clone, PartialEq)]
pub enum OperationEvent {
    Submitted {
        target: String,
        action: String,
        tx: TxHash,
        explorer_url: Option<String>,
    },
    Confirmed {
        target: String,
        action: String,
        tx: TxHash,
        block_number: Option<u64>,
        gas_used: Option<U256>,
    },
    Failed {
        target: String,
        action: String,
        stage: FailureStage,
        error: String,
    },
    Skipped {
        target: String,
        action: String,
        reason: String,
    },
    Done {
        operation: String,
        succeeded: usize,
        failed: usize,
        skipped: usize,
    },
}

/// Sink for operation progress
pub trait Reporter: Send + Sync {
    fn report(&self, event: &OperationEvent);
}

/// Prints progress for the operator and mirrors it into the log
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleReporter;

impl Reporter for ConsoleReporter {
    fn report(&self, event: &OperationEvent) {
        match event {
            OperationEvent::Submitted {
                target,
                action,
                tx,
                explorer_url,
            } => {
                info!("{} on {} submitted: {:?}", action, target, tx);
                println!("{} on {}: tx {:?}", action, target, tx);
                if let Some(url) = explorer_url {
                    println!("  View on explorer: {}", url);
                }
                println!("  Waiting for confirmation...");
            }
            OperationEvent::Confirmed {
                target,
                action,
                tx,
                block_number,
                gas_used,
            } => {
                info!("{} on {} confirmed: {:?}", action, target, tx);
                let block = block_number
                    .map(|block| format!(" in block {}", block))
                    .unwrap_or_default();
                let gas = gas_used
                    .map(|gas| format!(" (gas used: {})", gas))
                    .unwrap_or_default();
                println!("  Confirmed{}{}", block, gas);
            }
            OperationEvent::Failed {
                target,
                action,
                stage,
                error,
            } => {
                error!("{} on {} failed at {}: {}", action, target, stage, error);
                println!("{} on {} FAILED ({}): {}", action, target, stage, error);
            }
            OperationEvent::Skipped {
                target,
                action,
                reason,
            } => {
                warn!("{} on {} skipped: {}", action, target, reason);
                println!("{} on {} skipped: {}", action, target, reason);
            }
            OperationEvent::Done {
                operation,
                succeeded,
                failed,
                skipped,
            } => {
                info!(
                    "{} done: {} succeeded, {} failed, {} skipped",
                    operation, succeeded, failed, skipped
                );
                if *failed == 0 && *skipped == 0 {
                    println!("\n{}: done", operation);
                } else {
                    println!(
                        "\n{}: done with problems ({} succeeded, {} failed, {} skipped)",
                        operation, succeeded, failed, skipped
                    );
                }
            }
        }
    }
}
