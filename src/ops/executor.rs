//! Single administrative call: submit, report, confirm
//!
//! Failures never escape as errors. Every outcome comes back as an
//! [`OperationResult`] that the caller branches on, and exactly one
//! transaction is submitted per call with no automatic retry.

use std::sync::Arc;

use ethers::types::TxHash;
use tracing::{debug, info};

use crate::config::explorer_tx_url;
use crate::contracts::{AdminAction, ContractHandle};
use crate::error::Error;

use super::client::{ChainClient, Confirmation};
use super::report::{FailureStage, OperationEvent, Reporter};

/// Outcome of one submitted call
#[derive(Debug, Clone, PartialEq)]
pub enum OperationResult {
    Confirmed(Confirmation),
    Failed {
        stage: FailureStage,
        error: String,
        /// Set when the failure happened after broadcast
        tx: Option<TxHash>,
    },
}

impl OperationResult {
    pub fn is_success(&self) -> bool {
        matches!(self, OperationResult::Confirmed(_))
    }

    /// Transaction reference, if the call was broadcast
    pub fn tx(&self) -> Option<TxHash> {
        match self {
            OperationResult::Confirmed(confirmation) => Some(confirmation.tx),
            OperationResult::Failed { tx, .. } => *tx,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            OperationResult::Confirmed(_) => None,
            OperationResult::Failed { error, .. } => Some(error),
        }
    }
}

/// Submits calls through a [`ChainClient`] bound to one signing identity
pub struct OperationExecutor {
    client: Arc<dyn ChainClient>,
    reporter: Arc<dyn Reporter>,
    explorer: Option<String>,
}

impl OperationExecutor {
    pub fn new(client: Arc<dyn ChainClient>, reporter: Arc<dyn Reporter>) -> Self {
        Self {
            client,
            reporter,
            explorer: None,
        }
    }

    /// Explorer base URL for transaction links
    pub fn with_explorer(mut self, explorer: Option<String>) -> Self {
        self.explorer = explorer;
        self
    }

    pub fn reporter(&self) -> &Arc<dyn Reporter> {
        &self.reporter
    }

    /// Address every call is sent from
    pub fn sender(&self) -> ethers::types::Address {
        self.client.sender()
    }

    /// Run `action` against `handle` and wait for confirmation
    pub async fn execute(&self, handle: &ContractHandle, action: &AdminAction) -> OperationResult {
        let target = handle.label();
        let action_name = action.name();

        let data = match handle.calldata(action) {
            Ok(data) => data,
            Err(e) => return self.fail(&target, &action_name, FailureStage::Encoding, &e, None),
        };

        info!("Submitting {} to {}", action, target);
        debug!("Calldata: 0x{}", hex::encode(&data));

        let tx = match self.client.submit(handle.address, data).await {
            Ok(tx) => tx,
            Err(e) => return self.fail(&target, &action_name, FailureStage::Submission, &e, None),
        };

        self.reporter.report(&OperationEvent::Submitted {
            target: target.clone(),
            action: action_name.clone(),
            tx,
            explorer_url: self
                .explorer
                .as_deref()
                .map(|base| explorer_tx_url(base, &format!("{:?}", tx))),
        });

        match self.client.wait_for_confirmation(tx).await {
            Ok(confirmation) => {
                self.reporter.report(&OperationEvent::Confirmed {
                    target,
                    action: action_name,
                    tx: confirmation.tx,
                    block_number: confirmation.block_number,
                    gas_used: confirmation.gas_used,
                });
                OperationResult::Confirmed(confirmation)
            }
            Err(e) => self.fail(&target, &action_name, FailureStage::Confirmation, &e, Some(tx)),
        }
    }

    /// Report a failed step and turn it into a result
    pub fn fail(
        &self,
        target: &str,
        action: &str,
        stage: FailureStage,
        error: &Error,
        tx: Option<TxHash>,
    ) -> OperationResult {
        self.reporter.report(&OperationEvent::Failed {
            target: target.to_string(),
            action: action.to_string(),
            stage,
            error: error.to_string(),
        });
        OperationResult::Failed {
            stage,
            error: error.to_string(),
            tx,
        }
    }
}
