//! Paired vault/strategy ownership handover

use chrono::{DateTime, Utc};
use ethers::types::Address;
use tracing::{info, warn};

use crate::config::FailurePolicy;
use crate::contracts::{
    strategy_name, vault_name, AdminAction, ContractKind, ContractRef, ContractResolver,
};
use crate::error::Error;

use super::executor::{OperationExecutor, OperationResult};
use super::report::{FailureStage, OperationEvent};

/// What happened to one half of the handover
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    Completed(OperationResult),
    Skipped(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransferStep {
    /// Logical contract name, `<base>-vault` or `<base>-strat`
    pub contract: String,
    pub new_owner: Address,
    pub outcome: StepOutcome,
    pub finished_at: DateTime<Utc>,
}

impl TransferStep {
    pub fn succeeded(&self) -> bool {
        matches!(&self.outcome, StepOutcome::Completed(result) if result.is_success())
    }

    pub fn skipped(&self) -> bool {
        matches!(self.outcome, StepOutcome::Skipped(_))
    }
}

/// Both steps, always in vault then strategy order
#[derive(Debug, Clone, PartialEq)]
pub struct TransferReport {
    pub base: String,
    pub started_at: DateTime<Utc>,
    pub vault: TransferStep,
    pub strategy: TransferStep,
}

impl TransferReport {
    pub fn steps(&self) -> [&TransferStep; 2] {
        [&self.vault, &self.strategy]
    }

    pub fn all_succeeded(&self) -> bool {
        self.steps().iter().all(|step| step.succeeded())
    }

    pub fn succeeded(&self) -> usize {
        self.steps().iter().filter(|step| step.succeeded()).count()
    }

    pub fn skipped(&self) -> usize {
        self.steps().iter().filter(|step| step.skipped()).count()
    }

    pub fn failed(&self) -> usize {
        2 - self.succeeded() - self.skipped()
    }
}

/// Strip a trailing `-vault` so both `cake` and `cake-vault` name the pair
pub fn base_name(name: &str) -> &str {
    let name = name.trim();
    name.strip_suffix("-vault").unwrap_or(name)
}

/// Hands a vault and its strategy to new owners
pub struct TransferOrchestrator<'a> {
    executor: &'a OperationExecutor,
    resolver: &'a dyn ContractResolver,
    network: String,
    policy: FailurePolicy,
}

impl<'a> TransferOrchestrator<'a> {
    pub fn new(
        executor: &'a OperationExecutor,
        resolver: &'a dyn ContractResolver,
        network: impl Into<String>,
    ) -> Self {
        Self {
            executor,
            resolver,
            network: network.into(),
            policy: FailurePolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Transfer `<base>-vault` to `vault_owner`, then `<base>-strat` to
    /// `strat_owner`.
    ///
    /// Under [`FailurePolicy::Independent`] the strategy step runs no matter
    /// how the vault step ended. A `Done` event is reported in every case.
    pub async fn transfer_ownership(
        &self,
        vault_base: &str,
        vault_owner: Address,
        strat_owner: Address,
    ) -> TransferReport {
        let base = base_name(vault_base).to_string();
        let started_at = Utc::now();
        info!(
            "Transferring ownership of {} on {} ({} policy)",
            base, self.network, self.policy
        );

        let vault = self
            .step(vault_name(&base), ContractKind::Vault, vault_owner)
            .await;

        let strategy_contract = strategy_name(&base);
        let strategy = if !vault.succeeded() && self.policy == FailurePolicy::FailFast {
            let reason = format!("{} did not transfer", vault.contract);
            warn!("Skipping {}: {}", strategy_contract, reason);
            self.executor.reporter().report(&OperationEvent::Skipped {
                target: strategy_contract.clone(),
                action: "transferOwnership".to_string(),
                reason: reason.clone(),
            });
            TransferStep {
                contract: strategy_contract,
                new_owner: strat_owner,
                outcome: StepOutcome::Skipped(reason),
                finished_at: Utc::now(),
            }
        } else {
            self.step(strategy_contract, ContractKind::Strategy, strat_owner)
                .await
        };

        let report = TransferReport {
            base,
            started_at,
            vault,
            strategy,
        };

        self.executor.reporter().report(&OperationEvent::Done {
            operation: format!("transfer {}", report.base),
            succeeded: report.succeeded(),
            failed: report.failed(),
            skipped: report.skipped(),
        });

        report
    }

    async fn step(&self, contract: String, kind: ContractKind, new_owner: Address) -> TransferStep {
        let action = AdminAction::TransferOwnership(new_owner);
        let reference = ContractRef::Name(contract.clone());

        let result = match self.resolver.handle(&self.network, &reference, kind) {
            Ok(handle) => self.executor.execute(&handle, &action).await,
            Err(e) => self.resolution_failure(&contract, &action, &e),
        };

        TransferStep {
            contract,
            new_owner,
            outcome: StepOutcome::Completed(result),
            finished_at: Utc::now(),
        }
    }

    fn resolution_failure(&self, contract: &str, action: &AdminAction, error: &Error) -> OperationResult {
        self.executor
            .fail(contract, &action.name(), FailureStage::Resolution, error, None)
    }
}
