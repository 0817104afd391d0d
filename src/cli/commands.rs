//! CLI command implementations

use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use dialoguer::Confirm;
use ethers::types::Address;
use ethers::utils::to_checksum;
use tracing::{error, info, warn};

use crate::config::{mask_url, parse_address, Config, FailurePolicy};
use crate::contracts::{
    strategy_name, vault_name, AdminAction, ContractHandle, ContractKind, ContractRef,
    ContractResolver, DeploymentRegistry,
};
use crate::credentials::{CredentialStore, GenerateOutcome, Role, SigningIdentity};
use crate::network::{run_local_node, NetworkContext, NetworkResolver, NodeLaunch};
use crate::ops::{
    base_name, ConsoleReporter, EthersClient, OperationExecutor, OperationResult,
    TransferOrchestrator,
};

/// Selections shared by every command that talks to a chain
#[derive(Debug, Clone, Default)]
pub struct Invocation {
    /// Target network; the configured default when absent
    pub network: Option<String>,

    /// Network whose chain identity the target impersonates
    pub fork: Option<String>,

    /// Explicit signing key for this invocation only
    pub private_key: Option<String>,

    /// Credential role to sign with instead of the network's descriptor
    pub role: Option<Role>,

    /// Skip confirmation prompts
    pub assume_yes: bool,
}

/// Run a local development node for `network`, optionally forked
pub async fn start_network(
    config: &Config,
    invocation: &Invocation,
    network: Option<&str>,
    fork_from: Option<&str>,
) -> Result<()> {
    let (local, fork_from) = local_target(config, invocation, network, fork_from);
    let context = NetworkResolver::new(config).resolve(Some(local), fork_from)?;
    let launch = NodeLaunch::from_context(&context, &config.node)?;

    println!("\n=== LOCAL NETWORK ===\n");
    println!("Network:  {}", context.name());
    println!("Endpoint: {}", mask_url(&context.profile.url));
    println!("Chain id: {}", display_chain_id(context.chain_id()));
    match &context.fork {
        Some(fork) => {
            println!("Fork of:  {} ({})", fork.source, mask_url(&fork.url));
            println!("Reset:    {}", if fork.reset { "yes" } else { "no" });
            println!("Persist:  {}", if fork.persist { "yes" } else { "no" });
        }
        None => println!("Fork:     none"),
    }
    println!("\nPress Ctrl-C to stop.\n");

    let status = run_local_node(&launch).await?;

    // Killed by signal has no exit code
    if let Some(code) = status.code() {
        if code != 0 {
            bail!("Local node exited with status {}", code);
        }
    }

    info!("Local node stopped");
    Ok(())
}

/// Emergency-withdraw and halt a strategy
pub async fn panic(config: &Config, invocation: &Invocation, strategy: &str) -> Result<()> {
    if !confirm(
        format!("Panic strategy {}? Funds are pulled out of the farm.", strategy),
        invocation.assume_yes,
    )? {
        println!("Cancelled.");
        return Ok(());
    }

    strategy_action(config, invocation, strategy, AdminAction::Panic).await
}

/// Halt a strategy without withdrawing its funds
pub async fn pause(config: &Config, invocation: &Invocation, strategy: &str) -> Result<()> {
    strategy_action(config, invocation, strategy, AdminAction::Pause).await
}

/// Resume a paused strategy
pub async fn unpause(config: &Config, invocation: &Invocation, strategy: &str) -> Result<()> {
    strategy_action(config, invocation, strategy, AdminAction::Unpause).await
}

/// Realize and compound a strategy's yield
pub async fn harvest(config: &Config, invocation: &Invocation, strategy: &str) -> Result<()> {
    strategy_action(config, invocation, strategy, AdminAction::Harvest).await
}

/// Invoke an arbitrary function on a deployed contract
pub async fn call(
    config: &Config,
    invocation: &Invocation,
    contract: &str,
    signature: &str,
    args: Vec<String>,
) -> Result<()> {
    let action = AdminAction::Call {
        signature: signature.to_string(),
        args,
    };
    let reference = ContractRef::parse(contract)?;
    let context = resolve_context(config, invocation)?;
    let handle = lookup(config, &context, &reference, ContractKind::Unknown)?;

    let executor = connect(config, invocation, &context).await?;
    let result = executor.execute(&handle, &action).await;
    finish(&action.name(), &result)
}

/// Hand a vault and its paired strategy to their new owners
pub async fn transfer(
    config: &Config,
    invocation: &Invocation,
    vault: &str,
    vault_owner: Option<&str>,
    strat_owner: Option<&str>,
    policy: Option<FailurePolicy>,
) -> Result<()> {
    let context = resolve_context(config, invocation)?;
    let base = base_name(vault);
    let vault_owner = beneficiary(&context, vault_owner, "vault_owner")?;
    let strat_owner = beneficiary(&context, strat_owner, "strat_owner")?;
    let policy = policy.unwrap_or(config.transfer.failure_policy);

    println!("\n=== OWNERSHIP TRANSFER ({}) ===\n", context.name());
    println!("{:<24} -> {}", vault_name(base), to_checksum(&vault_owner, None));
    println!("{:<24} -> {}", strategy_name(base), to_checksum(&strat_owner, None));
    println!("Failure policy: {}\n", policy);

    if !confirm(
        format!("Transfer ownership of {}? This cannot be undone.", base),
        invocation.assume_yes,
    )? {
        println!("Cancelled.");
        return Ok(());
    }

    let executor = connect(config, invocation, &context).await?;
    let registry = registry(config);

    let report = TransferOrchestrator::new(&executor, &registry, context.deployment_network())
        .with_policy(policy)
        .transfer_ownership(base, vault_owner, strat_owner)
        .await;

    println!("\nStarted:  {}", report.started_at.format("%Y-%m-%d %H:%M:%S UTC"));
    for step in report.steps() {
        let status = if step.succeeded() {
            "ok"
        } else if step.skipped() {
            "skipped"
        } else {
            "FAILED"
        };
        println!(
            "{:<24} {:<8} {}",
            step.contract,
            status,
            step.finished_at.format("%H:%M:%S")
        );
    }

    if !report.all_succeeded() {
        bail!(
            "Ownership transfer of {} incomplete: {} of 2 steps succeeded",
            report.base,
            report.succeeded()
        );
    }

    Ok(())
}

/// Create the deployer and other credentials if they do not exist yet
pub async fn generate_accounts(config: &Config) -> Result<()> {
    let store = CredentialStore::from_config(&config.credentials);
    println!("\n=== GENERATE ACCOUNTS ===\n");

    let mut failed = Vec::new();
    for role in Role::ALL {
        match store.generate(role) {
            Ok(GenerateOutcome::Created { address, path, .. }) => {
                println!(
                    "{:<10} created {} ({})",
                    role.to_string(),
                    to_checksum(&address, None),
                    path.display()
                );
            }
            Ok(GenerateOutcome::AlreadyExists { path, .. }) => {
                println!("{:<10} {} exists, not overwriting", role.to_string(), path.display());
            }
            Err(e) => {
                error!("Failed to generate {} credential: {}", role, e);
                println!("{:<10} FAILED: {}", role.to_string(), e);
                failed.push(role.to_string());
            }
        }
    }

    if !failed.is_empty() {
        bail!("Could not generate credentials for: {}", failed.join(", "));
    }

    Ok(())
}

/// Show credential roles and the active network's named accounts
pub async fn accounts(config: &Config, invocation: &Invocation) -> Result<()> {
    let store = CredentialStore::from_config(&config.credentials);

    println!("\n=== CREDENTIALS ===\n");
    for role in Role::ALL {
        match store.load(role) {
            Ok(Some(credential)) => println!(
                "{:<10} {} ({})",
                role.to_string(),
                to_checksum(&credential.address(), None),
                credential.source
            ),
            Ok(None) => println!(
                "{:<10} not set ({} missing)",
                role.to_string(),
                store.path(role).display()
            ),
            Err(e) => println!("{:<10} unusable: {}", role.to_string(), e),
        }
    }

    let context = resolve_context(config, invocation)?;
    println!("\n=== NAMED ACCOUNTS ({}) ===\n", context.name());
    for account in ["vault_owner", "strat_owner", "keeper"] {
        match context.profile.named_account(account) {
            Ok(address) => println!("{:<12} {}", account, to_checksum(&address, None)),
            Err(_) => println!("{:<12} -", account),
        }
    }

    Ok(())
}

/// List configured networks
pub fn networks(config: &Config) -> Result<()> {
    println!("\n=== NETWORKS ===\n");
    for profile in config.networks.values() {
        let mut tags = Vec::new();
        if profile.name == config.default_network {
            tags.push("default");
        }
        if profile.name == config.local_network {
            tags.push("local");
        }
        println!(
            "{:<12} chain_id={:<8} {}{}",
            profile.name,
            display_chain_id(profile.chain_id),
            if profile.url.is_empty() {
                "(no endpoint)".to_string()
            } else {
                mask_url(&profile.url)
            },
            if tags.is_empty() {
                String::new()
            } else {
                format!(" [{}]", tags.join(", "))
            }
        );
    }
    Ok(())
}

/// Show current configuration (secrets masked)
pub fn show_config(config: &Config) -> Result<()> {
    println!("{}", config.masked_display());
    Ok(())
}

async fn strategy_action(
    config: &Config,
    invocation: &Invocation,
    strategy: &str,
    action: AdminAction,
) -> Result<()> {
    let reference = ContractRef::parse(strategy)?;
    let context = resolve_context(config, invocation)?;
    let handle = lookup(config, &context, &reference, ContractKind::Strategy)?;

    let executor = connect(config, invocation, &context).await?;
    let result = executor.execute(&handle, &action).await;
    finish(&action.name(), &result)
}

fn resolve_context(config: &Config, invocation: &Invocation) -> Result<NetworkContext> {
    let context = NetworkResolver::new(config)
        .resolve(invocation.network.as_deref(), invocation.fork.as_deref())?;
    Ok(context)
}

async fn connect(
    config: &Config,
    invocation: &Invocation,
    context: &NetworkContext,
) -> Result<OperationExecutor> {
    let store = CredentialStore::from_config(&config.credentials);
    let identity = SigningIdentity::resolve(
        &context.profile.signer,
        &store,
        invocation.private_key.as_deref(),
        invocation.role,
    )
    .map_err(|e| {
        if e.is_credential_error() {
            error!("No usable signer for {}: {}", context.name(), e);
        }
        e
    })?;

    let client = EthersClient::connect(context, identity, &config.execution)
        .await
        .with_context(|| format!("Cannot connect to {}", context.name()))?;

    let executor = OperationExecutor::new(Arc::new(client), Arc::new(ConsoleReporter))
        .with_explorer(context.profile.explorer.clone());
    println!("Signing as {}\n", to_checksum(&executor.sender(), None));

    Ok(executor)
}

/// Positional arguments win over the global `--network` and `--fork`
fn local_target<'a>(
    config: &'a Config,
    invocation: &'a Invocation,
    network: Option<&'a str>,
    fork_from: Option<&'a str>,
) -> (&'a str, Option<&'a str>) {
    let local = network
        .or(invocation.network.as_deref())
        .unwrap_or(config.local_network.as_str());
    (local, fork_from.or(invocation.fork.as_deref()))
}

fn registry(config: &Config) -> DeploymentRegistry {
    DeploymentRegistry::new(config.deployments.dir.clone())
}

/// Resolve against the records of the network whose contracts are live
fn lookup(
    config: &Config,
    context: &NetworkContext,
    reference: &ContractRef,
    kind: ContractKind,
) -> Result<ContractHandle> {
    let network = context.deployment_network();
    registry(config)
        .handle(network, reference, kind)
        .map_err(|e| {
            if e.is_resolution_error() && context.is_fork() {
                warn!(
                    "{} forks {}; deployment records are read from {}",
                    context.name(),
                    network,
                    config.deployments.dir.join(network).display()
                );
            }
            anyhow::Error::from(e)
        })
}

fn beneficiary(context: &NetworkContext, explicit: Option<&str>, account: &str) -> Result<Address> {
    match explicit {
        Some(raw) => Ok(parse_address(raw)?),
        None => context.profile.named_account(account).with_context(|| {
            format!(
                "Pass --{} or set networks.{}.accounts.{}",
                account.replace('_', "-"),
                context.deployment_network(),
                account
            )
        }),
    }
}

fn confirm(prompt: String, assume_yes: bool) -> Result<bool> {
    if assume_yes {
        return Ok(true);
    }
    let confirmed = Confirm::new()
        .with_prompt(prompt)
        .default(false)
        .interact()?;
    if !confirmed {
        warn!("Operator declined");
    }
    Ok(confirmed)
}

fn finish(operation: &str, result: &OperationResult) -> Result<()> {
    match result {
        OperationResult::Confirmed(_) => Ok(()),
        OperationResult::Failed { stage, error, .. } => {
            Err(anyhow!("{} failed at {}: {}", operation, stage, error))
        }
    }
}

fn display_chain_id(chain_id: Option<u64>) -> String {
    chain_id
        .map(|id| id.to_string())
        .unwrap_or_else(|| "-".to_string())
}
