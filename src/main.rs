//! Vault Ops - administrative control surface for deployed vaults
//!
//! # WARNING
//! - `panic` and `transfer` submit irreversible transactions.
//! - Ownership transfers are not rolled back when one half fails.
//! - Credential files hold raw private keys. Keep `.secrets/` out of version control.

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

// Use the library crate
use vault_ops::cli::commands::{self, Invocation};
use vault_ops::config::{Config, FailurePolicy};
use vault_ops::credentials::Role;

/// Vault Ops - operator commands for vaults and strategies
#[derive(Parser)]
#[command(name = "vault-ops")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Network to operate on (defaults to `default_network`)
    #[arg(short, long)]
    network: Option<String>,

    /// Impersonate another network's chain identity
    #[arg(long, value_name = "NETWORK")]
    fork: Option<String>,

    /// Sign with this key instead of the network's configured signer
    #[arg(long, env = "VAULT_OPS_PRIVATE_KEY", hide_env_values = true)]
    private_key: Option<String>,

    /// Sign with a persisted credential role
    #[arg(long, value_enum)]
    role: Option<Role>,

    /// Skip confirmation prompts
    #[arg(short, long)]
    yes: bool,

    /// Log output format
    #[arg(long, value_enum, default_value = "text")]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a local node, optionally forked from another network
    StartNetwork {
        /// Local network profile (defaults to --network, then `local_network`)
        network: Option<String>,

        /// Network to fork chain id and state from (defaults to --fork)
        fork_from: Option<String>,
    },

    /// Emergency-withdraw a strategy's funds and halt it
    Panic {
        /// Strategy address or deployment name
        strategy: String,
    },

    /// Halt a strategy, leaving its funds in place
    Pause {
        /// Strategy address or deployment name
        strategy: String,
    },

    /// Resume a paused strategy
    Unpause {
        /// Strategy address or deployment name
        strategy: String,
    },

    /// Harvest a strategy's yield
    Harvest {
        /// Strategy address or deployment name
        strategy: String,
    },

    /// Transfer ownership of `<name>-vault` and `<name>-strat`
    Transfer {
        /// Vault logical name, with or without the `-vault` suffix
        vault: String,

        /// New vault owner (default: the network's `vault_owner` account)
        #[arg(long)]
        vault_owner: Option<String>,

        /// New strategy owner (default: the network's `strat_owner` account)
        #[arg(long)]
        strat_owner: Option<String>,

        /// Behavior after a failed vault step (default: from config)
        #[arg(long, value_enum)]
        failure_policy: Option<FailurePolicy>,
    },

    /// Create the deployer and other credentials if missing
    GenerateAccounts,

    /// Call an arbitrary function on a deployed contract
    Call {
        /// Contract address or deployment name
        contract: String,

        /// Function signature, e.g. "setKeeper(address)"
        signature: String,

        /// Function arguments
        args: Vec<String>,
    },

    /// Show credential roles and named accounts
    Accounts,

    /// List configured networks
    Networks,

    /// Show current configuration (secrets masked)
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Parse CLI arguments
    let cli = Cli::parse();

    // Initialize tracing
    let filter = EnvFilter::from_default_env().add_directive("vault_ops=info".parse()?);
    match cli.log_format {
        LogFormat::Text => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_current_span(false)
            .init(),
    }

    // Load configuration
    let config = match Config::load(&cli.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Failed to load configuration: {:#}", e);
            std::process::exit(1);
        }
    };
    info!("Loaded configuration from {}", cli.config);

    let invocation = Invocation {
        network: cli.network,
        fork: cli.fork,
        private_key: cli.private_key,
        role: cli.role,
        assume_yes: cli.yes,
    };

    // Execute command
    let result = match cli.command {
        Commands::StartNetwork { network, fork_from } => {
            commands::start_network(&config, &invocation, network.as_deref(), fork_from.as_deref())
                .await
        }
        Commands::Panic { strategy } => commands::panic(&config, &invocation, &strategy).await,
        Commands::Pause { strategy } => commands::pause(&config, &invocation, &strategy).await,
        Commands::Unpause { strategy } => commands::unpause(&config, &invocation, &strategy).await,
        Commands::Harvest { strategy } => commands::harvest(&config, &invocation, &strategy).await,
        Commands::Transfer {
            vault,
            vault_owner,
            strat_owner,
            failure_policy,
        } => {
            commands::transfer(
                &config,
                &invocation,
                &vault,
                vault_owner.as_deref(),
                strat_owner.as_deref(),
                failure_policy,
            )
            .await
        }
        Commands::GenerateAccounts => commands::generate_accounts(&config).await,
        Commands::Call {
            contract,
            signature,
            args,
        } => commands::call(&config, &invocation, &contract, &signature, args).await,
        Commands::Accounts => commands::accounts(&config, &invocation).await,
        Commands::Networks => commands::networks(&config),
        Commands::Config => commands::show_config(&config),
    };

    if let Err(e) = result {
        error!("Command failed: {:#}", e);
        std::process::exit(1);
    }

    Ok(())
}
