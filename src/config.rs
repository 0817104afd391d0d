//! Configuration loading and validation
//!
//! The network table and named accounts are read once at startup into an
//! immutable [`Config`] that is passed by reference to every command.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use ::config::builder::{ConfigBuilder, DefaultState};
use ethers::types::Address;
use serde::Deserialize;

use crate::credentials::Role;
use crate::error::Error;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Network used when a command does not name one
    #[serde(default = "default_network_name")]
    pub default_network: String,

    /// Network that `start-network` brings up locally
    #[serde(default = "default_network_name")]
    pub local_network: String,

    /// Network table keyed by identifier
    #[serde(default)]
    pub networks: BTreeMap<String, NetworkProfile>,

    #[serde(default)]
    pub credentials: CredentialsConfig,

    #[serde(default)]
    pub deployments: DeploymentsConfig,

    #[serde(default)]
    pub execution: ExecutionConfig,

    #[serde(default)]
    pub transfer: TransferConfig,

    #[serde(default)]
    pub node: NodeConfig,
}

/// Connection parameters for one network
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct NetworkProfile {
    /// Identifier, filled from the table key
    #[serde(default)]
    pub name: String,

    /// JSON-RPC endpoint
    #[serde(default)]
    pub url: String,

    #[serde(default)]
    pub chain_id: Option<u64>,

    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Fixed legacy gas price; node estimate when absent
    #[serde(default)]
    pub gas_price_gwei: Option<u64>,

    /// Block explorer base URL, used for transaction links
    #[serde(default)]
    pub explorer: Option<String>,

    #[serde(default)]
    pub signer: SigningSource,

    #[serde(default)]
    pub accounts: NamedAccounts,
}

/// Where the signing identity for a network comes from
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SigningSource {
    /// Use the credential store (environment override, then file)
    Persisted {
        #[serde(default)]
        role: Role,
    },

    /// Explicit key material
    Key { key: String },

    /// Node-managed account; transactions are sent unsigned with `from` set
    Remote { address: String },
}

impl Default for SigningSource {
    fn default() -> Self {
        SigningSource::Persisted {
            role: Role::Deployer,
        }
    }
}

/// Role-to-address mappings used as default beneficiaries
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct NamedAccounts {
    #[serde(default)]
    pub vault_owner: Option<String>,

    #[serde(default)]
    pub strat_owner: Option<String>,

    #[serde(default)]
    pub keeper: Option<String>,
}

impl NamedAccounts {
    fn get(&self, account: &str) -> Option<&str> {
        match account {
            "vault_owner" => self.vault_owner.as_deref(),
            "strat_owner" => self.strat_owner.as_deref(),
            "keeper" => self.keeper.as_deref(),
            _ => None,
        }
    }

    /// Take every account `other` sets, keeping ours where it has none
    pub(crate) fn overlay(&mut self, other: &NamedAccounts) {
        if other.vault_owner.is_some() {
            self.vault_owner = other.vault_owner.clone();
        }
        if other.strat_owner.is_some() {
            self.strat_owner = other.strat_owner.clone();
        }
        if other.keeper.is_some() {
            self.keeper = other.keeper.clone();
        }
    }

    fn entries(&self) -> impl Iterator<Item = (&'static str, &str)> {
        [
            ("vault_owner", self.vault_owner.as_deref()),
            ("strat_owner", self.strat_owner.as_deref()),
            ("keeper", self.keeper.as_deref()),
        ]
        .into_iter()
        .filter_map(|(k, v)| v.map(|v| (k, v)))
    }
}

impl NetworkProfile {
    /// Request timeout for the RPC transport
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Endpoint, or an error when the profile cannot be used for live calls
    pub fn require_endpoint(&self) -> crate::error::Result<&str> {
        if self.url.trim().is_empty() {
            return Err(Error::EmptyEndpoint(self.name.clone()));
        }
        Ok(&self.url)
    }

    /// Parsed named account for this network
    pub fn named_account(&self, account: &str) -> crate::error::Result<Address> {
        let raw = self
            .accounts
            .get(account)
            .ok_or_else(|| Error::MissingNamedAccount {
                network: self.name.clone(),
                account: account.to_string(),
            })?;
        parse_address(raw)
    }
}

/// `<explorer>/tx/<hash>`
pub fn explorer_tx_url(base: &str, tx: &str) -> String {
    format!("{}/tx/{}", base.trim_end_matches('/'), tx)
}

/// Parse a hex address, mapping failures into our error type
pub fn parse_address(raw: &str) -> crate::error::Result<Address> {
    Address::from_str(raw.trim()).map_err(|e| Error::InvalidAddress(format!("{}: {}", raw, e)))
}

#[derive(Debug, Clone, Deserialize)]
pub struct CredentialsConfig {
    /// Directory holding one secret file per role
    #[serde(default = "default_credentials_dir")]
    pub dir: PathBuf,

    /// Environment variable consulted before the file, per role
    #[serde(default = "default_env_overrides")]
    pub env_overrides: BTreeMap<String, String>,
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            dir: default_credentials_dir(),
            env_overrides: default_env_overrides(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeploymentsConfig {
    /// Root of the `<network>/<name>.json` deployment records
    #[serde(default = "default_deployments_dir")]
    pub dir: PathBuf,
}

impl Default for DeploymentsConfig {
    fn default() -> Self {
        Self {
            dir: default_deployments_dir(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExecutionConfig {
    /// Blocks to wait for before a transaction counts as confirmed
    #[serde(default = "default_confirmations")]
    pub confirmations: usize,

    /// Receipt polling interval while waiting for confirmation
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl ExecutionConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            confirmations: default_confirmations(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

/// What the ownership transfer does after a failed vault step
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Attempt every step and report each outcome
    #[default]
    Independent,
    /// Skip remaining steps once one fails
    #[value(name = "fail_fast")]
    FailFast,
}

impl std::fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailurePolicy::Independent => write!(f, "independent"),
            FailurePolicy::FailFast => write!(f, "fail_fast"),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TransferConfig {
    #[serde(default)]
    pub failure_policy: FailurePolicy,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NodeConfig {
    /// Local node executable
    #[serde(default = "default_node_program")]
    pub program: String,

    /// Extra arguments appended verbatim
    #[serde(default)]
    pub extra_args: Vec<String>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            program: default_node_program(),
            extra_args: Vec::new(),
        }
    }
}

// Default value functions
fn default_network_name() -> String {
    "localhost".to_string()
}

fn default_timeout_ms() -> u64 {
    20000
}

fn default_credentials_dir() -> PathBuf {
    PathBuf::from(".secrets")
}

fn default_env_overrides() -> BTreeMap<String, String> {
    Role::ALL
        .iter()
        .map(|role| (role.to_string(), role.default_env_var().to_string()))
        .collect()
}

fn default_deployments_dir() -> PathBuf {
    PathBuf::from("deployments")
}

fn default_confirmations() -> usize {
    1
}

fn default_poll_interval_ms() -> u64 {
    2000
}

fn default_node_program() -> String {
    "anvil".to_string()
}

fn builtin_network(name: &str, url: &str, chain_id: u64, explorer: Option<&str>) -> NetworkProfile {
    NetworkProfile {
        name: name.to_string(),
        url: url.to_string(),
        chain_id: Some(chain_id),
        timeout_ms: default_timeout_ms(),
        gas_price_gwei: None,
        explorer: explorer.map(str::to_string),
        signer: SigningSource::default(),
        accounts: NamedAccounts::default(),
    }
}

/// Networks known without any configuration file
pub fn builtin_networks() -> BTreeMap<String, NetworkProfile> {
    [
        builtin_network("localhost", "http://127.0.0.1:8545", 31337, None),
        builtin_network(
            "bsc",
            "https://bsc-dataseed2.defibit.io/",
            56,
            Some("https://bscscan.com"),
        ),
        builtin_network(
            "heco",
            "https://http-mainnet.hecochain.com",
            128,
            Some("https://hecoinfo.com"),
        ),
        builtin_network(
            "avax",
            "https://api.avax.network/ext/bc/C/rpc",
            43114,
            Some("https://snowtrace.io"),
        ),
        builtin_network(
            "polygon",
            "https://polygon-rpc.com/",
            137,
            Some("https://polygonscan.com"),
        ),
        builtin_network(
            "fantom",
            "https://rpc.ftm.tools",
            250,
            Some("https://ftmscan.com"),
        ),
    ]
    .into_iter()
    .map(|profile| (profile.name.clone(), profile))
    .collect()
}

/// Seed built-in networks as defaults so user entries override them key by key
fn builtin_defaults(mut builder: ConfigBuilder<DefaultState>) -> Result<ConfigBuilder<DefaultState>> {
    for (name, profile) in builtin_networks() {
        let key = |field: &str| format!("networks.{}.{}", name, field);
        builder = builder.set_default(key("url"), profile.url)?;
        builder = builder.set_default(key("timeout_ms"), profile.timeout_ms as i64)?;
        if let Some(chain_id) = profile.chain_id {
            builder = builder.set_default(key("chain_id"), chain_id as i64)?;
        }
        if let Some(explorer) = profile.explorer {
            builder = builder.set_default(key("explorer"), explorer)?;
        }
    }
    Ok(builder)
}

impl Config {
    /// Load configuration from file and environment variables
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let settings = builtin_defaults(config::Config::builder())?
            // Load from file if exists
            .add_source(config::File::from(path).required(false))
            // Override with environment variables (VAULT_OPS__<section>__<key>)
            .add_source(
                config::Environment::with_prefix("VAULT_OPS")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build configuration")?;

        Self::from_settings(settings)
    }

    /// Parse configuration from an inline TOML document
    pub fn from_toml(source: &str) -> Result<Self> {
        let settings = builtin_defaults(config::Config::builder())?
            .add_source(config::File::from_str(source, config::FileFormat::Toml))
            .build()
            .context("Failed to build configuration")?;

        Self::from_settings(settings)
    }

    fn from_settings(settings: config::Config) -> Result<Self> {
        let mut config: Config = settings
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        config.finalize();
        config.validate()?;

        Ok(config)
    }

    /// Fill profile names from table keys
    fn finalize(&mut self) {
        for (name, profile) in self.networks.iter_mut() {
            profile.name = name.clone();
        }
    }

    /// Validate configuration values
    fn validate(&self) -> Result<()> {
        if self.execution.confirmations == 0 {
            anyhow::bail!("execution.confirmations must be at least 1");
        }

        if self.execution.poll_interval_ms == 0 {
            anyhow::bail!("execution.poll_interval_ms must be positive");
        }

        for (name, profile) in &self.networks {
            for (account, raw) in profile.accounts.entries() {
                parse_address(raw)
                    .with_context(|| format!("Invalid {} for network {}", account, name))?;
            }
            if let SigningSource::Remote { address } = &profile.signer {
                parse_address(address)
                    .with_context(|| format!("Invalid remote signer for network {}", name))?;
            }
        }

        // Unknown defaults are reported, not fatal; resolution falls back later
        if !self.networks.contains_key(&self.default_network) {
            tracing::warn!(
                "default_network '{}' is not a configured network",
                self.default_network
            );
        }

        Ok(())
    }

    /// Look up a network profile by identifier
    pub fn network(&self, name: &str) -> Option<&NetworkProfile> {
        self.networks.get(name)
    }

    /// Get masked configuration for display (hide secrets)
    pub fn masked_display(&self) -> String {
        let mut out = format!(
            r#"Configuration:
  default_network: {}
  local_network: {}
  credentials_dir: {}
  deployments_dir: {}
  confirmations: {}
  transfer_failure_policy: {}
  node: {}
  Networks:
"#,
            self.default_network,
            self.local_network,
            self.credentials.dir.display(),
            self.deployments.dir.display(),
            self.execution.confirmations,
            self.transfer.failure_policy,
            self.node.program,
        );

        for profile in self.networks.values() {
            out.push_str(&format!(
                "    {}: url={} chain_id={} timeout={}ms signer={}\n",
                profile.name,
                mask_url(&profile.url),
                profile
                    .chain_id
                    .map(|id| id.to_string())
                    .unwrap_or_else(|| "-".to_string()),
                profile.timeout_ms,
                mask_signer(&profile.signer),
            ));
        }

        out
    }
}

/// Mask URL for display (hide API keys in query params)
pub fn mask_url(url: &str) -> String {
    if let Some(idx) = url.find('?') {
        format!("{}?***", &url[..idx])
    } else {
        url.to_string()
    }
}

fn mask_signer(signer: &SigningSource) -> String {
    match signer {
        SigningSource::Persisted { role } => format!("persisted({})", role),
        SigningSource::Key { .. } => "key(***)".to_string(),
        SigningSource::Remote { address } => format!("remote({})", address),
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_network: default_network_name(),
            local_network: default_network_name(),
            networks: builtin_networks(),
            credentials: CredentialsConfig::default(),
            deployments: DeploymentsConfig::default(),
            execution: ExecutionConfig::default(),
            transfer: TransferConfig::default(),
            node: NodeConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.default_network, "localhost");
        assert_eq!(config.network("bsc").unwrap().chain_id, Some(56));
        assert_eq!(config.execution.confirmations, 1);
        assert_eq!(config.transfer.failure_policy, FailurePolicy::Independent);
    }

    #[test]
    fn test_user_networks_merge_over_builtins() {
        let config = Config::from_toml(
            r#"
            [networks.bsc]
            url = "https://bsc.example.org"
            chain_id = 56

            [networks.bsc.accounts]
            vault_owner = "0x0000000000000000000000000000000000000001"

            [networks.devnet]
            url = "http://10.0.0.5:8545"
            signer = { kind = "remote", address = "0x0000000000000000000000000000000000000002" }
            "#,
        )
        .unwrap();

        let bsc = config.network("bsc").unwrap();
        assert_eq!(bsc.name, "bsc");
        assert_eq!(bsc.url, "https://bsc.example.org");
        assert!(bsc.named_account("vault_owner").is_ok());
        assert!(matches!(
            bsc.named_account("strat_owner"),
            Err(Error::MissingNamedAccount { .. })
        ));

        let devnet = config.network("devnet").unwrap();
        assert_eq!(devnet.chain_id, None);
        assert!(matches!(devnet.signer, SigningSource::Remote { .. }));

        // Built-ins not mentioned are still present
        assert!(config.network("polygon").is_some());
    }

    #[test]
    fn test_partial_override_keeps_builtin_fields() {
        let config = Config::from_toml(
            r#"
            [networks.localhost]
            signer = { kind = "remote", address = "0x0000000000000000000000000000000000000002" }

            [networks.bsc.accounts]
            vault_owner = "0x0000000000000000000000000000000000000001"
            "#,
        )
        .unwrap();

        let localhost = config.network("localhost").unwrap();
        assert_eq!(localhost.url, "http://127.0.0.1:8545");
        assert_eq!(localhost.chain_id, Some(31337));
        assert!(matches!(localhost.signer, SigningSource::Remote { .. }));
        assert!(localhost.require_endpoint().is_ok());

        let bsc = config.network("bsc").unwrap();
        assert_eq!(bsc.url, "https://bsc-dataseed2.defibit.io/");
        assert_eq!(bsc.chain_id, Some(56));
        assert_eq!(bsc.explorer.as_deref(), Some("https://bscscan.com"));
        assert_eq!(bsc.timeout_ms, 20000);
        assert!(bsc.named_account("vault_owner").is_ok());
    }

    #[test]
    fn test_single_field_override() {
        let config = Config::from_toml(
            r#"
            [networks.polygon]
            url = "https://polygon.example.org"
            "#,
        )
        .unwrap();

        let polygon = config.network("polygon").unwrap();
        assert_eq!(polygon.url, "https://polygon.example.org");
        assert_eq!(polygon.chain_id, Some(137));
    }

    #[test]
    fn test_invalid_named_account_rejected() {
        let result = Config::from_toml(
            r#"
            [networks.bsc.accounts]
            strat_owner = "not-an-address"
            "#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_failure_policy_deserialize() {
        let policy: FailurePolicy = serde_json::from_str(r#""fail_fast""#).unwrap();
        assert_eq!(policy, FailurePolicy::FailFast);

        let flag = <FailurePolicy as clap::ValueEnum>::from_str("fail_fast", false).unwrap();
        assert_eq!(flag, FailurePolicy::FailFast);
        assert_eq!(flag.to_string(), "fail_fast");
    }

    #[test]
    fn test_require_endpoint() {
        let mut profile = builtin_networks().remove("bsc").unwrap();
        assert!(profile.require_endpoint().is_ok());
        profile.url = "  ".to_string();
        assert!(matches!(
            profile.require_endpoint(),
            Err(Error::EmptyEndpoint(_))
        ));
    }

    #[test]
    fn test_explorer_tx_url() {
        assert_eq!(
            explorer_tx_url("https://bscscan.com/", "0xabc"),
            "https://bscscan.com/tx/0xabc"
        );
    }

    #[test]
    fn test_mask_url() {
        assert_eq!(
            mask_url("https://rpc.example.com?key=secret"),
            "https://rpc.example.com?***"
        );
        assert_eq!(mask_url("https://rpc.example.com"), "https://rpc.example.com");
    }

    #[test]
    fn test_masked_display_hides_keys() {
        let mut config = Config::default();
        config.networks.get_mut("bsc").unwrap().signer = SigningSource::Key {
            key: "deadbeef".to_string(),
        };
        let shown = config.masked_display();
        assert!(!shown.contains("deadbeef"));
        assert!(shown.contains("key(***)"));
    }
}
