//! Network resolution with fork support

use tracing::{debug, info, warn};

use crate::config::{Config, NetworkProfile};
use crate::error::{Error, Result};

/// Fork parameters copied from a source network
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForkSettings {
    /// Identifier of the network being mirrored
    pub source: String,

    /// Endpoint state is forked from
    pub url: String,

    /// Chain identifier declared by the source, if any
    pub chain_id: Option<u64>,

    /// Whether local deployment records are wiped on start
    pub reset: bool,

    /// Whether the local node may write forked state to disk
    pub persist: bool,
}

/// Effective network for one command invocation
#[derive(Debug, Clone, PartialEq)]
pub struct NetworkContext {
    /// Profile after fork overrides were applied
    pub profile: NetworkProfile,

    /// Present when running as a fork of another network
    pub fork: Option<ForkSettings>,
}

impl NetworkContext {
    pub fn name(&self) -> &str {
        &self.profile.name
    }

    pub fn chain_id(&self) -> Option<u64> {
        self.profile.chain_id
    }

    pub fn is_fork(&self) -> bool {
        self.fork.is_some()
    }

    /// False while impersonating another network
    pub fn persists_state(&self) -> bool {
        self.fork.as_ref().map_or(true, |fork| fork.persist)
    }

    /// Network whose deployment records apply; the fork source when forked
    pub fn deployment_network(&self) -> &str {
        self.fork
            .as_ref()
            .map_or(self.name(), |fork| fork.source.as_str())
    }
}

/// Maps identifiers to effective network contexts
pub struct NetworkResolver<'a> {
    config: &'a Config,
}

impl<'a> NetworkResolver<'a> {
    pub fn new(config: &'a Config) -> Self {
        Self { config }
    }

    /// Resolve `name` (or the default network), optionally forked from `fork_from`.
    ///
    /// An unknown `name` falls back to the default network with a warning;
    /// it is an error only when no default exists either. An unknown
    /// `fork_from` leaves the context exactly as it would be without a fork.
    pub fn resolve(&self, name: Option<&str>, fork_from: Option<&str>) -> Result<NetworkContext> {
        let profile = self.profile(name)?;
        let mut context = NetworkContext {
            profile: profile.clone(),
            fork: None,
        };

        if let Some(source_name) = fork_from {
            match self.config.network(source_name) {
                Some(source) => match source.require_endpoint() {
                    Ok(_) => apply_fork(&mut context, source),
                    Err(e) => warn!("Not forking from {}: {}", source_name, e),
                },
                None => warn!(
                    "Fork source '{}' is not a configured network; starting without fork",
                    source_name
                ),
            }
        }

        debug!(
            "Resolved network {} (chain_id={:?}, fork={:?})",
            context.name(),
            context.chain_id(),
            context.fork.as_ref().map(|f| &f.source)
        );

        Ok(context)
    }

    fn profile(&self, name: Option<&str>) -> Result<&'a NetworkProfile> {
        let default = self.config.default_network.as_str();
        let requested = name.unwrap_or(default);

        if let Some(profile) = self.config.network(requested) {
            return Ok(profile);
        }

        match self.config.network(default) {
            Some(profile) => {
                warn!(
                    "Unknown network '{}', falling back to default network '{}'",
                    requested, default
                );
                Ok(profile)
            }
            None => Err(Error::UnknownNetwork(requested.to_string())),
        }
    }
}

fn apply_fork(context: &mut NetworkContext, source: &NetworkProfile) {
    info!(
        "Forking {} from {} (chain_id={:?})",
        context.profile.name, source.name, source.chain_id
    );

    if let Some(chain_id) = source.chain_id {
        context.profile.chain_id = Some(chain_id);
    }

    // Forked contracts keep the source network's owners
    context.profile.accounts.overlay(&source.accounts);

    context.fork = Some(ForkSettings {
        source: source.name.clone(),
        url: source.url.clone(),
        chain_id: source.chain_id,
        reset: false,
        persist: false,
    });
}
