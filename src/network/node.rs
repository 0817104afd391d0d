//! Local node launch for `start-network`

use std::process::{ExitStatus, Stdio};

use tokio::process::Command;
use tracing::{info, warn};
use url::Url;

use crate::config::NodeConfig;
use crate::error::{Error, Result};

use super::resolver::NetworkContext;

/// Command line for a local development node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeLaunch {
    pub program: String,
    pub args: Vec<String>,
}

impl NodeLaunch {
    /// Build the node command line for an effective network context.
    ///
    /// Host and port come from the local profile's endpoint. When forking,
    /// the fork endpoint is passed through and on-disk state caching is
    /// disabled.
    pub fn from_context(context: &NetworkContext, node: &NodeConfig) -> Result<Self> {
        let endpoint = context.profile.require_endpoint()?;
        let url = Url::parse(endpoint)
            .map_err(|e| Error::Config(format!("Invalid endpoint {}: {}", endpoint, e)))?;

        let mut args = Vec::new();

        if let Some(host) = url.host_str() {
            args.push("--host".to_string());
            args.push(host.to_string());
        }
        if let Some(port) = url.port_or_known_default() {
            args.push("--port".to_string());
            args.push(port.to_string());
        }
        if let Some(chain_id) = context.chain_id() {
            args.push("--chain-id".to_string());
            args.push(chain_id.to_string());
        }

        if let Some(fork) = &context.fork {
            args.push("--fork-url".to_string());
            args.push(fork.url.clone());
            if !fork.persist {
                args.push("--no-storage-caching".to_string());
            }
        }

        args.extend(node.extra_args.iter().cloned());

        Ok(Self {
            program: node.program.clone(),
            args,
        })
    }

    /// Command line with the fork endpoint masked, for logs
    pub fn display(&self) -> String {
        let mut parts = vec![self.program.clone()];
        let mut mask_next = false;
        for arg in &self.args {
            if mask_next {
                parts.push(crate::config::mask_url(arg));
                mask_next = false;
            } else {
                mask_next = arg == "--fork-url";
                parts.push(arg.clone());
            }
        }
        parts.join(" ")
    }
}

/// Run the node in the foreground until it exits or Ctrl-C is received
pub async fn run_local_node(launch: &NodeLaunch) -> Result<ExitStatus> {
    info!("Starting local node: {}", launch.display());

    let mut child = Command::new(&launch.program)
        .args(&launch.args)
        .stdin(Stdio::null())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| Error::Node(format!("failed to start {}: {}", launch.program, e)))?;

    tokio::select! {
        status = child.wait() => {
            let status = status.map_err(|e| Error::Node(e.to_string()))?;
            if !status.success() {
                warn!("Local node exited with {}", status);
            }
            Ok(status)
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupt received, stopping local node");
            child.kill().await.map_err(|e| Error::Node(e.to_string()))?;
            child.wait().await.map_err(|e| Error::Node(e.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::network::NetworkResolver;

    #[test]
    fn test_plain_local_node() {
        let config = Config::default();
        let context = NetworkResolver::new(&config)
            .resolve(Some("localhost"), None)
            .unwrap();
        let launch = NodeLaunch::from_context(&context, &config.node).unwrap();

        assert_eq!(launch.program, "anvil");
        assert_eq!(
            launch.args,
            vec!["--host", "127.0.0.1", "--port", "8545", "--chain-id", "31337"]
        );
    }

    #[test]
    fn test_forked_node_uses_source_chain_and_no_caching() {
        let config = Config::default();
        let context = NetworkResolver::new(&config)
            .resolve(Some("localhost"), Some("bsc"))
            .unwrap();
        let launch = NodeLaunch::from_context(&context, &config.node).unwrap();

        let joined = launch.args.join(" ");
        assert!(joined.contains("--chain-id 56"));
        assert!(joined.contains("--fork-url https://bsc-dataseed2.defibit.io/"));
        assert!(joined.contains("--no-storage-caching"));
    }

    #[test]
    fn test_display_masks_fork_url_secrets() {
        let launch = NodeLaunch {
            program: "anvil".to_string(),
            args: vec![
                "--fork-url".to_string(),
                "https://rpc.example.com?apikey=secret".to_string(),
            ],
        };
        assert_eq!(
            launch.display(),
            "anvil --fork-url https://rpc.example.com?***"
        );
    }

    #[tokio::test]
    async fn test_missing_program_is_reported() {
        let launch = NodeLaunch {
            program: "definitely-not-a-node-binary".to_string(),
            args: vec![],
        };
        let result = run_local_node(&launch).await;
        assert!(matches!(result, Err(Error::Node(_))));
    }
}
