//! Chain access for submitting administrative transactions
//!
//! [`ChainClient`] is the seam between operation logic and the network:
//! one submission, one confirmation wait, no retries.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ethers::middleware::SignerMiddleware;
use ethers::providers::{Http, JsonRpcClient, Middleware, Provider};
use ethers::signers::{LocalWallet, Signer};
use ethers::types::{Address, Bytes, TransactionRequest, TxHash, U256, U64};
use tracing::{debug, info, warn};
use url::Url;

use crate::config::ExecutionConfig;
use crate::credentials::SigningIdentity;
use crate::error::{Error, Result};
use crate::network::NetworkContext;

/// A transaction that reached the required confirmation depth
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Confirmation {
    pub tx: TxHash,
    pub block_number: Option<u64>,
    pub gas_used: Option<U256>,
}

/// Submits calls and waits for their confirmation
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Address transactions are sent from
    fn sender(&self) -> Address;

    /// Broadcast one call; returns as soon as the node accepted it
    async fn submit(&self, to: Address, data: Bytes) -> Result<TxHash>;

    /// Block until `tx` is confirmed or known to have failed
    async fn wait_for_confirmation(&self, tx: TxHash) -> Result<Confirmation>;
}

/// JSON-RPC client backed by ethers, generic over the transport
pub struct EthersClient<P = Http> {
    provider: Provider<P>,

    /// Present when this process holds the key
    signer: Option<Arc<SignerMiddleware<Provider<P>, LocalWallet>>>,

    from: Address,

    chain_id: u64,

    gas_price: Option<U256>,

    confirmations: usize,

    poll_interval: Duration,
}

impl EthersClient<Http> {
    /// Connect to the context's endpoint with the given identity.
    ///
    /// The node's chain id wins over the configured one so that a forked
    /// local node still gets correctly replay-protected signatures.
    pub async fn connect(
        context: &NetworkContext,
        identity: SigningIdentity,
        execution: &ExecutionConfig,
    ) -> Result<Self> {
        let endpoint = context.profile.require_endpoint()?;
        let url = Url::parse(endpoint)
            .map_err(|e| Error::Config(format!("Invalid endpoint {}: {}", endpoint, e)))?;

        let http_client = reqwest::Client::builder()
            .timeout(context.profile.timeout())
            .build()
            .map_err(|e| Error::RpcConnection(e.to_string()))?;

        let provider = Provider::new(Http::new_with_client(url, http_client));
        Self::with_provider(provider, context, identity, execution).await
    }
}

impl<P: JsonRpcClient + Clone + 'static> EthersClient<P> {
    /// Bind an existing provider to `identity` after checking its chain id
    pub async fn with_provider(
        provider: Provider<P>,
        context: &NetworkContext,
        identity: SigningIdentity,
        execution: &ExecutionConfig,
    ) -> Result<Self> {
        let provider = provider.interval(execution.poll_interval());

        let node_chain_id = provider
            .get_chainid()
            .await
            .map_err(|e| Error::RpcConnection(format!("{}: {}", context.name(), e)))?
            .as_u64();

        if let Some(configured) = context.chain_id() {
            if configured != node_chain_id {
                warn!(
                    "Network {} is configured with chain_id {} but the node reports {}",
                    context.name(),
                    configured,
                    node_chain_id
                );
            }
        }

        let gas_price = context
            .profile
            .gas_price_gwei
            .map(|gwei| U256::from(gwei) * U256::exp10(9));

        let (signer, from) = match identity {
            SigningIdentity::Local(wallet) => {
                let wallet = wallet.with_chain_id(node_chain_id);
                let from = wallet.address();
                let middleware = SignerMiddleware::new(provider.clone(), wallet);
                (Some(Arc::new(middleware)), from)
            }
            SigningIdentity::Remote(address) => (None, address),
        };

        info!(
            "Connected to {} (chain_id={}) as {:?}",
            context.name(),
            node_chain_id,
            from
        );

        Ok(Self {
            provider,
            signer,
            from,
            chain_id: node_chain_id,
            gas_price,
            confirmations: execution.confirmations,
            poll_interval: execution.poll_interval(),
        })
    }

    /// Chain id reported by the node, used for signing
    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    fn request(&self, to: Address, data: Bytes) -> TransactionRequest {
        let mut tx = TransactionRequest::new().from(self.from).to(to).data(data);
        if let Some(gas_price) = self.gas_price {
            tx = tx.gas_price(gas_price);
        }
        tx
    }

    /// Poll until the head is `confirmations - 1` blocks past `mined`
    async fn wait_for_depth(&self, mined: u64) -> Result<()> {
        if self.confirmations <= 1 {
            return Ok(());
        }
        let target = mined + self.confirmations as u64 - 1;
        loop {
            let head = self
                .provider
                .get_block_number()
                .await
                .map_err(|e| Error::Confirmation(e.to_string()))?
                .as_u64();
            if head >= target {
                return Ok(());
            }
            debug!("At block {}, waiting for {}", head, target);
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

#[async_trait]
impl<P: JsonRpcClient + Clone + 'static> ChainClient for EthersClient<P> {
    fn sender(&self) -> Address {
        self.from
    }

    async fn submit(&self, to: Address, data: Bytes) -> Result<TxHash> {
        let tx = self.request(to, data);
        debug!("Submitting transaction: {:?}", tx);

        let hash = match &self.signer {
            Some(client) => client
                .send_transaction(tx, None)
                .await
                .map_err(|e| Error::Submission(e.to_string()))?
                .tx_hash(),
            None => self
                .provider
                .send_transaction(tx, None)
                .await
                .map_err(|e| Error::Submission(e.to_string()))?
                .tx_hash(),
        };

        Ok(hash)
    }

    async fn wait_for_confirmation(&self, tx: TxHash) -> Result<Confirmation> {
        let receipt = loop {
            let receipt = self
                .provider
                .get_transaction_receipt(tx)
                .await
                .map_err(|e| Error::Confirmation(e.to_string()))?;
            if let Some(receipt) = receipt {
                break receipt;
            }

            // Unmined and unknown to the node: it will never confirm
            let pending = self
                .provider
                .get_transaction(tx)
                .await
                .map_err(|e| Error::Confirmation(e.to_string()))?;
            if pending.is_none() {
                return Err(Error::Confirmation(format!(
                    "transaction {:?} was dropped from the mempool",
                    tx
                )));
            }

            debug!("Transaction {:?} pending", tx);
            tokio::time::sleep(self.poll_interval).await;
        };

        if receipt.status == Some(U64::zero()) {
            return Err(Error::Reverted(format!("{:?}", tx)));
        }

        let block_number = receipt.block_number.map(|n| n.as_u64());
        if let Some(mined) = block_number {
            self.wait_for_depth(mined).await?;
        }

        Ok(Confirmation {
            tx,
            block_number,
            gas_used: receipt.gas_used,
        })
    }
}
