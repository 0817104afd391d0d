//! In-memory doubles for operation tests

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use ethers::types::{Address, Bytes, TxHash, H256};

use crate::contracts::ContractResolver;
use crate::error::{Error, Result};

use super::client::{ChainClient, Confirmation};
use super::report::{OperationEvent, Reporter};

#[derive(Debug, Clone)]
pub struct Submission {
    pub to: Address,
    pub data: Bytes,
    pub tx: TxHash,
}

/// Accepts every call unless told otherwise; hashes are sequential
#[derive(Debug, Default)]
pub struct MockChainClient {
    rejected: HashMap<Address, String>,
    reverting: HashSet<Address>,
    /// Every target `submit` was called with, accepted or not
    attempts: Mutex<Vec<Address>>,
    submissions: Mutex<Vec<Submission>>,
}

impl MockChainClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse submissions to `to` with `reason`
    pub fn reject(mut self, to: Address, reason: &str) -> Self {
        self.rejected.insert(to, reason.to_string());
        self
    }

    /// Accept submissions to `to` but revert them on-chain
    pub fn revert_receipt(mut self, to: Address) -> Self {
        self.reverting.insert(to);
        self
    }

    pub fn attempts(&self) -> Vec<Address> {
        self.attempts.lock().unwrap().clone()
    }

    /// Calls the node accepted
    pub fn submissions(&self) -> Vec<Submission> {
        self.submissions.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChainClient for MockChainClient {
    fn sender(&self) -> Address {
        Address::from_low_u64_be(0xdead)
    }

    async fn submit(&self, to: Address, data: Bytes) -> Result<TxHash> {
        self.attempts.lock().unwrap().push(to);
        if let Some(reason) = self.rejected.get(&to) {
            return Err(Error::Submission(reason.clone()));
        }
        let mut submissions = self.submissions.lock().unwrap();
        let tx = H256::from_low_u64_be(submissions.len() as u64 + 1);
        submissions.push(Submission { to, data, tx });
        Ok(tx)
    }

    async fn wait_for_confirmation(&self, tx: TxHash) -> Result<Confirmation> {
        let submissions = self.submissions.lock().unwrap();
        let submission = submissions
            .iter()
            .find(|s| s.tx == tx)
            .ok_or_else(|| Error::Confirmation(format!("unknown transaction {:?}", tx)))?;
        if self.reverting.contains(&submission.to) {
            return Err(Error::Reverted(format!("{:?}", tx)));
        }
        Ok(Confirmation {
            tx,
            block_number: Some(100 + tx.to_low_u64_be()),
            gas_used: Some(21_000u64.into()),
        })
    }
}

#[derive(Debug, Default)]
pub struct RecordingReporter {
    events: Mutex<Vec<OperationEvent>>,
}

impl RecordingReporter {
    pub fn events(&self) -> Vec<OperationEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl Reporter for RecordingReporter {
    fn report(&self, event: &OperationEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

/// Fixed `(network, name) -> address` table
#[derive(Debug, Default)]
pub struct StaticResolver {
    entries: HashMap<(String, String), Address>,
}

impl StaticResolver {
    pub fn with(mut self, network: &str, name: &str, address: Address) -> Self {
        self.entries
            .insert((network.to_string(), name.to_string()), address);
        self
    }
}

impl ContractResolver for StaticResolver {
    fn resolve(&self, network: &str, name: &str) -> Result<Address> {
        self.entries
            .get(&(network.to_string(), name.to_string()))
            .copied()
            .ok_or_else(|| Error::Resolution {
                network: network.to_string(),
                name: name.to_string(),
                reason: "not deployed".to_string(),
            })
    }
}
