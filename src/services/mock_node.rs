//! In-memory node used by the service tests.

use async_trait::async_trait;
use ethers::types::{Address, H256, U256, U64};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use super::chain_rpc::{ChainRpc, GasEstimateRequest, TransactionReceipt};
use crate::crypto::hash::keccak256;
use crate::error::{AppError, Result};
use crate::transaction::encoding::decode_signed;

pub struct MockNode {
    calls: AtomicUsize,
    pub gas_price: U256,
    pub balance: U256,
    pub estimate: u64,
    /// When false, receipts are never returned.
    pub mines: bool,
    /// When true, every broadcast is lost in transit before reaching the pool.
    pub loses_broadcasts: bool,
    /// Node error returned for every broadcast.
    pub rejects_with: Option<String>,
    counts: Mutex<HashMap<Address, u64>>,
    // Future-nonce transactions waiting for the gap below them to fill.
    queued: Mutex<HashMap<Address, BTreeMap<u64, (H256, TransactionReceipt)>>>,
    receipts: Mutex<HashMap<H256, TransactionReceipt>>,
    sent: Mutex<Vec<Vec<u8>>>,
}

impl Default for MockNode {
    fn default() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            gas_price: U256::from(25_000_000_000u64),
            balance: U256::exp10(18),
            estimate: 21_000,
            mines: true,
            loses_broadcasts: false,
            rejects_with: None,
            counts: Mutex::new(HashMap::new()),
            queued: Mutex::new(HashMap::new()),
            receipts: Mutex::new(HashMap::new()),
            sent: Mutex::new(Vec::new()),
        }
    }
}

impl MockNode {
    pub fn never_mines() -> Self {
        Self {
            mines: false,
            ..Self::default()
        }
    }

    pub fn with_balance(mut self, balance: U256) -> Self {
        self.balance = balance;
        self
    }

    pub fn with_estimate(mut self, estimate: u64) -> Self {
        self.estimate = estimate;
        self
    }

    pub fn losing_broadcasts(mut self) -> Self {
        self.loses_broadcasts = true;
        self
    }

    pub fn rejecting(mut self, message: &str) -> Self {
        self.rejects_with = Some(message.to_string());
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.sent.lock().unwrap().clone()
    }

    pub fn set_count(&self, address: Address, count: u64) {
        self.counts.lock().unwrap().insert(address, count);
    }

    /// Transactions still parked behind a nonce gap.
    pub fn queued_nonces(&self, address: Address) -> Vec<u64> {
        self.queued
            .lock()
            .unwrap()
            .get(&address)
            .map(|queue| queue.keys().copied().collect())
            .unwrap_or_default()
    }

    fn tick(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }

    fn include(&self, tx_hash: H256, receipt: TransactionReceipt) {
        if self.mines {
            self.receipts.lock().unwrap().insert(tx_hash, receipt);
        }
    }
}

#[async_trait]
impl ChainRpc for MockNode {
    async fn estimate_gas(&self, _request: &GasEstimateRequest) -> Result<u64> {
        self.tick();
        Ok(self.estimate)
    }

    async fn gas_price(&self) -> Result<U256> {
        self.tick();
        Ok(self.gas_price)
    }

    async fn get_transaction_count(&self, address: Address) -> Result<u64> {
        self.tick();
        Ok(*self.counts.lock().unwrap().get(&address).unwrap_or(&0))
    }

    async fn get_balance(&self, _address: Address) -> Result<U256> {
        self.tick();
        Ok(self.balance)
    }

    async fn send_raw_transaction(&self, raw: &[u8]) -> Result<H256> {
        self.tick();
        if self.loses_broadcasts {
            return Err(AppError::BroadcastUnknown("connection reset by peer".to_string()));
        }
        if let Some(message) = &self.rejects_with {
            return Err(AppError::Relay(message.clone()));
        }
        let decoded = decode_signed(raw).map_err(|e| AppError::Relay(e.to_string()))?;
        let from = decoded.tx.from();
        let nonce = decoded.tx.nonce();

        let tx_hash = keccak256(raw);
        let receipt = TransactionReceipt {
            transaction_hash: tx_hash,
            block_number: Some(U64::from(100)),
            status: Some(U64::one()),
            gas_used: Some(U256::from(decoded.tx.gas_limit().min(21_000))),
            effective_gas_price: None,
            gas_price: Some(decoded.tx.common().gas_price),
            fee_payer: decoded.fee_payer.map(|(address, _)| address),
        };

        let mut counts = self.counts.lock().unwrap();
        let count = counts.entry(from).or_insert(0);
        let mut queued = self.queued.lock().unwrap();
        let queue = queued.entry(from).or_default();
        if nonce < *count {
            return Err(AppError::Relay("nonce too low".to_string()));
        }
        if queue.contains_key(&nonce) {
            return Err(AppError::Relay("known transaction".to_string()));
        }
        self.sent.lock().unwrap().push(raw.to_vec());

        if nonce > *count {
            queue.insert(nonce, (tx_hash, receipt));
        } else {
            *count += 1;
            self.include(tx_hash, receipt);
            while let Some((hash, receipt)) = queue.remove(&*count) {
                *count += 1;
                self.include(hash, receipt);
            }
        }
        Ok(tx_hash)
    }

    async fn get_transaction_receipt(&self, tx_hash: H256) -> Result<Option<TransactionReceipt>> {
        self.tick();
        Ok(self.receipts.lock().unwrap().get(&tx_hash).cloned())
    }
}
