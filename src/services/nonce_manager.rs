use ethers::types::{Address, H256};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tokio::time::{Duration, Instant};

use super::chain_rpc::ChainRpc;
use crate::error::Result;
use crate::transaction::types::Transaction;

/// A transaction handed out by `prepare`, waiting for the sender's signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedTx {
    pub signing_hash: H256,
    pub transaction: Transaction,
}

// A nonce held for one sender. It lapses at `expires_at` unless the chain
// count has already moved past it.
#[derive(Debug)]
struct Lease {
    expires_at: Instant,
    prepared: Option<PreparedTx>,
}

#[derive(Debug, Default)]
struct SenderNonces {
    leases: BTreeMap<u64, Lease>,
}

impl SenderNonces {
    fn prune(&mut self, on_chain: u64, now: Instant) {
        // below the chain count means mined or pooled
        self.leases = self.leases.split_off(&on_chain);
        self.leases.retain(|_, lease| lease.expires_at > now);
    }

    // Lowest nonce at or above the chain count that nobody holds.
    fn lowest_free(&self, on_chain: u64) -> u64 {
        let mut nonce = on_chain;
        for held in self.leases.keys() {
            if *held != nonce {
                break;
            }
            nonce += 1;
        }
        nonce
    }
}

/// Per-sender nonce leases.
///
/// Each sender has its own async mutex, so concurrent requests for one address
/// get distinct nonces while different senders never wait on each other. A
/// lease that is neither broadcast nor released lapses after the TTL, so an
/// abandoned prepare cannot leave a permanent gap.
pub struct NonceManager {
    serialized: bool,
    ttl: Duration,
    senders: RwLock<HashMap<Address, Arc<Mutex<SenderNonces>>>>,
}

impl NonceManager {
    pub fn new(ttl: Duration) -> Self {
        Self {
            serialized: true,
            ttl,
            senders: RwLock::new(HashMap::new()),
        }
    }

    /// Hands out the raw on-chain count with no bookkeeping.
    #[cfg(test)]
    pub fn unserialized() -> Self {
        Self {
            serialized: false,
            ttl: Duration::ZERO,
            senders: RwLock::new(HashMap::new()),
        }
    }

    async fn slot(&self, sender: Address) -> Arc<Mutex<SenderNonces>> {
        if let Some(slot) = self.senders.read().await.get(&sender) {
            return slot.clone();
        }
        self.senders
            .write()
            .await
            .entry(sender)
            .or_default()
            .clone()
    }

    /// Leases the lowest free nonce for `sender`.
    pub async fn reserve(&self, rpc: &dyn ChainRpc, sender: Address) -> Result<u64> {
        if !self.serialized {
            return rpc.get_transaction_count(sender).await;
        }

        let slot = self.slot(sender).await;
        let mut nonces = slot.lock().await;
        let on_chain = rpc.get_transaction_count(sender).await?;
        let now = Instant::now();
        nonces.prune(on_chain, now);

        let nonce = nonces.lowest_free(on_chain);
        nonces.leases.insert(
            nonce,
            Lease {
                expires_at: now + self.ttl,
                prepared: None,
            },
        );
        tracing::debug!(
            "Leased nonce {} for {:?} (chain {}, {} held)",
            nonce,
            sender,
            on_chain,
            nonces.leases.len()
        );
        Ok(nonce)
    }

    /// Parks the prepared transaction on its lease until the sender signs.
    pub async fn hold_prepared(&self, sender: Address, prepared: PreparedTx) {
        if !self.serialized {
            return;
        }

        let slot = self.slot(sender).await;
        let mut nonces = slot.lock().await;
        if let Some(lease) = nonces.leases.get_mut(&prepared.transaction.nonce()) {
            lease.prepared = Some(prepared);
        }
    }

    /// Takes the first live prepared transaction accepted by `matches`. The
    /// lease stays held by the caller, who must `mark_sent` or `release` it.
    pub async fn claim<F>(&self, sender: Address, matches: F) -> Option<PreparedTx>
    where
        F: Fn(&PreparedTx) -> bool,
    {
        if !self.serialized {
            return None;
        }

        let slot = self.slot(sender).await;
        let mut nonces = slot.lock().await;
        let now = Instant::now();
        let ttl = self.ttl;
        nonces.leases.values_mut().find_map(|lease| {
            if lease.expires_at <= now || !lease.prepared.as_ref().is_some_and(&matches) {
                return None;
            }
            lease.expires_at = now + ttl;
            lease.prepared.take()
        })
    }

    /// Keeps a broadcast nonce held until the chain count covers it.
    pub async fn mark_sent(&self, sender: Address, nonce: u64) {
        if !self.serialized {
            return;
        }

        let slot = self.slot(sender).await;
        let mut nonces = slot.lock().await;
        if let Some(lease) = nonces.leases.get_mut(&nonce) {
            lease.expires_at = Instant::now() + self.ttl;
            lease.prepared = None;
        }
    }

    /// Frees a leased nonce whose transaction never reached the chain.
    pub async fn release(&self, sender: Address, nonce: u64) {
        if !self.serialized {
            return;
        }

        let slot = self.slot(sender).await;
        let mut nonces = slot.lock().await;
        if nonces.leases.remove(&nonce).is_some() {
            tracing::debug!("Released nonce {} for {:?}", nonce, sender);
        }
    }
}
