use ethers::types::H256;
use std::sync::Arc;
use tokio::time::{sleep, Duration, Instant};

use super::chain_rpc::{ChainRpc, TransactionReceipt};
use crate::error::{AppError, Result};

pub struct RelayerService {
    rpc: Arc<dyn ChainRpc>,
    receipt_timeout: Duration,
    poll_interval: Duration,
}

impl RelayerService {
    pub fn new(rpc: Arc<dyn ChainRpc>, receipt_timeout: Duration, poll_interval: Duration) -> Self {
        Self {
            rpc,
            receipt_timeout,
            poll_interval,
        }
    }

    /// Single `send-raw-transaction` call. Never retried: a resend could
    /// duplicate a transaction the node already accepted.
    pub async fn broadcast(&self, raw: &[u8]) -> Result<H256> {
        match self.rpc.send_raw_transaction(raw).await {
            Ok(tx_hash) => {
                tracing::info!("Broadcast accepted: {:#x}", tx_hash);
                Ok(tx_hash)
            }
            Err(err) => {
                tracing::warn!("Broadcast failed: {}", err);
                Err(err)
            }
        }
    }

    pub async fn await_receipt(&self, tx_hash: H256) -> Result<TransactionReceipt> {
        self.await_receipt_with(tx_hash, self.receipt_timeout, self.poll_interval)
            .await
    }

    /// Polls for a receipt until `timeout` elapses.
    ///
    /// `ReceiptTimeout` means "unknown", not "failed": the transaction may
    /// still be mined later. Dropping the future only stops the local wait.
    pub async fn await_receipt_with(
        &self,
        tx_hash: H256,
        timeout: Duration,
        interval: Duration,
    ) -> Result<TransactionReceipt> {
        let started = Instant::now();
        let deadline = started + timeout;
        let tx_hash_hex = format!("{:#x}", tx_hash);
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            match self.rpc.get_transaction_receipt(tx_hash).await {
                Ok(Some(receipt)) => {
                    tracing::info!(
                        "Receipt for {} after {} polls (status {:?})",
                        tx_hash_hex,
                        attempt,
                        receipt.status
                    );
                    return Ok(receipt);
                }
                Ok(None) => {}
                Err(err) => {
                    tracing::warn!("Receipt poll {} for {} failed: {}", attempt, tx_hash_hex, err);
                }
            }

            let now = Instant::now();
            if now >= deadline {
                break;
            }
            sleep(interval.min(deadline - now)).await;
        }

        tracing::warn!(
            "No receipt for {} within {}s; outcome unknown",
            tx_hash_hex,
            timeout.as_secs()
        );
        Err(AppError::ReceiptTimeout {
            tx_hash: tx_hash_hex,
            waited_secs: started.elapsed().as_secs(),
        })
    }
}
