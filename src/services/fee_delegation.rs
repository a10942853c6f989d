use ethers::types::Address;
use std::sync::Arc;
use tokio::time::Duration;

use super::chain_rpc::{ChainRpc, GasEstimateRequest, JsonRpcClient};
use super::nonce_manager::{NonceManager, PreparedTx};
use super::relayer::RelayerService;
use super::validation::{ValidatedRequest, ValidationGuard, ValidationLimits};
use crate::config::Config;
use crate::constants::RPC_REQUEST_TIMEOUT_SECS;
use crate::crypto::signature::{parse_compact_hex, recover_signer, TxSigner};
use crate::error::{AppError, Result};
use crate::models::delegation::{
    DelegateResponse, DelegationRequest, DelegationStatus, PrepareResponse, SenderInput,
    SignatureInput,
};
use crate::transaction::state::{SenderSignedTx, TxOutcome, UnsignedTx};
use crate::transaction::types::{Transaction, TxFields};
use crate::utils::{parse_address, parse_hex_bytes};

/// Per-deployment knobs of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelegationSettings {
    pub chain_id: u64,
    pub limits: ValidationLimits,
    pub receipt_timeout: Duration,
    pub poll_interval: Duration,
    /// How long a prepared transaction keeps its nonce without being relayed.
    pub prepared_ttl: Duration,
}

// Where a missing nonce comes from.
enum NonceSource {
    Lease,
    Chain,
}

/// Fee delegation pipeline: validate, build, collect both signatures, relay.
pub struct FeeDelegationService {
    rpc: Arc<dyn ChainRpc>,
    fee_payer: Arc<dyn TxSigner>,
    guard: ValidationGuard,
    nonces: NonceManager,
    relayer: RelayerService,
    chain_id: u64,
}

impl FeeDelegationService {
    pub fn new(
        rpc: Arc<dyn ChainRpc>,
        fee_payer: Arc<dyn TxSigner>,
        settings: DelegationSettings,
    ) -> Self {
        Self {
            relayer: RelayerService::new(
                rpc.clone(),
                settings.receipt_timeout,
                settings.poll_interval,
            ),
            rpc,
            fee_payer,
            guard: ValidationGuard::new(settings.limits),
            nonces: NonceManager::new(settings.prepared_ttl),
            chain_id: settings.chain_id,
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let rpc = JsonRpcClient::new(
            config.kaia_rpc_url.clone(),
            config.rpc_methods.clone(),
            Duration::from_secs(RPC_REQUEST_TIMEOUT_SECS),
        )?;
        let fee_payer = config.fee_payer_signer()?;
        Ok(Self::new(Arc::new(rpc), fee_payer, config.delegation_settings()?))
    }

    #[cfg(test)]
    fn with_nonce_manager(mut self, nonces: NonceManager) -> Self {
        self.nonces = nonces;
        self
    }

    pub fn fee_payer(&self) -> Address {
        self.fee_payer.address()
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    /// Builds the transaction the sender has to sign and its signing hash.
    ///
    /// The transaction is kept with its nonce lease, so `delegate` can be
    /// called with the same request and only the signature added.
    pub async fn prepare_for_signing(&self, request: &DelegationRequest) -> Result<PrepareResponse> {
        let validated = self.guard.validate(request, self.rpc.as_ref()).await?;
        let (unsigned, lease) = self.build_unsigned(validated, NonceSource::Lease).await?;
        let signing_hash = unsigned.signing_hash();
        let transaction = unsigned.transaction().clone();

        if lease.is_some() {
            self.nonces
                .hold_prepared(
                    transaction.from(),
                    PreparedTx {
                        signing_hash,
                        transaction: transaction.clone(),
                    },
                )
                .await;
        }

        tracing::info!(
            "Prepared {} for {:?} (nonce {}, signing hash {:#x})",
            transaction.kind(),
            transaction.from(),
            transaction.nonce(),
            signing_hash
        );

        Ok(PrepareResponse {
            transaction,
            signing_hash,
            chain_id: self.chain_id,
            fee_payer: self.fee_payer.address(),
        })
    }

    /// Adds the fee payer signature to a sender-signed transaction, broadcasts
    /// it and waits for the receipt.
    ///
    /// Errors before or at broadcast are returned as `Err`. A receipt timeout
    /// is not an error here: the response carries the hash with status
    /// `pending`.
    pub async fn delegate(
        &self,
        request: &DelegationRequest,
        sender: SenderInput,
    ) -> Result<DelegateResponse> {
        let (sender_signed, lease) = match sender {
            SenderInput::RawTransaction { raw_transaction } => {
                self.accept_raw(request, &raw_transaction).await?
            }
            SenderInput::Signature { signature } => self.accept_signature(request, signature).await?,
        };

        let from = sender_signed.transaction().from();
        let nonce = sender_signed.transaction().nonce();
        let fully_signed = match sender_signed.sign_as_fee_payer(self.fee_payer.as_ref()) {
            Ok(fully_signed) => fully_signed,
            Err(err) => {
                self.release_lease(from, lease).await;
                return Err(err);
            }
        };

        let raw = fully_signed.raw_transaction();
        let tx_hash = match self.relayer.broadcast(&raw).await {
            Ok(tx_hash) => tx_hash,
            Err(err @ AppError::BroadcastUnknown(_)) => {
                // the node may hold it; the lease stays until the chain count or the TTL settles it
                if lease.is_some() {
                    self.nonces.mark_sent(from, nonce).await;
                }
                tracing::warn!("Broadcast for {:?} nonce {} unconfirmed: {}", from, nonce, err);
                return Err(err);
            }
            Err(err) => {
                self.release_lease(from, lease).await;
                let outcome = fully_signed.reject(err.to_string());
                tracing::warn!("Delegation for {:?} nonce {} ended: {:?}", from, nonce, outcome);
                return Err(err);
            }
        };

        let broadcast = fully_signed.into_broadcast(tx_hash);
        if lease.is_some() {
            self.nonces.mark_sent(broadcast.from, broadcast.nonce).await;
        }
        tracing::info!(
            "Relayed {:#x} for {:?} nonce {}",
            broadcast.tx_hash,
            broadcast.from,
            broadcast.nonce
        );

        let (outcome, error) = match self.relayer.await_receipt(tx_hash).await {
            Ok(receipt) => (broadcast.confirm(receipt), None),
            Err(err @ AppError::ReceiptTimeout { .. }) => (broadcast.timed_out(), Some(err.to_string())),
            Err(err) => return Err(err),
        };

        Ok(delegate_response(outcome, error))
    }

    // Mode (a): the sender's own client produced the raw transaction. A lease
    // is taken over only when the blob is exactly the prepared transaction.
    async fn accept_raw(
        &self,
        request: &DelegationRequest,
        raw_hex: &str,
    ) -> Result<(SenderSignedTx, Option<u64>)> {
        let claimed = parse_address(&request.from).ok_or_else(|| {
            AppError::Validation(format!("`from` is not a 20-byte hex address: {}", request.from))
        })?;
        let raw = parse_hex_bytes(raw_hex)
            .ok_or_else(|| AppError::BadRequest("`rawTransaction` is not hex encoded".to_string()))?;

        let sender_signed = SenderSignedTx::from_raw(&raw, self.chain_id)?;
        let tx = sender_signed.transaction();
        if tx.from() != claimed {
            return Err(AppError::Validation(format!(
                "raw transaction is from {:?}, request names {:?}",
                tx.from(),
                claimed
            )));
        }
        self.guard.check_transaction(tx)?;
        self.guard
            .check_balance(self.rpc.as_ref(), tx.from(), tx.value())
            .await?;

        let lease = self
            .nonces
            .claim(tx.from(), |prepared| prepared.transaction == *tx)
            .await
            .map(|prepared| prepared.transaction.nonce());

        tracing::debug!("Accepted sender-signed {} from {:?}", tx.kind(), tx.from());
        Ok((sender_signed, lease))
    }

    // Mode (b): a detached signature. The prepared transaction it signs is
    // looked up first; without one the transaction is rebuilt from the request.
    async fn accept_signature(
        &self,
        request: &DelegationRequest,
        signature: SignatureInput,
    ) -> Result<(SenderSignedTx, Option<u64>)> {
        let validated = self.guard.validate(request, self.rpc.as_ref()).await?;
        let signature = match signature {
            SignatureInput::Compact(hex) => parse_compact_hex(&hex, self.chain_id)?,
            SignatureInput::Components(signature) => signature,
        };

        let from = validated.from;
        let prepared = self
            .nonces
            .claim(from, |prepared| {
                validated.describes(&prepared.transaction)
                    && recover_signer(prepared.signing_hash, &signature).ok() == Some(from)
            })
            .await;
        let (unsigned, lease) = match prepared {
            Some(prepared) => {
                let nonce = prepared.transaction.nonce();
                tracing::debug!("Signature for {:?} matches prepared nonce {}", from, nonce);
                (UnsignedTx::new(prepared.transaction, self.chain_id), Some(nonce))
            }
            None => self.build_unsigned(validated, NonceSource::Chain).await?,
        };

        let nonce = unsigned.transaction().nonce();
        match unsigned.attach_sender_signature(signature) {
            Ok(sender_signed) => Ok((sender_signed, lease)),
            Err(err) => {
                self.release_lease(from, lease).await;
                tracing::warn!("Sender signature for {:?} nonce {} rejected: {}", from, nonce, err);
                Err(err)
            }
        }
    }

    /// Fills gas price, gas limit and nonce. The nonce is `Some` in the
    /// result only when it was leased here.
    async fn build_unsigned(
        &self,
        validated: ValidatedRequest,
        source: NonceSource,
    ) -> Result<(UnsignedTx, Option<u64>)> {
        let gas_price = match validated.gas_price {
            Some(price) => price,
            None => self.rpc.gas_price().await?,
        };
        let gas_limit = match validated.gas_limit {
            Some(gas) => gas,
            None => {
                let estimate = self
                    .rpc
                    .estimate_gas(&GasEstimateRequest {
                        from: validated.from,
                        to: validated.to,
                        value: Some(validated.value),
                        input: validated.input.clone(),
                        gas_price: Some(gas_price),
                    })
                    .await?;
                self.guard.check_gas(estimate)?;
                estimate
            }
        };

        let (nonce, lease) = match (validated.nonce, source) {
            (Some(nonce), _) => (nonce, None),
            (None, NonceSource::Lease) => {
                let nonce = self.nonces.reserve(self.rpc.as_ref(), validated.from).await?;
                (nonce, Some(nonce))
            }
            (None, NonceSource::Chain) => {
                (self.rpc.get_transaction_count(validated.from).await?, None)
            }
        };

        let fields = TxFields {
            nonce: Some(nonce),
            gas_price: Some(gas_price),
            gas_limit: Some(gas_limit),
            from: Some(validated.from),
            to: validated.to,
            value: Some(validated.value),
            input: validated.input,
            fee_ratio: validated.fee_ratio,
            human_readable: validated.human_readable,
            code_format: validated.code_format,
        };
        match Transaction::from_fields(validated.kind, fields) {
            Ok(tx) => Ok((UnsignedTx::new(tx, self.chain_id), lease)),
            Err(err) => {
                self.release_lease(validated.from, lease).await;
                Err(err)
            }
        }
    }

    async fn release_lease(&self, sender: Address, lease: Option<u64>) {
        if let Some(nonce) = lease {
            self.nonces.release(sender, nonce).await;
        }
    }
}

fn delegate_response(outcome: TxOutcome, error: Option<String>) -> DelegateResponse {
    match outcome {
        TxOutcome::Confirmed {
            tx_hash,
            fee_payer,
            receipt,
        } => {
            let success = receipt.succeeded();
            if success {
                tracing::info!("Transaction {:#x} confirmed", tx_hash);
            } else {
                tracing::warn!("Transaction {:#x} mined but reverted", tx_hash);
            }
            DelegateResponse {
                success,
                tx_hash: Some(tx_hash),
                gas_used: receipt.gas_used,
                effective_gas_price: receipt.effective_gas_price(),
                fee_payer,
                status: if success {
                    DelegationStatus::Confirmed
                } else {
                    DelegationStatus::Reverted
                },
                error: if success {
                    error
                } else {
                    Some("transaction reverted".to_string())
                },
            }
        }
        TxOutcome::TimedOut { tx_hash, fee_payer } => DelegateResponse {
            success: false,
            tx_hash: Some(tx_hash),
            gas_used: None,
            effective_gas_price: None,
            fee_payer,
            status: DelegationStatus::Pending,
            error,
        },
        TxOutcome::Rejected { fee_payer, reason } => DelegateResponse {
            success: false,
            tx_hash: None,
            gas_used: None,
            effective_gas_price: None,
            fee_payer,
            status: DelegationStatus::Rejected,
            error: Some(reason),
        },
    }
}
