use ethers::types::{Address, H256, U256};
use serde::{Deserialize, Serialize};

use crate::crypto::signature::TxSignature;
use crate::transaction::types::Transaction;

// ==================== REQUEST ====================
/// Inbound request for both `prepare` and `delegate`. Quantities are decimal
/// or `0x`-hex strings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DelegationRequest {
    pub from: String,
    pub to: Option<String>,
    pub data: Option<String>,
    pub gas: Option<String>,
    pub gas_price: Option<String>,
    pub value: Option<String>,
    pub memo: Option<String>,
    #[serde(rename = "type")]
    pub tx_type: Option<String>,
    /// Explicit nonce. Optional on `delegate`: the prepared transaction is
    /// found from the signature while its lease is live.
    pub nonce: Option<u64>,
    pub fee_ratio: Option<u8>,
    pub human_readable: Option<bool>,
    pub code_format: Option<u8>,
}

/// Detached sender signature: 65-byte compact hex or explicit components.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SignatureInput {
    Compact(String),
    Components(TxSignature),
}

/// What the sender brings to `delegate`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum SenderInput {
    /// Raw transaction already signed by the sender's own client.
    RawTransaction {
        #[serde(rename = "rawTransaction")]
        raw_transaction: String,
    },
    /// Signature over the `signingHash` returned by `prepare`.
    Signature { signature: SignatureInput },
}

#[derive(Debug, Clone, Deserialize)]
pub struct DelegateBody {
    #[serde(flatten)]
    pub request: DelegationRequest,
    pub sender: SenderInput,
}

// ==================== RESPONSE ====================
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrepareResponse {
    pub transaction: Transaction,
    pub signing_hash: H256,
    pub chain_id: u64,
    pub fee_payer: Address,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DelegationStatus {
    Confirmed,
    Reverted,
    /// Broadcast but no receipt within the wait window.
    Pending,
    Rejected,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DelegateResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<H256>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gas_used: Option<U256>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub effective_gas_price: Option<U256>,
    pub fee_payer: Address,
    pub status: DelegationStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// ==================== API RESPONSE ====================
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data,
        }
    }
}
