use async_trait::async_trait;
use ethers::types::{Address, Bytes, H256, U256, U64};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::error::{AppError, Result};

fn rpc_request(method: &str, params: serde_json::Value, id: u64) -> serde_json::Value {
    serde_json::json!({
        "jsonrpc": "2.0",
        "method": method,
        "params": params,
        "id": id
    })
}

/// JSON-RPC method names. They differ between node versions (`klay_*` vs `eth_*`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpcMethods {
    pub estimate_gas: String,
    pub gas_price: String,
    pub get_transaction_count: String,
    pub get_balance: String,
    pub send_raw_transaction: String,
    pub get_transaction_receipt: String,
}

impl RpcMethods {
    pub fn with_namespace(namespace: &str) -> Self {
        Self {
            estimate_gas: format!("{namespace}_estimateGas"),
            gas_price: format!("{namespace}_gasPrice"),
            get_transaction_count: format!("{namespace}_getTransactionCount"),
            get_balance: format!("{namespace}_getBalance"),
            send_raw_transaction: format!("{namespace}_sendRawTransaction"),
            get_transaction_receipt: format!("{namespace}_getTransactionReceipt"),
        }
    }

    pub fn klay() -> Self {
        Self::with_namespace("klay")
    }

    pub fn eth() -> Self {
        Self::with_namespace("eth")
    }

    /// Replaces one entry by its logical name, e.g. `send_raw_transaction`.
    pub fn set(&mut self, name: &str, method: String) -> bool {
        let slot = match name {
            "estimate_gas" => &mut self.estimate_gas,
            "gas_price" => &mut self.gas_price,
            "get_transaction_count" => &mut self.get_transaction_count,
            "get_balance" => &mut self.get_balance,
            "send_raw_transaction" => &mut self.send_raw_transaction,
            "get_transaction_receipt" => &mut self.get_transaction_receipt,
            _ => return false,
        };
        *slot = method;
        true
    }
}

impl Default for RpcMethods {
    fn default() -> Self {
        Self::klay()
    }
}

/// Call object for gas estimation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GasEstimateRequest {
    pub from: Address,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to: Option<Address>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<U256>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input: Option<Bytes>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gas_price: Option<U256>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionReceipt {
    pub transaction_hash: H256,
    #[serde(default)]
    pub block_number: Option<U64>,
    #[serde(default)]
    pub status: Option<U64>,
    #[serde(default)]
    pub gas_used: Option<U256>,
    #[serde(default)]
    pub effective_gas_price: Option<U256>,
    #[serde(default)]
    pub gas_price: Option<U256>,
    #[serde(default)]
    pub fee_payer: Option<Address>,
}

impl TransactionReceipt {
    pub fn succeeded(&self) -> bool {
        self.status == Some(U64::one())
    }

    /// Older nodes only report `gasPrice`.
    pub fn effective_gas_price(&self) -> Option<U256> {
        self.effective_gas_price.or(self.gas_price)
    }
}

/// Node calls used by the pipeline.
#[async_trait]
pub trait ChainRpc: Send + Sync {
    async fn estimate_gas(&self, request: &GasEstimateRequest) -> Result<u64>;

    async fn gas_price(&self) -> Result<U256>;

    async fn get_transaction_count(&self, address: Address) -> Result<u64>;

    async fn get_balance(&self, address: Address) -> Result<U256>;

    /// Node rejections come back as `AppError::Relay` with the node's message.
    /// A failure in transit is `AppError::BroadcastUnknown`.
    async fn send_raw_transaction(&self, raw: &[u8]) -> Result<H256>;

    async fn get_transaction_receipt(&self, tx_hash: H256) -> Result<Option<TransactionReceipt>>;
}

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    #[serde(default = "Option::default")]
    result: Option<T>,
    #[serde(default)]
    error: Option<RpcErrorObject>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum RpcFailure {
    /// The node answered with an error object.
    Node(String),
    /// Sending or reading the response failed.
    Transport(String),
}

impl RpcFailure {
    fn into_read_error(self) -> AppError {
        match self {
            RpcFailure::Node(message) | RpcFailure::Transport(message) => {
                AppError::BlockchainRPC(message)
            }
        }
    }

    // Only a node answer proves the transaction was not taken.
    fn into_send_error(self) -> AppError {
        match self {
            RpcFailure::Node(message) => AppError::Relay(message),
            RpcFailure::Transport(message) => AppError::BroadcastUnknown(message),
        }
    }
}

/// HTTP JSON-RPC client for the chain node
pub struct JsonRpcClient {
    rpc_url: String,
    client: reqwest::Client,
    methods: RpcMethods,
    next_id: AtomicU64,
}

impl JsonRpcClient {
    pub fn new(rpc_url: String, methods: RpcMethods, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Configuration(format!("HTTP client: {}", e)))?;
        Ok(Self {
            rpc_url,
            client,
            methods,
            next_id: AtomicU64::new(1),
        })
    }

    // Sends one request and keeps node errors apart from transport errors.
    async fn call_raw<T: DeserializeOwned>(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> std::result::Result<Option<T>, RpcFailure> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = rpc_request(method, params, id);
        tracing::debug!(method, id, "rpc call");

        let response = self
            .client
            .post(&self.rpc_url)
            .json(&request)
            .send()
            .await
            .map_err(|e| RpcFailure::Transport(e.to_string()))?;

        let body: RpcResponse<T> = response
            .json()
            .await
            .map_err(|e| RpcFailure::Transport(e.to_string()))?;
        if let Some(error) = body.error {
            tracing::debug!(method, code = error.code, message = %error.message, "rpc error");
            return Err(RpcFailure::Node(error.message));
        }
        Ok(body.result)
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: serde_json::Value) -> Result<T> {
        self.call_raw(method, params)
            .await
            .map_err(RpcFailure::into_read_error)?
            .ok_or_else(|| AppError::BlockchainRPC(format!("{} returned no result", method)))
    }
}

#[async_trait]
impl ChainRpc for JsonRpcClient {
    async fn estimate_gas(&self, request: &GasEstimateRequest) -> Result<u64> {
        let gas: U64 = self
            .call(&self.methods.estimate_gas, serde_json::json!([request]))
            .await?;
        Ok(gas.as_u64())
    }

    async fn gas_price(&self) -> Result<U256> {
        self.call(&self.methods.gas_price, serde_json::json!([])).await
    }

    async fn get_transaction_count(&self, address: Address) -> Result<u64> {
        let count: U64 = self
            .call(
                &self.methods.get_transaction_count,
                serde_json::json!([address, "pending"]),
            )
            .await?;
        Ok(count.as_u64())
    }

    async fn get_balance(&self, address: Address) -> Result<U256> {
        self.call(&self.methods.get_balance, serde_json::json!([address, "latest"]))
            .await
    }

    async fn send_raw_transaction(&self, raw: &[u8]) -> Result<H256> {
        let raw_hex = format!("0x{}", hex::encode(raw));
        self.call_raw::<H256>(&self.methods.send_raw_transaction, serde_json::json!([raw_hex]))
            .await
            .map_err(RpcFailure::into_send_error)?
            .ok_or_else(|| AppError::Relay("node returned no transaction hash".to_string()))
    }

    async fn get_transaction_receipt(&self, tx_hash: H256) -> Result<Option<TransactionReceipt>> {
        self.call_raw(
            &self.methods.get_transaction_receipt,
            serde_json::json!([tx_hash]),
        )
        .await
        .map_err(RpcFailure::into_read_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rpc_request_sets_method_and_id() {
        let req = rpc_request("klay_gasPrice", serde_json::json!([]), 7);
        assert_eq!(req.get("method").and_then(|v| v.as_str()), Some("klay_gasPrice"));
        assert_eq!(req.get("id").and_then(|v| v.as_u64()), Some(7));
    }

    #[test]
    fn method_map_presets_and_overrides() {
        let mut methods = RpcMethods::default();
        assert_eq!(methods.send_raw_transaction, "klay_sendRawTransaction");
        assert_eq!(RpcMethods::eth().get_transaction_receipt, "eth_getTransactionReceipt");

        assert!(methods.set("gas_price", "kaia_gasPrice".to_string()));
        assert_eq!(methods.gas_price, "kaia_gasPrice");
        assert!(!methods.set("chain_id", "eth_chainId".to_string()));
    }

    #[test]
    fn receipt_parses_node_json() {
        let json = serde_json::json!({
            "transactionHash": format!("0x{}", "ab".repeat(32)),
            "blockNumber": "0x10",
            "status": "0x1",
            "gasUsed": "0x5208",
            "gasPrice": "0x5d21dba00",
            "feePayer": format!("0x{}", "cc".repeat(20))
        });
        let receipt: TransactionReceipt = serde_json::from_value(json).unwrap();
        assert!(receipt.succeeded());
        assert_eq!(receipt.gas_used, Some(U256::from(21_000)));
        assert_eq!(receipt.effective_gas_price(), Some(U256::from(25_000_000_000u64)));
    }

    #[test]
    fn null_result_is_none() {
        let body: RpcResponse<TransactionReceipt> =
            serde_json::from_value(serde_json::json!({"jsonrpc": "2.0", "id": 1, "result": null}))
                .unwrap();
        assert!(body.result.is_none());
        assert!(body.error.is_none());
    }

    #[test]
    fn estimate_request_omits_absent_fields() {
        let request = GasEstimateRequest {
            from: Address::repeat_byte(0xaa),
            ..GasEstimateRequest::default()
        };
        let json = serde_json::to_value(&request).unwrap();
        assert!(json.get("to").is_none());
        assert!(json.get("from").is_some());
    }

    #[test]
    fn send_failures_split_rejection_from_unknown() {
        let rejected = RpcFailure::Node("nonce too low".to_string()).into_send_error();
        assert!(matches!(rejected, AppError::Relay(msg) if msg == "nonce too low"));

        let unknown = RpcFailure::Transport("operation timed out".to_string()).into_send_error();
        assert!(matches!(unknown, AppError::BroadcastUnknown(_)));

        let read = RpcFailure::Transport("connection reset".to_string()).into_read_error();
        assert!(matches!(read, AppError::BlockchainRPC(_)));
    }

    #[tokio::test]
    async fn unreachable_node_makes_the_broadcast_unknown() {
        let client = JsonRpcClient::new(
            "http://127.0.0.1:9".to_string(),
            RpcMethods::default(),
            Duration::from_secs(2),
        )
        .unwrap();
        let err = client.send_raw_transaction(&[0x09, 0xc0]).await.unwrap_err();
        assert!(matches!(err, AppError::BroadcastUnknown(_)));
    }
}
