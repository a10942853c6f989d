use ethers::types::{Address, U256};
use rust_decimal::Decimal;
use std::env;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::constants::{
    DEFAULT_CHAIN_ID, DEFAULT_MAX_GAS_LIMIT, DEFAULT_MAX_VALUE, DEFAULT_PREPARED_TX_TTL_SECS,
    DEFAULT_RECEIPT_POLL_INTERVAL_MS, DEFAULT_RECEIPT_TIMEOUT_SECS, MAX_CHAIN_ID,
};
use crate::crypto::signature::{LocalKeySigner, TxSigner};
use crate::error::{AppError, Result};
use crate::services::chain_rpc::RpcMethods;
use crate::services::fee_delegation::DelegationSettings;
use crate::services::validation::ValidationLimits;
use crate::utils::{native_to_peb, parse_address};

const RPC_METHOD_NAMES: [&str; 6] = [
    "estimate_gas",
    "gas_price",
    "get_transaction_count",
    "get_balance",
    "send_raw_transaction",
    "get_transaction_receipt",
];

/// Fee payer private key. Never printed.
#[derive(Clone)]
pub struct FeePayerKey(String);

impl FeePayerKey {
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for FeePayerKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("FeePayerKey(<redacted>)")
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    // Server
    pub host: String,
    pub port: u16,
    pub environment: String,

    // Blockchain
    pub kaia_rpc_url: String,
    pub chain_id: u64,
    pub rpc_methods: RpcMethods,

    // Fee payer
    pub fee_payer_private_key: FeePayerKey,
    pub fee_payer_address: Option<String>,

    // Exposure ceilings
    pub max_gas_limit: u64,
    pub max_value: Decimal,

    // Receipt polling
    pub receipt_timeout_secs: u64,
    pub receipt_poll_interval_ms: u64,

    // Prepared transactions
    pub prepared_tx_ttl_secs: u64,

    // CORS
    pub cors_allowed_origins: String,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds the config from any variable source.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var_or = |name: &str, default: &str| lookup(name).unwrap_or_else(|| default.to_string());

        let namespace = var_or("RPC_METHOD_NAMESPACE", "klay");
        let mut rpc_methods = match namespace.trim() {
            "klay" => RpcMethods::klay(),
            "eth" => RpcMethods::eth(),
            other => anyhow::bail!("RPC_METHOD_NAMESPACE must be `klay` or `eth`, got `{}`", other),
        };
        for name in RPC_METHOD_NAMES {
            let key = format!("RPC_METHOD_{}", name.to_ascii_uppercase());
            if let Some(method) = lookup(&key).filter(|m| !m.trim().is_empty()) {
                rpc_methods.set(name, method.trim().to_string());
            }
        }

        Ok(Config {
            host: var_or("HOST", "0.0.0.0"),
            port: var_or("PORT", "3000").parse()?,
            environment: var_or("ENVIRONMENT", "development"),

            kaia_rpc_url: lookup("KAIA_RPC_URL")
                .ok_or_else(|| anyhow::anyhow!("KAIA_RPC_URL is not set"))?,
            chain_id: var_or("CHAIN_ID", &DEFAULT_CHAIN_ID.to_string()).parse()?,
            rpc_methods,

            fee_payer_private_key: FeePayerKey(
                lookup("FEE_PAYER_PRIVATE_KEY")
                    .ok_or_else(|| anyhow::anyhow!("FEE_PAYER_PRIVATE_KEY is not set"))?,
            ),
            fee_payer_address: lookup("FEE_PAYER_ADDRESS").filter(|a| !a.trim().is_empty()),

            max_gas_limit: var_or("MAX_GAS_LIMIT", &DEFAULT_MAX_GAS_LIMIT.to_string()).parse()?,
            max_value: Decimal::from_str(&var_or("MAX_VALUE", DEFAULT_MAX_VALUE))?,

            receipt_timeout_secs: var_or(
                "RECEIPT_TIMEOUT_SECS",
                &DEFAULT_RECEIPT_TIMEOUT_SECS.to_string(),
            )
            .parse()?,
            receipt_poll_interval_ms: var_or(
                "RECEIPT_POLL_INTERVAL_MS",
                &DEFAULT_RECEIPT_POLL_INTERVAL_MS.to_string(),
            )
            .parse()?,

            prepared_tx_ttl_secs: var_or(
                "PREPARED_TX_TTL_SECS",
                &DEFAULT_PREPARED_TX_TTL_SECS.to_string(),
            )
            .parse()?,

            cors_allowed_origins: var_or("CORS_ALLOWED_ORIGINS", "*"),
        })
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        let rpc_url = url::Url::parse(self.kaia_rpc_url.trim())
            .map_err(|e| anyhow::anyhow!("KAIA_RPC_URL is not a valid URL: {}", e))?;
        if !matches!(rpc_url.scheme(), "http" | "https") {
            anyhow::bail!("KAIA_RPC_URL must use http or https");
        }
        if self.chain_id > MAX_CHAIN_ID {
            anyhow::bail!("CHAIN_ID must be at most {}", MAX_CHAIN_ID);
        }
        if self.fee_payer_private_key.expose().trim().is_empty() {
            anyhow::bail!("FEE_PAYER_PRIVATE_KEY is empty");
        }
        if let Some(address) = &self.fee_payer_address {
            if parse_address(address.trim()).is_none() {
                anyhow::bail!("FEE_PAYER_ADDRESS is not a 20-byte hex address");
            }
        }
        if self.max_gas_limit == 0 {
            anyhow::bail!("MAX_GAS_LIMIT must be > 0");
        }
        self.max_value_peb()?;
        if self.receipt_poll_interval_ms == 0 {
            anyhow::bail!("RECEIPT_POLL_INTERVAL_MS must be > 0");
        }
        if self.prepared_tx_ttl_secs == 0 {
            anyhow::bail!("PREPARED_TX_TTL_SECS must be > 0");
        }
        if self.receipt_timeout_secs == 0 {
            tracing::warn!("RECEIPT_TIMEOUT_SECS is 0; every delegation will report pending");
        }
        if self.cors_allowed_origins.trim().is_empty() {
            tracing::warn!("CORS_ALLOWED_ORIGINS is empty; requests may be blocked");
        }

        Ok(())
    }

    pub fn is_testnet(&self) -> bool {
        self.environment == "development" || self.environment == "testnet" || self.chain_id == DEFAULT_CHAIN_ID
    }

    /// `MAX_VALUE` in peb.
    pub fn max_value_peb(&self) -> Result<U256> {
        native_to_peb(self.max_value).ok_or_else(|| {
            AppError::Configuration(format!(
                "MAX_VALUE {} is not a non-negative amount with at most 18 decimals",
                self.max_value
            ))
        })
    }

    pub fn validation_limits(&self) -> Result<ValidationLimits> {
        Ok(ValidationLimits {
            max_gas_limit: self.max_gas_limit,
            max_value: self.max_value_peb()?,
        })
    }

    pub fn delegation_settings(&self) -> Result<DelegationSettings> {
        Ok(DelegationSettings {
            chain_id: self.chain_id,
            limits: self.validation_limits()?,
            receipt_timeout: Duration::from_secs(self.receipt_timeout_secs),
            poll_interval: Duration::from_millis(self.receipt_poll_interval_ms),
            prepared_ttl: Duration::from_secs(self.prepared_tx_ttl_secs),
        })
    }

    /// Loads the fee payer wallet. Fails with `Configuration` when the key is
    /// unusable or does not belong to `FEE_PAYER_ADDRESS`.
    pub fn fee_payer_signer(&self) -> Result<Arc<dyn TxSigner>> {
        let signer = LocalKeySigner::from_hex(self.fee_payer_private_key.expose())?;
        if let Some(expected) = &self.fee_payer_address {
            let expected: Address = parse_address(expected.trim()).ok_or_else(|| {
                AppError::Configuration("FEE_PAYER_ADDRESS is not a 20-byte hex address".to_string())
            })?;
            if signer.address() != expected {
                return Err(AppError::Configuration(format!(
                    "FEE_PAYER_PRIVATE_KEY belongs to {:?}, FEE_PAYER_ADDRESS is {:?}",
                    signer.address(),
                    expected
                )));
            }
        }
        Ok(Arc::new(signer))
    }
}
