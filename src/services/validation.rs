use ethers::types::{Address, Bytes, U256};

use super::chain_rpc::ChainRpc;
use crate::error::{AppError, Result};
use crate::models::delegation::DelegationRequest;
use crate::transaction::types::{Transaction, TxFields, TxKind};
use crate::utils::{format_native, is_hex_address, parse_address, parse_hex_bytes, parse_quantity, parse_u64};

/// Ceilings protecting the fee payer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidationLimits {
    pub max_gas_limit: u64,
    pub max_value: U256,
}

/// Request after every check has passed; addresses and quantities parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedRequest {
    pub kind: TxKind,
    pub from: Address,
    pub to: Option<Address>,
    pub gas_limit: Option<u64>,
    pub gas_price: Option<U256>,
    pub value: U256,
    pub input: Option<Bytes>,
    pub nonce: Option<u64>,
    pub fee_ratio: Option<u8>,
    pub human_readable: Option<bool>,
    pub code_format: Option<u8>,
}

impl ValidatedRequest {
    /// True when `tx` is what this request asks for. Fields the request left
    /// to the relay (gas, gas price, nonce) may hold any value.
    pub fn describes(&self, tx: &Transaction) -> bool {
        tx.kind() == self.kind
            && tx.from() == self.from
            && tx.to() == self.to
            && tx.value() == self.value
            && tx.input() == self.input.as_ref()
            && self.gas_limit.map_or(true, |gas| gas == tx.gas_limit())
            && self.gas_price.map_or(true, |price| price == tx.common().gas_price)
            && self.nonce.map_or(true, |nonce| nonce == tx.nonce())
    }
}

fn invalid(message: impl Into<String>) -> AppError {
    AppError::Validation(message.into())
}

pub struct ValidationGuard {
    limits: ValidationLimits,
}

impl ValidationGuard {
    pub fn new(limits: ValidationLimits) -> Self {
        Self { limits }
    }

    /// Full check, including the balance lookup when `value > 0`.
    pub async fn validate(
        &self,
        request: &DelegationRequest,
        rpc: &dyn ChainRpc,
    ) -> Result<ValidatedRequest> {
        let validated = self.check_request(request)?;
        self.check_balance(rpc, validated.from, validated.value).await?;
        Ok(validated)
    }

    /// Balance lookup, skipped entirely for zero-value transfers.
    pub async fn check_balance(&self, rpc: &dyn ChainRpc, from: Address, value: U256) -> Result<()> {
        if value.is_zero() {
            return Ok(());
        }
        let balance = rpc.get_balance(from).await?;
        if balance < value {
            return Err(invalid(format!(
                "balance of {:?} ({}) is below value {}",
                from,
                format_native(balance),
                format_native(value)
            )));
        }
        Ok(())
    }

    /// Every check that needs no I/O, in order: addresses, gas ceiling, value
    /// ceiling, supported type, then the field set of that type.
    pub fn check_request(&self, request: &DelegationRequest) -> Result<ValidatedRequest> {
        if !is_hex_address(&request.from) {
            return Err(invalid(format!("`from` is not a 20-byte hex address: {}", request.from)));
        }
        if let Some(to) = &request.to {
            if !is_hex_address(to) {
                return Err(invalid(format!("`to` is not a 20-byte hex address: {}", to)));
            }
        }
        let from = parse_address(&request.from)
            .ok_or_else(|| invalid("`from` is not a valid address"))?;
        let to = match &request.to {
            Some(to) => Some(parse_address(to).ok_or_else(|| invalid("`to` is not a valid address"))?),
            None => None,
        };

        let gas_limit = match &request.gas {
            Some(gas) => {
                let gas = parse_u64(gas).ok_or_else(|| invalid(format!("`gas` is not a quantity: {}", gas)))?;
                self.check_gas(gas)?;
                Some(gas)
            }
            None => None,
        };

        let value = match &request.value {
            Some(value) => parse_quantity(value)
                .ok_or_else(|| invalid(format!("`value` is not a quantity: {}", value)))?,
            None => U256::zero(),
        };
        self.check_value(value)?;

        let kind = match &request.tx_type {
            Some(name) => name.parse::<TxKind>()?,
            None => infer_kind(request),
        };
        if kind == TxKind::ValueTransferWithRatio {
            let ratio = request
                .fee_ratio
                .ok_or_else(|| invalid("`feeRatio` is required for ValueTransferWithRatio"))?;
            if ratio > crate::constants::MAX_FEE_RATIO {
                return Err(invalid(format!("`feeRatio` must be within 0..=99, got {}", ratio)));
            }
        }

        let gas_price = match &request.gas_price {
            Some(price) => Some(
                parse_quantity(price)
                    .ok_or_else(|| invalid(format!("`gasPrice` is not a quantity: {}", price)))?,
            ),
            None => None,
        };
        let input = match (&request.memo, &request.data) {
            (Some(_), Some(_)) => return Err(invalid("`memo` and `data` cannot both be set")),
            (Some(memo), None) => Some(Bytes::from(memo.as_bytes().to_vec())),
            (None, Some(data)) => Some(
                parse_hex_bytes(data).ok_or_else(|| invalid("`data` is not hex encoded"))?,
            ),
            (None, None) => None,
        };
        kind.check_fields(&TxFields {
            to,
            value: Some(value),
            input: input.clone(),
            fee_ratio: request.fee_ratio,
            human_readable: request.human_readable,
            code_format: request.code_format,
            ..TxFields::default()
        })?;

        Ok(ValidatedRequest {
            kind,
            from,
            to,
            gas_limit,
            gas_price,
            value,
            input,
            nonce: request.nonce,
            fee_ratio: request.fee_ratio,
            human_readable: request.human_readable,
            code_format: request.code_format,
        })
    }

    pub fn check_gas(&self, gas: u64) -> Result<()> {
        if gas > self.limits.max_gas_limit {
            return Err(invalid(format!(
                "gas {} exceeds the ceiling of {}",
                gas, self.limits.max_gas_limit
            )));
        }
        Ok(())
    }

    pub fn check_value(&self, value: U256) -> Result<()> {
        if value > self.limits.max_value {
            return Err(invalid(format!(
                "value {} exceeds the ceiling of {}",
                format_native(value),
                format_native(self.limits.max_value)
            )));
        }
        Ok(())
    }

    /// Ceilings applied to a transaction that did not come from a request,
    /// e.g. a raw sender-signed blob.
    pub fn check_transaction(&self, tx: &Transaction) -> Result<()> {
        self.check_gas(tx.gas_limit())?;
        self.check_value(tx.value())
    }
}

// Internal helper that picks a kind when the request does not name one.
fn infer_kind(request: &DelegationRequest) -> TxKind {
    if request.memo.is_some() {
        return TxKind::ValueTransferMemo;
    }
    if request.fee_ratio.is_some() {
        return TxKind::ValueTransferWithRatio;
    }
    match (&request.data, &request.to) {
        (Some(_), None) => TxKind::SmartContractDeploy,
        (Some(_), Some(_)) => TxKind::SmartContractExecution,
        _ => TxKind::ValueTransfer,
    }
}
