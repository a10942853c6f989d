use ethers::types::{Address, Bytes, U256};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::constants::{
    CODE_FORMAT_EVM, MAX_FEE_RATIO, TX_TYPE_FD_SMART_CONTRACT_DEPLOY,
    TX_TYPE_FD_SMART_CONTRACT_EXECUTION, TX_TYPE_FD_VALUE_TRANSFER,
    TX_TYPE_FD_VALUE_TRANSFER_MEMO, TX_TYPE_FD_VALUE_TRANSFER_WITH_RATIO,
};
use crate::error::{AppError, Result};

/// Transaction kinds accepted by the relay. Each one is sent in its
/// fee-delegated wire form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TxKind {
    ValueTransfer,
    ValueTransferMemo,
    SmartContractExecution,
    SmartContractDeploy,
    ValueTransferWithRatio,
}

impl TxKind {
    pub const ALL: [TxKind; 5] = [
        TxKind::ValueTransfer,
        TxKind::ValueTransferMemo,
        TxKind::SmartContractExecution,
        TxKind::SmartContractDeploy,
        TxKind::ValueTransferWithRatio,
    ];

    /// One-byte tag prefixed to the encoded transaction.
    pub fn tag(self) -> u8 {
        match self {
            TxKind::ValueTransfer => TX_TYPE_FD_VALUE_TRANSFER,
            TxKind::ValueTransferWithRatio => TX_TYPE_FD_VALUE_TRANSFER_WITH_RATIO,
            TxKind::ValueTransferMemo => TX_TYPE_FD_VALUE_TRANSFER_MEMO,
            TxKind::SmartContractDeploy => TX_TYPE_FD_SMART_CONTRACT_DEPLOY,
            TxKind::SmartContractExecution => TX_TYPE_FD_SMART_CONTRACT_EXECUTION,
        }
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.tag() == tag)
    }

    pub fn name(self) -> &'static str {
        match self {
            TxKind::ValueTransfer => "ValueTransfer",
            TxKind::ValueTransferMemo => "ValueTransferMemo",
            TxKind::SmartContractExecution => "SmartContractExecution",
            TxKind::SmartContractDeploy => "SmartContractDeploy",
            TxKind::ValueTransferWithRatio => "ValueTransferWithRatio",
        }
    }

    /// Lenient name lookup: `ValueTransfer`, `VALUE_TRANSFER`,
    /// `FEE_DELEGATED_VALUE_TRANSFER` and `feeDelegatedValueTransfer` all match.
    pub fn parse(name: &str) -> Option<Self> {
        let normalized: String = name
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_lowercase();
        let normalized = normalized
            .strip_prefix("feedelegated")
            .unwrap_or(&normalized);

        Self::ALL
            .into_iter()
            .find(|kind| kind.name().to_ascii_lowercase() == normalized)
    }
}

impl fmt::Display for TxKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for TxKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
            .ok_or_else(|| AppError::Validation(format!("unsupported transaction type `{}`", s)))
    }
}

/// Fields shared by every kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TxCommon {
    pub nonce: u64,
    pub gas_price: U256,
    pub gas_limit: u64,
    pub from: Address,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValueTransfer {
    #[serde(flatten)]
    pub common: TxCommon,
    pub to: Address,
    pub value: U256,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValueTransferMemo {
    #[serde(flatten)]
    pub common: TxCommon,
    pub to: Address,
    pub value: U256,
    pub input: Bytes,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SmartContractExecution {
    #[serde(flatten)]
    pub common: TxCommon,
    pub to: Address,
    pub value: U256,
    pub input: Bytes,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SmartContractDeploy {
    #[serde(flatten)]
    pub common: TxCommon,
    pub value: U256,
    pub input: Bytes,
    pub human_readable: bool,
    pub code_format: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValueTransferWithRatio {
    #[serde(flatten)]
    pub common: TxCommon,
    pub to: Address,
    pub value: U256,
    pub fee_ratio: u8,
}

/// A transaction body without signatures, tagged by kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type")]
pub enum Transaction {
    ValueTransfer(ValueTransfer),
    ValueTransferMemo(ValueTransferMemo),
    SmartContractExecution(SmartContractExecution),
    SmartContractDeploy(SmartContractDeploy),
    ValueTransferWithRatio(ValueTransferWithRatio),
}

/// Loose field bag used to build a [`Transaction`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TxFields {
    pub nonce: Option<u64>,
    pub gas_price: Option<U256>,
    pub gas_limit: Option<u64>,
    pub from: Option<Address>,
    pub to: Option<Address>,
    pub value: Option<U256>,
    pub input: Option<Bytes>,
    pub fee_ratio: Option<u8>,
    pub human_readable: Option<bool>,
    pub code_format: Option<u8>,
}

// Internal helper that turns an absent required field into a named error.
fn require<T>(value: Option<T>, field: &str, kind: TxKind) -> Result<T> {
    value.ok_or_else(|| {
        AppError::InvalidTransactionFields(format!("missing field `{}` for {}", field, kind))
    })
}

fn forbid<T>(value: &Option<T>, field: &str, kind: TxKind) -> Result<()> {
    if value.is_some() {
        return Err(AppError::InvalidTransactionFields(format!(
            "field `{}` is not allowed for {}",
            field, kind
        )));
    }
    Ok(())
}

impl TxKind {
    /// Checks which kind-specific fields are present. Nonce, gas and sender
    /// are not looked at, so a request can be checked before they are filled.
    pub fn check_fields(self, fields: &TxFields) -> Result<()> {
        let kind = self;
        match kind {
            TxKind::ValueTransfer | TxKind::ValueTransferWithRatio => {
                forbid(&fields.input, "input", kind)?;
            }
            TxKind::SmartContractDeploy => forbid(&fields.to, "to", kind)?,
            TxKind::ValueTransferMemo | TxKind::SmartContractExecution => {}
        }
        if kind != TxKind::ValueTransferWithRatio {
            forbid(&fields.fee_ratio, "feeRatio", kind)?;
        }
        if kind != TxKind::SmartContractDeploy {
            forbid(&fields.human_readable, "humanReadable", kind)?;
            forbid(&fields.code_format, "codeFormat", kind)?;
            require(fields.to.as_ref(), "to", kind)?;
        }

        match kind {
            TxKind::ValueTransferMemo | TxKind::SmartContractExecution => {
                require(fields.input.as_ref(), "input", kind)?;
            }
            TxKind::SmartContractDeploy => {
                if require(fields.input.as_ref(), "input", kind)?.is_empty() {
                    return Err(AppError::InvalidTransactionFields(
                        "field `input` must carry bytecode for SmartContractDeploy".to_string(),
                    ));
                }
            }
            TxKind::ValueTransferWithRatio => {
                let fee_ratio = require(fields.fee_ratio, "feeRatio", kind)?;
                if fee_ratio > MAX_FEE_RATIO {
                    return Err(AppError::InvalidTransactionFields(format!(
                        "field `feeRatio` must be within 0..={}, got {}",
                        MAX_FEE_RATIO, fee_ratio
                    )));
                }
            }
            TxKind::ValueTransfer => {}
        }
        Ok(())
    }
}

impl Transaction {
    /// Builds a transaction of `kind`, rejecting missing or extra fields.
    pub fn from_fields(kind: TxKind, fields: TxFields) -> Result<Self> {
        kind.check_fields(&fields)?;

        let common = TxCommon {
            nonce: require(fields.nonce, "nonce", kind)?,
            gas_price: require(fields.gas_price, "gasPrice", kind)?,
            gas_limit: require(fields.gas_limit, "gasLimit", kind)?,
            from: require(fields.from, "from", kind)?,
        };
        let value = require(fields.value, "value", kind)?;

        let tx = match kind {
            TxKind::ValueTransfer => Transaction::ValueTransfer(ValueTransfer {
                common,
                to: require(fields.to, "to", kind)?,
                value,
            }),
            TxKind::ValueTransferMemo => Transaction::ValueTransferMemo(ValueTransferMemo {
                common,
                to: require(fields.to, "to", kind)?,
                value,
                input: require(fields.input, "input", kind)?,
            }),
            TxKind::SmartContractExecution => {
                Transaction::SmartContractExecution(SmartContractExecution {
                    common,
                    to: require(fields.to, "to", kind)?,
                    value,
                    input: require(fields.input, "input", kind)?,
                })
            }
            TxKind::SmartContractDeploy => {
                Transaction::SmartContractDeploy(SmartContractDeploy {
                    common,
                    value,
                    input: require(fields.input, "input", kind)?,
                    human_readable: fields.human_readable.unwrap_or(false),
                    code_format: fields.code_format.unwrap_or(CODE_FORMAT_EVM),
                })
            }
            TxKind::ValueTransferWithRatio => {
                Transaction::ValueTransferWithRatio(ValueTransferWithRatio {
                    common,
                    to: require(fields.to, "to", kind)?,
                    value,
                    fee_ratio: require(fields.fee_ratio, "feeRatio", kind)?,
                })
            }
        };

        Ok(tx)
    }

    pub fn kind(&self) -> TxKind {
        match self {
            Transaction::ValueTransfer(_) => TxKind::ValueTransfer,
            Transaction::ValueTransferMemo(_) => TxKind::ValueTransferMemo,
            Transaction::SmartContractExecution(_) => TxKind::SmartContractExecution,
            Transaction::SmartContractDeploy(_) => TxKind::SmartContractDeploy,
            Transaction::ValueTransferWithRatio(_) => TxKind::ValueTransferWithRatio,
        }
    }

    pub fn common(&self) -> &TxCommon {
        match self {
            Transaction::ValueTransfer(tx) => &tx.common,
            Transaction::ValueTransferMemo(tx) => &tx.common,
            Transaction::SmartContractExecution(tx) => &tx.common,
            Transaction::SmartContractDeploy(tx) => &tx.common,
            Transaction::ValueTransferWithRatio(tx) => &tx.common,
        }
    }

    pub fn from(&self) -> Address {
        self.common().from
    }

    pub fn nonce(&self) -> u64 {
        self.common().nonce
    }

    pub fn gas_limit(&self) -> u64 {
        self.common().gas_limit
    }

    pub fn to(&self) -> Option<Address> {
        match self {
            Transaction::ValueTransfer(tx) => Some(tx.to),
            Transaction::ValueTransferMemo(tx) => Some(tx.to),
            Transaction::SmartContractExecution(tx) => Some(tx.to),
            Transaction::SmartContractDeploy(_) => None,
            Transaction::ValueTransferWithRatio(tx) => Some(tx.to),
        }
    }

    pub fn value(&self) -> U256 {
        match self {
            Transaction::ValueTransfer(tx) => tx.value,
            Transaction::ValueTransferMemo(tx) => tx.value,
            Transaction::SmartContractExecution(tx) => tx.value,
            Transaction::SmartContractDeploy(tx) => tx.value,
            Transaction::ValueTransferWithRatio(tx) => tx.value,
        }
    }

    pub fn input(&self) -> Option<&Bytes> {
        match self {
            Transaction::ValueTransferMemo(tx) => Some(&tx.input),
            Transaction::SmartContractExecution(tx) => Some(&tx.input),
            Transaction::SmartContractDeploy(tx) => Some(&tx.input),
            Transaction::ValueTransfer(_) | Transaction::ValueTransferWithRatio(_) => None,
        }
    }
}
