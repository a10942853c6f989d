use ethers::{
    signers::{LocalWallet, Signer},
    types::{Address, Signature, H256, U256},
};
use serde::{Deserialize, Serialize};

use crate::constants::{COMPACT_SIGNATURE_LEN, SIGNATURE_V_BASE};
use crate::error::{AppError, Result};

/// A chain-bound ECDSA signature as carried inside a typed transaction.
///
/// `v` always follows `27 + parity + 2 * chain_id`; the same formula is used for
/// the sender and for the fee payer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxSignature {
    pub v: u64,
    pub r: U256,
    pub s: U256,
}

/// Chain-bound V for a recovery parity. `chain_id` must not exceed
/// `MAX_CHAIN_ID`; the configured id is checked at startup.
pub fn compute_v(parity: u8, chain_id: u64) -> u64 {
    SIGNATURE_V_BASE + parity as u64 + 2 * chain_id
}

impl TxSignature {
    /// Recovery parity (yParity) encoded in `v`.
    pub fn parity(&self) -> Result<u8> {
        let offset = self.v.checked_sub(SIGNATURE_V_BASE).ok_or_else(|| {
            AppError::MalformedSignature(format!("v={} is below {}", self.v, SIGNATURE_V_BASE))
        })?;
        Ok((offset % 2) as u8)
    }

    /// Chain id encoded in `v`.
    pub fn chain_id(&self) -> Result<u64> {
        let offset = self.v.checked_sub(SIGNATURE_V_BASE).ok_or_else(|| {
            AppError::MalformedSignature(format!("v={} is below {}", self.v, SIGNATURE_V_BASE))
        })?;
        Ok(offset / 2)
    }

    /// 65-byte `r || s || v` form. `v` is written as the bare parity byte.
    pub fn to_compact(&self) -> Result<[u8; COMPACT_SIGNATURE_LEN]> {
        let mut out = [0u8; COMPACT_SIGNATURE_LEN];
        self.r.to_big_endian(&mut out[..32]);
        self.s.to_big_endian(&mut out[32..64]);
        out[64] = self.parity()?;
        Ok(out)
    }
}

/// Signs a 32-byte digest with a local key.
pub fn sign_hash(wallet: &LocalWallet, hash: H256, chain_id: u64) -> Result<TxSignature> {
    let signature = wallet
        .sign_hash(hash)
        .map_err(|e| AppError::Internal(format!("Signing failed: {}", e)))?;
    // ethers reports v as 27 + parity for a raw digest
    let parity = signature
        .v
        .checked_sub(SIGNATURE_V_BASE)
        .filter(|p| *p <= 1)
        .ok_or_else(|| AppError::Internal(format!("Unexpected signer v={}", signature.v)))?;

    Ok(TxSignature {
        v: compute_v(parity as u8, chain_id),
        r: signature.r,
        s: signature.s,
    })
}

/// Recovers the address that produced `signature` over `hash`.
pub fn recover_signer(hash: H256, signature: &TxSignature) -> Result<Address> {
    let parity = signature.parity()?;
    let raw = Signature {
        r: signature.r,
        s: signature.s,
        v: SIGNATURE_V_BASE + parity as u64,
    };
    raw.recover(hash)
        .map_err(|e| AppError::MalformedSignature(format!("Recovery failed: {}", e)))
}

/// Fails with `InvalidSignature` unless `signature` recovers to `claimed`.
pub fn verify_signer(hash: H256, signature: &TxSignature, claimed: Address) -> Result<()> {
    let recovered = recover_signer(hash, signature)?;
    if recovered != claimed {
        return Err(AppError::InvalidSignature {
            expected: format!("{:?}", claimed),
            recovered: format!("{:?}", recovered),
        });
    }
    Ok(())
}

/// Parses a detached 65-byte `r || s || v` signature.
///
/// A trailing byte of 0/1 or 27/28 is a bare parity and is bound to `chain_id`.
/// Any other value must already be the chain-bound V for `chain_id`.
pub fn parse_compact(bytes: &[u8], chain_id: u64) -> Result<TxSignature> {
    if bytes.len() != COMPACT_SIGNATURE_LEN {
        return Err(AppError::MalformedSignature(format!(
            "expected {} bytes, got {}",
            COMPACT_SIGNATURE_LEN,
            bytes.len()
        )));
    }

    let r = U256::from_big_endian(&bytes[..32]);
    let s = U256::from_big_endian(&bytes[32..64]);
    let v = match bytes[64] as u64 {
        p @ (0 | 1) => compute_v(p as u8, chain_id),
        v @ (27 | 28) => compute_v((v - SIGNATURE_V_BASE) as u8, chain_id),
        v => {
            let expected = [compute_v(0, chain_id), compute_v(1, chain_id)];
            if !expected.contains(&v) {
                return Err(AppError::MalformedSignature(format!(
                    "v={} is not bound to chain {}",
                    v, chain_id
                )));
            }
            v
        }
    };

    Ok(TxSignature { v, r, s })
}

/// Hex variant of [`parse_compact`], with or without `0x`.
pub fn parse_compact_hex(value: &str, chain_id: u64) -> Result<TxSignature> {
    let trimmed = value.trim();
    let stripped = trimmed.strip_prefix("0x").unwrap_or(trimmed);
    let bytes = hex::decode(stripped)
        .map_err(|e| AppError::MalformedSignature(format!("Invalid hex: {}", e)))?;
    parse_compact(&bytes, chain_id)
}

/// Signing seam for the fee payer. Tests substitute their own implementation.
pub trait TxSigner: Send + Sync {
    fn address(&self) -> Address;

    fn sign_hash(&self, hash: H256, chain_id: u64) -> Result<TxSignature>;
}

/// Fee payer key held in memory for the life of the process.
pub struct LocalKeySigner {
    wallet: LocalWallet,
}

impl LocalKeySigner {
    pub fn from_hex(private_key: &str) -> Result<Self> {
        let trimmed = private_key.trim();
        let stripped = trimmed.strip_prefix("0x").unwrap_or(trimmed);
        let bytes = hex::decode(stripped)
            .map_err(|_| AppError::Configuration("Fee payer key is not valid hex".to_string()))?;
        let wallet = LocalWallet::from_bytes(&bytes)
            .map_err(|_| AppError::Configuration("Fee payer key is not a valid secp256k1 scalar".to_string()))?;
        Ok(Self { wallet })
    }

    pub fn from_wallet(wallet: LocalWallet) -> Self {
        Self { wallet }
    }
}

impl std::fmt::Debug for LocalKeySigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalKeySigner")
            .field("address", &self.wallet.address())
            .finish()
    }
}

impl TxSigner for LocalKeySigner {
    fn address(&self) -> Address {
        self.wallet.address()
    }

    fn sign_hash(&self, hash: H256, chain_id: u64) -> Result<TxSignature> {
        sign_hash(&self.wallet, hash, chain_id)
    }
}
