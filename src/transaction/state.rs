//! Two-signature protocol as explicit typed states.
//!
//! `UnsignedTx -> SenderSignedTx -> FullySignedTx -> BroadcastTx -> TxOutcome`.
//! Only `FullySignedTx` can produce a broadcastable raw transaction.

use ethers::types::{Address, H256};

use super::encoding::{decode_signed, encode_signed, fee_payer_signing_hash, signing_hash};
use super::types::Transaction;
use crate::crypto::signature::{recover_signer, verify_signer, TxSignature, TxSigner};
use crate::error::{AppError, Result};
use crate::services::chain_rpc::TransactionReceipt;

fn ensure_chain(signature: &TxSignature, chain_id: u64) -> Result<()> {
    let bound = signature.chain_id()?;
    if bound != chain_id {
        return Err(AppError::MalformedSignature(format!(
            "signature is bound to chain {}, expected {}",
            bound, chain_id
        )));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsignedTx {
    tx: Transaction,
    chain_id: u64,
}

impl UnsignedTx {
    pub fn new(tx: Transaction, chain_id: u64) -> Self {
        Self { tx, chain_id }
    }

    pub fn transaction(&self) -> &Transaction {
        &self.tx
    }

    /// Digest the sender is expected to sign.
    pub fn signing_hash(&self) -> H256 {
        signing_hash(&self.tx, self.chain_id)
    }

    /// Accepts a detached sender signature once it recovers to `from`.
    pub fn attach_sender_signature(self, signature: TxSignature) -> Result<SenderSignedTx> {
        ensure_chain(&signature, self.chain_id)?;
        let recovered = recover_signer(self.signing_hash(), &signature)?;
        if recovered != self.tx.from() {
            return Err(AppError::SignatureMismatch {
                expected: format!("{:?}", self.tx.from()),
                recovered: format!("{:?}", recovered),
            });
        }

        Ok(SenderSignedTx {
            tx: self.tx,
            chain_id: self.chain_id,
            sender_signatures: vec![signature],
        })
    }
}

/// Sender signature present, not broadcastable yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SenderSignedTx {
    tx: Transaction,
    chain_id: u64,
    sender_signatures: Vec<TxSignature>,
}

impl SenderSignedTx {
    /// Takes a raw transaction signed by the sender's own client as-is.
    pub fn from_raw(raw: &[u8], chain_id: u64) -> Result<Self> {
        let decoded = decode_signed(raw)?;
        if let Some((_, signatures)) = &decoded.fee_payer {
            if !signatures.is_empty() {
                return Err(AppError::InvalidTransactionFields(
                    "raw transaction already carries a fee payer signature".to_string(),
                ));
            }
        }
        if decoded.sender_signatures.is_empty() {
            return Err(AppError::MalformedSignature(
                "raw transaction carries no sender signature".to_string(),
            ));
        }
        for signature in &decoded.sender_signatures {
            ensure_chain(signature, chain_id)?;
        }

        Ok(Self {
            tx: decoded.tx,
            chain_id,
            sender_signatures: decoded.sender_signatures,
        })
    }

    pub fn transaction(&self) -> &Transaction {
        &self.tx
    }

    pub fn fee_payer_signing_hash(&self, fee_payer: &Address) -> H256 {
        fee_payer_signing_hash(&self.tx, fee_payer, self.chain_id)
    }

    /// Adds the fee payer's signature over the fee payer pre-image.
    pub fn sign_as_fee_payer(self, signer: &dyn TxSigner) -> Result<FullySignedTx> {
        let fee_payer = signer.address();
        let hash = self.fee_payer_signing_hash(&fee_payer);
        let signature = signer.sign_hash(hash, self.chain_id)?;
        ensure_chain(&signature, self.chain_id)?;
        verify_signer(hash, &signature, fee_payer)?;

        Ok(FullySignedTx {
            tx: self.tx,
            chain_id: self.chain_id,
            sender_signatures: self.sender_signatures,
            fee_payer,
            fee_payer_signatures: vec![signature],
        })
    }
}

/// Both signature sets present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FullySignedTx {
    tx: Transaction,
    chain_id: u64,
    sender_signatures: Vec<TxSignature>,
    fee_payer: Address,
    fee_payer_signatures: Vec<TxSignature>,
}

impl FullySignedTx {
    pub fn raw_transaction(&self) -> Vec<u8> {
        encode_signed(
            &self.tx,
            &self.sender_signatures,
            Some((&self.fee_payer, &self.fee_payer_signatures)),
        )
    }

    pub fn into_broadcast(self, tx_hash: H256) -> BroadcastTx {
        BroadcastTx {
            tx_hash,
            from: self.tx.from(),
            nonce: self.tx.nonce(),
            fee_payer: self.fee_payer,
        }
    }

    pub fn reject(self, reason: String) -> TxOutcome {
        TxOutcome::Rejected {
            fee_payer: self.fee_payer,
            reason,
        }
    }
}

/// Accepted by the node, waiting for a receipt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BroadcastTx {
    pub tx_hash: H256,
    pub from: Address,
    pub nonce: u64,
    pub fee_payer: Address,
}

impl BroadcastTx {
    pub fn confirm(self, receipt: TransactionReceipt) -> TxOutcome {
        TxOutcome::Confirmed {
            tx_hash: self.tx_hash,
            fee_payer: self.fee_payer,
            receipt,
        }
    }

    /// The wait ended without a receipt. The transaction may still land.
    pub fn timed_out(self) -> TxOutcome {
        TxOutcome::TimedOut {
            tx_hash: self.tx_hash,
            fee_payer: self.fee_payer,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxOutcome {
    Confirmed {
        tx_hash: H256,
        fee_payer: Address,
        receipt: TransactionReceipt,
    },
    TimedOut {
        tx_hash: H256,
        fee_payer: Address,
    },
    Rejected {
        fee_payer: Address,
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::signature::{sign_hash, LocalKeySigner};
    use crate::transaction::types::{TxFields, TxKind};
    use ethers::signers::{LocalWallet, Signer};
    use ethers::types::U256;

    const SENDER_KEY: &str = "0x8a1f9a8f95be41cd7ccb6168179afb4504aefe388d1e14474d32c45c72ce7b7a";
    const PAYER_KEY: &str = "0x4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318";

    fn sender() -> LocalWallet {
        SENDER_KEY.trim_start_matches("0x").parse().unwrap()
    }

    fn unsigned(from: Address) -> UnsignedTx {
        let tx = Transaction::from_fields(
            TxKind::ValueTransfer,
            TxFields {
                nonce: Some(7),
                gas_price: Some(U256::from(25_000_000_000u64)),
                gas_limit: Some(21_000),
                from: Some(from),
                to: Some(Address::repeat_byte(0xbb)),
                value: Some(U256::zero()),
                ..TxFields::default()
            },
        )
        .unwrap();
        UnsignedTx::new(tx, 1001)
    }

    #[test]
    fn full_protocol_produces_verifiable_raw_transaction() {
        let wallet = sender();
        let payer = LocalKeySigner::from_hex(PAYER_KEY).unwrap();
        let unsigned = unsigned(wallet.address());

        let sender_sig = sign_hash(&wallet, unsigned.signing_hash(), 1001).unwrap();
        let sender_signed = unsigned.attach_sender_signature(sender_sig).unwrap();
        let payer_hash = sender_signed.fee_payer_signing_hash(&payer.address());
        let fully = sender_signed.sign_as_fee_payer(&payer).unwrap();

        let decoded = decode_signed(&fully.raw_transaction()).unwrap();
        let (fee_payer, payer_sigs) = decoded.fee_payer.unwrap();
        assert_eq!(fee_payer, payer.address());
        verify_signer(payer_hash, &payer_sigs[0], payer.address()).unwrap();
        assert_eq!(decoded.sender_signatures, vec![sender_sig]);
    }

    #[test]
    fn foreign_signature_is_a_mismatch() {
        let wallet = sender();
        let other = LocalKeySigner::from_hex(PAYER_KEY).unwrap();
        let unsigned = unsigned(wallet.address());

        let forged = other.sign_hash(unsigned.signing_hash(), 1001).unwrap();
        let err = unsigned.attach_sender_signature(forged).unwrap_err();
        assert!(matches!(err, AppError::SignatureMismatch { .. }));
    }

    #[test]
    fn signature_for_other_chain_is_rejected() {
        let wallet = sender();
        let unsigned = unsigned(wallet.address());
        let wrong_chain = sign_hash(&wallet, unsigned.signing_hash(), 8217).unwrap();
        assert!(matches!(
            unsigned.attach_sender_signature(wrong_chain),
            Err(AppError::MalformedSignature(_))
        ));
    }

    #[test]
    fn raw_sender_signed_input_is_taken_as_is() {
        let wallet = sender();
        let unsigned = unsigned(wallet.address());
        let sig = sign_hash(&wallet, unsigned.signing_hash(), 1001).unwrap();
        let raw = encode_signed(unsigned.transaction(), &[sig], None);

        let sender_signed = SenderSignedTx::from_raw(&raw, 1001).unwrap();
        assert_eq!(sender_signed.transaction(), unsigned.transaction());
        let payer = LocalKeySigner::from_hex(PAYER_KEY).unwrap();
        let relayed = sender_signed.sign_as_fee_payer(&payer).unwrap().raw_transaction();
        assert_eq!(decode_signed(&relayed).unwrap().sender_signatures, vec![sig]);

        let unsigned_raw = encode_signed(unsigned.transaction(), &[], None);
        assert!(matches!(
            SenderSignedTx::from_raw(&unsigned_raw, 1001),
            Err(AppError::MalformedSignature(_))
        ));
    }

    #[test]
    fn raw_input_already_fee_paid_is_rejected() {
        let wallet = sender();
        let payer = LocalKeySigner::from_hex(PAYER_KEY).unwrap();
        let unsigned = unsigned(wallet.address());
        let sig = sign_hash(&wallet, unsigned.signing_hash(), 1001).unwrap();
        let fully = unsigned
            .attach_sender_signature(sig)
            .unwrap()
            .sign_as_fee_payer(&payer)
            .unwrap();

        assert!(matches!(
            SenderSignedTx::from_raw(&fully.raw_transaction(), 1001),
            Err(AppError::InvalidTransactionFields(_))
        ));
    }

    struct WrongKeySigner(LocalKeySigner);

    impl TxSigner for WrongKeySigner {
        fn address(&self) -> Address {
            Address::repeat_byte(0xfe)
        }

        fn sign_hash(&self, hash: H256, chain_id: u64) -> Result<TxSignature> {
            self.0.sign_hash(hash, chain_id)
        }
    }

    #[test]
    fn fee_payer_signature_must_match_its_address() {
        let wallet = sender();
        let unsigned = unsigned(wallet.address());
        let sig = sign_hash(&wallet, unsigned.signing_hash(), 1001).unwrap();
        let sender_signed = unsigned.attach_sender_signature(sig).unwrap();

        let signer = WrongKeySigner(LocalKeySigner::from_hex(PAYER_KEY).unwrap());
        assert!(matches!(
            sender_signed.sign_as_fee_payer(&signer),
            Err(AppError::InvalidSignature { .. })
        ));
    }
}
