//! Canonical RLP encoding for fee-delegated typed transactions.
//!
//! Integers are written minimal big-endian (zero is the empty string) and
//! addresses always keep their 20 bytes; both rules come from the `rlp`
//! encodings of `u64`/`U256` and `H160`.

use ethers::types::{Address, Bytes, H256, U256};
use rlp::{DecoderError, Rlp, RlpStream};

use super::types::{
    SmartContractDeploy, SmartContractExecution, Transaction, TxCommon, TxKind, ValueTransfer,
    ValueTransferMemo, ValueTransferWithRatio,
};
use crate::crypto::hash::keccak256;
use crate::crypto::signature::TxSignature;
use crate::error::{AppError, Result};

/// Number of body fields for a kind (no signatures).
pub fn field_count(kind: TxKind) -> usize {
    match kind {
        TxKind::ValueTransfer => 6,
        TxKind::ValueTransferMemo
        | TxKind::SmartContractExecution
        | TxKind::ValueTransferWithRatio => 7,
        TxKind::SmartContractDeploy => 9,
    }
}

fn append_common(stream: &mut RlpStream, common: &TxCommon, to: Option<&Address>, value: &U256) {
    stream.append(&common.nonce);
    stream.append(&common.gas_price);
    stream.append(&common.gas_limit);
    match to {
        Some(to) => stream.append(to),
        None => stream.append_empty_data(),
    };
    stream.append(value);
    stream.append(&common.from);
}

// Appends the body fields in wire order, without a list header.
fn append_fields(stream: &mut RlpStream, tx: &Transaction) {
    match tx {
        Transaction::ValueTransfer(tx) => {
            append_common(stream, &tx.common, Some(&tx.to), &tx.value);
        }
        Transaction::ValueTransferMemo(tx) => {
            append_common(stream, &tx.common, Some(&tx.to), &tx.value);
            stream.append(&tx.input.to_vec());
        }
        Transaction::SmartContractExecution(tx) => {
            append_common(stream, &tx.common, Some(&tx.to), &tx.value);
            stream.append(&tx.input.to_vec());
        }
        Transaction::SmartContractDeploy(tx) => {
            append_common(stream, &tx.common, None, &tx.value);
            stream.append(&tx.input.to_vec());
            stream.append(&(tx.human_readable as u8));
            stream.append(&tx.code_format);
        }
        Transaction::ValueTransferWithRatio(tx) => {
            append_common(stream, &tx.common, Some(&tx.to), &tx.value);
            stream.append(&tx.fee_ratio);
        }
    }
}

fn append_signatures(stream: &mut RlpStream, signatures: &[TxSignature]) {
    stream.begin_list(signatures.len());
    for signature in signatures {
        stream.begin_list(3);
        stream.append(&signature.v);
        stream.append(&signature.r);
        stream.append(&signature.s);
    }
}

fn with_tag(tag: u8, body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(1 + body.len());
    out.push(tag);
    out.extend_from_slice(body);
    out
}

/// RLP list of the body fields, no type tag.
pub fn encode_fields(tx: &Transaction) -> Vec<u8> {
    let mut stream = RlpStream::new_list(field_count(tx.kind()));
    append_fields(&mut stream, tx);
    stream.out().to_vec()
}

/// Pre-image of the sender signing hash:
/// `tag || rlp([rlp(fields), chainId, "", ""])`.
pub fn encode_for_signing_hash(tx: &Transaction, chain_id: u64) -> Vec<u8> {
    let inner = encode_fields(tx);
    let mut outer = RlpStream::new_list(4);
    outer.append(&inner);
    outer.append(&chain_id);
    outer.append_empty_data();
    outer.append_empty_data();
    with_tag(tx.kind().tag(), &outer.out())
}

/// Pre-image of the fee payer signing hash:
/// `tag || rlp([rlp(fields), feePayer, chainId, "", ""])`.
pub fn encode_for_fee_payer_signing_hash(
    tx: &Transaction,
    fee_payer: &Address,
    chain_id: u64,
) -> Vec<u8> {
    let inner = encode_fields(tx);
    let mut outer = RlpStream::new_list(5);
    outer.append(&inner);
    outer.append(fee_payer);
    outer.append(&chain_id);
    outer.append_empty_data();
    outer.append_empty_data();
    with_tag(tx.kind().tag(), &outer.out())
}

pub fn signing_hash(tx: &Transaction, chain_id: u64) -> H256 {
    keccak256(&encode_for_signing_hash(tx, chain_id))
}

pub fn fee_payer_signing_hash(tx: &Transaction, fee_payer: &Address, chain_id: u64) -> H256 {
    keccak256(&encode_for_fee_payer_signing_hash(tx, fee_payer, chain_id))
}

/// Signed wire form: `tag || rlp([fields.., [[v,r,s]..], (feePayer, [[v,r,s]..])?])`.
pub fn encode_signed(
    tx: &Transaction,
    sender_signatures: &[TxSignature],
    fee_payer: Option<(&Address, &[TxSignature])>,
) -> Vec<u8> {
    let extra = if fee_payer.is_some() { 3 } else { 1 };
    let mut stream = RlpStream::new_list(field_count(tx.kind()) + extra);
    append_fields(&mut stream, tx);
    append_signatures(&mut stream, sender_signatures);
    if let Some((address, signatures)) = fee_payer {
        stream.append(address);
        append_signatures(&mut stream, signatures);
    }
    with_tag(tx.kind().tag(), &stream.out())
}

/// Output of [`decode_signed`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedTx {
    pub tx: Transaction,
    pub sender_signatures: Vec<TxSignature>,
    pub fee_payer: Option<(Address, Vec<TxSignature>)>,
}

fn decoder_err(err: DecoderError) -> AppError {
    AppError::Encoding(format!("Invalid RLP: {}", err))
}

fn decode_signatures(item: &Rlp<'_>) -> Result<Vec<TxSignature>> {
    if !item.is_list() {
        return Err(AppError::Encoding("Signature set is not a list".to_string()));
    }
    item.iter()
        .map(|triple| {
            if triple.item_count().map_err(decoder_err)? != 3 {
                return Err(AppError::Encoding(
                    "Signature entry must have exactly three items".to_string(),
                ));
            }
            Ok(TxSignature {
                v: triple.val_at(0).map_err(decoder_err)?,
                r: triple.val_at(1).map_err(decoder_err)?,
                s: triple.val_at(2).map_err(decoder_err)?,
            })
        })
        .collect()
}

/// Inverse of [`encode_signed`].
pub fn decode_signed(raw: &[u8]) -> Result<DecodedTx> {
    let (&tag, body) = raw
        .split_first()
        .ok_or_else(|| AppError::Encoding("Empty transaction".to_string()))?;
    let kind = TxKind::from_tag(tag)
        .ok_or_else(|| AppError::Encoding(format!("Unsupported type tag 0x{:02x}", tag)))?;

    let rlp = Rlp::new(body);
    let info = rlp.payload_info().map_err(decoder_err)?;
    if info.header_len + info.value_len != body.len() {
        return Err(AppError::Encoding("Trailing bytes after transaction".to_string()));
    }
    if !rlp.is_list() {
        return Err(AppError::Encoding("Transaction body is not a list".to_string()));
    }

    let fields = field_count(kind);
    let items = rlp.item_count().map_err(decoder_err)?;
    if items != fields + 1 && items != fields + 3 {
        return Err(AppError::Encoding(format!(
            "{} expects {} or {} items, got {}",
            kind,
            fields + 1,
            fields + 3,
            items
        )));
    }

    let common = TxCommon {
        nonce: rlp.val_at(0).map_err(decoder_err)?,
        gas_price: rlp.val_at(1).map_err(decoder_err)?,
        gas_limit: rlp.val_at(2).map_err(decoder_err)?,
        from: rlp.val_at(5).map_err(decoder_err)?,
    };
    let value: U256 = rlp.val_at(4).map_err(decoder_err)?;
    let to = || -> Result<Address> { rlp.val_at(3).map_err(decoder_err) };
    let input = || -> Result<Bytes> {
        let data: Vec<u8> = rlp.val_at(6).map_err(decoder_err)?;
        Ok(Bytes::from(data))
    };

    let tx = match kind {
        TxKind::ValueTransfer => Transaction::ValueTransfer(ValueTransfer {
            common,
            to: to()?,
            value,
        }),
        TxKind::ValueTransferMemo => Transaction::ValueTransferMemo(ValueTransferMemo {
            common,
            to: to()?,
            value,
            input: input()?,
        }),
        TxKind::SmartContractExecution => {
            Transaction::SmartContractExecution(SmartContractExecution {
                common,
                to: to()?,
                value,
                input: input()?,
            })
        }
        TxKind::SmartContractDeploy => {
            let recipient = rlp.at(3).map_err(decoder_err)?;
            if !recipient.is_empty() {
                return Err(AppError::Encoding(
                    "SmartContractDeploy must not carry a recipient".to_string(),
                ));
            }
            let human_readable: u8 = rlp.val_at(7).map_err(decoder_err)?;
            if human_readable > 1 {
                return Err(AppError::Encoding(format!(
                    "humanReadable must be 0 or 1, got {}",
                    human_readable
                )));
            }
            Transaction::SmartContractDeploy(SmartContractDeploy {
                common,
                value,
                input: input()?,
                human_readable: human_readable == 1,
                code_format: rlp.val_at(8).map_err(decoder_err)?,
            })
        }
        TxKind::ValueTransferWithRatio => {
            Transaction::ValueTransferWithRatio(ValueTransferWithRatio {
                common,
                to: to()?,
                value,
                fee_ratio: rlp.val_at(6).map_err(decoder_err)?,
            })
        }
    };

    let sender_signatures = decode_signatures(&rlp.at(fields).map_err(decoder_err)?)?;
    let fee_payer = if items == fields + 3 {
        let address: Address = rlp.val_at(fields + 1).map_err(decoder_err)?;
        let signatures = decode_signatures(&rlp.at(fields + 2).map_err(decoder_err)?)?;
        Some((address, signatures))
    } else {
        None
    };

    Ok(DecodedTx {
        tx,
        sender_signatures,
        fee_payer,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::types::TxFields;

    fn sample_signature(seed: u64) -> TxSignature {
        TxSignature {
            v: 2029 + (seed % 2),
            r: U256::from(0x1234_5678u64) * U256::from(seed + 1),
            s: U256::MAX / U256::from(seed + 3),
        }
    }

    fn fields() -> TxFields {
        TxFields {
            nonce: Some(0),
            gas_price: Some(U256::from(25_000_000_000u64)),
            gas_limit: Some(21_000),
            from: Some(Address::repeat_byte(0xaa)),
            to: Some(Address::repeat_byte(0xbb)),
            value: Some(U256::from(256)),
            ..TxFields::default()
        }
    }

    fn all_kinds() -> Vec<Transaction> {
        let memo = TxFields {
            input: Some(Bytes::from(b"gg wp".to_vec())),
            ..fields()
        };
        let exec = TxFields {
            input: Some(Bytes::from(vec![0xa9, 0x05, 0x9c, 0xbb])),
            ..fields()
        };
        let deploy = TxFields {
            to: None,
            input: Some(Bytes::from(vec![0x60, 0x80, 0x60, 0x40])),
            human_readable: Some(false),
            ..fields()
        };
        let ratio = TxFields {
            fee_ratio: Some(30),
            ..fields()
        };
        vec![
            Transaction::from_fields(TxKind::ValueTransfer, fields()).unwrap(),
            Transaction::from_fields(TxKind::ValueTransferMemo, memo).unwrap(),
            Transaction::from_fields(TxKind::SmartContractExecution, exec).unwrap(),
            Transaction::from_fields(TxKind::SmartContractDeploy, deploy).unwrap(),
            Transaction::from_fields(TxKind::ValueTransferWithRatio, ratio).unwrap(),
        ]
    }

    #[test]
    fn zero_and_256_are_minimal() {
        assert_eq!(rlp::encode(&U256::zero()).to_vec(), vec![0x80]);
        assert_eq!(rlp::encode(&0u64).to_vec(), vec![0x80]);
        assert_eq!(rlp::encode(&U256::from(256)).to_vec(), vec![0x82, 0x01, 0x00]);
        assert_eq!(rlp::encode(&256u64).to_vec(), vec![0x82, 0x01, 0x00]);
    }

    #[test]
    fn zero_address_keeps_twenty_bytes() {
        let encoded = rlp::encode(&Address::zero()).to_vec();
        assert_eq!(encoded.len(), 21);
        assert_eq!(encoded[0], 0x94);
    }

    #[test]
    fn value_transfer_field_layout() {
        let tx = Transaction::from_fields(TxKind::ValueTransfer, fields()).unwrap();
        let encoded = encode_fields(&tx);
        let rlp = Rlp::new(&encoded);
        assert_eq!(rlp.item_count().unwrap(), 6);
        // nonce 0 is the empty string
        assert!(rlp.at(0).unwrap().is_empty());
        assert_eq!(rlp.at(4).unwrap().data().unwrap(), &[0x01, 0x00]);
        assert_eq!(rlp.at(5).unwrap().data().unwrap().len(), 20);
    }

    #[test]
    fn signing_preimage_is_double_wrapped() {
        let tx = Transaction::from_fields(TxKind::ValueTransfer, fields()).unwrap();
        let preimage = encode_for_signing_hash(&tx, 1001);
        assert_eq!(preimage[0], 0x09);

        let outer = Rlp::new(&preimage[1..]);
        assert_eq!(outer.item_count().unwrap(), 4);
        assert_eq!(outer.at(0).unwrap().data().unwrap(), encode_fields(&tx).as_slice());
        assert_eq!(outer.val_at::<u64>(1).unwrap(), 1001);
        assert!(outer.at(2).unwrap().is_empty());
        assert!(outer.at(3).unwrap().is_empty());
        assert_ne!(signing_hash(&tx, 1001), signing_hash(&tx, 8217));
    }

    #[test]
    fn fee_payer_preimage_binds_fee_payer() {
        let tx = Transaction::from_fields(TxKind::ValueTransfer, fields()).unwrap();
        let payer = Address::repeat_byte(0xcc);
        let preimage = encode_for_fee_payer_signing_hash(&tx, &payer, 1001);
        let outer = Rlp::new(&preimage[1..]);
        assert_eq!(outer.item_count().unwrap(), 5);
        assert_eq!(outer.val_at::<Address>(1).unwrap(), payer);
        assert_ne!(
            fee_payer_signing_hash(&tx, &payer, 1001),
            signing_hash(&tx, 1001)
        );
    }

    #[test]
    fn signed_round_trip_for_every_kind() {
        let payer = Address::repeat_byte(0xcc);
        for tx in all_kinds() {
            let sender = vec![sample_signature(1)];
            let payer_sigs = vec![sample_signature(2), sample_signature(3)];
            let raw = encode_signed(&tx, &sender, Some((&payer, &payer_sigs)));
            assert_eq!(raw[0], tx.kind().tag());

            let decoded = decode_signed(&raw).unwrap();
            assert_eq!(decoded.tx, tx);
            assert_eq!(decoded.sender_signatures, sender);
            assert_eq!(decoded.fee_payer, Some((payer, payer_sigs)));
        }
    }

    #[test]
    fn sender_only_form_has_no_fee_payer() {
        let tx = Transaction::from_fields(TxKind::ValueTransfer, fields()).unwrap();
        let raw = encode_signed(&tx, &[sample_signature(0)], None);
        let decoded = decode_signed(&raw).unwrap();
        assert!(decoded.fee_payer.is_none());
        assert_eq!(decoded.sender_signatures.len(), 1);
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(matches!(decode_signed(&[]), Err(AppError::Encoding(_))));
        assert!(matches!(decode_signed(&[0x08, 0xc0]), Err(AppError::Encoding(_))));

        let tx = Transaction::from_fields(TxKind::ValueTransfer, fields()).unwrap();
        let mut raw = encode_signed(&tx, &[sample_signature(0)], None);
        raw.push(0x00);
        assert!(matches!(decode_signed(&raw), Err(AppError::Encoding(_))));

        // memo body under the plain transfer tag
        let memo = &all_kinds()[1];
        let mut raw = encode_signed(memo, &[sample_signature(0)], None);
        raw[0] = TxKind::ValueTransfer.tag();
        assert!(matches!(decode_signed(&raw), Err(AppError::Encoding(_))));
    }
}
