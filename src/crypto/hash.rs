use ethers::types::H256;
use sha3::{Digest, Keccak256};

/// Keccak256 digest of raw bytes
pub fn keccak256(data: &[u8]) -> H256 {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    H256::from_slice(hasher.finalize().as_slice())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keccak256_matches_empty_string_vector() {
        assert_eq!(
            format!("{:#x}", keccak256(b"")),
            "0xc5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470"
        );
    }

    #[test]
    fn keccak256_is_deterministic() {
        assert_eq!(keccak256(b"fee-payer"), keccak256(b"fee-payer"));
        assert_ne!(keccak256(b"fee-payer"), keccak256(b"sender"));
    }
}
