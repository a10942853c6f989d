// Utility modules

use ethers::types::{Address, Bytes, U256};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::str::FromStr;

use crate::constants::NATIVE_DECIMALS;

/// `0x` followed by exactly 40 hex digits.
pub fn is_hex_address(value: &str) -> bool {
    value
        .strip_prefix("0x")
        .map(|hex| hex.len() == 40 && hex.chars().all(|c| c.is_ascii_hexdigit()))
        .unwrap_or(false)
}

pub fn parse_address(value: &str) -> Option<Address> {
    if !is_hex_address(value) {
        return None;
    }
    Address::from_str(value).ok()
}

/// Decimal (`"21000"`) or hex (`"0x5208"`) unsigned quantity.
pub fn parse_quantity(value: &str) -> Option<U256> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    match trimmed.strip_prefix("0x") {
        Some("") => None,
        Some(hex) => U256::from_str_radix(hex, 16).ok(),
        None => U256::from_dec_str(trimmed).ok(),
    }
}

pub fn parse_u64(value: &str) -> Option<u64> {
    parse_quantity(value).filter(|q| *q <= U256::from(u64::MAX)).map(|q| q.as_u64())
}

pub fn parse_hex_bytes(value: &str) -> Option<Bytes> {
    let trimmed = value.trim();
    let hex = trimmed.strip_prefix("0x").unwrap_or(trimmed);
    hex::decode(hex).ok().map(Bytes::from)
}

/// Native units (e.g. `0.1`) to the smallest denomination (peb).
pub fn native_to_peb(amount: Decimal) -> Option<U256> {
    if amount.is_sign_negative() {
        return None;
    }
    let scale = Decimal::from(10u64.pow(NATIVE_DECIMALS));
    let peb = amount.checked_mul(scale)?;
    if peb.fract() != Decimal::ZERO {
        return None;
    }
    peb.to_u128().map(U256::from)
}

/// Peb rendered in native units for logs.
pub fn format_native(peb: U256) -> String {
    let unit = U256::exp10(NATIVE_DECIMALS as usize);
    let whole = peb / unit;
    let frac = peb % unit;
    if frac.is_zero() {
        return whole.to_string();
    }
    let frac = format!("{:0>18}", frac.to_string());
    format!("{}.{}", whole, frac.trim_end_matches('0'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_pattern() {
        assert!(is_hex_address("0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa"));
        assert!(is_hex_address("0xAbCdEf0123456789abcdef0123456789ABCDEF01"));
        assert!(!is_hex_address("aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa"));
        assert!(!is_hex_address("0xaaaa"));
        assert!(!is_hex_address("0xgggggggggggggggggggggggggggggggggggggggg"));
        assert_eq!(
            parse_address("0xbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb"),
            Some(Address::repeat_byte(0xbb))
        );
    }

    #[test]
    fn quantities_in_both_radixes() {
        assert_eq!(parse_quantity("21000"), Some(U256::from(21_000)));
        assert_eq!(parse_quantity("0x5208"), Some(U256::from(21_000)));
        assert_eq!(parse_quantity("0"), Some(U256::zero()));
        assert_eq!(parse_quantity("0x"), None);
        assert_eq!(parse_quantity("-1"), None);
        assert_eq!(parse_quantity("1.5"), None);
        assert_eq!(parse_u64("600000"), Some(600_000));
    }

    #[test]
    fn native_unit_conversion() {
        let tenth = Decimal::from_str("0.1").unwrap();
        assert_eq!(native_to_peb(tenth), Some(U256::exp10(17)));
        assert_eq!(native_to_peb(Decimal::from_str("-1").unwrap()), None);
        assert_eq!(format_native(U256::exp10(17)), "0.1");
        assert_eq!(format_native(U256::exp10(18) * 2), "2");
    }
}
