//! Packing of NFT ordinals into trust-line values
//!
//! An ordinal `n` is carried as the value `n * 10^-81`, i.e. `"0."` followed
//! by exactly 81 digits. Decoding only considers values below `1e-70`.

use bigdecimal::BigDecimal;
use num_bigint::BigInt;
use num_traits::Signed;
use once_cell::sync::Lazy;
use regex::Regex;

use super::value::{is_exponent_form, parse_decimal, to_plain_string};
use crate::errors::NftValueError;

/// Digits after the decimal point in a packed value
pub const NFT_FRACTION_DIGITS: usize = 81;

/// `"0."` plus the packed digits
const NFT_PLAIN_WIDTH: usize = NFT_FRACTION_DIGITS + 2;

/// Values at or above `10^-70` are treated as ordinary amounts
const NFT_MAX_LEAD_EXPONENT: i64 = -71;

static ORDINAL: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[0-9]+$").expect("static regex"));

fn lead_exponent(value: &BigDecimal) -> i64 {
    let (int, scale) = value.normalized().as_bigint_and_exponent();
    int.magnitude().to_string().len() as i64 - 1 - scale
}

/// Decode a trust-line value into the ordinal it packs, if any
///
/// Returns `None` for plain amounts, for anything at or above `1e-70`, and
/// for values with more than 81 fractional digits.
pub fn xrpl_value_to_nft(value: &str) -> Option<BigInt> {
    let parsed = parse_decimal(value)?;
    if !is_exponent_form(&parsed) || lead_exponent(&parsed) > NFT_MAX_LEAD_EXPONENT {
        return None;
    }

    let (_, scale) = parsed.normalized().as_bigint_and_exponent();
    if scale > NFT_FRACTION_DIGITS as i64 {
        return None;
    }

    let plain = to_plain_string(&parsed.abs());
    if !plain.starts_with("0.") || plain.len() > NFT_PLAIN_WIDTH {
        return None;
    }

    let padded = format!("{:0<width$}", plain, width = NFT_PLAIN_WIDTH);
    let digits = padded[2..].trim_start_matches('0');
    let ordinal: BigInt = digits.parse().ok()?;

    Some(if parsed.is_negative() { -ordinal } else { ordinal })
}

/// Encode an ordinal as a packed trust-line value
///
/// When `balance` is given it must itself decode as an ordinal, otherwise
/// the call fails with [`NftValueError::NotAnOrdinalBalance`].
pub fn nft_value_to_xrpl(ordinal: &str, balance: Option<&str>) -> Result<String, NftValueError> {
    if let Some(balance) = balance {
        if xrpl_value_to_nft(balance).is_none() {
            return Err(NftValueError::NotAnOrdinalBalance(balance.to_string()));
        }
    }

    let trimmed = ordinal.trim();
    if !ORDINAL.is_match(trimmed) {
        return Err(NftValueError::InvalidOrdinal(ordinal.to_string()));
    }

    let digits = match trimmed.trim_start_matches('0') {
        "" => "0",
        digits => digits,
    };
    if digits.len() > NFT_FRACTION_DIGITS {
        return Err(NftValueError::InvalidOrdinal(ordinal.to_string()));
    }

    Ok(format!("0.{:0>width$}", digits, width = NFT_FRACTION_DIGITS))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const ONE_PACKED: &str =
        "0.000000000000000000000000000000000000000000000000000000000000000000000000000000001";

    #[test]
    fn test_encode_nft_amount() {
        assert_eq!(nft_value_to_xrpl("1", None).unwrap(), ONE_PACKED);
        assert_eq!(nft_value_to_xrpl("1", None).unwrap().len(), 83);
    }

    #[test]
    fn test_decode_nft_amount() {
        assert_eq!(xrpl_value_to_nft("1e-81"), Some(BigInt::from(1)));
        assert_eq!(xrpl_value_to_nft("-1e-81"), Some(BigInt::from(-1)));
        assert_eq!(xrpl_value_to_nft("1.5e-80"), Some(BigInt::from(15)));
        assert_eq!(xrpl_value_to_nft("1e-80"), Some(BigInt::from(10)));
        assert_eq!(xrpl_value_to_nft(ONE_PACKED), Some(BigInt::from(1)));
    }

    #[test]
    fn test_decode_rejects_plain_amounts() {
        assert_eq!(xrpl_value_to_nft("1.5"), None);
        assert_eq!(xrpl_value_to_nft("0.001"), None);
        assert_eq!(xrpl_value_to_nft("-250"), None);
        assert_eq!(xrpl_value_to_nft("1e-20"), None);
        assert_eq!(xrpl_value_to_nft("1e-85"), None);
        assert_eq!(xrpl_value_to_nft("garbage"), None);
    }

    #[test]
    fn test_decode_rejects_deep_exponents_without_expanding() {
        let started = std::time::Instant::now();
        assert_eq!(xrpl_value_to_nft("1e-300000000"), None);
        assert_eq!(xrpl_value_to_nft("-5e-9000000000000000000"), None);
        assert_eq!(xrpl_value_to_nft("1.23e-80"), None);
        assert!(started.elapsed() < std::time::Duration::from_millis(100));
    }

    #[test]
    fn test_encode_rejects_non_ordinals() {
        assert!(matches!(
            nft_value_to_xrpl("-1", None),
            Err(NftValueError::InvalidOrdinal(_))
        ));
        assert!(matches!(
            nft_value_to_xrpl("1.5", None),
            Err(NftValueError::InvalidOrdinal(_))
        ));
        assert!(matches!(
            nft_value_to_xrpl(&"9".repeat(82), None),
            Err(NftValueError::InvalidOrdinal(_))
        ));
    }

    #[test]
    fn test_encode_validates_balance() {
        assert!(nft_value_to_xrpl("7", Some("-1e-81")).is_ok());
        assert_eq!(
            nft_value_to_xrpl("7", Some("12.5")),
            Err(NftValueError::NotAnOrdinalBalance("12.5".to_string()))
        );
    }

    proptest! {
        #[test]
        fn prop_ordinal_round_trip(n in 1u64..100_000_000_000u64) {
            let packed = nft_value_to_xrpl(&n.to_string(), None).unwrap();
            prop_assert_eq!(xrpl_value_to_nft(&packed), Some(BigInt::from(n)));
        }

        #[test]
        fn prop_plain_decimals_are_not_ordinals(whole in 0u32..1_000_000, frac in 0u32..1_000_000) {
            let value = format!("{}.{:06}", whole, frac);
            prop_assert_eq!(xrpl_value_to_nft(&value), None);
        }
    }
}
