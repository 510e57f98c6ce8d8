//! Exact ledger decimal helpers
//!
//! Ledger amounts travel as decimal strings (`"59389105"`, `"-1e-81"`,
//! `"12.5"`). They are held as [`BigDecimal`] and rendered back with the
//! notation rules used by the ledger's JavaScript tooling: plain notation
//! while the decimal exponent is within `[-6, 20]`, `d.ddde±x` outside it.

use bigdecimal::BigDecimal;
use num_bigint::{BigInt, Sign};
use num_traits::Zero;
use serde_json::Value;
use std::str::FromStr;

const EXPONENT_MIN: i64 = -6;
const EXPONENT_MAX: i64 = 20;

/// Native units per display unit
const DROPS_PER_XRP_SCALE: i64 = 6;

/// Parse a decimal string, accepting exponent notation
pub fn parse_decimal(raw: &str) -> Option<BigDecimal> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    BigDecimal::from_str(raw).ok()
}

/// Parse a ledger amount field: a string, a JSON number, or `{ "value": .. }`
pub fn parse_amount(value: &Value) -> Option<BigDecimal> {
    match value {
        Value::String(s) => parse_decimal(s),
        Value::Number(n) => parse_decimal(&n.to_string()),
        Value::Object(map) => map.get("value").and_then(parse_amount),
        _ => None,
    }
}

/// Convert native drops to display units (exact division by 1,000,000)
pub fn drops_to_xrp(drops: &BigDecimal) -> BigDecimal {
    let (int, scale) = drops.as_bigint_and_exponent();
    BigDecimal::new(int, scale + DROPS_PER_XRP_SCALE)
}

/// Split into (negative, significant digits, decimal exponent of the first digit)
fn decompose(value: &BigDecimal) -> Option<(bool, String, i64)> {
    let (int, scale): (BigInt, i64) = value.normalized().as_bigint_and_exponent();
    if int.is_zero() {
        return None;
    }
    let negative = int.sign() == Sign::Minus;
    let digits = int.magnitude().to_string();
    let exponent = digits.len() as i64 - 1 - scale;
    Some((negative, digits, exponent))
}

/// Whether [`to_ledger_string`] renders this value with an exponent
pub fn is_exponent_form(value: &BigDecimal) -> bool {
    match decompose(value) {
        Some((_, _, exponent)) => !(EXPONENT_MIN..=EXPONENT_MAX).contains(&exponent),
        None => false,
    }
}

/// Render without exponent: `-0.00012`, `1500`, `42.5`
pub fn to_plain_string(value: &BigDecimal) -> String {
    let Some((negative, digits, exponent)) = decompose(value) else {
        return "0".to_string();
    };

    let mut out = String::with_capacity(digits.len() + 4);
    if negative {
        out.push('-');
    }

    let int_len = exponent + 1;
    if int_len <= 0 {
        out.push_str("0.");
        out.push_str(&"0".repeat((-int_len) as usize));
        out.push_str(&digits);
    } else if int_len as usize >= digits.len() {
        out.push_str(&digits);
        out.push_str(&"0".repeat(int_len as usize - digits.len()));
    } else {
        let (whole, frac) = digits.split_at(int_len as usize);
        out.push_str(whole);
        out.push('.');
        out.push_str(frac);
    }
    out
}

/// Render the way ledger tooling prints amounts
pub fn to_ledger_string(value: &BigDecimal) -> String {
    let Some((negative, digits, exponent)) = decompose(value) else {
        return "0".to_string();
    };

    if (EXPONENT_MIN..=EXPONENT_MAX).contains(&exponent) {
        return to_plain_string(value);
    }

    let mut out = String::with_capacity(digits.len() + 8);
    if negative {
        out.push('-');
    }
    let (lead, rest) = digits.split_at(1);
    out.push_str(lead);
    if !rest.is_empty() {
        out.push('.');
        out.push_str(rest);
    }
    out.push('e');
    out.push(if exponent < 0 { '-' } else { '+' });
    out.push_str(&exponent.abs().to_string());
    out
}
