//! Currency code rendering
//!
//! Codes are either a 3 character ISO-like string or 40 hex digits (160
//! bits). A hex code starting with byte `0x02` carries a display string from
//! byte 8 onward; any other hex code is decoded as UTF-8 as a whole.

/// Native asset code; never a valid issued currency
pub const NATIVE_CURRENCY: &str = "XRP";

/// Rendered when no acceptable display string can be recovered
pub const UNKNOWN_CURRENCY: &str = "???";

/// Default display width for decoded codes
pub const DEFAULT_MAX_LENGTH: usize = 12;

const HEX_CODE_LENGTH: usize = 40;
const EMBEDDED_NAME_MARKER: &str = "02";
const EMBEDDED_NAME_OFFSET: usize = 8;
const MIN_ALPHANUMERIC: usize = 3;

fn is_native(code: &str) -> bool {
    code.eq_ignore_ascii_case(NATIVE_CURRENCY)
}

fn clean(s: &str) -> &str {
    s.trim_matches(|c: char| c.is_whitespace() || c == '\0')
}

fn truncate_chars(s: &str, max_length: usize) -> &str {
    match s.char_indices().nth(max_length) {
        Some((end, _)) => &s[..end],
        None => s,
    }
}

fn accept(candidate: &str, max_length: usize) -> Option<String> {
    let candidate = clean(truncate_chars(clean(candidate), max_length));
    let alphanumeric = candidate.chars().filter(|c| c.is_alphanumeric()).count();
    (alphanumeric >= MIN_ALPHANUMERIC && !is_native(candidate)).then(|| candidate.to_string())
}

fn decode_utf8(bytes: &[u8], max_length: usize) -> Option<String> {
    std::str::from_utf8(bytes)
        .ok()
        .and_then(|s| accept(s, max_length))
}

/// Display form of a currency code, or [`UNKNOWN_CURRENCY`]
pub fn currency_code_format(code: &str, max_length: usize) -> String {
    decode_currency_code(code, max_length).unwrap_or_else(|| UNKNOWN_CURRENCY.to_string())
}

/// Display form of a currency code, `None` when nothing qualifies
pub fn decode_currency_code(code: &str, max_length: usize) -> Option<String> {
    let code = code.trim();

    if code.chars().count() == 3 {
        return (!is_native(code)).then(|| code.to_string());
    }

    if code.len() != HEX_CODE_LENGTH || !code.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }

    let mut stripped = code;
    while stripped.len() >= 2 && stripped.ends_with("00") {
        stripped = &stripped[..stripped.len() - 2];
    }
    let bytes = hex::decode(stripped).ok()?;

    if stripped.starts_with(EMBEDDED_NAME_MARKER) && bytes.len() > EMBEDDED_NAME_OFFSET {
        if let Some(name) = decode_utf8(&bytes[EMBEDDED_NAME_OFFSET..], max_length) {
            return Some(name);
        }
    }

    decode_utf8(&bytes, max_length)
}
