//! Wire messages exchanged with ledger nodes

use serde_json::{json, Value};

use crate::types::TxRecord;

/// First ledger index available on the public network
pub const GENESIS_LEDGER_INDEX: &str = "32570";

/// Lookups at or below this length use the compact transaction identifier
pub const CTID_MAX_LENGTH: usize = 16;

/// Errors describing the node's own state rather than the transaction
const NODE_CONDITION_ERRORS: [&str; 8] = [
    "tooBusy",
    "noNetwork",
    "noCurrent",
    "noClosed",
    "notSynced",
    "notReady",
    "slowDown",
    "amendmentBlocked",
];

pub fn server_info_request() -> Value {
    json!({ "command": "server_info" })
}

pub fn subscribe_request() -> Value {
    json!({ "command": "subscribe", "streams": ["transactions"] })
}

/// `tx` lookup by hash, or by CTID for short identifiers
pub fn tx_request(id: u64, hash: &str) -> Value {
    let key = if hash.len() > CTID_MAX_LENGTH { "transaction" } else { "ctid" };
    let mut request = json!({ "id": id.to_string(), "command": "tx" });
    request[key] = Value::String(hash.to_string());
    request
}

/// `result.info.complete_ledgers` of a `server_info` response
pub fn complete_ledgers(message: &Value) -> Option<String> {
    let ranges = message.get("result")?.get("info")?.get("complete_ledgers")?;
    Some(match ranges {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    })
}

/// A single contiguous range starting at the genesis ledger
pub fn is_full_history(complete_ledgers: &str) -> bool {
    let ranges = complete_ledgers.trim();
    ranges.split(',').count() < 2 && ranges.split('-').next() == Some(GENESIS_LEDGER_INDEX)
}

/// Correlation id of a response (sent as a string, echoed as-is)
pub fn correlation_id(message: &Value) -> Option<u64> {
    match message.get("id")? {
        Value::String(s) => s.parse().ok(),
        Value::Number(n) => n.as_u64(),
        _ => None,
    }
}

/// `transaction.hash` of a stream push
pub fn stream_tx_hash(message: &Value) -> Option<&str> {
    message.get("transaction")?.get("hash")?.as_str()
}

/// `validated` at the top level or under `result`
pub fn is_validated(message: &Value) -> bool {
    let flag = |v: &Value| v.get("validated").and_then(Value::as_bool).unwrap_or(false);
    flag(message) || message.get("result").is_some_and(flag)
}

/// How a `tx` response bears on the lookup
#[derive(Debug, Clone, PartialEq)]
pub enum Answer {
    /// Final: validated metadata, or an error about the transaction itself
    Authoritative(TxRecord),
    /// The node cannot answer right now
    Unavailable(String),
    /// Known but not yet validated; keep listening
    Pending,
}

pub fn classify_tx_response(message: &Value) -> Answer {
    if let Some(error) = message.get("error").and_then(Value::as_str) {
        if NODE_CONDITION_ERRORS.contains(&error) {
            return Answer::Unavailable(error.to_string());
        }
        return match TxRecord::from_response(message) {
            Some(record) => Answer::Authoritative(record),
            None => Answer::Unavailable(error.to_string()),
        };
    }

    if is_validated(message) {
        if let Some(record) = TxRecord::from_response(message) {
            return Answer::Authoritative(record);
        }
    }

    Answer::Pending
}
