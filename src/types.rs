//! Core result types

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;

use crate::balance::BalanceChanges;

/// Error code for a transaction the node does not know (yet)
pub const TXN_NOT_FOUND: &str = "txnNotFound";

/// A definitive "no such transaction" style answer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TxNotFound {
    #[serde(default)]
    pub status: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request: Option<Value>,
}

/// The transaction as resolved, or the node's negative answer
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum TxRecord {
    /// Transaction fields plus `meta`, `validated`, `ledger_index`, ...
    Found(Map<String, Value>),
    NotFound(TxNotFound),
}

impl TxRecord {
    /// Build from a `tx` response; `None` unless it carries metadata or an error
    pub fn from_response(response: &Value) -> Option<Self> {
        if let Some(result) = response.get("result").and_then(Value::as_object) {
            if result.contains_key("meta") {
                let mut result = result.clone();
                result.remove("id");
                return Some(TxRecord::Found(result));
            }
        }

        if response.get("error").is_some_and(Value::is_string) {
            let mut response = response.clone();
            if let Some(map) = response.as_object_mut() {
                map.remove("id");
            }
            return serde_json::from_value(response).ok().map(TxRecord::NotFound);
        }

        None
    }

    /// Build from a `transactions` stream push
    pub fn from_stream(message: &Value) -> Option<Self> {
        let mut record = message.get("transaction")?.as_object()?.clone();
        let meta = message.get("meta")?.clone();
        let ledger_index = message.get("ledger_index").cloned().unwrap_or(Value::Null);

        record.insert("meta".to_string(), meta);
        record.insert(
            "validated".to_string(),
            message.get("validated").cloned().unwrap_or(Value::Bool(false)),
        );
        record.insert("ledger_index".to_string(), ledger_index.clone());
        record.insert("inLedger".to_string(), ledger_index);
        Some(TxRecord::Found(record))
    }

    pub fn meta(&self) -> Option<&Value> {
        match self {
            TxRecord::Found(tx) => tx.get("meta"),
            TxRecord::NotFound(_) => None,
        }
    }

    pub fn account(&self) -> Option<&str> {
        match self {
            TxRecord::Found(tx) => tx.get("Account").and_then(Value::as_str),
            TxRecord::NotFound(_) => None,
        }
    }

    pub fn hash(&self) -> Option<&str> {
        match self {
            TxRecord::Found(tx) => tx.get("hash").and_then(Value::as_str),
            TxRecord::NotFound(_) => None,
        }
    }

    pub fn is_validated(&self) -> bool {
        match self {
            TxRecord::Found(tx) => tx.get("validated").and_then(Value::as_bool).unwrap_or(false),
            TxRecord::NotFound(_) => false,
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, TxRecord::Found(_))
    }

    /// True for the `txnNotFound` answer that wait mode reacts to
    pub fn is_not_found(&self) -> bool {
        matches!(self, TxRecord::NotFound(nf) if nf.error == TXN_NOT_FOUND)
    }
}

/// Which path produced the winning answer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolvedBy {
    /// Query answered within its endpoint's deadline
    Direct,
    /// Query answered after its endpoint's deadline had passed
    Late,
    /// Validated stream push received while waiting for the transaction
    Async,
}

impl fmt::Display for ResolvedBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolvedBy::Direct => write!(f, "direct"),
            ResolvedBy::Late => write!(f, "late"),
            ResolvedBy::Async => write!(f, "async"),
        }
    }
}

/// Outcome of a successful lookup
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedLookup {
    pub result: TxRecord,
    pub balance_changes: BalanceChanges,
    pub resolved_by: ResolvedBy,
    pub host: String,
}

/// Validated transaction seen on a session's `transactions` stream
#[derive(Debug, Clone)]
pub struct StreamEvent {
    pub hash: String,
    pub validated: bool,
    pub message: Arc<Value>,
    pub host: String,
}
