//! Balance change extraction from transaction metadata
//!
//! Walks `meta.AffectedNodes` and turns account-root and trust-line diffs
//! into signed per-account deltas, then renders them for display.

use bigdecimal::BigDecimal;
use num_traits::Zero;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::debug;

use crate::codec::currency::{currency_code_format, DEFAULT_MAX_LENGTH, NATIVE_CURRENCY};
use crate::codec::nft::xrpl_value_to_nft;
use crate::codec::value::{drops_to_xrp, parse_amount, to_ledger_string};

const ACCOUNT_ROOT: &str = "AccountRoot";
const RIPPLE_STATE: &str = "RippleState";

/// Kind of change a ledger entry went through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiffType {
    CreatedNode,
    ModifiedNode,
    DeletedNode,
}

/// One affected ledger entry, normalized
#[derive(Debug, Clone, PartialEq)]
pub struct AffectedNode {
    pub diff_type: DiffType,
    pub entry_type: String,
    pub ledger_index: Option<String>,
    pub new_fields: Map<String, Value>,
    pub final_fields: Map<String, Value>,
    pub previous_fields: Map<String, Value>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawNode {
    ledger_entry_type: String,
    #[serde(default)]
    ledger_index: Option<String>,
    #[serde(default)]
    new_fields: Option<Map<String, Value>>,
    #[serde(default)]
    final_fields: Option<Map<String, Value>>,
    #[serde(default)]
    previous_fields: Option<Map<String, Value>>,
}

#[derive(Deserialize)]
enum RawAffectedNode {
    CreatedNode(RawNode),
    ModifiedNode(RawNode),
    DeletedNode(RawNode),
}

impl From<RawAffectedNode> for AffectedNode {
    fn from(raw: RawAffectedNode) -> Self {
        let (diff_type, node) = match raw {
            RawAffectedNode::CreatedNode(node) => (DiffType::CreatedNode, node),
            RawAffectedNode::ModifiedNode(node) => (DiffType::ModifiedNode, node),
            RawAffectedNode::DeletedNode(node) => (DiffType::DeletedNode, node),
        };
        Self {
            diff_type,
            entry_type: node.ledger_entry_type,
            ledger_index: node.ledger_index,
            new_fields: node.new_fields.unwrap_or_default(),
            final_fields: node.final_fields.unwrap_or_default(),
            previous_fields: node.previous_fields.unwrap_or_default(),
        }
    }
}

impl AffectedNode {
    /// Signed balance delta: `final - previous`, or the balance of a new entry
    ///
    /// Zero deltas and unparsable balances yield `None`.
    pub fn balance_delta(&self) -> Option<BigDecimal> {
        let delta = match (
            self.final_fields.get("Balance"),
            self.previous_fields.get("Balance"),
        ) {
            (Some(final_balance), Some(previous_balance)) => {
                parse_amount(final_balance)? - parse_amount(previous_balance)?
            }
            _ => parse_amount(self.new_fields.get("Balance")?)?,
        };
        (!delta.is_zero()).then_some(delta)
    }

    /// Fields describing the entry as it stands after the transaction
    fn current_fields(&self) -> &Map<String, Value> {
        if self.new_fields.is_empty() {
            &self.final_fields
        } else {
            &self.new_fields
        }
    }
}

/// Normalize `meta.AffectedNodes`; malformed entries are skipped
pub fn normalize_nodes(meta: &Value) -> Vec<AffectedNode> {
    let Some(nodes) = meta.get("AffectedNodes").and_then(Value::as_array) else {
        return Vec::new();
    };

    nodes
        .iter()
        .filter_map(|node| match RawAffectedNode::deserialize(node) {
            Ok(raw) => Some(AffectedNode::from(raw)),
            Err(e) => {
                debug!(error = %e, "Skipping malformed affected node");
                None
            }
        })
        .collect()
}

/// A signed balance delta as seen from one account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceChange {
    /// Empty for the native asset
    pub counterparty: String,
    pub currency: String,
    /// Exact decimal, never zero
    pub value: String,
}

/// Display view of a [`BalanceChange`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormattedValue {
    pub value: String,
    pub currency: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormattedBalanceChange {
    pub counterparty: String,
    pub currency: String,
    pub value: String,
    pub formatted: FormattedValue,
}

/// Account address -> changes, in discovery order per account
pub type BalanceChanges = BTreeMap<String, Vec<FormattedBalanceChange>>;

fn str_field<'a>(fields: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    fields.get(key).and_then(Value::as_str)
}

fn issuer<'a>(fields: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    fields.get(key)?.get("issuer")?.as_str()
}

fn native_quantity(node: &AffectedNode) -> Option<(String, BalanceChange)> {
    let delta = node.balance_delta()?;
    let address = str_field(&node.final_fields, "Account")
        .or_else(|| str_field(&node.new_fields, "Account"))?;

    Some((
        address.to_string(),
        BalanceChange {
            counterparty: String::new(),
            currency: NATIVE_CURRENCY.to_string(),
            value: to_ledger_string(&drops_to_xrp(&delta)),
        },
    ))
}

fn trustline_quantities(node: &AffectedNode) -> Option<[(String, BalanceChange); 2]> {
    let delta = node.balance_delta()?;
    let fields = node.current_fields();

    let holder = issuer(fields, "LowLimit")?;
    let counterparty = issuer(fields, "HighLimit")?;
    let currency = fields.get("Balance")?.get("currency")?.as_str()?;

    let holder_view = BalanceChange {
        counterparty: counterparty.to_string(),
        currency: currency.to_string(),
        value: to_ledger_string(&delta),
    };
    let counterparty_view = BalanceChange {
        counterparty: holder.to_string(),
        currency: currency.to_string(),
        value: to_ledger_string(&(-delta)),
    };

    Some([
        (holder.to_string(), holder_view),
        (counterparty.to_string(), counterparty_view),
    ])
}

/// Raw balance changes grouped by account
pub fn balance_changes(meta: &Value) -> BTreeMap<String, Vec<BalanceChange>> {
    let mut grouped: BTreeMap<String, Vec<BalanceChange>> = BTreeMap::new();

    for node in normalize_nodes(meta) {
        let quantities: Vec<(String, BalanceChange)> = match node.entry_type.as_str() {
            ACCOUNT_ROOT => native_quantity(&node).into_iter().collect(),
            RIPPLE_STATE => trustline_quantities(&node).into_iter().flatten().collect(),
            _ => Vec::new(),
        };
        for (address, change) in quantities {
            grouped.entry(address).or_default().push(change);
        }
    }

    grouped
}

/// Display form of a single change
pub fn format_balance_change(change: BalanceChange) -> FormattedBalanceChange {
    let native = change.counterparty.is_empty() && change.currency == NATIVE_CURRENCY;

    let value = if !change.counterparty.is_empty() && change.value.contains('e') {
        xrpl_value_to_nft(&change.value)
            .map(|ordinal| ordinal.to_string())
            .unwrap_or_else(|| change.value.clone())
    } else {
        change.value.clone()
    };
    let currency = if native {
        NATIVE_CURRENCY.to_string()
    } else {
        currency_code_format(&change.currency, DEFAULT_MAX_LENGTH)
    };

    FormattedBalanceChange {
        counterparty: change.counterparty,
        currency: change.currency,
        value: change.value,
        formatted: FormattedValue { value, currency },
    }
}

/// Formatted balance changes per account for a transaction's metadata
pub fn parse_balance_changes(meta: &Value) -> BalanceChanges {
    balance_changes(meta)
        .into_iter()
        .map(|(address, changes)| {
            let formatted = changes.into_iter().map(format_balance_change).collect();
            (address, formatted)
        })
        .collect()
}
