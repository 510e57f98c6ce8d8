//! Resolve ledger transactions by hash across redundant websocket nodes
//!
//! [`TxData`] races every configured endpoint, returns the first
//! authoritative answer (the validated transaction with its metadata, or a
//! definitive not-found) and parses the metadata into per-account balance
//! changes. See [`utils`] for the display codecs used by that parser.

pub mod balance;
pub mod codec;
pub mod config;
pub mod endpoints;
pub mod engine;
pub mod errors;
pub mod logging;
pub mod streaming;
pub mod types;

pub use balance::{parse_balance_changes, BalanceChanges, FormattedBalanceChange};
pub use config::{TxDataConfig, TxDataOptions};
pub use endpoints::EndpointStatus;
pub use engine::TxData;
pub use errors::{ConfigError, NftValueError, TxDataError};
pub use types::{ResolvedBy, ResolvedLookup, TxNotFound, TxRecord};

/// Currency code and amount helpers
pub mod utils {
    pub use crate::codec::currency::{currency_code_format, DEFAULT_MAX_LENGTH};
    pub use crate::codec::nft::{nft_value_to_xrpl, xrpl_value_to_nft};
}
