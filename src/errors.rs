//! Error types surfaced to callers of the lookup engine and the codecs

use thiserror::Error;

/// Failures surfaced by [`crate::TxData`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TxDataError {
    /// No supplied endpoint survived normalization
    #[error("All endpoints are invalid")]
    EndpointsInvalid,

    /// `get`/`get_one` called after `end()` (or after a previous `get_one`)
    #[error("TxData object ended (.getOne() / .end() called)")]
    ObjectInEndedState,

    /// Every endpoint was attempted and none gave an authoritative answer
    #[error("All endpoints are offline (or don't provide full history)")]
    AllConnectionsFailed,

    /// The overall lookup deadline elapsed
    #[error("Max. lookup time (for all endpoints) reached without receiving a valid response")]
    MaxLookupTimeReached,
}

impl TxDataError {
    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            TxDataError::EndpointsInvalid => "ENDPOINTS_INVALID",
            TxDataError::ObjectInEndedState => "OBJECT_IN_ENDED_STATE",
            TxDataError::AllConnectionsFailed => "ALL_CONNECTIONS_FAILED",
            TxDataError::MaxLookupTimeReached => "MAX_LOOKUP_TIME_REACHED",
        }
    }

    /// Whether a fresh engine could succeed where this one failed
    pub fn is_retryable(&self) -> bool {
        match self {
            TxDataError::AllConnectionsFailed => true,
            TxDataError::MaxLookupTimeReached => true,

            TxDataError::EndpointsInvalid => false,
            TxDataError::ObjectInEndedState => false,
        }
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Validation error: {0}")]
    Validation(String),
}

/// Errors raised while packing an ordinal into a ledger value
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NftValueError {
    #[error("Invalid NFT ordinal: {0} (expected a non-negative integer)")]
    InvalidOrdinal(String),

    #[error("Balance {0} does not hold an NFT ordinal")]
    NotAnOrdinalBalance(String),
}
