//! Display codecs for ledger currency codes and amounts

pub mod currency;
pub mod nft;
pub mod value;

pub use currency::{currency_code_format, NATIVE_CURRENCY, UNKNOWN_CURRENCY};
pub use nft::{nft_value_to_xrpl, xrpl_value_to_nft};
