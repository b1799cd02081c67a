//! Core domain entities
//!
//! Plain data records produced and consumed by the transfer engine. No I/O
//! happens here.

mod account;
mod currency;
mod entry;
mod transfer;
pub mod result;

pub use account::{Account, AccountId};
pub use currency::{is_supported_currency, Currency};
pub use entry::Entry;
pub use transfer::{Transfer, TransferTxParams, TransferTxResult};
