//! Port definitions (hexagonal architecture)
//!
//! Ports define the interfaces the transfer engine depends on. The core
//! services use only these traits; adapters provide the storage.

mod cancel;
mod queries;
mod store;

pub use cancel::CancellationToken;
pub use queries::{
    AddAccountBalanceParams, CreateAccountParams, CreateEntryParams, CreateTransferParams,
    ListAccountsParams, ListEntriesParams, ListTransfersParams, Queries, DEFAULT_PAGE_SIZE,
};
pub use store::{Database, Transaction, TransferTx};
