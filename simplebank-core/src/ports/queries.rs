//! Query facade port - single-statement data access bound to a transaction

use crate::domain::result::Result;
use crate::domain::{Account, AccountId, Currency, Entry, Transfer};

/// Default page size for list operations
pub const DEFAULT_PAGE_SIZE: i64 = 50;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateAccountParams {
    pub owner: String,
    pub balance: i64,
    pub currency: Currency,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListAccountsParams {
    pub owner: Option<String>,
    pub limit: i64,
    pub offset: i64,
}

impl Default for ListAccountsParams {
    fn default() -> Self {
        Self {
            owner: None,
            limit: DEFAULT_PAGE_SIZE,
            offset: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CreateTransferParams {
    pub from_account_id: AccountId,
    pub to_account_id: AccountId,
    pub amount: i64,
}

/// Transfers touching `account_id` on either side
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListTransfersParams {
    pub account_id: AccountId,
    pub limit: i64,
    pub offset: i64,
}

impl ListTransfersParams {
    pub fn for_account(account_id: AccountId) -> Self {
        Self {
            account_id,
            limit: DEFAULT_PAGE_SIZE,
            offset: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CreateEntryParams {
    pub account_id: AccountId,
    pub amount: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListEntriesParams {
    pub account_id: AccountId,
    pub limit: i64,
    pub offset: i64,
}

impl ListEntriesParams {
    pub fn for_account(account_id: AccountId) -> Self {
        Self {
            account_id,
            limit: DEFAULT_PAGE_SIZE,
            offset: 0,
        }
    }
}

/// Atomic `balance = balance + amount` on one account row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddAccountBalanceParams {
    pub id: AccountId,
    pub amount: i64,
}

/// Data-access capability set
///
/// Every call is a single atomic statement executed inside the transaction
/// the implementor is bound to. Implementations must report referential and
/// check failures as `Error::Constraint`, and transport failures as
/// `Error::Connectivity`.
pub trait Queries {
    // === Accounts ===

    fn create_account(&mut self, params: &CreateAccountParams) -> Result<Account>;

    /// `Error::NotFound` if no such account
    fn get_account(&mut self, id: AccountId) -> Result<Account>;

    fn list_accounts(&mut self, params: &ListAccountsParams) -> Result<Vec<Account>>;

    /// Apply a balance delta and return the post-update row.
    ///
    /// Takes the row's write lock for the rest of the transaction.
    fn add_account_balance(&mut self, params: &AddAccountBalanceParams) -> Result<Account>;

    // === Transfers ===

    fn create_transfer(&mut self, params: &CreateTransferParams) -> Result<Transfer>;

    fn get_transfer(&mut self, id: i64) -> Result<Transfer>;

    fn list_transfers(&mut self, params: &ListTransfersParams) -> Result<Vec<Transfer>>;

    // === Entries ===

    fn create_entry(&mut self, params: &CreateEntryParams) -> Result<Entry>;

    fn get_entry(&mut self, id: i64) -> Result<Entry>;

    fn list_entries(&mut self, params: &ListEntriesParams) -> Result<Vec<Entry>>;
}
