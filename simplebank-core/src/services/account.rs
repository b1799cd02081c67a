//! Account service - opening accounts and reading account history

use crate::domain::result::{Error, Result};
use crate::domain::{Account, AccountId, Currency, Entry, Transfer};
use crate::ports::{
    CancellationToken, CreateAccountParams, Database, ListAccountsParams, ListEntriesParams,
    ListTransfersParams,
};

use super::TxManager;

pub struct AccountService<D: Database> {
    tx_manager: TxManager<D>,
}

impl<D: Database> AccountService<D> {
    pub fn new(tx_manager: TxManager<D>) -> Self {
        Self { tx_manager }
    }

    /// Open an empty account
    pub fn open_account(&self, ctx: &CancellationToken, owner: &str, currency: Currency) -> Result<Account> {
        self.open_account_with_balance(ctx, owner, currency, 0)
    }

    /// Open an account with an opening balance
    pub fn open_account_with_balance(
        &self,
        ctx: &CancellationToken,
        owner: &str,
        currency: Currency,
        balance: i64,
    ) -> Result<Account> {
        let owner = owner.trim();
        if owner.is_empty() {
            return Err(Error::validation("account owner must not be empty"));
        }
        if balance < 0 {
            return Err(Error::validation(format!(
                "opening balance must not be negative, got {}",
                balance
            )));
        }

        let params = CreateAccountParams {
            owner: owner.to_string(),
            balance,
            currency,
        };
        let account = self
            .tx_manager
            .exec_tx(ctx, |q| q.create_account(&params))?;

        tracing::info!(account_id = account.id, currency = %account.currency, "account opened");
        Ok(account)
    }

    pub fn get_account(&self, ctx: &CancellationToken, id: AccountId) -> Result<Account> {
        self.tx_manager.exec_tx(ctx, |q| q.get_account(id))
    }

    pub fn list_accounts(&self, ctx: &CancellationToken, params: &ListAccountsParams) -> Result<Vec<Account>> {
        self.tx_manager.exec_tx(ctx, |q| q.list_accounts(params))
    }

    /// Entries posted against an account, oldest first
    pub fn list_entries(&self, ctx: &CancellationToken, params: &ListEntriesParams) -> Result<Vec<Entry>> {
        self.tx_manager.exec_tx(ctx, |q| {
            q.get_account(params.account_id)?;
            q.list_entries(params)
        })
    }

    /// Transfers in or out of an account, oldest first
    pub fn list_transfers(&self, ctx: &CancellationToken, params: &ListTransfersParams) -> Result<Vec<Transfer>> {
        self.tx_manager.exec_tx(ctx, |q| {
            q.get_account(params.account_id)?;
            q.list_transfers(params)
        })
    }
}
