//! Transfer service - money movement between two accounts
//!
//! A transfer is one unit of work: the transfer record, a debit and a credit
//! entry, and both balance updates commit together or not at all.
//!
//! Balance updates lock account rows. They are always issued lower account
//! id first, whatever the direction of the transfer, so two transfers over
//! the same pair of accounts request their row locks in the same order and
//! cannot deadlock on each other.

use crate::domain::result::{Error, Result};
use crate::domain::{Account, AccountId, TransferTxParams, TransferTxResult};
use crate::ports::{
    AddAccountBalanceParams, CancellationToken, CreateEntryParams, CreateTransferParams,
    Database, Queries, TransferTx,
};

use super::TxManager;

/// Order in which the rows of two accounts must be locked: lower id first.
pub fn lock_order(id1: AccountId, id2: AccountId) -> (AccountId, AccountId) {
    if id1 <= id2 {
        (id1, id2)
    } else {
        (id2, id1)
    }
}

/// Apply two balance deltas in the given order, returning the updated rows
/// in the same order.
pub fn add_money(
    q: &mut dyn Queries,
    account_id1: AccountId,
    amount1: i64,
    account_id2: AccountId,
    amount2: i64,
) -> Result<(Account, Account)> {
    let account1 = q.add_account_balance(&AddAccountBalanceParams {
        id: account_id1,
        amount: amount1,
    })?;
    let account2 = q.add_account_balance(&AddAccountBalanceParams {
        id: account_id2,
        amount: amount2,
    })?;
    Ok((account1, account2))
}

fn validate(params: &TransferTxParams) -> Result<()> {
    if params.from_account_id == params.to_account_id {
        return Err(Error::validation(format!(
            "cannot transfer from account {} to itself",
            params.from_account_id
        )));
    }
    if params.amount <= 0 {
        return Err(Error::validation(format!(
            "transfer amount must be positive, got {}",
            params.amount
        )));
    }
    Ok(())
}

/// Executes transfer transactions against a store
pub struct TransferService<D: Database> {
    tx_manager: TxManager<D>,
}

impl<D: Database> TransferService<D> {
    pub fn new(tx_manager: TxManager<D>) -> Self {
        Self { tx_manager }
    }

    /// Move `params.amount` from one account to another.
    ///
    /// Malformed input is rejected with `Error::Validation` before any
    /// transaction is opened. Store errors are returned unchanged after the
    /// transaction has been rolled back; nothing is retried here.
    pub fn transfer_tx(
        &self,
        ctx: &CancellationToken,
        params: TransferTxParams,
    ) -> Result<TransferTxResult> {
        validate(&params)?;

        let result = self
            .tx_manager
            .exec_tx(ctx, |q| Self::execute(q, &params))
            .inspect_err(|err| {
                tracing::warn!(
                    from_account_id = params.from_account_id,
                    to_account_id = params.to_account_id,
                    amount = params.amount,
                    error = %err,
                    "transfer failed"
                );
            })?;

        tracing::info!(
            transfer_id = result.transfer.id,
            from_account_id = params.from_account_id,
            to_account_id = params.to_account_id,
            amount = params.amount,
            "transfer committed"
        );
        Ok(result)
    }

    fn execute(q: &mut dyn Queries, params: &TransferTxParams) -> Result<TransferTxResult> {
        let transfer = q.create_transfer(&CreateTransferParams {
            from_account_id: params.from_account_id,
            to_account_id: params.to_account_id,
            amount: params.amount,
        })?;

        let from_entry = q.create_entry(&CreateEntryParams {
            account_id: params.from_account_id,
            amount: -params.amount,
        })?;

        let to_entry = q.create_entry(&CreateEntryParams {
            account_id: params.to_account_id,
            amount: params.amount,
        })?;

        let delta = |id: AccountId| {
            if id == params.from_account_id {
                -params.amount
            } else {
                params.amount
            }
        };
        let (first, second) = lock_order(params.from_account_id, params.to_account_id);
        let (first_account, second_account) =
            add_money(q, first, delta(first), second, delta(second))?;

        // Map back from lock order to the caller's direction
        let (from_account, to_account) = if first == params.from_account_id {
            (first_account, second_account)
        } else {
            (second_account, first_account)
        };

        Ok(TransferTxResult {
            transfer,
            from_account,
            to_account,
            from_entry,
            to_entry,
        })
    }
}

impl<D: Database> TransferTx for TransferService<D> {
    fn transfer_tx(
        &self,
        ctx: &CancellationToken,
        params: TransferTxParams,
    ) -> Result<TransferTxResult> {
        TransferService::transfer_tx(self, ctx, params)
    }
}
