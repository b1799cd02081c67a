//! In-process store with row-level locking
//!
//! Behaves like a row-locking SQL store for the purposes of the transfer
//! engine: uncommitted rows are private to their transaction, a balance
//! update takes an exclusive lock on the account row until commit or
//! rollback, and a lock wait longer than `lock_timeout` fails with
//! `Error::Conflict` the way a deadlock detector would.
//!
//! Faults can be injected at the transaction boundary and at each write
//! statement to exercise failure paths.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use chrono::Utc;

use crate::domain::result::{Error, Result};
use crate::domain::{Account, AccountId, Entry, Transfer};
use crate::ports::{
    AddAccountBalanceParams, CancellationToken, CreateAccountParams, CreateEntryParams,
    CreateTransferParams, Database, ListAccountsParams, ListEntriesParams, ListTransfersParams,
    Queries, Transaction,
};

/// Default time a transaction waits for a row lock
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// Lock waits wake at least this often to observe cancellation
const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Where an injected fault fires
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultPoint {
    Begin,
    CreateTransfer,
    CreateEntry,
    AddAccountBalance,
    Commit,
    Rollback,
}

struct AccountRow {
    account: Account,
    locked_by: Option<u64>,
}

#[derive(Default)]
struct State {
    accounts: BTreeMap<AccountId, AccountRow>,
    transfers: Vec<Transfer>,
    entries: Vec<Entry>,
    next_account_id: i64,
    next_transfer_id: i64,
    next_entry_id: i64,
    faults: HashMap<FaultPoint, String>,
    lock_history: Vec<AccountId>,
}

impl State {
    /// One-shot: an injected fault fires once and is gone
    fn take_fault(&mut self, point: FaultPoint) -> Result<()> {
        match self.faults.remove(&point) {
            Some(msg) => Err(Error::connectivity(msg)),
            None => Ok(()),
        }
    }

    fn release_locks(&mut self, tx_id: u64) {
        for row in self.accounts.values_mut() {
            if row.locked_by == Some(tx_id) {
                row.locked_by = None;
            }
        }
    }
}

/// In-memory transactional store
pub struct MemoryStore {
    state: Mutex<State>,
    row_released: Condvar,
    lock_timeout: Duration,
    next_tx_id: AtomicU64,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(DEFAULT_LOCK_TIMEOUT)
    }
}

impl MemoryStore {
    pub fn new(lock_timeout: Duration) -> Self {
        Self {
            state: Mutex::new(State::default()),
            row_released: Condvar::new(),
            lock_timeout,
            next_tx_id: AtomicU64::new(1),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        // A panic never leaves State half-written, so poisoning is harmless.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make the next operation at `point` fail with `Error::Connectivity(msg)`
    pub fn inject_fault(&self, point: FaultPoint, msg: impl Into<String>) {
        self.state().faults.insert(point, msg.into());
    }

    /// Committed balance of an account
    pub fn account_balance(&self, id: AccountId) -> Option<i64> {
        self.state().accounts.get(&id).map(|row| row.account.balance)
    }

    pub fn transfer_count(&self) -> usize {
        self.state().transfers.len()
    }

    pub fn entry_count(&self) -> usize {
        self.state().entries.len()
    }

    /// Account ids in the order their row locks were granted, across all
    /// transactions
    pub fn lock_history(&self) -> Vec<AccountId> {
        self.state().lock_history.clone()
    }
}

impl Database for MemoryStore {
    type Tx<'a> = MemoryTx<'a>;

    fn begin(&self, ctx: &CancellationToken) -> Result<MemoryTx<'_>> {
        ctx.check()?;
        self.state().take_fault(FaultPoint::Begin)?;

        Ok(MemoryTx {
            store: self,
            id: self.next_tx_id.fetch_add(1, Ordering::Relaxed),
            ctx: ctx.clone(),
            accounts: BTreeMap::new(),
            transfers: Vec::new(),
            entries: Vec::new(),
            finished: false,
        })
    }
}

/// An open `MemoryStore` transaction
///
/// Dropping it without commit or rollback discards its writes and releases
/// its row locks.
pub struct MemoryTx<'a> {
    store: &'a MemoryStore,
    id: u64,
    ctx: CancellationToken,
    // Rows created or updated by this transaction
    accounts: BTreeMap<AccountId, Account>,
    transfers: Vec<Transfer>,
    entries: Vec<Entry>,
    finished: bool,
}

impl MemoryTx<'_> {
    fn account_exists(&self, state: &State, id: AccountId) -> bool {
        self.accounts.contains_key(&id) || state.accounts.contains_key(&id)
    }

    fn visible_account(&self, state: &State, id: AccountId) -> Option<Account> {
        self.accounts
            .get(&id)
            .cloned()
            .or_else(|| state.accounts.get(&id).map(|row| row.account.clone()))
    }

    /// Take the exclusive lock on a committed account row, waiting for the
    /// current holder up to the store's lock timeout.
    fn lock_row<'s>(&self, mut state: MutexGuard<'s, State>, id: AccountId) -> Result<MutexGuard<'s, State>> {
        let deadline = Instant::now() + self.store.lock_timeout;

        loop {
            let Some(row) = state.accounts.get_mut(&id) else {
                // Created by this transaction and not yet visible to anyone else
                if self.accounts.contains_key(&id) {
                    return Ok(state);
                }
                return Err(Error::constraint(format!("account {} does not exist", id)));
            };

            match row.locked_by {
                Some(holder) if holder == self.id => return Ok(state),
                None => {
                    row.locked_by = Some(self.id);
                    state.lock_history.push(id);
                    return Ok(state);
                }
                Some(_) => {}
            }

            self.ctx.check()?;
            let now = Instant::now();
            if now >= deadline {
                return Err(Error::Conflict(format!(
                    "lock wait timeout exceeded on account {}",
                    id
                )));
            }

            let wait = (deadline - now).min(LOCK_POLL_INTERVAL);
            let (guard, _) = self
                .store
                .row_released
                .wait_timeout(state, wait)
                .unwrap_or_else(PoisonError::into_inner);
            state = guard;
        }
    }

    /// Discard pending writes and release row locks
    fn abandon(&mut self) {
        self.accounts.clear();
        self.transfers.clear();
        self.entries.clear();
        self.store.state().release_locks(self.id);
        self.store.row_released.notify_all();
        self.finished = true;
    }
}

impl Drop for MemoryTx<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.abandon();
        }
    }
}

fn page<T>(rows: Vec<T>, limit: i64, offset: i64) -> Vec<T> {
    rows.into_iter()
        .skip(offset.max(0) as usize)
        .take(limit.max(0) as usize)
        .collect()
}

impl Queries for MemoryTx<'_> {
    fn create_account(&mut self, params: &CreateAccountParams) -> Result<Account> {
        self.ctx.check()?;
        let mut state = self.store.state();
        state.next_account_id += 1;

        let account = Account {
            id: state.next_account_id,
            owner: params.owner.clone(),
            balance: params.balance,
            currency: params.currency,
            created_at: Utc::now(),
        };
        self.accounts.insert(account.id, account.clone());
        Ok(account)
    }

    fn get_account(&mut self, id: AccountId) -> Result<Account> {
        self.ctx.check()?;
        let state = self.store.state();
        self.visible_account(&state, id)
            .ok_or_else(|| Error::not_found(format!("account {}", id)))
    }

    fn list_accounts(&mut self, params: &ListAccountsParams) -> Result<Vec<Account>> {
        self.ctx.check()?;
        let state = self.store.state();

        let mut merged: BTreeMap<AccountId, Account> = state
            .accounts
            .iter()
            .map(|(id, row)| (*id, row.account.clone()))
            .collect();
        merged.extend(self.accounts.iter().map(|(id, a)| (*id, a.clone())));

        let rows = merged
            .into_values()
            .filter(|a| params.owner.as_ref().map_or(true, |owner| &a.owner == owner))
            .collect();
        Ok(page(rows, params.limit, params.offset))
    }

    fn add_account_balance(&mut self, params: &AddAccountBalanceParams) -> Result<Account> {
        self.ctx.check()?;
        let mut state = self.store.state();
        state.take_fault(FaultPoint::AddAccountBalance)?;
        let state = self.lock_row(state, params.id)?;

        let mut account = self
            .visible_account(&state, params.id)
            .ok_or_else(|| Error::constraint(format!("account {} does not exist", params.id)))?;
        account.balance = account.balance.checked_add(params.amount).ok_or_else(|| {
            Error::constraint(format!("balance overflow on account {}", params.id))
        })?;

        self.accounts.insert(account.id, account.clone());
        Ok(account)
    }

    fn create_transfer(&mut self, params: &CreateTransferParams) -> Result<Transfer> {
        self.ctx.check()?;
        let mut state = self.store.state();
        state.take_fault(FaultPoint::CreateTransfer)?;

        if params.amount <= 0 {
            return Err(Error::constraint("transfers_amount_check: amount must be positive"));
        }
        if params.from_account_id == params.to_account_id {
            return Err(Error::constraint(
                "transfers_distinct_accounts_check: from and to accounts must differ",
            ));
        }
        for id in [params.from_account_id, params.to_account_id] {
            if !self.account_exists(&state, id) {
                return Err(Error::constraint(format!(
                    "transfers_account_fkey: account {} does not exist",
                    id
                )));
            }
        }

        state.next_transfer_id += 1;
        let transfer = Transfer {
            id: state.next_transfer_id,
            from_account_id: params.from_account_id,
            to_account_id: params.to_account_id,
            amount: params.amount,
            created_at: Utc::now(),
        };
        self.transfers.push(transfer.clone());
        Ok(transfer)
    }

    fn get_transfer(&mut self, id: i64) -> Result<Transfer> {
        self.ctx.check()?;
        let state = self.store.state();
        self.transfers
            .iter()
            .chain(state.transfers.iter())
            .find(|t| t.id == id)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("transfer {}", id)))
    }

    fn list_transfers(&mut self, params: &ListTransfersParams) -> Result<Vec<Transfer>> {
        self.ctx.check()?;
        let state = self.store.state();
        let mut rows: Vec<Transfer> = state
            .transfers
            .iter()
            .chain(self.transfers.iter())
            .filter(|t| t.from_account_id == params.account_id || t.to_account_id == params.account_id)
            .cloned()
            .collect();
        rows.sort_by_key(|t| t.id);
        Ok(page(rows, params.limit, params.offset))
    }

    fn create_entry(&mut self, params: &CreateEntryParams) -> Result<Entry> {
        self.ctx.check()?;
        let mut state = self.store.state();
        state.take_fault(FaultPoint::CreateEntry)?;

        if !self.account_exists(&state, params.account_id) {
            return Err(Error::constraint(format!(
                "entries_account_id_fkey: account {} does not exist",
                params.account_id
            )));
        }

        state.next_entry_id += 1;
        let entry = Entry {
            id: state.next_entry_id,
            account_id: params.account_id,
            amount: params.amount,
            created_at: Utc::now(),
        };
        self.entries.push(entry.clone());
        Ok(entry)
    }

    fn get_entry(&mut self, id: i64) -> Result<Entry> {
        self.ctx.check()?;
        let state = self.store.state();
        self.entries
            .iter()
            .chain(state.entries.iter())
            .find(|e| e.id == id)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("entry {}", id)))
    }

    fn list_entries(&mut self, params: &ListEntriesParams) -> Result<Vec<Entry>> {
        self.ctx.check()?;
        let state = self.store.state();
        let mut rows: Vec<Entry> = state
            .entries
            .iter()
            .chain(self.entries.iter())
            .filter(|e| e.account_id == params.account_id)
            .cloned()
            .collect();
        rows.sort_by_key(|e| e.id);
        Ok(page(rows, params.limit, params.offset))
    }
}

impl Transaction for MemoryTx<'_> {
    fn commit(mut self) -> Result<()> {
        let mut state = self.store.state();
        if let Err(err) = state.take_fault(FaultPoint::Commit) {
            drop(state);
            self.abandon();
            return Err(err);
        }

        for (id, account) in std::mem::take(&mut self.accounts) {
            state.accounts.insert(
                id,
                AccountRow {
                    account,
                    locked_by: None,
                },
            );
        }
        state.transfers.append(&mut self.transfers);
        state.entries.append(&mut self.entries);
        state.release_locks(self.id);
        drop(state);

        self.store.row_released.notify_all();
        self.finished = true;
        Ok(())
    }

    fn rollback(mut self) -> Result<()> {
        // A failed rollback still loses the transaction, like a dropped
        // connection would.
        let fault = self.store.state().take_fault(FaultPoint::Rollback);
        self.abandon();
        fault
    }
}
