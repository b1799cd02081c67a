//! DuckDB store implementation

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use chrono::{DateTime, Utc};
use duckdb::{params, Connection, Row};

use crate::domain::result::{Error, Result};
use crate::domain::{Account, AccountId, Entry, Transfer};
use crate::ports::{
    AddAccountBalanceParams, CancellationToken, CreateAccountParams, CreateEntryParams,
    CreateTransferParams, Database, ListAccountsParams, ListEntriesParams, ListTransfersParams,
    Queries, Transaction,
};
use crate::services::{MigrationResult, MigrationService};

/// Maximum number of retries when the database file is locked
const MAX_RETRIES: u32 = 5;

/// Initial retry delay in milliseconds (doubles each retry: 50, 100, 200, 400ms)
const INITIAL_RETRY_DELAY_MS: u64 = 50;

const ACCOUNT_COLUMNS: &str = "id, owner, balance, currency, created_at";
const TRANSFER_COLUMNS: &str = "id, from_account_id, to_account_id, amount, created_at";
const ENTRY_COLUMNS: &str = "id, account_id, amount, created_at";

/// Check if an error message indicates a file locking issue that should be retried
fn is_retryable_open_error(err_msg: &str) -> bool {
    let lower = err_msg.to_lowercase();
    lower.contains("being used by another process")
        || lower.contains("cannot access the file")
        || lower.contains("resource temporarily unavailable")
        || lower.contains("database is locked")
        || lower.contains("file is already open")
}

/// Classify a DuckDB error into the core error taxonomy
pub fn map_duckdb_err(err: duckdb::Error) -> Error {
    let msg = err.to_string();
    if msg.contains("Constraint Error")
        || msg.contains("Out of Range Error")
        || msg.contains("Conversion Error")
    {
        // Rejected data, e.g. a balance update overflowing BIGINT
        Error::Constraint(msg)
    } else if msg.contains("TransactionContext Error") || msg.contains("Conflict") {
        Error::Conflict(msg)
    } else if msg.contains("IO Error") || msg.contains("Connection Error") || msg.contains("Interrupt") {
        Error::Connectivity(msg)
    } else {
        Error::Other(msg)
    }
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Other(format!("invalid timestamp '{}': {}", s, e)))
}

fn now_timestamp() -> String {
    Utc::now().to_rfc3339()
}

type AccountRow = (i64, String, i64, String, String);
type TransferRow = (i64, i64, i64, i64, String);
type EntryRow = (i64, i64, i64, String);

fn read_account(row: &Row) -> duckdb::Result<AccountRow> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
}

fn read_transfer(row: &Row) -> duckdb::Result<TransferRow> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
}

fn read_entry(row: &Row) -> duckdb::Result<EntryRow> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
}

fn into_account((id, owner, balance, currency, created_at): AccountRow) -> Result<Account> {
    Ok(Account {
        id,
        owner,
        balance,
        currency: currency.parse()?,
        created_at: parse_timestamp(&created_at)?,
    })
}

fn into_transfer((id, from_account_id, to_account_id, amount, created_at): TransferRow) -> Result<Transfer> {
    Ok(Transfer {
        id,
        from_account_id,
        to_account_id,
        amount,
        created_at: parse_timestamp(&created_at)?,
    })
}

fn into_entry((id, account_id, amount, created_at): EntryRow) -> Result<Entry> {
    Ok(Entry {
        id,
        account_id,
        amount,
        created_at: parse_timestamp(&created_at)?,
    })
}

/// DuckDB-backed store
///
/// A single connection serves every transaction. An open transaction holds
/// the connection until it commits or rolls back, which serialises writers
/// the way DuckDB's single-writer model expects.
pub struct DuckDbStore {
    conn: Mutex<Connection>,
    db_path: Option<PathBuf>,
}

impl DuckDbStore {
    /// Open (or create) a database file and bring its schema up to date.
    ///
    /// Retries with exponential backoff while another process holds the
    /// file lock.
    pub fn open(db_path: &Path) -> Result<Self> {
        let mut attempt = 0;
        let conn = loop {
            match Self::try_open_connection(db_path) {
                Ok(conn) => break conn,
                Err(e) => {
                    let err_msg = e.to_string();
                    if is_retryable_open_error(&err_msg) && attempt < MAX_RETRIES - 1 {
                        let delay =
                            Duration::from_millis(INITIAL_RETRY_DELAY_MS * 2u64.pow(attempt));
                        tracing::warn!(
                            delay_ms = delay.as_millis() as u64,
                            attempt = attempt + 1,
                            max_attempts = MAX_RETRIES,
                            error = %err_msg,
                            "database busy, retrying"
                        );
                        thread::sleep(delay);
                        attempt += 1;
                        continue;
                    }
                    return Err(Error::connectivity(err_msg));
                }
            }
        };

        let store = Self {
            conn: Mutex::new(conn),
            db_path: Some(db_path.to_path_buf()),
        };
        store.ensure_schema()?;
        Ok(store)
    }

    /// Open a private in-memory database with the schema applied
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(map_duckdb_err)?;
        let store = Self {
            conn: Mutex::new(conn),
            db_path: None,
        };
        store.ensure_schema()?;
        Ok(store)
    }

    fn try_open_connection(db_path: &Path) -> duckdb::Result<Connection> {
        // Extension autoloading stays off; nothing here needs extensions.
        let config = duckdb::Config::default().enable_autoload_extension(false)?;
        Connection::open_with_flags(db_path, config)
    }

    /// Database file, `None` for in-memory stores
    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        // A transaction that panicked was rolled back before the guard was
        // released, so the connection is safe to reuse.
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run database migrations
    pub fn run_migrations(&self) -> Result<MigrationResult> {
        let conn = self.conn();
        MigrationService::new(&conn).run_pending()
    }

    /// Ensure database schema exists (runs pending migrations)
    pub fn ensure_schema(&self) -> Result<()> {
        self.run_migrations()?;
        Ok(())
    }
}

impl Database for DuckDbStore {
    type Tx<'a> = DuckDbTx<'a>;

    fn begin(&self, ctx: &CancellationToken) -> Result<DuckDbTx<'_>> {
        ctx.check()?;
        let conn = self.conn();
        conn.execute_batch("BEGIN TRANSACTION")
            .map_err(|e| Error::connectivity(format!("begin failed: {}", e)))?;

        Ok(DuckDbTx {
            conn,
            ctx: ctx.clone(),
            open: true,
        })
    }
}

/// An open DuckDB transaction, holding the store's connection
pub struct DuckDbTx<'a> {
    conn: MutexGuard<'a, Connection>,
    ctx: CancellationToken,
    open: bool,
}

impl DuckDbTx<'_> {
    fn query_account(&self, sql: &str, params: &[&dyn duckdb::ToSql]) -> Result<Option<Account>> {
        self.ctx.check()?;
        match self.conn.query_row(sql, params, read_account) {
            Ok(row) => into_account(row).map(Some),
            Err(duckdb::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(map_duckdb_err(e)),
        }
    }

    fn finish(&mut self, statement: &str) -> Result<()> {
        self.open = false;
        self.conn
            .execute_batch(statement)
            .map_err(|e| Error::connectivity(format!("{} failed: {}", statement.to_lowercase(), e)))
    }
}

impl Drop for DuckDbTx<'_> {
    fn drop(&mut self) {
        if self.open {
            // Never hand the connection back with a transaction still open
            if let Err(e) = self.conn.execute_batch("ROLLBACK") {
                tracing::error!(error = %e, "implicit rollback failed");
            }
        }
    }
}

impl Queries for DuckDbTx<'_> {
    fn create_account(&mut self, params: &CreateAccountParams) -> Result<Account> {
        let sql = format!(
            "INSERT INTO accounts (owner, balance, currency, created_at) VALUES (?, ?, ?, ?)
             RETURNING {}",
            ACCOUNT_COLUMNS
        );
        self.query_account(
            &sql,
            params![params.owner, params.balance, params.currency.code(), now_timestamp()],
        )?
        .ok_or_else(|| Error::Other("insert into accounts returned no row".to_string()))
    }

    fn get_account(&mut self, id: AccountId) -> Result<Account> {
        let sql = format!("SELECT {} FROM accounts WHERE id = ?", ACCOUNT_COLUMNS);
        self.query_account(&sql, params![id])?
            .ok_or_else(|| Error::not_found(format!("account {}", id)))
    }

    fn list_accounts(&mut self, params: &ListAccountsParams) -> Result<Vec<Account>> {
        self.ctx.check()?;
        let sql = format!(
            "SELECT {} FROM accounts
             WHERE (CAST(? AS VARCHAR) IS NULL OR owner = CAST(? AS VARCHAR))
             ORDER BY id LIMIT ? OFFSET ?",
            ACCOUNT_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql).map_err(map_duckdb_err)?;
        let rows = stmt
            .query_map(
                params![params.owner, params.owner, params.limit, params.offset],
                read_account,
            )
            .map_err(map_duckdb_err)?;

        rows.map(|row| row.map_err(map_duckdb_err).and_then(into_account))
            .collect()
    }

    fn add_account_balance(&mut self, params: &AddAccountBalanceParams) -> Result<Account> {
        let sql = format!(
            "UPDATE accounts SET balance = balance + ? WHERE id = ? RETURNING {}",
            ACCOUNT_COLUMNS
        );
        self.query_account(&sql, params![params.amount, params.id])?
            .ok_or_else(|| Error::constraint(format!("account {} does not exist", params.id)))
    }

    fn create_transfer(&mut self, params: &CreateTransferParams) -> Result<Transfer> {
        self.ctx.check()?;
        let sql = format!(
            "INSERT INTO transfers (from_account_id, to_account_id, amount, created_at)
             SELECT CAST(? AS BIGINT), CAST(? AS BIGINT), CAST(? AS BIGINT), CAST(? AS VARCHAR)
             WHERE EXISTS (SELECT 1 FROM accounts WHERE id = ?)
               AND EXISTS (SELECT 1 FROM accounts WHERE id = ?)
             RETURNING {}",
            TRANSFER_COLUMNS
        );
        let row = self.conn.query_row(
            &sql,
            params![
                params.from_account_id,
                params.to_account_id,
                params.amount,
                now_timestamp(),
                params.from_account_id,
                params.to_account_id
            ],
            read_transfer,
        );
        match row {
            Ok(row) => into_transfer(row),
            Err(duckdb::Error::QueryReturnedNoRows) => Err(Error::constraint(format!(
                "transfer references unknown account ({} -> {})",
                params.from_account_id, params.to_account_id
            ))),
            Err(e) => Err(map_duckdb_err(e)),
        }
    }

    fn get_transfer(&mut self, id: i64) -> Result<Transfer> {
        self.ctx.check()?;
        let sql = format!("SELECT {} FROM transfers WHERE id = ?", TRANSFER_COLUMNS);
        match self.conn.query_row(&sql, params![id], read_transfer) {
            Ok(row) => into_transfer(row),
            Err(duckdb::Error::QueryReturnedNoRows) => {
                Err(Error::not_found(format!("transfer {}", id)))
            }
            Err(e) => Err(map_duckdb_err(e)),
        }
    }

    fn list_transfers(&mut self, params: &ListTransfersParams) -> Result<Vec<Transfer>> {
        self.ctx.check()?;
        let sql = format!(
            "SELECT {} FROM transfers
             WHERE from_account_id = ? OR to_account_id = ?
             ORDER BY id LIMIT ? OFFSET ?",
            TRANSFER_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql).map_err(map_duckdb_err)?;
        let rows = stmt
            .query_map(
                params![params.account_id, params.account_id, params.limit, params.offset],
                read_transfer,
            )
            .map_err(map_duckdb_err)?;

        rows.map(|row| row.map_err(map_duckdb_err).and_then(into_transfer))
            .collect()
    }

    fn create_entry(&mut self, params: &CreateEntryParams) -> Result<Entry> {
        self.ctx.check()?;
        let sql = format!(
            "INSERT INTO entries (account_id, amount, created_at)
             SELECT CAST(? AS BIGINT), CAST(? AS BIGINT), CAST(? AS VARCHAR)
             WHERE EXISTS (SELECT 1 FROM accounts WHERE id = ?)
             RETURNING {}",
            ENTRY_COLUMNS
        );
        let row = self.conn.query_row(
            &sql,
            params![params.account_id, params.amount, now_timestamp(), params.account_id],
            read_entry,
        );
        match row {
            Ok(row) => into_entry(row),
            Err(duckdb::Error::QueryReturnedNoRows) => Err(Error::constraint(format!(
                "entry references unknown account {}",
                params.account_id
            ))),
            Err(e) => Err(map_duckdb_err(e)),
        }
    }

    fn get_entry(&mut self, id: i64) -> Result<Entry> {
        self.ctx.check()?;
        let sql = format!("SELECT {} FROM entries WHERE id = ?", ENTRY_COLUMNS);
        match self.conn.query_row(&sql, params![id], read_entry) {
            Ok(row) => into_entry(row),
            Err(duckdb::Error::QueryReturnedNoRows) => Err(Error::not_found(format!("entry {}", id))),
            Err(e) => Err(map_duckdb_err(e)),
        }
    }

    fn list_entries(&mut self, params: &ListEntriesParams) -> Result<Vec<Entry>> {
        self.ctx.check()?;
        let sql = format!(
            "SELECT {} FROM entries WHERE account_id = ? ORDER BY id LIMIT ? OFFSET ?",
            ENTRY_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql).map_err(map_duckdb_err)?;
        let rows = stmt
            .query_map(
                params![params.account_id, params.limit, params.offset],
                read_entry,
            )
            .map_err(map_duckdb_err)?;

        rows.map(|row| row.map_err(map_duckdb_err).and_then(into_entry))
            .collect()
    }
}

impl Transaction for DuckDbTx<'_> {
    fn commit(mut self) -> Result<()> {
        self.finish("COMMIT")
    }

    fn rollback(mut self) -> Result<()> {
        self.finish("ROLLBACK")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Currency;

    fn seed(store: &DuckDbStore, owner: &str, balance: i64) -> Account {
        let mut tx = store.begin(&CancellationToken::new()).unwrap();
        let account = tx
            .create_account(&CreateAccountParams {
                owner: owner.to_string(),
                balance,
                currency: Currency::Usd,
            })
            .unwrap();
        tx.commit().unwrap();
        account
    }

    #[test]
    fn test_create_and_get_account() {
        let store = DuckDbStore::open_in_memory().unwrap();
        let created = seed(&store, "alice", 100);

        let mut tx = store.begin(&CancellationToken::new()).unwrap();
        let fetched = tx.get_account(created.id).unwrap();
        tx.rollback().unwrap();

        assert_eq!(fetched.owner, "alice");
        assert_eq!(fetched.balance, 100);
        assert_eq!(fetched.currency, Currency::Usd);
    }

    #[test]
    fn test_add_account_balance_returns_updated_row() {
        let store = DuckDbStore::open_in_memory().unwrap();
        let account = seed(&store, "alice", 100);

        let mut tx = store.begin(&CancellationToken::new()).unwrap();
        let updated = tx
            .add_account_balance(&AddAccountBalanceParams {
                id: account.id,
                amount: -25,
            })
            .unwrap();
        tx.commit().unwrap();

        assert_eq!(updated.id, account.id);
        assert_eq!(updated.balance, 75);
    }

    #[test]
    fn test_rollback_discards_writes() {
        let store = DuckDbStore::open_in_memory().unwrap();
        let account = seed(&store, "alice", 100);

        let mut tx = store.begin(&CancellationToken::new()).unwrap();
        tx.create_entry(&CreateEntryParams {
            account_id: account.id,
            amount: 10,
        })
        .unwrap();
        tx.add_account_balance(&AddAccountBalanceParams {
            id: account.id,
            amount: 10,
        })
        .unwrap();
        tx.rollback().unwrap();

        let mut tx = store.begin(&CancellationToken::new()).unwrap();
        assert_eq!(tx.get_account(account.id).unwrap().balance, 100);
        assert!(tx
            .list_entries(&ListEntriesParams::for_account(account.id))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_unknown_account_is_constraint_error() {
        let store = DuckDbStore::open_in_memory().unwrap();
        let account = seed(&store, "alice", 100);
        let mut tx = store.begin(&CancellationToken::new()).unwrap();

        let entry = tx.create_entry(&CreateEntryParams {
            account_id: 9999,
            amount: 1,
        });
        assert!(matches!(entry, Err(Error::Constraint(_))));

        let transfer = tx.create_transfer(&CreateTransferParams {
            from_account_id: account.id,
            to_account_id: 9999,
            amount: 1,
        });
        assert!(matches!(transfer, Err(Error::Constraint(_))));

        let update = tx.add_account_balance(&AddAccountBalanceParams { id: 9999, amount: 1 });
        assert!(matches!(update, Err(Error::Constraint(_))));
    }

    #[test]
    fn test_check_constraints_reject_bad_transfers() {
        let store = DuckDbStore::open_in_memory().unwrap();
        let a = seed(&store, "alice", 100);
        let b = seed(&store, "bob", 100);

        let mut tx = store.begin(&CancellationToken::new()).unwrap();
        let zero = tx.create_transfer(&CreateTransferParams {
            from_account_id: a.id,
            to_account_id: b.id,
            amount: 0,
        });
        assert!(matches!(zero, Err(Error::Constraint(_))));
    }

    #[test]
    fn test_get_missing_rows_is_not_found() {
        let store = DuckDbStore::open_in_memory().unwrap();
        let mut tx = store.begin(&CancellationToken::new()).unwrap();

        assert!(matches!(tx.get_account(1), Err(Error::NotFound(_))));
        assert!(matches!(tx.get_transfer(1), Err(Error::NotFound(_))));
        assert!(matches!(tx.get_entry(1), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_list_accounts_by_owner() {
        let store = DuckDbStore::open_in_memory().unwrap();
        seed(&store, "alice", 1);
        seed(&store, "bob", 2);
        seed(&store, "alice", 3);

        let mut tx = store.begin(&CancellationToken::new()).unwrap();
        let all = tx.list_accounts(&ListAccountsParams::default()).unwrap();
        let alice = tx
            .list_accounts(&ListAccountsParams {
                owner: Some("alice".to_string()),
                ..Default::default()
            })
            .unwrap();

        assert_eq!(all.len(), 3);
        assert_eq!(alice.iter().map(|a| a.balance).collect::<Vec<_>>(), vec![1, 3]);
    }

    #[test]
    fn test_file_database_persists_across_opens() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("bank.duckdb");

        let id = {
            let store = DuckDbStore::open(&path).unwrap();
            seed(&store, "alice", 42).id
        };

        let store = DuckDbStore::open(&path).unwrap();
        let mut tx = store.begin(&CancellationToken::new()).unwrap();
        assert_eq!(tx.get_account(id).unwrap().balance, 42);
    }

    #[test]
    fn test_retryable_open_errors() {
        assert!(is_retryable_open_error(
            "IO Error: Could not set lock on file: Resource temporarily unavailable"
        ));
        assert!(is_retryable_open_error("The process cannot access the file because it is being used by another process"));
        assert!(!is_retryable_open_error("IO Error: No such file or directory"));
    }

    #[test]
    fn test_balance_overflow_is_constraint_error() {
        let store = DuckDbStore::open_in_memory().unwrap();
        let account = seed(&store, "alice", i64::MAX);

        let mut tx = store.begin(&CancellationToken::new()).unwrap();
        let err = tx
            .add_account_balance(&AddAccountBalanceParams {
                id: account.id,
                amount: 1,
            })
            .unwrap_err();
        tx.rollback().unwrap();

        assert!(matches!(err, Error::Constraint(_)), "got {:?}", err);
    }

    #[test]
    fn test_statement_errors_are_not_connectivity() {
        let conn = Connection::open_in_memory().unwrap();

        let missing = map_duckdb_err(conn.execute_batch("SELECT * FROM no_such_table").unwrap_err());
        assert!(matches!(missing, Error::Other(_)), "got {:?}", missing);

        let cast = map_duckdb_err(conn.execute_batch("SELECT CAST('abc' AS BIGINT)").unwrap_err());
        assert!(matches!(cast, Error::Constraint(_)), "got {:?}", cast);
    }
}
