//! Transaction manager - the unit-of-work boundary
//!
//! `exec_tx` opens one transaction, hands the unit of work a query facade
//! bound to it, and ends it with exactly one commit or rollback on every
//! path out, panics included.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use crate::domain::result::{Error, Result};
use crate::ports::{CancellationToken, Database, Queries, Transaction};

/// Runs units of work inside store transactions
pub struct TxManager<D: Database> {
    db: Arc<D>,
}

impl<D: Database> Clone for TxManager<D> {
    fn clone(&self) -> Self {
        Self {
            db: Arc::clone(&self.db),
        }
    }
}

impl<D: Database> TxManager<D> {
    pub fn new(db: Arc<D>) -> Self {
        Self { db }
    }

    pub fn database(&self) -> &Arc<D> {
        &self.db
    }

    /// Execute `unit` within a single store transaction.
    ///
    /// - `unit` succeeds: commit. A commit failure is returned as-is.
    /// - `unit` fails, or `ctx` was cancelled while it ran: roll back and
    ///   return the original error. If the rollback fails too, both errors
    ///   come back as `Error::Rollback`.
    /// - `unit` panics: roll back, then resume the panic.
    pub fn exec_tx<T, F>(&self, ctx: &CancellationToken, unit: F) -> Result<T>
    where
        F: FnOnce(&mut dyn Queries) -> Result<T>,
    {
        let mut tx = self.db.begin(ctx)?;
        tracing::trace!("transaction opened");

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| unit(&mut tx)));

        let outcome = match outcome {
            Ok(result) => result.and_then(|value| ctx.check().map(|_| value)),
            Err(payload) => {
                if let Err(rb_err) = tx.rollback() {
                    tracing::error!(error = %rb_err, "rollback after panic failed");
                } else {
                    tracing::warn!("unit of work panicked, transaction rolled back");
                }
                panic::resume_unwind(payload);
            }
        };

        match outcome {
            Ok(value) => {
                tx.commit()?;
                tracing::trace!("transaction committed");
                Ok(value)
            }
            Err(err) => match tx.rollback() {
                Ok(()) => {
                    tracing::debug!(error = %err, "transaction rolled back");
                    Err(err)
                }
                Err(rb_err) => {
                    tracing::error!(error = %err, rollback_error = %rb_err, "rollback failed");
                    Err(Error::Rollback {
                        source: Box::new(err),
                        rollback: Box::new(rb_err),
                    })
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::{FaultPoint, MemoryStore};
    use crate::domain::Currency;
    use crate::ports::{AddAccountBalanceParams, CreateAccountParams, CreateEntryParams};

    fn manager() -> TxManager<MemoryStore> {
        TxManager::new(Arc::new(MemoryStore::default()))
    }

    fn open(manager: &TxManager<MemoryStore>, balance: i64) -> i64 {
        manager
            .exec_tx(&CancellationToken::new(), |q| {
                q.create_account(&CreateAccountParams {
                    owner: "owner".to_string(),
                    balance,
                    currency: Currency::Usd,
                })
            })
            .unwrap()
            .id
    }

    #[test]
    fn test_commits_on_success() {
        let manager = manager();
        let id = open(&manager, 10);

        let entry = manager
            .exec_tx(&CancellationToken::new(), |q| {
                q.create_entry(&CreateEntryParams {
                    account_id: id,
                    amount: 5,
                })
            })
            .unwrap();

        assert_eq!(entry.amount, 5);
        assert_eq!(manager.database().entry_count(), 1);
    }

    #[test]
    fn test_rolls_back_and_returns_unit_error() {
        let manager = manager();
        let id = open(&manager, 10);

        let err = manager
            .exec_tx(&CancellationToken::new(), |q| {
                q.create_entry(&CreateEntryParams {
                    account_id: id,
                    amount: 5,
                })?;
                Err::<(), _>(Error::validation("boom"))
            })
            .unwrap_err();

        assert!(matches!(err, Error::Validation(ref m) if m == "boom"));
        assert_eq!(manager.database().entry_count(), 0);
    }

    #[test]
    fn test_failed_rollback_keeps_both_errors() {
        let manager = manager();
        manager
            .database()
            .inject_fault(FaultPoint::Rollback, "connection reset by peer");

        let err = manager
            .exec_tx(&CancellationToken::new(), |q| {
                q.create_entry(&CreateEntryParams {
                    account_id: 404,
                    amount: 1,
                })
            })
            .unwrap_err();

        match err {
            Error::Rollback { source, rollback } => {
                assert!(matches!(*source, Error::Constraint(_)));
                assert!(matches!(*rollback, Error::Connectivity(ref m) if m.contains("reset")));
            }
            other => panic!("expected composite error, got {:?}", other),
        }
    }

    #[test]
    fn test_commit_failure_is_returned_as_is() {
        let manager = manager();
        let id = open(&manager, 10);
        manager.database().inject_fault(FaultPoint::Commit, "server closed the connection");

        let err = manager
            .exec_tx(&CancellationToken::new(), |q| {
                q.create_entry(&CreateEntryParams {
                    account_id: id,
                    amount: 5,
                })
            })
            .unwrap_err();

        assert!(matches!(err, Error::Connectivity(_)));
        assert_eq!(manager.database().entry_count(), 0);
    }

    #[test]
    fn test_begin_failure_skips_unit() {
        let manager = manager();
        manager.database().inject_fault(FaultPoint::Begin, "no route to host");

        let mut ran = false;
        let err = manager
            .exec_tx(&CancellationToken::new(), |_| {
                ran = true;
                Ok(())
            })
            .unwrap_err();

        assert!(matches!(err, Error::Connectivity(_)));
        assert!(!ran);
    }

    #[test]
    fn test_panic_rolls_back_and_releases_locks() {
        let manager = manager();
        let id = open(&manager, 10);

        let caught = panic::catch_unwind(AssertUnwindSafe(|| {
            let _ = manager.exec_tx(&CancellationToken::new(), |q| -> Result<()> {
                q.add_account_balance(&AddAccountBalanceParams { id, amount: 7 })?;
                panic!("unit of work blew up")
            });
        }));
        assert!(caught.is_err());

        let db = manager.database();
        assert_eq!(db.account_balance(id), Some(10));

        // Row lock must have been released by the rollback.
        let account = manager
            .exec_tx(&CancellationToken::new(), |q| {
                q.add_account_balance(&AddAccountBalanceParams { id, amount: 1 })
            })
            .unwrap();
        assert_eq!(account.balance, 11);
    }

    #[test]
    fn test_cancel_during_unit_rolls_back() {
        let manager = manager();
        let id = open(&manager, 10);
        let ctx = CancellationToken::new();

        let err = manager
            .exec_tx(&ctx, |q| {
                q.create_entry(&CreateEntryParams {
                    account_id: id,
                    amount: 5,
                })?;
                ctx.cancel();
                Ok(())
            })
            .unwrap_err();

        assert!(matches!(err, Error::Cancelled));
        assert_eq!(manager.database().entry_count(), 0);
    }
}
