//! Simplebank Core - transactional money transfers
//!
//! This crate follows hexagonal architecture:
//!
//! - **domain**: Core records (Account, Entry, Transfer) and the error type
//! - **ports**: Trait definitions for the store (Queries, Database, Transaction)
//! - **services**: Unit-of-work boundary and transfer orchestration
//! - **adapters**: Concrete stores (DuckDB, in-memory)

pub mod adapters;
pub mod config;
pub mod domain;
pub mod fixtures;
pub mod logging;
pub mod migrations;
pub mod ports;
pub mod services;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};

use adapters::duckdb::DuckDbStore;
use config::Config;
use services::{AccountService, TransferService, TxManager};

// Re-export commonly used types at crate root
pub use domain::result::Error;
pub use domain::{Account, AccountId, Currency, Entry, Transfer, TransferTxParams, TransferTxResult};
pub use ports::{CancellationToken, TransferTx};

/// Main context for simplebank operations
///
/// Holds the configuration, the store, and the services wired to it.
pub struct BankContext {
    pub config: Config,
    pub store: Arc<DuckDbStore>,
    pub account_service: AccountService<DuckDbStore>,
    /// Transfer engine, reached only through its capability trait
    pub transfers: Arc<dyn TransferTx>,
}

impl BankContext {
    /// Load configuration from `data_dir`, open the database and run
    /// migrations.
    pub fn new(data_dir: &Path) -> Result<Self> {
        let config = Config::load(data_dir)?;
        let store = Arc::new(
            DuckDbStore::open(&config.db_path)
                .with_context(|| format!("Failed to open database {}", config.db_path.display()))?,
        );

        let tx_manager = TxManager::new(Arc::clone(&store));
        let account_service = AccountService::new(tx_manager.clone());
        let transfers: Arc<dyn TransferTx> = Arc::new(TransferService::new(tx_manager));

        Ok(Self {
            config,
            store,
            account_service,
            transfers,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_context_transfers_through_capability() {
        let dir = TempDir::new().unwrap();
        let ctx = BankContext::new(dir.path()).unwrap();
        assert_eq!(ctx.store.db_path(), Some(ctx.config.db_path.as_path()));

        let token = CancellationToken::new();
        let a = ctx
            .account_service
            .open_account_with_balance(&token, "alice", Currency::Usd, 100)
            .unwrap();
        let b = ctx
            .account_service
            .open_account_with_balance(&token, "bob", Currency::Usd, 50)
            .unwrap();

        let result = ctx
            .transfers
            .transfer_tx(&token, TransferTxParams::new(a.id, b.id, 30))
            .unwrap();

        assert_eq!(result.from_account.balance, 70);
        assert_eq!(result.to_account.balance, 80);
        assert_eq!(ctx.account_service.get_account(&token, b.id).unwrap().balance, 80);
    }
}
