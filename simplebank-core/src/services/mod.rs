//! Service layer - business logic orchestration
//!
//! Services run their work through `TxManager`, so every operation executes
//! inside exactly one store transaction.

mod account;
pub mod migration;
mod transfer;
mod tx;

pub use account::AccountService;
pub use migration::{MigrationResult, MigrationService};
pub use transfer::{add_money, lock_order, TransferService};
pub use tx::TxManager;
