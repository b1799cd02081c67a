//! Store ports - transaction boundary and transfer orchestration

use crate::domain::result::Result;
use crate::domain::{TransferTxParams, TransferTxResult};

use super::{CancellationToken, Queries};

/// One open store transaction
///
/// Exactly one of `commit` or `rollback` ends it; both consume the handle.
pub trait Transaction: Queries {
    fn commit(self) -> Result<()>;

    fn rollback(self) -> Result<()>;
}

/// A store that can open transactions
pub trait Database: Send + Sync {
    type Tx<'a>: Transaction
    where
        Self: 'a;

    /// Open a transaction at the store's default isolation level.
    ///
    /// Operations on the returned handle fail with `Error::Cancelled` once
    /// `ctx` is cancelled.
    fn begin(&self, ctx: &CancellationToken) -> Result<Self::Tx<'_>>;
}

/// Transfer-orchestration capability
pub trait TransferTx: Send + Sync {
    /// Record a transfer, post both entries and update both balances
    /// atomically.
    fn transfer_tx(
        &self,
        ctx: &CancellationToken,
        params: TransferTxParams,
    ) -> Result<TransferTxResult>;
}
