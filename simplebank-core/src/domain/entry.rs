use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::AccountId;

/// A single signed posting against one account
///
/// Debits are negative, credits positive. Entries are append-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub id: i64,
    pub account_id: AccountId,
    pub amount: i64,
    pub created_at: DateTime<Utc>,
}
