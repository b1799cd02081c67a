//! Account domain model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Currency;

/// Numeric account identity assigned by the store
pub type AccountId = i64;

/// A money account owned by a user
///
/// `balance` is kept in the smallest currency unit. The transfer engine only
/// ever changes it through an atomic balance-delta operation inside a
/// transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub owner: String,
    pub balance: i64,
    pub currency: Currency,
    pub created_at: DateTime<Utc>,
}

impl Account {
    /// Balance rendered with two minor-unit digits, e.g. `-12.05 USD`
    pub fn display_balance(&self) -> String {
        let sign = if self.balance < 0 { "-" } else { "" };
        let abs = self.balance.unsigned_abs();
        format!("{}{}.{:02} {}", sign, abs / 100, abs % 100, self.currency)
    }
}
