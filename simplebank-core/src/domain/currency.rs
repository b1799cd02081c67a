//! Supported currencies

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::result::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    Usd,
    Sgd,
    Eur,
    Cad,
    Myr,
}

impl Currency {
    pub const ALL: [Currency; 5] = [
        Currency::Usd,
        Currency::Sgd,
        Currency::Eur,
        Currency::Cad,
        Currency::Myr,
    ];

    /// ISO 4217 code
    pub fn code(&self) -> &'static str {
        match self {
            Currency::Usd => "USD",
            Currency::Sgd => "SGD",
            Currency::Eur => "EUR",
            Currency::Cad => "CAD",
            Currency::Myr => "MYR",
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Currency {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Currency::ALL
            .into_iter()
            .find(|c| c.code() == s)
            .ok_or_else(|| Error::validation(format!("unsupported currency: {}", s)))
    }
}

/// True if `code` names one of the supported currencies (exact, uppercase)
pub fn is_supported_currency(code: &str) -> bool {
    code.parse::<Currency>().is_ok()
}
