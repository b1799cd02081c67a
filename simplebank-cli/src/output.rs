//! Output formatting utilities

use colored::Colorize;
use comfy_table::{presets::UTF8_FULL_CONDENSED, Cell, CellAlignment, ContentArrangement, Table};

use simplebank_core::{Account, Currency};

/// Print a success message
pub fn success(msg: &str) {
    println!("{}", msg.green());
}

/// Print an error message
pub fn error(msg: &str) {
    eprintln!("{}", msg.red());
}

/// Create a styled table
pub fn create_table() -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table
}

/// Right-aligned amount in minor units, red when negative
pub fn amount_cell(amount: i64, currency: Option<Currency>) -> Cell {
    let mut text = format_minor(amount);
    if let Some(currency) = currency {
        text = format!("{} {}", text, currency);
    }
    let text = if amount < 0 {
        text.red().to_string()
    } else {
        text
    };
    Cell::new(text).set_alignment(CellAlignment::Right)
}

/// `1234` -> `12.34`
pub fn format_minor(amount: i64) -> String {
    let sign = if amount < 0 { "-" } else { "" };
    let abs = amount.unsigned_abs();
    format!("{}{}.{:02}", sign, abs / 100, abs % 100)
}

pub fn accounts_table(accounts: &[Account]) -> Table {
    let mut table = create_table();
    table.set_header(vec!["ID", "Owner", "Balance", "Opened"]);
    for account in accounts {
        table.add_row(vec![
            Cell::new(account.id),
            Cell::new(&account.owner),
            amount_cell(account.balance, Some(account.currency)),
            Cell::new(account.created_at.format("%Y-%m-%d %H:%M")),
        ]);
    }
    table
}
