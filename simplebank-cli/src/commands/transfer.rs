//! Transfer command - move money between two accounts

use anyhow::Result;
use colored::Colorize;

use simplebank_core::{AccountId, CancellationToken, TransferTxParams};

use super::get_context;
use crate::output;

pub fn run(from: AccountId, to: AccountId, amount: i64, json: bool) -> Result<()> {
    let ctx = get_context()?;
    let result = ctx
        .transfers
        .transfer_tx(&CancellationToken::new(), TransferTxParams::new(from, to, amount))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    output::success(&format!(
        "Transfer {} committed: {} from {} to {}",
        result.transfer.id,
        output::format_minor(result.transfer.amount),
        from,
        to
    ));

    let mut table = output::create_table();
    table.set_header(vec!["Account", "Entry", "Change", "New balance"]);
    for (account, entry) in [
        (&result.from_account, &result.from_entry),
        (&result.to_account, &result.to_entry),
    ] {
        table.add_row(vec![
            comfy_table::Cell::new(account.id),
            comfy_table::Cell::new(entry.id),
            output::amount_cell(entry.amount, None),
            output::amount_cell(account.balance, Some(account.currency)),
        ]);
    }
    println!("{}", table);
    println!("{}", result.transfer.created_at.to_rfc3339().dimmed());
    Ok(())
}
