//! History commands - entries and transfers of one account

use anyhow::Result;
use colored::Colorize;
use comfy_table::Cell;

use simplebank_core::ports::{ListEntriesParams, ListTransfersParams};
use simplebank_core::{AccountId, CancellationToken};

use super::get_context;
use crate::output;

pub fn run_entries(account_id: AccountId, limit: i64, offset: i64, json: bool) -> Result<()> {
    let ctx = get_context()?;
    let entries = ctx.account_service.list_entries(
        &CancellationToken::new(),
        &ListEntriesParams {
            account_id,
            limit,
            offset,
        },
    )?;

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }
    if entries.is_empty() {
        println!("{}", "No entries".dimmed());
        return Ok(());
    }

    let mut table = output::create_table();
    table.set_header(vec!["ID", "Amount", "Posted"]);
    for entry in &entries {
        table.add_row(vec![
            Cell::new(entry.id),
            output::amount_cell(entry.amount, None),
            Cell::new(entry.created_at.format("%Y-%m-%d %H:%M:%S")),
        ]);
    }
    println!("{}", table);
    Ok(())
}

pub fn run_transfers(account_id: AccountId, limit: i64, offset: i64, json: bool) -> Result<()> {
    let ctx = get_context()?;
    let transfers = ctx.account_service.list_transfers(
        &CancellationToken::new(),
        &ListTransfersParams {
            account_id,
            limit,
            offset,
        },
    )?;

    if json {
        println!("{}", serde_json::to_string_pretty(&transfers)?);
        return Ok(());
    }
    if transfers.is_empty() {
        println!("{}", "No transfers".dimmed());
        return Ok(());
    }

    let mut table = output::create_table();
    table.set_header(vec!["ID", "From", "To", "Amount", "Created"]);
    for transfer in &transfers {
        // Signed from this account's point of view
        let signed = if transfer.from_account_id == account_id {
            -transfer.amount
        } else {
            transfer.amount
        };
        table.add_row(vec![
            Cell::new(transfer.id),
            Cell::new(transfer.from_account_id),
            Cell::new(transfer.to_account_id),
            output::amount_cell(signed, None),
            Cell::new(transfer.created_at.format("%Y-%m-%d %H:%M:%S")),
        ]);
    }
    println!("{}", table);
    Ok(())
}
