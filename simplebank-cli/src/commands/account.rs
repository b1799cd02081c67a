//! Account commands - open, list and show accounts

use anyhow::Result;
use colored::Colorize;

use simplebank_core::ports::ListAccountsParams;
use simplebank_core::{AccountId, CancellationToken, Currency};

use super::get_context;
use crate::output;

pub fn run_open(owner: &str, currency: &str, balance: i64, json: bool) -> Result<()> {
    let currency: Currency = currency.parse()?;
    let ctx = get_context()?;

    let account = ctx.account_service.open_account_with_balance(
        &CancellationToken::new(),
        owner,
        currency,
        balance,
    )?;

    if json {
        println!("{}", serde_json::to_string_pretty(&account)?);
    } else {
        output::success(&format!("Opened account {}", account.id));
        println!("  Owner: {}", account.owner);
        println!("  Balance: {}", account.display_balance());
    }
    Ok(())
}

pub fn run_list(owner: Option<String>, limit: i64, offset: i64, json: bool) -> Result<()> {
    let ctx = get_context()?;
    let accounts = ctx.account_service.list_accounts(
        &CancellationToken::new(),
        &ListAccountsParams {
            owner,
            limit,
            offset,
        },
    )?;

    if json {
        println!("{}", serde_json::to_string_pretty(&accounts)?);
        return Ok(());
    }

    if accounts.is_empty() {
        println!("{}", "No accounts".dimmed());
        return Ok(());
    }
    println!("{}", output::accounts_table(&accounts));
    Ok(())
}

pub fn run_show(id: AccountId, json: bool) -> Result<()> {
    let ctx = get_context()?;
    let account = ctx.account_service.get_account(&CancellationToken::new(), id)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&account)?);
        return Ok(());
    }

    println!("{}", format!("Account {}", account.id).bold());
    println!("  Owner: {}", account.owner);
    println!("  Currency: {}", account.currency);
    println!("  Balance: {}", account.display_balance());
    println!("  Opened: {}", account.created_at.to_rfc3339());
    Ok(())
}
