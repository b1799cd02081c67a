//! Simplebank CLI - accounts and transfers in your terminal

use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;
mod output;

use commands::{account, history, init, transfer};
use simplebank_core::config::Config;
use simplebank_core::logging::init_logging;
use simplebank_core::ports::DEFAULT_PAGE_SIZE;
use simplebank_core::AccountId;

/// Simplebank - accounts and transfers in your terminal
#[derive(Parser)]
#[command(name = "sb", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the data directory, settings and database schema
    Init,

    /// Open a new account
    Open {
        /// Account holder
        #[arg(long)]
        owner: String,
        /// Currency code (USD, SGD, EUR, CAD, MYR)
        #[arg(long)]
        currency: String,
        /// Opening balance in minor units
        #[arg(long, default_value_t = 0)]
        balance: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// List accounts
    Accounts {
        /// Only accounts held by this owner
        #[arg(long)]
        owner: Option<String>,
        #[arg(long, default_value_t = DEFAULT_PAGE_SIZE)]
        limit: i64,
        #[arg(long, default_value_t = 0)]
        offset: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show one account
    Show {
        id: AccountId,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Transfer money between two accounts
    Transfer {
        /// Account to debit
        from: AccountId,
        /// Account to credit
        to: AccountId,
        /// Amount in minor units
        amount: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// List entries posted against an account
    Entries {
        account: AccountId,
        #[arg(long, default_value_t = DEFAULT_PAGE_SIZE)]
        limit: i64,
        #[arg(long, default_value_t = 0)]
        offset: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// List transfers in or out of an account
    Transfers {
        account: AccountId,
        #[arg(long, default_value_t = DEFAULT_PAGE_SIZE)]
        limit: i64,
        #[arg(long, default_value_t = 0)]
        offset: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let result = setup_logging().and_then(|_| run(cli));

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            output::error(&format!("{:#}", e));
            ExitCode::FAILURE
        }
    }
}

fn setup_logging() -> Result<()> {
    let data_dir = commands::get_data_dir()?;
    let config = Config::load(&data_dir)?;
    init_logging(&config.log)
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Init => init::run(),
        Commands::Open { owner, currency, balance, json } => {
            account::run_open(&owner, &currency, balance, json)
        }
        Commands::Accounts { owner, limit, offset, json } => {
            account::run_list(owner, limit, offset, json)
        }
        Commands::Show { id, json } => account::run_show(id, json),
        Commands::Transfer { from, to, amount, json } => transfer::run(from, to, amount, json),
        Commands::Entries { account, limit, offset, json } => {
            history::run_entries(account, limit, offset, json)
        }
        Commands::Transfers { account, limit, offset, json } => {
            history::run_transfers(account, limit, offset, json)
        }
    }
}
