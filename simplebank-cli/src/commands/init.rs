//! Init command - create the data directory, settings and schema

use anyhow::{Context, Result};

use simplebank_core::config::Config;

use super::get_data_dir;
use crate::output;

pub fn run() -> Result<()> {
    let data_dir = get_data_dir()?;
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("Failed to create simplebank directory: {:?}", data_dir))?;

    let config = Config::load(&data_dir)?;
    config.save(&data_dir)?;

    let ctx = super::get_context()?;
    let migrations = ctx.store.run_migrations()?;

    output::success(&format!("Initialized simplebank in {}", data_dir.display()));
    if let Some(db_path) = ctx.store.db_path() {
        println!("  Database: {}", db_path.display());
    }
    println!("  Schema migrations: {}", migrations.already_applied + migrations.applied.len());
    Ok(())
}
