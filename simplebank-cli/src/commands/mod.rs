//! CLI command implementations

pub mod account;
pub mod history;
pub mod init;
pub mod transfer;

use std::path::PathBuf;

use anyhow::{Context, Result};
use simplebank_core::BankContext;

/// Get the simplebank directory from environment or default
pub fn get_data_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var("SIMPLEBANK_DIR") {
        return Ok(PathBuf::from(dir));
    }
    dirs::home_dir()
        .map(|home| home.join(".simplebank"))
        .context("Could not find home directory; set SIMPLEBANK_DIR")
}

/// Open the bank in the data directory, creating the directory if needed
pub fn get_context() -> Result<BankContext> {
    let data_dir = get_data_dir()?;

    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("Failed to create simplebank directory: {:?}", data_dir))?;

    BankContext::new(&data_dir).context("Failed to initialize simplebank context")
}
