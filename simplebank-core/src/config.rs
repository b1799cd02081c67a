//! Configuration management
//!
//! Settings live in `<data dir>/settings.json`:
//! ```json
//! {
//!   "database": { "path": "simplebank.duckdb" },
//!   "log": { "level": "info", "json": false }
//! }
//! ```
//! Environment variables override the file: `SIMPLEBANK_DB_PATH`,
//! `SIMPLEBANK_LOG_LEVEL`, `SIMPLEBANK_LOG_JSON`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

const SETTINGS_FILE: &str = "settings.json";
const DEFAULT_DB_FILE: &str = "simplebank.duckdb";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SettingsFile {
    #[serde(default)]
    database: DatabaseSettings,
    #[serde(default)]
    log: LogConfig,
    // Keys this version doesn't manage, preserved on save
    #[serde(flatten)]
    other: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DatabaseSettings {
    #[serde(default)]
    path: Option<PathBuf>,
}

/// Logging settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogConfig {
    /// `EnvFilter` directive, e.g. `info` or `simplebank_core=debug`
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Emit JSON lines instead of human-readable text
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

/// Simplebank configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Database file; relative paths resolve against the data directory
    pub db_path: PathBuf,
    pub log: LogConfig,
    _raw_settings: SettingsFile,
}

impl Config {
    /// Load config from the data directory, applying environment overrides
    pub fn load(data_dir: &Path) -> Result<Self> {
        let settings_path = data_dir.join(SETTINGS_FILE);

        let raw: SettingsFile = if settings_path.exists() {
            let content = std::fs::read_to_string(&settings_path)
                .with_context(|| format!("Failed to read {}", settings_path.display()))?;
            serde_json::from_str(&content)
                .with_context(|| format!("Invalid settings in {}", settings_path.display()))?
        } else {
            SettingsFile::default()
        };

        let db_path = std::env::var_os("SIMPLEBANK_DB_PATH")
            .map(PathBuf::from)
            .or_else(|| raw.database.path.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DB_FILE));
        let db_path = if db_path.is_relative() {
            data_dir.join(db_path)
        } else {
            db_path
        };

        let mut log = raw.log.clone();
        if let Ok(level) = std::env::var("SIMPLEBANK_LOG_LEVEL") {
            log.level = level;
        }
        if let Some(json) = std::env::var("SIMPLEBANK_LOG_JSON").ok().as_deref().and_then(parse_bool) {
            log.json = json;
        }

        Ok(Self {
            db_path,
            log,
            _raw_settings: raw,
        })
    }

    /// Save config to the data directory.
    /// Keys this version doesn't manage are preserved.
    pub fn save(&self, data_dir: &Path) -> Result<()> {
        let settings_path = data_dir.join(SETTINGS_FILE);

        let mut settings = self._raw_settings.clone();
        settings.database.path = Some(
            self.db_path
                .strip_prefix(data_dir)
                .map(Path::to_path_buf)
                .unwrap_or_else(|_| self.db_path.clone()),
        );
        settings.log = self.log.clone();

        let content = serde_json::to_string_pretty(&settings)?;
        std::fs::write(&settings_path, content)
            .with_context(|| format!("Failed to write {}", settings_path.display()))?;
        Ok(())
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value {
        "true" | "1" | "yes" | "TRUE" | "YES" => Some(true),
        "false" | "0" | "no" | "FALSE" | "NO" => Some(false),
        _ => None,
    }
}
