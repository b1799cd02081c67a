//! Migration service - manages database schema migrations
//!
//! Migrations are SQL files embedded at compile time. Each one is applied in
//! its own transaction together with its row in sys_migrations, so a failed
//! migration leaves no trace and is retried on the next run.

use duckdb::Connection;

use crate::adapters::duckdb::map_duckdb_err;
use crate::domain::result::Result;
use crate::migrations::{BOOTSTRAP_MIGRATION, MIGRATIONS};

/// Result of running migrations
#[derive(Debug)]
pub struct MigrationResult {
    /// Names of newly applied migrations
    pub applied: Vec<String>,
    /// Count of migrations that were already applied
    pub already_applied: usize,
}

/// Service for managing database migrations
pub struct MigrationService<'a> {
    conn: &'a Connection,
}

impl<'a> MigrationService<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Apply every migration not yet recorded in sys_migrations, in order
    pub fn run_pending(&self) -> Result<MigrationResult> {
        let mut applied = Vec::new();
        let mut already_applied = 0;

        let bootstrap_sql = MIGRATIONS
            .iter()
            .find(|(name, _)| *name == BOOTSTRAP_MIGRATION)
            .map(|(_, sql)| *sql)
            .unwrap_or_default();
        self.conn.execute_batch(bootstrap_sql).map_err(map_duckdb_err)?;

        let done = self.get_applied()?;
        for (name, sql) in MIGRATIONS.iter() {
            if done.iter().any(|d| d == name) {
                already_applied += 1;
                continue;
            }
            self.apply(name, sql)?;
            tracing::info!(migration = name, "applied migration");
            applied.push(name.to_string());
        }

        Ok(MigrationResult {
            applied,
            already_applied,
        })
    }

    /// Names of already applied migrations
    pub fn get_applied(&self) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT migration_name FROM sys_migrations ORDER BY migration_name")
            .map_err(map_duckdb_err)?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(map_duckdb_err)?;

        names
            .map(|name| name.map_err(map_duckdb_err))
            .collect()
    }

    /// Names of migrations still to apply
    pub fn get_pending(&self) -> Result<Vec<String>> {
        let applied = self.get_applied()?;
        Ok(MIGRATIONS
            .iter()
            .filter(|(name, _)| !applied.iter().any(|a| a == name))
            .map(|(name, _)| name.to_string())
            .collect())
    }

    fn apply(&self, name: &str, sql: &str) -> Result<()> {
        let script = format!(
            "BEGIN TRANSACTION;\n{}\nINSERT INTO sys_migrations (migration_name) VALUES ('{}');\nCOMMIT;",
            sql, name
        );
        if let Err(err) = self.conn.execute_batch(&script) {
            // Leave the connection usable for the caller
            if let Err(rb_err) = self.conn.execute_batch("ROLLBACK") {
                tracing::error!(migration = name, error = %rb_err, "migration rollback failed");
            }
            return Err(map_duckdb_err(err));
        }
        Ok(())
    }
}
