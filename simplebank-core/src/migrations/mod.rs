//! Database migrations - embedded SQL files
//!
//! Migrations are compiled into the binary with include_str! and applied in
//! name order. `000_migrations.sql` is idempotent and always runs first.

/// All migrations, embedded at compile time.
/// Format: (filename, sql_content)
pub const MIGRATIONS: &[(&str, &str)] = &[
    ("000_migrations.sql", include_str!("000_migrations.sql")),
    ("001_initial_schema.sql", include_str!("001_initial_schema.sql")),
];

/// Name of the bootstrap migration that creates the tracking table
pub const BOOTSTRAP_MIGRATION: &str = "000_migrations.sql";
