//! Adapter implementations
//!
//! Adapters implement the store ports with concrete technologies:
//! - DuckDB for persistent storage
//! - An in-memory row-locking store for tests and ephemeral use

pub mod duckdb;
pub mod memory;
