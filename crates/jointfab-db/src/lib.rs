//! Database layer for the joint fabric node.
//!
//! Provides SQLite connection pooling (via `r2d2`), WAL-mode initialization,
//! and embedded SQL migrations. Committed fabrics are the only state this
//! node keeps across restarts; the tables backing them are created through
//! the versioned migrations managed here.
//!
//! Migration SQL is compiled into the binary via `include_str!`, so the
//! schema always ships with the code that reads it.

mod migrations;
mod pool;

pub use migrations::{run_migrations, schema_version, MigrationError};
pub use pool::{create_pool, DbPool, DbRuntimeSettings, PoolError};
