//! Embedded SQL migration runner.
//!
//! Each migration carries a version and runs inside its own transaction.
//! Applied versions are recorded in `_jointfab_migrations`; a version that
//! is already recorded is skipped.

use rusqlite::{Connection, OptionalExtension};
use thiserror::Error;

struct Migration {
    version: u32,
    name: &'static str,
    sql: &'static str,
}

/// All migrations in ascending version order. New migrations are appended.
const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 0,
        name: "init",
        sql: include_str!("migrations/000_init.sql"),
    },
    Migration {
        version: 1,
        name: "fabrics",
        sql: include_str!("migrations/001_fabrics.sql"),
    },
];

const TRACKING_TABLE: &str = "CREATE TABLE IF NOT EXISTS _jointfab_migrations (
    version INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);";

#[derive(Debug, Error)]
pub enum MigrationError {
    /// A statement of migration `version` failed; nothing of it was kept.
    #[error("migration {version} ({name}) failed: {source}")]
    ExecutionFailed {
        version: u32,
        name: &'static str,
        source: rusqlite::Error,
    },

    /// The tracking table could not be created or read.
    #[error("failed to read migration state: {0}")]
    StateQuery(#[source] rusqlite::Error),
}

/// Runs all pending migrations against `conn` and returns how many were
/// applied.
///
/// # Errors
///
/// Returns `MigrationError` if any migration fails to execute or if the
/// tracking table cannot be queried.
pub fn run_migrations(conn: &Connection) -> Result<usize, MigrationError> {
    run_migrations_from_list(conn, MIGRATIONS)
}

/// The highest applied migration version, or `None` on an unmigrated
/// database.
pub fn schema_version(conn: &Connection) -> Result<Option<u32>, MigrationError> {
    conn.execute_batch(TRACKING_TABLE)
        .map_err(MigrationError::StateQuery)?;
    conn.query_row("SELECT MAX(version) FROM _jointfab_migrations", [], |row| {
        row.get::<_, Option<u32>>(0)
    })
    .map_err(MigrationError::StateQuery)
}

fn run_migrations_from_list(
    conn: &Connection,
    migrations: &[Migration],
) -> Result<usize, MigrationError> {
    conn.execute_batch(TRACKING_TABLE)
        .map_err(MigrationError::StateQuery)?;

    let mut applied = 0;
    for migration in migrations {
        let recorded = conn
            .query_row(
                "SELECT name FROM _jointfab_migrations WHERE version = ?1",
                [migration.version],
                |row| row.get::<_, String>(0),
            )
            .optional()
            .map_err(MigrationError::StateQuery)?;
        if recorded.is_some() {
            tracing::debug!(version = migration.version, "migration already applied");
            continue;
        }

        apply(conn, migration)?;
        tracing::info!(
            version = migration.version,
            name = migration.name,
            "applied migration"
        );
        applied += 1;
    }
    Ok(applied)
}

fn apply(conn: &Connection, migration: &Migration) -> Result<(), MigrationError> {
    let failed = |source| MigrationError::ExecutionFailed {
        version: migration.version,
        name: migration.name,
        source,
    };
    let tx = conn.unchecked_transaction().map_err(failed)?;
    tx.execute_batch(migration.sql).map_err(failed)?;
    tx.execute(
        "INSERT INTO _jointfab_migrations (version, name) VALUES (?1, ?2)",
        rusqlite::params![migration.version, migration.name],
    )
    .map_err(failed)?;
    tx.commit().map_err(failed)
}
