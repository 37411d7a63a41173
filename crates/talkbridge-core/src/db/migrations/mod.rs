//! Versioned schema upgrades, tracked in `PRAGMA user_version`.

use super::schema;
use rusqlite::{Connection, Transaction};

/// Schema version written by the newest migration.
pub const LATEST_SCHEMA_VERSION: u32 = 2;

struct Migration {
    version: u32,
    sql: &'static str,
}

const MIGRATIONS: [Migration; 2] = [
    Migration {
        version: 1,
        sql: schema::MIGRATION_V1_SQL,
    },
    Migration {
        version: 2,
        sql: schema::MIGRATION_V2_SQL,
    },
];

/// Schema version recorded in the database file (0 for a fresh file).
///
/// # Errors
///
/// Returns an error if the pragma cannot be read or holds a negative or
/// oversized value.
pub fn current_schema_version(conn: &Connection) -> rusqlite::Result<u32> {
    let raw: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    u32::try_from(raw).map_err(|_| rusqlite::Error::IntegralValueOutOfRange(0, raw))
}

/// Bring the schema up to [`LATEST_SCHEMA_VERSION`].
///
/// Each pending migration runs in its own transaction together with the
/// version bump, so an interrupted upgrade resumes at the failed step.
/// Returns the version the store is at afterwards.
///
/// # Errors
///
/// Returns an error if any migration statement fails.
pub fn migrate(conn: &mut Connection) -> rusqlite::Result<u32> {
    let start = current_schema_version(conn)?;
    let mut reached = start;

    for migration in MIGRATIONS.iter().filter(|m| m.version > start) {
        let tx = conn.transaction()?;
        apply(&tx, migration)?;
        tx.commit()?;
        tracing::debug!(version = migration.version, "store schema upgraded");
        reached = migration.version;
    }

    Ok(reached)
}

fn apply(tx: &Transaction<'_>, migration: &Migration) -> rusqlite::Result<()> {
    let version = i64::from(migration.version);
    tx.execute_batch(migration.sql)?;
    tx.pragma_update(None, "user_version", version)?;
    tx.execute(
        "UPDATE store_meta SET schema_version = ?1 WHERE id = 1",
        [version],
    )?;
    Ok(())
}
