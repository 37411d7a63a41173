//! SQLite store utilities.
//!
//! Runtime defaults:
//! - `journal_mode = WAL` so a reader (e.g. `tb stats`) never blocks a run
//! - `busy_timeout = 5s` to ride out transient lock failures
//! - `foreign_keys = ON` so ledger rows lose their group link when a group
//!   is removed instead of dangling
//!
//! No cross-process locking is implemented: one process should own the
//! database file at a time.

pub mod migrations;
pub mod schema;

use anyhow::{Context, Result};
use rusqlite::Connection;
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Busy timeout used for store connections.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Open (or create) the store database, apply runtime pragmas, and migrate
/// the schema to the latest version.
///
/// # Errors
///
/// Returns an error if the directory cannot be created or the file cannot be
/// opened, configured, or migrated.
pub fn open_store(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("create store directory {}", parent.display()))?;
    }

    let mut conn =
        Connection::open(path).with_context(|| format!("open store database {}", path.display()))?;

    configure_connection(&conn).context("configure sqlite pragmas")?;
    migrations::migrate(&mut conn).context("apply store migrations")?;

    tracing::debug!(path = %path.display(), "store opened");
    Ok(conn)
}

/// Open a fully migrated in-memory store.
///
/// # Errors
///
/// Returns an error if the schema cannot be applied.
pub fn open_in_memory() -> Result<Connection> {
    let mut conn = Connection::open_in_memory().context("open in-memory store")?;
    conn.pragma_update(None, "foreign_keys", "ON")
        .context("enable foreign keys")?;
    migrations::migrate(&mut conn).context("apply store migrations")?;
    Ok(conn)
}

fn configure_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.busy_timeout(DEFAULT_BUSY_TIMEOUT)?;
    conn.execute_batch(
        "PRAGMA foreign_keys = ON;
         PRAGMA synchronous = NORMAL;",
    )?;
    let mode: String = conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
    if !mode.eq_ignore_ascii_case("wal") {
        tracing::warn!(journal_mode = %mode, "store is not in WAL mode");
    }
    Ok(())
}

/// Row counts removed by [`reset_store`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct ResetReport {
    pub signups: usize,
    pub sync_groups: usize,
    pub processed_emails: usize,
}

/// Clear all three entity tables in one transaction.
///
/// # Errors
///
/// Returns an error if any delete fails; nothing is removed in that case.
pub fn reset_store(conn: &mut Connection) -> Result<ResetReport> {
    let tx = conn.transaction().context("begin reset transaction")?;
    let processed_emails = tx
        .execute("DELETE FROM processed_emails", [])
        .context("clear processed_emails")?;
    let sync_groups = tx
        .execute("DELETE FROM sync_groups", [])
        .context("clear sync_groups")?;
    let signups = tx.execute("DELETE FROM signups", []).context("clear signups")?;
    tx.execute(
        "UPDATE store_meta SET last_reset_at_us = ?1 WHERE id = 1",
        [now_us()],
    )
    .context("record reset time")?;
    tx.commit().context("commit reset transaction")?;

    let report = ResetReport {
        signups,
        sync_groups,
        processed_emails,
    };
    tracing::info!(
        signups = report.signups,
        sync_groups = report.sync_groups,
        processed_emails = report.processed_emails,
        "store reset"
    );
    Ok(report)
}

/// Current wall-clock time in Unix microseconds.
#[must_use]
pub fn now_us() -> i64 {
    chrono::Utc::now().timestamp_micros()
}

/// Convert a SQLite `COUNT(*)`/`SUM` result to `usize`.
pub(crate) fn count_to_usize(value: i64) -> usize {
    usize::try_from(value).unwrap_or(0)
}
