//! Ledger maintenance: collapse duplicate (email, target url) rows.
//!
//! Duplicates come from legacy insert-only write paths or crash-resumed
//! runs. Per pair exactly one row survives, ranked by:
//!
//! 1. `success = 1` before `success = 0`
//! 2. most recent `processed_at_us`
//! 3. highest `id` (latest insert) as the final tie-break

use anyhow::{Context, Result};
use rusqlite::Connection;
use serde::Serialize;

use crate::db::count_to_usize;

/// Outcome of a deduplication pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DedupReport {
    pub duplicate_sets_found: usize,
    pub rows_removed: usize,
}

/// One (email, target url) pair that currently has more than one row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DuplicateSet {
    pub email: String,
    pub target_url: String,
    pub rows: usize,
    /// Id of the row a deduplication pass would keep.
    pub keep_id: i64,
}

const RANKED_ROWS: &str = "SELECT id, email, target_url,
        ROW_NUMBER() OVER (
            PARTITION BY email, target_url
            ORDER BY success DESC, processed_at_us DESC, id DESC
        ) AS rank_in_pair,
        COUNT(*) OVER (PARTITION BY email, target_url) AS rows_in_pair
     FROM processed_emails";

/// Preview duplicate sets without modifying anything.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn find_duplicate_sets(conn: &Connection) -> Result<Vec<DuplicateSet>> {
    let sql = format!(
        "SELECT email, target_url, rows_in_pair, id \
         FROM ({RANKED_ROWS}) \
         WHERE rank_in_pair = 1 AND rows_in_pair > 1 \
         ORDER BY email, target_url"
    );
    let mut stmt = conn.prepare(&sql).context("prepare find_duplicate_sets")?;
    let rows = stmt
        .query_map([], |row| {
            Ok(DuplicateSet {
                email: row.get(0)?,
                target_url: row.get(1)?,
                rows: count_to_usize(row.get(2)?),
                keep_id: row.get(3)?,
            })
        })
        .context("execute find_duplicate_sets")?;

    let mut sets = Vec::new();
    for row in rows {
        sets.push(row.context("read duplicate set row")?);
    }
    Ok(sets)
}

/// Keep one row per (email, target url) and delete the rest, in a single
/// transaction.
///
/// # Errors
///
/// Returns an error if any statement fails; the table is then left as it
/// was before the call.
pub fn deduplicate_processing_records(conn: &mut Connection) -> Result<DedupReport> {
    let tx = conn.transaction().context("begin dedup transaction")?;

    let duplicate_sets: i64 = tx
        .query_row(
            "SELECT COUNT(*) FROM (
                SELECT 1 FROM processed_emails
                GROUP BY email, target_url
                HAVING COUNT(*) > 1
             )",
            [],
            |row| row.get(0),
        )
        .context("count duplicate sets")?;

    let rows_removed = if duplicate_sets == 0 {
        0
    } else {
        let sql = format!(
            "DELETE FROM processed_emails \
             WHERE id IN (SELECT id FROM ({RANKED_ROWS}) WHERE rank_in_pair > 1)"
        );
        tx.execute(&sql, []).context("delete duplicate ledger rows")?
    };

    tx.commit().context("commit dedup transaction")?;

    let report = DedupReport {
        duplicate_sets_found: count_to_usize(duplicate_sets),
        rows_removed,
    };
    tracing::info!(
        duplicate_sets = report.duplicate_sets_found,
        rows_removed = report.rows_removed,
        "ledger deduplicated"
    );
    Ok(report)
}
