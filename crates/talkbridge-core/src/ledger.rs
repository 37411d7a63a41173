//! Processing ledger: idempotent bookkeeping of outbound per-email actions.
//!
//! One logical row per (email, target url). Every attempt replaces the
//! previous row for that pair, so only the latest outcome survives. Pending
//! and failed rows stay eligible for retry; only a successful row makes a
//! pair "processed".
//!
//! Row classification used by every stats query:
//!
//! | state      | success | dry_run | error_message |
//! |------------|---------|---------|---------------|
//! | pending    | 0       | 0       | NULL          |
//! | failed     | 0       | 0       | NOT NULL      |
//! | successful | 1       | 0       | -             |
//! | dry run    | -       | 1       | -             |

use anyhow::{Context, Result};
use rusqlite::{Connection, OptionalExtension, params};
use serde::Serialize;

use crate::db::{count_to_usize, now_us};
use crate::signups::normalize_email;

/// A unit of outbound work: submit `email` to the form at `target_url`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct WorkItem {
    pub email: String,
    pub target_url: String,
    pub talk_title: String,
    pub sync_group_id: Option<i64>,
}

/// Result of one processing attempt, as reported to the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessingOutcome {
    pub email: String,
    pub target_url: String,
    pub talk_title: String,
    pub success: bool,
    pub error_message: Option<String>,
    pub dry_run: bool,
    pub sync_group_id: Option<i64>,
}

impl ProcessingOutcome {
    /// The actuator reported success for `item`.
    #[must_use]
    pub fn succeeded(item: &WorkItem) -> Self {
        Self::from_item(item, true, None, false)
    }

    /// The actuator reported failure for `item`.
    #[must_use]
    pub fn failed(item: &WorkItem, message: impl Into<String>) -> Self {
        Self::from_item(item, false, Some(message.into()), false)
    }

    /// `item` was walked in dry-run mode without contacting the actuator.
    #[must_use]
    pub fn dry_run(item: &WorkItem) -> Self {
        Self::from_item(item, true, None, true)
    }

    fn from_item(
        item: &WorkItem,
        success: bool,
        error_message: Option<String>,
        dry_run: bool,
    ) -> Self {
        Self {
            email: item.email.clone(),
            target_url: item.target_url.clone(),
            talk_title: item.talk_title.clone(),
            success,
            error_message,
            dry_run,
            sync_group_id: item.sync_group_id,
        }
    }
}

/// A stored ledger row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessingRecord {
    pub id: i64,
    pub email: String,
    pub target_url: String,
    pub talk_title: String,
    pub processed_at_us: i64,
    pub success: bool,
    pub error_message: Option<String>,
    pub dry_run: bool,
    pub sync_group_id: Option<i64>,
}

/// Ledger-wide counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LedgerStats {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub dry_run: usize,
    pub pending: usize,
}

/// Counters for a single sync group.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct GroupStats {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub pending: usize,
}

/// True only when a row exists for the pair and it is marked successful.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn is_processed(conn: &Connection, email: &str, target_url: &str) -> Result<bool> {
    conn.query_row(
        "SELECT EXISTS(
            SELECT 1 FROM processed_emails
            WHERE email = ?1 AND target_url = ?2 AND success = 1
        )",
        params![normalize_email(email), target_url.trim()],
        |row| row.get(0),
    )
    .with_context(|| format!("is_processed for {email} -> {target_url}"))
}

/// Record the outcome of an attempt, replacing any earlier row for the pair.
///
/// Bookkeeping never aborts the caller: a failed write is logged as a
/// warning and `false` is returned.
///
/// When `outcome.sync_group_id` is `None` the previous row's group link is
/// kept, so per-group stats survive ad-hoc retries.
pub fn mark_as_processed(conn: &Connection, outcome: &ProcessingOutcome) -> bool {
    match write_outcome(conn, outcome) {
        Ok(()) => {
            tracing::debug!(
                email = %outcome.email,
                target_url = %outcome.target_url,
                success = outcome.success,
                dry_run = outcome.dry_run,
                "ledger updated"
            );
            true
        }
        Err(error) => {
            tracing::warn!(
                email = %outcome.email,
                target_url = %outcome.target_url,
                error = %format!("{error:#}"),
                "failed to record processing outcome"
            );
            false
        }
    }
}

fn write_outcome(conn: &Connection, outcome: &ProcessingOutcome) -> Result<()> {
    let email = normalize_email(&outcome.email);
    let target_url = outcome.target_url.trim();

    let tx = conn
        .unchecked_transaction()
        .context("begin ledger write transaction")?;

    let prior_group: Option<i64> = tx
        .query_row(
            "SELECT sync_group_id FROM processed_emails
             WHERE email = ?1 AND target_url = ?2 AND sync_group_id IS NOT NULL
             ORDER BY processed_at_us DESC, id DESC
             LIMIT 1",
            params![email, target_url],
            |row| row.get(0),
        )
        .optional()
        .context("read prior sync group link")?;

    tx.execute(
        "DELETE FROM processed_emails WHERE email = ?1 AND target_url = ?2",
        params![email, target_url],
    )
    .context("remove previous ledger rows")?;

    tx.execute(
        "INSERT INTO processed_emails (
            email, target_url, talk_title, processed_at_us,
            success, error_message, dry_run, sync_group_id
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            email,
            target_url,
            outcome.talk_title,
            now_us(),
            outcome.success,
            outcome.error_message,
            outcome.dry_run,
            outcome.sync_group_id.or(prior_group),
        ],
    )
    .context("insert ledger row")?;

    tx.commit().context("commit ledger write transaction")
}

/// Insert pending placeholder rows for `items`, skipping any pair that
/// already has a row (pending, failed, or successful).
///
/// The whole batch runs in one transaction: either every missing row is
/// inserted or none are. Returns the number of rows inserted.
///
/// # Errors
///
/// Returns an error if any insert fails; the batch is rolled back.
pub fn bulk_seed_pending(
    conn: &mut Connection,
    items: &[WorkItem],
    sync_group_id: i64,
) -> Result<usize> {
    let seeded_at_us = now_us();
    let mut inserted = 0;

    let tx = conn.transaction().context("begin seed transaction")?;
    {
        let mut stmt = tx
            .prepare(
                "INSERT INTO processed_emails (
                    email, target_url, talk_title, processed_at_us,
                    success, error_message, dry_run, sync_group_id
                 )
                 SELECT ?1, ?2, ?3, ?4, 0, NULL, 0, ?5
                 WHERE NOT EXISTS (
                    SELECT 1 FROM processed_emails WHERE email = ?1 AND target_url = ?2
                 )",
            )
            .context("prepare seed insert")?;

        for item in items {
            inserted += stmt
                .execute(params![
                    normalize_email(&item.email),
                    item.target_url.trim(),
                    item.talk_title,
                    seeded_at_us,
                    sync_group_id,
                ])
                .with_context(|| format!("seed {} -> {}", item.email, item.target_url))?;
        }
    }
    tx.commit().context("commit seed transaction")?;

    tracing::info!(
        sync_group_id,
        requested = items.len(),
        inserted,
        "pending work seeded"
    );
    Ok(inserted)
}

/// Work items that still need a live attempt (`success = 0 AND dry_run = 0`),
/// optionally scoped to one sync group. Ordered by insertion.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn get_unprocessed_emails(
    conn: &Connection,
    sync_group_id: Option<i64>,
) -> Result<Vec<WorkItem>> {
    let mut stmt = conn
        .prepare(
            "SELECT email, target_url, talk_title, sync_group_id
             FROM processed_emails
             WHERE success = 0 AND dry_run = 0
               AND (?1 IS NULL OR sync_group_id = ?1)
             ORDER BY id ASC",
        )
        .context("prepare get_unprocessed_emails")?;

    let rows = stmt
        .query_map(params![sync_group_id], |row| {
            Ok(WorkItem {
                email: row.get(0)?,
                target_url: row.get(1)?,
                talk_title: row.get(2)?,
                sync_group_id: row.get(3)?,
            })
        })
        .context("execute get_unprocessed_emails")?;

    let mut items = Vec::new();
    for row in rows {
        items.push(row.context("read work item row")?);
    }
    Ok(items)
}

/// Every ledger row for one (email, target url) pair, newest first.
///
/// After any write through [`mark_as_processed`] this holds at most one row;
/// legacy data may hold more until deduplicated.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn get_records(
    conn: &Connection,
    email: &str,
    target_url: &str,
) -> Result<Vec<ProcessingRecord>> {
    let mut stmt = conn
        .prepare(
            "SELECT id, email, target_url, talk_title, processed_at_us,
                    success, error_message, dry_run, sync_group_id
             FROM processed_emails
             WHERE email = ?1 AND target_url = ?2
             ORDER BY processed_at_us DESC, id DESC",
        )
        .context("prepare get_records")?;

    let rows = stmt
        .query_map(
            params![normalize_email(email), target_url.trim()],
            |row| {
                Ok(ProcessingRecord {
                    id: row.get(0)?,
                    email: row.get(1)?,
                    target_url: row.get(2)?,
                    talk_title: row.get(3)?,
                    processed_at_us: row.get(4)?,
                    success: row.get(5)?,
                    error_message: row.get(6)?,
                    dry_run: row.get(7)?,
                    sync_group_id: row.get(8)?,
                })
            },
        )
        .context("execute get_records")?;

    let mut records = Vec::new();
    for row in rows {
        records.push(row.context("read ledger row")?);
    }
    Ok(records)
}

/// Ledger-wide counters.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn get_stats(conn: &Connection) -> Result<LedgerStats> {
    conn.query_row(
        "SELECT
            COUNT(*),
            COALESCE(SUM(success = 1 AND dry_run = 0), 0),
            COALESCE(SUM(success = 0 AND dry_run = 0 AND error_message IS NOT NULL), 0),
            COALESCE(SUM(dry_run = 1), 0),
            COALESCE(SUM(success = 0 AND dry_run = 0 AND error_message IS NULL), 0)
         FROM processed_emails",
        [],
        |row| {
            Ok(LedgerStats {
                total: count_to_usize(row.get(0)?),
                successful: count_to_usize(row.get(1)?),
                failed: count_to_usize(row.get(2)?),
                dry_run: count_to_usize(row.get(3)?),
                pending: count_to_usize(row.get(4)?),
            })
        },
    )
    .context("query ledger stats")
}

/// Counters for one sync group.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn get_sync_group_stats(conn: &Connection, sync_group_id: i64) -> Result<GroupStats> {
    conn.query_row(
        "SELECT
            COUNT(*),
            COALESCE(SUM(success = 1 AND dry_run = 0), 0),
            COALESCE(SUM(success = 0 AND dry_run = 0 AND error_message IS NOT NULL), 0),
            COALESCE(SUM(success = 0 AND dry_run = 0 AND error_message IS NULL), 0)
         FROM processed_emails
         WHERE sync_group_id = ?1",
        params![sync_group_id],
        |row| {
            Ok(GroupStats {
                total: count_to_usize(row.get(0)?),
                successful: count_to_usize(row.get(1)?),
                failed: count_to_usize(row.get(2)?),
                pending: count_to_usize(row.get(3)?),
            })
        },
    )
    .with_context(|| format!("query stats for sync group {sync_group_id}"))
}

/// True while any row seeded for the group still lacks a live success:
/// pending, failed, or only rehearsed in a dry run.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn has_unsubmitted_items(conn: &Connection, sync_group_id: i64) -> Result<bool> {
    conn.query_row(
        "SELECT EXISTS(
            SELECT 1 FROM processed_emails
            WHERE sync_group_id = ?1 AND (success = 0 OR dry_run = 1)
        )",
        params![sync_group_id],
        |row| row.get(0),
    )
    .with_context(|| format!("check unsubmitted items for sync group {sync_group_id}"))
}

/// Return dry-run rows to pending so a live run can follow a rehearsal.
///
/// # Errors
///
/// Returns an error if the update fails.
pub fn reset_dry_runs(conn: &Connection) -> Result<usize> {
    let changed = conn
        .execute(
            "UPDATE processed_emails
             SET success = 0, dry_run = 0, error_message = NULL
             WHERE dry_run = 1",
            [],
        )
        .context("reset dry-run rows")?;
    tracing::info!(rows = changed, "dry-run rows returned to pending");
    Ok(changed)
}
