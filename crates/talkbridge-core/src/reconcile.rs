//! Cross-table reconciliation between the signup store and the ledger.
//!
//! Read-only. Callers consult [`get_cross_table_stats`] before and after a
//! bulk run; [`preflight`] turns the numbers into a go/warn decision.
//!
//! A ledger row "matches" a signup when `(email, target_url)` equals the
//! signup's `(email, talk_url)`. For cross-promotion rows that match only
//! appears once the target talk's export has been re-imported, so
//! `orphaned` is also the count of submissions the target talk has not
//! confirmed yet.

use anyhow::{Context, Result};
use rusqlite::Connection;
use serde::Serialize;

use crate::db::count_to_usize;
use crate::ledger::get_stats;

/// Signup-side reconciliation counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SignupSide {
    pub total: usize,
    /// Signups with a successful (non dry-run) ledger row.
    pub processed: usize,
    /// Signups with no ledger row at all.
    pub unprocessed: usize,
}

/// Ledger-side reconciliation counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LedgerSide {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub pending: usize,
    /// Ledger rows with no matching signup.
    pub orphaned: usize,
}

/// Combined report from [`get_cross_table_stats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CrossTableStats {
    pub signups: SignupSide,
    pub processed_emails: LedgerSide,
}

/// Safety-gate verdict for a bulk run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum Preflight {
    Clear,
    Warn { pending: usize, threshold: usize },
}

/// Compute signup vs. ledger counters.
///
/// # Errors
///
/// Returns an error if any query fails.
pub fn get_cross_table_stats(conn: &Connection) -> Result<CrossTableStats> {
    let signups = conn
        .query_row(
            "SELECT
                COUNT(*),
                COALESCE(SUM(EXISTS (
                    SELECT 1 FROM processed_emails p
                    WHERE p.email = s.email AND p.target_url = s.talk_url
                      AND p.success = 1 AND p.dry_run = 0
                )), 0),
                COALESCE(SUM(NOT EXISTS (
                    SELECT 1 FROM processed_emails p
                    WHERE p.email = s.email AND p.target_url = s.talk_url
                )), 0)
             FROM signups s",
            [],
            |row| {
                Ok(SignupSide {
                    total: count_to_usize(row.get(0)?),
                    processed: count_to_usize(row.get(1)?),
                    unprocessed: count_to_usize(row.get(2)?),
                })
            },
        )
        .context("query signup-side reconciliation")?;

    let orphaned: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM processed_emails p
             WHERE NOT EXISTS (
                SELECT 1 FROM signups s
                WHERE s.email = p.email AND s.talk_url = p.target_url
             )",
            [],
            |row| row.get(0),
        )
        .context("count orphaned ledger rows")?;

    let ledger = get_stats(conn)?;
    let stats = CrossTableStats {
        signups,
        processed_emails: LedgerSide {
            total: ledger.total,
            successful: ledger.successful,
            failed: ledger.failed,
            pending: ledger.pending,
            orphaned: count_to_usize(orphaned),
        },
    };

    if stats.processed_emails.orphaned > 0 {
        tracing::warn!(
            orphaned = stats.processed_emails.orphaned,
            "ledger rows without a matching signup"
        );
    }
    Ok(stats)
}

/// Warn when more than `threshold` items are pending store-wide.
#[must_use]
pub const fn preflight(stats: &CrossTableStats, threshold: usize) -> Preflight {
    preflight_pending(stats.processed_emails.pending, threshold)
}

/// Warn when a `pending` count, store-wide or for one group, exceeds
/// `threshold`.
#[must_use]
pub const fn preflight_pending(pending: usize, threshold: usize) -> Preflight {
    if pending > threshold {
        Preflight::Warn { pending, threshold }
    } else {
        Preflight::Clear
    }
}
