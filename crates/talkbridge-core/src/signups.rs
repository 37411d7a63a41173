//! Signup store: deduplicated storage of talk signups imported from CSV.
//!
//! Rows are keyed by (email, talk url). Re-importing the same pair replaces
//! the earlier row, so the last import wins.

use anyhow::{Context, Result};
use rusqlite::{Connection, OptionalExtension, params};
use serde::Serialize;

use crate::db::{count_to_usize, now_us};

/// A signup as read from an import source, before it is stored.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NewSignup {
    pub email: String,
    pub talk_title: String,
    pub talk_url: String,
    pub source: String,
    pub created_at: String,
    pub source_file: Option<String>,
}

impl NewSignup {
    /// Trim every field and lowercase the email so the (email, talk url)
    /// key is stable across exports from different tools.
    #[must_use]
    pub fn normalized(&self) -> Self {
        Self {
            email: normalize_email(&self.email),
            talk_title: self.talk_title.trim().to_string(),
            talk_url: self.talk_url.trim().to_string(),
            source: self.source.trim().to_string(),
            created_at: self.created_at.trim().to_string(),
            source_file: self
                .source_file
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
        }
    }
}

/// Normalize an email address for keying: trimmed and ASCII-lowercased.
#[must_use]
pub fn normalize_email(email: &str) -> String {
    email.trim().to_ascii_lowercase()
}

/// A stored signup row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SignupRecord {
    pub id: i64,
    pub email: String,
    pub talk_title: String,
    pub talk_url: String,
    pub source: String,
    pub created_at: String,
    pub imported_at_us: i64,
    pub source_file: Option<String>,
}

/// One talk with its signup count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TalkSummary {
    pub talk_title: String,
    pub talk_url: String,
    pub signup_count: usize,
}

/// Distinct emails for two talks, the raw input to overlap computation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TalkEmailLists {
    pub list_a: Vec<String>,
    pub list_b: Vec<String>,
}

/// Outcome of an import batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    /// Rows written (inserted or replaced).
    pub imported: usize,
    /// Rows rejected by a constraint other than the (email, talk url) key.
    pub skipped: usize,
}

impl ImportReport {
    /// Fold another report into this one.
    pub const fn absorb(&mut self, other: Self) {
        self.imported += other.imported;
        self.skipped += other.skipped;
    }
}

/// Insert or replace signups keyed by (email, talk url).
///
/// All rows are written in one transaction. A row that violates any other
/// constraint (blank email, blank url, ...) is logged and skipped; the rest
/// of the batch still commits.
///
/// # Errors
///
/// Returns an error if the transaction cannot be started or committed, or
/// if an insert fails for any reason other than a constraint violation. The
/// whole batch is rolled back in that case.
pub fn import_signups(conn: &mut Connection, records: &[NewSignup]) -> Result<ImportReport> {
    let imported_at_us = now_us();
    let mut report = ImportReport::default();

    let tx = conn.transaction().context("begin signup import transaction")?;
    {
        let mut stmt = tx
            .prepare(
                "INSERT OR REPLACE INTO signups
                    (email, talk_title, talk_url, source, created_at, imported_at_us, source_file)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )
            .context("prepare signup insert")?;

        for record in records {
            let row = record.normalized();
            match stmt.execute(params![
                row.email,
                row.talk_title,
                row.talk_url,
                row.source,
                row.created_at,
                imported_at_us,
                row.source_file,
            ]) {
                Ok(_) => report.imported += 1,
                Err(error) if is_constraint_violation(&error) => {
                    tracing::warn!(
                        email = %row.email,
                        talk_url = %row.talk_url,
                        error = %error,
                        "skipping signup row that violates a store constraint"
                    );
                    report.skipped += 1;
                }
                Err(error) => {
                    return Err(error).with_context(|| {
                        format!("insert signup {} for {}", row.email, row.talk_url)
                    });
                }
            }
        }
    }
    tx.commit().context("commit signup import transaction")?;

    tracing::info!(
        imported = report.imported,
        skipped = report.skipped,
        "signups imported"
    );
    Ok(report)
}

/// All talks with signup counts, most signups first.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn get_all_talks(conn: &Connection) -> Result<Vec<TalkSummary>> {
    let mut stmt = conn
        .prepare(
            "SELECT talk_title, talk_url, COUNT(*) AS signup_count
             FROM signups
             GROUP BY talk_title, talk_url
             ORDER BY signup_count DESC, talk_title ASC, talk_url ASC",
        )
        .context("prepare get_all_talks")?;

    let rows = stmt
        .query_map([], row_to_talk_summary)
        .context("execute get_all_talks")?;

    let mut talks = Vec::new();
    for row in rows {
        talks.push(row.context("read talk summary row")?);
    }
    Ok(talks)
}

/// Look up a talk by exact title.
///
/// When one title was published under several URLs, the URL with the most
/// signups wins.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn find_talk(conn: &Connection, talk_title: &str) -> Result<Option<TalkSummary>> {
    conn.query_row(
        "SELECT talk_title, talk_url, COUNT(*) AS signup_count
         FROM signups
         WHERE talk_title = ?1
         GROUP BY talk_title, talk_url
         ORDER BY signup_count DESC, talk_url ASC
         LIMIT 1",
        params![talk_title.trim()],
        row_to_talk_summary,
    )
    .optional()
    .with_context(|| format!("find_talk for '{talk_title}'"))
}

/// Signups for one talk, newest first.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn get_signups_for_talk(conn: &Connection, talk_title: &str) -> Result<Vec<SignupRecord>> {
    let mut stmt = conn
        .prepare(
            "SELECT id, email, talk_title, talk_url, source, created_at, imported_at_us, source_file
             FROM signups
             WHERE talk_title = ?1
             ORDER BY created_at DESC, imported_at_us DESC, id DESC",
        )
        .context("prepare get_signups_for_talk")?;

    let rows = stmt
        .query_map(params![talk_title.trim()], |row| {
            Ok(SignupRecord {
                id: row.get(0)?,
                email: row.get(1)?,
                talk_title: row.get(2)?,
                talk_url: row.get(3)?,
                source: row.get(4)?,
                created_at: row.get(5)?,
                imported_at_us: row.get(6)?,
                source_file: row.get(7)?,
            })
        })
        .with_context(|| format!("execute get_signups_for_talk for '{talk_title}'"))?;

    let mut signups = Vec::new();
    for row in rows {
        signups.push(row.context("read signup row")?);
    }
    Ok(signups)
}

/// Distinct emails for each of two talks.
///
/// # Errors
///
/// Returns an error if either query fails.
pub fn get_signups_for_talks(
    conn: &Connection,
    title_a: &str,
    title_b: &str,
) -> Result<TalkEmailLists> {
    Ok(TalkEmailLists {
        list_a: distinct_emails(conn, title_a)?,
        list_b: distinct_emails(conn, title_b)?,
    })
}

/// Total number of stored signups.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn count_signups(conn: &Connection) -> Result<usize> {
    let count: i64 = conn
        .query_row("SELECT COUNT(*) FROM signups", [], |row| row.get(0))
        .context("count signups")?;
    Ok(count_to_usize(count))
}

fn distinct_emails(conn: &Connection, talk_title: &str) -> Result<Vec<String>> {
    let mut stmt = conn
        .prepare("SELECT DISTINCT email FROM signups WHERE talk_title = ?1 ORDER BY email")
        .context("prepare distinct_emails")?;
    let rows = stmt
        .query_map(params![talk_title.trim()], |row| row.get::<_, String>(0))
        .with_context(|| format!("execute distinct_emails for '{talk_title}'"))?;

    let mut emails = Vec::new();
    for row in rows {
        emails.push(row.context("read email row")?);
    }
    Ok(emails)
}

fn is_constraint_violation(error: &rusqlite::Error) -> bool {
    matches!(
        error,
        rusqlite::Error::SqliteFailure(failure, _)
            if failure.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

fn row_to_talk_summary(row: &rusqlite::Row<'_>) -> rusqlite::Result<TalkSummary> {
    let count: i64 = row.get(2)?;
    Ok(TalkSummary {
        talk_title: row.get(0)?,
        talk_url: row.get(1)?,
        signup_count: count_to_usize(count),
    })
}
