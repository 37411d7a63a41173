//! Sync groups: cross-promotion pairings between two talks.
//!
//! A group records how the two signup lists overlap. People who signed up
//! for B but not A are candidates to invite to A (`missing_from_a`), and
//! symmetrically for B. Pairing is unordered: (A, B) and (B, A) are the same
//! group, and at most one group may exist per pair of talk titles.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use anyhow::{Context, Result, bail};
use rusqlite::{Connection, OptionalExtension, params};
use serde::Serialize;

use crate::db::{count_to_usize, now_us};
use crate::error::ErrorCode;
use crate::ledger::WorkItem;
use crate::signups::get_signups_for_talks;

/// Lifecycle of a sync group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncGroupStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
}

impl SyncGroupStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
        }
    }
}

impl fmt::Display for SyncGroupStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncGroupStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "in_progress" | "in-progress" => Ok(Self::InProgress),
            "completed" | "done" => Ok(Self::Completed),
            other => bail!(
                "unknown sync group status '{other}': expected one of pending, in_progress, completed"
            ),
        }
    }
}

/// A persisted pairing between two talks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncGroup {
    pub id: i64,
    pub created_at_us: i64,
    pub talk_a_title: String,
    pub talk_a_url: String,
    pub talk_b_title: String,
    pub talk_b_url: String,
    pub overlap_count: usize,
    pub missing_from_a: usize,
    pub missing_from_b: usize,
    pub status: SyncGroupStatus,
}

/// Set arithmetic over two signup lists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Overlap {
    /// `|A ∩ B|`
    pub overlap: usize,
    /// `|B \ A|`: signed up for B, not yet for A.
    pub missing_from_a: usize,
    /// `|A \ B|`: signed up for A, not yet for B.
    pub missing_from_b: usize,
}

/// Errors from [`create_sync_group`].
#[derive(Debug, thiserror::Error)]
pub enum SyncGroupError {
    #[error("duplicate sync group: '{title_a}' and '{title_b}' are already paired in group {existing_id}")]
    Duplicate {
        existing_id: i64,
        title_a: String,
        title_b: String,
    },

    #[error("cannot pair talk '{0}' with itself")]
    SameTalk(String),

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl SyncGroupError {
    /// Machine-readable code for this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Duplicate { .. } => ErrorCode::DuplicateSyncGroup,
            Self::SameTalk(_) => ErrorCode::SameTalkPairing,
            Self::Storage(_) => ErrorCode::InternalUnexpected,
        }
    }
}

/// Compute overlap and missing counts between two email lists.
///
/// Duplicates inside either list are ignored.
#[must_use]
pub fn compute_overlap<S: AsRef<str>>(emails_a: &[S], emails_b: &[S]) -> Overlap {
    let set_a: BTreeSet<&str> = emails_a.iter().map(|e| e.as_ref()).collect();
    let set_b: BTreeSet<&str> = emails_b.iter().map(|e| e.as_ref()).collect();

    Overlap {
        overlap: set_a.intersection(&set_b).count(),
        missing_from_a: set_b.difference(&set_a).count(),
        missing_from_b: set_a.difference(&set_b).count(),
    }
}

/// Create a sync group between two talks.
///
/// # Errors
///
/// Returns [`SyncGroupError::Duplicate`] if the two titles are already paired
/// in either order, [`SyncGroupError::SameTalk`] if both titles are equal,
/// and [`SyncGroupError::Storage`] if SQLite fails.
pub fn create_sync_group(
    conn: &Connection,
    title_a: &str,
    url_a: &str,
    title_b: &str,
    url_b: &str,
) -> Result<i64, SyncGroupError> {
    let title_a = title_a.trim();
    let title_b = title_b.trim();
    if title_a == title_b {
        return Err(SyncGroupError::SameTalk(title_a.to_string()));
    }

    let tx = conn
        .unchecked_transaction()
        .context("begin sync group transaction")?;

    if let Some(existing) = find_sync_group_by_titles(&tx, title_a, title_b)? {
        tracing::warn!(
            existing_id = existing.id,
            title_a,
            title_b,
            "refusing to create duplicate sync group"
        );
        return Err(SyncGroupError::Duplicate {
            existing_id: existing.id,
            title_a: title_a.to_string(),
            title_b: title_b.to_string(),
        });
    }

    let lists = get_signups_for_talks(&tx, title_a, title_b)?;
    let overlap = compute_overlap(&lists.list_a, &lists.list_b);

    tx.execute(
        "INSERT INTO sync_groups (
            created_at_us, talk_a_title, talk_a_url, talk_b_title, talk_b_url,
            overlap_count, missing_from_a, missing_from_b, status
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            now_us(),
            title_a,
            url_a.trim(),
            title_b,
            url_b.trim(),
            usize_to_i64(overlap.overlap),
            usize_to_i64(overlap.missing_from_a),
            usize_to_i64(overlap.missing_from_b),
            SyncGroupStatus::Pending.as_str(),
        ],
    )
    .context("insert sync group")?;
    let id = tx.last_insert_rowid();
    tx.commit().context("commit sync group transaction")?;

    tracing::info!(
        sync_group_id = id,
        title_a,
        title_b,
        overlap = overlap.overlap,
        missing_from_a = overlap.missing_from_a,
        missing_from_b = overlap.missing_from_b,
        "sync group created"
    );
    Ok(id)
}

/// All sync groups, newest first.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn get_sync_groups(conn: &Connection) -> Result<Vec<SyncGroup>> {
    let sql = format!("{SELECT_GROUP} ORDER BY created_at_us DESC, id DESC");
    let mut stmt = conn.prepare(&sql).context("prepare get_sync_groups")?;
    let rows = stmt
        .query_map([], row_to_sync_group)
        .context("execute get_sync_groups")?;

    let mut groups = Vec::new();
    for row in rows {
        groups.push(row.context("read sync group row")?);
    }
    Ok(groups)
}

/// Fetch one sync group by id.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn get_sync_group(conn: &Connection, id: i64) -> Result<Option<SyncGroup>> {
    let sql = format!("{SELECT_GROUP} WHERE id = ?1");
    conn.query_row(&sql, params![id], row_to_sync_group)
        .optional()
        .with_context(|| format!("get_sync_group for {id}"))
}

/// Find the group pairing two titles, in either order.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn find_sync_group_by_titles(
    conn: &Connection,
    title_a: &str,
    title_b: &str,
) -> Result<Option<SyncGroup>> {
    let sql = format!(
        "{SELECT_GROUP} \
         WHERE (talk_a_title = ?1 AND talk_b_title = ?2) \
            OR (talk_a_title = ?2 AND talk_b_title = ?1) \
         ORDER BY id ASC LIMIT 1"
    );
    conn.query_row(&sql, params![title_a.trim(), title_b.trim()], row_to_sync_group)
        .optional()
        .with_context(|| format!("find sync group for '{title_a}' / '{title_b}'"))
}

/// Move a group to a new status. Returns `false` when the id does not exist.
///
/// # Errors
///
/// Returns an error if the update fails.
pub fn set_status(conn: &Connection, id: i64, status: SyncGroupStatus) -> Result<bool> {
    let changed = conn
        .execute(
            "UPDATE sync_groups SET status = ?1 WHERE id = ?2",
            params![status.as_str(), id],
        )
        .with_context(|| format!("set status of sync group {id}"))?;
    if changed > 0 {
        tracing::info!(sync_group_id = id, status = %status, "sync group status updated");
    }
    Ok(changed > 0)
}

/// Work items for a group: every email in `B \ A` targets talk A and every
/// email in `A \ B` targets talk B. Emails already on both lists are skipped.
///
/// Items come back sorted by (target url, email); callers shuffle before
/// actuation.
///
/// # Errors
///
/// Returns an error if the signup lists cannot be read.
pub fn plan_work_items(conn: &Connection, group: &SyncGroup) -> Result<Vec<WorkItem>> {
    let lists = get_signups_for_talks(conn, &group.talk_a_title, &group.talk_b_title)?;
    let set_a: BTreeSet<&str> = lists.list_a.iter().map(String::as_str).collect();
    let set_b: BTreeSet<&str> = lists.list_b.iter().map(String::as_str).collect();

    let mut items: Vec<WorkItem> = set_b
        .difference(&set_a)
        .map(|email| WorkItem {
            email: (*email).to_string(),
            target_url: group.talk_a_url.clone(),
            talk_title: group.talk_a_title.clone(),
            sync_group_id: Some(group.id),
        })
        .chain(set_a.difference(&set_b).map(|email| WorkItem {
            email: (*email).to_string(),
            target_url: group.talk_b_url.clone(),
            talk_title: group.talk_b_title.clone(),
            sync_group_id: Some(group.id),
        }))
        .collect();

    items.sort_by(|a, b| {
        a.target_url
            .cmp(&b.target_url)
            .then_with(|| a.email.cmp(&b.email))
    });
    Ok(items)
}

const SELECT_GROUP: &str = "SELECT id, created_at_us, talk_a_title, talk_a_url, talk_b_title, \
     talk_b_url, overlap_count, missing_from_a, missing_from_b, status FROM sync_groups";

fn row_to_sync_group(row: &rusqlite::Row<'_>) -> rusqlite::Result<SyncGroup> {
    let status: String = row.get(9)?;
    let status = status.parse::<SyncGroupStatus>().map_err(|error| {
        rusqlite::Error::FromSqlConversionFailure(9, rusqlite::types::Type::Text, error.into())
    })?;
    Ok(SyncGroup {
        id: row.get(0)?,
        created_at_us: row.get(1)?,
        talk_a_title: row.get(2)?,
        talk_a_url: row.get(3)?,
        talk_b_title: row.get(4)?,
        talk_b_url: row.get(5)?,
        overlap_count: count_to_usize(row.get(6)?),
        missing_from_a: count_to_usize(row.get(7)?),
        missing_from_b: count_to_usize(row.get(8)?),
        status,
    })
}

fn usize_to_i64(value: usize) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_in_memory;
    use crate::signups::import_signups;
    use crate::signups::tests::signup;

    fn seeded_store() -> Connection {
        let mut conn = open_in_memory().expect("open store");
        import_signups(
            &mut conn,
            &[
                signup("x@example.com", "A", "https://t/a"),
                signup("y@example.com", "A", "https://t/a"),
                signup("z@example.com", "A", "https://t/a"),
                signup("y@example.com", "B", "https://t/b"),
                signup("z@example.com", "B", "https://t/b"),
                signup("w@example.com", "B", "https://t/b"),
            ],
        )
        .expect("import");
        conn
    }

    #[test]
    fn compute_overlap_counts_each_side() {
        let a = ["x", "y", "z"];
        let b = ["y", "z", "w"];
        assert_eq!(
            compute_overlap(&a, &b),
            Overlap {
                overlap: 2,
                missing_from_a: 1,
                missing_from_b: 1,
            }
        );
    }

    #[test]
    fn compute_overlap_ignores_repeats() {
        let a = ["x", "x", "y"];
        let b = ["y", "y"];
        let overlap = compute_overlap(&a, &b);
        assert_eq!(overlap.overlap, 1);
        assert_eq!(overlap.missing_from_a, 0);
        assert_eq!(overlap.missing_from_b, 1);
    }

    #[test]
    fn create_records_overlap_arithmetic() {
        let conn = seeded_store();
        let id = create_sync_group(&conn, "A", "https://t/a", "B", "https://t/b").expect("create");

        let group = get_sync_group(&conn, id).expect("query").expect("exists");
        assert_eq!(group.overlap_count, 2);
        assert_eq!(group.missing_from_a, 1);
        assert_eq!(group.missing_from_b, 1);
        assert_eq!(group.status, SyncGroupStatus::Pending);
    }

    #[test]
    fn reversed_pair_is_rejected_with_existing_id() {
        let conn = seeded_store();
        let first = create_sync_group(&conn, "A", "https://t/a", "B", "https://t/b").expect("create");

        let err = create_sync_group(&conn, "B", "https://t/b", "A", "https://t/a")
            .expect_err("reversed pair must be rejected");
        match err {
            SyncGroupError::Duplicate { existing_id, .. } => assert_eq!(existing_id, first),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(get_sync_groups(&conn).expect("list").len(), 1);
    }

    #[test]
    fn same_talk_pairing_is_rejected() {
        let conn = seeded_store();
        let err = create_sync_group(&conn, "A", "https://t/a", " A ", "https://t/a")
            .expect_err("self pairing must fail");
        assert!(matches!(err, SyncGroupError::SameTalk(_)));
        assert_eq!(err.code(), ErrorCode::SameTalkPairing);
    }

    #[test]
    fn groups_are_listed_newest_first() {
        let mut conn = seeded_store();
        import_signups(&mut conn, &[signup("q@example.com", "C", "https://t/c")]).expect("import");
        let first = create_sync_group(&conn, "A", "https://t/a", "B", "https://t/b").expect("ab");
        let second = create_sync_group(&conn, "A", "https://t/a", "C", "https://t/c").expect("ac");

        let ids: Vec<i64> = get_sync_groups(&conn)
            .expect("list")
            .iter()
            .map(|g| g.id)
            .collect();
        assert_eq!(ids, vec![second, first]);
    }

    #[test]
    fn plan_targets_the_talk_each_email_is_missing() {
        let conn = seeded_store();
        let id = create_sync_group(&conn, "A", "https://t/a", "B", "https://t/b").expect("create");
        let group = get_sync_group(&conn, id).expect("query").expect("exists");

        let items = plan_work_items(&conn, &group).expect("plan");
        let pairs: Vec<(&str, &str)> = items
            .iter()
            .map(|i| (i.email.as_str(), i.target_url.as_str()))
            .collect();
        assert_eq!(
            pairs,
            vec![("w@example.com", "https://t/a"), ("x@example.com", "https://t/b")]
        );
        assert!(items.iter().all(|i| i.sync_group_id == Some(id)));
    }

    #[test]
    fn set_status_transitions_and_reports_missing_ids() {
        let conn = seeded_store();
        let id = create_sync_group(&conn, "A", "https://t/a", "B", "https://t/b").expect("create");

        assert!(set_status(&conn, id, SyncGroupStatus::Completed).expect("update"));
        let group = get_sync_group(&conn, id).expect("query").expect("exists");
        assert_eq!(group.status, SyncGroupStatus::Completed);

        assert!(!set_status(&conn, id + 100, SyncGroupStatus::Completed).expect("update"));
    }

    #[test]
    fn status_parse_roundtrip() {
        for status in [
            SyncGroupStatus::Pending,
            SyncGroupStatus::InProgress,
            SyncGroupStatus::Completed,
        ] {
            assert_eq!(status.as_str().parse::<SyncGroupStatus>().expect("parse"), status);
        }
        assert!("archived".parse::<SyncGroupStatus>().is_err());
    }
}
