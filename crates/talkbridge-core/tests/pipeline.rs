//! Full pipeline against an on-disk store: CSV import, pairing, seeding,
//! actuation, reconciliation, export, dedup, and reset.

use std::fs;
use std::path::Path;

use rusqlite::{Connection, params};
use talkbridge_core::actuate::{ActuationError, Actuator, RunOptions, run_pending};
use talkbridge_core::csv_io::{collect_csv_paths, read_signups_csv, write_talk_csv};
use talkbridge_core::db::{open_store, reset_store};
use talkbridge_core::dedup::deduplicate_processing_records;
use talkbridge_core::ledger::{
    WorkItem, bulk_seed_pending, get_stats, get_sync_group_stats, get_unprocessed_emails,
    is_processed,
};
use talkbridge_core::reconcile::{Preflight, get_cross_table_stats, preflight};
use talkbridge_core::signups::{get_all_talks, get_signups_for_talk, import_signups};
use talkbridge_core::sync_group::{
    SyncGroupError, SyncGroupStatus, create_sync_group, get_sync_group, plan_work_items,
};
use tempfile::TempDir;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

struct AlwaysOk {
    submitted: Vec<WorkItem>,
}

impl Actuator for AlwaysOk {
    fn submit(&mut self, item: &WorkItem) -> Result<(), ActuationError> {
        self.submitted.push(item.clone());
        Ok(())
    }
}

fn write_csv(dir: &Path, name: &str, rows: &[(&str, &str, &str)]) {
    let mut body = String::from("email,talk_title,talk_url,source,created_at\n");
    for (email, title, url) in rows {
        body.push_str(&format!("{email},{title},{url},meetup,2024-05-01\n"));
    }
    fs::write(dir.join(name), body).expect("write csv");
}

fn import_dir(conn: &mut Connection, dir: &Path) -> usize {
    let paths = collect_csv_paths(&[dir.to_path_buf()]).expect("collect csv paths");
    let mut imported = 0;
    for path in paths {
        let parsed = read_signups_csv(&path).expect("parse csv");
        imported += import_signups(conn, &parsed.signups).expect("import").imported;
    }
    imported
}

fn fixture() -> (TempDir, Connection) {
    let dir = TempDir::new().expect("tempdir");
    let exports = dir.path().join("exports");
    fs::create_dir_all(&exports).expect("create exports dir");
    write_csv(
        &exports,
        "rust.csv",
        &[
            ("alice@example.com", "Rust in Production", "https://events/rust"),
            ("bob@example.com", "Rust in Production", "https://events/rust"),
            ("carol@example.com", "Rust in Production", "https://events/rust"),
        ],
    );
    write_csv(
        &exports,
        "sqlite.csv",
        &[
            ("CAROL@example.com ", "SQLite Internals", "https://events/sqlite"),
            ("dave@example.com", "SQLite Internals", "https://events/sqlite"),
        ],
    );

    let mut conn = open_store(&dir.path().join(".talkbridge/talkbridge.db")).expect("open store");
    assert_eq!(import_dir(&mut conn, &exports), 5);
    (dir, conn)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[test]
fn import_pair_seed_run_reconcile() {
    let (_dir, mut conn) = fixture();

    let talks = get_all_talks(&conn).expect("talks");
    assert_eq!(talks.len(), 2);
    assert_eq!(talks[0].talk_title, "Rust in Production");
    assert_eq!(talks[0].signup_count, 3);

    let group_id = create_sync_group(
        &conn,
        "Rust in Production",
        "https://events/rust",
        "SQLite Internals",
        "https://events/sqlite",
    )
    .expect("create group");
    let group = get_sync_group(&conn, group_id).expect("query").expect("group");
    assert_eq!(group.overlap_count, 1, "carol is on both lists after normalization");
    assert_eq!(group.missing_from_a, 1);
    assert_eq!(group.missing_from_b, 2);

    let items = plan_work_items(&conn, &group).expect("plan");
    assert_eq!(bulk_seed_pending(&mut conn, &items, group_id).expect("seed"), 3);
    assert_eq!(bulk_seed_pending(&mut conn, &items, group_id).expect("reseed"), 0);

    let before = get_cross_table_stats(&conn).expect("stats");
    assert_eq!(before.processed_emails.pending, 3);
    assert_eq!(preflight(&before, 2), Preflight::Warn { pending: 3, threshold: 2 });
    assert_eq!(preflight(&before, 100), Preflight::Clear);

    let mut actuator = AlwaysOk { submitted: Vec::new() };
    let summary = run_pending(&conn, &mut actuator, &RunOptions::default()).expect("run");
    assert_eq!(summary.succeeded, 3);
    assert_eq!(summary.completed_groups, vec![group_id]);
    assert!(is_processed(&conn, "dave@example.com", "https://events/rust").expect("query"));

    let group_stats = get_sync_group_stats(&conn, group_id).expect("group stats");
    assert_eq!(group_stats.successful, 3);
    assert_eq!(group_stats.pending, 0);
    assert_eq!(
        get_sync_group(&conn, group_id).expect("query").expect("group").status,
        SyncGroupStatus::Completed
    );

    // Submissions target the other talk, so they have no signup row yet.
    let after = get_cross_table_stats(&conn).expect("stats");
    assert_eq!(after.processed_emails.orphaned, 3);
    assert_eq!(after.signups.total, 5);

    // Once the confirmed export is re-imported, the rows reconcile.
    let confirmed = fixture_confirmation(&conn);
    assert_eq!(confirmed, 3);
    let reconciled = get_cross_table_stats(&conn).expect("stats");
    assert_eq!(reconciled.processed_emails.orphaned, 0);
    assert_eq!(reconciled.signups.processed, 3);
}

/// Re-import the talks' exports as if the submissions had been confirmed.
fn fixture_confirmation(conn: &Connection) -> usize {
    let mut added = 0;
    for (email, title, url) in [
        ("dave@example.com", "Rust in Production", "https://events/rust"),
        ("alice@example.com", "SQLite Internals", "https://events/sqlite"),
        ("bob@example.com", "SQLite Internals", "https://events/sqlite"),
    ] {
        added += conn
            .execute(
                "INSERT INTO signups (email, talk_title, talk_url, source, created_at, imported_at_us)
                 VALUES (?1, ?2, ?3, 'confirm', '2024-05-02', 1)",
                params![email, title, url],
            )
            .expect("insert confirmation");
    }
    added
}

#[test]
fn duplicate_group_is_rejected_in_either_order() {
    let (_dir, conn) = fixture();
    let id = create_sync_group(
        &conn,
        "Rust in Production",
        "https://events/rust",
        "SQLite Internals",
        "https://events/sqlite",
    )
    .expect("create");

    let err = create_sync_group(
        &conn,
        "SQLite Internals",
        "https://events/sqlite",
        "Rust in Production",
        "https://events/rust",
    )
    .expect_err("reversed pair must be rejected");
    assert!(matches!(err, SyncGroupError::Duplicate { existing_id, .. } if existing_id == id));
}

#[test]
fn export_writes_every_signup_for_a_talk() {
    let (dir, conn) = fixture();
    let records = get_signups_for_talk(&conn, "SQLite Internals").expect("signups");
    let out_path = dir.path().join("sqlite-export.csv");
    let file = fs::File::create(&out_path).expect("create export");
    assert_eq!(write_talk_csv(file, &records).expect("export"), 2);

    let reparsed = read_signups_csv(&out_path).expect("reparse");
    let mut emails: Vec<_> = reparsed.signups.iter().map(|s| s.email.as_str()).collect();
    emails.sort_unstable();
    assert_eq!(emails, vec!["carol@example.com", "dave@example.com"]);
}

#[test]
fn store_survives_reopen_and_dedup_then_reset() {
    let (dir, conn) = fixture();
    let db_path = dir.path().join(".talkbridge/talkbridge.db");
    for (at, success) in [(10_i64, true), (20, false), (30, false)] {
        conn.execute(
            "INSERT INTO processed_emails (email, target_url, talk_title, processed_at_us, success)
             VALUES ('alice@example.com', 'https://events/sqlite', 'SQLite Internals', ?1, ?2)",
            params![at, success],
        )
        .expect("legacy insert");
    }
    drop(conn);

    let mut conn = open_store(&db_path).expect("reopen store");
    let report = deduplicate_processing_records(&mut conn).expect("dedup");
    assert_eq!(report.duplicate_sets_found, 1);
    assert_eq!(report.rows_removed, 2);
    assert!(is_processed(&conn, "alice@example.com", "https://events/sqlite").expect("query"));
    assert!(get_unprocessed_emails(&conn, None).expect("query").is_empty());

    let reset = reset_store(&mut conn).expect("reset");
    assert_eq!(reset.signups, 5);
    assert_eq!(reset.processed_emails, 1);
    assert_eq!(get_stats(&conn).expect("stats").total, 0);
    assert!(get_all_talks(&conn).expect("talks").is_empty());
}
