//! E2E tests for the operator workflow:
//! `tb import`, `tb talks`, `tb group`, `tb seed`, `tb run`, `tb stats`.

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

// ---------------------------------------------------------------------------
// Test harness helpers
// ---------------------------------------------------------------------------

fn tb_cmd(dir: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("tb"));
    cmd.current_dir(dir);
    cmd.env("TALKBRIDGE_LOG", "error");
    cmd.env("TALKBRIDGE_USER_CONFIG", dir.join("no-user-config.toml"));
    cmd.env_remove("TALKBRIDGE_DB");
    cmd.env_remove("TALKBRIDGE_FORMAT");
    cmd
}

fn tb_json(dir: &Path, args: &[&str]) -> Value {
    let output = tb_cmd(dir)
        .args(args)
        .arg("--json")
        .output()
        .expect("tb should not crash");
    assert!(
        output.status.success(),
        "tb {args:?} failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).expect("valid JSON on stdout")
}

fn write_config(dir: &Path, body: &str) {
    let state = dir.join(".talkbridge");
    fs::create_dir_all(&state).expect("create state dir");
    fs::write(state.join("config.toml"), body).expect("write config");
}

/// Talk A: alice, bob, carol. Talk B: carol, dave.
fn write_exports(dir: &Path) {
    let exports = dir.join("exports");
    fs::create_dir_all(&exports).expect("create exports dir");
    fs::write(
        exports.join("a.csv"),
        "email,talk_title,talk_url,source,created_at\n\
         alice@example.com,Talk A,https://events/a,meetup,2024-05-01\n\
         bob@example.com,Talk A,https://events/a,meetup,2024-05-02\n\
         carol@example.com,Talk A,https://events/a,meetup,2024-05-03\n",
    )
    .expect("write a.csv");
    fs::write(
        exports.join("b.csv"),
        "email,talk_title,talk_url,source,created_at\n\
         carol@example.com,Talk B,https://events/b,newsletter,2024-05-01\n\
         dave@example.com,Talk B,https://events/b,newsletter,2024-05-02\n",
    )
    .expect("write b.csv");
}

/// Import both exports, pair the talks, and seed the group. Returns the group id.
fn seeded_project(dir: &Path) -> i64 {
    write_exports(dir);
    tb_cmd(dir).args(["import", "exports"]).assert().success();
    let group = tb_json(dir, &["group", "create", "Talk A", "Talk B"]);
    let id = group["id"].as_i64().expect("group id");
    let seeded = tb_json(dir, &["seed", &id.to_string()]);
    assert_eq!(seeded["inserted"], 3);
    id
}

// ---------------------------------------------------------------------------
// Import and talks
// ---------------------------------------------------------------------------

#[test]
fn import_directory_then_list_talks() {
    let dir = TempDir::new().expect("tempdir");
    write_exports(dir.path());

    let imported = tb_json(dir.path(), &["import", "exports"]);
    assert_eq!(imported["imported"], 5);
    assert_eq!(imported["files"].as_array().expect("files").len(), 2);

    let talks = tb_json(dir.path(), &["talks"]);
    let talks = talks.as_array().expect("array");
    assert_eq!(talks.len(), 2);
    assert_eq!(talks[0]["talk_title"], "Talk A");
    assert_eq!(talks[0]["signup_count"], 3);

    assert!(dir.path().join(".talkbridge/talkbridge.db").exists());
}

#[test]
fn reimport_does_not_duplicate_signups() {
    let dir = TempDir::new().expect("tempdir");
    write_exports(dir.path());
    tb_cmd(dir.path()).args(["import", "exports"]).assert().success();
    tb_cmd(dir.path()).args(["import", "exports/a.csv"]).assert().success();

    let stats = tb_json(dir.path(), &["stats"]);
    assert_eq!(stats["signups"]["total"], 5);
}

#[test]
fn import_missing_path_fails_with_code() {
    let dir = TempDir::new().expect("tempdir");
    tb_cmd(dir.path())
        .args(["import", "nope.csv"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("E1003"));
}

#[test]
fn db_flag_and_env_select_the_store() {
    let dir = TempDir::new().expect("tempdir");
    write_exports(dir.path());

    tb_cmd(dir.path())
        .args(["import", "exports", "--db", "custom/one.db"])
        .assert()
        .success();
    assert!(dir.path().join("custom/one.db").exists());

    let output = tb_cmd(dir.path())
        .env("TALKBRIDGE_DB", dir.path().join("custom/one.db"))
        .args(["talks", "--format", "text"])
        .output()
        .expect("talks");
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("Talk B"));
    assert!(!dir.path().join(".talkbridge/talkbridge.db").exists());
}

// ---------------------------------------------------------------------------
// Sync groups
// ---------------------------------------------------------------------------

#[test]
fn group_create_reports_overlap() {
    let dir = TempDir::new().expect("tempdir");
    write_exports(dir.path());
    tb_cmd(dir.path()).args(["import", "exports"]).assert().success();

    let group = tb_json(dir.path(), &["group", "create", "Talk A", "Talk B"]);
    assert_eq!(group["overlap_count"], 1);
    assert_eq!(group["missing_from_a"], 1);
    assert_eq!(group["missing_from_b"], 2);
    assert_eq!(group["status"], "pending");
    assert_eq!(group["talk_b_url"], "https://events/b");

    let list = tb_json(dir.path(), &["group", "list"]);
    assert_eq!(list.as_array().expect("array").len(), 1);
}

#[test]
fn reversed_duplicate_group_is_rejected() {
    let dir = TempDir::new().expect("tempdir");
    write_exports(dir.path());
    tb_cmd(dir.path()).args(["import", "exports"]).assert().success();
    tb_cmd(dir.path())
        .args(["group", "create", "Talk A", "Talk B"])
        .assert()
        .success();

    tb_cmd(dir.path())
        .args(["group", "create", "Talk B", "Talk A"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("E2003"))
        .stderr(predicate::str::contains("group 1"));
}

#[test]
fn unknown_talk_and_group_fail_with_codes() {
    let dir = TempDir::new().expect("tempdir");
    write_exports(dir.path());
    tb_cmd(dir.path()).args(["import", "exports"]).assert().success();

    tb_cmd(dir.path())
        .args(["group", "create", "Talk A", "Talk Z"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("E2001"));
    tb_cmd(dir.path())
        .args(["group", "create", "Talk A", "Talk A"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("E2004"));
    tb_cmd(dir.path())
        .args(["seed", "42"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("E2002"));
}

#[test]
fn seeding_twice_inserts_nothing_new() {
    let dir = TempDir::new().expect("tempdir");
    let id = seeded_project(dir.path());

    let again = tb_json(dir.path(), &["seed", &id.to_string()]);
    assert_eq!(again["planned"], 3);
    assert_eq!(again["inserted"], 0);

    let show = tb_json(dir.path(), &["group", "show", &id.to_string()]);
    assert_eq!(show["progress"]["pending"], 3);
}

// ---------------------------------------------------------------------------
// Runs
// ---------------------------------------------------------------------------

#[test]
fn dry_run_works_without_actuator_and_can_be_requeued() {
    let dir = TempDir::new().expect("tempdir");
    seeded_project(dir.path());

    let report = tb_json(dir.path(), &["run", "--dry-run", "--delay-ms", "0", "--yes"]);
    assert_eq!(report["summary"]["dry_run"], 3);
    assert_eq!(report["summary"]["succeeded"], 0);

    let stats = tb_json(dir.path(), &["stats"]);
    assert_eq!(stats["dry_run"], 3);
    assert_eq!(stats["processed_emails"]["pending"], 0);

    let requeued = tb_json(dir.path(), &["reset", "--dry-runs-only"]);
    assert_eq!(requeued["requeued"], 3);
    let stats = tb_json(dir.path(), &["stats"]);
    assert_eq!(stats["processed_emails"]["pending"], 3);
}

#[test]
fn live_run_without_actuator_fails() {
    let dir = TempDir::new().expect("tempdir");
    seeded_project(dir.path());

    tb_cmd(dir.path())
        .args(["run", "--yes"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("E4001"));
}

#[cfg(unix)]
#[test]
fn live_run_submits_through_configured_program() {
    let dir = TempDir::new().expect("tempdir");
    write_config(
        dir.path(),
        r#"
[run]
delay_ms = 0

[actuator]
program = "sh"
args = ["-c", "echo \"$TB_EMAIL $TB_TARGET_URL\" >> submitted.log"]
"#,
    );
    let id = seeded_project(dir.path());

    let report = tb_json(dir.path(), &["run", "--yes"]);
    assert_eq!(report["summary"]["succeeded"], 3);
    assert_eq!(report["summary"]["completed_groups"][0], id);

    let log = fs::read_to_string(dir.path().join("submitted.log")).expect("actuator log");
    let mut lines: Vec<_> = log.lines().collect();
    lines.sort_unstable();
    assert_eq!(
        lines,
        vec![
            "alice@example.com https://events/b",
            "bob@example.com https://events/b",
            "dave@example.com https://events/a",
        ]
    );

    let stats = tb_json(dir.path(), &["stats", "--group", &id.to_string()]);
    assert_eq!(stats["stats"]["successful"], 3);
    assert_eq!(stats["sync_group"]["status"], "completed");

    // Nothing left to do on a second run.
    let again = tb_json(dir.path(), &["run", "--yes"]);
    assert_eq!(again["summary"]["pending"], 0);
}

#[cfg(unix)]
#[test]
fn failed_submissions_are_recorded_and_limited() {
    let dir = TempDir::new().expect("tempdir");
    write_config(
        dir.path(),
        r#"
[run]
delay_ms = 0

[actuator]
program = "sh"
args = ["-c", "echo 'form closed' >&2; exit 1"]
"#,
    );
    seeded_project(dir.path());

    let report = tb_json(dir.path(), &["run", "--limit", "2", "--yes"]);
    assert_eq!(report["summary"]["selected"], 2);
    assert_eq!(report["summary"]["failed"], 2);

    let stats = tb_json(dir.path(), &["stats"]);
    assert_eq!(stats["processed_emails"]["failed"], 2);
    assert_eq!(stats["processed_emails"]["pending"], 1);
}

#[test]
fn large_queue_prints_preflight_warning() {
    let dir = TempDir::new().expect("tempdir");
    write_config(
        dir.path(),
        "[run]\npending_warn_threshold = 1\nwarn_pause_secs = 0\ndelay_ms = 0\n",
    );
    seeded_project(dir.path());

    tb_cmd(dir.path())
        .args(["run", "--dry-run", "--json"])
        .assert()
        .success()
        .stderr(predicate::str::contains("3 items pending (threshold 1)"))
        .stdout(predicate::str::contains("\"verdict\": \"warn\""));
}

#[test]
fn group_scoped_run_checks_only_that_group_backlog() {
    let dir = TempDir::new().expect("tempdir");
    write_config(
        dir.path(),
        "[run]\npending_warn_threshold = 1\nwarn_pause_secs = 0\ndelay_ms = 0\n",
    );
    seeded_project(dir.path());
    fs::write(
        dir.path().join("exports/c.csv"),
        "email,talk_title,talk_url,source,created_at\n\
         dave@example.com,Talk C,https://events/c,newsletter,2024-05-04\n",
    )
    .expect("write c.csv");
    tb_cmd(dir.path()).args(["import", "exports"]).assert().success();
    let small = tb_json(dir.path(), &["group", "create", "Talk B", "Talk C"]);
    let small_id = small["id"].as_i64().expect("group id").to_string();
    let seeded = tb_json(dir.path(), &["seed", &small_id]);
    assert_eq!(seeded["inserted"], 1);

    tb_cmd(dir.path())
        .args(["run", "--dry-run", "--group", &small_id, "--json"])
        .assert()
        .success()
        .stderr(predicate::str::contains("warning").not())
        .stdout(predicate::str::contains("\"verdict\": \"clear\""));

    tb_cmd(dir.path())
        .args(["run", "--dry-run", "--group", "1", "--json"])
        .assert()
        .success()
        .stderr(predicate::str::contains("3 items pending (threshold 1)"));
}

#[test]
fn malformed_config_fails_with_code() {
    let dir = TempDir::new().expect("tempdir");
    write_config(dir.path(), "[run\n");
    tb_cmd(dir.path())
        .args(["talks"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("E1002"));
}
