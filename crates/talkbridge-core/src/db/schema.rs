//! Canonical SQLite schema for the talkbridge store.
//!
//! - `signups` holds one row per (email, talk url) imported from CSV exports
//! - `sync_groups` records cross-promotion pairings between two talks
//! - `processed_emails` is the processing ledger, one logical row per
//!   (email, target url)
//! - `store_meta` tracks the applied schema version
//!
//! The ledger has no UNIQUE constraint on (email, target_url):
//! databases written by older insert-only paths can carry duplicates, which
//! the deduplicator collapses. Write paths in [`crate::ledger`] keep the
//! invariant for new rows.

/// Migration v1: the three entity tables plus store metadata.
pub const MIGRATION_V1_SQL: &str = r"
CREATE TABLE IF NOT EXISTS signups (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    email TEXT NOT NULL CHECK (length(trim(email)) > 0),
    talk_title TEXT NOT NULL CHECK (length(trim(talk_title)) > 0),
    talk_url TEXT NOT NULL CHECK (length(trim(talk_url)) > 0),
    source TEXT NOT NULL DEFAULT '',
    created_at TEXT NOT NULL DEFAULT '',
    imported_at_us INTEGER NOT NULL,
    source_file TEXT,
    UNIQUE (email, talk_url)
);

CREATE TABLE IF NOT EXISTS sync_groups (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    created_at_us INTEGER NOT NULL,
    talk_a_title TEXT NOT NULL,
    talk_a_url TEXT NOT NULL,
    talk_b_title TEXT NOT NULL,
    talk_b_url TEXT NOT NULL,
    overlap_count INTEGER NOT NULL DEFAULT 0 CHECK (overlap_count >= 0),
    missing_from_a INTEGER NOT NULL DEFAULT 0 CHECK (missing_from_a >= 0),
    missing_from_b INTEGER NOT NULL DEFAULT 0 CHECK (missing_from_b >= 0),
    status TEXT NOT NULL DEFAULT 'pending'
        CHECK (status IN ('pending', 'in_progress', 'completed')),
    CHECK (talk_a_title <> talk_b_title)
);

CREATE TABLE IF NOT EXISTS processed_emails (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    email TEXT NOT NULL,
    target_url TEXT NOT NULL,
    talk_title TEXT NOT NULL DEFAULT '',
    processed_at_us INTEGER NOT NULL,
    success INTEGER NOT NULL DEFAULT 0 CHECK (success IN (0, 1)),
    error_message TEXT,
    dry_run INTEGER NOT NULL DEFAULT 0 CHECK (dry_run IN (0, 1)),
    sync_group_id INTEGER REFERENCES sync_groups(id) ON DELETE SET NULL
);

CREATE TABLE IF NOT EXISTS store_meta (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    schema_version INTEGER NOT NULL,
    last_reset_at_us INTEGER NOT NULL DEFAULT 0
);

INSERT OR IGNORE INTO store_meta (id, schema_version, last_reset_at_us)
VALUES (1, 1, 0);
";

/// Migration v2: read-path indexes for talk aggregation, ledger lookups, and
/// per-group queues.
pub const MIGRATION_V2_SQL: &str = r"
CREATE INDEX IF NOT EXISTS idx_signups_talk_title
    ON signups(talk_title, created_at DESC);

CREATE INDEX IF NOT EXISTS idx_signups_talk_url
    ON signups(talk_url, email);

CREATE INDEX IF NOT EXISTS idx_processed_email_target
    ON processed_emails(email, target_url);

CREATE INDEX IF NOT EXISTS idx_processed_group_state
    ON processed_emails(sync_group_id, success, dry_run);

CREATE INDEX IF NOT EXISTS idx_sync_groups_titles
    ON sync_groups(talk_a_title, talk_b_title);
";

/// Indexes that must exist after all migrations.
pub const REQUIRED_INDEXES: &[&str] = &[
    "idx_signups_talk_title",
    "idx_signups_talk_url",
    "idx_processed_email_target",
    "idx_processed_group_state",
    "idx_sync_groups_titles",
];

/// Tables that must exist after all migrations.
pub const REQUIRED_TABLES: &[&str] = &["signups", "sync_groups", "processed_emails", "store_meta"];
