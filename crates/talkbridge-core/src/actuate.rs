//! Actuation: drain pending work items through an external actuator.
//!
//! The actuator is whatever performs the outbound submission (in practice a
//! browser-automation program). It only sees [`WorkItem`] values; every
//! outcome is written back through [`mark_as_processed`].

use std::collections::BTreeSet;
use std::process::{Command, Stdio};
use std::time::Duration;

use anyhow::Result;
use rand::Rng;
use rand::seq::SliceRandom;
use rusqlite::Connection;
use serde::Serialize;
use thiserror::Error;

use crate::config::ActuatorSettings;
use crate::error::ErrorCode;
use crate::ledger::{
    ProcessingOutcome, WorkItem, get_unprocessed_emails, has_unsubmitted_items, is_processed,
    mark_as_processed,
};
use crate::sync_group::{SyncGroupStatus, get_sync_group, set_status};

/// Longest actuator error message kept in the ledger.
const MAX_ERROR_MESSAGE_CHARS: usize = 1_000;

/// Failure reported by an [`Actuator`].
#[derive(Debug, Error)]
pub enum ActuationError {
    /// The submission ran and failed. Recorded in the ledger; the run goes on.
    #[error("{0}")]
    Failed(String),

    /// The actuator itself could not run. Aborts the run; the item stays
    /// pending.
    #[error("failed to start actuator `{program}`: {source}")]
    Unavailable {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

impl ActuationError {
    #[must_use]
    pub const fn code(&self) -> Option<ErrorCode> {
        match self {
            Self::Failed(_) => None,
            Self::Unavailable { .. } => Some(ErrorCode::ActuatorSpawnFailed),
        }
    }
}

/// Performs one outbound submission.
pub trait Actuator {
    /// Submit `item.email` to the form at `item.target_url`.
    ///
    /// # Errors
    ///
    /// [`ActuationError::Failed`] when the submission was attempted and did
    /// not succeed; [`ActuationError::Unavailable`] when it could not be
    /// attempted at all.
    fn submit(&mut self, item: &WorkItem) -> Result<(), ActuationError>;
}

/// Runs a configured program once per item.
///
/// The item is passed through `TB_EMAIL`, `TB_TARGET_URL`, `TB_TALK_TITLE`
/// and (when set) `TB_SYNC_GROUP_ID`. The rest of the environment is
/// inherited, which is how the program receives its own credentials. Exit
/// status 0 is success; otherwise trimmed stderr becomes the error message.
#[derive(Debug, Clone)]
pub struct CommandActuator {
    program: String,
    args: Vec<String>,
}

impl CommandActuator {
    #[must_use]
    pub const fn new(program: String, args: Vec<String>) -> Self {
        Self { program, args }
    }

    /// `None` when no program is configured.
    #[must_use]
    pub fn from_settings(settings: &ActuatorSettings) -> Option<Self> {
        settings
            .program
            .as_ref()
            .map(|program| Self::new(program.clone(), settings.args.clone()))
    }

    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }
}

impl Actuator for CommandActuator {
    fn submit(&mut self, item: &WorkItem) -> Result<(), ActuationError> {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .env("TB_EMAIL", &item.email)
            .env("TB_TARGET_URL", &item.target_url)
            .env("TB_TALK_TITLE", &item.talk_title)
            .stdin(Stdio::null());
        match item.sync_group_id {
            Some(id) => command.env("TB_SYNC_GROUP_ID", id.to_string()),
            None => command.env_remove("TB_SYNC_GROUP_ID"),
        };

        let output = command.output().map_err(|source| ActuationError::Unavailable {
            program: self.program.clone(),
            source,
        })?;

        if output.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        let stderr = stderr.trim();
        let message = if stderr.is_empty() {
            format!("actuator exited with {}", output.status)
        } else {
            truncate_message(stderr)
        };
        Err(ActuationError::Failed(message))
    }
}

fn truncate_message(message: &str) -> String {
    if message.chars().count() <= MAX_ERROR_MESSAGE_CHARS {
        return message.to_string();
    }
    let mut truncated: String = message.chars().take(MAX_ERROR_MESSAGE_CHARS).collect();
    truncated.push_str("...");
    truncated
}

/// Knobs for [`run_pending`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Record dry-run rows instead of calling the actuator.
    pub dry_run: bool,
    /// Process at most this many items.
    pub limit: Option<usize>,
    /// Pause between consecutive items.
    pub delay: Duration,
    /// Only process items seeded for this group.
    pub sync_group_id: Option<i64>,
}

/// What a run did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    /// Unprocessed items found before shuffling and limiting.
    pub pending: usize,
    /// Items selected for this run after `limit`.
    pub selected: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub dry_run: usize,
    /// Items that turned processed between loading and their turn.
    pub skipped: usize,
    /// Outcomes the ledger failed to record (already logged).
    pub ledger_write_failures: usize,
    /// Groups left with every item submitted live after this run.
    pub completed_groups: Vec<i64>,
}

/// Drain pending work through `actuator` using the thread-local RNG for the
/// shuffle.
///
/// # Errors
///
/// See [`run_pending_with_rng`].
pub fn run_pending<A: Actuator + ?Sized>(
    conn: &Connection,
    actuator: &mut A,
    options: &RunOptions,
) -> Result<RunSummary, RunError> {
    run_pending_with_rng(conn, actuator, options, &mut rand::thread_rng())
}

/// Error that stops a run before the queue is exhausted.
#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Actuator(ActuationError),

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl RunError {
    #[must_use]
    pub const fn code(&self) -> Option<ErrorCode> {
        match self {
            Self::Actuator(err) => err.code(),
            Self::Storage(_) => None,
        }
    }
}

/// Drain pending work through `actuator`.
///
/// Items are loaded (optionally scoped to one group), shuffled, truncated to
/// `limit`, then processed one at a time with `delay` between them. An item
/// that became processed since loading is skipped. In a live run each group
/// touched is marked `in_progress` first and `completed` once every item
/// seeded for it has a live success; a dry-run row still holds the group
/// open. Ledger write failures are counted and never stop the loop.
///
/// # Errors
///
/// [`RunError::Storage`] if the pending queue cannot be loaded;
/// [`RunError::Actuator`] if the actuator cannot run at all.
pub fn run_pending_with_rng<A: Actuator + ?Sized, R: Rng + ?Sized>(
    conn: &Connection,
    actuator: &mut A,
    options: &RunOptions,
    rng: &mut R,
) -> Result<RunSummary, RunError> {
    let mut items = get_unprocessed_emails(conn, options.sync_group_id)?;
    let mut summary = RunSummary {
        pending: items.len(),
        ..RunSummary::default()
    };

    items.shuffle(rng);
    if let Some(limit) = options.limit {
        items.truncate(limit);
    }
    summary.selected = items.len();

    let groups: BTreeSet<i64> = items.iter().filter_map(|item| item.sync_group_id).collect();
    if !options.dry_run {
        for &group_id in &groups {
            mark_group_in_progress(conn, group_id);
        }
    }

    tracing::info!(
        pending = summary.pending,
        selected = summary.selected,
        dry_run = options.dry_run,
        sync_group_id = ?options.sync_group_id,
        "run starting"
    );

    for (index, item) in items.iter().enumerate() {
        if index > 0 && !options.delay.is_zero() {
            std::thread::sleep(options.delay);
        }

        match is_processed(conn, &item.email, &item.target_url) {
            Ok(false) => {}
            Ok(true) => {
                summary.skipped += 1;
                tracing::debug!(email = %item.email, target_url = %item.target_url, "already processed");
                continue;
            }
            Err(err) => {
                summary.skipped += 1;
                tracing::warn!(
                    email = %item.email,
                    target_url = %item.target_url,
                    error = %format!("{err:#}"),
                    "could not check ledger; skipping item"
                );
                continue;
            }
        }

        let outcome = if options.dry_run {
            summary.dry_run += 1;
            tracing::info!(email = %item.email, target_url = %item.target_url, "dry run");
            ProcessingOutcome::dry_run(item)
        } else {
            match actuator.submit(item) {
                Ok(()) => {
                    summary.succeeded += 1;
                    tracing::info!(email = %item.email, target_url = %item.target_url, "submitted");
                    ProcessingOutcome::succeeded(item)
                }
                Err(ActuationError::Failed(message)) => {
                    summary.failed += 1;
                    tracing::warn!(
                        email = %item.email,
                        target_url = %item.target_url,
                        error = %message,
                        "submission failed"
                    );
                    ProcessingOutcome::failed(item, message)
                }
                Err(err @ ActuationError::Unavailable { .. }) => {
                    tracing::error!(error = %err, "actuator unavailable; stopping run");
                    return Err(RunError::Actuator(err));
                }
            }
        };

        if !mark_as_processed(conn, &outcome) {
            summary.ledger_write_failures += 1;
        }
    }

    if !options.dry_run {
        for &group_id in &groups {
            if complete_group_if_drained(conn, group_id) {
                summary.completed_groups.push(group_id);
            }
        }
    }

    tracing::info!(
        succeeded = summary.succeeded,
        failed = summary.failed,
        dry_run = summary.dry_run,
        skipped = summary.skipped,
        ledger_write_failures = summary.ledger_write_failures,
        "run finished"
    );
    Ok(summary)
}

fn mark_group_in_progress(conn: &Connection, group_id: i64) {
    let result = get_sync_group(conn, group_id).and_then(|group| match group {
        Some(group) if group.status == SyncGroupStatus::Pending => {
            set_status(conn, group_id, SyncGroupStatus::InProgress).map(|_| ())
        }
        _ => Ok(()),
    });
    if let Err(err) = result {
        tracing::warn!(sync_group_id = group_id, error = %format!("{err:#}"), "could not mark group in progress");
    }
}

fn complete_group_if_drained(conn: &Connection, group_id: i64) -> bool {
    let result = has_unsubmitted_items(conn, group_id).and_then(|outstanding| {
        if outstanding {
            Ok(false)
        } else {
            set_status(conn, group_id, SyncGroupStatus::Completed)
        }
    });
    match result {
        Ok(completed) => completed,
        Err(err) => {
            tracing::warn!(sync_group_id = group_id, error = %format!("{err:#}"), "could not complete group");
            false
        }
    }
}
