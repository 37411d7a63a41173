//! `tb run`: submit pending work items through the configured actuator.

use std::io::Write;
use std::time::Duration;

use clap::Args;
use serde::Serialize;
use talkbridge_core::actuate::{
    ActuationError, Actuator, CommandActuator, RunError, RunOptions, RunSummary, run_pending,
};
use talkbridge_core::error::ErrorCode;
use talkbridge_core::ledger::{WorkItem, get_sync_group_stats};
use talkbridge_core::reconcile::{
    CrossTableStats, Preflight, get_cross_table_stats, preflight, preflight_pending,
};

use super::CmdContext;
use crate::output::{fail, pretty_kv, pretty_section, render};

/// Arguments for `tb run`.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Record dry-run rows instead of submitting.
    #[arg(long)]
    pub dry_run: bool,

    /// Process at most this many items.
    #[arg(long, value_name = "N")]
    pub limit: Option<usize>,

    /// Milliseconds to wait between items (default from config).
    #[arg(long, value_name = "MS")]
    pub delay_ms: Option<u64>,

    /// Only process items seeded for this sync group.
    #[arg(long, value_name = "ID")]
    pub group: Option<i64>,

    /// Do not pause when the pending queue is unusually large.
    #[arg(long, short = 'y')]
    pub yes: bool,
}

/// Stand-in used for dry runs when no actuator program is configured.
struct NoActuator;

impl Actuator for NoActuator {
    fn submit(&mut self, _item: &WorkItem) -> Result<(), ActuationError> {
        Err(ActuationError::Failed("no actuator configured".to_string()))
    }
}

#[derive(Debug, Serialize)]
struct RunReport {
    dry_run: bool,
    preflight: Preflight,
    summary: RunSummary,
    after: CrossTableStats,
}

/// Execute `tb run`.
pub fn run_run(args: &RunArgs, ctx: &CmdContext) -> anyhow::Result<()> {
    let conn = ctx.open_store()?;
    if let Some(id) = args.group {
        ctx.require_group(&conn, id)?;
    }

    let mut actuator: Box<dyn Actuator> = match CommandActuator::from_settings(&ctx.config.actuator)
    {
        Some(actuator) => Box::new(actuator),
        None if args.dry_run => Box::new(NoActuator),
        None => {
            return Err(fail(
                ctx.output,
                ErrorCode::ActuatorNotConfigured,
                "no actuator program configured",
            ));
        }
    };

    let threshold = ctx.config.run.pending_warn_threshold;
    let verdict = match args.group {
        Some(id) => preflight_pending(get_sync_group_stats(&conn, id)?.pending, threshold),
        None => preflight(&get_cross_table_stats(&conn)?, threshold),
    };
    if let Preflight::Warn { pending, threshold } = verdict {
        tracing::warn!(pending, threshold, "pending queue above threshold");
        let pause = ctx.config.run.warn_pause();
        if args.yes || pause.is_zero() {
            eprintln!("warning: {pending} items pending (threshold {threshold})");
        } else {
            eprintln!(
                "warning: {pending} items pending (threshold {threshold}); \
                 continuing in {}s, press Ctrl-C to abort",
                pause.as_secs()
            );
            std::thread::sleep(pause);
        }
    }

    let options = RunOptions {
        dry_run: args.dry_run,
        limit: args.limit,
        delay: args
            .delay_ms
            .map_or_else(|| ctx.config.run.delay(), Duration::from_millis),
        sync_group_id: args.group,
    };

    let summary = match run_pending(&conn, actuator.as_mut(), &options) {
        Ok(summary) => summary,
        Err(RunError::Storage(err)) => return Err(err),
        Err(err @ RunError::Actuator(_)) => {
            let code = err.code().unwrap_or(ErrorCode::InternalUnexpected);
            return Err(fail(ctx.output, code, err.to_string()));
        }
    };

    let report = RunReport {
        dry_run: args.dry_run,
        preflight: verdict,
        summary,
        after: get_cross_table_stats(&conn)?,
    };
    render(ctx.output, &report, |report, w| render_run_human(report, w))
}

fn render_run_human(report: &RunReport, w: &mut dyn Write) -> std::io::Result<()> {
    let s = &report.summary;
    let heading = if report.dry_run { "Run (dry run)" } else { "Run" };
    pretty_section(w, heading)?;
    pretty_kv(w, "pending", s.pending.to_string())?;
    pretty_kv(w, "selected", s.selected.to_string())?;
    if report.dry_run {
        pretty_kv(w, "dry run", s.dry_run.to_string())?;
    } else {
        pretty_kv(w, "succeeded", s.succeeded.to_string())?;
        pretty_kv(w, "failed", s.failed.to_string())?;
    }
    if s.skipped > 0 {
        pretty_kv(w, "skipped", s.skipped.to_string())?;
    }
    if s.ledger_write_failures > 0 {
        pretty_kv(w, "ledger errors", s.ledger_write_failures.to_string())?;
    }
    for id in &s.completed_groups {
        writeln!(w, "Sync group {id} completed")?;
    }
    pretty_kv(w, "still pending", report.after.processed_emails.pending.to_string())?;
    pretty_kv(w, "still failed", report.after.processed_emails.failed.to_string())
}
