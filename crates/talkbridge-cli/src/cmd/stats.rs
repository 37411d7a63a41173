//! `tb stats`: reconciliation and progress reporting.

use std::io::Write;

use clap::Args;
use serde::Serialize;
use talkbridge_core::ledger::{GroupStats, LedgerStats, get_stats, get_sync_group_stats};
use talkbridge_core::reconcile::{CrossTableStats, get_cross_table_stats};
use talkbridge_core::signups::get_all_talks;
use talkbridge_core::sync_group::{SyncGroup, get_sync_groups};

use super::CmdContext;
use crate::output::{OutputMode, pretty_kv, pretty_section, render};

/// Arguments for `tb stats`.
#[derive(Args, Debug, Default)]
pub struct StatsArgs {
    /// Show one sync group's ledger progress instead.
    #[arg(long, value_name = "ID")]
    pub group: Option<i64>,
}

#[derive(Debug, Serialize)]
struct StoreStats {
    talks: usize,
    sync_groups: usize,
    #[serde(flatten)]
    reconciliation: CrossTableStats,
    /// Dry-run rows awaiting `tb reset --dry-runs-only`.
    dry_run: usize,
}

#[derive(Debug, Serialize)]
struct GroupReport {
    sync_group: SyncGroup,
    stats: GroupStats,
}

/// Execute `tb stats`.
pub fn run_stats(args: &StatsArgs, ctx: &CmdContext) -> anyhow::Result<()> {
    let conn = ctx.open_store()?;
    let mode = ctx.output;

    if let Some(id) = args.group {
        let sync_group = ctx.require_group(&conn, id)?;
        let stats = get_sync_group_stats(&conn, id)?;
        let report = GroupReport { sync_group, stats };
        return render(mode, &report, |report, w| render_group_human(report, mode, w));
    }

    let ledger: LedgerStats = get_stats(&conn)?;
    let report = StoreStats {
        talks: get_all_talks(&conn)?.len(),
        sync_groups: get_sync_groups(&conn)?.len(),
        reconciliation: get_cross_table_stats(&conn)?,
        dry_run: ledger.dry_run,
    };
    render(mode, &report, |report, w| render_store_human(report, mode, w))
}

fn render_store_human(report: &StoreStats, mode: OutputMode, w: &mut dyn Write) -> std::io::Result<()> {
    let signups = &report.reconciliation.signups;
    let ledger = &report.reconciliation.processed_emails;

    if !mode.is_pretty() {
        writeln!(w, "talks\t{}", report.talks)?;
        writeln!(w, "sync_groups\t{}", report.sync_groups)?;
        writeln!(w, "signups.total\t{}", signups.total)?;
        writeln!(w, "signups.processed\t{}", signups.processed)?;
        writeln!(w, "signups.unprocessed\t{}", signups.unprocessed)?;
        writeln!(w, "processed_emails.total\t{}", ledger.total)?;
        writeln!(w, "processed_emails.successful\t{}", ledger.successful)?;
        writeln!(w, "processed_emails.failed\t{}", ledger.failed)?;
        writeln!(w, "processed_emails.pending\t{}", ledger.pending)?;
        writeln!(w, "processed_emails.dry_run\t{}", report.dry_run)?;
        return writeln!(w, "processed_emails.orphaned\t{}", ledger.orphaned);
    }

    pretty_section(w, "Signups")?;
    pretty_kv(w, "talks", report.talks.to_string())?;
    pretty_kv(w, "total", signups.total.to_string())?;
    pretty_kv(w, "processed", signups.processed.to_string())?;
    pretty_kv(w, "unprocessed", signups.unprocessed.to_string())?;
    writeln!(w)?;
    pretty_section(w, "Ledger")?;
    pretty_kv(w, "sync groups", report.sync_groups.to_string())?;
    pretty_kv(w, "total", ledger.total.to_string())?;
    pretty_kv(w, "successful", ledger.successful.to_string())?;
    pretty_kv(w, "failed", ledger.failed.to_string())?;
    pretty_kv(w, "pending", ledger.pending.to_string())?;
    pretty_kv(w, "dry run", report.dry_run.to_string())?;
    pretty_kv(w, "orphaned", ledger.orphaned.to_string())
}

fn render_group_human(report: &GroupReport, mode: OutputMode, w: &mut dyn Write) -> std::io::Result<()> {
    let g = &report.sync_group;
    let s = &report.stats;
    if !mode.is_pretty() {
        return writeln!(
            w,
            "{}\t{}\t{}\t{}\t{}\t{}",
            g.id, g.status, s.total, s.successful, s.failed, s.pending
        );
    }

    pretty_section(w, &format!("Sync group {}: {} <-> {}", g.id, g.talk_a_title, g.talk_b_title))?;
    pretty_kv(w, "status", g.status.as_str())?;
    pretty_kv(w, "total", s.total.to_string())?;
    pretty_kv(w, "successful", s.successful.to_string())?;
    pretty_kv(w, "failed", s.failed.to_string())?;
    pretty_kv(w, "pending", s.pending.to_string())
}
