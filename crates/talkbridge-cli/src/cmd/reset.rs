//! `tb reset`: wipe the store or requeue dry-run rows.


use clap::Args;
use serde::Serialize;
use talkbridge_core::db::reset_store;
use talkbridge_core::error::ErrorCode;
use talkbridge_core::ledger::reset_dry_runs;

use super::CmdContext;
use crate::output::{fail, render};

/// Arguments for `tb reset`.
#[derive(Args, Debug, Default)]
pub struct ResetArgs {
    /// Confirm deleting every signup, sync group, and ledger row.
    #[arg(long, short = 'y')]
    pub yes: bool,

    /// Only return dry-run ledger rows to pending.
    #[arg(long, conflicts_with = "yes")]
    pub dry_runs_only: bool,
}

#[derive(Debug, Serialize)]
struct RequeueResult {
    requeued: usize,
}

/// Execute `tb reset`.
pub fn run_reset(args: &ResetArgs, ctx: &CmdContext) -> anyhow::Result<()> {
    if args.dry_runs_only {
        let conn = ctx.open_store()?;
        let result = RequeueResult {
            requeued: reset_dry_runs(&conn)?,
        };
        return render(ctx.output, &result, |result, w| {
            writeln!(w, "Returned {} dry-run rows to pending", result.requeued)
        });
    }

    if !args.yes {
        return Err(fail(
            ctx.output,
            ErrorCode::ConfirmationRequired,
            format!("refusing to wipe {} without --yes", ctx.db_path.display()),
        ));
    }

    let mut conn = ctx.open_store()?;
    let report = reset_store(&mut conn)?;
    render(ctx.output, &report, |report, w| {
        writeln!(
            w,
            "Deleted {} signups, {} sync groups, {} ledger rows",
            report.signups, report.sync_groups, report.processed_emails
        )
    })
}
