//! `tb seed`: queue pending work items for a sync group.


use clap::Args;
use serde::Serialize;
use talkbridge_core::ledger::bulk_seed_pending;
use talkbridge_core::sync_group::plan_work_items;

use super::CmdContext;
use crate::output::render;

/// Arguments for `tb seed`.
#[derive(Args, Debug)]
pub struct SeedArgs {
    /// Sync group id.
    pub group_id: i64,
}

#[derive(Debug, Serialize)]
struct SeedResult {
    sync_group_id: i64,
    /// Items the group's signup lists call for.
    planned: usize,
    /// Items newly queued; the rest already had a ledger row.
    inserted: usize,
}

/// Execute `tb seed`.
pub fn run_seed(args: &SeedArgs, ctx: &CmdContext) -> anyhow::Result<()> {
    let mut conn = ctx.open_store()?;
    let group = ctx.require_group(&conn, args.group_id)?;
    let items = plan_work_items(&conn, &group)?;
    let inserted = bulk_seed_pending(&mut conn, &items, group.id)?;

    let result = SeedResult {
        sync_group_id: group.id,
        planned: items.len(),
        inserted,
    };
    render(ctx.output, &result, |result, w| {
        writeln!(
            w,
            "Seeded {} of {} work items for sync group {}",
            result.inserted, result.planned, result.sync_group_id
        )
    })
}
