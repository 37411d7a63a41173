//! `tb dedup`: collapse duplicate ledger rows.


use clap::Args;
use serde::Serialize;
use talkbridge_core::dedup::{DedupReport, DuplicateSet, deduplicate_processing_records, find_duplicate_sets};

use super::CmdContext;
use crate::output::render;

/// Arguments for `tb dedup`.
#[derive(Args, Debug, Default)]
pub struct DedupArgs {
    /// List duplicate sets without deleting anything.
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Debug, Serialize)]
struct DedupPreview {
    duplicate_sets_found: usize,
    rows_to_remove: usize,
    sets: Vec<DuplicateSet>,
}

/// Execute `tb dedup`.
pub fn run_dedup(args: &DedupArgs, ctx: &CmdContext) -> anyhow::Result<()> {
    let mut conn = ctx.open_store()?;

    if args.dry_run {
        let sets = find_duplicate_sets(&conn)?;
        let preview = DedupPreview {
            duplicate_sets_found: sets.len(),
            rows_to_remove: sets.iter().map(|set| set.rows.saturating_sub(1)).sum(),
            sets,
        };
        return render(ctx.output, &preview, |preview, w| {
            for set in &preview.sets {
                writeln!(
                    w,
                    "{} -> {}: {} rows, keeping #{}",
                    set.email, set.target_url, set.rows, set.keep_id
                )?;
            }
            writeln!(
                w,
                "Would remove {} rows across {} duplicate sets",
                preview.rows_to_remove, preview.duplicate_sets_found
            )
        });
    }

    let report: DedupReport = deduplicate_processing_records(&mut conn)?;
    render(ctx.output, &report, |report, w| {
        writeln!(
            w,
            "Removed {} rows across {} duplicate sets",
            report.rows_removed, report.duplicate_sets_found
        )
    })
}
