//! `tb export`: write one talk's signups as CSV.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use anyhow::Context;
use clap::Args;
use serde::Serialize;
use talkbridge_core::csv_io::write_talk_csv;
use talkbridge_core::error::ErrorCode;
use talkbridge_core::signups::{find_talk, get_signups_for_talk};

use super::CmdContext;
use crate::output::{fail, render};

/// Arguments for `tb export`.
#[derive(Args, Debug)]
pub struct ExportArgs {
    /// Talk title, exactly as listed by `tb talks`.
    pub title: String,

    /// Write to this file instead of stdout.
    #[arg(short, long, value_name = "PATH")]
    pub output: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
struct ExportResult {
    talk_title: String,
    rows: usize,
    path: String,
}

/// Execute `tb export`.
///
/// Without `--output` the CSV itself is the command's output, whatever the
/// output mode.
pub fn run_export(args: &ExportArgs, ctx: &CmdContext) -> anyhow::Result<()> {
    let conn = ctx.open_store()?;
    let title = args.title.trim();
    if find_talk(&conn, title)?.is_none() {
        return Err(fail(
            ctx.output,
            ErrorCode::TalkNotFound,
            format!("talk '{title}' not found"),
        ));
    }
    let records = get_signups_for_talk(&conn, title)?;

    let Some(path) = &args.output else {
        let stdout = io::stdout();
        write_talk_csv(stdout.lock(), &records)?;
        return Ok(());
    };

    let file = File::create(path).with_context(|| format!("create {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    let rows = write_talk_csv(&mut writer, &records)?;
    writer
        .flush()
        .with_context(|| format!("flush {}", path.display()))?;
    tracing::info!(talk = %title, rows, path = %path.display(), "talk exported");

    let result = ExportResult {
        talk_title: title.to_string(),
        rows,
        path: path.display().to_string(),
    };
    render(ctx.output, &result, |result, w| {
        writeln!(
            w,
            "Exported {} signups for '{}' to {}",
            result.rows, result.talk_title, result.path
        )
    })
}
