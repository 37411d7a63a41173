//! `tb import`: load signup CSV exports into the store.

use std::io::Write;
use std::path::PathBuf;

use clap::Args;
use serde::Serialize;
use talkbridge_core::csv_io::{collect_csv_paths, read_signups_csv};
use talkbridge_core::error::ErrorCode;
use talkbridge_core::signups::{ImportReport, import_signups};

use super::CmdContext;
use crate::output::{OutputMode, fail, pretty_kv, pretty_section, render};

/// Arguments for `tb import`.
#[derive(Args, Debug)]
pub struct ImportArgs {
    /// CSV files, or directories whose `*.csv` files are imported in name order.
    #[arg(required = true, value_name = "PATH")]
    pub paths: Vec<PathBuf>,
}

#[derive(Debug, Serialize)]
struct FileImport {
    path: String,
    imported: usize,
    skipped: usize,
    malformed: usize,
}

#[derive(Debug, Serialize)]
struct ImportResult {
    files: Vec<FileImport>,
    imported: usize,
    skipped: usize,
    malformed: usize,
}

/// Execute `tb import`.
pub fn run_import(args: &ImportArgs, ctx: &CmdContext) -> anyhow::Result<()> {
    let paths = collect_csv_paths(&args.paths)
        .map_err(|err| fail(ctx.output, ErrorCode::CsvReadFailed, format!("{err:#}")))?;
    let mut conn = ctx.open_store()?;

    let mut files = Vec::with_capacity(paths.len());
    let mut total = ImportReport::default();
    let mut malformed = 0;
    for path in &paths {
        let parsed = read_signups_csv(path)
            .map_err(|err| fail(ctx.output, ErrorCode::CsvReadFailed, format!("{err:#}")))?;
        let report = import_signups(&mut conn, &parsed.signups)?;
        tracing::info!(
            file = %path.display(),
            imported = report.imported,
            skipped = report.skipped,
            malformed = parsed.malformed,
            "csv imported"
        );
        total.absorb(report);
        malformed += parsed.malformed;
        files.push(FileImport {
            path: path.display().to_string(),
            imported: report.imported,
            skipped: report.skipped,
            malformed: parsed.malformed,
        });
    }

    let result = ImportResult {
        files,
        imported: total.imported,
        skipped: total.skipped,
        malformed,
    };
    let mode = ctx.output;
    render(mode, &result, |result, w| render_import_human(result, mode, w))
}

fn render_import_human(
    result: &ImportResult,
    mode: OutputMode,
    w: &mut dyn Write,
) -> std::io::Result<()> {
    if mode.is_pretty() {
        pretty_section(w, "Import")?;
        for file in &result.files {
            writeln!(
                w,
                "  {}  imported {}, skipped {}, malformed {}",
                file.path, file.imported, file.skipped, file.malformed
            )?;
        }
        pretty_kv(w, "files", result.files.len().to_string())?;
        pretty_kv(w, "imported", result.imported.to_string())?;
        pretty_kv(w, "skipped", result.skipped.to_string())?;
        pretty_kv(w, "malformed", result.malformed.to_string())?;
    } else {
        for file in &result.files {
            writeln!(
                w,
                "{}\t{}\t{}\t{}",
                file.path, file.imported, file.skipped, file.malformed
            )?;
        }
    }
    Ok(())
}
