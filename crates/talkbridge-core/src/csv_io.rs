//! CSV interchange: parse signup exports and write per-talk exports.
//!
//! Import columns: `email, talk_title, talk_url, source, created_at` plus an
//! optional `csv_filename`. Export columns: `email, talk_title, talk_url,
//! source, created_at, imported_at`, where `imported_at` is RFC 3339.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::signups::{NewSignup, SignupRecord};

/// One row of an import CSV.
#[derive(Debug, Clone, Deserialize)]
struct ImportRow {
    email: String,
    talk_title: String,
    talk_url: String,
    #[serde(default)]
    source: String,
    #[serde(default)]
    created_at: String,
    #[serde(default)]
    csv_filename: Option<String>,
}

/// One row of an export CSV.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExportRow {
    pub email: String,
    pub talk_title: String,
    pub talk_url: String,
    pub source: String,
    pub created_at: String,
    pub imported_at: String,
}

impl From<&SignupRecord> for ExportRow {
    fn from(record: &SignupRecord) -> Self {
        Self {
            email: record.email.clone(),
            talk_title: record.talk_title.clone(),
            talk_url: record.talk_url.clone(),
            source: record.source.clone(),
            created_at: record.created_at.clone(),
            imported_at: format_imported_at(record.imported_at_us),
        }
    }
}

/// Signups parsed from one file, with the count of rows that failed to parse.
#[derive(Debug, Clone, Default)]
pub struct ParsedFile {
    pub signups: Vec<NewSignup>,
    pub malformed: usize,
}

/// Parse a signup export.
///
/// Rows that fail to deserialize are logged and counted, not fatal. A row
/// without `csv_filename` is attributed to the file it came from.
///
/// # Errors
///
/// Returns an error if the file cannot be opened or its header is unreadable.
pub fn read_signups_csv(path: &Path) -> Result<ParsedFile> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("open csv {}", path.display()))?;
    reader
        .headers()
        .with_context(|| format!("read csv header {}", path.display()))?;

    let fallback_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned());

    let mut parsed = ParsedFile::default();
    for (index, row) in reader.deserialize::<ImportRow>().enumerate() {
        match row {
            Ok(row) => {
                let source_file = row
                    .csv_filename
                    .filter(|name| !name.trim().is_empty())
                    .or_else(|| fallback_name.clone());
                parsed.signups.push(NewSignup {
                    email: row.email,
                    talk_title: row.talk_title,
                    talk_url: row.talk_url,
                    source: row.source,
                    created_at: row.created_at,
                    source_file,
                });
            }
            Err(err) => {
                parsed.malformed += 1;
                tracing::warn!(
                    file = %path.display(),
                    row = index + 2,
                    error = %err,
                    "skipping malformed csv row"
                );
            }
        }
    }

    tracing::debug!(
        file = %path.display(),
        rows = parsed.signups.len(),
        malformed = parsed.malformed,
        "parsed signup csv"
    );
    Ok(parsed)
}

/// Expand import arguments: files are taken as given, directories
/// contribute their `*.csv` entries in name order.
///
/// # Errors
///
/// Returns an error if a path does not exist or a directory cannot be read.
pub fn collect_csv_paths(inputs: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for input in inputs {
        let meta = fs::metadata(input).with_context(|| format!("stat {}", input.display()))?;
        if !meta.is_dir() {
            paths.push(input.clone());
            continue;
        }

        let mut found = Vec::new();
        for entry in fs::read_dir(input).with_context(|| format!("read dir {}", input.display()))? {
            let path = entry
                .with_context(|| format!("read dir entry in {}", input.display()))?
                .path();
            let is_csv = path
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"));
            if is_csv && path.is_file() {
                found.push(path);
            }
        }
        found.sort();
        paths.extend(found);
    }
    Ok(paths)
}

/// Write one talk's signups as CSV with a header row.
///
/// # Errors
///
/// Returns an error if serialization or the underlying writer fails.
pub fn write_talk_csv<W: Write>(writer: W, records: &[SignupRecord]) -> Result<usize> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    if records.is_empty() {
        // serde only emits the header with the first record.
        csv_writer
            .write_record([
                "email",
                "talk_title",
                "talk_url",
                "source",
                "created_at",
                "imported_at",
            ])
            .context("write csv header")?;
    }
    for record in records {
        csv_writer
            .serialize(ExportRow::from(record))
            .context("write csv row")?;
    }
    csv_writer.flush().context("flush csv writer")?;
    Ok(records.len())
}

/// Render microseconds since the epoch as RFC 3339 (UTC, microsecond precision).
#[must_use]
pub fn format_imported_at(imported_at_us: i64) -> String {
    DateTime::<Utc>::from_timestamp_micros(imported_at_us).map_or_else(
        || imported_at_us.to_string(),
        |ts| ts.to_rfc3339_opts(SecondsFormat::Micros, true),
    )
}
