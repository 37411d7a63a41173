//! How `tb` prints: one serializable value per command, shown as an
//! operator-friendly report, tab-separated lines, or JSON.
//!
//! The mode comes from, in order: `--format`, `--json`, the
//! `TALKBRIDGE_FORMAT` variable, and finally whether stdout is a terminal
//! (pretty) or a pipe (text).

use clap::ValueEnum;
use serde::Serialize;
use std::io::{self, IsTerminal, Write};
use talkbridge_core::error::ErrorCode;

const SECTION_WIDTH: usize = 72;
const KEY_WIDTH: usize = 16;

/// Heading line underlined with dashes.
pub fn pretty_section(w: &mut dyn Write, heading: &str) -> io::Result<()> {
    writeln!(w, "{heading}\n{}", "-".repeat(SECTION_WIDTH))
}

/// `key:` padded to a fixed column, then the value.
pub fn pretty_kv(w: &mut dyn Write, key: &str, value: impl AsRef<str>) -> io::Result<()> {
    let label = format!("{key}:");
    writeln!(w, "{label:<width$} {}", value.as_ref(), width = KEY_WIDTH)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputMode {
    /// Sections and aligned key/value lines for people.
    Pretty,
    /// Tab-separated lines for scripts.
    Text,
    /// Pretty-printed JSON.
    Json,
}

impl OutputMode {
    pub const fn is_json(self) -> bool {
        matches!(self, Self::Json)
    }

    pub const fn is_pretty(self) -> bool {
        matches!(self, Self::Pretty)
    }

    fn from_env_value(value: &str) -> Option<Self> {
        Self::from_str(value.trim(), true).ok()
    }
}

fn pick_mode(
    format_flag: Option<OutputMode>,
    json_flag: bool,
    env_value: Option<&str>,
    stdout_is_tty: bool,
) -> OutputMode {
    format_flag
        .or_else(|| json_flag.then_some(OutputMode::Json))
        .or_else(|| env_value.and_then(OutputMode::from_env_value))
        .unwrap_or(if stdout_is_tty {
            OutputMode::Pretty
        } else {
            OutputMode::Text
        })
}

/// Work out the output mode for this invocation.
pub fn resolve_output_mode(format_flag: Option<OutputMode>, json_flag: bool) -> OutputMode {
    let env_value = std::env::var("TALKBRIDGE_FORMAT").ok();
    pick_mode(
        format_flag,
        json_flag,
        env_value.as_deref(),
        io::stdout().is_terminal(),
    )
}

/// User-facing failure as printed on stderr.
#[derive(Debug, Serialize)]
pub struct CliError {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
    /// `E####` identifier from [`ErrorCode`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
}

impl CliError {
    pub fn coded(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            suggestion: code.hint().map(str::to_string),
            error_code: Some(code.code().to_string()),
        }
    }
}

/// Print `value` on stdout. `human` handles both pretty and text modes.
pub fn render<T: Serialize>(
    mode: OutputMode,
    value: &T,
    human: impl FnOnce(&T, &mut dyn Write) -> io::Result<()>,
) -> anyhow::Result<()> {
    let mut out = io::stdout().lock();
    if mode.is_json() {
        serde_json::to_writer_pretty(&mut out, value)?;
        writeln!(out)?;
    } else {
        human(value, &mut out)?;
    }
    Ok(())
}

fn write_error(mode: OutputMode, error: &CliError, out: &mut dyn Write) -> io::Result<()> {
    if mode.is_json() {
        let body = serde_json::json!({ "error": error });
        serde_json::to_writer_pretty(&mut *out, &body)?;
        return writeln!(out);
    }

    match &error.error_code {
        Some(code) => writeln!(out, "error[{code}]: {}", error.message)?,
        None => writeln!(out, "error: {}", error.message)?,
    }
    if let Some(suggestion) = &error.suggestion {
        writeln!(out, "  suggestion: {suggestion}")?;
    }
    Ok(())
}

/// Print a coded error on stderr and hand back the error that ends the
/// command with a non-zero exit status.
pub fn fail(mode: OutputMode, code: ErrorCode, message: impl Into<String>) -> anyhow::Error {
    let error = CliError::coded(code, message);
    if let Err(err) = write_error(mode, &error, &mut io::stderr().lock()) {
        tracing::warn!(error = %err, "could not print error");
    }
    anyhow::anyhow!("{code}: {}", error.message)
}
