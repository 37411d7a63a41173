#![forbid(unsafe_code)]

mod cmd;
mod output;

use clap::{Parser, Subcommand};
use output::{OutputMode, fail, resolve_output_mode};
use std::env;
use std::path::PathBuf;
use talkbridge_core::config::{resolve_config, resolve_db_path};
use talkbridge_core::error::ErrorCode;
use tracing::debug;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "tb: talk signup tracker and cross-promotion ledger",
    long_about = None
)]
struct Cli {
    /// Enable debug logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output format.
    #[arg(long, global = true, value_enum)]
    format: Option<OutputMode>,

    /// Emit JSON output (same as `--format json`).
    #[arg(long, global = true)]
    json: bool,

    /// Database file (overrides TALKBRIDGE_DB and config).
    #[arg(long, global = true, value_name = "PATH")]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    fn output_mode(&self) -> OutputMode {
        resolve_output_mode(self.format, self.json)
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        next_help_heading = "Signups",
        about = "Import signup CSV files",
        long_about = "Import signups from CSV files or directories of *.csv files. \
                      Rows are keyed by (email, talk url); re-importing replaces earlier rows.",
        after_help = "EXAMPLES:\n    # Import one export\n    tb import exports/rust-meetup.csv\n\n    # Import every CSV in a directory\n    tb import exports/\n\n    # Emit machine-readable output\n    tb import exports/ --json"
    )]
    Import(cmd::import::ImportArgs),

    #[command(
        next_help_heading = "Signups",
        about = "List imported talks",
        long_about = "List every imported talk with its signup count, most popular first.",
        after_help = "EXAMPLES:\n    # List talks\n    tb talks\n\n    # Emit machine-readable output\n    tb talks --json"
    )]
    Talks(cmd::talks::TalksArgs),

    #[command(
        next_help_heading = "Signups",
        about = "Export one talk's signups as CSV",
        long_about = "Write every signup for a talk as CSV, newest first.",
        after_help = "EXAMPLES:\n    # Print to stdout\n    tb export \"Rust in Production\"\n\n    # Write to a file\n    tb export \"Rust in Production\" --output rust.csv"
    )]
    Export(cmd::export::ExportArgs),

    #[command(next_help_heading = "Sync Groups", about = "Create, list, and inspect sync groups")]
    Group {
        #[command(subcommand)]
        command: cmd::group::GroupCommand,
    },

    #[command(
        next_help_heading = "Sync Groups",
        about = "Seed pending work for a sync group",
        long_about = "Queue one pending work item per email missing from either talk. \
                      Items already in the ledger are left untouched.",
        after_help = "EXAMPLES:\n    # Seed group 1\n    tb seed 1\n\n    # Emit machine-readable output\n    tb seed 1 --json"
    )]
    Seed(cmd::seed::SeedArgs),

    #[command(
        next_help_heading = "Processing",
        about = "Process pending work items",
        long_about = "Shuffle pending work items and submit each through the configured actuator, \
                      recording every outcome in the ledger.",
        after_help = "EXAMPLES:\n    # Rehearse without submitting\n    tb run --dry-run\n\n    # Submit at most 20 items from group 1\n    tb run --group 1 --limit 20\n\n    # Skip the large-queue pause\n    tb run --yes"
    )]
    Run(cmd::run::RunArgs),

    #[command(
        next_help_heading = "Processing",
        about = "Show signup and ledger statistics",
        long_about = "Reconcile signups against the processing ledger, or show one group's progress.",
        after_help = "EXAMPLES:\n    # Store-wide statistics\n    tb stats\n\n    # One group\n    tb stats --group 1 --json"
    )]
    Stats(cmd::stats::StatsArgs),

    #[command(
        next_help_heading = "Maintenance",
        about = "Remove duplicate ledger rows",
        long_about = "Keep one ledger row per (email, target url), preferring successful and then \
                      most recent rows.",
        after_help = "EXAMPLES:\n    # Preview\n    tb dedup --dry-run\n\n    # Apply\n    tb dedup"
    )]
    Dedup(cmd::dedup::DedupArgs),

    #[command(
        next_help_heading = "Maintenance",
        about = "Clear stored data",
        long_about = "Delete all signups, sync groups, and ledger rows, or only requeue dry-run rows.",
        after_help = "EXAMPLES:\n    # Requeue rehearsed items\n    tb reset --dry-runs-only\n\n    # Wipe everything\n    tb reset --yes"
    )]
    Reset(cmd::reset::ResetArgs),
}

fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_env("TALKBRIDGE_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if verbose || env::var("DEBUG").is_ok() {
            "talkbridge_core=debug,tb=debug,info"
        } else {
            "talkbridge_core=info,tb=info,warn"
        })
    });

    let format = env::var("TALKBRIDGE_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

    let registry = tracing_subscriber::registry().with(filter);

    match format.as_str() {
        "json" => {
            registry
                .with(fmt::layer().json().with_ansi(false).with_writer(std::io::stderr))
                .init();
        }
        _ => {
            registry
                .with(fmt::layer().compact().with_writer(std::io::stderr))
                .init();
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let output = cli.output_mode();
    let project_root = env::current_dir()?;
    let user_config = env::var_os("TALKBRIDGE_USER_CONFIG").map(PathBuf::from);
    let config = resolve_config(&project_root, user_config.as_deref())
        .map_err(|err| fail(output, ErrorCode::ConfigParseError, format!("{err:#}")))?;
    let env_db = env::var("TALKBRIDGE_DB").ok();
    let db_path = resolve_db_path(cli.db.as_deref(), env_db.as_deref(), &config, &project_root);
    debug!(db = %db_path.display(), ?output, "starting");

    let ctx = cmd::CmdContext {
        output,
        config,
        db_path,
    };

    match cli.command {
        Commands::Import(ref args) => cmd::import::run_import(args, &ctx),
        Commands::Talks(ref args) => cmd::talks::run_talks(args, &ctx),
        Commands::Export(ref args) => cmd::export::run_export(args, &ctx),
        Commands::Group { ref command } => cmd::group::run_group(command, &ctx),
        Commands::Seed(ref args) => cmd::seed::run_seed(args, &ctx),
        Commands::Run(ref args) => cmd::run::run_run(args, &ctx),
        Commands::Stats(ref args) => cmd::stats::run_stats(args, &ctx),
        Commands::Dedup(ref args) => cmd::dedup::run_dedup(args, &ctx),
        Commands::Reset(ref args) => cmd::reset::run_reset(args, &ctx),
    }
}
