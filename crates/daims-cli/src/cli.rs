//! CLI argument definitions for the broker.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use clap_verbosity_flag::{Verbosity, WarnLevel};
use colorchoice_clap::Color;

#[derive(Parser)]
#[command(
    name = "daims-broker",
    version,
    about = "DAIMS broker - validate federal award submissions",
    long_about = "Validate agency award submissions (Files A, B, C and FABS) against\n\
                  the DAIMS rule catalog, and maintain the reference-data snapshots\n\
                  (TAS, SF-133, SAM, assistance listings, ...) the rules join against."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Adjust log verbosity (-v for debug, -vv for trace, -q for errors only).
    #[command(flatten)]
    pub verbosity: Verbosity<WarnLevel>,

    /// Control ANSI color output (auto, always, never).
    #[command(flatten)]
    pub color: Color,

    /// Explicit log level (overrides -v/-q flags).
    #[arg(long = "log-level", value_enum, global = true)]
    pub log_level: Option<LogLevelArg>,

    /// Log output format (pretty for human, json for machine parsing).
    #[arg(
        long = "log-format",
        value_enum,
        default_value = "pretty",
        global = true
    )]
    pub log_format: LogFormatArg,

    /// Write logs to a file instead of stderr.
    #[arg(long = "log-file", value_name = "PATH", global = true)]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Validate a submission against the rule catalog.
    Validate(ValidateArgs),

    /// Load one reference feed from local artifacts into a snapshot.
    Load(LoadArgs),

    /// List the validation rule catalog.
    Rules(RulesArgs),

    /// Show which feeds a reference snapshot holds and when they loaded.
    Status(StatusArgs),
}

#[derive(Parser)]
pub struct ValidateArgs {
    /// Reference-data snapshot directory (written by `load`).
    #[arg(long = "snapshot", value_name = "DIR")]
    pub snapshot: PathBuf,

    /// File A (appropriations) CSV.
    #[arg(long = "file-a", value_name = "PATH")]
    pub file_a: Option<PathBuf>,

    /// File B (program activity and object class) CSV.
    #[arg(long = "file-b", value_name = "PATH")]
    pub file_b: Option<PathBuf>,

    /// File C (award financial) CSV.
    #[arg(long = "file-c", value_name = "PATH")]
    pub file_c: Option<PathBuf>,

    /// FABS (financial assistance) CSV. FABS submissions are standalone and
    /// cannot be combined with Files A/B/C.
    #[arg(
        long = "fabs",
        value_name = "PATH",
        conflicts_with_all = ["file_a", "file_b", "file_c"]
    )]
    pub fabs: Option<PathBuf>,

    /// Published-submission history JSON for cross-submission rules.
    #[arg(long = "published", value_name = "PATH")]
    pub published: Option<PathBuf>,

    /// Submitting agency CGAC code.
    #[arg(long = "agency", value_name = "CODE")]
    pub agency: String,

    /// Submission fiscal year.
    #[arg(long = "fiscal-year", value_name = "YYYY")]
    pub fiscal_year: u16,

    /// Submission fiscal period (2-12; periods 1 and 2 submit together as 2).
    #[arg(long = "period", value_name = "P")]
    pub period: u8,

    /// Treat the submission as quarterly rather than monthly.
    #[arg(long = "quarter")]
    pub quarter: bool,

    /// Directory for the error/warning reports and the run summary.
    #[arg(long = "reports-dir", value_name = "DIR", default_value = "reports")]
    pub reports_dir: PathBuf,

    /// Refuse to validate when any loaded feed is older than this many days.
    #[arg(long = "max-stale-days", value_name = "DAYS")]
    pub max_stale_days: Option<i64>,
}

#[derive(Parser)]
pub struct LoadArgs {
    /// Reference feed to load.
    #[arg(value_enum, value_name = "FEED")]
    pub feed: FeedArg,

    /// Directory containing the feed's raw artifact files.
    #[arg(long = "artifacts", value_name = "DIR")]
    pub artifacts: PathBuf,

    /// Snapshot directory to update (created on first load).
    #[arg(long = "snapshot", value_name = "DIR")]
    pub snapshot: PathBuf,

    /// Reapply artifacts already recorded as loaded.
    #[arg(long = "force")]
    pub force: bool,
}

#[derive(Parser)]
pub struct RulesArgs {
    /// Only list rules for one submission file.
    #[arg(long = "file", value_enum)]
    pub file: Option<FileArg>,
}

#[derive(Parser)]
pub struct StatusArgs {
    /// Reference-data snapshot directory.
    #[arg(value_name = "SNAPSHOT")]
    pub snapshot: PathBuf,

    /// Flag feeds older than this many days as stale.
    #[arg(long = "max-stale-days", value_name = "DAYS")]
    pub max_stale_days: Option<i64>,
}

/// Reference feed choices for `load`.
#[derive(Clone, Copy, ValueEnum)]
pub enum FeedArg {
    Agencies,
    AssistanceListings,
    Countries,
    Defc,
    ObjectClasses,
    ProgramActivity,
    Sam,
    SamUnregistered,
    Sf133,
    SubmissionWindows,
    Tas,
    UspsZip,
}

/// Submission file choices for `rules --file`.
#[derive(Clone, Copy, ValueEnum)]
pub enum FileArg {
    A,
    B,
    C,
    Fabs,
}

/// CLI log level choices.
#[derive(Clone, Copy, ValueEnum)]
pub enum LogLevelArg {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// CLI log format choices.
#[derive(Clone, Copy, ValueEnum)]
pub enum LogFormatArg {
    Pretty,
    Compact,
    Json,
}
