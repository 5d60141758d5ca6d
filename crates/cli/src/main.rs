use std::path::PathBuf;

use anyhow::Result;
use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

mod commands;
mod render;

#[derive(Parser)]
#[command(
    name = "cadence",
    version,
    about = "Recurring-transaction matching and reconciliation for plain-text ledgers"
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum OutputFormat {
    Plain,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// Validate schedule files for syntax and schema compliance
    Validate {
        /// schedules.yaml file or schedules/ directory
        path: PathBuf,
    },
    /// List schedules with their frequency and match criteria
    List {
        path: PathBuf,
        /// Show only enabled schedules
        #[arg(long)]
        enabled_only: bool,
        #[arg(long, value_enum, default_value_t = OutputFormat::Plain)]
        format: OutputFormat,
    },
    /// Preview the occurrence dates one schedule generates in a range
    Occurrences {
        path: PathBuf,
        /// Schedule id to expand
        #[arg(long)]
        schedule: String,
        #[arg(long)]
        from: NaiveDate,
        #[arg(long)]
        to: NaiveDate,
    },
    /// Show the best-matching schedule per imported transaction, without applying
    Preview {
        path: PathBuf,
        /// CSV file of imported transactions
        #[arg(long)]
        input: PathBuf,
        /// TOML column-mapping profile for the CSV
        #[arg(long)]
        profile: PathBuf,
        #[arg(long)]
        from: Option<NaiveDate>,
        #[arg(long)]
        to: Option<NaiveDate>,
    },
    /// Match imported transactions, enrich them, and synthesize placeholders
    Enrich {
        path: PathBuf,
        /// CSV file of imported transactions (omit to only check the ledger)
        #[arg(long)]
        input: Option<PathBuf>,
        /// TOML column-mapping profile for the CSV
        #[arg(long, requires = "input")]
        profile: Option<PathBuf>,
        /// JSON snapshot of existing ledger transactions
        #[arg(long)]
        ledger: Option<PathBuf>,
        #[arg(long)]
        from: Option<NaiveDate>,
        #[arg(long)]
        to: Option<NaiveDate>,
        /// Write rendered output here instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Project schedules forward as forecast (#) transactions
    Forecast {
        path: PathBuf,
        /// Horizon start (defaults to today)
        #[arg(long)]
        from: Option<NaiveDate>,
        /// Horizon length in days
        #[arg(long, default_value_t = 365)]
        days: u32,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Validate { path } => commands::validate(&path),
        Command::List {
            path,
            enabled_only,
            format,
        } => commands::list(&path, enabled_only, format),
        Command::Occurrences {
            path,
            schedule,
            from,
            to,
        } => commands::occurrences(&path, &schedule, from, to),
        Command::Preview {
            path,
            input,
            profile,
            from,
            to,
        } => commands::preview(&path, &input, &profile, from, to),
        Command::Enrich {
            path,
            input,
            profile,
            ledger,
            from,
            to,
            output,
        } => commands::enrich(
            &path,
            input.as_deref(),
            profile.as_deref(),
            ledger.as_deref(),
            from,
            to,
            output.as_deref(),
        ),
        Command::Forecast { path, from, days } => commands::forecast(&path, from, days),
    }
}
