use anyhow::Result;
use chrono::NaiveDate;
use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use wb_core::timeseries::{DEFAULT_MAX_PERCENT_INVALID, DEFAULT_MIN_PERCENT_OBSERVED};
use wb_core::{default_history_start, QualityPolicy, DATE_FORMAT};
use wb_dynamic_attrs::{DynamicAttrsConfig, DEFAULT_OUTPUT_DIR};

mod historical_extent;

use historical_extent::HistoricalExtentCommand;

const DEFAULT_DATABASE_PATH: &str = "waterbodies.sqlite";

#[derive(Parser, Debug)]
#[command(name = "wb")]
#[command(about = "Waterbodies tools", long_about = None)]
struct Cli {
    /// Log verbosity; info by default, -vv for debug.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// SQLite database holding the waterbody tables.
    #[arg(long, env = "WB_DATABASE_PATH", default_value = DEFAULT_DATABASE_PATH, global = true)]
    database: PathBuf,

    /// Directory receiving the run artifacts.
    #[arg(long, env = "WB_OUTPUT_DIR", default_value = DEFAULT_OUTPUT_DIR, global = true)]
    output_dir: PathBuf,

    /// First day of the observation window (YYYY-MM-DD).
    #[arg(long, env = "WB_HISTORY_START", value_parser = parse_date, global = true)]
    history_start: Option<NaiveDate>,

    #[arg(long, default_value_t = DEFAULT_MIN_PERCENT_OBSERVED, global = true)]
    min_percent_observed: f64,

    #[arg(long, default_value_t = DEFAULT_MAX_PERCENT_INVALID, global = true)]
    max_percent_invalid: f64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the waterbodies historical extent tools.
    HistoricalExtent {
        #[command(subcommand)]
        action: HistoricalExtentCommand,
    },
}

impl Cli {
    fn config(&self) -> DynamicAttrsConfig {
        DynamicAttrsConfig {
            quality: QualityPolicy {
                min_percent_observed: self.min_percent_observed,
                max_percent_invalid: self.max_percent_invalid,
            },
            history_start: self.history_start.unwrap_or_else(default_history_start),
            output_dir: self.output_dir.clone(),
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = cli.config();
    let store = historical_extent::open_store(&cli.database)?;

    match cli.command {
        Commands::HistoricalExtent { action } => historical_extent::run(action, &store, config),
    }
}

fn parse_date(value: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT)
        .map_err(|err| format!("expected YYYY-MM-DD: {err}"))
}

fn log_level(verbose: u8) -> String {
    if let Ok(level) = std::env::var("WB_LOG_LEVEL") {
        if !level.trim().is_empty() {
            return level;
        }
    }
    match verbose {
        0 | 1 => "info",
        _ => "debug",
    }
    .to_string()
}

fn init_logging(verbose: u8) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level(verbose)));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        eprintln!("log_init_error: a global subscriber is already set");
    }
}
