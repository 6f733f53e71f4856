use std::{fs, path::PathBuf, process::ExitCode};

use chrono::{DateTime, NaiveDate, Utc};
use clap::{builder::ArgAction, Args, Parser, Subcommand, ValueEnum};
use console::{style, Emoji};
use errors::HarvestCliError;
use harvester::{
  harvest::{Collector, DeletedRecords, Harvester, RecordConsumer, RunOptions, RunReport, WindowOutcome},
  sink::{CsvSinkFactory, Database, DatabaseSinkFactory},
  source::OaiClient,
  stats::StatsAggregator,
  Config,
};
use tracing::{debug, info};
use tracing_appender::rolling;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub mod errors;

static ROCKET: Emoji<'_, '_> = Emoji("🚀 ", "");
static CHART: Emoji<'_, '_> = Emoji("📊 ", "");
static SAVE: Emoji<'_, '_> = Emoji("💾 ", "");
static WARNING: Emoji<'_, '_> = Emoji("⚠️  ", "");
static ERROR: Emoji<'_, '_> = Emoji("✖ ", "");
static SUCCESS: Emoji<'_, '_> = Emoji("✨ ", "");

#[derive(Parser)]
#[command(author, version, about = "Harvest OAI-PMH metadata into CSV files, SQLite or yearly counts")]
struct Cli {
  /// Verbose mode (-v, -vv)
  #[arg(
        short,
        long,
        action = ArgAction::Count,
        global = true,
        help = "Increase logging verbosity"
    )]
  verbose: u8,

  /// Configuration file; defaults to ./harvest.toml when present
  #[arg(long, global = true)]
  config: Option<PathBuf>,

  /// Directory CSV files are written to
  #[arg(long, global = true)]
  output_dir: Option<PathBuf>,

  /// Rows per CSV file
  #[arg(long, global = true)]
  max_rows: Option<usize>,

  /// Log filter used when RUST_LOG is unset
  #[arg(long, global = true)]
  log_level: Option<String>,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Harvest everything from a date up to now
  Since {
    /// First day to harvest (YYYY-MM-DD)
    date: NaiveDate,
    #[command(flatten)]
    run:  RunArgs,
  },
  /// Harvest the 24 hours before now
  Yesterday {
    #[command(flatten)]
    run: RunArgs,
  },
  /// Harvest a single day
  Day {
    /// Day to harvest (YYYY-MM-DD)
    date: NaiveDate,
    #[command(flatten)]
    run:  RunArgs,
  },
  /// Harvest month by month from a date up to yesterday
  Backfill {
    /// First day to harvest (YYYY-MM-DD)
    start: NaiveDate,
    #[command(flatten)]
    run:   RunArgs,
  },
  /// Harvest a date range month by month
  Range {
    /// First day to harvest (YYYY-MM-DD)
    from:  NaiveDate,
    /// Day after the last day to harvest (YYYY-MM-DD)
    until: NaiveDate,
    #[command(flatten)]
    run:   RunArgs,
  },
  /// Print the effective configuration
  Config,
}

impl Commands {
  /// Run settings of a harvesting command.
  fn run_args(&self) -> Option<&RunArgs> {
    match self {
      Commands::Since { run, .. }
      | Commands::Yesterday { run }
      | Commands::Day { run, .. }
      | Commands::Backfill { run, .. }
      | Commands::Range { run, .. } => Some(run),
      Commands::Config => None,
    }
  }
}

/// Settings shared by every harvesting command.
#[derive(Args, Clone, Copy)]
struct RunArgs {
  /// Count articles per year instead of writing records
  #[arg(long)]
  count: bool,

  /// Where records are written
  #[arg(long, value_enum, default_value_t = SinkKind::Csv)]
  sink: SinkKind,

  /// How records marked deleted are treated
  #[arg(long, value_enum, default_value_t = DeletedArg::Include)]
  deleted: DeletedArg,
}

/// Record destination.
#[derive(ValueEnum, Clone, Copy, PartialEq, Eq)]
enum SinkKind {
  /// Rotating `$`-separated CSV files in the output directory
  Csv,
  /// One row per record in a SQLite database
  Sqlite,
}

/// Deleted-record policy as given on the command line.
#[derive(ValueEnum, Clone, Copy, PartialEq, Eq)]
enum DeletedArg {
  /// Keep delete markers
  Include,
  /// Drop delete markers
  Skip,
  /// Keep only delete markers, in `deleted_` files
  Only,
}

impl From<DeletedArg> for DeletedRecords {
  fn from(arg: DeletedArg) -> Self {
    match arg {
      DeletedArg::Include => DeletedRecords::Include,
      DeletedArg::Skip => DeletedRecords::Skip,
      DeletedArg::Only => DeletedRecords::Only,
    }
  }
}

/// Setup logging to stdout and to the dated log file.
///
/// `RUST_LOG` wins over everything; otherwise the configured level is used,
/// raised to `debug` or `trace` by `-v` flags.
fn setup_logging(config: &Config, verbosity: u8) -> Result<(), HarvestCliError> {
  let level = match verbosity {
    0 => config.log_level.as_str(),
    1 => "debug",
    _ => "trace",
  };
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

  fs::create_dir_all(&config.logfile_dir)?;
  let file_appender = rolling::RollingFileAppender::builder()
    .rotation(rolling::Rotation::NEVER)
    .filename_prefix(config.logfile_name(Utc::now().date_naive()))
    .build(&config.logfile_dir)?;

  let file_layer = tracing_subscriber::fmt::layer()
    .with_writer(file_appender)
    .with_ansi(false)
    .with_target(true)
    .with_line_number(true);
  let stdout_layer = tracing_subscriber::fmt::layer().with_target(false);

  tracing_subscriber::registry().with(filter).with(file_layer).with(stdout_layer).init();
  Ok(())
}

/// Loads the configuration and applies command line overrides.
fn load_config(cli: &Cli) -> Result<Config, HarvestCliError> {
  let mut config = Config::load_or_default(cli.config.as_deref())?;
  if let Some(output_dir) = &cli.output_dir {
    config.output_dir = output_dir.clone();
  }
  if let Some(max_rows) = cli.max_rows {
    config.max_csv_rows = max_rows;
  }
  if let Some(log_level) = &cli.log_level {
    config.log_level = log_level.clone();
  }
  config.validate()?;
  Ok(config)
}

/// Creates the parent directory of `path`, if it has one.
fn create_parent(path: &std::path::Path) -> Result<(), HarvestCliError> {
  if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
    fs::create_dir_all(parent)?;
  }
  Ok(())
}

/// Runs the harvesting command into `consumer`.
async fn dispatch<C: RecordConsumer>(
  harvester: &Harvester<OaiClient>,
  command: &Commands,
  now: DateTime<Utc>,
  consumer: &mut C,
  options: RunOptions,
) -> RunReport {
  match command {
    Commands::Since { date, .. } => harvester.since(*date, now, consumer, options).await,
    Commands::Yesterday { .. } => harvester.yesterday(now, consumer, options).await,
    Commands::Day { date, .. } => harvester.day(*date, consumer, options).await,
    Commands::Backfill { start, .. } => harvester.backfill(*start, now, consumer, options).await,
    Commands::Range { from, until, .. } => harvester.run(*from, *until, consumer, options).await,
    Commands::Config => RunReport::default(),
  }
}

/// Prints the per-run summary.
fn print_summary(report: &RunReport) {
  println!(
    "\n{} Harvested {} records in {} windows",
    style(SUCCESS).green(),
    style(report.delivered()).yellow(),
    style(report.windows.len()).yellow()
  );
  if report.empty() > 0 {
    println!("   {} {} windows without records", style("ℹ").blue(), style(report.empty()).yellow());
  }
  for window in &report.windows {
    if let WindowOutcome::Abandoned { error } = &window.outcome {
      println!(
        "   {} Abandoned {} after {} records: {}",
        style(WARNING).yellow(),
        style(window.window).cyan(),
        style(window.delivered).yellow(),
        style(error).red()
      );
    }
  }
}

async fn run(cli: Cli) -> Result<(), HarvestCliError> {
  let config = load_config(&cli)?;

  let Some(args) = cli.command.run_args().copied() else {
    print!("{}", config.to_toml()?);
    return Ok(());
  };
  if let Commands::Range { from, until, .. } = &cli.command {
    if from >= until {
      return Err(HarvestCliError::EmptyRange { from: *from, until: *until });
    }
  }

  setup_logging(&config, cli.verbose)?;
  debug!("Effective configuration: {config:?}");

  let options = RunOptions::new(args.deleted.into());
  let harvester = Harvester::from_config(OaiClient::from_config(&config)?, &config);
  let now = Utc::now();

  println!("{} Harvesting {}", style(ROCKET).cyan(), style(&config.base_url).yellow());

  let report = if args.count {
    let mut aggregator = StatsAggregator::from_config(&config);
    create_parent(aggregator.totals_path())?;
    println!(
      "{} Counting articles into {}",
      style(CHART).cyan(),
      style(aggregator.totals_path().display()).yellow()
    );
    dispatch(&harvester, &cli.command, now, &mut aggregator, options).await
  } else {
    match args.sink {
      SinkKind::Csv => {
        fs::create_dir_all(&config.output_dir)?;
        println!(
          "{} Writing CSV files to {}",
          style(SAVE).cyan(),
          style(config.output_dir.display()).yellow()
        );
        let factory = CsvSinkFactory::from_config(&config).with_prefix(options.deleted.file_prefix());
        let mut collector = Collector::new(factory);
        dispatch(&harvester, &cli.command, now, &mut collector, options).await
      },
      SinkKind::Sqlite => {
        let path = config.database_path();
        create_parent(&path)?;
        println!("{} Writing records to {}", style(SAVE).cyan(), style(path.display()).yellow());
        let mut collector = Collector::new(DatabaseSinkFactory::new(Database::open(&path).await?));
        dispatch(&harvester, &cli.command, now, &mut collector, options).await
      },
    }
  };

  info!(
    windows = report.windows.len(),
    completed = report.completed(),
    empty = report.empty(),
    abandoned = report.abandoned(),
    "Harvest finished with {} records",
    report.delivered()
  );
  print_summary(&report);
  Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
  match run(Cli::parse()).await {
    Ok(()) => ExitCode::SUCCESS,
    Err(err) => {
      eprintln!("{} {err}", style(ERROR).red());
      ExitCode::FAILURE
    },
  }
}
