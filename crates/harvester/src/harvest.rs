//! Harvest orchestration.
//!
//! A [`Harvester`] walks a sequence of [`Window`]s and, for each one, pages through
//! its [`RecordSource`], normalizes every record and hands it to a
//! [`RecordConsumer`]. Two consumers exist:
//!
//! - [`Collector`] - writes records into a fresh sink per window
//! - [`StatsAggregator`] - counts articles per year and appends totals per window
//!
//! Windows are isolated from one another. A window the repository has no records
//! for ends as [`WindowOutcome::Empty`]; any other failure ends it as
//! [`WindowOutcome::Abandoned`], keeping whatever was delivered before the
//! failure. Either way the consumer's [`end_window`](RecordConsumer::end_window)
//! runs and the next window is harvested.
//!
//! # Examples
//!
//! ```no_run
//! use chrono::{NaiveDate, Utc};
//! use harvester::{
//!   harvest::{Collector, Harvester, RunOptions},
//!   sink::CsvSinkFactory,
//!   source::OaiClient,
//!   Config,
//! };
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::default();
//! let harvester = Harvester::from_config(OaiClient::from_config(&config)?, &config);
//! let mut collector = Collector::new(CsvSinkFactory::from_config(&config));
//!
//! let report = harvester
//!   .since(NaiveDate::from_ymd_opt(2022, 5, 1).unwrap(), Utc::now(), &mut collector, RunOptions::default())
//!   .await;
//! println!("{} records in {} windows", report.delivered(), report.windows.len());
//! # Ok(())
//! # }
//! ```

use super::*;
use crate::{
  normalize::normalize,
  source::PageRequest,
  stats::StatsAggregator,
  window::{first_of_month, midnight, plan_months},
};

/// Receives the normalized records of a run, window by window.
#[allow(async_fn_in_trait)]
pub trait RecordConsumer {
  /// Called before the first record of `window`.
  async fn begin_window(&mut self, window: &Window) -> Result<(), HarvestError>;

  /// Takes one record of the current window.
  async fn consume(&mut self, record: &FlatRecord) -> Result<(), HarvestError>;

  /// Called once per window whatever its outcome, including after a failed
  /// [`begin_window`](RecordConsumer::begin_window).
  async fn end_window(&mut self, window: &Window) -> Result<(), HarvestError>;
}

/// Writes records into a fresh sink for every window.
pub struct Collector<F: SinkFactory> {
  /// Opens the per-window sinks
  factory: F,
  /// Sink of the window being harvested
  sink:    Option<F::Sink>,
}

impl<F: SinkFactory> Collector<F> {
  /// A collector opening its sinks from `factory`.
  pub fn new(factory: F) -> Self { Self { factory, sink: None } }

  /// The sink factory.
  pub fn factory(&self) -> &F { &self.factory }
}

impl<F: SinkFactory> RecordConsumer for Collector<F> {
  async fn begin_window(&mut self, window: &Window) -> Result<(), HarvestError> {
    if let Some(mut stale) = self.sink.take() {
      stale.close().await?;
    }
    self.sink = Some(self.factory.open(window).await?);
    Ok(())
  }

  async fn consume(&mut self, record: &FlatRecord) -> Result<(), HarvestError> {
    match self.sink.as_mut() {
      Some(sink) => sink.accept(record).await,
      None => Err(HarvestError::NoOpenWindow),
    }
  }

  async fn end_window(&mut self, _window: &Window) -> Result<(), HarvestError> {
    match self.sink.take() {
      Some(mut sink) => sink.close().await,
      None => Ok(()),
    }
  }
}

impl RecordConsumer for StatsAggregator {
  async fn begin_window(&mut self, _window: &Window) -> Result<(), HarvestError> { Ok(()) }

  async fn consume(&mut self, record: &FlatRecord) -> Result<(), HarvestError> {
    self.tally(record);
    Ok(())
  }

  async fn end_window(&mut self, window: &Window) -> Result<(), HarvestError> { self.flush(window) }
}

/// What happens to records whose header is marked deleted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum DeletedRecords {
  /// Deliver deleted records alongside live ones
  #[default]
  Include,
  /// Drop deleted records
  Skip,
  /// Deliver deleted records only
  Only,
}

impl DeletedRecords {
  /// Whether a record with the given deleted flag is delivered.
  pub fn admits(&self, deleted: bool) -> bool {
    match self {
      DeletedRecords::Include => true,
      DeletedRecords::Skip => !deleted,
      DeletedRecords::Only => deleted,
    }
  }

  /// File name prefix for CSV output under this policy.
  pub fn file_prefix(&self) -> &'static str {
    match self {
      DeletedRecords::Only => "deleted_",
      _ => "",
    }
  }
}

/// Per-run settings of the orchestrator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOptions {
  /// Deleted-record policy
  pub deleted: DeletedRecords,
}

impl RunOptions {
  /// Options with the given deleted-record policy.
  pub fn new(deleted: DeletedRecords) -> Self { Self { deleted } }
}

/// How a window ended.
#[derive(Debug, Default)]
pub enum WindowOutcome {
  /// Every page was consumed
  #[default]
  Completed,
  /// The repository had no records for the window
  Empty,
  /// Harvesting stopped early; records delivered before the error are kept
  Abandoned {
    /// What stopped the window
    error: HarvestError,
  },
}

impl WindowOutcome {
  /// Whether the window was abandoned.
  pub fn is_abandoned(&self) -> bool { matches!(self, WindowOutcome::Abandoned { .. }) }
}

/// Counts and outcome of one window.
#[derive(Debug)]
pub struct WindowReport {
  /// The harvested window
  pub window:    Window,
  /// How it ended
  pub outcome:   WindowOutcome,
  /// Pages fetched
  pub pages:     usize,
  /// Records read from the source
  pub seen:      usize,
  /// Records among `seen` marked deleted
  pub deleted:   usize,
  /// Records dropped by the deleted-record policy
  pub skipped:   usize,
  /// Records the consumer accepted
  pub delivered: usize,
}

impl WindowReport {
  /// A fresh report for `window`.
  fn new(window: Window) -> Self {
    Self {
      window,
      outcome: WindowOutcome::Completed,
      pages: 0,
      seen: 0,
      deleted: 0,
      skipped: 0,
      delivered: 0,
    }
  }
}

/// Window reports of a run, in harvesting order.
#[derive(Debug, Default)]
pub struct RunReport {
  /// One report per window
  pub windows: Vec<WindowReport>,
}

impl RunReport {
  /// Records accepted across all windows.
  pub fn delivered(&self) -> usize { self.windows.iter().map(|w| w.delivered).sum() }

  /// Windows that were completed.
  pub fn completed(&self) -> usize {
    self.windows.iter().filter(|w| matches!(w.outcome, WindowOutcome::Completed)).count()
  }

  /// Windows the repository had no records for.
  pub fn empty(&self) -> usize {
    self.windows.iter().filter(|w| matches!(w.outcome, WindowOutcome::Empty)).count()
  }

  /// Windows that were abandoned.
  pub fn abandoned(&self) -> usize { self.windows.iter().filter(|w| w.outcome.is_abandoned()).count() }

  /// Appends the windows of `other`.
  pub fn extend(&mut self, other: RunReport) { self.windows.extend(other.windows) }
}

/// Drives harvests against one record source.
#[derive(Debug, Clone)]
pub struct Harvester<S: RecordSource> {
  /// Where pages come from
  source:          S,
  /// Metadata format requested
  metadata_prefix: String,
  /// Record set requested, if any
  set_spec:        Option<String>,
}

impl<S: RecordSource> Harvester<S> {
  /// A harvester requesting `oai_dc` records of the `publication` set.
  pub fn new(source: S) -> Self {
    Self { source, metadata_prefix: "oai_dc".to_string(), set_spec: Some("publication".to_string()) }
  }

  /// A harvester using the configured metadata prefix and set.
  pub fn from_config(source: S, config: &Config) -> Self {
    Self {
      source,
      metadata_prefix: config.metadata_prefix.clone(),
      set_spec: config.set_spec.clone(),
    }
  }

  /// Requests `metadata_prefix` instead.
  pub fn with_metadata_prefix(mut self, metadata_prefix: impl Into<String>) -> Self {
    self.metadata_prefix = metadata_prefix.into();
    self
  }

  /// Requests the set `set_spec`, or the whole repository for `None`.
  pub fn with_set_spec(mut self, set_spec: Option<String>) -> Self {
    self.set_spec = set_spec;
    self
  }

  /// The record source.
  pub fn source(&self) -> &S { &self.source }

  /// Harvests `[from, until)` in month-sized windows.
  pub async fn run<C: RecordConsumer>(
    &self,
    from: NaiveDate,
    until: NaiveDate,
    consumer: &mut C,
    options: RunOptions,
  ) -> RunReport {
    info!("Harvesting {from} until {until}");
    self.run_windows(plan_months(from, until), consumer, options).await
  }

  /// Harvests the given windows in order.
  pub async fn run_windows<C, I>(&self, windows: I, consumer: &mut C, options: RunOptions) -> RunReport
  where
    C: RecordConsumer,
    I: IntoIterator<Item = Window>, {
    let mut report = RunReport::default();
    for window in windows {
      report.windows.push(self.harvest_window(&window, consumer, options).await);
    }
    report
  }

  /// Everything from `start` up to yesterday.
  ///
  /// Whole months before the current one are harvested month by month without
  /// deleted records. The current month up to yesterday follows as one window
  /// under the caller's policy, unless it is empty.
  pub async fn backfill<C: RecordConsumer>(
    &self,
    start: NaiveDate,
    now: DateTime<Utc>,
    consumer: &mut C,
    options: RunOptions,
  ) -> RunReport {
    let today = now.date_naive();
    let month_start = first_of_month(today);
    let yesterday = today - Duration::days(1);

    info!("Backfilling from {start} until {yesterday}");
    let skip_deleted = RunOptions::new(DeletedRecords::Skip);
    let mut report = self.run_windows(plan_months(start, month_start), consumer, skip_deleted).await;

    let tail = Window::from_dates(start.max(month_start), yesterday);
    if tail.is_empty() {
      debug!("Nothing to harvest in the current month before {yesterday}");
    } else {
      report.extend(self.run_windows([tail], consumer, options).await);
    }
    report
  }

  /// The single day `date`.
  pub async fn day<C: RecordConsumer>(
    &self,
    date: NaiveDate,
    consumer: &mut C,
    options: RunOptions,
  ) -> RunReport {
    self.run_windows([Window::day(date)], consumer, options).await
  }

  /// The 24 hours before `now`.
  pub async fn yesterday<C: RecordConsumer>(
    &self,
    now: DateTime<Utc>,
    consumer: &mut C,
    options: RunOptions,
  ) -> RunReport {
    self.run_windows([Window::new(now - Duration::days(1), now)], consumer, options).await
  }

  /// Everything from midnight of `date` up to `now`, as a single window.
  pub async fn since<C: RecordConsumer>(
    &self,
    date: NaiveDate,
    now: DateTime<Utc>,
    consumer: &mut C,
    options: RunOptions,
  ) -> RunReport {
    self.run_windows([Window::new(midnight(date), now)], consumer, options).await
  }

  /// Harvests one window, never failing.
  pub async fn harvest_window<C: RecordConsumer>(
    &self,
    window: &Window,
    consumer: &mut C,
    options: RunOptions,
  ) -> WindowReport {
    info!("Processing {window}");
    let mut report = WindowReport::new(*window);

    let mut result = consumer.begin_window(window).await;
    if result.is_ok() {
      result = self.pull(window, consumer, options, &mut report).await;
    }
    let closed = consumer.end_window(window).await;

    report.outcome = match (result, closed) {
      (Err(error), _) if error.is_no_records_match() && report.pages == 0 => WindowOutcome::Empty,
      (Err(error), _) | (Ok(()), Err(error)) => WindowOutcome::Abandoned { error },
      (Ok(()), Ok(())) => WindowOutcome::Completed,
    };

    match &report.outcome {
      WindowOutcome::Completed => info!(
        pages = report.pages,
        seen = report.seen,
        skipped = report.skipped,
        "Written {} records for {window}",
        report.delivered
      ),
      WindowOutcome::Empty => info!("No records for {window}"),
      WindowOutcome::Abandoned { error } => error!(
        kind = error.kind(),
        delivered = report.delivered,
        "Abandoning {window}: {error}"
      ),
    }
    report
  }

  /// Pages through `window`, delivering admitted records to `consumer`.
  async fn pull<C: RecordConsumer>(
    &self,
    window: &Window,
    consumer: &mut C,
    options: RunOptions,
    report: &mut WindowReport,
  ) -> Result<(), HarvestError> {
    let mut token: Option<String> = None;
    loop {
      let request = match token.as_deref() {
        None => PageRequest::Initial {
          metadata_prefix: &self.metadata_prefix,
          set_spec: self.set_spec.as_deref(),
          window,
        },
        Some(token) => PageRequest::Resume { token },
      };
      let page = self.source.fetch_page(request).await?;
      report.pages += 1;
      trace!(records = page.records.len(), "Fetched page {} of {window}", report.pages);

      for raw in &page.records {
        report.seen += 1;
        if raw.is_deleted() {
          report.deleted += 1;
        }
        if !options.deleted.admits(raw.is_deleted()) {
          report.skipped += 1;
          continue;
        }
        consumer.consume(&normalize(raw)).await?;
        report.delivered += 1;
      }

      match page.resumption_token {
        Some(next) => token = Some(next),
        None => return Ok(()),
      }
    }
  }
}
