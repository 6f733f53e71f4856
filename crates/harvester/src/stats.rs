//! Per-year article statistics, the count-only alternative to writing records.
//!
//! A [`StatsAggregator`] tallies live article records per publication year into a
//! [`YearCounter`] and appends the running totals to a `;`-separated file after
//! each window:
//!
//! ```text
//! from;to;year;doi;nodoi;total
//! 2021-01-01;2021-02-01;2021;2;1;3
//! ```
//!
//! The counter lives for one run. The totals file is append-only and survives
//! across runs.

use std::fs::OpenOptions;

use ::csv::WriterBuilder;
use lazy_static::lazy_static;
use regex::Regex;

use super::*;

/// The only `dc:type` that is counted.
pub const ARTICLE_TYPE: &str = "info:eu-repo/semantics/article";

/// Years tracked when nothing else is configured.
pub const DEFAULT_TRACKED_YEARS: [&str; 5] = ["2018", "2019", "2020", "2021", "2022"];

/// Header of the totals file.
pub const TOTALS_HEADER: [&str; 6] = ["from", "to", "year", "doi", "nodoi", "total"];

/// Counts for one year.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct YearTally {
  /// Articles with a DOI
  pub doi:   u64,
  /// Articles without a DOI
  pub nodoi: u64,
  /// All counted articles
  pub total: u64,
}

/// Tallies for a fixed set of years.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct YearCounter {
  /// Tally per tracked year
  years: BTreeMap<String, YearTally>,
}

impl YearCounter {
  /// A counter tracking exactly `years`, all at zero.
  pub fn new<I, S>(years: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>, {
    Self { years: years.into_iter().map(|year| (year.into(), YearTally::default())).collect() }
  }

  /// Counts `record` if it is a live article from a tracked year.
  ///
  /// Returns whether the record was counted.
  pub fn tally(&mut self, record: &FlatRecord) -> bool {
    lazy_static! {
      static ref YEAR: Regex = Regex::new(r"^(\d{4})").unwrap();
    }

    if record.deleted || record.record_type != ARTICLE_TYPE {
      return false;
    }
    let Some(year) = YEAR.captures(&record.date).and_then(|cap| cap.get(1)) else {
      return false;
    };
    let Some(tally) = self.years.get_mut(year.as_str()) else {
      return false;
    };

    tally.total += 1;
    if record.doi.is_empty() {
      tally.nodoi += 1;
    } else {
      tally.doi += 1;
    }
    true
  }

  /// Tally of one year, if tracked.
  pub fn get(&self, year: &str) -> Option<&YearTally> { self.years.get(year) }

  /// Tracked years in ascending order with their tallies.
  pub fn iter(&self) -> impl Iterator<Item = (&str, &YearTally)> {
    self.years.iter().map(|(year, tally)| (year.as_str(), tally))
  }
}

impl Default for YearCounter {
  fn default() -> Self { Self::new(DEFAULT_TRACKED_YEARS) }
}

/// Running article statistics for one harvest run.
#[derive(Debug, Clone)]
pub struct StatsAggregator {
  /// Counts so far in this run
  counter:     YearCounter,
  /// File the totals are appended to
  totals_path: PathBuf,
}

impl StatsAggregator {
  /// An aggregator appending to `totals_path` and tracking `counter`'s years.
  pub fn new(totals_path: impl Into<PathBuf>, counter: YearCounter) -> Self {
    Self { counter, totals_path: totals_path.into() }
  }

  /// An aggregator using the configured totals file and tracked years.
  pub fn from_config(config: &Config) -> Self {
    Self::new(config.totals_path(), YearCounter::new(config.tracked_years.iter().cloned()))
  }

  /// Counts one record, see [`YearCounter::tally`].
  pub fn tally(&mut self, record: &FlatRecord) -> bool { self.counter.tally(record) }

  /// Counts so far.
  pub fn counter(&self) -> &YearCounter { &self.counter }

  /// The totals file.
  pub fn totals_path(&self) -> &Path { &self.totals_path }

  /// Appends one row per tracked year for `window` to the totals file.
  ///
  /// The header is written only when the file is new or empty; existing rows are
  /// never touched.
  pub fn flush(&self, window: &Window) -> Result<(), HarvestError> {
    let file = OpenOptions::new().create(true).append(true).open(&self.totals_path)?;
    let needs_header = file.metadata()?.len() == 0;

    let mut writer = WriterBuilder::new().delimiter(b';').has_headers(false).from_writer(file);
    if needs_header {
      writer.write_record(TOTALS_HEADER)?;
    }

    let from = window.from.format("%Y-%m-%d").to_string();
    let until = window.until.format("%Y-%m-%d").to_string();
    for (year, tally) in self.counter.iter() {
      let [doi, nodoi, total] = [tally.doi, tally.nodoi, tally.total].map(|n| n.to_string());
      writer.write_record([
        from.as_str(),
        until.as_str(),
        year,
        doi.as_str(),
        nodoi.as_str(),
        total.as_str(),
      ])?;
    }
    writer.flush()?;

    info!(path = %self.totals_path.display(), "Appended totals for {window}");
    Ok(())
  }
}
