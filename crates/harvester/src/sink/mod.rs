//! Destinations for normalized records.
//!
//! A [`RecordSink`] accepts [`FlatRecord`]s one at a time and decides on its own
//! when to rotate the storage underneath. A [`SinkFactory`] hands out a fresh sink
//! for every harvested window, so sinks can embed their window in file names.
//!
//! - [`file`] - Rotating `$`-delimited CSV files
//! - [`database`] - Single-row inserts into SQLite

use super::*;

pub mod database;
pub mod file;

pub use database::{Database, DatabaseSink, DatabaseSinkFactory};
pub use file::{CsvSink, CsvSinkFactory};

/// Accepts normalized records for one window.
#[allow(async_fn_in_trait)]
pub trait RecordSink {
  /// Stores one record.
  async fn accept(&mut self, record: &FlatRecord) -> Result<(), HarvestError>;

  /// Flushes and releases whatever the sink holds open.
  ///
  /// Must be idempotent and safe to call when nothing was ever written.
  async fn close(&mut self) -> Result<(), HarvestError>;
}

/// Opens a fresh sink per window.
#[allow(async_fn_in_trait)]
pub trait SinkFactory {
  /// The sink type handed out.
  type Sink: RecordSink;

  /// Opens the sink for `window`.
  async fn open(&self, window: &Window) -> Result<Self::Sink, HarvestError>;
}
