//! A library for harvesting bibliographic metadata from OAI-PMH repositories into
//! rotating CSV files, a SQLite database, or per-year article statistics.
//!
//! A harvest cuts a date range into month-sized windows, pages through each
//! window's `ListRecords` answer, flattens every Dublin Core record into a
//! [`FlatRecord`], and hands it to a consumer. Windows fail independently of
//! one another.
//!
//! # Example
//! ```rust,no_run
//! use chrono::NaiveDate;
//! use harvester::{
//!   harvest::{Collector, Harvester, RunOptions},
//!   sink::CsvSinkFactory,
//!   source::OaiClient,
//!   Config,
//! };
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!   let config = Config::default();
//!   std::fs::create_dir_all(&config.output_dir)?;
//!
//!   let harvester = Harvester::from_config(OaiClient::from_config(&config)?, &config);
//!   let mut collector = Collector::new(CsvSinkFactory::from_config(&config));
//!   let from = NaiveDate::from_ymd_opt(2022, 1, 1).unwrap();
//!   let until = NaiveDate::from_ymd_opt(2022, 4, 1).unwrap();
//!
//!   let report = harvester.run(from, until, &mut collector, RunOptions::default()).await;
//!   println!("Harvested {} records", report.delivered());
//!   Ok(())
//! }
//! ```

#![warn(missing_docs, clippy::missing_docs_in_private_items)]
use std::{
  collections::BTreeMap,
  fmt,
  path::{Path, PathBuf},
};

use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, trace, warn};
#[cfg(test)] use tracing_test::traced_test;

pub mod config;
pub mod errors;
pub mod harvest;
pub mod normalize;
pub mod record;
pub mod sink;
pub mod source;
pub mod stats;
pub mod window;

pub use config::Config;
pub use errors::HarvestError;
pub use record::{DcField, Field, FieldSchema, FlatRecord, Metadata, RawRecord, RecordHeader};
use sink::{RecordSink, SinkFactory};
use source::{RecordPage, RecordSource};
pub use window::Window;
