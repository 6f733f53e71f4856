//! Error types for the harvester library.
//!
//! A single error enum covers every failure the harvester can surface:
//! - Transport and protocol errors from the OAI-PMH endpoint
//! - CSV and database sink failures
//! - Configuration and input validation
//!
//! The one condition that is *not* a failure is an empty result window. The
//! source reports it as [`HarvestError::NoRecordsMatch`] and the orchestrator
//! turns it into [`WindowOutcome::Empty`](crate::harvest::WindowOutcome::Empty)
//! instead of abandoning the window.
//!
//! # Examples
//!
//! ```
//! use harvester::errors::HarvestError;
//!
//! let err = HarvestError::NoRecordsMatch;
//! assert!(err.is_no_records_match());
//!
//! let err = HarvestError::Oai { code: "badArgument".into(), message: "bad from".into() };
//! assert!(!err.is_no_records_match());
//! ```

use thiserror::Error;

/// Errors that can occur while harvesting, writing or configuring.
#[derive(Error, Debug)]
pub enum HarvestError {
  /// The repository answered `noRecordsMatch` for the requested window.
  ///
  /// This is the "empty window" signal and never abandons a run.
  #[error("No records match the request")]
  NoRecordsMatch,

  /// The repository answered with any other OAI-PMH error code.
  ///
  /// Non-success HTTP statuses without a parsable OAI error body are also
  /// reported here, with the status as the code.
  #[error("OAI-PMH error: {code} - {message}")]
  Oai {
    /// Standard OAI-PMH error code, or the HTTP status
    code:    String,
    /// Human-readable message from the repository
    message: String,
  },

  /// The response body could not be parsed as an OAI-PMH document.
  #[error("Failed to parse XML: {0}")]
  Xml(String),

  /// A record header carried a datestamp in neither supported granularity.
  #[error("Invalid datestamp: {0}")]
  InvalidDatestamp(String),

  /// A user-supplied date could not be parsed.
  #[error("Invalid date `{0}`, expected YYYY-MM-DD")]
  InvalidDate(String),

  /// A consumer was handed a record before a window was opened on it.
  #[error("Record delivered outside of an open window")]
  NoOpenWindow,

  /// The configuration failed validation.
  #[error("Invalid configuration: {0}")]
  InvalidConfig(String),

  /// A network request failed.
  #[error(transparent)]
  Network(#[from] reqwest::Error),

  /// The configured base URL is not a URL.
  #[error(transparent)]
  InvalidUrl(#[from] url::ParseError),

  /// Writing a CSV row failed.
  #[error(transparent)]
  Csv(#[from] csv::Error),

  /// A SQLite operation failed.
  #[error(transparent)]
  Sqlite(#[from] rusqlite::Error),

  /// An async SQLite operation failed.
  #[error(transparent)]
  AsyncSqlite(#[from] tokio_rusqlite::Error),

  /// A file system operation failed.
  #[error(transparent)]
  Io(#[from] std::io::Error),

  /// The configuration file is not valid TOML for [`Config`](crate::config::Config).
  #[error(transparent)]
  ConfigParse(#[from] toml::de::Error),

  /// The configuration could not be rendered as TOML.
  #[error(transparent)]
  ConfigRender(#[from] toml::ser::Error),
}

impl HarvestError {
  /// Checks if this error is the repository's "no records matched" answer.
  ///
  /// The orchestrator uses this to tell an empty window apart from a broken one.
  pub fn is_no_records_match(&self) -> bool { matches!(self, HarvestError::NoRecordsMatch) }

  /// Short name of the error variant, used as a structured log field when a
  /// window is abandoned.
  pub fn kind(&self) -> &'static str {
    match self {
      HarvestError::NoRecordsMatch => "no_records_match",
      HarvestError::Oai { .. } => "oai",
      HarvestError::Xml(_) => "xml",
      HarvestError::InvalidDatestamp(_) => "invalid_datestamp",
      HarvestError::InvalidDate(_) => "invalid_date",
      HarvestError::NoOpenWindow => "no_open_window",
      HarvestError::InvalidConfig(_) => "invalid_config",
      HarvestError::Network(_) => "network",
      HarvestError::InvalidUrl(_) => "invalid_url",
      HarvestError::Csv(_) => "csv",
      HarvestError::Sqlite(_) => "sqlite",
      HarvestError::AsyncSqlite(_) => "async_sqlite",
      HarvestError::Io(_) => "io",
      HarvestError::ConfigParse(_) => "config_parse",
      HarvestError::ConfigRender(_) => "config_render",
    }
  }
}
