//! Error types for the harvest CLI.
//!
//! Everything that stops the command before or around a run ends up here:
//! configuration and argument problems, output locations that cannot be
//! created, and log file setup. Failures inside a single harvest window never
//! do; the orchestrator reports those per window instead.

use chrono::NaiveDate;
use thiserror::Error;

/// Errors that can occur while running a harvest command.
#[derive(Error, Debug)]
pub enum HarvestCliError {
  /// Errors from the underlying harvester library
  #[error(transparent)]
  Harvester(#[from] harvester::errors::HarvestError),

  /// File system and IO operation errors
  #[error(transparent)]
  IO(#[from] std::io::Error),

  /// The log file could not be opened
  #[error(transparent)]
  LogFile(#[from] tracing_appender::rolling::InitError),

  /// A range whose start is not before its end
  #[error("Range start {from} must be before its end {until}")]
  EmptyRange {
    /// Requested start
    from:  NaiveDate,
    /// Requested end
    until: NaiveDate,
  },
}
