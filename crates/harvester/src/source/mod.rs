//! Paged record sources.
//!
//! The orchestrator pulls records through the [`RecordSource`] trait one page at a
//! time. A page is requested either with the initial query for a window or with
//! the resumption token handed out by the previous page; an absent token ends the
//! window.
//!
//! # Supported Sources
//!
//! - [`oai`] - An OAI-PMH repository answering `ListRecords` over HTTP
//!
//! # Examples
//!
//! ```no_run
//! use chrono::NaiveDate;
//! use harvester::{
//!   source::{OaiClient, PageRequest, RecordSource},
//!   window::Window,
//! };
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = OaiClient::new("http://oai.narcis.nl/oai")?;
//! let window = Window::day(NaiveDate::from_ymd_opt(2022, 5, 1).unwrap());
//! let page = client
//!   .fetch_page(PageRequest::Initial {
//!     metadata_prefix: "oai_dc",
//!     set_spec:        Some("publication"),
//!     window:          &window,
//!   })
//!   .await?;
//! println!("{} records, more: {}", page.records.len(), page.resumption_token.is_some());
//! # Ok(())
//! # }
//! ```

use super::*;

pub mod oai;

pub use oai::OaiClient;

/// What to ask a record source for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageRequest<'a> {
  /// First page of a window.
  Initial {
    /// Metadata format, e.g. `oai_dc`
    metadata_prefix: &'a str,
    /// Record set to restrict to, if any
    set_spec:        Option<&'a str>,
    /// The window to list
    window:          &'a Window,
  },
  /// A follow-up page.
  Resume {
    /// Token from the previous page
    token: &'a str,
  },
}

/// One page of records.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordPage {
  /// Records in repository order
  pub records:          Vec<RawRecord>,
  /// Token for the next page; `None` on the last page
  pub resumption_token: Option<String>,
}

/// A source of paged records.
///
/// Implementations answer [`HarvestError::NoRecordsMatch`] when a window holds no
/// records at all. Any other error abandons the window being harvested.
#[allow(async_fn_in_trait)]
pub trait RecordSource {
  /// Fetches one page.
  async fn fetch_page(&self, request: PageRequest<'_>) -> Result<RecordPage, HarvestError>;
}

impl<T: RecordSource> RecordSource for &T {
  async fn fetch_page(&self, request: PageRequest<'_>) -> Result<RecordPage, HarvestError> {
    (**self).fetch_page(request).await
  }
}
