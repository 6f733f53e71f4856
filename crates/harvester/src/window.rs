//! Date windows and month planning.
//!
//! A harvest never asks the repository for an arbitrary range in one go. The
//! range is cut into month-aligned [`Window`]s by [`plan_months`], and each window
//! is harvested on its own.
//!
//! # Examples
//!
//! ```
//! use chrono::NaiveDate;
//! use harvester::window::plan_months;
//!
//! let from = NaiveDate::from_ymd_opt(2020, 1, 15).unwrap();
//! let until = NaiveDate::from_ymd_opt(2020, 3, 10).unwrap();
//! let windows: Vec<_> = plan_months(from, until).collect();
//!
//! // [01-15, 02-01), [02-01, 03-01), [03-01, 03-10)
//! assert_eq!(windows.len(), 3);
//! assert_eq!(windows[0].until, windows[1].from);
//! ```

use std::iter::FusedIterator;

use chrono::{Days, Months, NaiveTime};

use super::*;

/// A half-open harvesting interval `[from, until)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Window {
  /// Inclusive start
  pub from:  DateTime<Utc>,
  /// Exclusive end
  pub until: DateTime<Utc>,
}

impl Window {
  /// Creates a window from two instants.
  pub fn new(from: DateTime<Utc>, until: DateTime<Utc>) -> Self { Self { from, until } }

  /// A window from midnight UTC of `from` to midnight UTC of `until`.
  pub fn from_dates(from: NaiveDate, until: NaiveDate) -> Self {
    Self::new(midnight(from), midnight(until))
  }

  /// The single day `[date, date + 1 day)`.
  pub fn day(date: NaiveDate) -> Self {
    let start = midnight(date);
    Self::new(start, start + Duration::days(1))
  }

  /// Whether the window covers no time at all.
  pub fn is_empty(&self) -> bool { self.from >= self.until }

  /// Whether `instant` falls inside the window.
  pub fn contains(&self, instant: DateTime<Utc>) -> bool {
    self.from <= instant && instant < self.until
  }
}

impl fmt::Display for Window {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(
      f,
      "[{}, {})",
      self.from.format(record::DATESTAMP_FORMAT),
      self.until.format(record::DATESTAMP_FORMAT)
    )
  }
}

/// Midnight UTC at the start of `date`.
pub fn midnight(date: NaiveDate) -> DateTime<Utc> { date.and_time(NaiveTime::MIN).and_utc() }

/// The first day of the month containing `date`.
pub fn first_of_month(date: NaiveDate) -> NaiveDate {
  date - Days::new(u64::from(date.day0()))
}

/// Plans month-aligned windows covering `[from, until)`.
///
/// The first window starts at `from`, every later boundary is the first day of a
/// month, and the last window ends at `until`. A range inside one month gives one
/// window; `from >= until` gives none.
pub fn plan_months(from: NaiveDate, until: NaiveDate) -> MonthPlan { MonthPlan { next: from, until } }

/// Lazy sequence of month windows, see [`plan_months`].
///
/// Cloning the plan restarts it from wherever the clone was taken.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonthPlan {
  /// Start of the next window to yield
  next:  NaiveDate,
  /// End of the whole plan
  until: NaiveDate,
}

impl Iterator for MonthPlan {
  type Item = Window;

  fn next(&mut self) -> Option<Window> {
    if self.next >= self.until {
      return None;
    }

    let start = self.next;
    let end = first_of_month(start)
      .checked_add_months(Months::new(1))
      .filter(|boundary| *boundary < self.until)
      .unwrap_or(self.until);
    self.next = end;
    Some(Window::from_dates(start, end))
  }
}

impl FusedIterator for MonthPlan {}
