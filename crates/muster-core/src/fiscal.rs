//! Fiscal-period derivation for an April-start financial year.
//!
//! April is fiscal month 1 and March is fiscal month 12. A financial year is
//! named after the calendar years it spans, e.g. `2025-2026` runs from
//! April 2025 to March 2026.

use std::fmt;

use chrono::{DateTime, Datelike, Months, NaiveDate, Utc};
use chrono_tz::Tz;

/// A fiscal quarter within a financial year.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct FiscalPeriod {
  /// 1..=4.
  pub quarter:    u8,
  /// Calendar year of the April that opens the financial year.
  pub start_year: i32,
}

impl FiscalPeriod {
  /// The period containing the calendar date `date`.
  pub fn of(date: NaiveDate) -> Self {
    let month = date.month();
    let fiscal_month = (month + 8) % 12 + 1;
    let start_year = if month >= 4 { date.year() } else { date.year() - 1 };
    Self { quarter: fiscal_month.div_ceil(3) as u8, start_year }
  }

  /// The period containing `at`, judged by the calendar date in `tz`.
  pub fn of_instant(at: DateTime<Utc>, tz: Tz) -> Self {
    Self::of(at.with_timezone(&tz).date_naive())
  }

  /// The quarter that starts after the month containing `today`.
  ///
  /// Approval digests go out in the last month of a quarter and ask about
  /// the next one.
  pub fn upcoming(today: NaiveDate) -> Self {
    let first_of_month = today.with_day(1).unwrap_or(today);
    let next = first_of_month
      .checked_add_months(Months::new(1))
      .unwrap_or(first_of_month);
    Self::of(next)
  }

  /// `Q1` … `Q4`.
  pub fn quarter_label(&self) -> String { format!("Q{}", self.quarter) }

  /// `2025-2026`.
  pub fn financial_year_label(&self) -> String {
    format!("{}-{}", self.start_year, self.start_year + 1)
  }
}

impl fmt::Display for FiscalPeriod {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "Q{} FY {}-{}", self.quarter, self.start_year, self.start_year + 1)
  }
}

/// The `(quarter, financial_year)` labels stored alongside an event date.
pub fn derive_labels(
  event_date: Option<DateTime<Utc>>,
  tz: Tz,
) -> (Option<String>, Option<String>) {
  match event_date {
    Some(at) => {
      let period = FiscalPeriod::of_instant(at, tz);
      (Some(period.quarter_label()), Some(period.financial_year_label()))
    }
    None => (None, None),
  }
}
