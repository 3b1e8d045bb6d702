//! Local wall-clock schedules and next-fire computation.

use std::fmt;

use chrono::{DateTime, Days, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use muster_core::rule::local_date;

/// A local time of day written `HH:MM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct LocalTime(pub NaiveTime);

impl LocalTime {
  pub fn hm(hour: u32, minute: u32) -> Self {
    Self(NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or(NaiveTime::MIN))
  }
}

impl TryFrom<String> for LocalTime {
  type Error = String;

  fn try_from(value: String) -> Result<Self, Self::Error> {
    NaiveTime::parse_from_str(value.trim(), "%H:%M")
      .or_else(|_| NaiveTime::parse_from_str(value.trim(), "%H:%M:%S"))
      .map(Self)
      .map_err(|e| format!("invalid time of day {value:?}: {e}"))
  }
}

impl From<LocalTime> for String {
  fn from(value: LocalTime) -> Self { value.to_string() }
}

impl fmt::Display for LocalTime {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.0.format("%H:%M"))
  }
}

/// When a job fires, in the engine's time zone.
///
/// Empty `months` means every month; no `day` means every day. A daily job
/// is therefore just `{ at = "09:15" }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schedule {
  pub at:     LocalTime,
  #[serde(default)]
  pub months: Vec<u32>,
  #[serde(default)]
  pub day:    Option<u32>,
}

impl Schedule {
  pub fn daily(at: LocalTime) -> Self {
    Self { at, months: Vec::new(), day: None }
  }

  /// On `day` of each of `months`.
  pub fn monthly(at: LocalTime, months: &[u32], day: u32) -> Self {
    Self { at, months: months.to_vec(), day: Some(day) }
  }

  pub fn fires_on(&self, date: NaiveDate) -> bool {
    use chrono::Datelike;
    (self.months.is_empty() || self.months.contains(&date.month()))
      && self.day.is_none_or(|d| d == date.day())
  }

  /// The first firing strictly after `now`, or `None` if the schedule can
  /// never fire (e.g. day 31 of February only).
  pub fn next_after(&self, now: DateTime<Utc>, tz: Tz) -> Option<DateTime<Utc>> {
    let today = local_date(now, tz);
    (0..=366u64)
      .filter_map(|n| today.checked_add_days(Days::new(n)))
      .filter(|date| self.fires_on(*date))
      .filter_map(|date| fire_instant(date, self.at, tz))
      .find(|at| *at > now)
  }
}

impl fmt::Display for Schedule {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match (self.day, self.months.is_empty()) {
      (None, true) => write!(f, "daily at {}", self.at),
      (Some(day), true) => write!(f, "day {day} of every month at {}", self.at),
      (day, false) => {
        let months: Vec<String> =
          self.months.iter().map(ToString::to_string).collect();
        match day {
          Some(day) => write!(
            f,
            "day {day} of months {} at {}",
            months.join(","),
            self.at
          ),
          None => write!(f, "daily in months {} at {}", months.join(","), self.at),
        }
      }
    }
  }
}

/// `date` at `at` local time. A time inside a DST gap fires at the first
/// valid local minute after it.
fn fire_instant(date: NaiveDate, at: LocalTime, tz: Tz) -> Option<DateTime<Utc>> {
  let local = date.and_time(at.0);
  (0..=120)
    .find_map(|step| {
      tz.from_local_datetime(&(local + chrono::Duration::minutes(step)))
        .earliest()
    })
    .map(|dt| dt.with_timezone(&Utc))
}
