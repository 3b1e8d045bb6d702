//! Time-window trigger rules and the pure logic that evaluates them.
//!
//! A rule selects records of one kind whose date field falls on a single
//! local calendar day, computed relative to "today" in the engine's time
//! zone. The window is half-open and its boundaries are local midnights
//! converted to UTC instants; UTC day boundaries are never used.

use chrono::{DateTime, Days, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::{
  record::{Kind, Record, Status},
  store::RecordQuery,
};

/// Whether the offset counts towards or away from the event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
  #[default]
  Before,
  After,
}

/// The record field a rule's window is matched against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DateField {
  #[default]
  EventDate,
}

impl DateField {
  pub fn of(self, record: &Record) -> Option<DateTime<Utc>> {
    match self {
      Self::EventDate => record.event_date,
    }
  }
}

// ─── Window ──────────────────────────────────────────────────────────────────

/// A half-open instant range `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
  pub start: DateTime<Utc>,
  pub end:   DateTime<Utc>,
}

impl Window {
  pub fn contains(&self, at: DateTime<Utc>) -> bool {
    self.start <= at && at < self.end
  }

  /// The whole local calendar day `date` in `tz`.
  pub fn day(date: NaiveDate, tz: Tz) -> Self {
    Self::days(date, date, tz)
  }

  /// Local days `first..=last` in `tz`.
  pub fn days(first: NaiveDate, last: NaiveDate, tz: Tz) -> Self {
    let after_last = last.checked_add_days(Days::new(1)).unwrap_or(last);
    Self { start: start_of_day(first, tz), end: start_of_day(after_last, tz) }
  }
}

/// The first instant of the local calendar day `date` in `tz`.
///
/// Where a zone skips midnight (DST gap) this is the first valid local time
/// after it; where midnight repeats, the earlier instant.
pub fn start_of_day(date: NaiveDate, tz: Tz) -> DateTime<Utc> {
  let midnight = date.and_time(NaiveTime::MIN);
  (0..=48)
    .find_map(|step| {
      tz.from_local_datetime(&(midnight + Duration::minutes(30 * step)))
        .earliest()
    })
    .map(|local| local.with_timezone(&Utc))
    .unwrap_or_else(|| Utc.from_utc_datetime(&midnight))
}

/// The local calendar date of `now` in `tz`.
pub fn local_date(now: DateTime<Utc>, tz: Tz) -> NaiveDate {
  now.with_timezone(&tz).date_naive()
}

// ─── Rule ────────────────────────────────────────────────────────────────────

/// The evaluation half of a notification rule: which records, on which day,
/// guarded by which flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
  pub name:          String,
  pub kind:          Kind,
  pub statuses:      Vec<Status>,
  #[serde(default)]
  pub date_field:    DateField,
  pub offset_days:   u32,
  #[serde(default)]
  pub direction:     Direction,
  pub flag:          String,
  /// Extra earlier days the window also covers, so a day missed by the
  /// scheduler is picked up on the next run. `0` keeps the single-day
  /// window.
  #[serde(default)]
  pub catch_up_days: u32,
}

impl Rule {
  /// The calendar day whose events this rule targets when run on `today`.
  pub fn target_date(&self, today: NaiveDate) -> NaiveDate {
    let offset = Days::new(u64::from(self.offset_days));
    let target = match self.direction {
      Direction::Before => today.checked_add_days(offset),
      Direction::After => today.checked_sub_days(offset),
    };
    target.unwrap_or(today)
  }

  /// The match window for a run on `today`.
  pub fn window(&self, today: NaiveDate, tz: Tz) -> Window {
    let target = self.target_date(today);
    let mut first = target
      .checked_sub_days(Days::new(u64::from(self.catch_up_days)))
      .unwrap_or(target);
    // Upcoming-event reminders never reach back past today.
    if self.direction == Direction::Before && first < today {
      first = today;
    }
    Window::days(first, target, tz)
  }

  /// Statuses from the filter that can actually match; terminal statuses
  /// never do.
  pub fn live_statuses(&self) -> Vec<Status> {
    self
      .statuses
      .iter()
      .copied()
      .filter(|s| !s.is_terminal())
      .collect()
  }

  /// The store query selecting this rule's candidates for `today`.
  pub fn query(&self, today: NaiveDate, tz: Tz) -> RecordQuery {
    RecordQuery {
      kind:        self.kind,
      statuses:    self.live_statuses(),
      date_range:  Some(self.window(today, tz)),
      unsent_flag: Some(self.flag.clone()),
    }
  }

  /// In-memory form of [`Self::query`].
  pub fn matches(&self, record: &Record, today: NaiveDate, tz: Tz) -> bool {
    record.kind == self.kind
      && !record.status.is_terminal()
      && self.statuses.contains(&record.status)
      && !record.flag(&self.flag)
      && self
        .date_field
        .of(record)
        .is_some_and(|at| self.window(today, tz).contains(at))
  }
}

#[cfg(test)]
mod tests {
  use std::collections::BTreeMap;

  use chrono_tz::Asia::Kolkata;
  use uuid::Uuid;

  use super::*;
  use crate::record::{Priority, RecordDetails};

  fn today() -> NaiveDate { NaiveDate::from_ymd_opt(2025, 4, 1).unwrap() }

  fn two_week_rule() -> Rule {
    Rule {
      name:          "outing_two_week_notice".into(),
      kind:          Kind::Outing,
      statuses:      vec![Status::Scheduled],
      date_field:    DateField::EventDate,
      offset_days:   14,
      direction:     Direction::Before,
      flag:          "outing_two_week_notice".into(),
      catch_up_days: 0,
    }
  }

  fn outing(at: DateTime<Utc>, status: Status) -> Record {
    Record {
      id: Uuid::new_v4(),
      kind: Kind::Outing,
      topic: "Offsite".into(),
      description: String::new(),
      status,
      event_date: Some(at),
      priority: Priority::P2,
      proposed_by_role: "HR".into(),
      proposed_by_name: "HR".into(),
      proposed_at: Utc::now(),
      quarter: None,
      financial_year: None,
      reminder_flags: BTreeMap::new(),
      feedback: Vec::new(),
      discrepancies: Vec::new(),
      archived_at: None,
      details: RecordDetails::empty(Kind::Outing),
    }
  }

  #[test]
  fn window_is_local_midnight_to_local_midnight() {
    let w = two_week_rule().window(today(), Kolkata);
    // 15 Apr 00:00 IST == 14 Apr 18:30 UTC.
    assert_eq!(w.start, Utc.with_ymd_and_hms(2025, 4, 14, 18, 30, 0).unwrap());
    assert_eq!(w.end, Utc.with_ymd_and_hms(2025, 4, 15, 18, 30, 0).unwrap());
  }

  #[test]
  fn window_start_matches_and_end_does_not() {
    let rule = two_week_rule();
    let w = rule.window(today(), Kolkata);
    assert!(rule.matches(&outing(w.start, Status::Scheduled), today(), Kolkata));
    assert!(!rule.matches(&outing(w.end, Status::Scheduled), today(), Kolkata));
    assert!(rule.matches(
      &outing(w.end - Duration::microseconds(1), Status::Scheduled),
      today(),
      Kolkata
    ));
  }

  #[test]
  fn utc_day_boundary_is_not_the_window() {
    let rule = two_week_rule();
    // 15 Apr 20:00 UTC is already 16 Apr in Kolkata.
    let late = Utc.with_ymd_and_hms(2025, 4, 15, 20, 0, 0).unwrap();
    assert!(!rule.matches(&outing(late, Status::Scheduled), today(), Kolkata));
  }

  #[test]
  fn set_flag_excludes_record() {
    let rule = two_week_rule();
    let mut r = outing(rule.window(today(), Kolkata).start, Status::Scheduled);
    r.reminder_flags.insert(rule.flag.clone(), true);
    assert!(!rule.matches(&r, today(), Kolkata));
  }

  #[test]
  fn terminal_statuses_never_match_even_if_listed() {
    let mut rule = two_week_rule();
    rule.statuses = vec![Status::Scheduled, Status::Archived, Status::Rejected];
    let at = rule.window(today(), Kolkata).start;
    for status in [Status::Archived, Status::Rejected] {
      assert!(!rule.matches(&outing(at, status), today(), Kolkata));
    }
    assert_eq!(rule.live_statuses(), vec![Status::Scheduled]);
  }

  #[test]
  fn after_direction_targets_the_past() {
    let mut rule = two_week_rule();
    rule.direction = Direction::After;
    rule.offset_days = 1;
    assert_eq!(rule.target_date(today()), NaiveDate::from_ymd_opt(2025, 3, 31).unwrap());
  }

  #[test]
  fn catch_up_widens_towards_today_only() {
    let mut rule = two_week_rule();
    rule.catch_up_days = 2;
    let w = rule.window(today(), Kolkata);
    assert_eq!(w.start, start_of_day(NaiveDate::from_ymd_opt(2025, 4, 13).unwrap(), Kolkata));
    assert_eq!(w.end, start_of_day(NaiveDate::from_ymd_opt(2025, 4, 16).unwrap(), Kolkata));

    rule.offset_days = 1;
    rule.catch_up_days = 5;
    assert_eq!(rule.window(today(), Kolkata).start, start_of_day(today(), Kolkata));
  }

  #[test]
  fn start_of_day_skips_a_dst_gap() {
    // Santiago jumps from 00:00 to 01:00 on 7 Sep 2025.
    let tz = chrono_tz::America::Santiago;
    let date = NaiveDate::from_ymd_opt(2025, 9, 7).unwrap();
    let start = start_of_day(date, tz);
    assert_eq!(start.with_timezone(&tz).date_naive(), date);
  }
}
