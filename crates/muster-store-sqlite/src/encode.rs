//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as fixed-width RFC 3339 UTC strings
//! (`2025-04-15T04:30:00.000000Z`) so that lexicographic comparison in SQL
//! agrees with chronological order. Enums are stored as their snake_case
//! names; record details as kind-tagged JSON.

use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat, Utc};
use muster_core::record::{
  Discrepancy, Feedback, Kind, Priority, Record, RecordDetails, Status,
};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ─────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── DateTime<Utc> ────────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

fn decode_opt_dt(s: Option<String>) -> Result<Option<DateTime<Utc>>> {
  s.as_deref().map(decode_dt).transpose()
}

// ─── Enums ────────────────────────────────────────────────────────────────────

pub fn decode_kind(s: &str) -> Result<Kind> {
  s.parse()
    .map_err(|_| muster_core::Error::UnknownKind(s.to_owned()).into())
}

pub fn decode_status(s: &str) -> Result<Status> {
  s.parse()
    .map_err(|_| muster_core::Error::UnknownStatus(s.to_owned()).into())
}

pub fn decode_priority(s: &str) -> Result<Priority> {
  s.parse()
    .map_err(|_| muster_core::Error::UnknownPriority(s.to_owned()).into())
}

// ─── Details ─────────────────────────────────────────────────────────────────

pub fn encode_details(d: &RecordDetails) -> Result<String> {
  Ok(serde_json::to_string(d)?)
}

pub fn decode_details(s: &str) -> Result<RecordDetails> {
  Ok(serde_json::from_str(s)?)
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Column list matching the field order of [`RawRecord::from_row`].
pub const RECORD_COLUMNS: &str = "record_id, kind, topic, description, status,
  event_date, priority, proposed_by_role, proposed_by_name, proposed_at,
  quarter, financial_year, details_json, archived_at";

/// Raw strings read from a `records` row plus its child tables.
pub struct RawRecord {
  pub record_id:        String,
  pub kind:             String,
  pub topic:            String,
  pub description:      String,
  pub status:           String,
  pub event_date:       Option<String>,
  pub priority:         String,
  pub proposed_by_role: String,
  pub proposed_by_name: String,
  pub proposed_at:      String,
  pub quarter:          Option<String>,
  pub financial_year:   Option<String>,
  pub details_json:     String,
  pub archived_at:      Option<String>,
  // child tables
  pub flags:            Vec<String>,
  pub feedback:         Vec<RawFeedback>,
  pub discrepancies:    Vec<RawDiscrepancy>,
}

impl RawRecord {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      record_id:        row.get(0)?,
      kind:             row.get(1)?,
      topic:            row.get(2)?,
      description:      row.get(3)?,
      status:           row.get(4)?,
      event_date:       row.get(5)?,
      priority:         row.get(6)?,
      proposed_by_role: row.get(7)?,
      proposed_by_name: row.get(8)?,
      proposed_at:      row.get(9)?,
      quarter:          row.get(10)?,
      financial_year:   row.get(11)?,
      details_json:     row.get(12)?,
      archived_at:      row.get(13)?,
      flags:            Vec::new(),
      feedback:         Vec::new(),
      discrepancies:    Vec::new(),
    })
  }

  /// Fill the child-table fields from the same connection.
  pub fn load_children(
    &mut self,
    conn: &rusqlite::Connection,
  ) -> rusqlite::Result<()> {
    let id = self.record_id.as_str();

    self.flags = conn
      .prepare_cached(
        "SELECT flag FROM reminder_flags WHERE record_id = ?1 ORDER BY flag",
      )?
      .query_map([id], |r| r.get(0))?
      .collect::<rusqlite::Result<_>>()?;

    self.feedback = conn
      .prepare_cached(
        "SELECT participant, attended, overall_rating, content_quality,
                comments, submitted_at
         FROM feedback WHERE record_id = ?1 ORDER BY feedback_id",
      )?
      .query_map([id], |r| {
        Ok(RawFeedback {
          participant:     r.get(0)?,
          attended:        r.get(1)?,
          overall_rating:  r.get(2)?,
          content_quality: r.get(3)?,
          comments:        r.get(4)?,
          submitted_at:    r.get(5)?,
        })
      })?
      .collect::<rusqlite::Result<_>>()?;

    self.discrepancies = conn
      .prepare_cached(
        "SELECT participant, reason, created_at
         FROM discrepancies WHERE record_id = ?1 ORDER BY created_at, participant",
      )?
      .query_map([id], |r| {
        Ok(RawDiscrepancy {
          participant: r.get(0)?,
          reason:      r.get(1)?,
          created_at:  r.get(2)?,
        })
      })?
      .collect::<rusqlite::Result<_>>()?;

    Ok(())
  }

  pub fn into_record(self) -> Result<Record> {
    let reminder_flags: BTreeMap<String, bool> =
      self.flags.into_iter().map(|f| (f, true)).collect();

    let feedback = self
      .feedback
      .into_iter()
      .map(RawFeedback::into_feedback)
      .collect::<Result<_>>()?;

    let discrepancies = self
      .discrepancies
      .into_iter()
      .map(RawDiscrepancy::into_discrepancy)
      .collect::<Result<_>>()?;

    Ok(Record {
      id: decode_uuid(&self.record_id)?,
      kind: decode_kind(&self.kind)?,
      topic: self.topic,
      description: self.description,
      status: decode_status(&self.status)?,
      event_date: decode_opt_dt(self.event_date)?,
      priority: decode_priority(&self.priority)?,
      proposed_by_role: self.proposed_by_role,
      proposed_by_name: self.proposed_by_name,
      proposed_at: decode_dt(&self.proposed_at)?,
      quarter: self.quarter,
      financial_year: self.financial_year,
      reminder_flags,
      feedback,
      discrepancies,
      archived_at: decode_opt_dt(self.archived_at)?,
      details: decode_details(&self.details_json)?,
    })
  }
}

pub struct RawFeedback {
  pub participant:     String,
  pub attended:        bool,
  pub overall_rating:  Option<u8>,
  pub content_quality: Option<u8>,
  pub comments:        Option<String>,
  pub submitted_at:    Option<String>,
}

impl RawFeedback {
  fn into_feedback(self) -> Result<Feedback> {
    Ok(Feedback {
      participant:     self.participant,
      attended:        self.attended,
      overall_rating:  self.overall_rating,
      content_quality: self.content_quality,
      comments:        self.comments,
      submitted_at:    decode_opt_dt(self.submitted_at)?,
    })
  }
}

pub struct RawDiscrepancy {
  pub participant: String,
  pub reason:      String,
  pub created_at:  String,
}

impl RawDiscrepancy {
  fn into_discrepancy(self) -> Result<Discrepancy> {
    Ok(Discrepancy {
      participant: self.participant,
      reason:      self.reason,
      created_at:  decode_dt(&self.created_at)?,
    })
  }
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;

  use super::*;

  #[test]
  fn timestamps_sort_lexicographically() {
    let a = Utc.with_ymd_and_hms(2025, 4, 14, 18, 30, 0).unwrap();
    let b = a + chrono::Duration::microseconds(1);
    let c = a + chrono::Duration::seconds(1);
    let (ea, eb, ec) = (encode_dt(a), encode_dt(b), encode_dt(c));
    assert_eq!(ea, "2025-04-14T18:30:00.000000Z");
    assert!(ea < eb && eb < ec);
    assert_eq!(decode_dt(&eb).unwrap(), b);
  }

  #[test]
  fn unknown_status_is_a_core_error() {
    assert!(matches!(
      decode_status("pending"),
      Err(Error::Core(muster_core::Error::UnknownStatus(_)))
    ));
  }

  #[test]
  fn unknown_priority_is_a_core_error() {
    assert!(matches!(
      decode_priority("P9"),
      Err(Error::Core(muster_core::Error::UnknownPriority(p))) if p == "P9"
    ));
    assert!(decode_priority("P2").is_ok());
  }
}
