//! Date-driven bulk transitions and the post-outing feedback check.

use std::collections::BTreeSet;

use chrono::Days;
use muster_core::{
  channel::NotificationChannel,
  record::{Discrepancy, Kind, Record, Status},
  rule::{Window, start_of_day},
  store::{RecordQuery, RecordStore},
};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{
  engine::Engine,
  error::{Error, Result},
};

pub const NO_FEEDBACK_REASON: &str = "No feedback submitted after attending";

impl<S: RecordStore, C: NotificationChannel> Engine<S, C> {
  /// Move record `id` to `to` by hand. A manual outing change also sends
  /// the proposal-update notice; if that fails the transition still stands.
  pub async fn transition(&self, id: Uuid, to: Status) -> Result<Record> {
    let record = self
      .store
      .transition(id, to, self.now())
      .await
      .map_err(Error::store)?;
    if let Err(e) = self.notify_transition(&record).await {
      error!(record_id = %id, status = %to, error = %e, "proposal update not sent");
    }
    Ok(record)
  }

  /// Tell HR that an outing proposal changed status. Returns whether a
  /// message went out; training records never produce one.
  pub async fn notify_transition(&self, record: &Record) -> Result<bool> {
    if record.kind != Kind::Outing || !self.config.outing_update.enabled {
      return Ok(false);
    }
    let Some(message) = self.composer().compose_update(record)? else {
      warn!(record_id = %record.id, "no recipients for proposal update");
      return Ok(false);
    };
    self.channel.send(&message).await.map_err(Error::channel)?;
    info!(record_id = %record.id, status = %record.status, "proposal update sent");
    Ok(true)
  }

  /// Complete every `Scheduled` record of `kind` whose event date is at or
  /// before local midnight today. Events later today stay `Scheduled`.
  pub async fn auto_complete(&self, kind: Kind) -> Result<u64> {
    let cutoff = start_of_day(self.today(), self.config.time_zone);
    let changed = self
      .store
      .complete_due(kind, cutoff)
      .await
      .map_err(Error::store)?;
    info!(%kind, changed, %cutoff, "auto-complete finished");
    Ok(changed)
  }

  /// Archive every record of `kind` in the kind's archive scope whose event
  /// date is at or before local midnight of `today - grace`.
  pub async fn auto_archive(&self, kind: Kind) -> Result<u64> {
    let policy = self.config.policy(kind);
    let cutoff_date = policy.grace.before(self.today());
    let cutoff = start_of_day(cutoff_date, self.config.time_zone);
    let statuses = policy.archive_scope.statuses(kind);
    let changed = self
      .store
      .archive_stale(kind, &statuses, cutoff, self.now())
      .await
      .map_err(Error::store)?;
    info!(%kind, changed, %cutoff, scope = ?policy.archive_scope, "auto-archive finished");
    Ok(changed)
  }

  /// Flag attendees of yesterday's completed outings who never submitted
  /// feedback. Returns the number of discrepancies added.
  pub async fn record_discrepancies(&self) -> Result<usize> {
    let tz = self.config.time_zone;
    let today = self.today();
    let yesterday = today.checked_sub_days(Days::new(1)).unwrap_or(today);
    let query = RecordQuery {
      date_range: Some(Window::day(yesterday, tz)),
      ..RecordQuery::by_status(Kind::Outing, &[Status::Completed])
    };
    let outings = self.store.query(&query).await.map_err(Error::store)?;

    let now = self.now();
    let mut added = 0;
    for outing in outings {
      let missing = missing_feedback(&outing);
      if missing.is_empty() {
        continue;
      }
      let entries = missing
        .into_iter()
        .map(|participant| Discrepancy {
          participant,
          reason: NO_FEEDBACK_REASON.to_string(),
          created_at: now,
        })
        .collect();
      match self.store.add_discrepancies(outing.id, entries).await {
        Ok(n) => {
          if n > 0 {
            info!(record_id = %outing.id, added = n, "recorded feedback discrepancies");
          }
          added += n;
        }
        Err(e) => {
          error!(record_id = %outing.id, error = %e, "failed to record discrepancies");
        }
      }
    }
    Ok(added)
  }
}

/// Participants who attended but have no submitted feedback entry and no
/// discrepancy yet.
pub fn missing_feedback(record: &Record) -> Vec<String> {
  let submitted: BTreeSet<&str> = record
    .feedback
    .iter()
    .filter(|f| f.submitted_at.is_some())
    .map(|f| f.participant.as_str())
    .collect();
  let known: BTreeSet<&str> = record
    .discrepancies
    .iter()
    .map(|d| d.participant.as_str())
    .collect();

  let mut missing: Vec<String> = Vec::new();
  for f in record.feedback.iter().filter(|f| f.attended) {
    let name = f.participant.as_str();
    if !submitted.contains(name)
      && !known.contains(name)
      && !missing.iter().any(|m| m == name)
    {
      missing.push(name.to_string());
    }
  }
  missing
}

#[cfg(test)]
mod tests {
  use chrono::Utc;
  use muster_core::record::{Feedback, RecordDetails};

  use super::*;

  fn entry(participant: &str, attended: bool, submitted: bool) -> Feedback {
    Feedback {
      participant:     participant.into(),
      attended,
      overall_rating:  None,
      content_quality: None,
      comments:        None,
      submitted_at:    submitted.then(Utc::now),
    }
  }

  fn outing(feedback: Vec<Feedback>, discrepancies: Vec<Discrepancy>) -> Record {
    Record {
      id: uuid::Uuid::new_v4(),
      kind: Kind::Outing,
      topic: "Offsite".into(),
      description: String::new(),
      status: Status::Completed,
      event_date: Some(Utc::now()),
      priority: Default::default(),
      proposed_by_role: "HR".into(),
      proposed_by_name: "HR".into(),
      proposed_at: Utc::now(),
      quarter: None,
      financial_year: None,
      reminder_flags: Default::default(),
      feedback,
      discrepancies,
      archived_at: None,
      details: RecordDetails::empty(Kind::Outing),
    }
  }

  #[test]
  fn only_silent_attendees_are_missing() {
    let record = outing(
      vec![
        entry("asha", true, false),
        entry("ravi", true, true),
        entry("meera", false, false),
        entry("asha", true, false),
      ],
      Vec::new(),
    );
    assert_eq!(missing_feedback(&record), vec!["asha".to_string()]);
  }

  #[test]
  fn a_later_submission_clears_the_participant() {
    let record = outing(
      vec![entry("asha", true, false), entry("asha", true, true)],
      Vec::new(),
    );
    assert!(missing_feedback(&record).is_empty());
  }

  #[test]
  fn existing_discrepancy_is_not_repeated() {
    let record = outing(
      vec![entry("asha", true, false)],
      vec![Discrepancy {
        participant: "asha".into(),
        reason:      NO_FEEDBACK_REASON.into(),
        created_at:  Utc::now(),
      }],
    );
    assert!(missing_feedback(&record).is_empty());
  }
}
