//! Integration tests for `SqliteStore` against an in-memory database.

use chrono::{DateTime, Duration, TimeZone, Utc};
use muster_core::{
  record::{
    Discrepancy, Feedback, Kind, NewRecord, OutingDetails, RecordDetails,
    Status, Trainer, TrainingDetails,
  },
  rule::Window,
  store::{RecordQuery, RecordStore},
};
use uuid::Uuid;

use crate::{Error, SqliteStore};

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
    .with_time_zone(chrono_tz::Asia::Kolkata)
}

fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
  Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
}

fn outing(topic: &str, event: Option<DateTime<Utc>>) -> NewRecord {
  let mut r = NewRecord::proposed(Kind::Outing, topic);
  r.event_date = event;
  r.details = RecordDetails::Outing(OutingDetails {
    place:  Some("Lonavala".into()),
    budget: Some(50_000),
  });
  r
}

fn training(topic: &str, event: Option<DateTime<Utc>>) -> NewRecord {
  let mut r = NewRecord::proposed(Kind::Training, topic);
  r.event_date = event;
  r.details = RecordDetails::Training(TrainingDetails {
    trainer: Some(Trainer {
      name:  "Asha".into(),
      email: Some("asha@example.com".into()),
    }),
    ..Default::default()
  });
  r
}

/// Create an outing and walk it to `Scheduled`.
async fn scheduled_outing(s: &SqliteStore, event: DateTime<Utc>) -> Uuid {
  let r = s.create_record(outing("Offsite", Some(event))).await.unwrap();
  s.transition(r.id, Status::Scheduled, Utc::now()).await.unwrap();
  r.id
}

// ─── Intake ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn create_and_get_record() {
  let s = store().await;

  let created = s
    .create_record(training("Rust basics", Some(at(2025, 4, 15, 4, 30))))
    .await
    .unwrap();
  assert_eq!(created.status, Status::Proposed);
  assert_eq!(created.quarter.as_deref(), Some("Q1"));
  assert_eq!(created.financial_year.as_deref(), Some("2025-2026"));

  let fetched = s.get_record(created.id).await.unwrap().unwrap();
  assert_eq!(fetched.topic, "Rust basics");
  assert_eq!(fetched.event_date, created.event_date);
  assert_eq!(
    fetched.details.trainer().and_then(|t| t.email.as_deref()),
    Some("asha@example.com")
  );
  assert!(fetched.reminder_flags.is_empty());
}

#[tokio::test]
async fn get_record_missing_returns_none() {
  let s = store().await;
  assert!(s.get_record(Uuid::new_v4()).await.unwrap().is_none());
}

#[tokio::test]
async fn create_rejects_non_entry_status() {
  let s = store().await;
  let mut input = outing("Picnic", None);
  input.status = Status::Scheduled;
  assert!(matches!(
    s.create_record(input).await,
    Err(Error::Core(muster_core::Error::InvalidEntryStatus { .. }))
  ));
}

#[tokio::test]
async fn create_rejects_mismatched_details() {
  let s = store().await;
  let mut input = outing("Picnic", None);
  input.details = RecordDetails::empty(Kind::Training);
  assert!(matches!(
    s.create_record(input).await,
    Err(Error::Core(muster_core::Error::DetailsMismatch(Kind::Outing)))
  ));
}

// ─── Lifecycle ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn schedule_requires_event_date() {
  let s = store().await;
  let r = s.create_record(outing("Picnic", None)).await.unwrap();
  assert!(matches!(
    s.transition(r.id, Status::Scheduled, Utc::now()).await,
    Err(Error::Core(muster_core::Error::MissingEventDate(_)))
  ));

  s.set_event_date(r.id, Some(at(2025, 5, 1, 4, 30))).await.unwrap();
  let r = s.transition(r.id, Status::Scheduled, Utc::now()).await.unwrap();
  assert_eq!(r.status, Status::Scheduled);
}

#[tokio::test]
async fn illegal_transition_is_rejected() {
  let s = store().await;
  let r = s.create_record(training("Rust", None)).await.unwrap();
  assert!(matches!(
    s.transition(r.id, Status::Completed, Utc::now()).await,
    Err(Error::Core(muster_core::Error::IllegalTransition { .. }))
  ));
  let r = s.get_record(r.id).await.unwrap().unwrap();
  assert_eq!(r.status, Status::Proposed);
}

#[tokio::test]
async fn transition_missing_record() {
  let s = store().await;
  assert!(matches!(
    s.transition(Uuid::new_v4(), Status::Rejected, Utc::now()).await,
    Err(Error::RecordNotFound(_))
  ));
}

#[tokio::test]
async fn set_event_date_recomputes_fiscal_labels() {
  let s = store().await;
  let r = s
    .create_record(outing("Offsite", Some(at(2025, 4, 15, 4, 30))))
    .await
    .unwrap();
  assert_eq!(r.quarter.as_deref(), Some("Q1"));

  let r = s.set_event_date(r.id, Some(at(2025, 3, 15, 4, 30))).await.unwrap();
  assert_eq!(r.quarter.as_deref(), Some("Q4"));
  assert_eq!(r.financial_year.as_deref(), Some("2024-2025"));

  let r = s.set_event_date(r.id, None).await.unwrap();
  assert_eq!(r.quarter, None);
  assert_eq!(r.financial_year, None);
}

#[tokio::test]
async fn scheduled_record_keeps_its_date() {
  let s = store().await;
  let id = scheduled_outing(&s, at(2025, 4, 15, 4, 30)).await;
  assert!(matches!(
    s.set_event_date(id, None).await,
    Err(Error::Core(muster_core::Error::MissingEventDate(_)))
  ));
}

// ─── Queries ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn query_filters_by_status_window_and_flag() {
  let s = store().await;
  let window = Window { start: at(2025, 4, 14, 18, 30), end: at(2025, 4, 15, 18, 30) };

  let at_start = scheduled_outing(&s, window.start).await;
  let at_end = scheduled_outing(&s, window.end).await;
  let flagged = scheduled_outing(&s, window.start + Duration::hours(3)).await;
  let proposed = s
    .create_record(outing("Not yet", Some(window.start)))
    .await
    .unwrap()
    .id;
  s.mark_flag(flagged, "two_week", Utc::now()).await.unwrap();

  let query = RecordQuery {
    kind:        Kind::Outing,
    statuses:    vec![Status::Scheduled],
    date_range:  Some(window),
    unsent_flag: Some("two_week".into()),
  };
  let ids: Vec<_> = s.query(&query).await.unwrap().into_iter().map(|r| r.id).collect();

  assert_eq!(ids, vec![at_start]);
  assert!(!ids.contains(&at_end));
  assert!(!ids.contains(&proposed));
}

#[tokio::test]
async fn query_with_no_statuses_matches_nothing() {
  let s = store().await;
  s.create_record(outing("Picnic", None)).await.unwrap();
  let q = RecordQuery::by_status(Kind::Outing, &[]);
  assert!(s.query(&q).await.unwrap().is_empty());
}

#[tokio::test]
async fn query_by_status_ignores_other_kinds() {
  let s = store().await;
  s.create_record(outing("Picnic", None)).await.unwrap();
  s.create_record(training("Rust", None)).await.unwrap();
  let found = s
    .query(&RecordQuery::by_status(Kind::Training, &[Status::Proposed]))
    .await
    .unwrap();
  assert_eq!(found.len(), 1);
  assert_eq!(found[0].kind, Kind::Training);
}

// ─── Flags ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn mark_flag_only_sets_once() {
  let s = store().await;
  let r = s.create_record(outing("Picnic", None)).await.unwrap();

  assert!(s.mark_flag(r.id, "two_week", Utc::now()).await.unwrap());
  assert!(!s.mark_flag(r.id, "two_week", Utc::now()).await.unwrap());

  let r = s.get_record(r.id).await.unwrap().unwrap();
  assert!(r.flag("two_week"));
  assert!(!r.flag("one_week"));
}

#[tokio::test]
async fn mark_flag_missing_record() {
  let s = store().await;
  assert!(matches!(
    s.mark_flag(Uuid::new_v4(), "two_week", Utc::now()).await,
    Err(Error::RecordNotFound(_))
  ));
}

#[tokio::test]
async fn flags_cannot_be_deleted() {
  let s = store().await;
  let r = s.create_record(outing("Picnic", None)).await.unwrap();
  s.mark_flag(r.id, "two_week", Utc::now()).await.unwrap();

  let result = s
    .conn_for_tests()
    .call(|conn| Ok(conn.execute("DELETE FROM reminder_flags", [])?))
    .await;
  assert!(result.is_err());
  assert!(s.get_record(r.id).await.unwrap().unwrap().flag("two_week"));
}

// ─── Feedback & discrepancies ────────────────────────────────────────────────

#[tokio::test]
async fn feedback_and_discrepancies_roundtrip() {
  let s = store().await;
  let r = s.create_record(outing("Picnic", None)).await.unwrap();

  s.add_feedback(r.id, Feedback {
    participant:     "Ravi".into(),
    attended:        true,
    overall_rating:  Some(4),
    content_quality: Some(5),
    comments:        Some("Great".into()),
    submitted_at:    Some(Utc::now()),
  })
  .await
  .unwrap();

  let d = Discrepancy {
    participant: "Meera".into(),
    reason:      "No feedback submitted after attending".into(),
    created_at:  Utc::now(),
  };
  assert_eq!(s.add_discrepancies(r.id, vec![d.clone()]).await.unwrap(), 1);
  assert_eq!(s.add_discrepancies(r.id, vec![d]).await.unwrap(), 0);

  let r = s.get_record(r.id).await.unwrap().unwrap();
  assert_eq!(r.feedback.len(), 1);
  assert_eq!(r.feedback[0].overall_rating, Some(4));
  assert_eq!(r.discrepancies.len(), 1);
  assert_eq!(r.discrepancies[0].participant, "Meera");
}

#[tokio::test]
async fn out_of_range_rating_is_rejected() {
  let s = store().await;
  let r = s.create_record(outing("Picnic", None)).await.unwrap();
  let entry = Feedback {
    participant:     "Ravi".into(),
    attended:        true,
    overall_rating:  Some(9),
    content_quality: None,
    comments:        None,
    submitted_at:    Some(Utc::now()),
  };
  assert!(matches!(
    s.add_feedback(r.id, entry).await,
    Err(Error::Core(muster_core::Error::RatingOutOfRange(9)))
  ));
  assert!(s.get_record(r.id).await.unwrap().unwrap().feedback.is_empty());
}

// ─── Bulk transitions ────────────────────────────────────────────────────────

#[tokio::test]
async fn complete_due_is_idempotent() {
  let s = store().await;
  let cutoff = at(2025, 4, 14, 18, 30);
  let past = scheduled_outing(&s, cutoff - Duration::days(1)).await;
  let exact = scheduled_outing(&s, cutoff).await;
  let later = scheduled_outing(&s, cutoff + Duration::hours(4)).await;

  assert_eq!(s.complete_due(Kind::Outing, cutoff).await.unwrap(), 2);
  assert_eq!(s.complete_due(Kind::Outing, cutoff).await.unwrap(), 0);
  assert_eq!(s.complete_due(Kind::Training, cutoff).await.unwrap(), 0);

  for (id, expected) in [
    (past, Status::Completed),
    (exact, Status::Completed),
    (later, Status::Scheduled),
  ] {
    assert_eq!(s.get_record(id).await.unwrap().unwrap().status, expected);
  }
}

#[tokio::test]
async fn archive_stale_sets_archived_at_and_skips_terminal() {
  let s = store().await;
  let cutoff = at(2025, 1, 14, 18, 30);
  let now = at(2025, 4, 15, 0, 0);

  let old = scheduled_outing(&s, cutoff - Duration::days(10)).await;
  let recent = scheduled_outing(&s, cutoff + Duration::days(10)).await;
  let rejected = s
    .create_record(outing("Rejected", Some(cutoff - Duration::days(10))))
    .await
    .unwrap()
    .id;
  s.transition(rejected, Status::Rejected, now).await.unwrap();

  let statuses = [Status::Scheduled, Status::Rejected];
  assert_eq!(s.archive_stale(Kind::Outing, &statuses, cutoff, now).await.unwrap(), 1);
  assert_eq!(s.archive_stale(Kind::Outing, &statuses, cutoff, now).await.unwrap(), 0);

  let old = s.get_record(old).await.unwrap().unwrap();
  assert_eq!(old.status, Status::Archived);
  assert_eq!(old.archived_at, Some(now));

  let recent = s.get_record(recent).await.unwrap().unwrap();
  assert_eq!(recent.status, Status::Scheduled);
  assert_eq!(recent.archived_at, None);

  let rejected = s.get_record(rejected).await.unwrap().unwrap();
  assert_eq!(rejected.status, Status::Rejected);
}

#[tokio::test]
async fn manual_archive_stamps_archived_at() {
  let s = store().await;
  let now = at(2025, 4, 20, 6, 0);
  let id = scheduled_outing(&s, at(2025, 4, 15, 4, 30)).await;

  let done = s.transition(id, Status::Completed, now).await.unwrap();
  assert_eq!(done.archived_at, None);

  let archived = s.transition(id, Status::Archived, now).await.unwrap();
  assert_eq!(archived.status, Status::Archived);
  assert_eq!(archived.archived_at, Some(now));
  assert_eq!(s.get_record(id).await.unwrap().unwrap().archived_at, Some(now));
}
