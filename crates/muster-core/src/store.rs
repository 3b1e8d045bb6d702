//! The `RecordStore` trait and supporting query types.
//!
//! The trait is implemented by storage backends (e.g. `muster-store-sqlite`).
//! The engine depends on this abstraction, not on any concrete backend.

use std::future::Future;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
  record::{Discrepancy, Feedback, Kind, NewRecord, Record, Status},
  rule::Window,
};

// ─── Query type ──────────────────────────────────────────────────────────────

/// Parameters for [`RecordStore::query`]. Results are ordered by
/// `proposed_at`, oldest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordQuery {
  pub kind:        Kind,
  /// Records must be in one of these statuses. Empty matches nothing.
  pub statuses:    Vec<Status>,
  /// Restrict to records whose event date lies in the half-open window.
  /// Records without an event date never match a range.
  pub date_range:  Option<Window>,
  /// Restrict to records on which this reminder flag is unset.
  pub unsent_flag: Option<String>,
}

impl RecordQuery {
  /// Every record of `kind` in one of `statuses`.
  pub fn by_status(kind: Kind, statuses: &[Status]) -> Self {
    Self { kind, statuses: statuses.to_vec(), date_range: None, unsent_flag: None }
  }
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over a record store backend.
///
/// Every single-record write is atomic on its own; nothing spans records.
/// Reminder flags can only ever be set, never cleared.
///
/// All methods return `Send` futures so the store can be shared across
/// scheduler tasks.
pub trait RecordStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Intake ────────────────────────────────────────────────────────────

  /// Persist a new record. Fails if the status is not an entry status for
  /// the kind or the details variant disagrees with the kind.
  fn create_record(
    &self,
    input: NewRecord,
  ) -> impl Future<Output = Result<Record, Self::Error>> + Send + '_;

  /// Retrieve a record by id. Returns `None` if not found.
  fn get_record(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Record>, Self::Error>> + Send + '_;

  /// All records matching `query`.
  fn query<'a>(
    &'a self,
    query: &'a RecordQuery,
  ) -> impl Future<Output = Result<Vec<Record>, Self::Error>> + Send + 'a;

  // ── Manual workflow inputs ────────────────────────────────────────────

  /// Move a record along its lifecycle graph.
  ///
  /// Validated with [`crate::lifecycle::check_record_transition`] and
  /// applied only if the status is still the one that was validated.
  /// Moving to [`Status::Archived`] stamps `archived_at` with `at`.
  fn transition(
    &self,
    id: Uuid,
    to: Status,
    at: DateTime<Utc>,
  ) -> impl Future<Output = Result<Record, Self::Error>> + Send + '_;

  /// Set or clear the event date; quarter and financial year are
  /// recomputed in the same write.
  fn set_event_date(
    &self,
    id: Uuid,
    event_date: Option<DateTime<Utc>>,
  ) -> impl Future<Output = Result<Record, Self::Error>> + Send + '_;

  /// Append a participant's feedback entry. Ratings outside 1 to 5 are
  /// rejected.
  fn add_feedback(
    &self,
    id: Uuid,
    feedback: Feedback,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  // ── Engine writes ─────────────────────────────────────────────────────

  /// Atomically set reminder flag `flag` on record `id`.
  ///
  /// Returns `true` if this call set it, `false` if it was already set.
  fn mark_flag<'a>(
    &'a self,
    id: Uuid,
    flag: &'a str,
    at: DateTime<Utc>,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + 'a;

  /// Append discrepancies, skipping participants that already have one on
  /// this record. Returns how many were added.
  fn add_discrepancies(
    &self,
    id: Uuid,
    discrepancies: Vec<Discrepancy>,
  ) -> impl Future<Output = Result<usize, Self::Error>> + Send + '_;

  /// Bulk: every `Scheduled` record of `kind` with `event_date <= cutoff`
  /// becomes `Completed`. Returns the number of records changed.
  fn complete_due(
    &self,
    kind: Kind,
    cutoff: DateTime<Utc>,
  ) -> impl Future<Output = Result<u64, Self::Error>> + Send + '_;

  /// Bulk: every record of `kind` in `statuses` with `event_date <= cutoff`
  /// becomes `Archived` with `archived_at = now`. Terminal statuses in
  /// `statuses` are ignored. Returns the number of records changed.
  fn archive_stale<'a>(
    &'a self,
    kind: Kind,
    statuses: &'a [Status],
    cutoff: DateTime<Utc>,
    now: DateTime<Utc>,
  ) -> impl Future<Output = Result<u64, Self::Error>> + Send + 'a;
}
