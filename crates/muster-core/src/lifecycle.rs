//! Lifecycle graphs for trainings and outings.
//!
//! Manual actions (approve, schedule, reject, cancel) arrive from the intake
//! workflow and are checked here before the store applies them. The engine's
//! own automatic moves (complete, archive) are bulk predicates and bypass the
//! per-edge check, but only ever select non-terminal statuses.

use serde::{Deserialize, Serialize};

use crate::{
  Error, Result,
  record::{Kind, Record, Status},
};

use Status::*;

const TRAINING_STATUSES: &[Status] = &[
  Proposed,
  UnderReview,
  Approved,
  Scheduled,
  Completed,
  Archived,
  Rejected,
  Cancelled,
];

const OUTING_STATUSES: &[Status] =
  &[Proposed, Suggested, Scheduled, Completed, Archived, Rejected];

/// Every status valid for `kind`.
pub fn statuses(kind: Kind) -> &'static [Status] {
  match kind {
    Kind::Training => TRAINING_STATUSES,
    Kind::Outing => OUTING_STATUSES,
  }
}

/// Statuses a record may be created in.
pub fn entry_statuses(kind: Kind) -> &'static [Status] {
  match kind {
    Kind::Training => &[Proposed],
    Kind::Outing => &[Proposed, Suggested],
  }
}

/// Whether `status` belongs to the lifecycle of `kind`.
pub fn allows(kind: Kind, status: Status) -> bool {
  statuses(kind).contains(&status)
}

/// The statuses reachable from `from` in one manual step.
pub fn successors(kind: Kind, from: Status) -> &'static [Status] {
  match (kind, from) {
    (Kind::Training, Proposed) => &[UnderReview, Approved, Rejected, Cancelled],
    (Kind::Training, UnderReview) => &[Approved, Rejected, Cancelled],
    (Kind::Training, Approved) => &[Scheduled, Rejected, Cancelled],
    (Kind::Training, Scheduled) => &[Completed, Rejected, Cancelled],
    (Kind::Outing, Proposed | Suggested) => &[Scheduled, Rejected],
    (Kind::Outing, Scheduled) => &[Completed, Rejected],
    (_, Completed) => &[Archived],
    _ => &[],
  }
}

/// Validate the edge `from → to` for `kind`, ignoring record fields.
pub fn check_transition(kind: Kind, from: Status, to: Status) -> Result<()> {
  for status in [from, to] {
    if !allows(kind, status) {
      return Err(Error::StatusNotInLifecycle { kind, status });
    }
  }
  if successors(kind, from).contains(&to) {
    Ok(())
  } else {
    Err(Error::IllegalTransition { kind, from, to })
  }
}

/// Validate moving `record` to `to`, including field preconditions.
pub fn check_record_transition(record: &Record, to: Status) -> Result<()> {
  check_transition(record.kind, record.status, to)?;
  if to == Scheduled && record.event_date.is_none() {
    return Err(Error::MissingEventDate(record.id));
  }
  Ok(())
}

// ─── Archive policy ──────────────────────────────────────────────────────────

/// Which records the auto-archive job may sweep once their grace period has
/// elapsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArchiveScope {
  /// Only `Completed` records.
  CompletedOnly,
  /// Any record not already in a terminal status.
  AnyNonTerminal,
}

impl ArchiveScope {
  /// The concrete status set this scope selects for `kind`.
  pub fn statuses(self, kind: Kind) -> Vec<Status> {
    match self {
      Self::CompletedOnly => vec![Completed],
      Self::AnyNonTerminal => statuses(kind)
        .iter()
        .copied()
        .filter(|s| !s.is_terminal())
        .collect(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn training_happy_path() {
    let path = [Proposed, UnderReview, Approved, Scheduled, Completed, Archived];
    for pair in path.windows(2) {
      check_transition(Kind::Training, pair[0], pair[1]).unwrap();
    }
  }

  #[test]
  fn outing_happy_path_from_suggestion() {
    let path = [Suggested, Scheduled, Completed, Archived];
    for pair in path.windows(2) {
      check_transition(Kind::Outing, pair[0], pair[1]).unwrap();
    }
  }

  #[test]
  fn reject_and_cancel_only_before_completion() {
    check_transition(Kind::Training, Scheduled, Cancelled).unwrap();
    check_transition(Kind::Training, UnderReview, Rejected).unwrap();
    assert!(matches!(
      check_transition(Kind::Training, Completed, Rejected),
      Err(Error::IllegalTransition { .. })
    ));
  }

  #[test]
  fn terminal_statuses_have_no_successors() {
    for kind in [Kind::Training, Kind::Outing] {
      for status in statuses(kind).iter().filter(|s| s.is_terminal()) {
        assert!(successors(kind, *status).is_empty(), "{kind} {status}");
      }
    }
  }

  #[test]
  fn kind_specific_statuses_are_rejected() {
    assert!(matches!(
      check_transition(Kind::Outing, Proposed, Cancelled),
      Err(Error::StatusNotInLifecycle { status: Cancelled, .. })
    ));
    assert!(matches!(
      check_transition(Kind::Training, Suggested, Scheduled),
      Err(Error::StatusNotInLifecycle { status: Suggested, .. })
    ));
  }

  #[test]
  fn no_backwards_moves() {
    assert!(check_transition(Kind::Training, Scheduled, Approved).is_err());
    assert!(check_transition(Kind::Outing, Completed, Scheduled).is_err());
  }

  #[test]
  fn archive_scope_never_includes_terminal() {
    let outing = ArchiveScope::AnyNonTerminal.statuses(Kind::Outing);
    assert_eq!(outing, vec![Proposed, Suggested, Scheduled, Completed]);
    assert_eq!(ArchiveScope::CompletedOnly.statuses(Kind::Training), vec![Completed]);
  }
}
