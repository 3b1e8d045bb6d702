//! Record types for trainings and outings, the two kinds the engine drives.
//!
//! Both kinds share one envelope ([`Record`]); kind-specific fields live in
//! the [`RecordDetails`] variant. Automation reads only the shared fields plus
//! the trainer address for recipient resolution.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};
use uuid::Uuid;

// ─── Kind & status ───────────────────────────────────────────────────────────

/// The closed set of record kinds.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  PartialOrd,
  Ord,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  AsRefStr,
  EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Kind {
  Training,
  Outing,
}

/// Union of every status either kind can hold. Which subset is valid for a
/// given kind is decided by [`crate::lifecycle`].
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  AsRefStr,
  EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Status {
  Proposed,
  /// Outing-only entry state for employee suggestions.
  Suggested,
  UnderReview,
  Approved,
  Scheduled,
  Completed,
  Archived,
  Rejected,
  Cancelled,
}

impl Status {
  /// Terminal statuses are excluded from every rule and auto-transition.
  pub fn is_terminal(self) -> bool {
    matches!(self, Self::Archived | Self::Rejected | Self::Cancelled)
  }
}

/// Informational priority; the engine never reads it.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Default,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  AsRefStr,
)]
pub enum Priority {
  P1,
  P2,
  #[default]
  P3,
}

// ─── Kind-specific details ───────────────────────────────────────────────────

/// Whether a training is delivered in a room or over a meeting link.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display,
)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
  #[default]
  Offline,
  Online,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trainer {
  pub name:  String,
  pub email: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainingDetails {
  pub trainer:      Option<Trainer>,
  #[serde(default)]
  pub mode:         Mode,
  pub venue:        Option<String>,
  pub meeting_link: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OutingDetails {
  pub place:  Option<String>,
  /// Tentative budget in whole rupees.
  pub budget: Option<u64>,
}

/// The kind-specific payload. The variant always agrees with
/// [`Record::kind`]; the store rejects mismatches on insert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum RecordDetails {
  Training(TrainingDetails),
  Outing(OutingDetails),
}

impl RecordDetails {
  pub fn kind(&self) -> Kind {
    match self {
      Self::Training(_) => Kind::Training,
      Self::Outing(_) => Kind::Outing,
    }
  }

  /// Empty details for `kind`.
  pub fn empty(kind: Kind) -> Self {
    match kind {
      Kind::Training => Self::Training(TrainingDetails::default()),
      Kind::Outing => Self::Outing(OutingDetails::default()),
    }
  }

  pub fn trainer(&self) -> Option<&Trainer> {
    match self {
      Self::Training(t) => t.trainer.as_ref(),
      Self::Outing(_) => None,
    }
  }
}

// ─── Participant sub-records ─────────────────────────────────────────────────

/// An attendance/rating entry appended by a participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Feedback {
  pub participant:     String,
  pub attended:        bool,
  pub overall_rating:  Option<u8>,
  pub content_quality: Option<u8>,
  pub comments:        Option<String>,
  /// `None` means the participant has not submitted the form.
  pub submitted_at:    Option<DateTime<Utc>>,
}

impl Feedback {
  /// Ratings, where given, are on a 1 to 5 scale.
  pub fn check(&self) -> crate::Result<()> {
    for rating in [self.overall_rating, self.content_quality].into_iter().flatten() {
      if !(1..=5).contains(&rating) {
        return Err(crate::Error::RatingOutOfRange(rating));
      }
    }
    Ok(())
  }
}

/// A participant who attended but never submitted feedback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Discrepancy {
  pub participant: String,
  pub reason:      String,
  pub created_at:  DateTime<Utc>,
}

// ─── Record ──────────────────────────────────────────────────────────────────

/// A training session or outing, as read from the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Record {
  pub id:               Uuid,
  pub kind:             Kind,
  pub topic:            String,
  pub description:      String,
  pub status:           Status,
  pub event_date:       Option<DateTime<Utc>>,
  pub priority:         Priority,
  pub proposed_by_role: String,
  pub proposed_by_name: String,
  pub proposed_at:      DateTime<Utc>,
  /// Derived from `event_date`; see [`crate::fiscal`].
  pub quarter:          Option<String>,
  pub financial_year:   Option<String>,
  /// Flags that have been set. A flag absent from the map is unset.
  pub reminder_flags:   BTreeMap<String, bool>,
  pub feedback:         Vec<Feedback>,
  pub discrepancies:    Vec<Discrepancy>,
  pub archived_at:      Option<DateTime<Utc>>,
  pub details:          RecordDetails,
}

impl Record {
  /// Whether the reminder flag `name` has been set.
  pub fn flag(&self, name: &str) -> bool {
    self.reminder_flags.get(name).copied().unwrap_or(false)
  }
}

// ─── NewRecord ───────────────────────────────────────────────────────────────

/// Input to [`crate::store::RecordStore::create_record`]. The store assigns
/// the id and `proposed_at`, and derives the fiscal fields.
#[derive(Debug, Clone)]
pub struct NewRecord {
  pub kind:             Kind,
  pub topic:            String,
  pub description:      String,
  pub status:           Status,
  pub event_date:       Option<DateTime<Utc>>,
  pub priority:         Priority,
  pub proposed_by_role: String,
  pub proposed_by_name: String,
  pub details:          RecordDetails,
}

impl NewRecord {
  /// A freshly proposed record with empty details.
  pub fn proposed(kind: Kind, topic: impl Into<String>) -> Self {
    Self {
      kind,
      topic: topic.into(),
      description: String::new(),
      status: Status::Proposed,
      event_date: None,
      priority: Priority::default(),
      proposed_by_role: "HR".into(),
      proposed_by_name: "Anonymous".into(),
      details: RecordDetails::empty(kind),
    }
  }
}
