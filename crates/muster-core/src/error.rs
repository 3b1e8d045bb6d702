//! Error types for `muster-core`.

use thiserror::Error;
use uuid::Uuid;

use crate::record::{Kind, Status};

#[derive(Debug, Error)]
pub enum Error {
  #[error("record not found: {0}")]
  RecordNotFound(Uuid),

  #[error("status {status} is not valid for {kind} records")]
  StatusNotInLifecycle { kind: Kind, status: Status },

  #[error("{kind} records cannot be created as {status}")]
  InvalidEntryStatus { kind: Kind, status: Status },

  #[error("{kind} cannot move from {from} to {to}")]
  IllegalTransition { kind: Kind, from: Status, to: Status },

  #[error("{0} must have an event date before it can be scheduled")]
  MissingEventDate(Uuid),

  #[error("record details do not match kind {0}")]
  DetailsMismatch(Kind),

  #[error("unknown status: {0:?}")]
  UnknownStatus(String),

  #[error("unknown record kind: {0:?}")]
  UnknownKind(String),

  #[error("unknown priority: {0:?}")]
  UnknownPriority(String),

  #[error("rating {0} is outside 1..=5")]
  RatingOutOfRange(u8),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
