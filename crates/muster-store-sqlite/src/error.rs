//! Error type for `muster-store-sqlite`.

use muster_core::record::Status;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  /// Lifecycle and decoding violations reported by the core model.
  #[error("core error: {0}")]
  Core(#[from] muster_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  #[error("record not found: {0}")]
  RecordNotFound(uuid::Uuid),

  /// The record's status changed between validation and the write.
  #[error("record {id} is no longer {expected}")]
  StatusConflict { id: uuid::Uuid, expected: Status },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
