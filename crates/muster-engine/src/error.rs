//! Error type for `muster-engine`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),

  #[error("channel error: {0}")]
  Channel(#[source] Box<dyn std::error::Error + Send + Sync>),

  #[error("unknown job: {0:?}")]
  UnknownJob(String),

  #[error("template error: {0}")]
  Render(#[from] tera::Error),

  #[error("invalid configuration: {0}")]
  Config(String),

  #[error("job {0:?} panicked")]
  Panicked(String),
}

impl Error {
  pub fn store(e: impl std::error::Error + Send + Sync + 'static) -> Self {
    Self::Store(Box::new(e))
  }

  pub fn channel(e: impl std::error::Error + Send + Sync + 'static) -> Self {
    Self::Channel(Box::new(e))
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
