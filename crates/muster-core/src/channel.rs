//! The outbound notification channel.
//!
//! A channel accepts or rejects a message at submission time; nothing
//! further is confirmed.

use std::future::Future;

use serde::{Deserialize, Serialize};

/// A composed message ready for submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundMessage {
  pub to:      Vec<String>,
  pub cc:      Vec<String>,
  pub subject: String,
  /// HTML body.
  pub body:    String,
}

/// Abstraction over a message transport (SMTP, a log sink, a test double).
pub trait NotificationChannel: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Submit `message`. `Ok` means the transport accepted it.
  fn send<'a>(
    &'a self,
    message: &'a OutboundMessage,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;
}
