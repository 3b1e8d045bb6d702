//! Notification channels: SMTP, and a log-only sink for dry runs.

use lettre::{
  AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
  message::{Mailbox, header::ContentType},
  transport::smtp::authentication::Credentials,
};
use muster_core::channel::{NotificationChannel, OutboundMessage};
use thiserror::Error;

use crate::config::SmtpConfig;

#[derive(Debug, Error)]
pub enum ChannelError {
  #[error("SMTP transport error: {0}")]
  Transport(#[from] lettre::transport::smtp::Error),

  #[error("email address parse error: {0}")]
  Address(#[from] lettre::address::AddressError),

  #[error("email build error: {0}")]
  Build(String),

  #[error("message has no primary recipient")]
  NoRecipients,
}

// ─── SMTP ────────────────────────────────────────────────────────────────────

/// Submits messages to an SMTP relay over STARTTLS.
pub struct SmtpChannel {
  from:      Mailbox,
  transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpChannel {
  pub fn new(config: &SmtpConfig) -> Result<Self, ChannelError> {
    let mut builder =
      AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)?.port(config.port);
    if let (Some(user), Some(pass)) = (&config.username, &config.password) {
      builder = builder.credentials(Credentials::new(user.clone(), pass.clone()));
    }
    Ok(Self { from: config.from.parse()?, transport: builder.build() })
  }

  fn build(&self, message: &OutboundMessage) -> Result<Message, ChannelError> {
    if message.to.is_empty() {
      return Err(ChannelError::NoRecipients);
    }
    let mut builder = Message::builder()
      .from(self.from.clone())
      .subject(message.subject.as_str())
      .header(ContentType::TEXT_HTML);
    for to in &message.to {
      builder = builder.to(to.parse()?);
    }
    for cc in &message.cc {
      builder = builder.cc(cc.parse()?);
    }
    builder
      .body(message.body.clone())
      .map_err(|e| ChannelError::Build(e.to_string()))
  }
}

impl NotificationChannel for SmtpChannel {
  type Error = ChannelError;

  async fn send(&self, message: &OutboundMessage) -> Result<(), ChannelError> {
    let email = self.build(message)?;
    self.transport.send(email).await?;
    tracing::debug!(to = ?message.to, subject = %message.subject, "email submitted");
    Ok(())
  }
}

// ─── Log-only ────────────────────────────────────────────────────────────────

/// Logs each message instead of sending it. Always accepts.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogChannel;

impl NotificationChannel for LogChannel {
  type Error = ChannelError;

  async fn send(&self, message: &OutboundMessage) -> Result<(), ChannelError> {
    tracing::info!(
      to = ?message.to,
      cc = ?message.cc,
      subject = %message.subject,
      "would send email (no SMTP configured)"
    );
    Ok(())
  }
}

// ─── Runtime choice ──────────────────────────────────────────────────────────

/// The channel the binary picks from configuration.
pub enum MailChannel {
  Smtp(Box<SmtpChannel>),
  Log(LogChannel),
}

impl MailChannel {
  pub fn from_config(smtp: Option<&SmtpConfig>) -> Result<Self, ChannelError> {
    Ok(match smtp {
      Some(config) => Self::Smtp(Box::new(SmtpChannel::new(config)?)),
      None => Self::Log(LogChannel),
    })
  }
}

impl NotificationChannel for MailChannel {
  type Error = ChannelError;

  async fn send(&self, message: &OutboundMessage) -> Result<(), ChannelError> {
    match self {
      Self::Smtp(smtp) => smtp.send(message).await,
      Self::Log(log) => log.send(message).await,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn smtp() -> SmtpChannel {
    SmtpChannel::new(&SmtpConfig {
      host:     "localhost".into(),
      port:     2525,
      username: None,
      password: None,
      from:     "HR Team <hr@example.com>".into(),
    })
    .unwrap()
  }

  fn message(to: &[&str]) -> OutboundMessage {
    OutboundMessage {
      to:      to.iter().map(|s| s.to_string()).collect(),
      cc:      vec!["boss@example.com".into()],
      subject: "Hello".into(),
      body:    "<p>Hi</p>".into(),
    }
  }

  #[test]
  fn builds_html_message_with_cc() {
    let email = smtp().build(&message(&["a@example.com", "b@example.com"])).unwrap();
    let raw = String::from_utf8(email.formatted()).unwrap();
    assert!(raw.contains("Subject: Hello"));
    assert!(raw.contains("Cc: boss@example.com"));
    assert!(raw.contains("text/html"));
  }

  #[test]
  fn bad_address_is_rejected() {
    let err = smtp().build(&message(&["not-an-email"])).unwrap_err();
    assert!(matches!(err, ChannelError::Address(_)));
  }

  #[test]
  fn empty_to_is_rejected() {
    let err = smtp().build(&message(&[])).unwrap_err();
    assert!(matches!(err, ChannelError::NoRecipients));
  }

  #[tokio::test]
  async fn log_channel_accepts() {
    assert!(LogChannel.send(&message(&["a@example.com"])).await.is_ok());
  }
}
