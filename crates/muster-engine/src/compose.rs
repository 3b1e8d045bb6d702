//! Turns a rule and a record snapshot into an [`OutboundMessage`].

use muster_core::{
  channel::OutboundMessage,
  fiscal::FiscalPeriod,
  record::{Kind, Record},
};

use crate::{
  config::{EngineConfig, Recipient, RuleConfig},
  error::Result,
  templates::{RenderContext, Rendered, Template, render_digest},
};

pub struct Composer<'a> {
  config: &'a EngineConfig,
}

impl<'a> Composer<'a> {
  pub fn new(config: &'a EngineConfig) -> Self { Self { config } }

  fn context(&self) -> RenderContext<'a> {
    RenderContext {
      time_zone:            self.config.time_zone,
      frontend_url:         &self.config.frontend_url,
      material_upload_link: &self.config.material_upload_link,
    }
  }

  /// Addresses for `recipients`, in order, blanks dropped and duplicates removed.
  pub fn resolve(&self, recipients: &[Recipient], record: Option<&Record>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    let mut push = |addr: &str| {
      let addr = addr.trim();
      if !addr.is_empty() && !out.iter().any(|a| a.eq_ignore_ascii_case(addr)) {
        out.push(addr.to_string());
      }
    };

    for recipient in recipients {
      match recipient {
        Recipient::Trainer => {
          if let Some(email) = record
            .and_then(|r| r.details.trainer())
            .and_then(|t| t.email.as_deref())
          {
            push(email);
          }
        }
        Recipient::Group(name) => match self.config.groups.get(name) {
          Some(members) => members.iter().for_each(|m| push(m.as_str())),
          None => tracing::warn!(group = %name, "unknown recipient group"),
        },
        Recipient::Address(addr) => push(addr.as_str()),
      }
    }
    out
  }

  /// `(to, cc)` with cc entries already in `to` removed.
  fn envelope(
    &self,
    to: &[Recipient],
    cc: &[Recipient],
    record: Option<&Record>,
  ) -> (Vec<String>, Vec<String>) {
    let to = self.resolve(to, record);
    let cc = self
      .resolve(cc, record)
      .into_iter()
      .filter(|c| !to.iter().any(|t| t.eq_ignore_ascii_case(c)))
      .collect();
    (to, cc)
  }

  /// The reminder for `record` under `rule`, or `None` when nobody would
  /// receive it.
  pub fn compose(
    &self,
    rule: &RuleConfig,
    record: &Record,
  ) -> Result<Option<OutboundMessage>> {
    let (to, cc) = self.envelope(&rule.to, &rule.cc, Some(record));
    if to.is_empty() {
      return Ok(None);
    }
    let rendered = rule.template.render(record, &self.context())?;
    Ok(Some(message(to, cc, rendered)))
  }

  /// The HR notice for an outing whose proposal status just changed.
  pub fn compose_update(&self, record: &Record) -> Result<Option<OutboundMessage>> {
    let notice = &self.config.outing_update;
    let (to, cc) = self.envelope(&notice.to, &notice.cc, Some(record));
    if to.is_empty() {
      return Ok(None);
    }
    let rendered = Template::OutingProposalUpdate.render(record, &self.context())?;
    Ok(Some(message(to, cc, rendered)))
  }

  /// The approval digest for `kind`, or `None` when there is nothing to
  /// list or nobody to send it to.
  pub fn compose_digest(
    &self,
    kind: Kind,
    period: FiscalPeriod,
    records: &[Record],
  ) -> Result<Option<OutboundMessage>> {
    if records.is_empty() {
      return Ok(None);
    }
    let digest = &self.config.policy(kind).digest;
    let (to, cc) = self.envelope(&digest.to, &digest.cc, None);
    if to.is_empty() {
      return Ok(None);
    }
    let rendered = render_digest(kind, period, records, &self.context())?;
    Ok(Some(message(to, cc, rendered)))
  }
}

fn message(to: Vec<String>, cc: Vec<String>, rendered: Rendered) -> OutboundMessage {
  OutboundMessage { to, cc, subject: rendered.subject, body: rendered.body }
}

#[cfg(test)]
mod tests {
  use muster_core::record::{NewRecord, RecordDetails, Trainer, TrainingDetails};

  use super::*;

  fn config() -> EngineConfig {
    let mut config = EngineConfig::default();
    config.groups.insert("hr".into(), vec!["hr@example.com".into(), " ".into()]);
    config.groups.insert(
      "management".into(),
      vec!["boss@example.com".into(), "HR@example.com".into()],
    );
    config
  }

  fn record(trainer_email: Option<&str>) -> Record {
    let new = NewRecord::proposed(Kind::Training, "Rust");
    Record {
      id: uuid::Uuid::new_v4(),
      kind: new.kind,
      topic: new.topic,
      description: new.description,
      status: new.status,
      event_date: None,
      priority: new.priority,
      proposed_by_role: new.proposed_by_role,
      proposed_by_name: new.proposed_by_name,
      proposed_at: chrono::Utc::now(),
      quarter: None,
      financial_year: None,
      reminder_flags: Default::default(),
      feedback: Vec::new(),
      discrepancies: Vec::new(),
      archived_at: None,
      details: RecordDetails::Training(TrainingDetails {
        trainer: Some(Trainer {
          name:  "Ravi".into(),
          email: trainer_email.map(Into::into),
        }),
        ..Default::default()
      }),
    }
  }

  #[test]
  fn blanks_and_duplicates_are_dropped() {
    let config = config();
    let composer = Composer::new(&config);
    let got = composer.resolve(
      &[
        Recipient::group("hr"),
        Recipient::group("management"),
        Recipient::Address("boss@example.com".into()),
      ],
      None,
    );
    assert_eq!(got, vec!["hr@example.com", "boss@example.com"]);
  }

  #[test]
  fn cc_already_in_to_is_removed() {
    let config = config();
    let composer = Composer::new(&config);
    let rule = config.rule("training_two_week_notice").unwrap();
    let msg = composer.compose(rule, &record(Some("hr@example.com"))).unwrap().unwrap();
    assert_eq!(msg.to, vec!["hr@example.com"]);
    assert_eq!(msg.cc, vec!["boss@example.com"]);
  }

  #[test]
  fn missing_trainer_email_means_no_message() {
    let config = config();
    let composer = Composer::new(&config);
    let rule = config.rule("training_two_week_notice").unwrap();
    assert_eq!(composer.compose(rule, &record(None)).unwrap(), None);
  }

  #[test]
  fn empty_digest_is_not_composed() {
    let config = config();
    let composer = Composer::new(&config);
    let period = FiscalPeriod { quarter: 2, start_year: 2025 };
    assert_eq!(composer.compose_digest(Kind::Outing, period, &[]).unwrap(), None);
  }

  #[test]
  fn update_goes_to_hr_with_management_copied() {
    let config = config();
    let composer = Composer::new(&config);
    let msg = composer.compose_update(&record(None)).unwrap().unwrap();
    assert_eq!(msg.to, vec!["hr@example.com"]);
    assert_eq!(msg.cc, vec!["boss@example.com"]);
    assert!(msg.subject.starts_with("Outing/Event Proposal Update"));
  }
}
