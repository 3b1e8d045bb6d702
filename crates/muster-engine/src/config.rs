//! Engine configuration.
//!
//! Everything has a default, so an empty configuration runs the stock rule
//! table in `Asia/Kolkata` with a log-only channel.

use std::{collections::BTreeMap, path::PathBuf};

use chrono::{Months, NaiveDate};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use muster_core::{
  lifecycle::ArchiveScope,
  record::{Kind, Status},
  rule::{DateField, Direction, Rule},
};

use crate::{
  schedule::{LocalTime, Schedule},
  templates::Template,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
  /// Zone for day windows, job times, and rendered dates.
  pub time_zone:            Tz,
  pub store_path:           PathBuf,
  /// Base URL of the web front end, linked from messages.
  pub frontend_url:         String,
  /// Where trainers upload session material.
  pub material_upload_link: String,
  /// Sends in flight at once within one rule run.
  pub dispatch_concurrency: usize,
  pub smtp:                 Option<SmtpConfig>,
  /// Named address lists referenced by [`Recipient::Group`].
  pub groups:               BTreeMap<String, Vec<String>>,
  pub training:             KindPolicy,
  pub outing:               KindPolicy,
  pub discrepancies:        DiscrepancyConfig,
  /// Mail to HR when an outing proposal changes status.
  pub outing_update:        NoticeConfig,
  pub rules:                Vec<RuleConfig>,
}

impl Default for EngineConfig {
  fn default() -> Self {
    let groups = [
      "hr",
      "management",
      "admin_team",
      "all_employees",
      "trainer_reporting_heads",
      "trainer_buddies",
    ]
    .into_iter()
    .map(|name| (name.to_string(), Vec::new()))
    .collect();

    Self {
      time_zone: chrono_tz::Asia::Kolkata,
      store_path: PathBuf::from("muster.db"),
      frontend_url: "http://localhost:3000".into(),
      material_upload_link: String::new(),
      dispatch_concurrency: 1,
      smtp: None,
      groups,
      training: KindPolicy::training(),
      outing: KindPolicy::outing(),
      discrepancies: DiscrepancyConfig::default(),
      outing_update: NoticeConfig::default(),
      rules: stock_rules(),
    }
  }
}

impl EngineConfig {
  pub fn policy(&self, kind: Kind) -> &KindPolicy {
    match kind {
      Kind::Training => &self.training,
      Kind::Outing => &self.outing,
    }
  }

  pub fn rule(&self, name: &str) -> Option<&RuleConfig> {
    self.rules.iter().find(|r| r.name == name)
  }

  /// Problems that would make a job misbehave at run time.
  pub fn validate(&self) -> Result<(), String> {
    let mut seen = std::collections::BTreeSet::new();
    for rule in &self.rules {
      if !seen.insert(rule.name.as_str()) {
        return Err(format!("duplicate rule name {:?}", rule.name));
      }
      if rule.template.kind() != rule.kind {
        return Err(format!(
          "rule {:?} is for {} records but template {} is not",
          rule.name,
          rule.kind,
          rule.template.as_ref()
        ));
      }
      self.check_groups(&format!("rule {:?}", rule.name), rule.to.iter().chain(&rule.cc))?;
    }
    let update = &self.outing_update;
    self.check_groups("outing_update", update.to.iter().chain(&update.cc))
  }

  fn check_groups<'a>(
    &self,
    owner: &str,
    recipients: impl IntoIterator<Item = &'a Recipient>,
  ) -> Result<(), String> {
    for recipient in recipients {
      match recipient {
        Recipient::Group(group) if !self.groups.contains_key(group) => {
          return Err(format!("{owner} names unknown group {group:?}"));
        }
        _ => {}
      }
    }
    Ok(())
  }
}

// ─── SMTP ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpConfig {
  pub host:     String,
  #[serde(default = "default_smtp_port")]
  pub port:     u16,
  pub username: Option<String>,
  pub password: Option<String>,
  /// Sender mailbox, e.g. `HR Training System <hr@example.com>`.
  pub from:     String,
}

fn default_smtp_port() -> u16 { 587 }

// ─── Per-kind policy ─────────────────────────────────────────────────────────

/// Calendar-aware grace period before a record may be auto-archived.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Grace {
  pub months: u32,
  pub days:   u32,
}

impl Grace {
  /// `today` minus this grace period.
  pub fn before(self, today: NaiveDate) -> NaiveDate {
    today
      .checked_sub_months(Months::new(self.months))
      .and_then(|d| d.checked_sub_days(chrono::Days::new(u64::from(self.days))))
      .unwrap_or(NaiveDate::MIN)
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KindPolicy {
  pub archive_scope: ArchiveScope,
  #[serde(default)]
  pub grace:         Grace,
  pub complete_at:   Schedule,
  pub archive_at:    Schedule,
  pub digest:        DigestConfig,
}

impl KindPolicy {
  pub fn training() -> Self {
    Self {
      archive_scope: ArchiveScope::CompletedOnly,
      grace:         Grace { months: 0, days: 30 },
      complete_at:   Schedule::daily(LocalTime::hm(0, 5)),
      archive_at:    Schedule::daily(LocalTime::hm(0, 15)),
      digest:        DigestConfig::awaiting(&[
        Status::Proposed,
        Status::UnderReview,
      ]),
    }
  }

  pub fn outing() -> Self {
    Self {
      archive_scope: ArchiveScope::AnyNonTerminal,
      grace:         Grace { months: 3, days: 0 },
      complete_at:   Schedule::daily(LocalTime::hm(0, 5)),
      archive_at:    Schedule::daily(LocalTime::hm(0, 0)),
      digest:        DigestConfig::awaiting(&[
        Status::Proposed,
        Status::Suggested,
      ]),
    }
  }
}

/// The quarterly "awaiting approval" summary for one kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DigestConfig {
  #[serde(default = "enabled")]
  pub enabled:  bool,
  pub schedule: Schedule,
  pub statuses: Vec<Status>,
  pub to:       Vec<Recipient>,
  #[serde(default)]
  pub cc:       Vec<Recipient>,
}

impl DigestConfig {
  fn awaiting(statuses: &[Status]) -> Self {
    Self {
      enabled:  true,
      schedule: Schedule::monthly(LocalTime::hm(9, 0), &[3, 6, 9, 12], 1),
      statuses: statuses.to_vec(),
      to:       vec![Recipient::group("management")],
      cc:       vec![Recipient::group("hr")],
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscrepancyConfig {
  #[serde(default = "enabled")]
  pub enabled:  bool,
  pub schedule: Schedule,
}

impl Default for DiscrepancyConfig {
  fn default() -> Self {
    Self { enabled: true, schedule: Schedule::daily(LocalTime::hm(0, 10)) }
  }
}

/// A message sent on a manual change rather than on a schedule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NoticeConfig {
  #[serde(default = "enabled")]
  pub enabled: bool,
  pub to:      Vec<Recipient>,
  #[serde(default)]
  pub cc:      Vec<Recipient>,
}

impl Default for NoticeConfig {
  fn default() -> Self {
    Self {
      enabled: true,
      to:      vec![Recipient::group("hr")],
      cc:      vec![Recipient::group("management")],
    }
  }
}

fn enabled() -> bool { true }

// ─── Rules ───────────────────────────────────────────────────────────────────

/// Where a message goes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recipient {
  /// The record's trainer, if it has one with an email address.
  Trainer,
  /// A named list from [`EngineConfig::groups`].
  Group(String),
  /// A literal address.
  Address(String),
}

impl Recipient {
  pub fn group(name: &str) -> Self { Self::Group(name.to_string()) }
}

/// A rule as configured: what to match, what to send, when to run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleConfig {
  pub name:          String,
  pub kind:          Kind,
  pub statuses:      Vec<Status>,
  #[serde(default)]
  pub date_field:    DateField,
  pub offset_days:   u32,
  #[serde(default)]
  pub direction:     Direction,
  /// Defaults to the rule name.
  #[serde(default)]
  pub flag:          Option<String>,
  #[serde(default)]
  pub catch_up_days: u32,
  pub template:      Template,
  pub to:            Vec<Recipient>,
  #[serde(default)]
  pub cc:            Vec<Recipient>,
  pub schedule:      Schedule,
  #[serde(default = "enabled")]
  pub enabled:       bool,
}

impl RuleConfig {
  pub fn flag(&self) -> &str { self.flag.as_deref().unwrap_or(&self.name) }

  /// The evaluation half of this rule.
  pub fn rule(&self) -> Rule {
    Rule {
      name:          self.name.clone(),
      kind:          self.kind,
      statuses:      self.statuses.clone(),
      date_field:    self.date_field,
      offset_days:   self.offset_days,
      direction:     self.direction,
      flag:          self.flag().to_string(),
      catch_up_days: self.catch_up_days,
    }
  }
}

fn stock_rule(
  name: &str,
  kind: Kind,
  offset_days: u32,
  template: Template,
  to: Vec<Recipient>,
  cc: Vec<Recipient>,
  at: LocalTime,
) -> RuleConfig {
  RuleConfig {
    name: name.to_string(),
    kind,
    statuses: vec![Status::Scheduled],
    date_field: DateField::EventDate,
    offset_days,
    direction: Direction::Before,
    flag: None,
    catch_up_days: 0,
    template,
    to,
    cc,
    schedule: Schedule::daily(at),
    enabled: true,
  }
}

/// The reminder rules shipped by default.
pub fn stock_rules() -> Vec<RuleConfig> {
  use Recipient::Trainer;
  let g = Recipient::group;
  vec![
    stock_rule(
      "outing_two_week_notice",
      Kind::Outing,
      14,
      Template::OutingTwoWeekNotice,
      vec![g("hr")],
      vec![g("management"), g("admin_team")],
      LocalTime::hm(9, 0),
    ),
    stock_rule(
      "training_two_week_notice",
      Kind::Training,
      14,
      Template::TrainingTwoWeekNotice,
      vec![Trainer],
      vec![g("hr"), g("management")],
      LocalTime::hm(9, 15),
    ),
    stock_rule(
      "training_one_week_invitation",
      Kind::Training,
      7,
      Template::TrainingInvitation,
      vec![g("all_employees")],
      vec![g("management")],
      LocalTime::hm(9, 30),
    ),
    stock_rule(
      "training_material_upload",
      Kind::Training,
      7,
      Template::TrainingMaterialUpload,
      vec![Trainer],
      vec![
        g("hr"),
        g("management"),
        g("trainer_reporting_heads"),
        g("trainer_buddies"),
      ],
      LocalTime::hm(9, 45),
    ),
    stock_rule(
      "training_feedback_on_day",
      Kind::Training,
      0,
      Template::TrainingFeedbackOnDay,
      vec![g("all_employees")],
      vec![g("management")],
      LocalTime::hm(10, 0),
    ),
  ]
}
