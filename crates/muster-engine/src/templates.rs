//! HTML message templates.
//!
//! Each reminder rule names one [`Template`]. Bodies are tera templates
//! compiled into the binary with autoescape on; rendering reads only the
//! record snapshot and a [`RenderContext`], so the output is a pure function
//! of its inputs.

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter};
use tera::{Context as TeraContext, Tera};

use muster_core::{
  fiscal::FiscalPeriod,
  record::{Kind, Mode, Record, RecordDetails},
};

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
  Display,
  AsRefStr,
  EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Template {
  TrainingTwoWeekNotice,
  TrainingInvitation,
  TrainingMaterialUpload,
  TrainingFeedbackOnDay,
  OutingTwoWeekNotice,
  OutingProposalUpdate,
}

impl Template {
  /// The record kind this template expects.
  pub fn kind(self) -> Kind {
    match self {
      Self::OutingTwoWeekNotice | Self::OutingProposalUpdate => Kind::Outing,
      _ => Kind::Training,
    }
  }

  fn file(self) -> String { format!("{}.html", self.as_ref()) }
}

/// Settings a template may reference besides the record.
#[derive(Debug, Clone)]
pub struct RenderContext<'a> {
  pub time_zone:            Tz,
  pub frontend_url:         &'a str,
  pub material_upload_link: &'a str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rendered {
  pub subject: String,
  pub body:    String,
}

/// `Tuesday, April 15 2025 at 10:00 AM IST`.
pub fn format_when(at: DateTime<Utc>, tz: Tz) -> String {
  at.with_timezone(&tz)
    .format("%A, %B %-d %Y at %I:%M %p %Z")
    .to_string()
}

// ─── Template set ────────────────────────────────────────────────────────────

static TEMPLATES: LazyLock<tera::Result<Tera>> = LazyLock::new(load_templates);

fn load_templates() -> tera::Result<Tera> {
  let mut tera = Tera::default();
  tera.add_raw_templates(vec![
    ("layout.html", include_str!("../templates/layout.html")),
    (
      "training_two_week_notice.html",
      include_str!("../templates/training_two_week_notice.html"),
    ),
    ("training_invitation.html", include_str!("../templates/training_invitation.html")),
    (
      "training_material_upload.html",
      include_str!("../templates/training_material_upload.html"),
    ),
    (
      "training_feedback_on_day.html",
      include_str!("../templates/training_feedback_on_day.html"),
    ),
    ("outing_two_week_notice.html", include_str!("../templates/outing_two_week_notice.html")),
    ("outing_proposal_update.html", include_str!("../templates/outing_proposal_update.html")),
    ("approval_digest.html", include_str!("../templates/approval_digest.html")),
  ])?;
  tera.autoescape_on(vec![".html"]);
  Ok(tera)
}

fn render_page<T: Serialize>(name: &str, data: &T) -> tera::Result<String> {
  let templates = TEMPLATES
    .as_ref()
    .map_err(|e| tera::Error::msg(format!("message templates failed to load: {e}")))?;
  let context = TeraContext::from_serialize(data)?;
  templates.render(name, &context)
}

// ─── Reminder templates ──────────────────────────────────────────────────────

/// Everything a record template can print. Values are escaped by tera.
#[derive(Serialize)]
struct RecordView<'a> {
  heading:              String,
  id:                   String,
  topic:                &'a str,
  description:          &'a str,
  status:               String,
  when:                 String,
  date:                 String,
  quarter:              String,
  trainer:              String,
  mode:                 String,
  place:                String,
  venue:                String,
  budget:               Option<String>,
  feedback_link:        String,
  dashboard_link:       String,
  material_upload_link: &'a str,
}

impl<'a> RecordView<'a> {
  fn new(heading: &str, record: &'a Record, ctx: &RenderContext<'a>) -> Self {
    let base = ctx.frontend_url.trim_end_matches('/');
    let tbd = || "TBD".to_string();

    let (trainer, mode, place) = match &record.details {
      RecordDetails::Training(t) => {
        let place = match t.mode {
          Mode::Online => t
            .meeting_link
            .clone()
            .unwrap_or_else(|| "Meeting link to follow".into()),
          Mode::Offline => t.venue.clone().unwrap_or_else(|| "Venue to follow".into()),
        };
        let trainer = t.trainer.as_ref().map(|t| t.name.clone()).unwrap_or_else(tbd);
        (trainer, t.mode.to_string(), place)
      }
      RecordDetails::Outing(_) => (tbd(), tbd(), tbd()),
    };
    let (venue, budget) = match &record.details {
      RecordDetails::Outing(o) => (o.place.clone(), o.budget.map(group_thousands)),
      RecordDetails::Training(_) => (None, None),
    };
    let quarter = match (&record.quarter, &record.financial_year) {
      (Some(q), Some(fy)) => format!("{q} FY {fy}"),
      _ => "the upcoming quarter".into(),
    };
    let description = match record.description.trim() {
      "" => "No description provided",
      text => text,
    };

    Self {
      heading: heading.to_string(),
      id: record.id.to_string(),
      topic: &record.topic,
      description,
      status: record.status.as_ref().replace('_', " "),
      when: record.event_date.map(|at| format_when(at, ctx.time_zone)).unwrap_or_else(tbd),
      date: short_date(record.event_date, ctx.time_zone),
      quarter,
      trainer,
      mode,
      place,
      venue: venue.unwrap_or_else(|| "To be announced".into()),
      budget,
      feedback_link: format!(
        "{base}/training?tab=employee-feedback&trainingId={}",
        record.id
      ),
      dashboard_link: format!("{base}/?tab=hr"),
      material_upload_link: ctx.material_upload_link,
    }
  }
}

fn short_date(at: Option<DateTime<Utc>>, tz: Tz) -> String {
  at.map(|at| at.with_timezone(&tz).format("%d %b %Y").to_string())
    .unwrap_or_else(|| "TBD".into())
}

/// `1234567` as `1,234,567`.
fn group_thousands(n: u64) -> String {
  let digits = n.to_string();
  let mut out = String::with_capacity(digits.len() + digits.len() / 3);
  for (i, c) in digits.chars().enumerate() {
    if i > 0 && (digits.len() - i) % 3 == 0 {
      out.push(',');
    }
    out.push(c);
  }
  out
}

impl Template {
  pub fn subject(self, record: &Record) -> String {
    let topic = &record.topic;
    match self {
      Self::TrainingTwoWeekNotice => format!("Upcoming Training Scheduled: {topic}"),
      Self::TrainingInvitation => format!("Invitation for Training: {topic}"),
      Self::TrainingMaterialUpload => format!("Upload Training Material: {topic}"),
      Self::TrainingFeedbackOnDay => format!("Mandatory Training Feedback: {topic}"),
      Self::OutingTwoWeekNotice => format!("Upcoming Outing/Event Scheduled: {topic}"),
      Self::OutingProposalUpdate => format!("Outing/Event Proposal Update: {topic}"),
    }
  }

  pub fn render(self, record: &Record, ctx: &RenderContext<'_>) -> tera::Result<Rendered> {
    let subject = self.subject(record);
    let heading = match self {
      Self::OutingProposalUpdate => "Outing/Event Proposal Update",
      _ => subject.as_str(),
    };
    let body = render_page(&self.file(), &RecordView::new(heading, record, ctx))?;
    Ok(Rendered { subject, body })
  }
}

// ─── Approval digests ────────────────────────────────────────────────────────

#[derive(Serialize)]
struct DigestView<'a> {
  heading:        String,
  period:         String,
  dashboard_link: String,
  items:          Vec<DigestItem<'a>>,
}

#[derive(Serialize)]
struct DigestItem<'a> {
  topic:       &'a str,
  priority:    String,
  proposed_by: String,
  date:        String,
}

/// The quarterly "awaiting approval" summary listing `records`.
pub fn render_digest(
  kind: Kind,
  period: FiscalPeriod,
  records: &[Record],
  ctx: &RenderContext<'_>,
) -> tera::Result<Rendered> {
  let base = ctx.frontend_url.trim_end_matches('/');
  let (noun, dashboard_link) = match kind {
    Kind::Training => ("Training Plan", format!("{base}/training-page?tab=management")),
    Kind::Outing => ("Outing/Event Plan", format!("{base}/?tab=hr")),
  };

  let view = DigestView {
    heading: format!("Quarterly {noun}: Approval Request"),
    period: period.to_string(),
    dashboard_link,
    items: records
      .iter()
      .map(|record| DigestItem {
        topic:       &record.topic,
        priority:    record.priority.to_string(),
        proposed_by: format!("{} ({})", record.proposed_by_name, record.proposed_by_role),
        date:        short_date(record.event_date, ctx.time_zone),
      })
      .collect(),
  };

  Ok(Rendered {
    subject: format!("Quarterly {noun}: Approval Request ({period})"),
    body:    render_page("approval_digest.html", &view)?,
  })
}
