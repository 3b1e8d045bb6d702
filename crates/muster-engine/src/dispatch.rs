//! Running one reminder rule: select, claim, send, mark.

use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use futures::{StreamExt, stream};
use muster_core::{
  channel::NotificationChannel,
  record::Record,
  rule::Rule,
  store::RecordStore,
};
use tracing::{debug, error, info, warn};

use crate::{
  config::RuleConfig,
  engine::Engine,
  error::{Error, Result},
};

/// What one rule run did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RuleReport {
  /// Records the store returned for the window.
  pub matched:         usize,
  /// Accepted by the channel, including `recorded_failed`.
  pub sent:            usize,
  /// Rejected by the channel; the flag stays unset.
  pub failed:          usize,
  /// Claimed elsewhere, already flagged, no longer eligible, or no
  /// recipients.
  pub skipped:         usize,
  /// Sent, but the flag could not be set afterwards.
  pub recorded_failed: usize,
}

impl fmt::Display for RuleReport {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(
      f,
      "matched={} sent={} failed={} skipped={} recorded_failed={}",
      self.matched, self.sent, self.failed, self.skipped, self.recorded_failed
    )
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
  Sent,
  SentUnrecorded,
  Failed,
  Skipped,
}

impl RuleReport {
  fn tally(mut self, outcome: Outcome) -> Self {
    match outcome {
      Outcome::Sent => self.sent += 1,
      Outcome::SentUnrecorded => {
        self.sent += 1;
        self.recorded_failed += 1;
      }
      Outcome::Failed => self.failed += 1,
      Outcome::Skipped => self.skipped += 1,
    }
    self
  }
}

impl<S: RecordStore, C: NotificationChannel> Engine<S, C> {
  /// Run the reminder rule named `name` once, for today.
  pub async fn run_rule_named(&self, name: &str) -> Result<RuleReport> {
    let rule = self
      .config
      .rule(name)
      .ok_or_else(|| Error::UnknownJob(name.to_string()))?;
    self.run_rule(rule).await
  }

  /// Run `rule` once, for today.
  ///
  /// A failing query aborts the run; a failing send only affects its own
  /// record.
  pub async fn run_rule(&self, config: &RuleConfig) -> Result<RuleReport> {
    let now = self.now();
    let tz = self.config.time_zone;
    let today = self.today();
    let rule = config.rule();
    let query = rule.query(today, tz);

    let candidates = self.store.query(&query).await.map_err(Error::store)?;
    let matched = candidates.len();
    debug!(
      rule = %rule.name,
      matched,
      window_start = %query.date_range.map(|w| w.start.to_rfc3339()).unwrap_or_default(),
      "evaluated rule"
    );

    let dispatches: Vec<_> = candidates
      .into_iter()
      .map(|record| self.dispatch_one(config, &rule, record, today))
      .collect();
    let report = stream::iter(dispatches)
      .buffer_unordered(self.config.dispatch_concurrency.max(1))
      .fold(RuleReport { matched, ..Default::default() }, |report, outcome| {
        futures::future::ready(report.tally(outcome))
      })
      .await;

    if matched > 0 {
      info!(rule = %rule.name, %report, %now, "rule run finished");
    }
    Ok(report)
  }

  async fn dispatch_one(
    &self,
    config: &RuleConfig,
    rule: &Rule,
    candidate: Record,
    today: NaiveDate,
  ) -> Outcome {
    let id = candidate.id;
    let tz = self.config.time_zone;

    let Some(_claim) = self.guard.claim(id, &rule.flag) else {
      debug!(record_id = %id, rule = %rule.name, "already being dispatched");
      return Outcome::Skipped;
    };

    // The candidate may be stale by now; decide on a fresh read.
    let record = match self.store.get_record(id).await {
      Ok(Some(record)) => record,
      Ok(None) => {
        debug!(record_id = %id, rule = %rule.name, "record disappeared");
        return Outcome::Skipped;
      }
      Err(e) => {
        error!(record_id = %id, rule = %rule.name, error = %e, "failed to re-read record");
        return Outcome::Failed;
      }
    };
    if !rule.matches(&record, today, tz) {
      debug!(record_id = %id, rule = %rule.name, "no longer eligible");
      return Outcome::Skipped;
    }

    let message = match self.composer().compose(config, &record) {
      Ok(Some(message)) => message,
      Ok(None) => {
        warn!(record_id = %id, rule = %rule.name, "no recipients resolved; not sending");
        return Outcome::Skipped;
      }
      Err(e) => {
        error!(record_id = %id, rule = %rule.name, error = %e, "failed to render message");
        return Outcome::Failed;
      }
    };

    if let Err(e) = self.channel.send(&message).await {
      error!(record_id = %id, rule = %rule.name, error = %e, "dispatch failed");
      return Outcome::Failed;
    }

    self.mark_sent(id, rule, self.now()).await
  }

  async fn mark_sent(&self, id: uuid::Uuid, rule: &Rule, at: DateTime<Utc>) -> Outcome {
    match self.store.mark_flag(id, &rule.flag, at).await {
      Ok(true) => {
        info!(record_id = %id, rule = %rule.name, "reminder sent");
        Outcome::Sent
      }
      Ok(false) => {
        warn!(record_id = %id, rule = %rule.name, "flag was already set after send");
        Outcome::Sent
      }
      Err(e) => {
        error!(
          record_id = %id,
          rule = %rule.name,
          error = %e,
          "dispatch-recorded-failed: message sent but flag not recorded"
        );
        Outcome::SentUnrecorded
      }
    }
  }
}
