//! The job table and the loop that fires it.
//!
//! Every job runs on its own task and sleeps until its next local fire time.
//! Each firing is spawned separately, so an error or panic is caught at the
//! job boundary and never reaches another job.

use std::{fmt, sync::Arc};

use chrono::{DateTime, Utc};
use muster_core::{channel::NotificationChannel, record::Kind, store::RecordStore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::{
  config::EngineConfig,
  dispatch::RuleReport,
  engine::Engine,
  error::{Error, Result},
  schedule::Schedule,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobKind {
  Rule(String),
  Digest(Kind),
  AutoComplete(Kind),
  AutoArchive(Kind),
  Discrepancies,
}

#[derive(Debug, Clone)]
pub struct Job {
  pub name:     String,
  pub kind:     JobKind,
  pub schedule: Schedule,
}

/// What a job run achieved, for logging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
  Rule(RuleReport),
  Transitioned(u64),
  DigestListed(usize),
  DiscrepanciesAdded(usize),
}

impl fmt::Display for JobOutcome {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Rule(report) => write!(f, "{report}"),
      Self::Transitioned(n) => write!(f, "changed={n}"),
      Self::DigestListed(n) => write!(f, "listed={n}"),
      Self::DiscrepanciesAdded(n) => write!(f, "discrepancies={n}"),
    }
  }
}

impl EngineConfig {
  /// Every enabled job, in a stable order.
  pub fn jobs(&self) -> Vec<Job> {
    let mut jobs = Vec::new();
    for kind in [Kind::Outing, Kind::Training] {
      let policy = self.policy(kind);
      jobs.push(Job {
        name:     format!("{kind}_auto_archive"),
        kind:     JobKind::AutoArchive(kind),
        schedule: policy.archive_at.clone(),
      });
      jobs.push(Job {
        name:     format!("{kind}_auto_complete"),
        kind:     JobKind::AutoComplete(kind),
        schedule: policy.complete_at.clone(),
      });
      if policy.digest.enabled {
        jobs.push(Job {
          name:     format!("{kind}_approval_digest"),
          kind:     JobKind::Digest(kind),
          schedule: policy.digest.schedule.clone(),
        });
      }
    }
    if self.discrepancies.enabled {
      jobs.push(Job {
        name:     "outing_feedback_discrepancies".into(),
        kind:     JobKind::Discrepancies,
        schedule: self.discrepancies.schedule.clone(),
      });
    }
    jobs.extend(self.rules.iter().filter(|r| r.enabled).map(|r| Job {
      name:     r.name.clone(),
      kind:     JobKind::Rule(r.name.clone()),
      schedule: r.schedule.clone(),
    }));
    jobs
  }

  pub fn job(&self, name: &str) -> Option<Job> {
    self.jobs().into_iter().find(|j| j.name == name)
  }
}

impl<S: RecordStore, C: NotificationChannel> Engine<S, C> {
  pub async fn run_job(&self, kind: &JobKind) -> Result<JobOutcome> {
    match kind {
      JobKind::Rule(name) => self.run_rule_named(name).await.map(JobOutcome::Rule),
      JobKind::Digest(kind) => self.send_digest(*kind).await.map(JobOutcome::DigestListed),
      JobKind::AutoComplete(kind) => {
        self.auto_complete(*kind).await.map(JobOutcome::Transitioned)
      }
      JobKind::AutoArchive(kind) => {
        self.auto_archive(*kind).await.map(JobOutcome::Transitioned)
      }
      JobKind::Discrepancies => {
        self.record_discrepancies().await.map(JobOutcome::DiscrepanciesAdded)
      }
    }
  }
}

pub struct Scheduler<S, C> {
  engine: Arc<Engine<S, C>>,
  jobs:   Vec<Job>,
}

impl<S, C> Scheduler<S, C>
where
  S: RecordStore + 'static,
  C: NotificationChannel + 'static,
{
  pub fn new(engine: Arc<Engine<S, C>>) -> Self {
    let jobs = engine.config().jobs();
    Self { engine, jobs }
  }

  pub fn jobs(&self) -> &[Job] { &self.jobs }

  /// Next fire time of every job.
  pub fn upcoming(&self) -> Vec<(&Job, Option<DateTime<Utc>>)> {
    let now = self.engine.now();
    let tz = self.engine.config().time_zone;
    self
      .jobs
      .iter()
      .map(|job| (job, job.schedule.next_after(now, tz)))
      .collect()
  }

  /// Run the job named `name` once, now.
  pub async fn run_now(&self, name: &str) -> Result<JobOutcome> {
    let job = self
      .jobs
      .iter()
      .find(|j| j.name == name)
      .ok_or_else(|| Error::UnknownJob(name.to_string()))?;
    fire(self.engine.clone(), job.clone()).await
  }

  /// Run every job until `cancel` fires.
  pub async fn run(self, cancel: CancellationToken) {
    info!(
      jobs = self.jobs.len(),
      time_zone = %self.engine.config().time_zone,
      "scheduler started"
    );

    let mut tasks = JoinSet::new();
    for job in self.jobs {
      tasks.spawn(job_loop(self.engine.clone(), job, cancel.clone()));
    }
    while let Some(joined) = tasks.join_next().await {
      if let Err(e) = joined {
        error!(error = %e, "job loop ended abnormally");
      }
    }
    info!("scheduler stopped");
  }
}

async fn job_loop<S, C>(engine: Arc<Engine<S, C>>, job: Job, cancel: CancellationToken)
where
  S: RecordStore + 'static,
  C: NotificationChannel + 'static,
{
  let tz = engine.config().time_zone;
  // The sleep runs on the monotonic timer, so the wall clock may still read
  // before a slot that has already fired.
  let mut last_fired: Option<DateTime<Utc>> = None;
  loop {
    let now = engine.now();
    let after = last_fired.map_or(now, |last| last.max(now));
    let Some(next) = job.schedule.next_after(after, tz) else {
      warn!(job = %job.name, schedule = %job.schedule, "schedule never fires; job disabled");
      return;
    };
    let wait = (next - now).to_std().unwrap_or_default();

    tokio::select! {
      _ = cancel.cancelled() => {
        info!(job = %job.name, "job shutting down");
        return;
      }
      _ = tokio::time::sleep(wait) => {}
    }

    // Failures are already logged by `fire`; the next firing retries.
    let _ = fire(engine.clone(), job.clone()).await;
    last_fired = Some(next);
  }
}

/// Run `job` on its own task and log how it ended.
async fn fire<S, C>(engine: Arc<Engine<S, C>>, job: Job) -> Result<JobOutcome>
where
  S: RecordStore + 'static,
  C: NotificationChannel + 'static,
{
  let kind = job.kind.clone();
  let handle = tokio::spawn(async move { engine.run_job(&kind).await });

  match handle.await {
    Ok(Ok(outcome)) => {
      info!(job = %job.name, %outcome, "job finished");
      Ok(outcome)
    }
    Ok(Err(e)) => {
      error!(job = %job.name, error = %e, "job failed");
      Err(e)
    }
    Err(e) => {
      error!(job = %job.name, error = %e, "job panicked");
      Err(Error::Panicked(job.name))
    }
  }
}
