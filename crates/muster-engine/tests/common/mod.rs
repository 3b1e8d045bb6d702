#![allow(dead_code)]

use std::sync::{
  Arc, Mutex,
  atomic::{AtomicBool, Ordering},
};

use chrono::{DateTime, TimeZone, Utc};
use chrono_tz::Asia::Kolkata;
use muster_core::{
  channel::{NotificationChannel, OutboundMessage},
  clock::{Clock as _, ManualClock},
  record::{
    Discrepancy, Feedback, Kind, NewRecord, Record, RecordDetails, Status, Trainer,
    TrainingDetails,
  },
  store::{RecordQuery, RecordStore},
};
use muster_engine::{Engine, EngineConfig};
use muster_store_sqlite::SqliteStore;
use uuid::Uuid;

/// `y-m-d h:min` in Asia/Kolkata, as UTC.
pub fn ist(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
  Kolkata
    .with_ymd_and_hms(y, m, d, h, min, 0)
    .unwrap()
    .with_timezone(&Utc)
}

pub fn config() -> EngineConfig {
  let mut config = EngineConfig::default();
  for (group, addr) in [
    ("hr", "hr@example.com"),
    ("management", "boss@example.com"),
    ("admin_team", "admin@example.com"),
    ("all_employees", "all@example.com"),
    ("trainer_reporting_heads", "heads@example.com"),
    ("trainer_buddies", "buddies@example.com"),
  ] {
    config.groups.insert(group.into(), vec![addr.into()]);
  }
  config
}

// ─── Channel ─────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
#[error("rejected by test channel")]
pub struct Rejected;

/// Keeps every accepted message; can be told to reject everything.
#[derive(Clone, Default)]
pub struct RecordingChannel {
  sent:   Arc<Mutex<Vec<OutboundMessage>>>,
  reject: Arc<AtomicBool>,
}

impl RecordingChannel {
  pub fn sent(&self) -> Vec<OutboundMessage> { self.sent.lock().unwrap().clone() }

  pub fn reject(&self, reject: bool) { self.reject.store(reject, Ordering::SeqCst); }
}

impl NotificationChannel for RecordingChannel {
  type Error = Rejected;

  async fn send(&self, message: &OutboundMessage) -> Result<(), Rejected> {
    tokio::task::yield_now().await;
    if self.reject.load(Ordering::SeqCst) {
      return Err(Rejected);
    }
    self.sent.lock().unwrap().push(message.clone());
    Ok(())
  }
}

// ─── Store with injected faults ──────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum FlakyError {
  #[error(transparent)]
  Store(#[from] muster_store_sqlite::Error),
  #[error("injected failure")]
  Injected,
}

#[derive(Default)]
pub struct Faults {
  pub fail_mark:        AtomicBool,
  pub fail_training:    AtomicBool,
  pub panic_on_outings: AtomicBool,
}

/// Delegates to a real store unless a fault is switched on.
#[derive(Clone)]
pub struct FlakyStore {
  pub inner:  SqliteStore,
  pub faults: Arc<Faults>,
}

impl RecordStore for FlakyStore {
  type Error = FlakyError;

  async fn create_record(&self, input: NewRecord) -> Result<Record, FlakyError> {
    Ok(self.inner.create_record(input).await?)
  }

  async fn get_record(&self, id: Uuid) -> Result<Option<Record>, FlakyError> {
    Ok(self.inner.get_record(id).await?)
  }

  async fn query(&self, query: &RecordQuery) -> Result<Vec<Record>, FlakyError> {
    if query.kind == Kind::Training && self.faults.fail_training.load(Ordering::SeqCst) {
      return Err(FlakyError::Injected);
    }
    if query.kind == Kind::Outing && self.faults.panic_on_outings.load(Ordering::SeqCst) {
      panic!("injected panic");
    }
    Ok(self.inner.query(query).await?)
  }

  async fn transition(
    &self,
    id: Uuid,
    to: Status,
    at: DateTime<Utc>,
  ) -> Result<Record, FlakyError> {
    Ok(self.inner.transition(id, to, at).await?)
  }

  async fn set_event_date(
    &self,
    id: Uuid,
    event_date: Option<DateTime<Utc>>,
  ) -> Result<Record, FlakyError> {
    Ok(self.inner.set_event_date(id, event_date).await?)
  }

  async fn add_feedback(&self, id: Uuid, feedback: Feedback) -> Result<(), FlakyError> {
    Ok(self.inner.add_feedback(id, feedback).await?)
  }

  async fn mark_flag(
    &self,
    id: Uuid,
    flag: &str,
    at: DateTime<Utc>,
  ) -> Result<bool, FlakyError> {
    if self.faults.fail_mark.load(Ordering::SeqCst) {
      return Err(FlakyError::Injected);
    }
    Ok(self.inner.mark_flag(id, flag, at).await?)
  }

  async fn add_discrepancies(
    &self,
    id: Uuid,
    discrepancies: Vec<Discrepancy>,
  ) -> Result<usize, FlakyError> {
    Ok(self.inner.add_discrepancies(id, discrepancies).await?)
  }

  async fn complete_due(&self, kind: Kind, cutoff: DateTime<Utc>) -> Result<u64, FlakyError> {
    Ok(self.inner.complete_due(kind, cutoff).await?)
  }

  async fn archive_stale(
    &self,
    kind: Kind,
    statuses: &[Status],
    cutoff: DateTime<Utc>,
    now: DateTime<Utc>,
  ) -> Result<u64, FlakyError> {
    Ok(self.inner.archive_stale(kind, statuses, cutoff, now).await?)
  }
}

// ─── Harness ─────────────────────────────────────────────────────────────────

pub struct Harness {
  pub engine:  Arc<Engine<FlakyStore, RecordingChannel>>,
  pub store:   SqliteStore,
  pub faults:  Arc<Faults>,
  pub channel: RecordingChannel,
  pub clock:   Arc<ManualClock>,
}

impl Harness {
  pub async fn at(now: DateTime<Utc>) -> Self { Self::with_config(now, config()).await }

  pub async fn with_config(now: DateTime<Utc>, config: EngineConfig) -> Self {
    let store = SqliteStore::open_in_memory()
      .await
      .unwrap()
      .with_time_zone(config.time_zone);
    let faults = Arc::new(Faults::default());
    let channel = RecordingChannel::default();
    let clock = Arc::new(ManualClock::new(now));
    let engine = Engine::new(
      FlakyStore { inner: store.clone(), faults: faults.clone() },
      channel.clone(),
      config,
    )
    .with_clock(clock.clone());
    Self { engine: Arc::new(engine), store, faults, channel, clock }
  }

  pub async fn get(&self, id: Uuid) -> Record {
    self.store.get_record(id).await.unwrap().unwrap()
  }

  /// A proposed record of `kind` moved to `status` with `event_date`.
  pub async fn record(
    &self,
    kind: Kind,
    topic: &str,
    event_date: Option<DateTime<Utc>>,
    status: Status,
  ) -> Record {
    let mut input = NewRecord::proposed(kind, topic);
    if kind == Kind::Training {
      input.details = RecordDetails::Training(TrainingDetails {
        trainer: Some(Trainer {
          name:  "Ravi".into(),
          email: Some("ravi@example.com".into()),
        }),
        ..Default::default()
      });
    }
    let record = self.store.create_record(input).await.unwrap();
    if event_date.is_some() {
      self.store.set_event_date(record.id, event_date).await.unwrap();
    }
    let path: &[Status] = match (kind, status) {
      (_, Status::Proposed) => &[],
      (Kind::Training, Status::Approved) => &[Status::Approved],
      (Kind::Training, Status::Scheduled) => &[Status::Approved, Status::Scheduled],
      (Kind::Training, Status::Completed) => {
        &[Status::Approved, Status::Scheduled, Status::Completed]
      }
      (Kind::Outing, Status::Scheduled) => &[Status::Scheduled],
      (Kind::Outing, Status::Completed) => &[Status::Scheduled, Status::Completed],
      (_, Status::Rejected) => &[Status::Rejected],
      other => panic!("no test path to {other:?}"),
    };
    for to in path {
      self.store.transition(record.id, *to, self.clock.now()).await.unwrap();
    }
    self.get(record.id).await
  }
}
