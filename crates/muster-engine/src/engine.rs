//! [`Engine`]: the store, channel, clock, and configuration every job runs
//! against.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use muster_core::{
  channel::NotificationChannel,
  clock::{Clock, SystemClock},
  rule::local_date,
  store::RecordStore,
};

use crate::{compose::Composer, config::EngineConfig, guard::IdempotencyGuard};

pub struct Engine<S, C> {
  pub(crate) store:   S,
  pub(crate) channel: C,
  pub(crate) clock:   Arc<dyn Clock>,
  pub(crate) config:  EngineConfig,
  pub(crate) guard:   IdempotencyGuard,
}

impl<S: RecordStore, C: NotificationChannel> Engine<S, C> {
  pub fn new(store: S, channel: C, config: EngineConfig) -> Self {
    Self {
      store,
      channel,
      clock: Arc::new(SystemClock),
      config,
      guard: IdempotencyGuard::new(),
    }
  }

  /// Replace the wall clock, e.g. with a
  /// [`ManualClock`](muster_core::clock::ManualClock) in tests.
  pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
    self.clock = clock;
    self
  }

  pub fn store(&self) -> &S { &self.store }

  pub fn channel(&self) -> &C { &self.channel }

  pub fn config(&self) -> &EngineConfig { &self.config }

  pub fn now(&self) -> DateTime<Utc> { self.clock.now() }

  /// The current calendar date in the engine's time zone.
  pub fn today(&self) -> NaiveDate { local_date(self.now(), self.config.time_zone) }

  pub(crate) fn composer(&self) -> Composer<'_> { Composer::new(&self.config) }
}
