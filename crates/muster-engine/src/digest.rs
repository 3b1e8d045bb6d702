//! Quarterly "awaiting approval" digests.

use muster_core::{
  channel::NotificationChannel,
  fiscal::FiscalPeriod,
  record::Kind,
  store::{RecordQuery, RecordStore},
};
use tracing::info;

use crate::{
  engine::Engine,
  error::{Error, Result},
};

impl<S: RecordStore, C: NotificationChannel> Engine<S, C> {
  /// Send the approval digest for `kind`. Returns how many records it
  /// listed; `0` means nothing was sent.
  pub async fn send_digest(&self, kind: Kind) -> Result<usize> {
    let digest = &self.config.policy(kind).digest;
    let query = RecordQuery::by_status(kind, &digest.statuses);
    let records = self.store.query(&query).await.map_err(Error::store)?;
    let period = FiscalPeriod::upcoming(self.today());

    let Some(message) = self.composer().compose_digest(kind, period, &records)? else {
      info!(%kind, %period, awaiting = records.len(), "no approval digest to send");
      return Ok(0);
    };
    self.channel.send(&message).await.map_err(Error::channel)?;
    info!(%kind, %period, listed = records.len(), "approval digest sent");
    Ok(records.len())
  }
}
