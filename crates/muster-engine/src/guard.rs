//! In-process claims on `(record, flag)` pairs.
//!
//! The store's conditional flag insert already prevents a flag from being set
//! twice; the claim set additionally stops two concurrent rule runs in this
//! process from both sending before either has marked.

use std::{collections::HashSet, sync::Mutex};

use uuid::Uuid;

#[derive(Debug, Default)]
pub struct IdempotencyGuard {
  in_flight: Mutex<HashSet<(Uuid, String)>>,
}

impl IdempotencyGuard {
  pub fn new() -> Self { Self::default() }

  /// Claim `(id, flag)`; `None` if another dispatch holds it.
  pub fn claim(&self, id: Uuid, flag: &str) -> Option<Claim<'_>> {
    let key = (id, flag.to_string());
    let mut in_flight = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
    if !in_flight.insert(key.clone()) {
      return None;
    }
    Some(Claim { guard: self, key })
  }

  pub fn in_flight(&self) -> usize {
    self.in_flight.lock().unwrap_or_else(|e| e.into_inner()).len()
  }
}

/// Released on drop.
#[derive(Debug)]
pub struct Claim<'a> {
  guard: &'a IdempotencyGuard,
  key:   (Uuid, String),
}

impl Drop for Claim<'_> {
  fn drop(&mut self) {
    self
      .guard
      .in_flight
      .lock()
      .unwrap_or_else(|e| e.into_inner())
      .remove(&self.key);
  }
}
