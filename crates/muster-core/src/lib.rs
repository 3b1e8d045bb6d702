//! Core types and trait definitions for the Muster engine.
//!
//! This crate is deliberately free of database and transport dependencies.
//! It holds the record model, the lifecycle graph, fiscal-period derivation,
//! rule windows, and the collaborator traits (`RecordStore`,
//! `NotificationChannel`, `Clock`) that the engine is written against.

// Native `async fn` in traits; the `Send` bounds are spelled out on the
// returned futures where it matters.
#![allow(async_fn_in_trait)]

pub mod channel;
pub mod clock;
pub mod error;
pub mod fiscal;
pub mod lifecycle;
pub mod record;
pub mod rule;
pub mod store;

pub use error::{Error, Result};
