//! The Muster automation engine.
//!
//! Evaluates reminder rules against the record store, sends what is due
//! exactly once per record, moves records through their date-driven
//! transitions, and schedules all of it in one configured time zone.

pub mod channel;
pub mod compose;
pub mod config;
pub mod digest;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod guard;
pub mod schedule;
pub mod scheduler;
pub mod templates;
pub mod transitions;

pub use config::EngineConfig;
pub use dispatch::RuleReport;
pub use engine::Engine;
pub use error::{Error, Result};
pub use scheduler::{Job, JobKind, JobOutcome, Scheduler};
