//! `muster` runs the reminder and lifecycle scheduler.
//!
//! Reads `muster.toml` (or the path given with `--config`) with `MUSTER__*`
//! environment overrides, opens the SQLite store, and either runs every job
//! on its schedule or performs one operator command.
//!
//! ```
//! muster run
//! muster run-job outing_two_week_notice
//! muster transition 6f1c… scheduled
//! ```

use std::{path::PathBuf, str::FromStr, sync::Arc};

use anyhow::{Context as _, bail};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use muster_core::{
  record::{Feedback, Kind, NewRecord, Priority, Status},
  store::RecordStore,
};
use muster_engine::{Engine, EngineConfig, Scheduler, channel::MailChannel};
use muster_store_sqlite::SqliteStore;
use tokio_util::sync::CancellationToken;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Parser)]
#[command(author, version, about = "Training and outing reminder engine")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "muster.toml")]
  config: PathBuf,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Run every job on its schedule until Ctrl-C.
  Run,
  /// Run one job immediately.
  RunJob { name: String },
  /// List jobs and their next fire times.
  Jobs,
  /// Record a new proposal.
  Propose {
    kind:        String,
    topic:       String,
    #[arg(long, default_value = "")]
    description: String,
    #[arg(long, default_value = "P3")]
    priority:    String,
    /// `suggested` for employee outing suggestions.
    #[arg(long, default_value = "proposed")]
    status:      String,
    #[arg(long, default_value = "HR")]
    role:        String,
    #[arg(long, default_value = "Anonymous")]
    name:        String,
  },
  /// Move a record to another status; outing changes notify HR.
  Transition { id: Uuid, status: String },
  /// Set a record's event date (RFC 3339), or clear it with `none`.
  SetDate { id: Uuid, date: String },
  /// Append a participant's feedback entry.
  Feedback {
    id:          Uuid,
    participant: String,
    #[arg(long)]
    absent:      bool,
    /// Leave the form unsubmitted.
    #[arg(long)]
    pending:     bool,
    /// Overall rating, 1 to 5.
    #[arg(long, value_parser = clap::value_parser!(u8).range(1..=5))]
    rating:      Option<u8>,
    #[arg(long)]
    comments:    Option<String>,
  },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  let settings = config::Config::builder()
    .add_source(config::File::from(cli.config).required(false))
    .add_source(config::Environment::with_prefix("MUSTER").separator("__"))
    .build()
    .context("failed to read config file")?;
  let config: EngineConfig = settings
    .try_deserialize()
    .context("failed to deserialise EngineConfig")?;
  if let Err(problem) = config.validate() {
    bail!("invalid configuration: {problem}");
  }

  let store = SqliteStore::open(&config.store_path)
    .await
    .with_context(|| format!("failed to open store at {:?}", config.store_path))?
    .with_time_zone(config.time_zone);

  match cli.command {
    Command::Run => {
      let scheduler = scheduler(store, &config)?;
      let cancel = CancellationToken::new();
      let shutdown = cancel.clone();
      tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
          tracing::info!("shutdown requested");
        }
        shutdown.cancel();
      });
      scheduler.run(cancel).await;
    }
    Command::RunJob { name } => {
      let outcome = scheduler(store, &config)?
        .run_now(&name)
        .await
        .with_context(|| format!("job {name:?} failed"))?;
      println!("{name}: {outcome}");
    }
    Command::Jobs => {
      for (job, next) in scheduler(store, &config)?.upcoming() {
        let next = next
          .map(|at| at.with_timezone(&config.time_zone).to_rfc3339())
          .unwrap_or_else(|| "never".into());
        println!("{:<36} {:<40} next: {next}", job.name, job.schedule.to_string());
      }
    }
    Command::Propose { kind, topic, description, priority, status, role, name } => {
      let kind = Kind::from_str(&kind).with_context(|| format!("unknown kind {kind:?}"))?;
      let mut input = NewRecord::proposed(kind, topic);
      input.description = description;
      input.priority =
        Priority::from_str(&priority).with_context(|| format!("unknown priority {priority:?}"))?;
      input.status = parse_status(&status)?;
      input.proposed_by_role = role;
      input.proposed_by_name = name;
      let record = store.create_record(input).await?;
      println!("{}", serde_json::to_string_pretty(&record)?);
    }
    Command::Transition { id, status } => {
      let record = engine(store, &config)?.transition(id, parse_status(&status)?).await?;
      println!("{} is now {}", record.id, record.status);
    }
    Command::SetDate { id, date } => {
      let at = if date.eq_ignore_ascii_case("none") {
        None
      } else {
        Some(
          DateTime::parse_from_rfc3339(&date)
            .with_context(|| format!("invalid RFC 3339 date {date:?}"))?
            .with_timezone(&Utc),
        )
      };
      let record = store.set_event_date(id, at).await?;
      println!(
        "{}: event date {:?}, {} {}",
        record.id,
        record.event_date,
        record.quarter.unwrap_or_default(),
        record.financial_year.unwrap_or_default()
      );
    }
    Command::Feedback { id, participant, absent, pending, rating, comments } => {
      let feedback = Feedback {
        participant,
        attended: !absent,
        overall_rating: rating,
        content_quality: None,
        comments,
        submitted_at: (!pending).then(Utc::now),
      };
      store.add_feedback(id, feedback).await?;
      println!("feedback recorded on {id}");
    }
  }

  Ok(())
}

fn engine(
  store: SqliteStore,
  config: &EngineConfig,
) -> anyhow::Result<Engine<SqliteStore, MailChannel>> {
  let channel = MailChannel::from_config(config.smtp.as_ref())
    .context("failed to set up SMTP channel")?;
  if config.smtp.is_none() {
    tracing::warn!("no SMTP configured; messages will only be logged");
  }
  Ok(Engine::new(store, channel, config.clone()))
}

fn scheduler(
  store: SqliteStore,
  config: &EngineConfig,
) -> anyhow::Result<Scheduler<SqliteStore, MailChannel>> {
  Ok(Scheduler::new(Arc::new(engine(store, config)?)))
}

fn parse_status(s: &str) -> anyhow::Result<Status> {
  match Status::from_str(s) {
    Ok(status) => Ok(status),
    Err(_) => bail!("unknown status {s:?}"),
  }
}
