//! [`SqliteStore`], the SQLite implementation of [`RecordStore`].

use std::path::Path;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use rusqlite::OptionalExtension as _;
use uuid::Uuid;

use muster_core::{
  fiscal::derive_labels,
  lifecycle,
  record::{Discrepancy, Feedback, Kind, NewRecord, Record, Status},
  store::{RecordQuery, RecordStore},
};

use crate::{
  Error, Result,
  encode::{RECORD_COLUMNS, RawRecord, encode_details, encode_dt, encode_uuid},
  schema::SCHEMA,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A Muster record store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted. Every call
/// runs on the connection's dedicated thread, so a read-check-write inside
/// one call is not interleaved with any other call on the same store.
#[derive(Clone)]
pub struct SqliteStore {
  conn:      tokio_rusqlite::Connection,
  /// Zone used to derive quarter and financial year from event dates.
  time_zone: Tz,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn, time_zone: Tz::UTC };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, for tests.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn, time_zone: Tz::UTC };
    store.init_schema().await?;
    Ok(store)
  }

  /// Derive fiscal labels in `tz` instead of UTC.
  pub fn with_time_zone(mut self, tz: Tz) -> Self {
    self.time_zone = tz;
    self
  }

  #[cfg(test)]
  pub(crate) fn conn_for_tests(&self) -> &tokio_rusqlite::Connection {
    &self.conn
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}

// ─── Connection-thread helpers ───────────────────────────────────────────────

/// Load one record with its child rows, or `None`.
fn load_one(
  conn: &rusqlite::Connection,
  id: &str,
) -> rusqlite::Result<Option<RawRecord>> {
  let raw = conn
    .query_row(
      &format!("SELECT {RECORD_COLUMNS} FROM records WHERE record_id = ?1"),
      [id],
      RawRecord::from_row,
    )
    .optional()?;
  match raw {
    Some(mut raw) => {
      raw.load_children(conn)?;
      Ok(Some(raw))
    }
    None => Ok(None),
  }
}

fn exists(conn: &rusqlite::Connection, id: &str) -> rusqlite::Result<bool> {
  Ok(
    conn
      .query_row("SELECT 1 FROM records WHERE record_id = ?1", [id], |_| Ok(()))
      .optional()?
      .is_some(),
  )
}

/// `?, ?, ?` with `n` placeholders.
fn placeholders(n: usize) -> String { vec!["?"; n].join(", ") }

// ─── RecordStore impl ────────────────────────────────────────────────────────

impl RecordStore for SqliteStore {
  type Error = Error;

  // ── Intake ────────────────────────────────────────────────────────────────

  async fn create_record(&self, input: NewRecord) -> Result<Record> {
    if !lifecycle::entry_statuses(input.kind).contains(&input.status) {
      return Err(
        muster_core::Error::InvalidEntryStatus {
          kind:   input.kind,
          status: input.status,
        }
        .into(),
      );
    }
    if input.details.kind() != input.kind {
      return Err(muster_core::Error::DetailsMismatch(input.kind).into());
    }

    let id = Uuid::new_v4();
    let (quarter, financial_year) =
      derive_labels(input.event_date, self.time_zone);

    let id_str       = encode_uuid(id);
    let kind_str     = input.kind.as_ref().to_owned();
    let status_str   = input.status.as_ref().to_owned();
    let event_str    = input.event_date.map(encode_dt);
    let priority_str = input.priority.as_ref().to_owned();
    let proposed_str = encode_dt(Utc::now());
    let details_str  = encode_details(&input.details)?;
    let topic        = input.topic;
    let description  = input.description;
    let role         = input.proposed_by_role;
    let name         = input.proposed_by_name;

    let raw = self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO records (
             record_id, kind, topic, description, status, event_date,
             priority, proposed_by_role, proposed_by_name, proposed_at,
             quarter, financial_year, details_json
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
          rusqlite::params![
            id_str,
            kind_str,
            topic,
            description,
            status_str,
            event_str,
            priority_str,
            role,
            name,
            proposed_str,
            quarter,
            financial_year,
            details_str,
          ],
        )?;
        Ok(load_one(conn, &id_str)?)
      })
      .await?;

    raw.ok_or(Error::RecordNotFound(id))?.into_record()
  }

  async fn get_record(&self, id: Uuid) -> Result<Option<Record>> {
    let id_str = encode_uuid(id);
    let raw = self
      .conn
      .call(move |conn| Ok(load_one(conn, &id_str)?))
      .await?;
    raw.map(RawRecord::into_record).transpose()
  }

  async fn query(&self, query: &RecordQuery) -> Result<Vec<Record>> {
    let statuses: Vec<String> = query
      .statuses
      .iter()
      .map(|s| s.as_ref().to_owned())
      .collect();
    if statuses.is_empty() {
      return Ok(Vec::new());
    }

    let mut conds = vec![
      "r.kind = ?".to_owned(),
      format!("r.status IN ({})", placeholders(statuses.len())),
    ];
    let mut params = vec![query.kind.as_ref().to_owned()];
    params.extend(statuses);

    if let Some(window) = query.date_range {
      conds.push("r.event_date >= ? AND r.event_date < ?".to_owned());
      params.push(encode_dt(window.start));
      params.push(encode_dt(window.end));
    }
    if let Some(flag) = &query.unsent_flag {
      conds.push(
        "NOT EXISTS (SELECT 1 FROM reminder_flags f
                     WHERE f.record_id = r.record_id AND f.flag = ?)"
          .to_owned(),
      );
      params.push(flag.clone());
    }

    let sql = format!(
      "SELECT {RECORD_COLUMNS} FROM records r
       WHERE {}
       ORDER BY r.proposed_at, r.rowid",
      conds.join(" AND ")
    );

    let raws: Vec<RawRecord> = self
      .conn
      .call(move |conn| {
        let mut rows = conn
          .prepare(&sql)?
          .query_map(rusqlite::params_from_iter(params.iter()), RawRecord::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        for raw in &mut rows {
          raw.load_children(conn)?;
        }
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawRecord::into_record).collect()
  }

  // ── Manual workflow inputs ────────────────────────────────────────────────

  async fn transition(
    &self,
    id: Uuid,
    to: Status,
    at: DateTime<Utc>,
  ) -> Result<Record> {
    let id_str = encode_uuid(id);
    let archived_at = (to == Status::Archived).then(|| encode_dt(at));

    // The closure returns the domain outcome as its value so that lifecycle
    // errors do not have to travel through `tokio_rusqlite::Error`.
    let outcome: Result<Option<RawRecord>> = self
      .conn
      .call(move |conn| {
        let Some(raw) = load_one(conn, &id_str)? else {
          return Ok(Err(Error::RecordNotFound(id)));
        };
        let current = match raw.into_record() {
          Ok(r) => r,
          Err(e) => return Ok(Err(e)),
        };
        if let Err(e) = lifecycle::check_record_transition(&current, to) {
          return Ok(Err(e.into()));
        }

        let changed = conn.execute(
          "UPDATE records SET status = ?1, archived_at = COALESCE(?4, archived_at)
           WHERE record_id = ?2 AND status = ?3",
          rusqlite::params![to.as_ref(), id_str, current.status.as_ref(), archived_at],
        )?;
        if changed == 0 {
          return Ok(Err(Error::StatusConflict { id, expected: current.status }));
        }
        Ok(Ok(load_one(conn, &id_str)?))
      })
      .await?;

    let record = outcome?.ok_or(Error::RecordNotFound(id))?.into_record()?;
    tracing::info!(record_id = %id, kind = %record.kind, status = %to, "record transitioned");
    Ok(record)
  }

  async fn set_event_date(
    &self,
    id: Uuid,
    event_date: Option<DateTime<Utc>>,
  ) -> Result<Record> {
    let (quarter, financial_year) = derive_labels(event_date, self.time_zone);
    let id_str    = encode_uuid(id);
    let event_str = event_date.map(encode_dt);

    let outcome: Result<Option<RawRecord>> = self
      .conn
      .call(move |conn| {
        // A scheduled record must keep its date.
        let changed = conn.execute(
          "UPDATE records
           SET event_date = ?1, quarter = ?2, financial_year = ?3
           WHERE record_id = ?4 AND (?1 IS NOT NULL OR status != 'scheduled')",
          rusqlite::params![event_str, quarter, financial_year, id_str],
        )?;
        if changed == 0 {
          return Ok(Err(if exists(conn, &id_str)? {
            muster_core::Error::MissingEventDate(id).into()
          } else {
            Error::RecordNotFound(id)
          }));
        }
        Ok(Ok(load_one(conn, &id_str)?))
      })
      .await?;

    outcome?.ok_or(Error::RecordNotFound(id))?.into_record()
  }

  async fn add_feedback(&self, id: Uuid, feedback: Feedback) -> Result<()> {
    feedback.check()?;
    let id_str       = encode_uuid(id);
    let submitted_at = feedback.submitted_at.map(encode_dt);

    let found = self
      .conn
      .call(move |conn| {
        if !exists(conn, &id_str)? {
          return Ok(false);
        }
        conn.execute(
          "INSERT INTO feedback (
             record_id, participant, attended, overall_rating,
             content_quality, comments, submitted_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
          rusqlite::params![
            id_str,
            feedback.participant,
            feedback.attended,
            feedback.overall_rating,
            feedback.content_quality,
            feedback.comments,
            submitted_at,
          ],
        )?;
        Ok(true)
      })
      .await?;

    if found { Ok(()) } else { Err(Error::RecordNotFound(id)) }
  }

  // ── Engine writes ─────────────────────────────────────────────────────────

  async fn mark_flag(
    &self,
    id: Uuid,
    flag: &str,
    at: DateTime<Utc>,
  ) -> Result<bool> {
    let id_str = encode_uuid(id);
    let flag   = flag.to_owned();
    let at_str = encode_dt(at);

    let changed: Option<usize> = self
      .conn
      .call(move |conn| {
        if !exists(conn, &id_str)? {
          return Ok(None);
        }
        Ok(Some(conn.execute(
          "INSERT OR IGNORE INTO reminder_flags (record_id, flag, sent_at)
           VALUES (?1, ?2, ?3)",
          rusqlite::params![id_str, flag, at_str],
        )?))
      })
      .await?;

    match changed {
      Some(n) => Ok(n == 1),
      None => Err(Error::RecordNotFound(id)),
    }
  }

  async fn add_discrepancies(
    &self,
    id: Uuid,
    discrepancies: Vec<Discrepancy>,
  ) -> Result<usize> {
    let id_str = encode_uuid(id);

    let added: Option<usize> = self
      .conn
      .call(move |conn| {
        if !exists(conn, &id_str)? {
          return Ok(None);
        }
        let tx = conn.transaction()?;
        let mut added = 0;
        {
          let mut stmt = tx.prepare(
            "INSERT OR IGNORE INTO discrepancies
               (record_id, participant, reason, created_at)
             VALUES (?1, ?2, ?3, ?4)",
          )?;
          for d in &discrepancies {
            added += stmt.execute(rusqlite::params![
              id_str,
              d.participant,
              d.reason,
              encode_dt(d.created_at),
            ])?;
          }
        }
        tx.commit()?;
        Ok(Some(added))
      })
      .await?;

    added.ok_or(Error::RecordNotFound(id))
  }

  async fn complete_due(&self, kind: Kind, cutoff: DateTime<Utc>) -> Result<u64> {
    let kind_str   = kind.as_ref().to_owned();
    let cutoff_str = encode_dt(cutoff);

    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE records SET status = 'completed'
           WHERE kind = ?1
             AND status = 'scheduled'
             AND event_date IS NOT NULL
             AND event_date <= ?2",
          rusqlite::params![kind_str, cutoff_str],
        )?)
      })
      .await?;

    Ok(changed as u64)
  }

  async fn archive_stale(
    &self,
    kind: Kind,
    statuses: &[Status],
    cutoff: DateTime<Utc>,
    now: DateTime<Utc>,
  ) -> Result<u64> {
    let statuses: Vec<String> = statuses
      .iter()
      .filter(|s| !s.is_terminal())
      .map(|s| s.as_ref().to_owned())
      .collect();
    if statuses.is_empty() {
      return Ok(0);
    }

    let sql = format!(
      "UPDATE records SET status = 'archived', archived_at = ?
       WHERE kind = ?
         AND status IN ({})
         AND event_date IS NOT NULL
         AND event_date <= ?",
      placeholders(statuses.len())
    );
    let mut params = vec![encode_dt(now), kind.as_ref().to_owned()];
    params.extend(statuses);
    params.push(encode_dt(cutoff));

    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(&sql, rusqlite::params_from_iter(params.iter()))?)
      })
      .await?;

    Ok(changed as u64)
  }
}
