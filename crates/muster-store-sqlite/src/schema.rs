//! SQL schema for the Muster SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS records (
    record_id        TEXT PRIMARY KEY,
    kind             TEXT NOT NULL,   -- 'training' | 'outing'
    topic            TEXT NOT NULL,
    description      TEXT NOT NULL DEFAULT '',
    status           TEXT NOT NULL,
    event_date       TEXT,            -- fixed-width RFC 3339 UTC, sortable
    priority         TEXT NOT NULL DEFAULT 'P3',
    proposed_by_role TEXT NOT NULL,
    proposed_by_name TEXT NOT NULL,
    proposed_at      TEXT NOT NULL,
    quarter          TEXT,            -- derived from event_date
    financial_year   TEXT,            -- derived from event_date
    details_json     TEXT NOT NULL,   -- kind-tagged RecordDetails
    archived_at      TEXT
);

-- A row exists only once a flag has been set; absence means unset.
-- Rows are never updated or deleted, so flags only ever go false -> true.
CREATE TABLE IF NOT EXISTS reminder_flags (
    record_id TEXT NOT NULL REFERENCES records(record_id),
    flag      TEXT NOT NULL,
    sent_at   TEXT NOT NULL,
    PRIMARY KEY (record_id, flag)
);

CREATE TRIGGER IF NOT EXISTS reminder_flags_no_update
BEFORE UPDATE ON reminder_flags
BEGIN
    SELECT RAISE(ABORT, 'reminder flags are append-only');
END;

CREATE TRIGGER IF NOT EXISTS reminder_flags_no_delete
BEFORE DELETE ON reminder_flags
BEGIN
    SELECT RAISE(ABORT, 'reminder flags are append-only');
END;

CREATE TABLE IF NOT EXISTS feedback (
    feedback_id     INTEGER PRIMARY KEY AUTOINCREMENT,
    record_id       TEXT NOT NULL REFERENCES records(record_id),
    participant     TEXT NOT NULL,
    attended        INTEGER NOT NULL,
    overall_rating  INTEGER,
    content_quality INTEGER,
    comments        TEXT,
    submitted_at    TEXT             -- NULL: form not submitted
);

CREATE TABLE IF NOT EXISTS discrepancies (
    record_id   TEXT NOT NULL REFERENCES records(record_id),
    participant TEXT NOT NULL,
    reason      TEXT NOT NULL,
    created_at  TEXT NOT NULL,
    UNIQUE (record_id, participant)
);

CREATE INDEX IF NOT EXISTS records_due_idx      ON records(kind, status, event_date);
CREATE INDEX IF NOT EXISTS feedback_record_idx  ON feedback(record_id);

PRAGMA user_version = 1;
";
