//! SQL schema for the Agora SQLite store.
//!
//! Executed once at connection startup via `PRAGMA user_version`. Future
//! migrations will be gated on that version number.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;
PRAGMA busy_timeout = 5000;

CREATE TABLE IF NOT EXISTS subjects (
    subject_id   TEXT PRIMARY KEY,
    kind         TEXT NOT NULL,   -- 'election' | 'change_request'
    title        TEXT NOT NULL,
    creator_id   TEXT NOT NULL,
    rules_json   TEXT NOT NULL,   -- JSON-encoded Rules
    status       TEXT NOT NULL,   -- SubjectStatus discriminant
    outcome_json TEXT,            -- JSON-encoded Outcome or NULL
    created_at   TEXT NOT NULL,   -- ISO 8601 UTC; server-assigned
    updated_at   TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS candidates (
    candidate_id  TEXT PRIMARY KEY,
    subject_id    TEXT NOT NULL REFERENCES subjects(subject_id),
    name          TEXT NOT NULL,
    display_order INTEGER NOT NULL
);

-- One record per (subject, voter); overwritten in place on re-vote.
-- Rows are never deleted: withdrawal only sets the flag.
CREATE TABLE IF NOT EXISTS ballots (
    ballot_id   TEXT PRIMARY KEY,
    subject_id  TEXT NOT NULL REFERENCES subjects(subject_id),
    voter_id    TEXT NOT NULL,
    choice_json TEXT NOT NULL,
    withdrawn   INTEGER NOT NULL DEFAULT 0,
    revision    INTEGER NOT NULL,
    cast_at     TEXT NOT NULL,
    updated_at  TEXT NOT NULL,
    UNIQUE (subject_id, voter_id)
);

-- Ballot history is strictly append-only.
-- No UPDATE or DELETE is ever issued against this table.
CREATE TABLE IF NOT EXISTS ballot_events (
    event_id    TEXT PRIMARY KEY,
    ballot_id   TEXT NOT NULL REFERENCES ballots(ballot_id),
    subject_id  TEXT NOT NULL REFERENCES subjects(subject_id),
    voter_id    TEXT NOT NULL,
    action      TEXT NOT NULL,   -- 'cast' | 'changed' | 'withdrawn'
    choice_json TEXT,            -- NULL for withdrawals
    revision    INTEGER NOT NULL,
    recorded_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS subjects_status_idx   ON subjects(status);
CREATE INDEX IF NOT EXISTS candidates_subject_idx ON candidates(subject_id);
CREATE INDEX IF NOT EXISTS ballots_subject_idx   ON ballots(subject_id);
CREATE INDEX IF NOT EXISTS ballot_events_voter_idx
    ON ballot_events(subject_id, voter_id);

PRAGMA user_version = 1;
";
