//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! All timestamps are stored as RFC 3339 strings. Structured fields (rules,
//! outcomes, choices) are stored as compact JSON. UUIDs are stored as
//! hyphenated lowercase strings. Enum discriminants use their snake_case
//! names.

use std::str::FromStr;

use agora_core::{
  ballot::{Ballot, BallotAction, BallotEvent, Candidate, Choice},
  outcome::Outcome,
  subject::{Rules, Subject, SubjectKind, SubjectStatus},
};
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ─────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── DateTime<Utc> ────────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── Discriminants ────────────────────────────────────────────────────────────

pub fn decode_discriminant<T: FromStr>(what: &'static str, s: &str) -> Result<T> {
  s.parse().map_err(|_| {
    Error::Core(agora_core::Error::UnknownDiscriminant {
      what,
      value: s.to_owned(),
    })
  })
}

// ─── JSON columns ─────────────────────────────────────────────────────────────

pub fn encode_rules(rules: &Rules) -> Result<String> { Ok(serde_json::to_string(rules)?) }

pub fn encode_outcome(outcome: Option<&Outcome>) -> Result<Option<String>> {
  outcome
    .map(serde_json::to_string)
    .transpose()
    .map_err(Error::from)
}

pub fn encode_choice(choice: &Choice) -> Result<String> {
  Ok(serde_json::to_string(choice)?)
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Raw strings read directly from a `subjects` row.
pub struct RawSubject {
  pub subject_id:   String,
  pub kind:         String,
  pub title:        String,
  pub creator_id:   String,
  pub rules_json:   String,
  pub status:       String,
  pub outcome_json: Option<String>,
  pub created_at:   String,
  pub updated_at:   String,
}

pub const SUBJECT_COLUMNS: &str = "subject_id, kind, title, creator_id, rules_json, \
                                   status, outcome_json, created_at, updated_at";

impl RawSubject {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      subject_id:   row.get(0)?,
      kind:         row.get(1)?,
      title:        row.get(2)?,
      creator_id:   row.get(3)?,
      rules_json:   row.get(4)?,
      status:       row.get(5)?,
      outcome_json: row.get(6)?,
      created_at:   row.get(7)?,
      updated_at:   row.get(8)?,
    })
  }

  pub fn into_subject(self) -> Result<Subject> {
    Ok(Subject {
      subject_id: decode_uuid(&self.subject_id)?,
      kind:       decode_discriminant::<SubjectKind>("subject kind", &self.kind)?,
      title:      self.title,
      creator_id: self.creator_id,
      rules:      serde_json::from_str(&self.rules_json)?,
      status:     decode_discriminant::<SubjectStatus>("subject status", &self.status)?,
      outcome:    self
        .outcome_json
        .as_deref()
        .map(serde_json::from_str)
        .transpose()?,
      created_at: decode_dt(&self.created_at)?,
      updated_at: decode_dt(&self.updated_at)?,
    })
  }
}

/// Raw strings read directly from a `candidates` row.
pub struct RawCandidate {
  pub candidate_id:  String,
  pub subject_id:    String,
  pub name:          String,
  pub display_order: u32,
}

impl RawCandidate {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      candidate_id:  row.get(0)?,
      subject_id:    row.get(1)?,
      name:          row.get(2)?,
      display_order: row.get(3)?,
    })
  }

  pub fn into_candidate(self) -> Result<Candidate> {
    Ok(Candidate {
      candidate_id:  decode_uuid(&self.candidate_id)?,
      subject_id:    decode_uuid(&self.subject_id)?,
      name:          self.name,
      display_order: self.display_order,
    })
  }
}

/// Raw strings read directly from a `ballots` row.
pub struct RawBallot {
  pub ballot_id:   String,
  pub subject_id:  String,
  pub voter_id:    String,
  pub choice_json: String,
  pub withdrawn:   bool,
  pub revision:    u32,
  pub cast_at:     String,
  pub updated_at:  String,
}

pub const BALLOT_COLUMNS: &str = "ballot_id, subject_id, voter_id, choice_json, \
                                  withdrawn, revision, cast_at, updated_at";

impl RawBallot {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      ballot_id:   row.get(0)?,
      subject_id:  row.get(1)?,
      voter_id:    row.get(2)?,
      choice_json: row.get(3)?,
      withdrawn:   row.get(4)?,
      revision:    row.get(5)?,
      cast_at:     row.get(6)?,
      updated_at:  row.get(7)?,
    })
  }

  pub fn into_ballot(self) -> Result<Ballot> {
    Ok(Ballot {
      ballot_id:  decode_uuid(&self.ballot_id)?,
      subject_id: decode_uuid(&self.subject_id)?,
      voter_id:   self.voter_id,
      choice:     serde_json::from_str(&self.choice_json)?,
      withdrawn:  self.withdrawn,
      revision:   self.revision,
      cast_at:    decode_dt(&self.cast_at)?,
      updated_at: decode_dt(&self.updated_at)?,
    })
  }
}

/// Raw strings read directly from a `ballot_events` row.
pub struct RawBallotEvent {
  pub event_id:    String,
  pub ballot_id:   String,
  pub subject_id:  String,
  pub voter_id:    String,
  pub action:      String,
  pub choice_json: Option<String>,
  pub revision:    u32,
  pub recorded_at: String,
}

impl RawBallotEvent {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      event_id:    row.get(0)?,
      ballot_id:   row.get(1)?,
      subject_id:  row.get(2)?,
      voter_id:    row.get(3)?,
      action:      row.get(4)?,
      choice_json: row.get(5)?,
      revision:    row.get(6)?,
      recorded_at: row.get(7)?,
    })
  }

  pub fn into_event(self) -> Result<BallotEvent> {
    Ok(BallotEvent {
      event_id:    decode_uuid(&self.event_id)?,
      ballot_id:   decode_uuid(&self.ballot_id)?,
      subject_id:  decode_uuid(&self.subject_id)?,
      voter_id:    self.voter_id,
      action:      decode_discriminant::<BallotAction>("ballot action", &self.action)?,
      choice:      self
        .choice_json
        .as_deref()
        .map(serde_json::from_str)
        .transpose()?,
      revision:    self.revision,
      recorded_at: decode_dt(&self.recorded_at)?,
    })
  }
}
