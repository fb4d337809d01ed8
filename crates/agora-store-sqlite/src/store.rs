//! [`SqliteStore`]: the SQLite implementation of [`GovernanceStore`].

use std::path::Path;

use agora_core::{
  ballot::{Ballot, BallotAction, BallotEvent, Candidate, Choice, NewCandidate},
  store::{GovernanceStore, SubjectQuery},
  subject::{NewSubject, Subject, SubjectStatus},
};
use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension as _, TransactionBehavior, types::Value};
use uuid::Uuid;

use crate::{
  Error, Result,
  encode::{
    BALLOT_COLUMNS, RawBallot, RawBallotEvent, RawCandidate, RawSubject,
    SUBJECT_COLUMNS, encode_choice, encode_dt, encode_outcome, encode_rules,
    encode_uuid,
  },
  schema::SCHEMA,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A governance store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, for tests.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
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

fn select_ballot(
  conn: &rusqlite::Connection,
  subject_id: &str,
  voter_id: &str,
) -> rusqlite::Result<Option<RawBallot>> {
  conn
    .query_row(
      &format!(
        "SELECT {BALLOT_COLUMNS} FROM ballots WHERE subject_id = ?1 AND voter_id = ?2"
      ),
      rusqlite::params![subject_id, voter_id],
      RawBallot::from_row,
    )
    .optional()
}

// ─── GovernanceStore impl ────────────────────────────────────────────────────

impl GovernanceStore for SqliteStore {
  type Error = Error;

  // ── Subjects ──────────────────────────────────────────────────────────────

  async fn create_subject(&self, input: NewSubject, now: DateTime<Utc>) -> Result<Subject> {
    let subject = Subject {
      subject_id: Uuid::new_v4(),
      kind:       input.kind,
      title:      input.title,
      creator_id: input.creator_id,
      rules:      input.rules,
      status:     SubjectStatus::Pending,
      outcome:    None,
      created_at: now,
      updated_at: now,
    };

    let id_str     = encode_uuid(subject.subject_id);
    let kind_str   = <&'static str>::from(subject.kind);
    let title      = subject.title.clone();
    let creator    = subject.creator_id.clone();
    let rules_str  = encode_rules(&subject.rules)?;
    let status_str = <&'static str>::from(subject.status);
    let at_str     = encode_dt(now);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO subjects (
             subject_id, kind, title, creator_id, rules_json,
             status, outcome_json, created_at, updated_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, NULL, ?7, ?7)",
          rusqlite::params![id_str, kind_str, title, creator, rules_str, status_str, at_str],
        )?;
        Ok(())
      })
      .await?;

    Ok(subject)
  }

  async fn get_subject(&self, id: Uuid) -> Result<Option<Subject>> {
    let id_str = encode_uuid(id);

    let raw: Option<RawSubject> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!("SELECT {SUBJECT_COLUMNS} FROM subjects WHERE subject_id = ?1"),
              rusqlite::params![id_str],
              RawSubject::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawSubject::into_subject).transpose()
  }

  async fn list_subjects(&self, query: &SubjectQuery) -> Result<Vec<Subject>> {
    // Build WHERE clause and positional parameters together.
    let mut conds: Vec<String> = vec![];
    let mut values: Vec<Value> = vec![];

    if !query.statuses.is_empty() {
      let placeholders: Vec<String> = query
        .statuses
        .iter()
        .map(|status| {
          values.push(Value::Text(status.to_string()));
          format!("?{}", values.len())
        })
        .collect();
      conds.push(format!("status IN ({})", placeholders.join(", ")));
    }
    if let Some(kind) = query.kind {
      values.push(Value::Text(kind.to_string()));
      conds.push(format!("kind = ?{}", values.len()));
    }

    let where_clause = if conds.is_empty() {
      String::new()
    } else {
      format!("WHERE {}", conds.join(" AND "))
    };

    values.push(Value::Integer(query.limit.map_or(-1, |l| l as i64)));
    let limit_idx = values.len();
    values.push(Value::Integer(query.offset.unwrap_or(0) as i64));
    let offset_idx = values.len();

    let sql = format!(
      "SELECT {SUBJECT_COLUMNS} FROM subjects
       {where_clause}
       ORDER BY created_at, subject_id
       LIMIT ?{limit_idx} OFFSET ?{offset_idx}"
    );

    let raws: Vec<RawSubject> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(rusqlite::params_from_iter(values), RawSubject::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawSubject::into_subject).collect()
  }

  async fn save_subject(&self, subject: &Subject, at: DateTime<Utc>) -> Result<Subject> {
    let mut saved = subject.clone();
    saved.updated_at = at;

    let id_str      = encode_uuid(saved.subject_id);
    let rules_str   = encode_rules(&saved.rules)?;
    let status_str  = <&'static str>::from(saved.status);
    let outcome_str = encode_outcome(saved.outcome.as_ref())?;
    let at_str      = encode_dt(saved.updated_at);

    let updated = self
      .conn
      .call(move |conn| {
        let n = conn.execute(
          "UPDATE subjects
           SET rules_json = ?2, status = ?3, outcome_json = ?4, updated_at = ?5
           WHERE subject_id = ?1",
          rusqlite::params![id_str, rules_str, status_str, outcome_str, at_str],
        )?;
        Ok(n)
      })
      .await?;

    if updated == 0 {
      return Err(Error::SubjectNotFound(saved.subject_id));
    }
    Ok(saved)
  }

  // ── Candidates ────────────────────────────────────────────────────────────

  async fn add_candidate(&self, subject_id: Uuid, input: NewCandidate) -> Result<Candidate> {
    let candidate_id = Uuid::new_v4();
    let id_str       = encode_uuid(candidate_id);
    let subject_str  = encode_uuid(subject_id);
    let name         = input.name.clone();

    let order: Option<u32> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let exists = tx
          .query_row(
            "SELECT 1 FROM subjects WHERE subject_id = ?1",
            rusqlite::params![subject_str],
            |_| Ok(()),
          )
          .optional()?
          .is_some();
        if !exists {
          return Ok(None);
        }

        let order: u32 = match input.display_order {
          Some(order) => order,
          None => tx.query_row(
            "SELECT COALESCE(MAX(display_order) + 1, 0) FROM candidates WHERE subject_id = ?1",
            rusqlite::params![subject_str],
            |r| r.get(0),
          )?,
        };

        tx.execute(
          "INSERT INTO candidates (candidate_id, subject_id, name, display_order)
           VALUES (?1, ?2, ?3, ?4)",
          rusqlite::params![id_str, subject_str, input.name, order],
        )?;
        tx.commit()?;
        Ok(Some(order))
      })
      .await?;

    let display_order = order.ok_or(Error::SubjectNotFound(subject_id))?;
    Ok(Candidate { candidate_id, subject_id, name, display_order })
  }

  async fn list_candidates(&self, subject_id: Uuid) -> Result<Vec<Candidate>> {
    let subject_str = encode_uuid(subject_id);

    let raws: Vec<RawCandidate> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT candidate_id, subject_id, name, display_order
           FROM candidates
           WHERE subject_id = ?1
           ORDER BY display_order, candidate_id",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![subject_str], RawCandidate::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawCandidate::into_candidate).collect()
  }

  // ── Ballots ───────────────────────────────────────────────────────────────

  async fn upsert_ballot(
    &self,
    subject_id: Uuid,
    voter_id:   String,
    choice:     Choice,
    at:         DateTime<Utc>,
  ) -> Result<Ballot> {
    let subject_str = encode_uuid(subject_id);
    let fresh_id    = encode_uuid(Uuid::new_v4());
    let event_id    = encode_uuid(Uuid::new_v4());
    let choice_str  = encode_choice(&choice)?;
    let at_str      = encode_dt(at);

    let raw: RawBallot = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let existing: Option<(String, u32, String)> = tx
          .query_row(
            "SELECT ballot_id, revision, cast_at FROM ballots
             WHERE subject_id = ?1 AND voter_id = ?2",
            rusqlite::params![subject_str, voter_id],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
          )
          .optional()?;

        let (ballot_id, revision, cast_at, action) = match existing {
          Some((id, revision, cast_at)) => (id, revision + 1, cast_at, BallotAction::Changed),
          None => (fresh_id, 1, at_str.clone(), BallotAction::Cast),
        };

        tx.execute(
          "INSERT INTO ballots (
             ballot_id, subject_id, voter_id, choice_json,
             withdrawn, revision, cast_at, updated_at
           ) VALUES (?1, ?2, ?3, ?4, 0, ?5, ?6, ?7)
           ON CONFLICT (subject_id, voter_id) DO UPDATE SET
             choice_json = excluded.choice_json,
             withdrawn   = 0,
             revision    = excluded.revision,
             updated_at  = excluded.updated_at",
          rusqlite::params![
            ballot_id, subject_str, voter_id, choice_str, revision, cast_at, at_str,
          ],
        )?;

        tx.execute(
          "INSERT INTO ballot_events (
             event_id, ballot_id, subject_id, voter_id,
             action, choice_json, revision, recorded_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
          rusqlite::params![
            event_id,
            ballot_id,
            subject_str,
            voter_id,
            <&'static str>::from(action),
            choice_str,
            revision,
            at_str,
          ],
        )?;

        let raw = select_ballot(&tx, &subject_str, &voter_id)?
          .ok_or(rusqlite::Error::QueryReturnedNoRows)?;
        tx.commit()?;
        Ok(raw)
      })
      .await?;

    raw.into_ballot()
  }

  async fn withdraw_ballot(
    &self,
    subject_id: Uuid,
    voter_id:   String,
    at:         DateTime<Utc>,
  ) -> Result<Option<Ballot>> {
    let subject_str = encode_uuid(subject_id);
    let event_id    = encode_uuid(Uuid::new_v4());
    let at_str      = encode_dt(at);

    let raw: Option<RawBallot> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let live: Option<(String, u32)> = tx
          .query_row(
            "SELECT ballot_id, revision FROM ballots
             WHERE subject_id = ?1 AND voter_id = ?2 AND withdrawn = 0",
            rusqlite::params![subject_str, voter_id],
            |r| Ok((r.get(0)?, r.get(1)?)),
          )
          .optional()?;
        let Some((ballot_id, revision)) = live else {
          return Ok(None);
        };
        let revision = revision + 1;

        tx.execute(
          "UPDATE ballots SET withdrawn = 1, revision = ?2, updated_at = ?3
           WHERE ballot_id = ?1",
          rusqlite::params![ballot_id, revision, at_str],
        )?;
        tx.execute(
          "INSERT INTO ballot_events (
             event_id, ballot_id, subject_id, voter_id,
             action, choice_json, revision, recorded_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, NULL, ?6, ?7)",
          rusqlite::params![
            event_id,
            ballot_id,
            subject_str,
            voter_id,
            <&'static str>::from(BallotAction::Withdrawn),
            revision,
            at_str,
          ],
        )?;

        let raw = select_ballot(&tx, &subject_str, &voter_id)?;
        tx.commit()?;
        Ok(raw)
      })
      .await?;

    raw.map(RawBallot::into_ballot).transpose()
  }

  async fn get_ballot(&self, subject_id: Uuid, voter_id: String) -> Result<Option<Ballot>> {
    let subject_str = encode_uuid(subject_id);

    let raw: Option<RawBallot> = self
      .conn
      .call(move |conn| Ok(select_ballot(conn, &subject_str, &voter_id)?))
      .await?;

    raw.map(RawBallot::into_ballot).transpose()
  }

  async fn list_ballots(&self, subject_id: Uuid) -> Result<Vec<Ballot>> {
    let subject_str = encode_uuid(subject_id);

    let raws: Vec<RawBallot> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {BALLOT_COLUMNS} FROM ballots
           WHERE subject_id = ?1
           ORDER BY cast_at, voter_id"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![subject_str], RawBallot::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawBallot::into_ballot).collect()
  }

  async fn ballot_history(&self, subject_id: Uuid, voter_id: String) -> Result<Vec<BallotEvent>> {
    let subject_str = encode_uuid(subject_id);

    let raws: Vec<RawBallotEvent> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT event_id, ballot_id, subject_id, voter_id,
                  action, choice_json, revision, recorded_at
           FROM ballot_events
           WHERE subject_id = ?1 AND voter_id = ?2
           ORDER BY revision",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![subject_str, voter_id], RawBallotEvent::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawBallotEvent::into_event).collect()
  }
}
