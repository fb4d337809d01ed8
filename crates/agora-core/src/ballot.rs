//! Ballots, candidates and the audit trail of ballot mutations.
//!
//! There is exactly one ballot record per (subject, voter). Re-voting
//! overwrites the record in place and withdrawal only sets a flag; every
//! mutation additionally appends a [`BallotEvent`] so the full history
//! survives.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  Error, Result,
  subject::{Subject, SubjectKind},
};

// ─── Choice ──────────────────────────────────────────────────────────────────

/// A voter's response to a change request.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  strum::Display,
  strum::EnumString,
  strum::IntoStaticStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum VoteOption {
  Accept,
  Reject,
  Abstain,
}

/// What a ballot selects.
///
/// Serialised externally tagged: `{"option":"accept"}` or
/// `{"candidates":["…uuid…"]}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Choice {
  /// Change requests.
  Option(VoteOption),
  /// Elections: the selected candidate set.
  Candidates(Vec<Uuid>),
}

impl Choice {
  /// Whether this choice counts toward a decision. Abstentions do not.
  pub fn is_decisive(&self) -> bool {
    match self {
      Self::Option(option) => *option != VoteOption::Abstain,
      Self::Candidates(ids) => !ids.is_empty(),
    }
  }

  /// Check the choice against the subject it is cast on and return its
  /// canonical form (candidate ids sorted).
  ///
  /// `candidates` must be the full candidate list of `subject`.
  pub fn validated(self, subject: &Subject, candidates: &[Candidate]) -> Result<Self> {
    match (subject.kind, self) {
      (SubjectKind::ChangeRequest, choice @ Self::Option(_)) => Ok(choice),
      (SubjectKind::ChangeRequest, Self::Candidates(_)) => Err(Error::InvalidChoice(
        "change requests take accept, reject or abstain".into(),
      )),
      (SubjectKind::Election, Self::Option(_)) => Err(Error::InvalidChoice(
        "elections take a candidate selection".into(),
      )),
      (SubjectKind::Election, Self::Candidates(mut ids)) => {
        if ids.is_empty() {
          return Err(Error::InvalidChoice("no candidate selected".into()));
        }

        let known: HashSet<Uuid> =
          candidates.iter().map(|c| c.candidate_id).collect();
        let mut seen = HashSet::with_capacity(ids.len());
        for id in &ids {
          if !known.contains(id) {
            return Err(Error::InvalidChoice(format!(
              "candidate {id} does not stand in this election"
            )));
          }
          if !seen.insert(*id) {
            return Err(Error::InvalidChoice(format!(
              "candidate {id} selected more than once"
            )));
          }
        }

        let rules = &subject.rules;
        if !rules.allows_multiple && ids.len() > 1 {
          return Err(Error::InvalidChoice(
            "this election allows a single selection".into(),
          ));
        }
        if let Some(max) = rules.max_selections
          && ids.len() > max as usize
        {
          return Err(Error::InvalidChoice(format!(
            "{} candidates selected, at most {max} allowed",
            ids.len()
          )));
        }

        ids.sort_unstable();
        Ok(Self::Candidates(ids))
      }
    }
  }
}

// ─── Ballot ──────────────────────────────────────────────────────────────────

/// One voter's current choice on a subject.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ballot {
  pub ballot_id:  Uuid,
  pub subject_id: Uuid,
  pub voter_id:   String,
  pub choice:     Choice,
  /// A withdrawn ballot is kept for audit but has no influence on the tally.
  pub withdrawn:  bool,
  /// 1 on first cast, incremented by every later mutation.
  pub revision:   u32,
  pub cast_at:    DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

impl Ballot {
  pub fn is_live(&self) -> bool { !self.withdrawn }
}

// ─── History ─────────────────────────────────────────────────────────────────

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
  strum::Display,
  strum::EnumString,
  strum::IntoStaticStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum BallotAction {
  /// First ballot of this voter on the subject.
  Cast,
  /// Re-vote, including re-casting after a withdrawal.
  Changed,
  Withdrawn,
}

/// An append-only record of a single ballot mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BallotEvent {
  pub event_id:    Uuid,
  pub ballot_id:   Uuid,
  pub subject_id:  Uuid,
  pub voter_id:    String,
  pub action:      BallotAction,
  /// The choice in effect after the mutation; `None` for withdrawals.
  pub choice:      Option<Choice>,
  pub revision:    u32,
  pub recorded_at: DateTime<Utc>,
}

// ─── Candidates ──────────────────────────────────────────────────────────────

/// A candidate standing in an election.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
  pub candidate_id:  Uuid,
  pub subject_id:    Uuid,
  pub name:          String,
  /// Stable ordering for display. Never consulted by decision logic.
  pub display_order: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewCandidate {
  pub name:          String,
  /// Defaults to one past the current highest order.
  pub display_order: Option<u32>,
}
