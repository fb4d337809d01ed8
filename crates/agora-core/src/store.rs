//! The `GovernanceStore` trait and supporting query types.
//!
//! The trait is implemented by storage backends (e.g. `agora-store-sqlite`).
//! The engine depends on this abstraction, not on any concrete backend.

use std::future::Future;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
  ballot::{Ballot, BallotEvent, Candidate, Choice, NewCandidate},
  subject::{NewSubject, Subject, SubjectKind, SubjectStatus},
};

// ─── Query type ──────────────────────────────────────────────────────────────

/// Parameters for [`GovernanceStore::list_subjects`].
#[derive(Debug, Clone, Default)]
pub struct SubjectQuery {
  /// Restrict to these statuses; empty means any status.
  pub statuses: Vec<SubjectStatus>,
  pub kind:     Option<SubjectKind>,
  pub limit:    Option<usize>,
  pub offset:   Option<usize>,
}

impl SubjectQuery {
  /// Subjects that still accept ballots.
  pub fn open() -> Self {
    Self {
      statuses: vec![SubjectStatus::Pending, SubjectStatus::Active],
      ..Self::default()
    }
  }
}

// ─── Failure classification ──────────────────────────────────────────────────

/// Lets the engine tell "try again" apart from "this will never work".
pub trait Transient {
  /// The failure is expected to clear on its own (lock contention, a busy
  /// database, a dropped connection).
  fn is_transient(&self) -> bool;
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over durable storage for subjects, candidates and ballots.
///
/// Each method is atomic on its own: a failed call leaves no partial write
/// behind. Serialising read-modify-write sequences on one subject is the
/// engine's job, not the store's.
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes (e.g. tokio with `axum`).
pub trait GovernanceStore: Send + Sync {
  type Error: std::error::Error + Transient + Send + Sync + 'static;

  // ── Subjects ──────────────────────────────────────────────────────────

  /// Persist a new subject in the `Pending` status. Identity is assigned by
  /// the store; `at` becomes both timestamps. The input is expected to be validated.
  fn create_subject(
    &self,
    input: NewSubject,
    at: DateTime<Utc>,
  ) -> impl Future<Output = Result<Subject, Self::Error>> + Send + '_;

  /// Retrieve a subject by UUID. Returns `None` if not found.
  fn get_subject(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Subject>, Self::Error>> + Send + '_;

  fn list_subjects<'a>(
    &'a self,
    query: &'a SubjectQuery,
  ) -> impl Future<Output = Result<Vec<Subject>, Self::Error>> + Send + 'a;

  /// Overwrite the mutable parts of a subject (rules, status, outcome).
  /// `updated_at` becomes `at`.
  fn save_subject<'a>(
    &'a self,
    subject: &'a Subject,
    at: DateTime<Utc>,
  ) -> impl Future<Output = Result<Subject, Self::Error>> + Send + 'a;

  // ── Candidates ────────────────────────────────────────────────────────

  fn add_candidate(
    &self,
    subject_id: Uuid,
    input: NewCandidate,
  ) -> impl Future<Output = Result<Candidate, Self::Error>> + Send + '_;

  /// All candidates of an election, ordered by display order.
  fn list_candidates(
    &self,
    subject_id: Uuid,
  ) -> impl Future<Output = Result<Vec<Candidate>, Self::Error>> + Send + '_;

  // ── Ballots ───────────────────────────────────────────────────────────

  /// Insert or overwrite the ballot for (subject, voter) and append the
  /// matching history event, in a single transaction. Clears `withdrawn`.
  fn upsert_ballot(
    &self,
    subject_id: Uuid,
    voter_id: String,
    choice: Choice,
    at: DateTime<Utc>,
  ) -> impl Future<Output = Result<Ballot, Self::Error>> + Send + '_;

  /// Mark the voter's ballot as withdrawn and append a history event.
  /// Returns `None` if the voter has no live ballot on the subject.
  fn withdraw_ballot(
    &self,
    subject_id: Uuid,
    voter_id: String,
    at: DateTime<Utc>,
  ) -> impl Future<Output = Result<Option<Ballot>, Self::Error>> + Send + '_;

  fn get_ballot(
    &self,
    subject_id: Uuid,
    voter_id: String,
  ) -> impl Future<Output = Result<Option<Ballot>, Self::Error>> + Send + '_;

  /// Every ballot record on the subject, withdrawn ones included.
  fn list_ballots(
    &self,
    subject_id: Uuid,
  ) -> impl Future<Output = Result<Vec<Ballot>, Self::Error>> + Send + '_;

  /// The mutation history of one voter's ballot, oldest first.
  fn ballot_history(
    &self,
    subject_id: Uuid,
    voter_id: String,
  ) -> impl Future<Output = Result<Vec<BallotEvent>, Self::Error>> + Send + '_;
}
