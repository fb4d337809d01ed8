//! The decision resolver and the operations built around it.
//!
//! Every mutation of a subject runs under that subject's lock:
//!
//! ```text
//! lock → re-read subject → write → re-tally → evaluate → maybe transition
//! ```
//!
//! Read-only operations skip the lock and see the last committed state.

use std::{future::Future, sync::Arc, time::Duration};

use agora_core::{
  ballot::{Ballot, BallotEvent, Candidate, Choice, NewCandidate},
  event::{EventPublisher, SubjectEvent},
  gate::PermissionGate,
  outcome::{Outcome, ResolutionTrigger},
  policy::{ElectionVerdict, Phase, Verdict, evaluate, evaluate_election},
  store::{GovernanceStore, SubjectQuery},
  subject::{NewSubject, RulesUpdate, Subject, SubjectKind, SubjectStatus},
  tally::{Tally, TallyCounts},
};
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
  EngineError, Result,
  clock::{Clock, SystemClock},
  events::LogPublisher,
  locks::SubjectLocks,
  retry::RetryPolicy,
  scheduler::WindowScheduler,
};

// ─── Results ─────────────────────────────────────────────────────────────────

/// What a voter gets back after casting or changing a ballot.
#[derive(Debug, Clone, Serialize)]
pub struct BallotReceipt {
  pub ballot: Ballot,
  /// Subject status after re-resolution.
  pub status: SubjectStatus,
  pub tally:  Tally,
}

#[derive(Debug, Clone, Serialize)]
pub struct Withdrawal {
  /// `None` when there was no live ballot to withdraw.
  pub ballot: Option<Ballot>,
  pub status: SubjectStatus,
  pub tally:  Tally,
}

/// A subject's status, live tally and, once resolved, its outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TallyView {
  pub subject_id: Uuid,
  pub status:     SubjectStatus,
  pub tally:      Tally,
  pub outcome:    Option<Outcome>,
}

impl TallyView {
  fn of(subject: &Subject, tally: Tally) -> Self {
    Self {
      subject_id: subject.subject_id,
      status: subject.status,
      tally,
      outcome: subject.outcome.clone(),
    }
  }
}

// ─── Administrative close ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
  Accept,
  Reject,
}

/// Parameters of a forced close. With neither field set the closed-phase
/// policy decides.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CloseRequest {
  /// Change requests: impose the result. Elections: only `reject` applies.
  pub decision: Option<Decision>,
  /// Elections: the winning candidate, e.g. to break a tie.
  pub winner:   Option<Uuid>,
}

// ─── Resolution ──────────────────────────────────────────────────────────────

#[derive(Debug, PartialEq, Eq)]
struct Resolution {
  status: SubjectStatus,
  winner: Option<Uuid>,
  tied:   Vec<Uuid>,
}

impl Resolution {
  fn to(status: SubjectStatus) -> Self { Self { status, winner: None, tied: vec![] } }

  fn winner(candidate_id: Uuid) -> Self {
    Self { status: SubjectStatus::Accepted, winner: Some(candidate_id), tied: vec![] }
  }

  fn into_outcome(self, tally: Tally, trigger: ResolutionTrigger, at: DateTime<Utc>) -> Outcome {
    Outcome {
      status: self.status,
      tally,
      trigger,
      resolved_at: at,
      winner: self.winner,
      tied_candidates: self.tied,
    }
  }
}

/// Apply the threshold policy to a tally. `None` means voting continues.
fn judge(subject: &Subject, tally: &Tally, phase: Phase) -> Option<Resolution> {
  let eligible = subject.rules.eligible_voters;
  match &tally.counts {
    TallyCounts::ChangeRequest(counts) => {
      match evaluate(subject.rules.majority, *counts, eligible, phase) {
        Verdict::Continue => None,
        Verdict::Accepted => Some(Resolution::to(SubjectStatus::Accepted)),
        Verdict::Rejected => Some(Resolution::to(SubjectStatus::Rejected)),
      }
    }
    TallyCounts::Election { candidates } => {
      match evaluate_election(candidates, tally.responded, eligible, phase) {
        ElectionVerdict::Continue => None,
        ElectionVerdict::Winner { candidate_id } => Some(Resolution::winner(candidate_id)),
        ElectionVerdict::Tied { candidates } => Some(Resolution {
          status: SubjectStatus::Tied,
          winner: None,
          tied:   candidates,
        }),
        ElectionVerdict::NoVotes => Some(Resolution::to(SubjectStatus::Rejected)),
      }
    }
  }
}

/// Decide an administrative close.
fn forced(subject: &Subject, tally: &Tally, request: &CloseRequest) -> Result<Resolution> {
  let invalid = |msg: String| -> Result<Resolution> { Err(EngineError::InvalidRequest(msg)) };

  match (subject.kind, request.decision, request.winner) {
    (_, Some(_), Some(_)) => invalid("give either a decision or a winner, not both".into()),
    (SubjectKind::ChangeRequest, _, Some(_)) => {
      invalid("change requests do not have a winner".into())
    }
    (SubjectKind::ChangeRequest, Some(Decision::Accept), None) => {
      Ok(Resolution::to(SubjectStatus::Accepted))
    }
    (_, Some(Decision::Reject), None) => Ok(Resolution::to(SubjectStatus::Rejected)),
    (SubjectKind::Election, Some(Decision::Accept), None) => {
      invalid("an election is accepted by naming its winner".into())
    }
    (SubjectKind::Election, None, Some(winner)) => {
      let stands = matches!(
        &tally.counts,
        TallyCounts::Election { candidates }
          if candidates.iter().any(|c| c.candidate_id == winner)
      );
      if !stands {
        return invalid(format!("candidate {winner} does not stand in this election"));
      }
      if subject.status == SubjectStatus::Tied {
        let tied = subject
          .outcome
          .as_ref()
          .map(|o| o.tied_candidates.as_slice())
          .unwrap_or_default();
        if !tied.contains(&winner) {
          return invalid(format!("candidate {winner} is not among the tied candidates"));
        }
      }
      Ok(Resolution::winner(winner))
    }
    (_, None, None) => match judge(subject, tally, Phase::Closed) {
      Some(r) if r.status == SubjectStatus::Tied && subject.status == SubjectStatus::Tied => {
        invalid("the tie must be broken by naming a winner".into())
      }
      Some(r) => Ok(r),
      None => invalid("no decision could be reached".into()),
    },
  }
}

fn ensure_accepting(subject: &Subject, now: DateTime<Utc>) -> Result<()> {
  if !subject.status.is_open() {
    return Err(EngineError::SubjectClosed {
      subject_id: subject.subject_id,
      status:     subject.status,
    });
  }
  if !subject.rules.window.contains(now) {
    return Err(EngineError::OutsideVotingWindow(subject.subject_id));
  }
  Ok(())
}

fn unauthorized(actor: &str, action: &'static str) -> EngineError {
  EngineError::Unauthorized { actor: actor.to_owned(), action }
}

// ─── Engine ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
pub struct EngineConfig {
  /// Longest wait for a subject lock before the attempt counts as a conflict.
  pub lock_timeout:  Duration,
  pub retry:         RetryPolicy,
  /// Delay before a failed forced close is attempted again.
  pub requeue_after: Duration,
}

impl Default for EngineConfig {
  fn default() -> Self {
    Self {
      lock_timeout:  Duration::from_secs(2),
      retry:         RetryPolicy::default(),
      requeue_after: Duration::from_secs(5),
    }
  }
}

/// The governance decision engine.
///
/// Generic over its store and permission gate; events and time come in as
/// trait objects so tests can swap them freely.
pub struct Engine<S, G> {
  pub(crate) store:         S,
  pub(crate) gate:          G,
  pub(crate) events:        Arc<dyn EventPublisher>,
  pub(crate) clock:         Arc<dyn Clock>,
  pub(crate) locks:         SubjectLocks,
  pub(crate) retry:         RetryPolicy,
  pub(crate) schedule:      WindowScheduler,
  pub(crate) requeue_after: TimeDelta,
}

impl<S: GovernanceStore, G: PermissionGate> Engine<S, G> {
  pub fn new(store: S, gate: G) -> Self {
    Self::with_config(store, gate, EngineConfig::default())
  }

  pub fn with_config(store: S, gate: G, config: EngineConfig) -> Self {
    Self {
      store,
      gate,
      events: Arc::new(LogPublisher),
      clock: Arc::new(SystemClock),
      locks: SubjectLocks::new(config.lock_timeout),
      retry: config.retry,
      schedule: WindowScheduler::default(),
      requeue_after: TimeDelta::from_std(config.requeue_after)
        .unwrap_or_else(|_| TimeDelta::seconds(5)),
    }
  }

  pub fn with_events(mut self, events: Arc<dyn EventPublisher>) -> Self {
    self.events = events;
    self
  }

  pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
    self.clock = clock;
    self
  }

  pub fn store(&self) -> &S { &self.store }

  pub fn schedule(&self) -> &WindowScheduler { &self.schedule }

  // ── Plumbing ──────────────────────────────────────────────────────────────

  /// Run a store call, retrying transient failures.
  pub(crate) async fn store_call<T, F, Fut>(&self, what: &'static str, mut call: F) -> Result<T>
  where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, S::Error>>,
  {
    self
      .retry
      .run(what, || {
        let fut = call();
        async move { fut.await.map_err(EngineError::from_store) }
      })
      .await
  }

  pub(crate) async fn lock(&self, subject_id: Uuid) -> Result<OwnedMutexGuard<()>> {
    self
      .retry
      .run("acquire_subject_lock", || self.locks.acquire(subject_id))
      .await
  }

  async fn load(&self, subject_id: Uuid) -> Result<Subject> {
    self
      .store_call("get_subject", || self.store.get_subject(subject_id))
      .await?
      .ok_or(EngineError::SubjectNotFound(subject_id))
  }

  async fn candidates_of(&self, subject: &Subject) -> Result<Vec<Candidate>> {
    match subject.kind {
      SubjectKind::Election => {
        self
          .store_call("list_candidates", || self.store.list_candidates(subject.subject_id))
          .await
      }
      SubjectKind::ChangeRequest => Ok(vec![]),
    }
  }

  async fn current_tally(&self, subject: &Subject) -> Result<Tally> {
    let candidates = self.candidates_of(subject).await?;
    let ballots = self
      .store_call("list_ballots", || self.store.list_ballots(subject.subject_id))
      .await?;
    Ok(Tally::compute(subject, &candidates, &ballots))
  }

  /// Persist a status change and publish it.
  async fn transition(
    &self,
    mut subject: Subject,
    status: SubjectStatus,
    outcome: Option<Outcome>,
  ) -> Result<Subject> {
    let previous = subject.status;
    subject.status = status;
    if outcome.is_some() {
      subject.outcome = outcome;
    }
    let now = self.clock.now();
    let saved = self
      .store_call("save_subject", || self.store.save_subject(&subject, now))
      .await?;

    if !saved.status.is_open() {
      self.schedule.unschedule(saved.subject_id);
    }
    info!(subject_id = %saved.subject_id, %previous, %status, "subject transitioned");
    self.events.publish(SubjectEvent {
      subject_id: saved.subject_id,
      kind: saved.kind,
      previous,
      status,
      outcome: saved.outcome.clone(),
      at: now,
    });
    Ok(saved)
  }

  /// Re-tally `subject` and apply the policy. Must be called under the
  /// subject lock. Subjects that are no longer open are left untouched.
  pub(crate) async fn resolve(
    &self,
    subject: Subject,
    phase: Phase,
    trigger: ResolutionTrigger,
  ) -> Result<(Subject, Tally)> {
    let tally = self.current_tally(&subject).await?;
    let subject = self.settle(subject, &tally, phase, trigger).await?;
    Ok((subject, tally))
  }

  /// Apply the policy to an already computed tally.
  async fn settle(
    &self,
    subject: Subject,
    tally: &Tally,
    phase: Phase,
    trigger: ResolutionTrigger,
  ) -> Result<Subject> {
    if !subject.status.is_open() {
      return Ok(subject);
    }

    let subject = match judge(&subject, tally, phase) {
      Some(resolution) => {
        let status = resolution.status;
        let outcome = resolution.into_outcome(tally.clone(), trigger, self.clock.now());
        self.transition(subject, status, Some(outcome)).await?
      }
      None if subject.status == SubjectStatus::Pending && tally.responded > 0 => {
        self.transition(subject, SubjectStatus::Active, None).await?
      }
      None => subject,
    };
    Ok(subject)
  }

  /// Settle after a ballot write. The ballot is already committed, so a
  /// failed transition is logged and left for the next ballot or the
  /// scheduler instead of being reported as a failed vote.
  async fn settle_after_ballot(&self, subject: Subject, tally: &Tally) -> SubjectStatus {
    let (subject_id, status) = (subject.subject_id, subject.status);
    match self
      .settle(subject, tally, Phase::Open, ResolutionTrigger::Ballot)
      .await
    {
      Ok(subject) => subject.status,
      Err(err) => {
        warn!(%subject_id, error = %err, "ballot recorded, resolution deferred");
        status
      }
    }
  }

  // ── Ballots ───────────────────────────────────────────────────────────────

  /// Cast or change `voter_id`'s ballot and re-resolve the subject.
  ///
  /// Once the ballot is written the call succeeds even if the resulting
  /// transition cannot be saved; the receipt then carries the prior status.
  /// A failure to read the tally back after the write is still returned as
  /// an error, but the ballot stays recorded.
  pub async fn submit_ballot(
    &self,
    subject_id: Uuid,
    voter_id: &str,
    choice: Choice,
  ) -> Result<BallotReceipt> {
    let subject = self.load(subject_id).await?;
    if !self.gate.can_vote(voter_id, subject_id).await {
      return Err(unauthorized(voter_id, "vote on this subject"));
    }
    let candidates = self.candidates_of(&subject).await?;
    let choice = choice.validated(&subject, &candidates)?;
    ensure_accepting(&subject, self.clock.now())?;

    let _guard = self.lock(subject_id).await?;
    // Rules and status may have changed while we waited for the lock.
    let subject = self.load(subject_id).await?;
    let now = self.clock.now();
    ensure_accepting(&subject, now)?;
    let candidates = self.candidates_of(&subject).await?;
    let choice = choice.validated(&subject, &candidates)?;

    let ballot = self
      .store_call("upsert_ballot", || {
        self
          .store
          .upsert_ballot(subject_id, voter_id.to_owned(), choice.clone(), now)
      })
      .await?;
    debug!(%subject_id, voter_id, revision = ballot.revision, "ballot recorded");

    let tally = self.current_tally(&subject).await?;
    let status = self.settle_after_ballot(subject, &tally).await;
    Ok(BallotReceipt { ballot, status, tally })
  }

  /// Withdraw `voter_id`'s ballot. A no-op when there is no live ballot.
  pub async fn withdraw_ballot(&self, subject_id: Uuid, voter_id: &str) -> Result<Withdrawal> {
    let subject = self.load(subject_id).await?;
    if !self.gate.can_vote(voter_id, subject_id).await {
      return Err(unauthorized(voter_id, "withdraw a ballot on this subject"));
    }
    ensure_accepting(&subject, self.clock.now())?;

    let _guard = self.lock(subject_id).await?;
    let subject = self.load(subject_id).await?;
    let now = self.clock.now();
    ensure_accepting(&subject, now)?;

    let ballot = self
      .store_call("withdraw_ballot", || {
        self.store.withdraw_ballot(subject_id, voter_id.to_owned(), now)
      })
      .await?;

    let tally = self.current_tally(&subject).await?;
    let status = match &ballot {
      Some(b) => {
        debug!(%subject_id, voter_id, revision = b.revision, "ballot withdrawn");
        self.settle_after_ballot(subject, &tally).await
      }
      None => subject.status,
    };
    Ok(Withdrawal { ballot, status, tally })
  }

  // ── Reads ─────────────────────────────────────────────────────────────────

  pub async fn get_subject(&self, subject_id: Uuid) -> Result<Subject> {
    self.load(subject_id).await
  }

  pub async fn list_subjects(&self, query: &SubjectQuery) -> Result<Vec<Subject>> {
    self
      .store_call("list_subjects", || self.store.list_subjects(query))
      .await
  }

  pub async fn list_candidates(&self, subject_id: Uuid) -> Result<Vec<Candidate>> {
    let subject = self.load(subject_id).await?;
    self.candidates_of(&subject).await
  }

  /// The current tally. Reads without the subject lock.
  pub async fn tally(&self, subject_id: Uuid) -> Result<TallyView> {
    let subject = self.load(subject_id).await?;
    let tally = self.current_tally(&subject).await?;
    Ok(TallyView::of(&subject, tally))
  }

  pub async fn ballot_history(&self, subject_id: Uuid, voter_id: &str) -> Result<Vec<BallotEvent>> {
    self.load(subject_id).await?;
    self
      .store_call("ballot_history", || {
        self.store.ballot_history(subject_id, voter_id.to_owned())
      })
      .await
  }

  // ── Administration ────────────────────────────────────────────────────────

  /// Create a subject on behalf of `input.creator_id`.
  pub async fn create_subject(&self, input: NewSubject) -> Result<Subject> {
    if !self.gate.can_administer(&input.creator_id, Uuid::nil()).await {
      return Err(unauthorized(&input.creator_id, "create subjects"));
    }
    let input = input.validated()?;
    let now = self.clock.now();
    let subject = self
      .store_call("create_subject", || self.store.create_subject(input.clone(), now))
      .await?;

    if let Some(closes_at) = subject.rules.window.closes_at {
      self.schedule.schedule(subject.subject_id, closes_at);
    }
    info!(
      subject_id = %subject.subject_id,
      kind = %subject.kind,
      majority = %subject.rules.majority,
      "subject created"
    );
    Ok(subject)
  }

  /// Add a candidate to an election that has not received ballots yet.
  pub async fn add_candidate(
    &self,
    actor_id: &str,
    subject_id: Uuid,
    input: NewCandidate,
  ) -> Result<Candidate> {
    let subject = self.load(subject_id).await?;
    let allowed = actor_id == subject.creator_id
      || self.gate.can_administer(actor_id, subject_id).await;
    if !allowed {
      return Err(unauthorized(actor_id, "add candidates to this subject"));
    }
    if subject.kind != SubjectKind::Election {
      return Err(EngineError::InvalidRequest(
        "only elections have candidates".into(),
      ));
    }
    if input.name.trim().is_empty() {
      return Err(EngineError::InvalidRequest(
        "candidate name must not be empty".into(),
      ));
    }

    let _guard = self.lock(subject_id).await?;
    let subject = self.load(subject_id).await?;
    self.ensure_unballoted(&subject).await?;

    let candidate = self
      .store_call("add_candidate", || self.store.add_candidate(subject_id, input.clone()))
      .await?;
    debug!(%subject_id, candidate_id = %candidate.candidate_id, "candidate added");
    Ok(candidate)
  }

  /// Change a subject's rules before voting has started.
  pub async fn update_rules(
    &self,
    actor_id: &str,
    subject_id: Uuid,
    update: RulesUpdate,
  ) -> Result<Subject> {
    self.load(subject_id).await?;
    if !self.gate.can_administer(actor_id, subject_id).await {
      return Err(unauthorized(actor_id, "change the rules of this subject"));
    }

    let _guard = self.lock(subject_id).await?;
    let mut subject = self.load(subject_id).await?;
    self.ensure_unballoted(&subject).await?;

    subject.rules = update.apply(subject.rules).validated(subject.kind)?;
    let now = self.clock.now();
    let saved = self
      .store_call("save_subject", || self.store.save_subject(&subject, now))
      .await?;

    match saved.rules.window.closes_at {
      Some(closes_at) => self.schedule.schedule(subject_id, closes_at),
      None => self.schedule.unschedule(subject_id),
    }
    info!(%subject_id, majority = %saved.rules.majority, "rules updated");
    Ok(saved)
  }

  /// Open, and no ballot has ever been cast.
  async fn ensure_unballoted(&self, subject: &Subject) -> Result<()> {
    if !subject.status.is_open() {
      return Err(EngineError::SubjectClosed {
        subject_id: subject.subject_id,
        status:     subject.status,
      });
    }
    let ballots = self
      .store_call("list_ballots", || self.store.list_ballots(subject.subject_id))
      .await?;
    if !ballots.is_empty() {
      return Err(EngineError::InvalidRequest(
        "subject is frozen once ballots have been cast".into(),
      ));
    }
    Ok(())
  }

  /// Force closure of a subject, optionally imposing the result.
  pub async fn close_subject(
    &self,
    actor_id: &str,
    subject_id: Uuid,
    request: CloseRequest,
  ) -> Result<TallyView> {
    self.load(subject_id).await?;
    if !self.gate.can_administer(actor_id, subject_id).await {
      return Err(unauthorized(actor_id, "close this subject"));
    }

    let _guard = self.lock(subject_id).await?;
    let subject = self.load(subject_id).await?;
    if subject.status.is_terminal() {
      return Err(EngineError::SubjectClosed { subject_id, status: subject.status });
    }

    let tally = self.current_tally(&subject).await?;
    let resolution = forced(&subject, &tally, &request)?;
    let status = resolution.status;
    let outcome = resolution.into_outcome(
      tally.clone(),
      ResolutionTrigger::Administrative,
      self.clock.now(),
    );
    let subject = self.transition(subject, status, Some(outcome)).await?;
    info!(%subject_id, actor_id, %status, "subject closed by administrator");
    Ok(TallyView::of(&subject, tally))
  }

  /// Withdraw a subject. The creator may do so while no decisive ballot
  /// exists; an administrator at any time before a terminal status.
  pub async fn withdraw_subject(&self, actor_id: &str, subject_id: Uuid) -> Result<Subject> {
    let subject = self.load(subject_id).await?;
    let is_admin = self.gate.can_administer(actor_id, subject_id).await;
    if !is_admin && actor_id != subject.creator_id {
      return Err(unauthorized(actor_id, "withdraw this subject"));
    }

    let _guard = self.lock(subject_id).await?;
    let subject = self.load(subject_id).await?;
    let closed = EngineError::SubjectClosed { subject_id, status: subject.status };
    if subject.status.is_terminal() || (!is_admin && !subject.status.is_open()) {
      return Err(closed);
    }

    let tally = self.current_tally(&subject).await?;
    if !is_admin {
      let decisive = match tally.decision() {
        Some(counts) => counts.decisive(),
        None => tally.responded,
      };
      if decisive > 0 {
        return Err(EngineError::InvalidRequest(
          "subject already has decisive ballots".into(),
        ));
      }
    }

    let outcome = Resolution::to(SubjectStatus::Withdrawn).into_outcome(
      tally,
      ResolutionTrigger::Administrative,
      self.clock.now(),
    );
    self
      .transition(subject, SubjectStatus::Withdrawn, Some(outcome))
      .await
  }

  /// Record that an accepted change request has been incorporated.
  pub async fn mark_applied(&self, actor_id: &str, subject_id: Uuid) -> Result<Subject> {
    self.load(subject_id).await?;
    if !self.gate.can_administer(actor_id, subject_id).await {
      return Err(unauthorized(actor_id, "apply this subject"));
    }

    let _guard = self.lock(subject_id).await?;
    let subject = self.load(subject_id).await?;
    match (subject.kind, subject.status) {
      (SubjectKind::ChangeRequest, SubjectStatus::Accepted) => {}
      (SubjectKind::Election, _) => {
        return Err(EngineError::InvalidRequest(
          "only change requests can be applied".into(),
        ));
      }
      (_, status @ (SubjectStatus::Applied | SubjectStatus::Rejected | SubjectStatus::Withdrawn)) => {
        return Err(EngineError::SubjectClosed { subject_id, status });
      }
      (_, status) => {
        return Err(EngineError::InvalidRequest(format!(
          "a {status} change request cannot be applied"
        )));
      }
    }
    self.transition(subject, SubjectStatus::Applied, None).await
  }
}
