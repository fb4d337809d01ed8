//! Integration tests for `SqliteStore` against an in-memory database.

use agora_core::{
  ballot::{BallotAction, Choice, NewCandidate, VoteOption},
  outcome::{Outcome, ResolutionTrigger},
  store::{GovernanceStore, SubjectQuery},
  subject::{MajorityType, NewSubject, Rules, SubjectKind, SubjectStatus},
  tally::Tally,
};
use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use uuid::Uuid;

use crate::{Error, SqliteStore};

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

fn motion() -> NewSubject {
  NewSubject::new(SubjectKind::ChangeRequest, "Adopt the new bylaws", "alice")
}

fn election() -> NewSubject {
  NewSubject::new(SubjectKind::Election, "Board seat", "alice").with_rules(Rules {
    allows_multiple: true,
    ..Rules::default()
  })
}

/// Minutes past a fixed instant; the store never reads the wall clock.
fn at(minutes: i64) -> DateTime<Utc> {
  Utc.with_ymd_and_hms(2030, 1, 1, 9, 0, 0).unwrap() + TimeDelta::minutes(minutes)
}

fn accept() -> Choice { Choice::Option(VoteOption::Accept) }

fn reject() -> Choice { Choice::Option(VoteOption::Reject) }

// ─── Subjects ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn create_and_get_subject() {
  let s = store().await;

  let subject = s.create_subject(motion(), at(0)).await.unwrap();
  assert_eq!(subject.status, SubjectStatus::Pending);
  assert!(subject.outcome.is_none());

  let fetched = s.get_subject(subject.subject_id).await.unwrap().unwrap();
  assert_eq!(fetched.subject_id, subject.subject_id);
  assert_eq!(fetched.kind, SubjectKind::ChangeRequest);
  assert_eq!(fetched.title, "Adopt the new bylaws");
  assert_eq!(fetched.creator_id, "alice");
  assert_eq!(fetched.rules, subject.rules);
}

#[tokio::test]
async fn get_subject_missing_returns_none() {
  let s = store().await;
  let result = s.get_subject(Uuid::new_v4()).await.unwrap();
  assert!(result.is_none());
}

#[tokio::test]
async fn save_subject_persists_status_rules_and_outcome() {
  let s = store().await;
  let mut subject = s.create_subject(motion(), at(0)).await.unwrap();

  subject.rules.majority = MajorityType::Supermajority(67);
  subject.status = SubjectStatus::Accepted;
  subject.outcome = Some(Outcome {
    status:          SubjectStatus::Accepted,
    tally:           Tally::compute(&subject, &[], &[]),
    trigger:         ResolutionTrigger::Administrative,
    resolved_at:     at(5),
    winner:          None,
    tied_candidates: vec![],
  });
  let saved = s.save_subject(&subject, at(5)).await.unwrap();
  assert_eq!(saved.updated_at, at(5));

  let fetched = s.get_subject(subject.subject_id).await.unwrap().unwrap();
  assert_eq!(fetched.status, SubjectStatus::Accepted);
  assert_eq!(fetched.rules.majority, MajorityType::Supermajority(67));
  let outcome = fetched.outcome.unwrap();
  assert_eq!(outcome.trigger, ResolutionTrigger::Administrative);
  assert_eq!(outcome.status, SubjectStatus::Accepted);
}

#[tokio::test]
async fn save_unknown_subject_is_not_found() {
  let s = store().await;
  let mut subject = s.create_subject(motion(), at(0)).await.unwrap();
  subject.subject_id = Uuid::new_v4();

  let err = s.save_subject(&subject, at(5)).await.unwrap_err();
  assert!(matches!(err, Error::SubjectNotFound(id) if id == subject.subject_id));
}

#[tokio::test]
async fn list_subjects_filters_by_status_and_kind() {
  let s = store().await;
  let a = s.create_subject(motion(), at(0)).await.unwrap();
  s.create_subject(motion(), at(0)).await.unwrap();
  s.create_subject(election(), at(0)).await.unwrap();

  let mut closed = a.clone();
  closed.status = SubjectStatus::Rejected;
  s.save_subject(&closed, at(5)).await.unwrap();

  let all = s.list_subjects(&SubjectQuery::default()).await.unwrap();
  assert_eq!(all.len(), 3);

  let open = s.list_subjects(&SubjectQuery::open()).await.unwrap();
  assert_eq!(open.len(), 2);
  assert!(open.iter().all(|x| x.subject_id != a.subject_id));

  let elections = s
    .list_subjects(&SubjectQuery {
      kind: Some(SubjectKind::Election),
      ..SubjectQuery::default()
    })
    .await
    .unwrap();
  assert_eq!(elections.len(), 1);
  assert_eq!(elections[0].kind, SubjectKind::Election);
}

#[tokio::test]
async fn list_subjects_paginates() {
  let s = store().await;
  for _ in 0..5 {
    s.create_subject(motion(), at(0)).await.unwrap();
  }

  let page = s
    .list_subjects(&SubjectQuery {
      limit: Some(2),
      offset: Some(3),
      ..SubjectQuery::default()
    })
    .await
    .unwrap();
  assert_eq!(page.len(), 2);
}

// ─── Candidates ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn candidates_get_sequential_display_order() {
  let s = store().await;
  let subject = s.create_subject(election(), at(0)).await.unwrap();

  for name in ["Ada", "Grace", "Edsger"] {
    s.add_candidate(subject.subject_id, NewCandidate { name: name.into(), display_order: None })
      .await
      .unwrap();
  }

  let candidates = s.list_candidates(subject.subject_id).await.unwrap();
  let names: Vec<&str> = candidates.iter().map(|c| c.name.as_str()).collect();
  assert_eq!(names, ["Ada", "Grace", "Edsger"]);
  let orders: Vec<u32> = candidates.iter().map(|c| c.display_order).collect();
  assert_eq!(orders, [0, 1, 2]);
}

#[tokio::test]
async fn explicit_display_order_is_respected() {
  let s = store().await;
  let subject = s.create_subject(election(), at(0)).await.unwrap();

  s.add_candidate(subject.subject_id, NewCandidate { name: "Last".into(), display_order: Some(9) })
    .await
    .unwrap();
  s.add_candidate(subject.subject_id, NewCandidate { name: "First".into(), display_order: Some(1) })
    .await
    .unwrap();

  let candidates = s.list_candidates(subject.subject_id).await.unwrap();
  assert_eq!(candidates[0].name, "First");
  assert_eq!(candidates[1].name, "Last");
}

#[tokio::test]
async fn candidate_for_missing_subject_is_not_found() {
  let s = store().await;
  let err = s
    .add_candidate(Uuid::new_v4(), NewCandidate { name: "Nobody".into(), display_order: None })
    .await
    .unwrap_err();
  assert!(matches!(err, Error::SubjectNotFound(_)));
}

// ─── Ballots ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn first_ballot_is_revision_one() {
  let s = store().await;
  let subject = s.create_subject(motion(), at(0)).await.unwrap();

  let ballot = s
    .upsert_ballot(subject.subject_id, "bob".into(), accept(), at(1))
    .await
    .unwrap();
  assert_eq!(ballot.voter_id, "bob");
  assert_eq!(ballot.choice, accept());
  assert_eq!(ballot.revision, 1);
  assert!(!ballot.withdrawn);
}

#[tokio::test]
async fn changing_a_ballot_keeps_one_row() {
  let s = store().await;
  let subject = s.create_subject(motion(), at(0)).await.unwrap();

  let first = s
    .upsert_ballot(subject.subject_id, "bob".into(), accept(), at(1))
    .await
    .unwrap();
  let second = s
    .upsert_ballot(subject.subject_id, "bob".into(), reject(), at(1))
    .await
    .unwrap();

  assert_eq!(second.ballot_id, first.ballot_id);
  assert_eq!(second.revision, 2);
  assert_eq!(second.cast_at, first.cast_at);
  assert_eq!(second.choice, reject());

  let ballots = s.list_ballots(subject.subject_id).await.unwrap();
  assert_eq!(ballots.len(), 1);
}

#[tokio::test]
async fn withdraw_marks_ballot_and_records_history() {
  let s = store().await;
  let subject = s.create_subject(motion(), at(0)).await.unwrap();

  s.upsert_ballot(subject.subject_id, "bob".into(), accept(), at(1))
    .await
    .unwrap();
  let withdrawn = s
    .withdraw_ballot(subject.subject_id, "bob".into(), at(2))
    .await
    .unwrap()
    .unwrap();
  assert!(withdrawn.withdrawn);
  assert_eq!(withdrawn.revision, 2);

  let fetched = s
    .get_ballot(subject.subject_id, "bob".into())
    .await
    .unwrap()
    .unwrap();
  assert!(!fetched.is_live());

  let history = s
    .ballot_history(subject.subject_id, "bob".into())
    .await
    .unwrap();
  let actions: Vec<BallotAction> = history.iter().map(|e| e.action).collect();
  assert_eq!(actions, [BallotAction::Cast, BallotAction::Withdrawn]);
  assert_eq!(history[0].choice, Some(accept()));
  assert!(history[1].choice.is_none());
}

#[tokio::test]
async fn withdraw_without_live_ballot_returns_none() {
  let s = store().await;
  let subject = s.create_subject(motion(), at(0)).await.unwrap();

  let none = s
    .withdraw_ballot(subject.subject_id, "bob".into(), at(2))
    .await
    .unwrap();
  assert!(none.is_none());

  s.upsert_ballot(subject.subject_id, "bob".into(), accept(), at(1))
    .await
    .unwrap();
  s.withdraw_ballot(subject.subject_id, "bob".into(), at(2))
    .await
    .unwrap();
  let again = s
    .withdraw_ballot(subject.subject_id, "bob".into(), at(2))
    .await
    .unwrap();
  assert!(again.is_none());

  let history = s
    .ballot_history(subject.subject_id, "bob".into())
    .await
    .unwrap();
  assert_eq!(history.len(), 2);
}

#[tokio::test]
async fn recasting_after_withdrawal_revives_the_ballot() {
  let s = store().await;
  let subject = s.create_subject(motion(), at(0)).await.unwrap();

  s.upsert_ballot(subject.subject_id, "bob".into(), accept(), at(1))
    .await
    .unwrap();
  s.withdraw_ballot(subject.subject_id, "bob".into(), at(2))
    .await
    .unwrap();
  let revived = s
    .upsert_ballot(subject.subject_id, "bob".into(), reject(), at(3))
    .await
    .unwrap();
  assert!(revived.is_live());
  assert_eq!(revived.revision, 3);

  let history = s
    .ballot_history(subject.subject_id, "bob".into())
    .await
    .unwrap();
  let revisions: Vec<u32> = history.iter().map(|e| e.revision).collect();
  assert_eq!(revisions, [1, 2, 3]);
  assert_eq!(history[2].action, BallotAction::Changed);
}

#[tokio::test]
async fn election_choices_round_trip() {
  let s = store().await;
  let subject = s.create_subject(election(), at(0)).await.unwrap();
  let a = s
    .add_candidate(subject.subject_id, NewCandidate { name: "Ada".into(), display_order: None })
    .await
    .unwrap();
  let b = s
    .add_candidate(subject.subject_id, NewCandidate { name: "Grace".into(), display_order: None })
    .await
    .unwrap();

  let choice = Choice::Candidates(vec![a.candidate_id, b.candidate_id]);
  s.upsert_ballot(subject.subject_id, "carol".into(), choice.clone(), at(1))
    .await
    .unwrap();

  let ballot = s
    .get_ballot(subject.subject_id, "carol".into())
    .await
    .unwrap()
    .unwrap();
  assert_eq!(ballot.choice, choice);
}

#[tokio::test]
async fn ballots_are_scoped_to_their_subject() {
  let s = store().await;
  let one = s.create_subject(motion(), at(0)).await.unwrap();
  let two = s.create_subject(motion(), at(0)).await.unwrap();

  s.upsert_ballot(one.subject_id, "bob".into(), accept(), at(1))
    .await
    .unwrap();
  s.upsert_ballot(two.subject_id, "bob".into(), reject(), at(1))
    .await
    .unwrap();

  assert_eq!(s.list_ballots(one.subject_id).await.unwrap().len(), 1);
  let on_two = s
    .get_ballot(two.subject_id, "bob".into())
    .await
    .unwrap()
    .unwrap();
  assert_eq!(on_two.choice, reject());
  assert_eq!(on_two.revision, 1);
}

#[tokio::test]
async fn timestamps_come_from_the_caller() {
  let s = store().await;
  let subject = s.create_subject(motion(), at(0)).await.unwrap();
  assert_eq!(subject.created_at, at(0));
  assert_eq!(subject.updated_at, at(0));

  s.upsert_ballot(subject.subject_id, "bob".into(), accept(), at(10))
    .await
    .unwrap();
  let changed = s
    .upsert_ballot(subject.subject_id, "bob".into(), reject(), at(20))
    .await
    .unwrap();
  assert_eq!(changed.cast_at, at(10));
  assert_eq!(changed.updated_at, at(20));

  let withdrawn = s
    .withdraw_ballot(subject.subject_id, "bob".into(), at(30))
    .await
    .unwrap()
    .unwrap();
  assert_eq!(withdrawn.updated_at, at(30));

  let history = s
    .ballot_history(subject.subject_id, "bob".into())
    .await
    .unwrap();
  let recorded: Vec<DateTime<Utc>> = history.iter().map(|e| e.recorded_at).collect();
  assert_eq!(recorded, [at(10), at(20), at(30)]);
}
