//! Threshold policy: pure functions from a tally to a verdict.
//!
//! The policy is evaluated in one of two phases:
//!
//! - [`Phase::Open`]: voting is still running. The policy only returns a
//!   terminal verdict when the outcome is already mathematically certain,
//!   i.e. no way the remaining eligible voters could respond would change
//!   it. Without an eligible-voter count, only the unanimity reject fast
//!   path can fire.
//! - [`Phase::Closed`]: the window has elapsed or an administrator forced
//!   closure. Insufficient support rejects.
//!
//! All arithmetic is done on integers.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  subject::MajorityType,
  tally::{CandidateCount, DecisionCounts},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
  Open,
  Closed,
}

/// The verdict for a change request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
  Continue,
  Accepted,
  Rejected,
}

/// The verdict for an election.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum ElectionVerdict {
  Continue,
  Winner { candidate_id: Uuid },
  /// Left for a manual tie-break. Ids are sorted.
  Tied { candidates: Vec<Uuid> },
  /// Closed without a single vote.
  NoVotes,
}

// ─── Change requests ─────────────────────────────────────────────────────────

/// Evaluate a change request's counts under `majority`.
///
/// `eligible` is the size of the electorate, if known. When it is known the
/// non-abstaining denominator is `eligible - abstain`; otherwise it is the
/// number of accepts plus rejects.
pub fn evaluate(
  majority: MajorityType,
  counts: DecisionCounts,
  eligible: Option<u32>,
  phase: Phase,
) -> Verdict {
  let accept = u64::from(counts.accept);
  let reject = u64::from(counts.reject);
  let abstain = u64::from(counts.abstain);
  let eligible = eligible.map(u64::from);

  // A single reject can never be outvoted under unanimity.
  if majority == MajorityType::Unanimity && reject > 0 {
    return Verdict::Rejected;
  }

  let decide = |accept: u64, reject: u64| {
    passes(majority, accept, reject, denominator(accept, reject, abstain, eligible))
  };

  match phase {
    Phase::Closed => {
      if decide(accept, reject) {
        Verdict::Accepted
      } else {
        Verdict::Rejected
      }
    }
    Phase::Open => {
      let Some(eligible) = eligible else {
        return Verdict::Continue;
      };
      let remaining = eligible.saturating_sub(accept + reject + abstain);

      if decide(accept, reject + remaining) {
        // Holds even if every remaining voter rejects.
        Verdict::Accepted
      } else if !decide(accept + remaining, reject) {
        // Fails even if every remaining voter accepts.
        Verdict::Rejected
      } else {
        Verdict::Continue
      }
    }
  }
}

fn denominator(accept: u64, reject: u64, abstain: u64, eligible: Option<u64>) -> u64 {
  let decisive = accept + reject;
  match eligible {
    Some(eligible) => eligible.saturating_sub(abstain).max(decisive),
    None => decisive,
  }
}

fn passes(majority: MajorityType, accept: u64, reject: u64, denominator: u64) -> bool {
  match majority {
    MajorityType::Simple => accept > reject,
    MajorityType::Absolute => 2 * accept > denominator,
    MajorityType::Supermajority(p) => {
      denominator > 0 && 100 * accept >= u64::from(p) * denominator
    }
    MajorityType::Unanimity => accept > 0 && reject == 0,
  }
}

// ─── Elections ───────────────────────────────────────────────────────────────

/// Evaluate an election.
///
/// The highest tally wins at close; a tie at the top is surfaced rather than
/// broken. While open, a leader wins early once its lead over the runner-up
/// exceeds the number of eligible voters who have not responded.
pub fn evaluate_election(
  candidates: &[CandidateCount],
  responded: u32,
  eligible: Option<u32>,
  phase: Phase,
) -> ElectionVerdict {
  let remaining = match (phase, eligible) {
    (Phase::Closed, _) => 0,
    (Phase::Open, Some(eligible)) => eligible.saturating_sub(responded),
    (Phase::Open, None) => return ElectionVerdict::Continue,
  };
  let everyone_voted = phase == Phase::Open && remaining == 0;

  let top = candidates.iter().map(|c| c.votes).max().unwrap_or(0);
  if top == 0 {
    return match phase {
      Phase::Closed => ElectionVerdict::NoVotes,
      Phase::Open => ElectionVerdict::Continue,
    };
  }

  let mut leaders: Vec<Uuid> = candidates
    .iter()
    .filter(|c| c.votes == top)
    .map(|c| c.candidate_id)
    .collect();

  if let [leader] = *leaders.as_slice() {
    let runner_up = candidates
      .iter()
      .filter(|c| c.candidate_id != leader)
      .map(|c| c.votes)
      .max()
      .unwrap_or(0);
    if top - runner_up > remaining {
      return ElectionVerdict::Winner { candidate_id: leader };
    }
    return ElectionVerdict::Continue;
  }

  if phase == Phase::Closed || everyone_voted {
    leaders.sort_unstable();
    ElectionVerdict::Tied { candidates: leaders }
  } else {
    ElectionVerdict::Continue
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn counts(accept: u32, reject: u32, abstain: u32) -> DecisionCounts {
    DecisionCounts { accept, reject, abstain }
  }

  fn cand(votes: u32) -> CandidateCount {
    CandidateCount {
      candidate_id: Uuid::new_v4(),
      name: String::new(),
      display_order: 0,
      votes,
    }
  }

  // ── Simple ────────────────────────────────────────────────────────────

  #[test]
  fn simple_majority_at_close() {
    let m = MajorityType::Simple;
    assert_eq!(evaluate(m, counts(3, 2, 0), None, Phase::Closed), Verdict::Accepted);
    assert_eq!(evaluate(m, counts(2, 2, 0), None, Phase::Closed), Verdict::Rejected);
    assert_eq!(evaluate(m, counts(0, 0, 0), None, Phase::Closed), Verdict::Rejected);
    assert_eq!(evaluate(m, counts(0, 0, 4), None, Phase::Closed), Verdict::Rejected);
  }

  #[test]
  fn simple_majority_waits_without_electorate() {
    let m = MajorityType::Simple;
    assert_eq!(evaluate(m, counts(5, 0, 0), None, Phase::Open), Verdict::Continue);
  }

  #[test]
  fn simple_majority_decides_once_certain() {
    let m = MajorityType::Simple;
    // 5 eligible: 3 accepts cannot be outvoted by the 2 remaining.
    assert_eq!(evaluate(m, counts(3, 0, 0), Some(5), Phase::Open), Verdict::Accepted);
    assert_eq!(evaluate(m, counts(2, 0, 0), Some(5), Phase::Open), Verdict::Continue);
    // 3 rejects of 5: at best 2 v 3.
    assert_eq!(evaluate(m, counts(0, 3, 0), Some(5), Phase::Open), Verdict::Rejected);
  }

  // ── Absolute ──────────────────────────────────────────────────────────

  #[test]
  fn absolute_majority_counts_non_responders_on_eligible_basis() {
    let m = MajorityType::Absolute;
    // 10 eligible, nobody abstained: 4 accepts are not more than half.
    assert_eq!(evaluate(m, counts(4, 1, 0), Some(10), Phase::Closed), Verdict::Rejected);
    assert_eq!(evaluate(m, counts(6, 1, 0), Some(10), Phase::Closed), Verdict::Accepted);
    // Two abstentions shrink the denominator to 8.
    assert_eq!(evaluate(m, counts(5, 1, 2), Some(10), Phase::Closed), Verdict::Accepted);
  }

  #[test]
  fn absolute_majority_on_responded_basis() {
    let m = MajorityType::Absolute;
    assert_eq!(evaluate(m, counts(3, 2, 7), None, Phase::Closed), Verdict::Accepted);
    assert_eq!(evaluate(m, counts(2, 2, 0), None, Phase::Closed), Verdict::Rejected);
  }

  // ── Supermajority ─────────────────────────────────────────────────────

  #[test]
  fn supermajority_threshold_is_inclusive() {
    let m = MajorityType::Supermajority(75);
    assert_eq!(evaluate(m, counts(3, 1, 0), None, Phase::Closed), Verdict::Accepted);
    assert_eq!(evaluate(m, counts(2, 1, 0), None, Phase::Closed), Verdict::Rejected);
  }

  #[test]
  fn supermajority_rejects_early_once_unreachable() {
    let m = MajorityType::Supermajority(75);
    // 5 eligible, 2 rejects: at best 3 of 5 = 60%.
    assert_eq!(evaluate(m, counts(0, 1, 0), Some(5), Phase::Open), Verdict::Continue);
    assert_eq!(evaluate(m, counts(0, 2, 0), Some(5), Phase::Open), Verdict::Rejected);
  }

  #[test]
  fn supermajority_accepts_early_once_unbeatable() {
    let m = MajorityType::Supermajority(75);
    // 4 eligible: 3 accepts reach 75% even if the last voter rejects.
    assert_eq!(evaluate(m, counts(3, 0, 0), Some(4), Phase::Open), Verdict::Accepted);
    assert_eq!(evaluate(m, counts(2, 0, 0), Some(4), Phase::Open), Verdict::Continue);
  }

  // ── Unanimity ─────────────────────────────────────────────────────────

  #[test]
  fn unanimity_accepts_after_last_eligible_accept() {
    let m = MajorityType::Unanimity;
    assert_eq!(evaluate(m, counts(2, 0, 0), Some(3), Phase::Open), Verdict::Continue);
    assert_eq!(evaluate(m, counts(3, 0, 0), Some(3), Phase::Open), Verdict::Accepted);
  }

  #[test]
  fn unanimity_rejects_on_first_reject() {
    let m = MajorityType::Unanimity;
    assert_eq!(evaluate(m, counts(9, 1, 0), None, Phase::Open), Verdict::Rejected);
    assert_eq!(evaluate(m, counts(9, 1, 0), Some(20), Phase::Open), Verdict::Rejected);
  }

  #[test]
  fn unanimity_needs_at_least_one_vote() {
    let m = MajorityType::Unanimity;
    assert_eq!(evaluate(m, counts(0, 0, 0), None, Phase::Closed), Verdict::Rejected);
    assert_eq!(evaluate(m, counts(0, 0, 3), Some(3), Phase::Open), Verdict::Rejected);
    assert_eq!(evaluate(m, counts(1, 0, 2), None, Phase::Closed), Verdict::Accepted);
  }

  // ── Abstentions ───────────────────────────────────────────────────────

  #[test]
  fn abstentions_never_change_a_responded_basis_verdict() {
    let majorities = [
      MajorityType::Simple,
      MajorityType::Absolute,
      MajorityType::Supermajority(60),
      MajorityType::Unanimity,
    ];
    for majority in majorities {
      for accept in 0..6 {
        for reject in 0..6 {
          for phase in [Phase::Open, Phase::Closed] {
            let base = evaluate(majority, counts(accept, reject, 0), None, phase);
            for abstain in 1..6 {
              assert_eq!(
                evaluate(majority, counts(accept, reject, abstain), None, phase),
                base,
                "{majority} a={accept} r={reject} s={abstain} {phase:?}"
              );
            }
          }
        }
      }
    }
  }

  // ── Elections ─────────────────────────────────────────────────────────

  #[test]
  fn election_highest_tally_wins_at_close() {
    let cands = vec![cand(4), cand(2), cand(1)];
    assert_eq!(
      evaluate_election(&cands, 7, None, Phase::Closed),
      ElectionVerdict::Winner { candidate_id: cands[0].candidate_id }
    );
  }

  #[test]
  fn election_tie_is_surfaced() {
    let cands = vec![cand(3), cand(3), cand(1)];
    let ElectionVerdict::Tied { candidates } =
      evaluate_election(&cands, 7, None, Phase::Closed)
    else {
      panic!("expected a tie");
    };
    assert_eq!(candidates.len(), 2);
    assert!(candidates.contains(&cands[0].candidate_id));
    assert!(candidates.contains(&cands[1].candidate_id));
  }

  #[test]
  fn election_without_votes_at_close() {
    let cands = vec![cand(0), cand(0)];
    assert_eq!(
      evaluate_election(&cands, 0, None, Phase::Closed),
      ElectionVerdict::NoVotes
    );
  }

  #[test]
  fn election_leader_wins_early_when_lead_exceeds_remaining() {
    let cands = vec![cand(4), cand(1)];
    // 7 eligible, 5 responded: lead of 3 > 2 remaining.
    assert_eq!(
      evaluate_election(&cands, 5, Some(7), Phase::Open),
      ElectionVerdict::Winner { candidate_id: cands[0].candidate_id }
    );
    // 9 eligible: 4 remaining could still close the gap.
    assert_eq!(evaluate_election(&cands, 5, Some(9), Phase::Open), ElectionVerdict::Continue);
    assert_eq!(evaluate_election(&cands, 5, None, Phase::Open), ElectionVerdict::Continue);
  }

  #[test]
  fn election_tie_is_final_once_everyone_voted() {
    let cands = vec![cand(2), cand(2)];
    assert!(matches!(
      evaluate_election(&cands, 4, Some(4), Phase::Open),
      ElectionVerdict::Tied { .. }
    ));
    assert_eq!(evaluate_election(&cands, 4, Some(5), Phase::Open), ElectionVerdict::Continue);
  }
}
