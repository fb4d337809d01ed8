//! Tally aggregation: a pure function of a subject's ballot set.
//!
//! Tallies hold no state of their own; they are recomputed from the current
//! ballots every time they are needed.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  ballot::{Ballot, Candidate, Choice, VoteOption},
  subject::{Subject, SubjectKind},
};

/// Response counts for a change request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DecisionCounts {
  pub accept:  u32,
  pub reject:  u32,
  /// Counted as participation, never as part of the decision denominator.
  pub abstain: u32,
}

impl DecisionCounts {
  /// Accepts plus rejects.
  pub fn decisive(&self) -> u32 { self.accept + self.reject }

  pub fn responded(&self) -> u32 { self.decisive() + self.abstain }
}

/// Votes received by one candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateCount {
  pub candidate_id:  Uuid,
  pub name:          String,
  pub display_order: u32,
  pub votes:         u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TallyCounts {
  ChangeRequest(DecisionCounts),
  /// Ordered by votes (descending), then display order, then id.
  Election { candidates: Vec<CandidateCount> },
}

/// A point-in-time count of a subject's live ballots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tally {
  /// Voters with a live ballot, abstentions included.
  pub responded: u32,
  /// Voters whose ballot is currently withdrawn.
  pub withdrawn: u32,
  pub counts:    TallyCounts,
}

impl Tally {
  /// Count `ballots` for `subject`.
  ///
  /// Withdrawn ballots are excluded. Ballots whose choice does not match the
  /// subject kind, and selections of unknown candidates, are ignored.
  pub fn compute(subject: &Subject, candidates: &[Candidate], ballots: &[Ballot]) -> Self {
    let own = || ballots.iter().filter(|b| b.subject_id == subject.subject_id);
    let withdrawn = own().filter(|b| b.withdrawn).count() as u32;
    let responded = own().filter(|b| b.is_live()).count() as u32;

    let counts = match subject.kind {
      SubjectKind::ChangeRequest => {
        let mut counts = DecisionCounts::default();
        for ballot in own().filter(|b| b.is_live()) {
          match ballot.choice {
            Choice::Option(VoteOption::Accept) => counts.accept += 1,
            Choice::Option(VoteOption::Reject) => counts.reject += 1,
            Choice::Option(VoteOption::Abstain) => counts.abstain += 1,
            Choice::Candidates(_) => {}
          }
        }
        TallyCounts::ChangeRequest(counts)
      }
      SubjectKind::Election => {
        let mut votes: HashMap<Uuid, u32> =
          candidates.iter().map(|c| (c.candidate_id, 0)).collect();
        for ballot in own().filter(|b| b.is_live()) {
          if let Choice::Candidates(ids) = &ballot.choice {
            for id in ids {
              if let Some(v) = votes.get_mut(id) {
                *v += 1;
              }
            }
          }
        }

        let mut rows: Vec<CandidateCount> = candidates
          .iter()
          .map(|c| CandidateCount {
            candidate_id:  c.candidate_id,
            name:          c.name.clone(),
            display_order: c.display_order,
            votes:         votes.get(&c.candidate_id).copied().unwrap_or(0),
          })
          .collect();
        rows.sort_by(|a, b| {
          b.votes
            .cmp(&a.votes)
            .then(a.display_order.cmp(&b.display_order))
            .then(a.candidate_id.cmp(&b.candidate_id))
        });
        TallyCounts::Election { candidates: rows }
      }
    };

    Self { responded, withdrawn, counts }
  }

  /// The change-request counts, if this is a change-request tally.
  pub fn decision(&self) -> Option<DecisionCounts> {
    match self.counts {
      TallyCounts::ChangeRequest(c) => Some(c),
      TallyCounts::Election { .. } => None,
    }
  }
}
