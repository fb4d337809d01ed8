//! Outcomes: the retained record of how a subject was resolved.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{subject::SubjectStatus, tally::Tally};

/// What caused a resolution.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
  strum::Display,
  strum::IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ResolutionTrigger {
  /// A ballot mutation made the result mathematically certain.
  Ballot,
  /// The voting window elapsed.
  WindowClosed,
  /// An administrator closed, withdrew, tie-broke or applied the subject.
  Administrative,
}

/// The status a subject was resolved to, with the tally it was resolved on.
///
/// Derived at resolution time and stored alongside the subject for audit and
/// display; never used as an input to later decisions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outcome {
  pub status:          SubjectStatus,
  pub tally:           Tally,
  pub trigger:         ResolutionTrigger,
  pub resolved_at:     DateTime<Utc>,
  /// Elections: the winning candidate.
  pub winner:          Option<Uuid>,
  /// Elections: candidates sharing the top tally when the subject tied.
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub tied_candidates: Vec<Uuid>,
}
