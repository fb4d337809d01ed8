//! Subject: the votable unit of the engine.
//!
//! A subject is either an election (candidate selection) or a change request
//! (accept/reject/abstain on a proposed edit). It carries the rules that the
//! threshold policy applies to its tally and the status the decision
//! resolver moves it through.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result, outcome::Outcome};

// ─── Kind ────────────────────────────────────────────────────────────────────

/// What a subject asks its voters to decide.
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
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SubjectKind {
  /// Voters select one or more candidates.
  Election,
  /// Voters accept, reject or abstain on a proposed change.
  ChangeRequest,
}

// ─── Status ──────────────────────────────────────────────────────────────────

/// Lifecycle status of a subject.
///
/// ```text
/// pending → active → accepted → applied
///                  ↘ rejected
///                  ↘ tied → accepted | rejected   (manual tie-break)
/// pending | active → withdrawn
/// ```
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
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SubjectStatus {
  /// Created; no ballot accepted yet.
  Pending,
  /// At least one ballot accepted; voting in progress.
  Active,
  /// Election closed with an unresolved top tie; awaiting manual tie-break.
  Tied,
  Accepted,
  Rejected,
  /// An accepted change request whose change has been incorporated.
  Applied,
  Withdrawn,
}

impl SubjectStatus {
  /// Ballots may be cast or changed.
  pub fn is_open(self) -> bool { matches!(self, Self::Pending | Self::Active) }

  /// No further transition except `Accepted → Applied`.
  pub fn is_terminal(self) -> bool {
    matches!(
      self,
      Self::Accepted | Self::Rejected | Self::Applied | Self::Withdrawn
    )
  }
}

// ─── Majority ────────────────────────────────────────────────────────────────

/// The arithmetic rule used to decide acceptance of a change request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", content = "threshold", rename_all = "snake_case")]
pub enum MajorityType {
  /// More accepts than rejects.
  #[default]
  Simple,
  /// Accepts exceed half of the non-abstaining denominator.
  Absolute,
  /// Accepts reach the given percentage of the non-abstaining denominator.
  Supermajority(u8),
  /// Every non-abstaining respondent accepts, and at least one does.
  Unanimity,
}

impl MajorityType {
  /// Validate the threshold and fold `Supermajority(100)` into `Unanimity`.
  pub fn normalized(self) -> Result<Self> {
    match self {
      Self::Supermajority(0) => Err(Error::InvalidRules(
        "supermajority threshold must be at least 1%".into(),
      )),
      Self::Supermajority(p) if p > 100 => Err(Error::InvalidRules(format!(
        "supermajority threshold {p}% exceeds 100%"
      ))),
      Self::Supermajority(100) => Ok(Self::Unanimity),
      other => Ok(other),
    }
  }
}

impl fmt::Display for MajorityType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Simple => f.write_str("simple"),
      Self::Absolute => f.write_str("absolute"),
      Self::Supermajority(p) => write!(f, "supermajority({p}%)"),
      Self::Unanimity => f.write_str("unanimity"),
    }
  }
}

// ─── Window ──────────────────────────────────────────────────────────────────

/// The optional time range during which ballots are accepted.
///
/// The start is inclusive and the end exclusive. Either bound may be unset;
/// a subject without `closes_at` never closes on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct VotingWindow {
  pub opens_at:  Option<DateTime<Utc>>,
  pub closes_at: Option<DateTime<Utc>>,
}

impl VotingWindow {
  pub fn contains(&self, now: DateTime<Utc>) -> bool {
    self.opens_at.is_none_or(|start| now >= start)
      && self.closes_at.is_none_or(|end| now < end)
  }

  /// The window has elapsed as of `now`.
  pub fn has_closed(&self, now: DateTime<Utc>) -> bool {
    self.closes_at.is_some_and(|end| now >= end)
  }

  fn validate(&self) -> Result<()> {
    if let (Some(start), Some(end)) = (self.opens_at, self.closes_at)
      && end <= start
    {
      return Err(Error::InvalidRules(
        "voting window must close after it opens".into(),
      ));
    }
    Ok(())
  }
}

// ─── Rules ───────────────────────────────────────────────────────────────────

/// The decision rules attached to a subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rules {
  #[serde(default)]
  pub majority:        MajorityType,
  /// Elections only: voters may select more than one candidate.
  #[serde(default)]
  pub allows_multiple: bool,
  /// Upper bound on selections when `allows_multiple` is set.
  pub max_selections:  Option<u32>,
  #[serde(default)]
  pub window:          VotingWindow,
  /// Size of the electorate. When set, the policy can declare outcomes that
  /// are already mathematically certain before every voter has responded.
  pub eligible_voters: Option<u32>,
}

impl Default for Rules {
  fn default() -> Self {
    Self {
      majority:        MajorityType::Simple,
      allows_multiple: false,
      max_selections:  None,
      window:          VotingWindow::default(),
      eligible_voters: None,
    }
  }
}

impl Rules {
  /// Check the rules against the subject kind and normalise the majority.
  pub fn validated(mut self, kind: SubjectKind) -> Result<Self> {
    self.majority = self.majority.normalized()?;
    self.window.validate()?;

    if kind == SubjectKind::ChangeRequest && self.allows_multiple {
      return Err(Error::InvalidRules(
        "change requests do not support multiple selection".into(),
      ));
    }
    match self.max_selections {
      Some(0) => {
        return Err(Error::InvalidRules(
          "max_selections must be at least 1".into(),
        ));
      }
      Some(_) if !self.allows_multiple => {
        return Err(Error::InvalidRules(
          "max_selections requires allows_multiple".into(),
        ));
      }
      _ => {}
    }
    if self.eligible_voters == Some(0) {
      return Err(Error::InvalidRules(
        "eligible_voters must be at least 1".into(),
      ));
    }
    Ok(self)
  }
}

/// A partial update of a subject's rules. Absent fields are left unchanged.
///
/// The optional limits take a nested `Option`: `Some(None)` (an explicit
/// JSON `null`) clears the limit.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RulesUpdate {
  pub majority:        Option<MajorityType>,
  pub allows_multiple: Option<bool>,
  #[serde(
    default,
    deserialize_with = "present",
    skip_serializing_if = "Option::is_none"
  )]
  pub max_selections:  Option<Option<u32>>,
  pub window:          Option<VotingWindow>,
  #[serde(
    default,
    deserialize_with = "present",
    skip_serializing_if = "Option::is_none"
  )]
  pub eligible_voters: Option<Option<u32>>,
}

/// Distinguish a field set to `null` from one that is missing.
fn present<'de, D, T>(deserializer: D) -> std::result::Result<Option<Option<T>>, D::Error>
where
  D: serde::Deserializer<'de>,
  T: Deserialize<'de>,
{
  Option::<T>::deserialize(deserializer).map(Some)
}

impl RulesUpdate {
  pub fn apply(self, rules: Rules) -> Rules {
    let allows_multiple = self.allows_multiple.unwrap_or(rules.allows_multiple);
    let max_selections = match self.max_selections {
      Some(limit) => limit,
      // Going back to a single selection drops the old limit.
      None if !allows_multiple => None,
      None => rules.max_selections,
    };
    Rules {
      majority: self.majority.unwrap_or(rules.majority),
      allows_multiple,
      max_selections,
      window: self.window.unwrap_or(rules.window),
      eligible_voters: self.eligible_voters.unwrap_or(rules.eligible_voters),
    }
  }
}

// ─── Subject ─────────────────────────────────────────────────────────────────

/// A votable unit. Owned by its creator; its status is only ever changed by
/// the decision resolver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subject {
  pub subject_id: Uuid,
  pub kind:       SubjectKind,
  pub title:      String,
  pub creator_id: String,
  pub rules:      Rules,
  pub status:     SubjectStatus,
  /// Present once the subject has been resolved (or has tied).
  pub outcome:    Option<Outcome>,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

/// Input for creating a subject. The store assigns its identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSubject {
  pub kind:       SubjectKind,
  pub title:      String,
  pub creator_id: String,
  #[serde(default)]
  pub rules:      Rules,
}

impl NewSubject {
  pub fn new(
    kind: SubjectKind,
    title: impl Into<String>,
    creator_id: impl Into<String>,
  ) -> Self {
    Self {
      kind,
      title: title.into(),
      creator_id: creator_id.into(),
      rules: Rules::default(),
    }
  }

  pub fn with_rules(mut self, rules: Rules) -> Self {
    self.rules = rules;
    self
  }

  /// Validate the input and normalise its rules.
  pub fn validated(mut self) -> Result<Self> {
    if self.title.trim().is_empty() {
      return Err(Error::InvalidRules("title must not be empty".into()));
    }
    self.rules = self.rules.validated(self.kind)?;
    Ok(self)
  }
}
