//! Events emitted when a subject changes status.
//!
//! The engine publishes; fan-out to notifications is the surrounding
//! application's concern.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  outcome::Outcome,
  subject::{SubjectKind, SubjectStatus},
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectEvent {
  pub subject_id: Uuid,
  pub kind:       SubjectKind,
  pub previous:   SubjectStatus,
  pub status:     SubjectStatus,
  pub outcome:    Option<Outcome>,
  pub at:         DateTime<Utc>,
}

/// A sink for [`SubjectEvent`]s.
///
/// Publishing must not block: implementations hand the event off (to a log,
/// a channel, a queue) and return.
pub trait EventPublisher: Send + Sync {
  fn publish(&self, event: SubjectEvent);
}
