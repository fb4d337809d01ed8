//! Error type for `agora-engine`.

use agora_core::{store::Transient, subject::SubjectStatus};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum EngineError {
  #[error("{actor:?} may not {action}")]
  Unauthorized { actor: String, action: &'static str },

  #[error("subject not found: {0}")]
  SubjectNotFound(Uuid),

  #[error("subject {subject_id} is {status}")]
  SubjectClosed { subject_id: Uuid, status: SubjectStatus },

  #[error("subject {0} is outside its voting window")]
  OutsideVotingWindow(Uuid),

  #[error("invalid choice: {0}")]
  InvalidChoice(String),

  #[error("invalid request: {0}")]
  InvalidRequest(String),

  /// The subject lock could not be taken in time. Retried internally and
  /// surfaced as [`EngineError::Transient`] once retries run out.
  #[error("another resolution of subject {0} is in progress")]
  ConcurrentResolutionConflict(Uuid),

  #[error("temporarily unavailable: {0}")]
  Transient(String),

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl EngineError {
  /// Classify a storage failure by asking the store.
  pub fn from_store<E>(err: E) -> Self
  where
    E: std::error::Error + Transient + Send + Sync + 'static,
  {
    if err.is_transient() {
      Self::Transient(err.to_string())
    } else {
      Self::Store(Box::new(err))
    }
  }

  pub(crate) fn is_retryable(&self) -> bool {
    matches!(self, Self::Transient(_) | Self::ConcurrentResolutionConflict(_))
  }

  /// The form in which a failure leaves the engine.
  pub(crate) fn surfaced(self) -> Self {
    match self {
      Self::ConcurrentResolutionConflict(id) => Self::Transient(format!(
        "subject {id} is busy, try again"
      )),
      other => other,
    }
  }
}

impl From<agora_core::Error> for EngineError {
  fn from(err: agora_core::Error) -> Self {
    match err {
      agora_core::Error::InvalidChoice(msg) => Self::InvalidChoice(msg),
      agora_core::Error::InvalidRules(msg) => Self::InvalidRequest(msg),
      other => Self::Store(Box::new(other)),
    }
  }
}

pub type Result<T, E = EngineError> = std::result::Result<T, E>;
