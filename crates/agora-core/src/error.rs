//! Error types for `agora-core`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  /// The ballot choice does not fit the subject it was cast on.
  #[error("invalid choice: {0}")]
  InvalidChoice(String),

  /// A subject's rules (majority, window, selection limits) are inconsistent.
  #[error("invalid rules: {0}")]
  InvalidRules(String),

  #[error("unknown {what} discriminant: {value:?}")]
  UnknownDiscriminant { what: &'static str, value: String },

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
