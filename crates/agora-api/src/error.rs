//! API error type and [`axum::response::IntoResponse`] implementation.

use agora_engine::EngineError;
use axum::{
  Json,
  http::{HeaderValue, StatusCode, header},
  response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// Seconds a client should wait before retrying a 503.
const RETRY_AFTER_SECS: &str = "1";

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error(transparent)]
  Engine(#[from] EngineError),

  #[error("bad request: {0}")]
  BadRequest(String),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

impl ApiError {
  /// HTTP status and machine-readable code.
  fn classify(&self) -> (StatusCode, &'static str) {
    match self {
      ApiError::Engine(e) => match e {
        EngineError::Unauthorized { .. } => (StatusCode::FORBIDDEN, "unauthorized"),
        EngineError::SubjectNotFound(_) => (StatusCode::NOT_FOUND, "subject_not_found"),
        EngineError::SubjectClosed { .. } => (StatusCode::CONFLICT, "subject_closed"),
        EngineError::OutsideVotingWindow(_) => {
          (StatusCode::CONFLICT, "outside_voting_window")
        }
        EngineError::InvalidChoice(_) => (StatusCode::UNPROCESSABLE_ENTITY, "invalid_choice"),
        EngineError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "invalid_request"),
        EngineError::ConcurrentResolutionConflict(_) | EngineError::Transient(_) => {
          (StatusCode::SERVICE_UNAVAILABLE, "transient")
        }
        EngineError::Store(_) => (StatusCode::INTERNAL_SERVER_ERROR, "store_error"),
      },
      ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "invalid_request"),
      ApiError::Serialization(_) => (StatusCode::INTERNAL_SERVER_ERROR, "serialization_error"),
    }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let (status, code) = self.classify();
    let mut response =
      (status, Json(json!({ "error": self.to_string(), "code": code }))).into_response();
    if status == StatusCode::SERVICE_UNAVAILABLE {
      response
        .headers_mut()
        .insert(header::RETRY_AFTER, HeaderValue::from_static(RETRY_AFTER_SECS));
    }
    response
  }
}
