//! `GET /subjects/:id/tally`: the live tally, status and outcome.
//!
//! Responses carry an `ETag`; a matching `If-None-Match` gets `304`.

use std::sync::Arc;

use agora_core::{gate::PermissionGate, store::GovernanceStore};
use agora_engine::Engine;
use axum::{
  Json,
  extract::{Path, State},
  http::{HeaderMap, HeaderValue, StatusCode, header},
  response::{IntoResponse, Response},
};
use uuid::Uuid;

use crate::{
  error::ApiError,
  etag::{compute_etag, if_none_match},
};

pub async fn handler<S, G>(
  State(engine): State<Arc<Engine<S, G>>>,
  Path(id): Path<Uuid>,
  headers: HeaderMap,
) -> Result<Response, ApiError>
where
  S: GovernanceStore + 'static,
  G: PermissionGate + 'static,
{
  let view = engine.tally(id).await?;
  let etag = compute_etag(&view)?;
  let etag_value = HeaderValue::from_str(&etag)
    .map_err(|e| ApiError::BadRequest(format!("unrepresentable etag: {e}")))?;

  let not_modified = headers
    .get(header::IF_NONE_MATCH)
    .and_then(|v| v.to_str().ok())
    .is_some_and(|v| if_none_match(v, &etag));

  let mut response = if not_modified {
    StatusCode::NOT_MODIFIED.into_response()
  } else {
    Json(view).into_response()
  };
  response.headers_mut().insert(header::ETAG, etag_value);
  Ok(response)
}
