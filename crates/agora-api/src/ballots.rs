//! Handlers for ballots.
//!
//! | Method   | Path | Notes |
//! |----------|------|-------|
//! | `POST`   | `/subjects/:id/ballots` | Cast or change. Body: `{"voterId":…,"choice":{…}}` |
//! | `DELETE` | `/subjects/:id/ballots/:voter` | 204; idempotent |
//! | `GET`    | `/subjects/:id/ballots/:voter/history` | Revision order |

use std::sync::Arc;

use agora_core::{
  ballot::{BallotEvent, Choice},
  gate::PermissionGate,
  store::GovernanceStore,
};
use agora_engine::{BallotReceipt, Engine};
use axum::{
  Json,
  extract::{Path, State},
  http::StatusCode,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::ApiError;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitBody {
  pub voter_id: String,
  pub choice:   Choice,
}

/// `POST /subjects/:id/ballots`
pub async fn submit<S, G>(
  State(engine): State<Arc<Engine<S, G>>>,
  Path(id): Path<Uuid>,
  Json(body): Json<SubmitBody>,
) -> Result<(StatusCode, Json<BallotReceipt>), ApiError>
where
  S: GovernanceStore + 'static,
  G: PermissionGate + 'static,
{
  let receipt = engine.submit_ballot(id, &body.voter_id, body.choice).await?;
  Ok((StatusCode::CREATED, Json(receipt)))
}

/// `DELETE /subjects/:id/ballots/:voter`
pub async fn withdraw<S, G>(
  State(engine): State<Arc<Engine<S, G>>>,
  Path((id, voter_id)): Path<(Uuid, String)>,
) -> Result<StatusCode, ApiError>
where
  S: GovernanceStore + 'static,
  G: PermissionGate + 'static,
{
  engine.withdraw_ballot(id, &voter_id).await?;
  Ok(StatusCode::NO_CONTENT)
}

/// `GET /subjects/:id/ballots/:voter/history`
pub async fn history<S, G>(
  State(engine): State<Arc<Engine<S, G>>>,
  Path((id, voter_id)): Path<(Uuid, String)>,
) -> Result<Json<Vec<BallotEvent>>, ApiError>
where
  S: GovernanceStore + 'static,
  G: PermissionGate + 'static,
{
  Ok(Json(engine.ballot_history(id, &voter_id).await?))
}
