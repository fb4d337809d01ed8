//! Handlers for `/subjects` endpoints.
//!
//! | Method  | Path | Notes |
//! |---------|------|-------|
//! | `GET`   | `/subjects` | Optional `?status=a,b&kind=&limit=&offset=` |
//! | `POST`  | `/subjects` | Body: `{"actorId":…,"kind":…,"title":…,"rules":{…}}` |
//! | `GET`   | `/subjects/:id` | 404 if not found |
//! | `PATCH` | `/subjects/:id` | Rules; before the first ballot only |
//! | `GET`   | `/subjects/:id/candidates` | Display order |
//! | `POST`  | `/subjects/:id/candidates` | Elections, before the first ballot |
//! | `POST`  | `/subjects/:id/close` | Administrative close or tie-break |
//! | `POST`  | `/subjects/:id/withdraw` | |
//! | `POST`  | `/subjects/:id/apply` | Accepted change requests only |

use std::{str::FromStr, sync::Arc};

use agora_core::{
  ballot::{Candidate, NewCandidate},
  gate::PermissionGate,
  store::{GovernanceStore, SubjectQuery},
  subject::{NewSubject, Rules, RulesUpdate, Subject, SubjectKind, SubjectStatus},
};
use agora_engine::{CloseRequest, Decision, Engine, TallyView};
use axum::{
  Json,
  extract::{Path, Query, State},
  http::StatusCode,
  response::IntoResponse,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::ApiError;

// ─── List ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ListParams {
  /// Comma-separated statuses, e.g. `pending,active`.
  pub status: Option<String>,
  pub kind:   Option<SubjectKind>,
  pub limit:  Option<usize>,
  pub offset: Option<usize>,
}

impl ListParams {
  fn into_query(self) -> Result<SubjectQuery, ApiError> {
    let statuses = match self.status.as_deref() {
      None | Some("") => vec![],
      Some(list) => list
        .split(',')
        .map(|s| {
          SubjectStatus::from_str(s.trim())
            .map_err(|_| ApiError::BadRequest(format!("unknown status: {s}")))
        })
        .collect::<Result<_, _>>()?,
    };
    Ok(SubjectQuery { statuses, kind: self.kind, limit: self.limit, offset: self.offset })
  }
}

/// `GET /subjects`
pub async fn list<S, G>(
  State(engine): State<Arc<Engine<S, G>>>,
  Query(params): Query<ListParams>,
) -> Result<Json<Vec<Subject>>, ApiError>
where
  S: GovernanceStore + 'static,
  G: PermissionGate + 'static,
{
  let query = params.into_query()?;
  Ok(Json(engine.list_subjects(&query).await?))
}

// ─── Create ───────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBody {
  pub actor_id: String,
  pub kind:     SubjectKind,
  pub title:    String,
  #[serde(default)]
  pub rules:    Rules,
}

/// `POST /subjects`
pub async fn create<S, G>(
  State(engine): State<Arc<Engine<S, G>>>,
  Json(body): Json<CreateBody>,
) -> Result<impl IntoResponse, ApiError>
where
  S: GovernanceStore + 'static,
  G: PermissionGate + 'static,
{
  let input = NewSubject::new(body.kind, body.title, body.actor_id).with_rules(body.rules);
  let subject = engine.create_subject(input).await?;
  Ok((StatusCode::CREATED, Json(subject)))
}

// ─── Get one ──────────────────────────────────────────────────────────────────

/// `GET /subjects/:id`
pub async fn get_one<S, G>(
  State(engine): State<Arc<Engine<S, G>>>,
  Path(id): Path<Uuid>,
) -> Result<Json<Subject>, ApiError>
where
  S: GovernanceStore + 'static,
  G: PermissionGate + 'static,
{
  Ok(Json(engine.get_subject(id).await?))
}

// ─── Rules ────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RulesBody {
  pub actor_id: String,
  #[serde(flatten)]
  pub update:   RulesUpdate,
}

/// `PATCH /subjects/:id`
pub async fn update_rules<S, G>(
  State(engine): State<Arc<Engine<S, G>>>,
  Path(id): Path<Uuid>,
  Json(body): Json<RulesBody>,
) -> Result<Json<Subject>, ApiError>
where
  S: GovernanceStore + 'static,
  G: PermissionGate + 'static,
{
  Ok(Json(engine.update_rules(&body.actor_id, id, body.update).await?))
}

// ─── Candidates ───────────────────────────────────────────────────────────────

/// `GET /subjects/:id/candidates`
pub async fn list_candidates<S, G>(
  State(engine): State<Arc<Engine<S, G>>>,
  Path(id): Path<Uuid>,
) -> Result<Json<Vec<Candidate>>, ApiError>
where
  S: GovernanceStore + 'static,
  G: PermissionGate + 'static,
{
  Ok(Json(engine.list_candidates(id).await?))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateBody {
  pub actor_id:      String,
  pub name:          String,
  pub display_order: Option<u32>,
}

/// `POST /subjects/:id/candidates`
pub async fn add_candidate<S, G>(
  State(engine): State<Arc<Engine<S, G>>>,
  Path(id): Path<Uuid>,
  Json(body): Json<CandidateBody>,
) -> Result<impl IntoResponse, ApiError>
where
  S: GovernanceStore + 'static,
  G: PermissionGate + 'static,
{
  let input = NewCandidate { name: body.name, display_order: body.display_order };
  let candidate = engine.add_candidate(&body.actor_id, id, input).await?;
  Ok((StatusCode::CREATED, Json(candidate)))
}

// ─── Administrative transitions ───────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloseBody {
  pub actor_id: String,
  pub decision: Option<Decision>,
  pub winner:   Option<Uuid>,
}

/// `POST /subjects/:id/close`
pub async fn close<S, G>(
  State(engine): State<Arc<Engine<S, G>>>,
  Path(id): Path<Uuid>,
  Json(body): Json<CloseBody>,
) -> Result<Json<TallyView>, ApiError>
where
  S: GovernanceStore + 'static,
  G: PermissionGate + 'static,
{
  let request = CloseRequest { decision: body.decision, winner: body.winner };
  Ok(Json(engine.close_subject(&body.actor_id, id, request).await?))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActorBody {
  pub actor_id: String,
}

/// `POST /subjects/:id/withdraw`
pub async fn withdraw<S, G>(
  State(engine): State<Arc<Engine<S, G>>>,
  Path(id): Path<Uuid>,
  Json(body): Json<ActorBody>,
) -> Result<Json<Subject>, ApiError>
where
  S: GovernanceStore + 'static,
  G: PermissionGate + 'static,
{
  Ok(Json(engine.withdraw_subject(&body.actor_id, id).await?))
}

/// `POST /subjects/:id/apply`
pub async fn apply<S, G>(
  State(engine): State<Arc<Engine<S, G>>>,
  Path(id): Path<Uuid>,
  Json(body): Json<ActorBody>,
) -> Result<Json<Subject>, ApiError>
where
  S: GovernanceStore + 'static,
  G: PermissionGate + 'static,
{
  Ok(Json(engine.mark_applied(&body.actor_id, id).await?))
}
