//! JSON REST API for Agora.
//!
//! Exposes an axum [`Router`] backed by an [`agora_engine::Engine`]. Actors
//! identify themselves in the request body (`actorId` / `voterId`);
//! authenticating that claim, TLS and other transport concerns are the
//! caller's responsibility.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", agora_api::api_router(engine.clone()))
//! ```

pub mod ballots;
pub mod error;
pub mod etag;
pub mod subjects;
pub mod tally;

use std::sync::Arc;

use agora_core::{gate::PermissionGate, store::GovernanceStore};
use agora_engine::Engine;
use axum::{
  Router,
  routing::{delete, get, post},
};

pub use error::ApiError;

/// Build a fully-materialised API router for `engine`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S, G>(engine: Arc<Engine<S, G>>) -> Router<()>
where
  S: GovernanceStore + 'static,
  G: PermissionGate + 'static,
{
  Router::new()
    // Subjects
    .route("/subjects", get(subjects::list::<S, G>).post(subjects::create::<S, G>))
    .route(
      "/subjects/{id}",
      get(subjects::get_one::<S, G>).patch(subjects::update_rules::<S, G>),
    )
    .route(
      "/subjects/{id}/candidates",
      get(subjects::list_candidates::<S, G>).post(subjects::add_candidate::<S, G>),
    )
    .route("/subjects/{id}/close", post(subjects::close::<S, G>))
    .route("/subjects/{id}/withdraw", post(subjects::withdraw::<S, G>))
    .route("/subjects/{id}/apply", post(subjects::apply::<S, G>))
    // Ballots
    .route("/subjects/{id}/ballots", post(ballots::submit::<S, G>))
    .route("/subjects/{id}/ballots/{voter}", delete(ballots::withdraw::<S, G>))
    .route("/subjects/{id}/ballots/{voter}/history", get(ballots::history::<S, G>))
    // Tally
    .route("/subjects/{id}/tally", get(tally::handler::<S, G>))
    .with_state(engine)
}

#[cfg(test)]
mod tests {
  use std::sync::Arc;

  use agora_core::gate::RoleGate;
  use agora_engine::Engine;
  use agora_store_sqlite::SqliteStore;
  use axum::{
    body::Body,
    http::{Request, StatusCode, header},
    response::Response,
  };
  use serde_json::{Value, json};
  use tower::ServiceExt as _;
  use uuid::Uuid;

  use super::api_router;

  type TestEngine = Arc<Engine<SqliteStore, RoleGate>>;

  async fn make_engine() -> TestEngine {
    let store = SqliteStore::open_in_memory().await.unwrap();
    let gate = RoleGate::new(["admin"], Some(["admin", "v1", "v2", "v3"]));
    Arc::new(Engine::new(store, gate))
  }

  async fn oneshot_raw(
    engine:  &TestEngine,
    method:  &str,
    uri:     &str,
    headers: Vec<(header::HeaderName, &str)>,
    body:    Option<Value>,
  ) -> Response {
    let mut builder = Request::builder().method(method).uri(uri);
    for (k, v) in headers {
      builder = builder.header(k, v);
    }
    let req = match body {
      Some(json) => builder
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(json.to_string()))
        .unwrap(),
      None => builder.body(Body::empty()).unwrap(),
    };
    api_router(engine.clone()).oneshot(req).await.unwrap()
  }

  async fn json_body(resp: Response) -> Value {
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
  }

  async fn create_motion(engine: &TestEngine, eligible: u32) -> String {
    let resp = oneshot_raw(
      engine,
      "POST",
      "/subjects",
      vec![],
      Some(json!({
        "actorId": "admin",
        "kind": "change_request",
        "title": "Adopt the new bylaws",
        "rules": { "eligible_voters": eligible },
      })),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let body = json_body(resp).await;
    assert_eq!(body["status"], "pending");
    body["subject_id"].as_str().unwrap().to_string()
  }

  async fn cast(engine: &TestEngine, id: &str, voter: &str, option: &str) -> Response {
    oneshot_raw(
      engine,
      "POST",
      &format!("/subjects/{id}/ballots"),
      vec![],
      Some(json!({ "voterId": voter, "choice": { "option": option } })),
    )
    .await
  }

  // ── Subjects ────────────────────────────────────────────────────────────────

  #[tokio::test]
  async fn non_admin_cannot_create_subjects() {
    let engine = make_engine().await;
    let resp = oneshot_raw(
      &engine,
      "POST",
      "/subjects",
      vec![],
      Some(json!({ "actorId": "v1", "kind": "election", "title": "Chair" })),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    assert_eq!(json_body(resp).await["code"], "unauthorized");
  }

  #[tokio::test]
  async fn unknown_subject_returns_404() {
    let engine = make_engine().await;
    let resp =
      oneshot_raw(&engine, "GET", &format!("/subjects/{}", Uuid::new_v4()), vec![], None).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
  }

  #[tokio::test]
  async fn list_filters_by_status() {
    let engine = make_engine().await;
    create_motion(&engine, 3).await;

    let resp = oneshot_raw(&engine, "GET", "/subjects?status=pending", vec![], None).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(json_body(resp).await.as_array().unwrap().len(), 1);

    let resp = oneshot_raw(&engine, "GET", "/subjects?status=accepted", vec![], None).await;
    assert!(json_body(resp).await.as_array().unwrap().is_empty());

    let resp = oneshot_raw(&engine, "GET", "/subjects?status=bogus", vec![], None).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
  }

  // ── Ballots ─────────────────────────────────────────────────────────────────

  #[tokio::test]
  async fn ballots_resolve_the_subject_once_certain() {
    let engine = make_engine().await;
    let id = create_motion(&engine, 3).await;

    let resp = cast(&engine, &id, "v1", "accept").await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    assert_eq!(json_body(resp).await["status"], "active");

    let resp = cast(&engine, &id, "v2", "accept").await;
    let body = json_body(resp).await;
    assert_eq!(body["status"], "accepted");
    assert_eq!(body["ballot"]["revision"], 1);

    let resp = cast(&engine, &id, "v3", "reject").await;
    assert_eq!(resp.status(), StatusCode::CONFLICT);
    assert_eq!(json_body(resp).await["code"], "subject_closed");
  }

  #[tokio::test]
  async fn ineligible_voter_is_forbidden() {
    let engine = make_engine().await;
    let id = create_motion(&engine, 3).await;
    let resp = cast(&engine, &id, "mallory", "accept").await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
  }

  #[tokio::test]
  async fn candidate_choice_on_a_motion_is_unprocessable() {
    let engine = make_engine().await;
    let id = create_motion(&engine, 3).await;
    let resp = oneshot_raw(
      &engine,
      "POST",
      &format!("/subjects/{id}/ballots"),
      vec![],
      Some(json!({ "voterId": "v1", "choice": { "candidates": [Uuid::new_v4()] } })),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
  }

  #[tokio::test]
  async fn withdrawal_returns_204_and_appears_in_history() {
    let engine = make_engine().await;
    let id = create_motion(&engine, 3).await;
    cast(&engine, &id, "v1", "accept").await;

    let uri = format!("/subjects/{id}/ballots/v1");
    let resp = oneshot_raw(&engine, "DELETE", &uri, vec![], None).await;
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);

    let resp = oneshot_raw(&engine, "GET", &format!("{uri}/history"), vec![], None).await;
    let history = json_body(resp).await;
    let actions: Vec<_> = history
      .as_array()
      .unwrap()
      .iter()
      .map(|e| e["action"].as_str().unwrap().to_string())
      .collect();
    assert_eq!(actions, ["cast", "withdrawn"]);
  }

  // ── Tally ───────────────────────────────────────────────────────────────────

  #[tokio::test]
  async fn tally_etag_supports_conditional_get() {
    let engine = make_engine().await;
    let id = create_motion(&engine, 3).await;
    cast(&engine, &id, "v1", "accept").await;

    let uri = format!("/subjects/{id}/tally");
    let resp = oneshot_raw(&engine, "GET", &uri, vec![], None).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let etag = resp.headers()[header::ETAG].to_str().unwrap().to_string();
    assert_eq!(json_body(resp).await["tally"]["responded"], 1);

    let resp = oneshot_raw(&engine, "GET", &uri, vec![(header::IF_NONE_MATCH, &etag)], None).await;
    assert_eq!(resp.status(), StatusCode::NOT_MODIFIED);

    cast(&engine, &id, "v2", "reject").await;
    let resp = oneshot_raw(&engine, "GET", &uri, vec![(header::IF_NONE_MATCH, &etag)], None).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_ne!(resp.headers()[header::ETAG].to_str().unwrap(), etag);
  }

  // ── Administrative ──────────────────────────────────────────────────────────

  #[tokio::test]
  async fn admin_close_then_apply() {
    let engine = make_engine().await;
    let id = create_motion(&engine, 3).await;
    cast(&engine, &id, "v1", "accept").await;

    let resp = oneshot_raw(
      &engine,
      "POST",
      &format!("/subjects/{id}/close"),
      vec![],
      Some(json!({ "actorId": "admin" })),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(json_body(resp).await["status"], "accepted");

    let resp = oneshot_raw(
      &engine,
      "POST",
      &format!("/subjects/{id}/apply"),
      vec![],
      Some(json!({ "actorId": "admin" })),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(json_body(resp).await["status"], "applied");
  }

  #[tokio::test]
  async fn rules_cannot_change_after_the_first_ballot() {
    let engine = make_engine().await;
    let id = create_motion(&engine, 3).await;
    let uri = format!("/subjects/{id}");

    let resp = oneshot_raw(
      &engine,
      "PATCH",
      &uri,
      vec![],
      Some(json!({ "actorId": "admin", "eligible_voters": 4 })),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(json_body(resp).await["rules"]["eligible_voters"], 4);

    cast(&engine, &id, "v1", "accept").await;
    let resp = oneshot_raw(
      &engine,
      "PATCH",
      &uri,
      vec![],
      Some(json!({ "actorId": "admin", "eligible_voters": 5 })),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
  }
}
