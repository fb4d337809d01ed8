//! HTTP server assembly for Agora.
//!
//! Owns the runtime configuration and wraps the API router with request
//! tracing. The binary in `main.rs` wires these to a SQLite store and the
//! window scheduler.

use std::{path::PathBuf, sync::Arc, time::Duration};

use agora_core::{
  gate::{PermissionGate, RoleGate},
  store::GovernanceStore,
};
use agora_engine::{Engine, EngineConfig, retry::RetryPolicy};
use axum::Router;
use serde::Deserialize;
use tower_http::trace::TraceLayer;

// ─── Configuration ────────────────────────────────────────────────────────────

/// Runtime server configuration, deserialised from `config.toml` and
/// `AGORA_*` environment variables.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
  pub host:              String,
  pub port:              u16,
  pub store_path:        PathBuf,
  /// How often the window scheduler looks for elapsed subjects.
  pub scheduler_tick_ms: u64,
  pub lock_timeout_ms:   u64,
  pub retry:             RetryPolicy,
  pub administrators:    Vec<String>,
  /// Absent means any named actor may vote.
  pub electorate:        Option<Vec<String>>,
}

impl Default for ServerConfig {
  fn default() -> Self {
    Self {
      host:              "127.0.0.1".into(),
      port:              8080,
      store_path:        PathBuf::from("~/.local/share/agora/agora.db"),
      scheduler_tick_ms: 1_000,
      lock_timeout_ms:   2_000,
      retry:             RetryPolicy::default(),
      administrators:    vec![],
      electorate:        None,
    }
  }
}

impl ServerConfig {
  pub fn engine_config(&self) -> EngineConfig {
    EngineConfig {
      lock_timeout: Duration::from_millis(self.lock_timeout_ms),
      retry: self.retry,
      ..EngineConfig::default()
    }
  }

  pub fn scheduler_tick(&self) -> Duration { Duration::from_millis(self.scheduler_tick_ms.max(1)) }

  pub fn gate(&self) -> RoleGate {
    RoleGate::new(self.administrators.clone(), self.electorate.clone())
  }

  pub fn address(&self) -> String { format!("{}:{}", self.host, self.port) }
}

// ─── Router ───────────────────────────────────────────────────────────────────

/// The API router with HTTP request tracing.
pub fn router<S, G>(engine: Arc<Engine<S, G>>) -> Router
where
  S: GovernanceStore + 'static,
  G: PermissionGate + 'static,
{
  agora_api::api_router(engine).layer(TraceLayer::new_for_http())
}
