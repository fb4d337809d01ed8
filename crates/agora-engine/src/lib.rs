//! The Agora decision engine.
//!
//! Ties the pure pieces of `agora-core` (tally, threshold policy) to a
//! [`GovernanceStore`](agora_core::store::GovernanceStore) and a
//! [`PermissionGate`](agora_core::gate::PermissionGate):
//!
//! - ballot submission and withdrawal with re-resolution after every write;
//! - per-subject serialization with a bounded lock wait;
//! - retry with exponential backoff for transient storage failures;
//! - the window scheduler that closes subjects when their window elapses.

pub mod clock;
pub mod engine;
pub mod error;
pub mod events;
pub mod locks;
pub mod retry;
pub mod scheduler;

pub use engine::{
  BallotReceipt, CloseRequest, Decision, Engine, EngineConfig, TallyView, Withdrawal,
};
pub use error::{EngineError, Result};
