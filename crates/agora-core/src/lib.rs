//! Core types and trait definitions for the Agora governance engine.
//!
//! This crate is deliberately free of HTTP, database and runtime
//! dependencies. It holds the data model (subjects, candidates, ballots),
//! the pure tally and threshold-policy arithmetic, and the traits through
//! which the engine reaches its external collaborators: storage, the
//! permission gate, and the event sink.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod ballot;
pub mod error;
pub mod event;
pub mod gate;
pub mod outcome;
pub mod policy;
pub mod store;
pub mod subject;
pub mod tally;

pub use error::{Error, Result};
