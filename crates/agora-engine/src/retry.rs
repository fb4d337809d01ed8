//! Bounded exponential backoff for transient failures.

use std::{future::Future, time::Duration};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
  /// Total attempts, the first one included.
  pub max_attempts:     u32,
  pub initial_delay_ms: u64,
  pub max_delay_ms:     u64,
}

impl Default for RetryPolicy {
  fn default() -> Self {
    Self { max_attempts: 5, initial_delay_ms: 20, max_delay_ms: 1_000 }
  }
}

impl RetryPolicy {
  /// Delay after the `attempt`-th failure (1-based): doubles each time, capped
  /// at `max_delay_ms`.
  pub fn delay_for(&self, attempt: u32) -> Duration {
    let factor = 1u64 << attempt.saturating_sub(1).min(20);
    let ms = self.initial_delay_ms.saturating_mul(factor).min(self.max_delay_ms);
    Duration::from_millis(ms)
  }

  /// Run `op`, retrying while it fails with a retryable error.
  pub async fn run<T, F, Fut>(&self, what: &'static str, mut op: F) -> Result<T>
  where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
  {
    let max_attempts = self.max_attempts.max(1);
    let mut attempt = 1;
    loop {
      match op().await {
        Ok(value) => return Ok(value),
        Err(err) if err.is_retryable() && attempt < max_attempts => {
          let delay = self.delay_for(attempt);
          warn!(operation = what, attempt, ?delay, error = %err, "retrying");
          tokio::time::sleep(delay).await;
          attempt += 1;
        }
        Err(err) => return Err(err.surfaced()),
      }
    }
  }
}
