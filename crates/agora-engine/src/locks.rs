//! Per-subject serialization.
//!
//! Each subject gets its own async mutex, created on first use. Work on
//! different subjects never contends.

use std::{
  collections::HashMap,
  sync::{Arc, Mutex, PoisonError},
  time::Duration,
};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::{EngineError, Result};

#[derive(Debug)]
pub struct SubjectLocks {
  locks:   Mutex<HashMap<Uuid, Arc<AsyncMutex<()>>>>,
  timeout: Duration,
}

impl SubjectLocks {
  pub fn new(timeout: Duration) -> Self {
    Self { locks: Mutex::default(), timeout }
  }

  /// Take the lock for `subject_id`, waiting at most the configured timeout.
  pub async fn acquire(&self, subject_id: Uuid) -> Result<OwnedMutexGuard<()>> {
    let lock = {
      let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
      Arc::clone(locks.entry(subject_id).or_default())
    };
    tokio::time::timeout(self.timeout, lock.lock_owned())
      .await
      .map_err(|_| EngineError::ConcurrentResolutionConflict(subject_id))
  }

  /// Drop locks nobody holds or waits on.
  pub fn prune(&self) {
    let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
    locks.retain(|_, lock| Arc::strong_count(lock) > 1);
  }

  #[cfg(test)]
  fn len(&self) -> usize {
    self.locks.lock().unwrap_or_else(PoisonError::into_inner).len()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn second_holder_times_out() {
    let locks = SubjectLocks::new(Duration::from_millis(20));
    let id = Uuid::new_v4();

    let _held = locks.acquire(id).await.unwrap();
    let err = locks.acquire(id).await.unwrap_err();
    assert!(matches!(err, EngineError::ConcurrentResolutionConflict(s) if s == id));

    // Other subjects are unaffected.
    assert!(locks.acquire(Uuid::new_v4()).await.is_ok());
  }

  #[tokio::test]
  async fn prune_keeps_held_locks() {
    let locks = SubjectLocks::new(Duration::from_millis(20));
    let held = locks.acquire(Uuid::new_v4()).await.unwrap();
    drop(locks.acquire(Uuid::new_v4()).await.unwrap());

    locks.prune();
    assert_eq!(locks.len(), 1);
    drop(held);
    locks.prune();
    assert_eq!(locks.len(), 0);
  }
}
