//! Window scheduler: forces closure of subjects whose voting window has
//! elapsed.
//!
//! Deadlines live in a min-heap next to a map of each subject's current
//! deadline. Rescheduling pushes a new heap entry and overwrites the map;
//! heap entries that no longer match the map are stale and skipped when
//! popped.

use std::{
  cmp::Reverse,
  collections::{BinaryHeap, HashMap},
  future::Future,
  sync::{Mutex, PoisonError},
  time::Duration,
};

use agora_core::{
  gate::PermissionGate,
  outcome::ResolutionTrigger,
  policy::Phase,
  store::{GovernanceStore, SubjectQuery},
};
use chrono::{DateTime, Utc};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{Engine, Result};

// ─── Deadlines ───────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct Deadlines {
  heap:    BinaryHeap<Reverse<(DateTime<Utc>, Uuid)>>,
  current: HashMap<Uuid, DateTime<Utc>>,
}

#[derive(Debug, Default)]
pub struct WindowScheduler {
  inner: Mutex<Deadlines>,
}

impl WindowScheduler {
  fn deadlines(&self) -> std::sync::MutexGuard<'_, Deadlines> {
    self.inner.lock().unwrap_or_else(PoisonError::into_inner)
  }

  /// Set (or move) the deadline of `subject_id`.
  pub fn schedule(&self, subject_id: Uuid, closes_at: DateTime<Utc>) {
    let mut d = self.deadlines();
    d.current.insert(subject_id, closes_at);
    d.heap.push(Reverse((closes_at, subject_id)));
  }

  pub fn unschedule(&self, subject_id: Uuid) {
    self.deadlines().current.remove(&subject_id);
  }

  pub fn deadline(&self, subject_id: Uuid) -> Option<DateTime<Utc>> {
    self.deadlines().current.get(&subject_id).copied()
  }

  /// Remove and return every subject whose deadline is at or before `now`,
  /// earliest first.
  pub fn due(&self, now: DateTime<Utc>) -> Vec<Uuid> {
    let mut guard = self.deadlines();
    let d = &mut *guard;
    let mut due = vec![];
    while let Some(&Reverse((at, subject_id))) = d.heap.peek() {
      if at > now {
        break;
      }
      d.heap.pop();
      if d.current.get(&subject_id) == Some(&at) {
        d.current.remove(&subject_id);
        due.push(subject_id);
      }
    }
    due
  }

  /// Number of subjects with a live deadline.
  pub fn len(&self) -> usize { self.deadlines().current.len() }

  pub fn is_empty(&self) -> bool { self.len() == 0 }
}

// ─── Driving the schedule ────────────────────────────────────────────────────

impl<S: GovernanceStore, G: PermissionGate> Engine<S, G> {
  /// Schedule every open subject that has an end time. Run once at startup.
  pub async fn seed_schedule(&self) -> Result<usize> {
    let open = self.list_subjects(&SubjectQuery::open()).await?;
    let mut seeded = 0;
    for subject in &open {
      if let Some(closes_at) = subject.rules.window.closes_at {
        self.schedule.schedule(subject.subject_id, closes_at);
        seeded += 1;
      }
    }
    info!(seeded, "window schedule seeded");
    Ok(seeded)
  }

  /// Close every subject whose deadline has passed. Returns the subjects
  /// that were actually resolved.
  pub async fn tick(&self) -> Vec<Uuid> {
    let now = self.clock.now();
    let mut closed = vec![];
    for subject_id in self.schedule.due(now) {
      match self.close_elapsed(subject_id).await {
        Ok(true) => closed.push(subject_id),
        Ok(false) => debug!(%subject_id, "deadline passed, nothing to close"),
        Err(err) => {
          warn!(%subject_id, error = %err, "forced close failed, requeueing");
          self.schedule.schedule(subject_id, now + self.requeue_after);
        }
      }
    }
    self.locks.prune();
    closed
  }

  /// Tick every `interval` until `shutdown` resolves.
  pub async fn run_scheduler(&self, interval: Duration, shutdown: impl Future<Output = ()>) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    tokio::pin!(shutdown);

    info!(?interval, "window scheduler started");
    loop {
      tokio::select! {
        _ = &mut shutdown => break,
        _ = ticker.tick() => {
          let closed = self.tick().await;
          if !closed.is_empty() {
            info!(count = closed.len(), "closed elapsed subjects");
          }
        }
      }
    }
    info!("window scheduler stopped");
  }

  /// Closed-phase resolution of one subject through the serialized path.
  async fn close_elapsed(&self, subject_id: Uuid) -> Result<bool> {
    let _guard = self.lock(subject_id).await?;
    let Some(subject) = self
      .store_call("get_subject", || self.store.get_subject(subject_id))
      .await?
    else {
      return Ok(false);
    };
    if !subject.status.is_open() {
      return Ok(false);
    }

    let window = subject.rules.window;
    if !window.has_closed(self.clock.now()) {
      // The window was extended or cleared after this deadline was queued.
      if let Some(closes_at) = window.closes_at {
        self.schedule.schedule(subject_id, closes_at);
      }
      return Ok(false);
    }

    let (subject, _) = self
      .resolve(subject, Phase::Closed, ResolutionTrigger::WindowClosed)
      .await?;
    info!(%subject_id, status = %subject.status, "voting window closed");
    Ok(true)
  }
}
