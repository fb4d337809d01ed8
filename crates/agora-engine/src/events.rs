//! Event publishers shipped with the engine.

use agora_core::event::{EventPublisher, SubjectEvent};
use tokio::sync::broadcast;
use tracing::info;

/// Writes every event to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogPublisher;

impl EventPublisher for LogPublisher {
  fn publish(&self, event: SubjectEvent) {
    info!(
      subject_id = %event.subject_id,
      kind = %event.kind,
      previous = %event.previous,
      status = %event.status,
      "subject event"
    );
  }
}

/// Fans events out to in-process subscribers over a broadcast channel.
///
/// Slow subscribers lose the oldest events; publishing never waits.
#[derive(Debug, Clone)]
pub struct ChannelPublisher {
  tx: broadcast::Sender<SubjectEvent>,
}

impl ChannelPublisher {
  pub fn new(capacity: usize) -> Self {
    let (tx, _) = broadcast::channel(capacity);
    Self { tx }
  }

  pub fn subscribe(&self) -> broadcast::Receiver<SubjectEvent> { self.tx.subscribe() }
}

impl EventPublisher for ChannelPublisher {
  fn publish(&self, event: SubjectEvent) {
    // No subscribers is not an error.
    let _ = self.tx.send(event);
  }
}
