use tokio::sync::{mpsc, oneshot};

use crate::cache::{FetchReply, Request};

/// Lifecycle events delivered by the host runtime.
#[derive(Debug)]
pub enum WorkerEvent {
  /// First installation of this worker version
  Install,
  /// This version has become the active worker
  Activate,
  /// An intercepted network request; the reply goes back over the channel
  Fetch {
    request: Request,
    reply: oneshot::Sender<FetchReply>,
  },
  /// A background sync opportunity
  Sync { tag: String },
  /// A push message arrived (its body is never read)
  Push,
  /// The user clicked a notification, possibly on one of its actions
  NotificationClick { action: Option<String> },
}

/// Queue adapter between the host event source and the worker loop.
///
/// The worker awaits each handler to completion before taking the next
/// event, which is how the host's hold-until-settled contract is honored.
/// The loop ends once every sender is dropped.
pub struct EventQueue {
  rx: mpsc::UnboundedReceiver<WorkerEvent>,
}

/// Create a connected sender/queue pair.
pub fn channel() -> (mpsc::UnboundedSender<WorkerEvent>, EventQueue) {
  let (tx, rx) = mpsc::unbounded_channel();
  (tx, EventQueue { rx })
}

impl EventQueue {
  /// Receive the next event, or `None` once the queue is closed.
  pub async fn next(&mut self) -> Option<WorkerEvent> {
    self.rx.recv().await
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn test_events_arrive_in_order() {
    let (tx, mut queue) = channel();
    tx.send(WorkerEvent::Install).unwrap();
    tx.send(WorkerEvent::Activate).unwrap();
    drop(tx);

    assert!(matches!(queue.next().await, Some(WorkerEvent::Install)));
    assert!(matches!(queue.next().await, Some(WorkerEvent::Activate)));
    assert!(queue.next().await.is_none());
  }
}
