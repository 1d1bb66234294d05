//! App-wide notifications for sibling panels.
//!
//! A typed broadcast channel handed to every collaborator. Publishing never fails:
//! with nobody listening the notification is simply dropped.

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::debug;

const DEFAULT_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Notification {
    NewChart { chart_id: String },
    NewScreener { screener_id: String },
    /// A turn failed and was rolled back; `message` is the user-facing toast text.
    TurnFailed { chat_id: String, message: String },
}

#[derive(Debug, Clone)]
pub struct Notifier {
    tx: broadcast::Sender<Notification>,
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl Notifier {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.tx.subscribe()
    }

    /// Returns how many subscribers received the notification.
    pub fn publish(&self, notification: Notification) -> usize {
        debug!(?notification, "publishing");
        self.tx.send(notification).unwrap_or(0)
    }
}
