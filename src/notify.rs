use crate::models::{Notification, NotificationKind};
use chrono::Utc;
use tokio::sync::broadcast;

const CHANNEL_CAPACITY: usize = 64;

/// Fan-out of user-facing notifications. Publishing with no subscribers is not an error.
#[derive(Clone)]
pub struct Notifier {
    sender: broadcast::Sender<Notification>,
}

impl Notifier {
    pub fn new() -> Self {
        let (sender, _receiver) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.sender.subscribe()
    }

    pub fn publish(&self, notification: Notification) {
        tracing::info!(
            notification_id = %notification.id,
            kind = ?notification.kind,
            title = %notification.title,
            "notification published"
        );
        let _ = self.sender.send(notification);
    }

    pub fn info(&self, title: impl Into<String>, message: impl Into<String>) {
        self.publish(build(NotificationKind::Info, title.into(), message.into()));
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new()
    }
}

pub fn build(kind: NotificationKind, title: String, message: String) -> Notification {
    Notification {
        id: uuid::Uuid::new_v4().to_string(),
        kind,
        title,
        message,
        created_at: Utc::now(),
    }
}
