pub mod email;
pub mod push;

use std::sync::Arc;

use async_trait::async_trait;

/// A message for one recipient, addressed by email with any registered
/// push device tokens resolved up front.
#[derive(Debug, Clone)]
pub struct Notification {
    pub recipient_email: String,
    pub device_tokens: Vec<String>,
    pub title: String,
    pub body: String,
}

#[async_trait]
pub trait NotificationSender: Send + Sync {
    async fn send(&self, note: &Notification) -> anyhow::Result<()>;
}

/// Fans each notification out to every configured channel on a spawned
/// task. Delivery is best-effort: failures are logged and never reach the
/// caller, so a dropped email cannot roll back a booking transition.
#[derive(Clone)]
pub struct Dispatcher {
    senders: Vec<Arc<dyn NotificationSender>>,
}

impl Dispatcher {
    pub fn new(senders: Vec<Arc<dyn NotificationSender>>) -> Self {
        Self { senders }
    }

    pub fn dispatch(&self, notes: Vec<Notification>) {
        for note in notes {
            for sender in &self.senders {
                let sender = Arc::clone(sender);
                let note = note.clone();
                tokio::spawn(async move {
                    if let Err(e) = sender.send(&note).await {
                        tracing::warn!(
                            error = %e,
                            to = %note.recipient_email,
                            title = %note.title,
                            "notification delivery failed"
                        );
                    }
                });
            }
        }
    }
}
