use anyhow::Context;
use async_trait::async_trait;

use super::{Notification, NotificationSender};

const FCM_URL: &str = "https://fcm.googleapis.com/fcm/send";

pub struct FcmPushSender {
    server_key: String,
    client: reqwest::Client,
}

impl FcmPushSender {
    pub fn new(server_key: String) -> Self {
        Self {
            server_key,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl NotificationSender for FcmPushSender {
    async fn send(&self, note: &Notification) -> anyhow::Result<()> {
        for token in &note.device_tokens {
            let payload = serde_json::json!({
                "to": token,
                "notification": {
                    "title": note.title,
                    "body": note.body,
                },
                "priority": "high",
            });

            self.client
                .post(FCM_URL)
                .header("Authorization", format!("key={}", self.server_key))
                .json(&payload)
                .send()
                .await
                .context("failed to reach FCM")?
                .error_for_status()
                .context("FCM returned error")?;
        }

        Ok(())
    }
}
