/// Best-effort user notifications
///
/// Used to tell a release's creator that their definition could not be deployed.
/// Delivery failures are logged and otherwise ignored.

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub user_id: String,
    pub title: String,
    pub message: String,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: Notification);
}

/// Posts notifications as JSON to a notification service
#[derive(Debug, Clone)]
pub struct HttpNotifier {
    client: Client,
    url: String,
}

impl HttpNotifier {
    pub fn new(client: Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl Notifier for HttpNotifier {
    async fn notify(&self, notification: Notification) {
        let result = self.client.post(&self.url).json(&notification).send().await;
        match result {
            Ok(response) if response.status().is_success() => {
                tracing::debug!("📨 Notified {}: {}", notification.user_id, notification.title);
            }
            Ok(response) => {
                tracing::warn!(
                    "⚠️ Notification for {} rejected with status {}",
                    notification.user_id,
                    response.status()
                );
            }
            Err(e) => {
                tracing::warn!(
                    "⚠️ Unable to deliver notification for {}: {}",
                    notification.user_id,
                    e.without_url()
                );
            }
        }
    }
}

/// Fallback when no notification service is configured
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, notification: Notification) {
        tracing::info!(
            "📨 Notification for {}: {} - {}",
            notification.user_id,
            notification.title,
            notification.message
        );
    }
}
