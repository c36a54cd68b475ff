//! Webhook notification emission.
//!
//! Notifications are fire-and-forget: delivery failure is logged and
//! swallowed, never surfaced to the pipeline stage that emitted it.

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

use rpilot_models::NotificationKind;

use crate::ports::Notifier;

/// Posts operator notifications to a configured webhook.
pub struct WebhookNotifier {
    webhook_url: Option<String>,
    client: Client,
}

#[derive(Debug, Serialize)]
struct NotificationPayload<'a> {
    channel_id: &'a str,
    kind: &'a str,
    message: &'a str,
    metadata: Value,
}

impl WebhookNotifier {
    /// Create a notifier from environment variables.
    ///
    /// A missing `NOTIFY_WEBHOOK_URL` disables emission rather than failing;
    /// notification delivery is optional everywhere.
    pub fn from_env() -> Self {
        Self::new(std::env::var("NOTIFY_WEBHOOK_URL").ok())
    }

    pub fn new(webhook_url: Option<String>) -> Self {
        Self {
            webhook_url,
            client: Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_default(),
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn emit(&self, channel_id: &str, kind: NotificationKind, message: &str, metadata: Value) {
        let Some(url) = self.webhook_url.as_deref() else {
            debug!(kind = %kind, "Notification emission disabled, dropping");
            return;
        };

        let payload = NotificationPayload {
            channel_id,
            kind: kind.as_str(),
            message,
            metadata,
        };

        match self.client.post(url).json(&payload).send().await {
            Ok(response) if response.status().is_success() => {
                debug!(channel_id = %channel_id, kind = %kind, "Notification delivered");
            }
            Ok(response) => {
                warn!(
                    channel_id = %channel_id,
                    kind = %kind,
                    status = response.status().as_u16(),
                    "Notification webhook rejected payload"
                );
            }
            Err(e) => {
                warn!(channel_id = %channel_id, kind = %kind, "Notification delivery failed: {}", e);
            }
        }
    }
}
