//! Notification sinks

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::CONTENT_TYPE;
use serde::Serialize;
use tracing::{info, warn};

use underlamp_config::NotifyConfig;
use underlamp_host_api::{HostError, HostResult, Notifier};

#[derive(Serialize)]
struct MarkdownBody<'a> {
    content: &'a str,
}

#[derive(Serialize)]
struct MarkdownMessage<'a> {
    msgtype: &'static str,
    markdown: MarkdownBody<'a>,
}

/// Render the webhook payload for a markdown message
pub fn markdown_payload(content: &str) -> String {
    let message = MarkdownMessage {
        msgtype: "markdown",
        markdown: MarkdownBody { content },
    };
    // Serializing two string fields cannot fail
    serde_json::to_string(&message).unwrap_or_default()
}

/// Group-chat robot webhook
pub struct WebhookNotifier {
    client: Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>, config: &NotifyConfig) -> HostResult<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.timeout)
            .build()
            .map_err(|e| HostError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn publish(&self, message: &str) -> bool {
        let result = self
            .client
            .post(&self.url)
            .header(CONTENT_TYPE, "application/json")
            .body(markdown_payload(message))
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => true,
            Ok(response) => {
                warn!(status = %response.status(), "Webhook rejected notification");
                false
            }
            Err(e) => {
                warn!(error = %e, "Webhook notification failed");
                false
            }
        }
    }
}

/// Writes notifications to the log only
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn publish(&self, message: &str) -> bool {
        info!(message, "Notification");
        true
    }
}

/// The webhook notifier when a URL is configured, the log notifier otherwise
pub fn notifier_from_config(
    config: &NotifyConfig,
) -> HostResult<std::sync::Arc<dyn Notifier>> {
    match &config.webhook_url {
        Some(url) => Ok(std::sync::Arc::new(WebhookNotifier::new(url.clone(), config)?)),
        None => {
            info!("No webhook configured, notifications go to the log");
            Ok(std::sync::Arc::new(LogNotifier))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn payload_shape() {
        let payload: serde_json::Value =
            serde_json::from_str(&markdown_payload("**[Start]** \"Steve\"")).unwrap();
        assert_eq!(payload["msgtype"], "markdown");
        assert_eq!(payload["markdown"]["content"], "**[Start]** \"Steve\"");
    }

    #[tokio::test]
    async fn log_notifier_always_delivers() {
        assert!(LogNotifier.publish("hello").await);
    }

    #[tokio::test]
    async fn unreachable_webhook_reports_failure() {
        let config = NotifyConfig {
            webhook_url: Some("http://127.0.0.1:1/send".into()),
            timeout: Duration::from_millis(200),
        };
        let notifier = notifier_from_config(&config).unwrap();
        assert!(!notifier.publish("hello").await);
    }
}
