//! Generic HTTP webhook notifier.
//!
//! Delivers the event itself as the JSON body
//! (`{event_type, timestamp, data}`) with optional custom headers.

use std::collections::HashMap;

use smartcam_core::config::WebhookConfig;

use crate::traits::{NotificationEvent, Notifier, NotifyError};

/// Delivers notifications as JSON over HTTP to a configured endpoint.
#[derive(Debug)]
pub struct WebhookNotifier {
    url: String,
    /// Custom headers to include on every request.
    headers: HashMap<String, String>,
    /// Shared HTTP client (connection pooling).
    client: reqwest::Client,
}

impl WebhookNotifier {
    pub fn new(url: String, headers: HashMap<String, String>) -> Result<Self, NotifyError> {
        if url.trim().is_empty() {
            return Err(NotifyError::Config("webhook url is empty".into()));
        }
        for key in headers.keys() {
            reqwest::header::HeaderName::from_bytes(key.as_bytes())
                .map_err(|_| NotifyError::Config(format!("invalid webhook header name: {key}")))?;
        }
        Ok(Self {
            url,
            headers,
            client: reqwest::Client::new(),
        })
    }

    pub fn from_config(config: &WebhookConfig) -> Result<Self, NotifyError> {
        Self::new(config.url.clone(), config.headers.clone())
    }
}

#[async_trait::async_trait]
impl Notifier for WebhookNotifier {
    async fn send(&self, event: &NotificationEvent) -> Result<(), NotifyError> {
        let mut request = self.client.post(&self.url).json(event);
        for (key, value) in &self.headers {
            request = request.header(key.as_str(), value.as_str());
        }

        let response = request.send().await?;
        let status = response.status();

        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(NotifyError::Rejected {
                channel: "webhook",
                status: status.as_u16(),
                body,
            });
        }

        tracing::debug!(url = %self.url, status = %status, "webhook notification delivered");
        Ok(())
    }

    fn channel_name(&self) -> &str {
        "webhook"
    }
}
