//! Pushover push notifier.

use std::sync::Arc;

use smartcam_core::config::PushoverConfig;

use crate::templating::TemplateRenderer;
use crate::traits::{NotificationEvent, Notifier, NotifyError};

/// Sends push messages through the Pushover messages API.
///
/// Urgent events (unknown person, alarm on, actuator fault) go out with
/// priority 1, everything else with priority 0.
#[derive(Debug)]
pub struct PushoverNotifier {
    api_url: String,
    api_token: String,
    user_key: String,
    renderer: Arc<TemplateRenderer>,
    client: reqwest::Client,
}

impl PushoverNotifier {
    pub fn from_config(config: &PushoverConfig, renderer: Arc<TemplateRenderer>) -> Result<Self, NotifyError> {
        if config.api_token.is_empty() || config.user_key.is_empty() {
            return Err(NotifyError::Config("pushover api_token and user_key are required".into()));
        }
        Ok(Self {
            api_url: config.api_url.clone(),
            api_token: config.api_token.clone(),
            user_key: config.user_key.clone(),
            renderer,
            client: reqwest::Client::new(),
        })
    }

    /// Form fields posted for `event`.
    pub fn form(&self, event: &NotificationEvent) -> Result<Vec<(&'static str, String)>, NotifyError> {
        let priority = if event.kind.is_urgent() { "1" } else { "0" };
        Ok(vec![
            ("token", self.api_token.clone()),
            ("user", self.user_key.clone()),
            ("title", self.renderer.subject(event)?),
            ("message", self.renderer.summary(event)?),
            ("priority", priority.to_string()),
            ("timestamp", event.timestamp.timestamp().to_string()),
        ])
    }
}

#[async_trait::async_trait]
impl Notifier for PushoverNotifier {
    async fn send(&self, event: &NotificationEvent) -> Result<(), NotifyError> {
        let form = self.form(event)?;
        let response = self.client.post(&self.api_url).form(&form).send().await?;
        let status = response.status();

        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(NotifyError::Rejected {
                channel: "pushover",
                status: status.as_u16(),
                body,
            });
        }

        tracing::debug!(kind = event.kind.key(), %status, "pushover notification delivered");
        Ok(())
    }

    fn channel_name(&self) -> &str {
        "pushover"
    }
}
