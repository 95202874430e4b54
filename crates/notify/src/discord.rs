//! Discord chat webhook notifier.
//!
//! Posts a short message plus one embed whose fields carry the event
//! details. Discord answers a successful post with `204 No Content`.

use std::sync::Arc;

use serde_json::{json, Value};
use smartcam_core::config::DiscordConfig;

use crate::templating::TemplateRenderer;
use crate::traits::{EventKind, NotificationEvent, Notifier, NotifyError};

const RED: u32 = 0xff0000;
const GREEN: u32 = 0x00ff00;

#[derive(Debug)]
pub struct DiscordNotifier {
    webhook_url: String,
    renderer: Arc<TemplateRenderer>,
    client: reqwest::Client,
}

impl DiscordNotifier {
    pub fn from_config(config: &DiscordConfig, renderer: Arc<TemplateRenderer>) -> Result<Self, NotifyError> {
        if config.webhook_url.trim().is_empty() {
            return Err(NotifyError::Config("discord webhook_url is empty".into()));
        }
        Ok(Self {
            webhook_url: config.webhook_url.clone(),
            renderer,
            client: reqwest::Client::new(),
        })
    }

    /// Build the webhook JSON payload for `event`.
    pub fn payload(&self, event: &NotificationEvent) -> Result<Value, NotifyError> {
        let data = &event.data;
        let mut fields = vec![
            field("Time", &event.display_time(), true),
            field("Location", &data.location, true),
        ];
        if let Some(confidence) = data.confidence {
            fields.push(field("Confidence", &format!("{confidence:.1}"), true));
        }
        if matches!(event.kind, EventKind::AlarmOn | EventKind::AlarmOff) {
            if let Some(state) = &data.label {
                fields.push(field("Status", state, true));
            }
        }
        if let Some(reason) = &data.reason {
            fields.push(field("Reason", reason, false));
        }

        let color = if event.kind.is_urgent() { RED } else { GREEN };
        Ok(json!({
            "content": format!("**{}**", self.renderer.subject(event)?),
            "embeds": [{
                "title": event.kind.title(),
                "description": self.renderer.summary(event)?,
                "color": color,
                "timestamp": event.timestamp.to_rfc3339(),
                "fields": fields,
                "footer": { "text": "SmartCam Security System" },
            }],
        }))
    }
}

fn field(name: &str, value: &str, inline: bool) -> Value {
    json!({ "name": name, "value": value, "inline": inline })
}

#[async_trait::async_trait]
impl Notifier for DiscordNotifier {
    async fn send(&self, event: &NotificationEvent) -> Result<(), NotifyError> {
        let payload = self.payload(event)?;
        let response = self.client.post(&self.webhook_url).json(&payload).send().await?;
        let status = response.status();

        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(NotifyError::Rejected {
                channel: "discord",
                status: status.as_u16(),
                body,
            });
        }

        tracing::debug!(kind = event.kind.key(), %status, "discord notification delivered");
        Ok(())
    }

    fn channel_name(&self) -> &str {
        "discord"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smartcam_core::ThreatState;

    fn notifier() -> DiscordNotifier {
        let config = DiscordConfig {
            enabled: true,
            webhook_url: "https://discord.example/api/webhooks/1/abc".into(),
        };
        DiscordNotifier::from_config(&config, Arc::new(TemplateRenderer::new())).unwrap()
    }

    #[test]
    fn unknown_person_embed_is_red_with_confidence() {
        let payload = notifier()
            .payload(&NotificationEvent::unknown_person(81.27, "Front Camera", None))
            .unwrap();
        let embed = &payload["embeds"][0];
        assert_eq!(embed["color"], RED);
        assert_eq!(embed["title"], "Unknown Person Detected");
        assert_eq!(embed["footer"]["text"], "SmartCam Security System");
        let names: Vec<&str> = embed["fields"]
            .as_array()
            .unwrap()
            .iter()
            .map(|f| f["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["Time", "Location", "Confidence"]);
        assert_eq!(embed["fields"][2]["value"], "81.3");
    }

    #[test]
    fn alarm_off_embed_is_green_with_status_and_reason() {
        let payload = notifier()
            .payload(&NotificationEvent::alarm(
                ThreatState::Off,
                "No unknown persons detected",
                "Front Camera",
            ))
            .unwrap();
        let embed = &payload["embeds"][0];
        assert_eq!(embed["color"], GREEN);
        assert_eq!(embed["fields"][2]["name"], "Status");
        assert_eq!(embed["fields"][2]["value"], "OFF");
        assert_eq!(embed["fields"][3]["name"], "Reason");
        assert_eq!(embed["fields"][3]["inline"], false);
        assert_eq!(payload["content"], "**SmartCam: Alarm OFF**");
    }

    #[test]
    fn empty_url_is_rejected() {
        let config = DiscordConfig {
            enabled: true,
            webhook_url: String::new(),
        };
        assert!(DiscordNotifier::from_config(&config, Arc::new(TemplateRenderer::new())).is_err());
    }
}
