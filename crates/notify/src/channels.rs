//! Builds the enabled channels from configuration.

use std::sync::Arc;

use smartcam_core::config::NotifyConfig;

use crate::discord::DiscordNotifier;
use crate::email::EmailNotifier;
use crate::pushover::PushoverNotifier;
use crate::templating::TemplateRenderer;
use crate::traits::{Notifier, NotifyError};
use crate::webhook::WebhookNotifier;

/// One notifier per enabled channel, in the order email, webhook, discord,
/// pushover. A misconfigured enabled channel is an error.
pub fn build_channels(
    config: &NotifyConfig,
    renderer: Arc<TemplateRenderer>,
) -> Result<Vec<Box<dyn Notifier>>, NotifyError> {
    let mut channels: Vec<Box<dyn Notifier>> = Vec::new();

    if config.email.enabled {
        channels.push(Box::new(EmailNotifier::from_config(&config.email, renderer.clone())?));
    }
    if config.webhook.enabled {
        channels.push(Box::new(WebhookNotifier::from_config(&config.webhook)?));
    }
    if config.discord.enabled {
        channels.push(Box::new(DiscordNotifier::from_config(&config.discord, renderer.clone())?));
    }
    if config.pushover.enabled {
        channels.push(Box::new(PushoverNotifier::from_config(&config.pushover, renderer)?));
    }

    Ok(channels)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nothing_enabled_builds_nothing() {
        let channels = build_channels(&NotifyConfig::default(), Arc::new(TemplateRenderer::new())).unwrap();
        assert!(channels.is_empty());
    }

    #[test]
    fn enabled_channels_in_fixed_order() {
        let mut config = NotifyConfig::default();
        config.pushover.enabled = true;
        config.pushover.user_key = "u".into();
        config.pushover.api_token = "t".into();
        config.webhook.enabled = true;
        config.webhook.url = "http://127.0.0.1:9/hook".into();

        let channels = build_channels(&config, Arc::new(TemplateRenderer::new())).unwrap();
        let names: Vec<&str> = channels.iter().map(|c| c.channel_name()).collect();
        assert_eq!(names, vec!["webhook", "pushover"]);
    }

    #[test]
    fn misconfigured_channel_is_an_error() {
        let mut config = NotifyConfig::default();
        config.discord.enabled = true;
        assert!(build_channels(&config, Arc::new(TemplateRenderer::new())).is_err());
    }
}
