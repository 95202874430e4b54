//! Minijinja template rendering for notification messages.
//!
//! Subjects and bodies are rendered from a [`TemplateContext`] built from
//! the event. Default templates cover every event kind; custom ones are
//! syntax-checked when the renderer is built.

use crate::traits::{NotificationEvent, NotifyError};

/// Default email subject / push title.
pub const DEFAULT_SUBJECT: &str = "SmartCam: {{ title }}";

/// Default long-form body (email).
pub const DEFAULT_BODY: &str = "\
SmartCam Security System Alert

Event: {{ title }}
Time: {{ time }}
Location: {{ location }}
{% if label %}Identity: {{ label }}
{% endif %}{% if confidence is not none %}Confidence Score: {{ confidence | round(1) }}
{% endif %}{% if reason %}Reason: {{ reason }}
{% endif %}{% if snapshot %}
A snapshot of the scene is attached.
Please verify whether this person is authorized.
{% endif %}
This is an automated security notification from your SmartCam system.
";

/// Default one-line summary (push and chat channels).
pub const DEFAULT_SUMMARY: &str = "\
{{ title }} at {{ time }}\
{% if confidence is not none %} (confidence: {{ confidence | round(1) }}){% endif %}\
{% if reason %} - {{ reason }}{% endif %}";

/// Event data exposed to templates.
#[derive(Debug, Clone, serde::Serialize)]
pub struct TemplateContext {
    /// Event key, e.g. `"unknown_person"`.
    pub event_type: String,
    /// Headline, e.g. `"Unknown Person Detected"`.
    pub title: String,
    /// ISO 8601 timestamp.
    pub timestamp: String,
    /// Local time, `%Y-%m-%d %H:%M:%S`.
    pub time: String,
    pub label: Option<String>,
    pub confidence: Option<f64>,
    pub reason: Option<String>,
    pub location: String,
    pub snapshot: Option<String>,
}

impl TemplateContext {
    pub fn from_event(event: &NotificationEvent) -> Self {
        Self {
            event_type: event.kind.key().to_string(),
            title: event.kind.title().to_string(),
            timestamp: event.timestamp.to_rfc3339(),
            time: event.display_time(),
            label: event.data.label.clone(),
            confidence: event.data.confidence,
            reason: event.data.reason.clone(),
            location: event.data.location.clone(),
            snapshot: event.data.snapshot.as_ref().map(|p| p.display().to_string()),
        }
    }
}

/// Renders notification subjects, bodies and summaries.
#[derive(Debug, Clone)]
pub struct TemplateRenderer {
    subject: String,
    body: String,
    summary: String,
}

impl TemplateRenderer {
    /// A renderer using the default templates.
    pub fn new() -> Self {
        Self {
            subject: DEFAULT_SUBJECT.to_string(),
            body: DEFAULT_BODY.to_string(),
            summary: DEFAULT_SUMMARY.to_string(),
        }
    }

    /// Replace the subject and body templates, checking their syntax.
    pub fn with_templates(subject: &str, body: &str) -> Result<Self, NotifyError> {
        let renderer = Self {
            subject: subject.to_string(),
            body: body.to_string(),
            ..Self::new()
        };
        renderer.validate(subject)?;
        renderer.validate(body)?;
        Ok(renderer)
    }

    /// Build a configured minijinja environment with custom filters.
    fn build_env() -> minijinja::Environment<'static> {
        let mut env = minijinja::Environment::new();
        env.add_filter("round", round_filter);
        env
    }

    /// Render a template string against `event`.
    pub fn render(&self, template_str: &str, event: &NotificationEvent) -> Result<String, NotifyError> {
        let env = Self::build_env();
        env.render_str(template_str, TemplateContext::from_event(event))
            .map_err(|e| NotifyError::Template(e.to_string()))
    }

    pub fn subject(&self, event: &NotificationEvent) -> Result<String, NotifyError> {
        self.render(&self.subject, event)
    }

    pub fn body(&self, event: &NotificationEvent) -> Result<String, NotifyError> {
        self.render(&self.body, event)
    }

    pub fn summary(&self, event: &NotificationEvent) -> Result<String, NotifyError> {
        self.render(&self.summary, event)
    }

    /// Check that a template string parses without evaluating it.
    pub fn validate(&self, template_str: &str) -> Result<(), NotifyError> {
        let env = Self::build_env();
        env.template_from_str(template_str)
            .map_err(|e| NotifyError::Template(e.to_string()))?;
        Ok(())
    }
}

impl Default for TemplateRenderer {
    fn default() -> Self {
        Self::new()
    }
}

/// Custom filter: round a float to N decimal places.
fn round_filter(value: f64, decimals: Option<u32>) -> String {
    let n = decimals.unwrap_or(0);
    format!("{:.prec$}", value, prec = n as usize)
}
