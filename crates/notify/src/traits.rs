//! Notifier trait, notification events and shared error types.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Local};
use serde::Serialize;
use smartcam_core::ThreatState;

/// Errors that can occur during notification delivery.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{channel} returned {status}: {body}")]
    Rejected {
        channel: &'static str,
        status: u16,
        body: String,
    },

    #[error("SMTP delivery failed: {0}")]
    Smtp(String),

    #[error("attachment error: {0}")]
    Attachment(String),

    #[error("Template rendering failed: {0}")]
    Template(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("delivery timed out after {0:?}")]
    Timeout(Duration),
}

// ── Events ────────────────────────────────────────────────────

/// Kind of event being notified. The kind's key is also the cooldown key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    UnknownPerson,
    AlarmOn,
    AlarmOff,
    /// The actuator stopped answering; raised for the operator.
    ActuatorFault,
    /// Operator-triggered channel check.
    Test,
}

impl EventKind {
    pub fn key(self) -> &'static str {
        match self {
            EventKind::UnknownPerson => "unknown_person",
            EventKind::AlarmOn => "alarm_on",
            EventKind::AlarmOff => "alarm_off",
            EventKind::ActuatorFault => "actuator_fault",
            EventKind::Test => "test",
        }
    }

    /// Short human-readable headline.
    pub fn title(self) -> &'static str {
        match self {
            EventKind::UnknownPerson => "Unknown Person Detected",
            EventKind::AlarmOn => "Alarm ON",
            EventKind::AlarmOff => "Alarm OFF",
            EventKind::ActuatorFault => "Actuator Fault",
            EventKind::Test => "Test Notification",
        }
    }

    /// Whether push channels should deliver this with elevated priority.
    pub fn is_urgent(self) -> bool {
        matches!(
            self,
            EventKind::UnknownPerson | EventKind::AlarmOn | EventKind::ActuatorFault
        )
    }

    pub fn alarm(state: ThreatState) -> Self {
        match state {
            ThreatState::On => EventKind::AlarmOn,
            ThreatState::Off => EventKind::AlarmOff,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Event-specific fields carried by every channel rendering.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EventData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub location: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<PathBuf>,
}

/// A notification as handed to channels: `{event_type, timestamp, data}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NotificationEvent {
    #[serde(rename = "event_type")]
    pub kind: EventKind,
    pub timestamp: DateTime<Local>,
    pub data: EventData,
}

impl NotificationEvent {
    pub fn new(kind: EventKind, data: EventData) -> Self {
        Self {
            kind,
            timestamp: Local::now(),
            data,
        }
    }

    pub fn unknown_person(confidence: f64, location: &str, snapshot: Option<PathBuf>) -> Self {
        Self::new(
            EventKind::UnknownPerson,
            EventData {
                label: Some("unknown".into()),
                confidence: Some(confidence),
                location: location.to_string(),
                snapshot,
                ..EventData::default()
            },
        )
    }

    pub fn alarm(state: ThreatState, reason: &str, location: &str) -> Self {
        Self::new(
            EventKind::alarm(state),
            EventData {
                label: Some(state.as_str().to_string()),
                reason: Some(reason.to_string()),
                location: location.to_string(),
                ..EventData::default()
            },
        )
    }

    pub fn actuator_fault(detail: &str, location: &str) -> Self {
        Self::new(
            EventKind::ActuatorFault,
            EventData {
                reason: Some(detail.to_string()),
                location: location.to_string(),
                ..EventData::default()
            },
        )
    }

    pub fn test(location: &str) -> Self {
        Self::new(
            EventKind::Test,
            EventData {
                reason: Some("Channel check requested by operator".into()),
                location: location.to_string(),
                ..EventData::default()
            },
        )
    }

    /// Local time formatted for message bodies.
    pub fn display_time(&self) -> String {
        self.timestamp.format("%Y-%m-%d %H:%M:%S").to_string()
    }
}

// ── Channels ──────────────────────────────────────────────────

/// Trait for notification channel implementations.
#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver one event through this channel.
    async fn send(&self, event: &NotificationEvent) -> Result<(), NotifyError>;

    /// Human-readable name for this channel (e.g., "webhook", "email").
    fn channel_name(&self) -> &str;
}

/// Result of delivering an event to a single channel.
#[derive(Debug, Clone)]
pub struct DispatchResult {
    pub channel: String,
    pub kind: EventKind,
    pub success: bool,
    pub error: Option<String>,
    pub duration_ms: u64,
}
