//! Shared event contracts between the tick loop, the event log and the
//! notification layer.

use std::fmt;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

// ── Classification ────────────────────────────────────────────

/// Who the face classifier thinks is in front of the camera.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Identity {
    /// An enrolled person.
    Known(String),
    /// A face was found but matched nobody closely enough.
    Unknown,
    /// No face region was found.
    None,
}

impl Identity {
    pub fn label(&self) -> &str {
        match self {
            Identity::Known(name) => name,
            Identity::Unknown => "unknown",
            Identity::None => "none",
        }
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Identity::Unknown)
    }

    /// Whether a face region was found at all.
    pub fn has_face(&self) -> bool {
        !matches!(self, Identity::None)
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Result of classifying one frame.
///
/// `confidence` is the recognizer's match distance: lower is better and
/// `0.0` is used when no face was found.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub identity: Identity,
    pub confidence: f64,
}

impl Classification {
    pub fn none() -> Self {
        Self {
            identity: Identity::None,
            confidence: 0.0,
        }
    }

    pub fn unknown(confidence: f64) -> Self {
        Self {
            identity: Identity::Unknown,
            confidence,
        }
    }

    pub fn known(name: impl Into<String>, confidence: f64) -> Self {
        Self {
            identity: Identity::Known(name.into()),
            confidence,
        }
    }
}

// ── Alarm state ───────────────────────────────────────────────

/// The dynamic threat alarm, distinct from session arming.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum ThreatState {
    #[default]
    Off,
    On,
}

impl ThreatState {
    pub fn is_on(self) -> bool {
        self == ThreatState::On
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ThreatState::Off => "OFF",
            ThreatState::On => "ON",
        }
    }
}

impl fmt::Display for ThreatState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Event log records ─────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Motion,
    FaceDetection,
    Alarm,
}

impl EventType {
    pub fn as_str(self) -> &'static str {
        match self {
            EventType::Motion => "motion",
            EventType::FaceDetection => "face_detection",
            EventType::Alarm => "alarm",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "motion" => Some(EventType::Motion),
            "face_detection" => Some(EventType::FaceDetection),
            "alarm" => Some(EventType::Alarm),
            _ => None,
        }
    }
}

/// One row of the event log.
///
/// For alarm records `label` is the new threat state (`ON`/`OFF`); for face
/// detections it is the identity label; motion records use `none`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub timestamp: DateTime<Local>,
    pub event_type: EventType,
    pub label: String,
    pub confidence: f64,
    pub motion_score: u64,
    pub alarm_state: bool,
}

impl EventRecord {
    pub fn motion(motion_score: u64, alarm: ThreatState) -> Self {
        Self {
            timestamp: Local::now(),
            event_type: EventType::Motion,
            label: "none".to_string(),
            confidence: 0.0,
            motion_score,
            alarm_state: alarm.is_on(),
        }
    }

    pub fn face(classification: &Classification, motion_score: u64, alarm: ThreatState) -> Self {
        Self {
            timestamp: Local::now(),
            event_type: EventType::FaceDetection,
            label: classification.identity.label().to_string(),
            confidence: classification.confidence,
            motion_score,
            alarm_state: alarm.is_on(),
        }
    }

    /// Record of a threat transition into `state`.
    pub fn alarm(state: ThreatState, motion_score: u64) -> Self {
        Self {
            timestamp: Local::now(),
            event_type: EventType::Alarm,
            label: state.as_str().to_string(),
            confidence: 0.0,
            motion_score,
            alarm_state: state.is_on(),
        }
    }
}

// ── Session statistics ────────────────────────────────────────

/// Aggregate counts for one monitoring session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStats {
    pub total_frames: u64,
    pub motion_frames: u64,
    pub face_detections: u64,
    pub unknown_detections: u64,
    pub known_detections: u64,
    pub alarm_triggers: u64,
    pub actuator_faults: u64,
}

impl SessionStats {
    pub fn frame(&mut self) {
        self.total_frames += 1;
    }

    /// Count a record as it is written to the event log.
    pub fn observe(&mut self, record: &EventRecord) {
        match record.event_type {
            EventType::Motion => self.motion_frames += 1,
            EventType::FaceDetection => {
                self.face_detections += 1;
                match record.label.as_str() {
                    "unknown" => self.unknown_detections += 1,
                    "none" => {}
                    _ => self.known_detections += 1,
                }
            }
            EventType::Alarm => {
                if record.label == ThreatState::On.as_str() {
                    self.alarm_triggers += 1;
                }
            }
        }
    }

    pub fn motion_percentage(&self) -> Option<f64> {
        (self.total_frames > 0)
            .then(|| self.motion_frames as f64 / self.total_frames as f64 * 100.0)
    }
}

impl fmt::Display for SessionStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== SESSION STATISTICS ===")?;
        writeln!(f, "Total frames processed: {}", self.total_frames)?;
        writeln!(f, "Frames with motion: {}", self.motion_frames)?;
        writeln!(f, "Face detections: {}", self.face_detections)?;
        writeln!(f, "Known person detections: {}", self.known_detections)?;
        writeln!(f, "Unknown person detections: {}", self.unknown_detections)?;
        writeln!(f, "Alarm triggers: {}", self.alarm_triggers)?;
        if self.actuator_faults > 0 {
            writeln!(f, "Actuator faults: {}", self.actuator_faults)?;
        }
        if let Some(pct) = self.motion_percentage() {
            writeln!(f, "Motion percentage: {pct:.1}%")?;
        }
        Ok(())
    }
}
