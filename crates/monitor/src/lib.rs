//! The SmartCam detection-and-alarm loop.
//!
//! [`AlarmController`] is the threat state machine; [`Monitor`] wires it to
//! the motion gate, the face classifier, the event log and the notification
//! dispatcher, one frame per tick.

pub mod controller;
pub mod error;
pub mod monitor;

pub use controller::{AlarmController, ControllerSettings, Transition, REASON_ALL_CLEAR, REASON_UNKNOWN_PERSON};
pub use error::AlarmError;
pub use monitor::{Monitor, MonitorSettings, SessionSummary, TickOutcome};
