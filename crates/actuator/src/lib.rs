//! Actuator board boundary: wire commands, the line protocol and the probe.

pub mod command;
pub mod error;
pub mod link;
pub mod probe;

pub use command::{ActuatorCommand, ActuatorReply};
pub use error::ActuatorError;
pub use link::{open_link, ActuatorLink, DryRunLink, LineActuator};
pub use probe::{run_probe, ProbeStep, PROBE_SEQUENCE};
