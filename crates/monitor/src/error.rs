use smartcam_actuator::{ActuatorCommand, ActuatorError};
use thiserror::Error;

/// A command the controller could not get acknowledged.
#[derive(Debug, Error)]
pub enum AlarmError {
    #[error("{command} failed after {attempts} attempt(s): {source}")]
    Actuator {
        command: ActuatorCommand,
        attempts: u32,
        #[source]
        source: ActuatorError,
    },
}
