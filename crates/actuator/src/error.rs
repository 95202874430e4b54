use std::time::Duration;

use thiserror::Error;

use crate::command::ActuatorCommand;

/// Failures of the actuator transport and line protocol.
#[derive(Debug, Error)]
pub enum ActuatorError {
    #[error("failed to open actuator port {port}: {source}")]
    Open {
        port: String,
        #[source]
        source: std::io::Error,
    },

    #[error("actuator IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("no reply to {command} within {after:?}")]
    Timeout {
        command: ActuatorCommand,
        after: Duration,
    },

    #[error("short reply to {command}: got {got} of 2 lines")]
    ShortReply { command: ActuatorCommand, got: usize },

    #[error("malformed reply to {command}: {reason}")]
    Malformed { command: ActuatorCommand, reason: String },

    #[error("{command} rejected by actuator: {ack}")]
    Rejected { command: ActuatorCommand, ack: String },

    #[error("invalid actuator address: {0}")]
    Address(String),
}
