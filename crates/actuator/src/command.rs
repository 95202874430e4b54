//! Actuator wire commands and replies.

use std::fmt;

/// Commands understood by the actuator board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActuatorCommand {
    /// Query state; never changes it.
    Status,
    /// Session arm, sent once at start.
    Arm,
    /// Session disarm, sent once at stop.
    Disarm,
    AlarmOn,
    AlarmOff,
}

impl ActuatorCommand {
    /// Line sent on the wire, without the terminating newline.
    pub fn wire(self) -> &'static str {
        match self {
            ActuatorCommand::Status => "<STATUS>",
            ActuatorCommand::Arm => "<ARM:1>",
            ActuatorCommand::Disarm => "<ARM:0>",
            ActuatorCommand::AlarmOn => "<ALARM:ON>",
            ActuatorCommand::AlarmOff => "<ALARM:OFF>",
        }
    }

    /// Whether the board's state can change as a result of this command.
    pub fn is_mutating(self) -> bool {
        !matches!(self, ActuatorCommand::Status)
    }
}

impl fmt::Display for ActuatorCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire())
    }
}

/// The two reply lines the board sends for every command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActuatorReply {
    pub ack: String,
    pub state: String,
}

impl fmt::Display for ActuatorReply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} | {}", self.ack, self.state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_strings_match_protocol() {
        assert_eq!(ActuatorCommand::Status.wire(), "<STATUS>");
        assert_eq!(ActuatorCommand::Arm.wire(), "<ARM:1>");
        assert_eq!(ActuatorCommand::Disarm.wire(), "<ARM:0>");
        assert_eq!(ActuatorCommand::AlarmOn.wire(), "<ALARM:ON>");
        assert_eq!(ActuatorCommand::AlarmOff.to_string(), "<ALARM:OFF>");
    }

    #[test]
    fn only_status_is_read_only() {
        assert!(!ActuatorCommand::Status.is_mutating());
        assert!(ActuatorCommand::AlarmOn.is_mutating());
        assert!(ActuatorCommand::Disarm.is_mutating());
    }
}
