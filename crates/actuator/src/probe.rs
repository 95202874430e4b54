//! Bench check of a connected board.

use std::time::Duration;

use crate::command::{ActuatorCommand, ActuatorReply};
use crate::error::ActuatorError;
use crate::link::ActuatorLink;

/// Commands exercised by [`run_probe`], in order.
pub const PROBE_SEQUENCE: [ActuatorCommand; 7] = [
    ActuatorCommand::Status,
    ActuatorCommand::Arm,
    ActuatorCommand::Status,
    ActuatorCommand::AlarmOn,
    ActuatorCommand::Status,
    ActuatorCommand::AlarmOff,
    ActuatorCommand::Disarm,
];

#[derive(Debug)]
pub struct ProbeStep {
    pub command: ActuatorCommand,
    pub result: Result<ActuatorReply, ActuatorError>,
}

/// Walk the board through arm, alarm on/off and disarm, querying status in
/// between. The alarm is held on for `hold` before the status check.
/// Failures are recorded per step and do not stop the sequence, so the
/// board always ends disarmed when it is reachable.
pub async fn run_probe<L: ActuatorLink + ?Sized>(link: &mut L, hold: Duration) -> Vec<ProbeStep> {
    let mut steps = Vec::with_capacity(PROBE_SEQUENCE.len() + 1);
    for command in PROBE_SEQUENCE {
        let result = link.send(command).await;
        match &result {
            Ok(reply) => tracing::info!(%command, %reply, "probe step ok"),
            Err(e) => tracing::warn!(%command, error = %e, "probe step failed"),
        }
        steps.push(ProbeStep { command, result });
        if command == ActuatorCommand::AlarmOn {
            tokio::time::sleep(hold).await;
        }
    }

    let result = link.send(ActuatorCommand::Status).await;
    steps.push(ProbeStep {
        command: ActuatorCommand::Status,
        result,
    });
    steps
}
