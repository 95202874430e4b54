//! Threat alarm state machine.
//!
//! Consumes one (motion score, classification) pair per tick and decides
//! ON/OFF transitions, driving the actuator synchronously. State changes
//! are optimistic: the in-memory state moves even when the actuator does
//! not acknowledge, and the failure is handed back to the caller.

use smartcam_actuator::{ActuatorCommand, ActuatorLink, ActuatorReply};
use smartcam_core::{Classification, Config, ThreatState};

use crate::error::AlarmError;

pub const REASON_UNKNOWN_PERSON: &str = "Unknown person detected";
pub const REASON_ALL_CLEAR: &str = "No unknown persons detected";

/// Tuning for [`AlarmController`].
#[derive(Debug, Clone, Copy)]
pub struct ControllerSettings {
    /// Motion scores at or below this never affect the alarm.
    pub trigger_threshold: u64,
    /// Consecutive non-unknown motion ticks tolerated while ON.
    pub patience: u32,
    /// Extra attempts for a failed actuator command.
    pub retries: u32,
}

impl ControllerSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            trigger_threshold: config.motion.trigger_threshold,
            patience: config.alarm.patience,
            retries: config.actuator.retries,
        }
    }
}

/// A threat transition decided on this tick.
#[derive(Debug)]
pub struct Transition {
    pub state: ThreatState,
    pub reason: &'static str,
    /// Actuator outcome. The state above applies either way.
    pub delivery: Result<ActuatorReply, AlarmError>,
}

pub struct AlarmController<L> {
    link: L,
    settings: ControllerSettings,
    state: ThreatState,
    misses: u32,
    armed: bool,
}

impl<L: ActuatorLink> AlarmController<L> {
    pub fn new(link: L, settings: ControllerSettings) -> Self {
        Self {
            link,
            settings,
            state: ThreatState::Off,
            misses: 0,
            armed: false,
        }
    }

    pub fn state(&self) -> ThreatState {
        self.state
    }

    /// Consecutive non-unknown motion ticks since the alarm went ON.
    pub fn misses(&self) -> u32 {
        self.misses
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    pub fn link_mut(&mut self) -> &mut L {
        &mut self.link
    }

    /// Arm the session (`<ARM:1>`).
    pub async fn start(&mut self) -> Result<ActuatorReply, AlarmError> {
        self.armed = true;
        let reply = self.send(ActuatorCommand::Arm).await?;
        tracing::info!(endpoint = self.link.endpoint(), %reply, "session armed");
        Ok(reply)
    }

    /// Clear the alarm if it is ON, then disarm the session (`<ARM:0>`).
    ///
    /// Both commands are attempted even if the first fails; the first
    /// failure is returned.
    pub async fn stop(&mut self) -> Result<(), AlarmError> {
        let mut first_err = None;

        if self.state.is_on() {
            self.state = ThreatState::Off;
            self.misses = 0;
            if let Err(e) = self.send(ActuatorCommand::AlarmOff).await {
                first_err = Some(e);
            }
        }

        self.armed = false;
        match self.send(ActuatorCommand::Disarm).await {
            Ok(reply) => tracing::info!(%reply, "session disarmed"),
            Err(e) => {
                first_err.get_or_insert(e);
            }
        }

        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Query the board. Never changes controller state.
    pub async fn status(&mut self) -> Result<ActuatorReply, AlarmError> {
        self.send(ActuatorCommand::Status).await
    }

    /// Advance the state machine by one tick.
    pub async fn update(&mut self, motion_score: u64, classification: &Classification) -> Option<Transition> {
        if motion_score <= self.settings.trigger_threshold {
            return None;
        }

        let unknown = classification.identity.is_unknown();
        match (self.state, unknown) {
            (ThreatState::Off, true) => {
                self.state = ThreatState::On;
                self.misses = 0;
                Some(self.transition(ThreatState::On, REASON_UNKNOWN_PERSON).await)
            }
            (ThreatState::Off, false) => None,
            (ThreatState::On, true) => {
                self.misses = 0;
                None
            }
            (ThreatState::On, false) => {
                self.misses += 1;
                if self.misses > self.settings.patience {
                    self.state = ThreatState::Off;
                    self.misses = 0;
                    Some(self.transition(ThreatState::Off, REASON_ALL_CLEAR).await)
                } else {
                    None
                }
            }
        }
    }

    async fn transition(&mut self, state: ThreatState, reason: &'static str) -> Transition {
        let command = match state {
            ThreatState::On => ActuatorCommand::AlarmOn,
            ThreatState::Off => ActuatorCommand::AlarmOff,
        };
        tracing::info!(state = %state, reason, "threat alarm transition");
        Transition {
            state,
            reason,
            delivery: self.send(command).await,
        }
    }

    /// Send `command`, retrying up to the configured count.
    async fn send(&mut self, command: ActuatorCommand) -> Result<ActuatorReply, AlarmError> {
        let attempts = self.settings.retries + 1;
        let mut attempt = 1;
        loop {
            match self.link.send(command).await {
                Ok(reply) => return Ok(reply),
                Err(e) if attempt < attempts => {
                    tracing::warn!(%command, attempt, attempts, error = %e, "actuator command failed, retrying");
                    attempt += 1;
                }
                Err(source) => {
                    return Err(AlarmError::Actuator {
                        command,
                        attempts,
                        source,
                    })
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use smartcam_actuator::{ActuatorError, DryRunLink};
    use std::time::Duration;

    /// Link that fails the first `failures` sends with a timeout.
    struct FlakyLink {
        failures: usize,
        sent: Vec<ActuatorCommand>,
    }

    #[async_trait]
    impl ActuatorLink for FlakyLink {
        async fn send(&mut self, command: ActuatorCommand) -> Result<ActuatorReply, ActuatorError> {
            self.sent.push(command);
            if self.failures > 0 {
                self.failures -= 1;
                return Err(ActuatorError::Timeout {
                    command,
                    after: Duration::from_millis(1),
                });
            }
            Ok(ActuatorReply {
                ack: "OK".into(),
                state: "IDLE".into(),
            })
        }

        fn endpoint(&self) -> &str {
            "flaky"
        }
    }

    const SETTINGS: ControllerSettings = ControllerSettings {
        trigger_threshold: 6_000,
        patience: 30,
        retries: 1,
    };

    fn controller() -> AlarmController<DryRunLink> {
        AlarmController::new(DryRunLink::new(), SETTINGS)
    }

    fn unknown() -> Classification {
        Classification::unknown(85.0)
    }

    #[tokio::test]
    async fn motion_below_threshold_never_acts() {
        let mut c = controller();
        for score in [0, 1, 5_999, 6_000] {
            assert!(c.update(score, &unknown()).await.is_none());
        }
        assert_eq!(c.state(), ThreatState::Off);
        assert!(c.link().sent().is_empty());

        c.update(8_000, &unknown()).await;
        let misses = c.misses();
        for _ in 0..100 {
            assert!(c.update(6_000, &Classification::none()).await.is_none());
        }
        assert_eq!(c.misses(), misses);
        assert_eq!(c.state(), ThreatState::On);
    }

    #[tokio::test]
    async fn unknown_while_off_turns_on_once() {
        for score in [6_001, 8_000, u64::MAX] {
            let mut c = controller();
            let t = c.update(score, &unknown()).await.unwrap();
            assert_eq!(t.state, ThreatState::On);
            assert_eq!(t.reason, REASON_UNKNOWN_PERSON);
            assert!(t.delivery.is_ok());
            assert!(c.update(score, &unknown()).await.is_none());
            assert_eq!(c.link().sent(), &[ActuatorCommand::AlarmOn]);
        }
    }

    #[tokio::test]
    async fn known_face_while_off_does_nothing() {
        let mut c = controller();
        assert!(c.update(9_000, &Classification::known("alice", 30.0)).await.is_none());
        assert!(c.update(9_000, &Classification::none()).await.is_none());
        assert!(c.link().sent().is_empty());
    }

    #[tokio::test]
    async fn turns_off_on_thirty_first_miss() {
        let mut c = controller();
        c.update(8_000, &unknown()).await;

        for i in 1..=30 {
            assert!(c.update(8_000, &Classification::none()).await.is_none(), "tick {i}");
            assert_eq!(c.misses(), i);
        }
        let t = c.update(8_000, &Classification::known("bob", 20.0)).await.unwrap();
        assert_eq!(t.state, ThreatState::Off);
        assert_eq!(t.reason, REASON_ALL_CLEAR);
        assert_eq!(c.misses(), 0);
        assert_eq!(c.link().sent(), &[ActuatorCommand::AlarmOn, ActuatorCommand::AlarmOff]);
    }

    #[tokio::test]
    async fn unknown_while_on_resets_misses() {
        let mut c = controller();
        c.update(8_000, &unknown()).await;
        for _ in 0..20 {
            c.update(8_000, &Classification::none()).await;
        }
        assert_eq!(c.misses(), 20);
        assert!(c.update(8_000, &unknown()).await.is_none());
        assert_eq!(c.misses(), 0);

        for _ in 0..30 {
            assert!(c.update(8_000, &Classification::none()).await.is_none());
        }
        assert!(c.update(8_000, &Classification::none()).await.is_some());
    }

    #[tokio::test]
    async fn status_never_mutates_state() {
        let mut c = controller();
        c.update(8_000, &unknown()).await;
        c.update(8_000, &Classification::none()).await;

        for _ in 0..3 {
            c.status().await.unwrap();
        }
        assert_eq!(c.state(), ThreatState::On);
        assert_eq!(c.misses(), 1);
    }

    #[tokio::test]
    async fn stop_clears_alarm_before_disarming() {
        let mut c = controller();
        c.start().await.unwrap();
        assert!(c.is_armed());
        c.update(8_000, &unknown()).await;
        c.stop().await.unwrap();

        assert_eq!(c.state(), ThreatState::Off);
        assert!(!c.is_armed());
        assert_eq!(
            c.link().sent(),
            &[
                ActuatorCommand::Arm,
                ActuatorCommand::AlarmOn,
                ActuatorCommand::AlarmOff,
                ActuatorCommand::Disarm
            ]
        );
    }

    #[tokio::test]
    async fn stop_while_off_only_disarms() {
        let mut c = controller();
        c.stop().await.unwrap();
        assert_eq!(c.link().sent(), &[ActuatorCommand::Disarm]);
    }

    #[tokio::test]
    async fn single_failure_is_retried() {
        let link = FlakyLink {
            failures: 1,
            sent: Vec::new(),
        };
        let mut c = AlarmController::new(link, SETTINGS);
        let t = c.update(8_000, &unknown()).await.unwrap();
        assert!(t.delivery.is_ok());
        assert_eq!(c.link().sent, vec![ActuatorCommand::AlarmOn, ActuatorCommand::AlarmOn]);
    }

    #[tokio::test]
    async fn persistent_failure_is_surfaced_but_state_moves() {
        let link = FlakyLink {
            failures: 10,
            sent: Vec::new(),
        };
        let mut c = AlarmController::new(link, SETTINGS);
        let t = c.update(8_000, &unknown()).await.unwrap();

        assert_eq!(c.state(), ThreatState::On);
        match t.delivery {
            Err(AlarmError::Actuator { command, attempts, .. }) => {
                assert_eq!(command, ActuatorCommand::AlarmOn);
                assert_eq!(attempts, 2);
            }
            Ok(_) => panic!("expected actuator failure"),
        }
        assert_eq!(c.link().sent.len(), 2);
    }

    #[tokio::test]
    async fn stop_attempts_disarm_after_failed_alarm_off() {
        let link = FlakyLink {
            failures: 0,
            sent: Vec::new(),
        };
        let mut c = AlarmController::new(link, ControllerSettings { retries: 0, ..SETTINGS });
        c.update(8_000, &unknown()).await;
        c.link_mut().failures = 1;

        let err = c.stop().await.unwrap_err();
        assert!(err.to_string().contains("<ALARM:OFF>"));
        assert_eq!(
            c.link().sent,
            vec![ActuatorCommand::AlarmOn, ActuatorCommand::AlarmOff, ActuatorCommand::Disarm]
        );
    }
}
