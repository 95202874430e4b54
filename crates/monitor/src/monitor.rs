//! The per-tick detection loop.
//!
//! frame → motion gate → (above threshold) face classifier → alarm
//! controller → event log, notifications and actuator. Every wait on the
//! tick path has a timeout; notifications are only enqueued here.

use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

use smartcam_actuator::ActuatorLink;
use smartcam_core::{Classification, Config, EventLog, EventRecord, SessionStats, ThreatState};
use smartcam_notify::{DispatchStats, Dispatcher, EventKind, NotificationEvent};
use smartcam_vision::{save_snapshot, FaceClassifier, Frame, FrameSource, MotionGate, VisionError};

use crate::controller::{AlarmController, Transition};
use crate::error::AlarmError;

/// Loop settings that are not owned by a component.
#[derive(Debug, Clone)]
pub struct MonitorSettings {
    pub trigger_threshold: u64,
    /// Camera location shown in notifications.
    pub location: String,
    /// Where unknown-person snapshots go; `None` disables them.
    pub snapshots_dir: Option<PathBuf>,
    /// How long queued notifications may keep draining at shutdown.
    pub shutdown_grace: Duration,
}

impl MonitorSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            trigger_threshold: config.motion.trigger_threshold,
            location: config.notify.location.clone(),
            snapshots_dir: Some(config.logging.snapshots_dir.clone()),
            shutdown_grace: Duration::from_secs(config.notify.send_timeout_secs),
        }
    }
}

/// What one tick observed and decided.
#[derive(Debug, Clone, PartialEq)]
pub struct TickOutcome {
    pub motion_score: u64,
    /// Present only when motion exceeded the threshold.
    pub classification: Option<Classification>,
    /// New threat state, if it changed.
    pub transition: Option<ThreatState>,
    pub snapshot: Option<PathBuf>,
}

/// End-of-session result.
#[derive(Debug)]
pub struct SessionSummary {
    pub stats: SessionStats,
    pub notifications: DispatchStats,
    /// Why the frame source stopped, if it failed.
    pub frame_error: Option<VisionError>,
}

pub struct Monitor<L, E> {
    gate: MotionGate,
    classifier: FaceClassifier,
    controller: AlarmController<L>,
    dispatcher: Dispatcher,
    log: E,
    stats: SessionStats,
    settings: MonitorSettings,
}

impl<L: ActuatorLink, E: EventLog> Monitor<L, E> {
    pub fn new(
        gate: MotionGate,
        classifier: FaceClassifier,
        controller: AlarmController<L>,
        dispatcher: Dispatcher,
        log: E,
        settings: MonitorSettings,
    ) -> Self {
        Self {
            gate,
            classifier,
            controller,
            dispatcher,
            log,
            stats: SessionStats::default(),
            settings,
        }
    }

    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    pub fn controller(&self) -> &AlarmController<L> {
        &self.controller
    }

    pub fn event_log(&self) -> &E {
        &self.log
    }

    /// Arm the session. A failure is reported as an actuator fault and the
    /// session continues.
    pub async fn start(&mut self) {
        if let Err(e) = self.controller.start().await {
            self.actuator_fault(&e);
        }
    }

    /// Score `frame` and run the rest of the tick.
    pub async fn tick(&mut self, frame: &Frame) -> TickOutcome {
        self.stats.frame();
        let motion_score = self.gate.score(frame);
        self.process(frame, motion_score).await
    }

    /// Run a tick for a frame whose motion score is already known.
    pub async fn process(&mut self, frame: &Frame, motion_score: u64) -> TickOutcome {
        let mut outcome = TickOutcome {
            motion_score,
            classification: None,
            transition: None,
            snapshot: None,
        };
        let alarm = self.controller.state();

        let classification = if motion_score > self.settings.trigger_threshold {
            self.record(EventRecord::motion(motion_score, alarm));

            let classification = self.classifier.classify(frame).await;
            if classification.identity.has_face() {
                self.record(EventRecord::face(&classification, motion_score, alarm));
            }
            if classification.identity.is_unknown() {
                // One snapshot per notification window; suppressed sightings keep none.
                if self.dispatcher.would_notify(EventKind::UnknownPerson) {
                    outcome.snapshot = self.snapshot(frame).await;
                }
                self.dispatcher.notify(NotificationEvent::unknown_person(
                    classification.confidence,
                    &self.settings.location,
                    outcome.snapshot.clone(),
                ));
            }
            classification
        } else {
            Classification::none()
        };

        if let Some(transition) = self.controller.update(motion_score, &classification).await {
            outcome.transition = Some(transition.state);
            self.apply_transition(transition, motion_score);
        }

        if motion_score > self.settings.trigger_threshold {
            outcome.classification = Some(classification);
        }
        outcome
    }

    fn apply_transition(&mut self, transition: Transition, motion_score: u64) {
        let Transition {
            state,
            reason,
            delivery,
        } = transition;

        self.record(EventRecord::alarm(state, motion_score));
        self.dispatcher
            .notify(NotificationEvent::alarm(state, reason, &self.settings.location));

        if let Err(e) = delivery {
            self.actuator_fault(&e);
        }
    }

    fn actuator_fault(&mut self, error: &AlarmError) {
        self.stats.actuator_faults += 1;
        tracing::error!(
            error = %error,
            faults = self.stats.actuator_faults,
            "actuator did not acknowledge command"
        );
        self.dispatcher.notify(NotificationEvent::actuator_fault(
            &error.to_string(),
            &self.settings.location,
        ));
    }

    async fn snapshot(&self, frame: &Frame) -> Option<PathBuf> {
        let dir = self.settings.snapshots_dir.clone()?;
        let frame = frame.clone();
        let result = tokio::task::spawn_blocking(move || save_snapshot(&frame, dir, "unknown")).await;
        match result {
            Ok(Ok(path)) => {
                tracing::info!(path = %path.display(), "unknown person snapshot saved");
                Some(path)
            }
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "failed to save snapshot");
                None
            }
            Err(e) => {
                tracing::warn!(error = %e, "snapshot task failed");
                None
            }
        }
    }

    fn record(&mut self, record: EventRecord) {
        self.stats.observe(&record);
        self.log.record(record);
    }

    /// Arm, process frames until the source ends, fails or `shutdown`
    /// resolves, then close the session.
    pub async fn run<S, F>(mut self, source: &mut S, shutdown: F) -> (SessionSummary, E)
    where
        S: FrameSource + ?Sized,
        F: Future<Output = ()>,
    {
        self.start().await;
        tracing::info!(
            threshold = self.settings.trigger_threshold,
            channels = ?self.dispatcher.channel_names(),
            "monitoring started"
        );

        tokio::pin!(shutdown);
        let mut frame_error = None;
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("shutdown requested");
                    break;
                }
                next = source.next_frame() => match next {
                    Ok(Some(frame)) => {
                        self.tick(&frame).await;
                    }
                    Ok(None) => {
                        tracing::info!("frame source ended");
                        break;
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "frame acquisition failed, ending session");
                        frame_error = Some(e);
                        break;
                    }
                },
            }
        }

        let mut summary = self.finish().await;
        summary.0.frame_error = frame_error;
        summary
    }

    /// Disarm, persist the session summary and drain notifications.
    /// Returns the summary together with the event log.
    pub async fn finish(mut self) -> (SessionSummary, E) {
        if let Err(e) = self.controller.stop().await {
            self.actuator_fault(&e);
        }

        if let Err(e) = self.log.flush(&self.stats) {
            tracing::warn!(error = %e, "failed to save session summary");
        }

        let notifications = self.dispatcher.shutdown(self.settings.shutdown_grace).await;
        tracing::info!(
            frames = self.stats.total_frames,
            alarms = self.stats.alarm_triggers,
            faults = self.stats.actuator_faults,
            "monitoring stopped"
        );

        (
            SessionSummary {
                stats: self.stats,
                notifications,
                frame_error: None,
            },
            self.log,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_follow_config() {
        let mut config = Config::default();
        config.motion.trigger_threshold = 4_200;
        config.notify.location = "Garage".into();
        config.notify.send_timeout_secs = 7;

        let settings = MonitorSettings::from_config(&config);
        assert_eq!(settings.trigger_threshold, 4_200);
        assert_eq!(settings.location, "Garage");
        assert_eq!(settings.snapshots_dir.as_deref(), Some(std::path::Path::new("snapshots")));
        assert_eq!(settings.shutdown_grace, Duration::from_secs(7));
    }
}
