//! Per-event-type cooldown table.
//!
//! The check and the write happen under one lock: an attempt that passes
//! records its instant before any delivery starts, so concurrent callers
//! for the same kind see at most one pass per window.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use crate::traits::EventKind;

#[derive(Debug)]
pub struct Cooldown {
    window: Duration,
    last_attempt: Mutex<HashMap<EventKind, Instant>>,
}

impl Cooldown {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_attempt: Mutex::new(HashMap::new()),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Pass the cooldown for `kind` now, recording the attempt on success.
    pub fn try_acquire(&self, kind: EventKind) -> bool {
        self.try_acquire_at(kind, Instant::now())
    }

    /// Like [`try_acquire`](Self::try_acquire) with an explicit clock.
    pub fn try_acquire_at(&self, kind: EventKind, now: Instant) -> bool {
        let mut last = self.last_attempt.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(prev) = last.get(&kind) {
            let elapsed = now.saturating_duration_since(*prev);
            if elapsed < self.window {
                tracing::debug!(
                    kind = kind.key(),
                    remaining_secs = (self.window - elapsed).as_secs_f64(),
                    "notification suppressed by cooldown"
                );
                return false;
            }
        }
        last.insert(kind, now);
        true
    }

    /// Time left before `kind` may be attempted again, if any.
    pub fn remaining_at(&self, kind: EventKind, now: Instant) -> Option<Duration> {
        let last = self.last_attempt.lock().unwrap_or_else(PoisonError::into_inner);
        let prev = last.get(&kind)?;
        self.window.checked_sub(now.saturating_duration_since(*prev)).filter(|d| !d.is_zero())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_attempt_inside_window_is_suppressed() {
        let cd = Cooldown::new(Duration::from_secs(30));
        let t0 = Instant::now();
        assert!(cd.try_acquire_at(EventKind::UnknownPerson, t0));
        assert!(!cd.try_acquire_at(EventKind::UnknownPerson, t0 + Duration::from_secs(29)));
        assert_eq!(
            cd.remaining_at(EventKind::UnknownPerson, t0 + Duration::from_secs(20)),
            Some(Duration::from_secs(10))
        );
    }

    #[test]
    fn attempt_after_window_passes() {
        let cd = Cooldown::new(Duration::from_secs(30));
        let t0 = Instant::now();
        assert!(cd.try_acquire_at(EventKind::AlarmOn, t0));
        assert!(cd.try_acquire_at(EventKind::AlarmOn, t0 + Duration::from_secs(30)));
        assert!(!cd.try_acquire_at(EventKind::AlarmOn, t0 + Duration::from_secs(45)));
    }

    #[test]
    fn suppressed_attempt_does_not_extend_window() {
        let cd = Cooldown::new(Duration::from_secs(30));
        let t0 = Instant::now();
        assert!(cd.try_acquire_at(EventKind::UnknownPerson, t0));
        assert!(!cd.try_acquire_at(EventKind::UnknownPerson, t0 + Duration::from_secs(25)));
        assert!(cd.try_acquire_at(EventKind::UnknownPerson, t0 + Duration::from_secs(31)));
    }

    #[test]
    fn kinds_are_independent() {
        let cd = Cooldown::new(Duration::from_secs(30));
        let t0 = Instant::now();
        assert!(cd.try_acquire_at(EventKind::AlarmOn, t0));
        assert!(cd.try_acquire_at(EventKind::AlarmOff, t0));
        assert!(cd.try_acquire_at(EventKind::UnknownPerson, t0));
        assert_eq!(cd.remaining_at(EventKind::ActuatorFault, t0), None);
    }

    #[test]
    fn zero_window_never_suppresses() {
        let cd = Cooldown::new(Duration::ZERO);
        let t0 = Instant::now();
        assert!(cd.try_acquire_at(EventKind::AlarmOn, t0));
        assert!(cd.try_acquire_at(EventKind::AlarmOn, t0));
    }

    #[test]
    fn concurrent_attempts_pass_once_per_kind() {
        let cd = Cooldown::new(Duration::from_secs(30));
        let threads = 32;
        let barrier = std::sync::Barrier::new(threads);

        let passes: Vec<EventKind> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..threads)
                .map(|i| {
                    let kind = if i % 2 == 0 { EventKind::UnknownPerson } else { EventKind::AlarmOn };
                    let (cd, barrier) = (&cd, &barrier);
                    scope.spawn(move || {
                        barrier.wait();
                        cd.try_acquire(kind).then_some(kind)
                    })
                })
                .collect();
            handles.into_iter().filter_map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(passes.len(), 2);
        assert!(passes.contains(&EventKind::UnknownPerson));
        assert!(passes.contains(&EventKind::AlarmOn));
    }
}
