//! Routes notification events to every configured channel.
//!
//! `notify` runs on the tick loop and never waits: it checks the cooldown,
//! then enqueues one job per channel on a bounded queue drained by a fixed
//! pool of worker tasks. Each delivery is bounded by its own timeout and
//! individual channel failures don't affect other channels.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use smartcam_core::config::NotifyConfig;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

use crate::cooldown::Cooldown;
use crate::traits::{DispatchResult, EventKind, NotificationEvent, Notifier, NotifyError};

/// Queue, pool and timing settings for a [`Dispatcher`].
#[derive(Debug, Clone)]
pub struct DispatcherOptions {
    pub cooldown: Duration,
    pub queue_capacity: usize,
    pub workers: usize,
    pub send_timeout: Duration,
}

impl DispatcherOptions {
    pub fn from_config(config: &NotifyConfig) -> Self {
        Self {
            cooldown: Duration::from_secs(config.cooldown_secs),
            queue_capacity: config.queue_capacity,
            workers: config.workers,
            send_timeout: Duration::from_secs(config.send_timeout_secs),
        }
    }
}

impl Default for DispatcherOptions {
    fn default() -> Self {
        Self::from_config(&NotifyConfig::default())
    }
}

/// Delivery counters since the dispatcher started.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    /// Events rejected by the cooldown.
    pub suppressed: u64,
    /// Jobs accepted onto the queue.
    pub enqueued: u64,
    /// Jobs dropped because the queue was full or closed.
    pub dropped: u64,
    pub delivered: u64,
    pub failed: u64,
}

#[derive(Debug, Default)]
struct Counters {
    suppressed: AtomicU64,
    enqueued: AtomicU64,
    dropped: AtomicU64,
    delivered: AtomicU64,
    failed: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> DispatchStats {
        DispatchStats {
            suppressed: self.suppressed.load(Ordering::Relaxed),
            enqueued: self.enqueued.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

struct Job {
    channel: Arc<dyn Notifier>,
    event: Arc<NotificationEvent>,
}

/// Rate-limited fan-out of events to notification channels.
pub struct Dispatcher {
    channels: Vec<Arc<dyn Notifier>>,
    cooldown: Cooldown,
    queue: Option<mpsc::Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
    counters: Arc<Counters>,
    send_timeout: Duration,
}

impl Dispatcher {
    /// Spawn the worker pool. Must be called from within a tokio runtime.
    pub fn start(channels: Vec<Box<dyn Notifier>>, options: DispatcherOptions) -> Self {
        let (tx, rx) = mpsc::channel(options.queue_capacity.max(1));
        let rx = Arc::new(Mutex::new(rx));
        let counters = Arc::new(Counters::default());

        let workers = (0..options.workers.max(1))
            .map(|id| {
                tokio::spawn(worker_loop(
                    id,
                    rx.clone(),
                    counters.clone(),
                    options.send_timeout,
                ))
            })
            .collect();

        let channels: Vec<Arc<dyn Notifier>> = channels.into_iter().map(Arc::from).collect();
        tracing::info!(
            channels = ?channels.iter().map(|c| c.channel_name()).collect::<Vec<_>>(),
            workers = options.workers.max(1),
            queue_capacity = options.queue_capacity.max(1),
            cooldown_secs = options.cooldown.as_secs(),
            "notification dispatcher started"
        );

        Self {
            channels,
            cooldown: Cooldown::new(options.cooldown),
            queue: Some(tx),
            workers,
            counters,
            send_timeout: options.send_timeout,
        }
    }

    /// Names of the configured channels, in delivery order.
    pub fn channel_names(&self) -> Vec<&str> {
        self.channels.iter().map(|c| c.channel_name()).collect()
    }

    /// Queue `event` for delivery on every channel.
    ///
    /// Returns `false` when the event was suppressed by the cooldown. The
    /// cooldown is recorded before any job is queued, so the attempt counts
    /// whether or not delivery later succeeds.
    pub fn notify(&self, event: NotificationEvent) -> bool {
        self.notify_at(event, Instant::now())
    }

    /// Like [`notify`](Self::notify) with an explicit clock.
    pub fn notify_at(&self, event: NotificationEvent, now: Instant) -> bool {
        if !self.cooldown.try_acquire_at(event.kind, now) {
            self.counters.suppressed.fetch_add(1, Ordering::Relaxed);
            return false;
        }

        if self.channels.is_empty() {
            tracing::debug!(kind = event.kind.key(), "no notification channels configured");
            return true;
        }

        let Some(queue) = &self.queue else {
            tracing::warn!(kind = event.kind.key(), "dispatcher is shut down, dropping notification");
            self.counters.dropped.fetch_add(self.channels.len() as u64, Ordering::Relaxed);
            return true;
        };

        let event = Arc::new(event);
        for channel in &self.channels {
            let job = Job {
                channel: channel.clone(),
                event: event.clone(),
            };
            match queue.try_send(job) {
                Ok(()) => {
                    self.counters.enqueued.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => {
                    self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                    let reason = match e {
                        mpsc::error::TrySendError::Full(_) => "queue full",
                        mpsc::error::TrySendError::Closed(_) => "queue closed",
                    };
                    tracing::warn!(
                        kind = event.kind.key(),
                        channel = channel.channel_name(),
                        reason,
                        "notification dropped"
                    );
                }
            }
        }
        true
    }

    /// Whether an event of `kind` would pass the cooldown now. Does not
    /// record an attempt.
    pub fn would_notify(&self, kind: EventKind) -> bool {
        self.would_notify_at(kind, Instant::now())
    }

    /// Like [`would_notify`](Self::would_notify) with an explicit clock.
    pub fn would_notify_at(&self, kind: EventKind, now: Instant) -> bool {
        self.cooldown.remaining_at(kind, now).is_none()
    }

    /// Deliver `event` to every channel right away, bypassing the cooldown
    /// and the queue, and report per-channel results.
    pub async fn deliver_now(&self, event: &NotificationEvent) -> Vec<DispatchResult> {
        let deliveries = self
            .channels
            .iter()
            .map(|channel| deliver(channel.as_ref(), event, self.send_timeout));
        let results = futures::future::join_all(deliveries).await;
        for r in &results {
            let counter = if r.success {
                &self.counters.delivered
            } else {
                &self.counters.failed
            };
            counter.fetch_add(1, Ordering::Relaxed);
        }
        results
    }

    pub fn stats(&self) -> DispatchStats {
        self.counters.snapshot()
    }

    /// Close the queue and give workers up to `grace` to drain it. Workers
    /// still busy after that are left running detached.
    pub async fn shutdown(mut self, grace: Duration) -> DispatchStats {
        self.queue.take();
        let workers = std::mem::take(&mut self.workers);
        let count = workers.len();

        match tokio::time::timeout(grace, futures::future::join_all(workers)).await {
            Ok(_) => tracing::debug!(workers = count, "notification workers drained"),
            Err(_) => tracing::warn!(
                grace_ms = grace.as_millis() as u64,
                "notification workers still busy after grace period, detaching"
            ),
        }

        let stats = self.stats();
        tracing::info!(
            delivered = stats.delivered,
            failed = stats.failed,
            dropped = stats.dropped,
            suppressed = stats.suppressed,
            "notification dispatcher stopped"
        );
        stats
    }
}

async fn worker_loop(
    id: usize,
    queue: Arc<Mutex<mpsc::Receiver<Job>>>,
    counters: Arc<Counters>,
    send_timeout: Duration,
) {
    loop {
        let job = queue.lock().await.recv().await;
        let Some(job) = job else {
            break;
        };
        let result = deliver(job.channel.as_ref(), &job.event, send_timeout).await;
        let counter = if result.success {
            &counters.delivered
        } else {
            &counters.failed
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
    tracing::debug!(worker = id, "notification worker stopped");
}

/// Run one channel delivery bounded by `send_timeout` and log the outcome.
async fn deliver(channel: &dyn Notifier, event: &NotificationEvent, send_timeout: Duration) -> DispatchResult {
    let start = Instant::now();
    let result = match tokio::time::timeout(send_timeout, channel.send(event)).await {
        Ok(result) => result,
        Err(_) => Err(NotifyError::Timeout(send_timeout)),
    };
    let duration_ms = start.elapsed().as_millis() as u64;

    let (success, error) = match result {
        Ok(()) => {
            tracing::info!(
                kind = event.kind.key(),
                channel = channel.channel_name(),
                duration_ms,
                "Notification delivered"
            );
            (true, None)
        }
        Err(e) => {
            tracing::warn!(
                kind = event.kind.key(),
                channel = channel.channel_name(),
                error = %e,
                duration_ms,
                "Notification delivery failed"
            );
            (false, Some(e.to_string()))
        }
    };

    DispatchResult {
        channel: channel.channel_name().to_string(),
        kind: event.kind,
        success,
        error,
        duration_ms,
    }
}
