//! Notification dispatch for alarm and detection events.
//!
//! This crate provides:
//! - `Notifier` trait for pluggable notification channels
//! - Email, Discord, Pushover and generic webhook notifiers
//! - Minijinja template rendering for subjects and bodies
//! - A rate-limited dispatcher that delivers on a bounded worker pool

pub mod channels;
pub mod cooldown;
pub mod discord;
pub mod dispatcher;
pub mod email;
pub mod pushover;
pub mod templating;
pub mod traits;
pub mod webhook;

pub use channels::build_channels;
pub use cooldown::Cooldown;
pub use dispatcher::{DispatchStats, Dispatcher, DispatcherOptions};
pub use templating::TemplateRenderer;
pub use traits::{DispatchResult, EventData, EventKind, NotificationEvent, Notifier, NotifyError};
