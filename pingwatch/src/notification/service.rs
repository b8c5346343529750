//! Notification service implementation.
//!
//! The NotificationService is responsible for:
//! - Delivering events to the configured channel, at most once each
//! - Bounding every delivery attempt with a timeout
//! - Running deliveries in the background so callers never wait on the network
//! - Draining in-flight deliveries at shutdown

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use super::channels::NotificationChannel;
use super::events::NotificationEvent;

/// Delivery counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationStats {
    pub delivered: u64,
    pub failed: u64,
    pub skipped: u64,
}

/// Single-channel notification dispatcher.
///
/// Failures are logged and counted, never propagated: a notification that
/// cannot be delivered is not retried later.
pub struct NotificationService {
    channel: Option<Arc<dyn NotificationChannel>>,
    send_timeout: Duration,
    tasks: TaskTracker,
    delivered: AtomicU64,
    failed: AtomicU64,
    skipped: AtomicU64,
}

impl NotificationService {
    /// Create a service delivering through `channel`.
    pub fn new(channel: Arc<dyn NotificationChannel>, send_timeout: Duration) -> Self {
        Self::build(Some(channel), send_timeout)
    }

    /// Create a service that only logs events.
    pub fn disabled() -> Self {
        Self::build(None, Duration::from_secs(1))
    }

    fn build(channel: Option<Arc<dyn NotificationChannel>>, send_timeout: Duration) -> Self {
        Self {
            channel,
            send_timeout,
            tasks: TaskTracker::new(),
            delivered: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            skipped: AtomicU64::new(0),
        }
    }

    /// Whether a usable channel is configured.
    pub fn is_enabled(&self) -> bool {
        self.channel.as_ref().is_some_and(|c| c.is_enabled())
    }

    /// Deliver `event` once, waiting at most `send_timeout`.
    ///
    /// Returns whether the channel accepted the message.
    pub async fn send(&self, event: &NotificationEvent) -> bool {
        let channel = match &self.channel {
            Some(channel) if channel.is_enabled() => channel,
            _ => {
                debug!(
                    event_type = event.event_type(),
                    title = %event.title(),
                    "Notifications disabled, event not delivered"
                );
                self.skipped.fetch_add(1, Ordering::Relaxed);
                return false;
            }
        };

        match tokio::time::timeout(self.send_timeout, channel.send(event)).await {
            Ok(Ok(())) => {
                self.delivered.fetch_add(1, Ordering::Relaxed);
                info!(
                    channel = channel.channel_type(),
                    event_type = event.event_type(),
                    "Notification delivered: {}",
                    event.title()
                );
                true
            }
            Ok(Err(e)) => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                warn!(
                    channel = channel.channel_type(),
                    event_type = event.event_type(),
                    error = %e,
                    "Notification delivery failed"
                );
                false
            }
            Err(_) => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                warn!(
                    channel = channel.channel_type(),
                    event_type = event.event_type(),
                    timeout = ?self.send_timeout,
                    "Notification delivery timed out"
                );
                false
            }
        }
    }

    /// Deliver `event` in the background.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn dispatch(self: &Arc<Self>, event: NotificationEvent) {
        let service = Arc::clone(self);
        self.tasks.spawn(async move {
            service.send(&event).await;
        });
    }

    /// Number of background deliveries still running.
    pub fn in_flight(&self) -> usize {
        self.tasks.len()
    }

    /// Stop accepting new background deliveries and wait up to `grace` for the
    /// running ones.
    ///
    /// Returns `false` if some deliveries were still pending when `grace` ran out.
    pub async fn drain(&self, grace: Duration) -> bool {
        self.tasks.close();
        let pending = self.tasks.len();
        if pending > 0 {
            debug!(pending, "Waiting for in-flight notifications");
        }
        match tokio::time::timeout(grace, self.tasks.wait()).await {
            Ok(()) => true,
            Err(_) => {
                warn!(
                    pending = self.tasks.len(),
                    "Gave up waiting for in-flight notifications"
                );
                false
            }
        }
    }

    pub fn stats(&self) -> NotificationStats {
        NotificationStats {
            delivered: self.delivered.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
        }
    }
}
