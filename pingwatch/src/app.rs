//! Process lifecycle: startup message, monitoring loop, single shutdown.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use chrono::Utc;
use reachability::Prober;
use sysinfo::System;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::domain::HostRegistry;
use crate::monitor::{HostMonitor, HostState};
use crate::notification::{NotificationChannel, NotificationEvent, NotificationService};
use crate::Result;

/// Extra time given to in-flight notifications at shutdown.
const DRAIN_SLACK: Duration = Duration::from_secs(1);

/// Owns the monitor, the notifier and the cancellation token.
pub struct MonitorApp {
    registry: HostRegistry,
    monitor: HostMonitor,
    notifier: Arc<NotificationService>,
    cancel: CancellationToken,
    started: Instant,
    shut_down: AtomicBool,
    drain_grace: Duration,
}

impl MonitorApp {
    /// Build the app from a validated config.
    ///
    /// `channel` of `None` disables notifications; events are only logged.
    pub fn new(
        config: &AppConfig,
        prober: Arc<dyn Prober>,
        channel: Option<Arc<dyn NotificationChannel>>,
    ) -> Result<Self> {
        let registry = config.registry()?;
        let settings = config.monitor_settings()?;
        let send_timeout = config.monitoring.notification_timeout();

        let notifier = Arc::new(match channel {
            Some(channel) => NotificationService::new(channel, send_timeout),
            None => NotificationService::disabled(),
        });
        let monitor = HostMonitor::new(&registry, prober, Arc::clone(&notifier), settings);

        Ok(Self {
            registry,
            monitor,
            notifier,
            cancel: CancellationToken::new(),
            started: Instant::now(),
            shut_down: AtomicBool::new(false),
            drain_grace: send_timeout + DRAIN_SLACK,
        })
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn notifier(&self) -> &Arc<NotificationService> {
        &self.notifier
    }

    pub fn snapshot(&self) -> Vec<(crate::domain::Host, HostState)> {
        self.monitor.snapshot()
    }

    /// Announce startup, monitor until stopped, then shut down.
    pub async fn run(&self) {
        let hostname = System::host_name().unwrap_or_else(|| "unknown".to_string());
        info!(
            hostname = %hostname,
            hosts = self.registry.len(),
            "Starting monitoring"
        );

        let started = NotificationEvent::MonitoringStarted {
            hostname,
            hosts: self.registry.hosts().to_vec(),
            timestamp: Utc::now(),
        };
        if !self.notifier.send(&started).await && self.notifier.is_enabled() {
            warn!("Startup notification was not delivered, continuing");
        }

        self.monitor.run(&self.cancel).await;
        self.shutdown().await;
    }

    /// Request a stop. Safe to call any number of times.
    pub fn stop(&self) {
        if !self.cancel.is_cancelled() {
            info!("Stop requested");
        }
        self.cancel.cancel();
    }

    /// Send the shutdown message and drain notifications.
    ///
    /// Only the first call does anything; returns whether this call did.
    pub async fn shutdown(&self) -> bool {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.cancel.cancel();

        let uptime = self.started.elapsed();
        info!(uptime_secs = uptime.as_secs(), "Shutting down");

        let stopped = NotificationEvent::MonitoringStopped {
            uptime_secs: uptime.as_secs(),
            timestamp: Utc::now(),
        };
        self.notifier.send(&stopped).await;
        self.notifier.drain(self.drain_grace).await;

        let stats = self.notifier.stats();
        info!(
            delivered = stats.delivered,
            failed = stats.failed,
            "Monitoring stopped"
        );
        true
    }
}
