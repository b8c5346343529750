//! Host monitor service.
//!
//! Drives the per-host trackers at a fixed cadence. Each cycle probes every
//! host once with bounded concurrency and waits for all of them before the
//! next sleep. Transitions are handed to the notification service without
//! waiting for delivery.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use parking_lot::Mutex;
use reachability::{ProbeOutcome, Prober};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::tracker::{HostState, HostStatus, Thresholds, Transition};
use crate::domain::{Host, HostRegistry};
use crate::notification::{NotificationEvent, NotificationService};
use crate::panic_hook;

/// Slack on top of the probe timeout before a probe is abandoned.
const PROBE_GRACE: Duration = Duration::from_secs(1);

/// Configuration for the host monitor.
#[derive(Debug, Clone)]
pub struct MonitorSettings {
    /// Sleep between the end of one cycle and the start of the next.
    pub check_interval: Duration,
    /// Timeout handed to the prober for each host.
    pub probe_timeout: Duration,
    pub thresholds: Thresholds,
    /// Maximum probes running at once within a cycle.
    pub max_concurrent_probes: usize,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_secs(60),
            probe_timeout: Duration::from_secs(2),
            thresholds: Thresholds::default(),
            max_concurrent_probes: 32,
        }
    }
}

/// Result of probing one host in one cycle.
#[derive(Debug, Clone)]
pub struct HostCheck {
    /// Position in the registry.
    pub index: usize,
    pub host: Host,
    pub reachable: bool,
    pub latency: Option<Duration>,
    /// Set when the probe could not be carried out.
    pub probe_error: Option<String>,
    /// Confirmed status after applying this probe.
    pub status: HostStatus,
    /// Probes in a row that disagree with `status`. Zero once a transition fires.
    pub pending_streak: u32,
    pub transition: Option<Transition>,
}

/// Summary of one monitoring cycle.
#[derive(Debug, Clone, Default)]
pub struct CycleReport {
    /// Completed checks in registry order.
    pub checks: Vec<HostCheck>,
    /// Host tasks that panicked. Their state is left untouched.
    pub faults: usize,
    pub elapsed: Duration,
}

impl CycleReport {
    /// Hosts currently confirmed up.
    pub fn up_count(&self) -> usize {
        self.checks.iter().filter(|c| c.status.is_up()).count()
    }

    /// Hosts currently confirmed down.
    pub fn down_count(&self) -> usize {
        self.checks.len() - self.up_count()
    }

    pub fn transitions(&self) -> impl Iterator<Item = (&Host, &Transition)> {
        self.checks
            .iter()
            .filter_map(|c| c.transition.as_ref().map(|t| (&c.host, t)))
    }
}

struct HostSlot {
    host: Host,
    state: Mutex<HostState>,
}

/// Periodic prober of every registered host.
pub struct HostMonitor {
    slots: Arc<[HostSlot]>,
    prober: Arc<dyn Prober>,
    notifier: Arc<NotificationService>,
    settings: MonitorSettings,
    semaphore: Arc<Semaphore>,
}

impl HostMonitor {
    /// Create a monitor with every host assumed up.
    pub fn new(
        registry: &HostRegistry,
        prober: Arc<dyn Prober>,
        notifier: Arc<NotificationService>,
        settings: MonitorSettings,
    ) -> Self {
        let slots: Arc<[HostSlot]> = registry
            .iter()
            .map(|host| HostSlot {
                host: host.clone(),
                state: Mutex::new(HostState::default()),
            })
            .collect();
        let permits = settings.max_concurrent_probes.max(1);

        Self {
            slots,
            prober,
            notifier,
            settings,
            semaphore: Arc::new(Semaphore::new(permits)),
        }
    }

    pub fn settings(&self) -> &MonitorSettings {
        &self.settings
    }

    pub fn host_count(&self) -> usize {
        self.slots.len()
    }

    /// Copy of every host's current state, in registry order.
    pub fn snapshot(&self) -> Vec<(Host, HostState)> {
        self.slots
            .iter()
            .map(|slot| (slot.host.clone(), slot.state.lock().clone()))
            .collect()
    }

    /// Probe every host once and apply the results.
    ///
    /// Returns only after every host task has finished.
    pub async fn run_cycle(&self) -> CycleReport {
        let started = Instant::now();
        let mut tasks = JoinSet::new();
        let mut task_hosts = HashMap::with_capacity(self.slots.len());

        for index in 0..self.slots.len() {
            let slots = Arc::clone(&self.slots);
            let prober = Arc::clone(&self.prober);
            let notifier = Arc::clone(&self.notifier);
            let semaphore = Arc::clone(&self.semaphore);
            let thresholds = self.settings.thresholds;
            let probe_timeout = self.settings.probe_timeout;

            let handle = tasks.spawn(async move {
                // The semaphore is never closed.
                let _permit = semaphore.acquire_owned().await.ok();
                let slot = &slots[index];
                check_host(index, slot, prober.as_ref(), &notifier, &thresholds, probe_timeout)
                    .await
            });
            task_hosts.insert(handle.id(), index);
        }

        let mut checks = Vec::with_capacity(self.slots.len());
        let mut faults = 0;

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(check) => checks.push(check),
                Err(e) => {
                    faults += 1;
                    let host = task_hosts
                        .get(&e.id())
                        .map(|&i| self.slots[i].host.to_string())
                        .unwrap_or_else(|| "unknown host".to_string());
                    let message = match e.try_into_panic() {
                        Ok(payload) => format!(
                            "Check of {host} panicked: {}",
                            panic_hook::payload_message(payload.as_ref())
                        ),
                        Err(e) => format!("Check of {host} failed: {e}"),
                    };
                    error!(host = %host, "{message}");
                    self.notifier
                        .dispatch(NotificationEvent::monitor_error(message));
                }
            }
        }

        checks.sort_by_key(|c| c.index);

        let report = CycleReport {
            checks,
            faults,
            elapsed: started.elapsed(),
        };
        debug!(
            up = report.up_count(),
            down = report.down_count(),
            faults = report.faults,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "Cycle complete"
        );
        report
    }

    /// Run cycles until `token` is cancelled.
    ///
    /// Cancellation is observed between cycles only; an in-flight cycle always
    /// finishes its probes.
    pub async fn run(&self, token: &CancellationToken) {
        info!(
            hosts = self.slots.len(),
            interval_secs = self.settings.check_interval.as_secs(),
            failure_threshold = self.settings.thresholds.failure(),
            recovery_threshold = self.settings.thresholds.recovery(),
            prober = self.prober.name(),
            "Host monitor started"
        );

        let mut cycles: u64 = 0;
        while !token.is_cancelled() {
            let report = self.run_cycle().await;
            cycles += 1;
            if report.faults > 0 {
                warn!(cycle = cycles, faults = report.faults, "Cycle finished with faults");
            }

            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                _ = tokio::time::sleep(self.settings.check_interval) => {}
            }
        }

        info!(cycles, "Host monitor stopped");
    }
}

async fn check_host(
    index: usize,
    slot: &HostSlot,
    prober: &dyn Prober,
    notifier: &Arc<NotificationService>,
    thresholds: &Thresholds,
    probe_timeout: Duration,
) -> HostCheck {
    let host = &slot.host;
    let (outcome, probe_error) = match tokio::time::timeout(
        probe_timeout + PROBE_GRACE,
        prober.probe(&host.address, probe_timeout),
    )
    .await
    {
        Ok(Ok(outcome)) => (outcome, None),
        Ok(Err(e)) => {
            warn!(
                host = %host.name,
                address = %host.address,
                error = %e,
                "Probe error, counting as unreachable"
            );
            (ProbeOutcome::unreachable(), Some(e.to_string()))
        }
        Err(_) => {
            warn!(
                host = %host.name,
                address = %host.address,
                "Probe exceeded its timeout, counting as unreachable"
            );
            (ProbeOutcome::unreachable(), Some("probe timed out".to_string()))
        }
    };

    debug!(
        host = %host.name,
        address = %host.address,
        reachable = outcome.reachable,
        latency_ms = outcome.latency.map(|l| l.as_secs_f64() * 1000.0),
        "Probe finished"
    );

    let (status, transition, pending_streak) = {
        let mut state = slot.state.lock();
        let transition = state.apply(outcome.reachable, thresholds, Utc::now());
        (state.status, transition, state.pending_streak())
    };

    if transition.is_none() && pending_streak > 0 {
        match status {
            HostStatus::Up => warn!(
                host = %host.name,
                address = %host.address,
                streak = pending_streak,
                threshold = thresholds.failure(),
                "Host unreachable, not yet confirmed down"
            ),
            HostStatus::Down => info!(
                host = %host.name,
                address = %host.address,
                streak = pending_streak,
                threshold = thresholds.recovery(),
                "Host reachable again, not yet confirmed up"
            ),
        }
    }

    if let Some(transition) = &transition {
        match transition {
            Transition::Down { .. } => warn!(
                host = %host.name,
                address = %host.address,
                old_status = %transition.old_status(),
                new_status = %transition.new_status(),
                streak = transition.streak(),
                "Host is DOWN"
            ),
            Transition::Recovered { downtime, .. } => info!(
                host = %host.name,
                address = %host.address,
                old_status = %transition.old_status(),
                new_status = %transition.new_status(),
                streak = transition.streak(),
                downtime_secs = downtime.map(|d| d.as_secs()),
                "Host recovered"
            ),
        }
        notifier.dispatch(NotificationEvent::from_transition(host, transition));
    }

    HostCheck {
        index,
        host: host.clone(),
        reachable: outcome.reachable,
        latency: outcome.latency,
        probe_error,
        status,
        pending_streak,
        transition,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use reachability::ProbeError;

    /// Reports hosts whose address starts with "up" as reachable.
    struct PrefixProber;

    #[async_trait]
    impl Prober for PrefixProber {
        fn name(&self) -> &'static str {
            "prefix"
        }

        async fn probe(&self, address: &str, _timeout: Duration) -> Result<ProbeOutcome, ProbeError> {
            if address.starts_with("err") {
                return Err(ProbeError::InvalidAddress(address.to_string()));
            }
            if address.starts_with("up") {
                Ok(ProbeOutcome::reachable(Some(Duration::from_millis(3))))
            } else {
                Ok(ProbeOutcome::unreachable())
            }
        }
    }

    fn monitor(addresses: &[&str], failure: u32) -> HostMonitor {
        let registry = HostRegistry::new(
            addresses
                .iter()
                .enumerate()
                .map(|(i, a)| Host::new(format!("h{i}"), *a))
                .collect(),
        )
        .unwrap();
        HostMonitor::new(
            &registry,
            Arc::new(PrefixProber),
            Arc::new(NotificationService::disabled()),
            MonitorSettings {
                check_interval: Duration::from_millis(10),
                probe_timeout: Duration::from_millis(100),
                thresholds: Thresholds::new(failure, 1).unwrap(),
                max_concurrent_probes: 2,
            },
        )
    }

    #[tokio::test]
    async fn test_cycle_reports_in_registry_order() {
        let monitor = monitor(&["up-a", "down-b", "up-c", "err-d"], 1);
        let report = monitor.run_cycle().await;

        let indices: Vec<_> = report.checks.iter().map(|c| c.index).collect();
        assert_eq!(indices, [0, 1, 2, 3]);
        assert_eq!(report.faults, 0);
        assert_eq!(report.up_count(), 2);
        assert_eq!(report.down_count(), 2);
        assert_eq!(report.transitions().count(), 2);
        assert!(report.checks[3].probe_error.is_some());
        assert_eq!(report.checks[0].latency, Some(Duration::from_millis(3)));
    }

    #[tokio::test]
    async fn test_snapshot_tracks_streaks() {
        let monitor = monitor(&["up-a", "down-b"], 3);
        monitor.run_cycle().await;
        monitor.run_cycle().await;

        let snapshot = monitor.snapshot();
        assert_eq!(snapshot[0].1, HostState::default());
        assert_eq!(snapshot[1].1.status, HostStatus::Up);
        assert_eq!(snapshot[1].1.fail_streak, 2);
    }

    #[tokio::test]
    async fn test_check_reports_pending_streak_until_confirmed() {
        let monitor = monitor(&["up-a", "down-b"], 3);

        for expected in [1, 2] {
            let report = monitor.run_cycle().await;
            assert_eq!(report.checks[0].pending_streak, 0);
            assert_eq!(report.checks[1].pending_streak, expected);
            assert_eq!(report.checks[1].status, HostStatus::Up);
            assert!(report.checks[1].transition.is_none());
        }

        let report = monitor.run_cycle().await;
        assert_eq!(report.checks[1].status, HostStatus::Down);
        assert_eq!(report.checks[1].pending_streak, 0);
        assert!(report.checks[1].transition.is_some());
    }

    #[tokio::test]
    async fn test_run_stops_when_cancelled() {
        let monitor = monitor(&["up-a"], 1);
        let token = CancellationToken::new();
        token.cancel();
        // Returns without running a cycle.
        monitor.run(&token).await;
        assert_eq!(monitor.snapshot()[0].1, HostState::default());
    }

    #[tokio::test]
    async fn test_run_exits_during_sleep() {
        let mut monitor = monitor(&["down-a"], 1);
        monitor.settings.check_interval = Duration::from_secs(3600);
        let token = CancellationToken::new();

        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            canceller.cancel();
        });

        tokio::time::timeout(Duration::from_secs(5), monitor.run(&token))
            .await
            .expect("run should return after cancellation");
        assert_eq!(monitor.snapshot()[0].1.status, HostStatus::Down);
    }
}
