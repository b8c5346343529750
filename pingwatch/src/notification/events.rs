//! Notification events.
//!
//! Defines the events that can trigger notifications and their priority levels.

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::Host;
use crate::monitor::Transition;

/// Monitor error messages are cut to this many characters.
const ERROR_MESSAGE_LIMIT: usize = 100;

/// Priority level for notifications.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum NotificationPriority {
    /// Informational only.
    Low,
    /// Standard notifications.
    #[default]
    Normal,
    /// Important events.
    High,
    /// Requires immediate attention.
    Critical,
}

impl std::fmt::Display for NotificationPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Normal => write!(f, "normal"),
            Self::High => write!(f, "high"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

/// Events that can trigger notifications.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NotificationEvent {
    // ========== Host Events ==========
    /// Host confirmed down.
    HostDown {
        host: Host,
        failed_probes: u32,
        timestamp: DateTime<Utc>,
    },
    /// Host confirmed up again.
    HostRecovered {
        host: Host,
        down_since: Option<DateTime<Utc>>,
        downtime_secs: Option<u64>,
        timestamp: DateTime<Utc>,
    },

    // ========== System Events ==========
    /// Monitoring started.
    MonitoringStarted {
        hostname: String,
        hosts: Vec<Host>,
        timestamp: DateTime<Utc>,
    },
    /// Monitoring stopped.
    MonitoringStopped {
        uptime_secs: u64,
        timestamp: DateTime<Utc>,
    },
    /// Unexpected failure inside a monitoring cycle.
    MonitorError {
        message: String,
        timestamp: DateTime<Utc>,
    },
    /// Manual channel test.
    Test { timestamp: DateTime<Utc> },
}

impl NotificationEvent {
    /// Build the notification for a tracker transition.
    pub fn from_transition(host: &Host, transition: &Transition) -> Self {
        match transition {
            Transition::Down { at, failed_probes } => Self::HostDown {
                host: host.clone(),
                failed_probes: *failed_probes,
                timestamp: *at,
            },
            Transition::Recovered {
                at,
                down_since,
                downtime,
                ..
            } => Self::HostRecovered {
                host: host.clone(),
                down_since: *down_since,
                downtime_secs: downtime.map(|d| d.as_secs()),
                timestamp: *at,
            },
        }
    }

    pub fn monitor_error(message: impl Into<String>) -> Self {
        Self::MonitorError {
            message: message.into(),
            timestamp: Utc::now(),
        }
    }

    /// Get the priority of this event.
    pub fn priority(&self) -> NotificationPriority {
        match self {
            Self::HostDown { .. } => NotificationPriority::Critical,
            Self::HostRecovered { .. } => NotificationPriority::Normal,
            Self::MonitoringStarted { .. } => NotificationPriority::Low,
            Self::MonitoringStopped { .. } => NotificationPriority::Normal,
            Self::MonitorError { .. } => NotificationPriority::High,
            Self::Test { .. } => NotificationPriority::Low,
        }
    }

    /// Get the event type as a string.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::HostDown { .. } => "host_down",
            Self::HostRecovered { .. } => "host_recovered",
            Self::MonitoringStarted { .. } => "monitoring_started",
            Self::MonitoringStopped { .. } => "monitoring_stopped",
            Self::MonitorError { .. } => "monitor_error",
            Self::Test { .. } => "test",
        }
    }

    /// Get a human-readable title for this event.
    pub fn title(&self) -> String {
        match self {
            Self::HostDown { host, .. } => format!("❌ {} is DOWN", host.name),
            Self::HostRecovered { host, .. } => format!("✅ {} recovered", host.name),
            Self::MonitoringStarted { .. } => "🚀 Monitoring started".to_string(),
            Self::MonitoringStopped { .. } => "🛑 Monitoring stopped".to_string(),
            Self::MonitorError { .. } => "⚠️ Monitoring error".to_string(),
            Self::Test { .. } => "🧪 Test notification".to_string(),
        }
    }

    /// Get a detailed, multi-line description of this event.
    pub fn description(&self) -> String {
        let time = format_local(self.timestamp());
        match self {
            Self::HostDown {
                host,
                failed_probes,
                ..
            } => {
                let mut lines = vec![format!("Address: {}", host.address)];
                if let Some(desc) = &host.description {
                    lines.push(format!("Description: {desc}"));
                }
                lines.push(format!("Time: {time}"));
                lines.push(format!("Failed probes: {failed_probes}"));
                lines.join("\n")
            }
            Self::HostRecovered {
                host,
                down_since,
                downtime_secs,
                ..
            } => {
                let mut lines = vec![format!("Address: {}", host.address)];
                if let Some(desc) = &host.description {
                    lines.push(format!("Description: {desc}"));
                }
                lines.push(format!("Time: {time}"));
                if let Some(secs) = downtime_secs {
                    lines.push(format!("Downtime: {}", format_duration(*secs)));
                }
                if let Some(since) = down_since {
                    lines.push(format!("Down since: {}", format_local(*since)));
                }
                lines.join("\n")
            }
            Self::MonitoringStarted {
                hostname, hosts, ..
            } => {
                let mut lines = vec![
                    format!("Server: {hostname}"),
                    format!("Time: {time}"),
                    format!("Hosts: {}", hosts.len()),
                    String::new(),
                ];
                lines.extend(
                    hosts
                        .iter()
                        .map(|h| format!("• {:<15} {}", h.address, h.name)),
                );
                lines.join("\n")
            }
            Self::MonitoringStopped { uptime_secs, .. } => {
                format!("Time: {time}\nUptime: {}", format_duration(*uptime_secs))
            }
            Self::MonitorError { message, .. } => {
                format!("Time: {time}\n{}", truncate_chars(message, ERROR_MESSAGE_LIMIT))
            }
            Self::Test { .. } => format!("Channel test at {time}"),
        }
    }

    /// Get the timestamp of this event.
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::HostDown { timestamp, .. }
            | Self::HostRecovered { timestamp, .. }
            | Self::MonitoringStarted { timestamp, .. }
            | Self::MonitoringStopped { timestamp, .. }
            | Self::MonitorError { timestamp, .. }
            | Self::Test { timestamp } => *timestamp,
        }
    }

    /// Get the host if this event concerns a single host.
    pub fn host(&self) -> Option<&Host> {
        match self {
            Self::HostDown { host, .. } | Self::HostRecovered { host, .. } => Some(host),
            _ => None,
        }
    }
}

fn format_local(ts: DateTime<Utc>) -> String {
    ts.with_timezone(&Local)
        .format("%Y-%m-%d %H:%M:%S")
        .to_string()
}

fn truncate_chars(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    let mut truncated: String = text.chars().take(limit).collect();
    truncated.push('…');
    truncated
}

/// Format duration in seconds into human-readable string.
pub fn format_duration(total_secs: u64) -> String {
    let days = total_secs / 86_400;
    let hours = (total_secs % 86_400) / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;

    if days > 0 {
        format!("{}d {}h {}m {}s", days, hours, minutes, seconds)
    } else if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn router() -> Host {
        Host::new("router", "192.168.1.1").with_description("core router")
    }

    #[test]
    fn test_notification_priority_ordering() {
        assert!(NotificationPriority::Low < NotificationPriority::Normal);
        assert!(NotificationPriority::Normal < NotificationPriority::High);
        assert!(NotificationPriority::High < NotificationPriority::Critical);
    }

    #[test]
    fn test_host_down_event() {
        let transition = Transition::Down {
            at: Utc::now(),
            failed_probes: 3,
        };
        let event = NotificationEvent::from_transition(&router(), &transition);

        assert_eq!(event.priority(), NotificationPriority::Critical);
        assert_eq!(event.event_type(), "host_down");
        assert!(event.title().contains("router"));
        let desc = event.description();
        assert!(desc.contains("192.168.1.1"));
        assert!(desc.contains("core router"));
        assert!(desc.contains("Time: "));
        assert_eq!(event.host(), Some(&router()));
    }

    #[test]
    fn test_recovered_event_includes_downtime() {
        let at = Utc::now();
        let transition = Transition::Recovered {
            at,
            down_since: Some(at - chrono::Duration::seconds(3725)),
            downtime: Some(Duration::from_secs(3725)),
            successful_probes: 2,
        };
        let event = NotificationEvent::from_transition(&router(), &transition);

        assert_eq!(event.event_type(), "host_recovered");
        assert_eq!(event.timestamp(), at);
        let desc = event.description();
        assert!(desc.contains("192.168.1.1"));
        assert!(desc.contains("Downtime: 1h 2m 5s"));
        assert!(desc.contains("Down since: "));
    }

    #[test]
    fn test_recovered_without_known_downtime() {
        let event = NotificationEvent::HostRecovered {
            host: router(),
            down_since: None,
            downtime_secs: None,
            timestamp: Utc::now(),
        };
        assert!(!event.description().contains("Downtime"));
    }

    #[test]
    fn test_started_lists_hosts() {
        let event = NotificationEvent::MonitoringStarted {
            hostname: "watcher".to_string(),
            hosts: vec![router(), Host::new("nas", "192.168.1.10")],
            timestamp: Utc::now(),
        };
        let desc = event.description();
        assert!(desc.contains("Hosts: 2"));
        assert!(desc.contains("watcher"));
        assert!(desc.contains("nas"));
    }

    #[test]
    fn test_stopped_reports_uptime() {
        let event = NotificationEvent::MonitoringStopped {
            uptime_secs: 90,
            timestamp: Utc::now(),
        };
        assert!(event.description().contains("Uptime: 1m 30s"));
    }

    #[test]
    fn test_error_message_is_truncated() {
        let event = NotificationEvent::monitor_error("x".repeat(500));
        let desc = event.description();
        assert!(desc.ends_with('…'));
        assert!(desc.chars().filter(|c| *c == 'x').count() == ERROR_MESSAGE_LIMIT);
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(30), "30s");
        assert_eq!(format_duration(90), "1m 30s");
        assert_eq!(format_duration(3661), "1h 1m 1s");
        assert_eq!(format_duration(90_061), "1d 1h 1m 1s");
    }
}
