//! Per-host debounce state machine.
//!
//! ```text
//! Up   → Down: failure_threshold consecutive failed probes
//! Down → Up:   recovery_threshold consecutive successful probes
//! ```
//!
//! A probe that agrees with the confirmed status clears the opposite streak.
//! A probe that disagrees extends its own streak and clears the other one.
//! The streak that fires a transition is reset to zero with it, so at most
//! one streak is ever non-zero.
//!
//! Every host starts `Up` with both streaks at zero, whatever the first probe
//! says. After a restart a host that is already down therefore needs a full
//! `failure_threshold` of failures before the first alert.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Last confirmed status of a host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HostStatus {
    Up,
    Down,
}

impl HostStatus {
    pub fn is_up(self) -> bool {
        self == Self::Up
    }

    fn agrees_with(self, probe_succeeded: bool) -> bool {
        self.is_up() == probe_succeeded
    }
}

impl fmt::Display for HostStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Up => write!(f, "up"),
            Self::Down => write!(f, "down"),
        }
    }
}

/// Consecutive-probe thresholds, both at least 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Thresholds {
    failure: u32,
    recovery: u32,
}

impl Thresholds {
    pub fn new(failure: u32, recovery: u32) -> Result<Self> {
        if failure == 0 {
            return Err(Error::validation("failure_threshold must be at least 1"));
        }
        if recovery == 0 {
            return Err(Error::validation("recovery_threshold must be at least 1"));
        }
        Ok(Self { failure, recovery })
    }

    /// Failed probes needed to declare a host down.
    pub fn failure(&self) -> u32 {
        self.failure
    }

    /// Successful probes needed to declare a host recovered.
    pub fn recovery(&self) -> u32 {
        self.recovery
    }
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            failure: 3,
            recovery: 2,
        }
    }
}

/// A confirmed status change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Transition {
    /// The host went from up to down.
    Down {
        at: DateTime<Utc>,
        /// Length of the failure streak that fired the transition.
        failed_probes: u32,
    },
    /// The host went from down to up.
    Recovered {
        at: DateTime<Utc>,
        /// When the host was confirmed down, if known.
        down_since: Option<DateTime<Utc>>,
        /// `at - down_since`.
        downtime: Option<Duration>,
        /// Length of the success streak that fired the transition.
        successful_probes: u32,
    },
}

impl Transition {
    pub fn at(&self) -> DateTime<Utc> {
        match self {
            Self::Down { at, .. } | Self::Recovered { at, .. } => *at,
        }
    }

    pub fn old_status(&self) -> HostStatus {
        match self {
            Self::Down { .. } => HostStatus::Up,
            Self::Recovered { .. } => HostStatus::Down,
        }
    }

    pub fn new_status(&self) -> HostStatus {
        match self {
            Self::Down { .. } => HostStatus::Down,
            Self::Recovered { .. } => HostStatus::Up,
        }
    }

    /// Streak length that triggered the transition.
    pub fn streak(&self) -> u32 {
        match self {
            Self::Down { failed_probes, .. } => *failed_probes,
            Self::Recovered {
                successful_probes, ..
            } => *successful_probes,
        }
    }
}

/// Debounce state for one host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostState {
    /// Last confirmed status.
    pub status: HostStatus,
    /// Consecutive failed probes while confirmed up.
    pub fail_streak: u32,
    /// Consecutive successful probes while confirmed down.
    pub success_streak: u32,
    /// When the host was most recently confirmed down.
    pub last_down_at: Option<DateTime<Utc>>,
}

impl Default for HostState {
    fn default() -> Self {
        Self {
            status: HostStatus::Up,
            fail_streak: 0,
            success_streak: 0,
            last_down_at: None,
        }
    }
}

impl HostState {
    /// Feed one probe result into the state machine.
    ///
    /// Returns the transition if this probe completed a streak. The clock is a
    /// parameter so callers (and tests) control timestamps.
    pub fn apply(
        &mut self,
        probe_succeeded: bool,
        thresholds: &Thresholds,
        now: DateTime<Utc>,
    ) -> Option<Transition> {
        if self.status.agrees_with(probe_succeeded) {
            match self.status {
                HostStatus::Up => self.fail_streak = 0,
                HostStatus::Down => self.success_streak = 0,
            }
            return None;
        }

        if probe_succeeded {
            self.fail_streak = 0;
            self.success_streak = self.success_streak.saturating_add(1);
            if self.success_streak < thresholds.recovery() {
                return None;
            }

            let successful_probes = self.success_streak;
            self.status = HostStatus::Up;
            self.success_streak = 0;

            let down_since = self.last_down_at;
            let downtime = down_since.map(|since| (now - since).to_std().unwrap_or_default());

            Some(Transition::Recovered {
                at: now,
                down_since,
                downtime,
                successful_probes,
            })
        } else {
            self.success_streak = 0;
            self.fail_streak = self.fail_streak.saturating_add(1);
            if self.fail_streak < thresholds.failure() {
                return None;
            }

            let failed_probes = self.fail_streak;
            self.status = HostStatus::Down;
            self.fail_streak = 0;
            self.last_down_at = Some(now);

            Some(Transition::Down {
                at: now,
                failed_probes,
            })
        }
    }

    /// Streak currently counting toward a transition.
    pub fn pending_streak(&self) -> u32 {
        self.fail_streak.max(self.success_streak)
    }
}
