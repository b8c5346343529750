//! Host Monitor module for tracking reachability.
//!
//! The Host Monitor is responsible for:
//! - Probing every registered host on a fixed cadence
//! - Debouncing probe results into confirmed up/down transitions
//! - Emitting transition events for the notification system

mod service;
mod tracker;

pub use service::{CycleReport, HostCheck, HostMonitor, MonitorSettings};
pub use tracker::{HostState, HostStatus, Thresholds, Transition};
