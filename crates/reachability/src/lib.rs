//! Host reachability probes.
//!
//! A [`Prober`] answers one question: did `address` respond within `timeout`?
//! Unreachable hosts are a normal [`ProbeOutcome`], never an error. A
//! [`ProbeError`] means the probe itself could not be carried out (the `ping`
//! executable is missing, the address is malformed, ...). Callers that only
//! care about up/down treat both the same way.
//!
//! Two implementations are provided:
//! - [`IcmpProber`]: runs the platform `ping` executable for a single echo
//!   request, which avoids needing raw-socket privileges in this process.
//! - [`TcpProber`]: opens a TCP connection to a port.

pub mod command;
mod icmp;
mod tcp;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub use icmp::{IcmpProber, parse_latency};
pub use tcp::TcpProber;

/// Result of a single completed probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeOutcome {
    /// Whether the host answered.
    pub reachable: bool,
    /// Round-trip time, when the probe mechanism reports one.
    pub latency: Option<Duration>,
}

impl ProbeOutcome {
    pub fn reachable(latency: Option<Duration>) -> Self {
        Self {
            reachable: true,
            latency,
        }
    }

    pub fn unreachable() -> Self {
        Self {
            reachable: false,
            latency: None,
        }
    }
}

/// The probe could not be executed.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("failed to spawn `{program}`: {source}")]
    Spawn {
        program: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid address `{0}`")]
    InvalidAddress(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A reachability check against one address.
#[async_trait]
pub trait Prober: Send + Sync {
    /// Short name of the mechanism, used in logs.
    fn name(&self) -> &'static str;

    /// Probe `address`, taking no longer than `timeout` plus process overhead.
    async fn probe(&self, address: &str, timeout: Duration) -> Result<ProbeOutcome, ProbeError>;
}
