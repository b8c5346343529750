use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::net::TcpStream;
use tracing::debug;

use crate::{ProbeError, ProbeOutcome, Prober};

/// TCP connect probe.
///
/// A completed handshake counts as reachable; refusal, unreachable-network
/// errors and timeouts count as unreachable.
#[derive(Debug, Clone)]
pub struct TcpProber {
    default_port: u16,
}

impl TcpProber {
    /// `default_port` is used when the probed address carries no port.
    pub fn new(default_port: u16) -> Self {
        Self { default_port }
    }

    fn target(&self, address: &str) -> Result<String, ProbeError> {
        let address = address.trim();
        if address.is_empty() {
            return Err(ProbeError::InvalidAddress(address.to_string()));
        }

        // Bracketed IPv6 with port, or host:port.
        if address.starts_with('[') {
            return if address.contains("]:") {
                Ok(address.to_string())
            } else {
                Ok(format!("{address}:{}", self.default_port))
            };
        }

        match address.matches(':').count() {
            0 => Ok(format!("{address}:{}", self.default_port)),
            1 => Ok(address.to_string()),
            // Bare IPv6 literal.
            _ => Ok(format!("[{address}]:{}", self.default_port)),
        }
    }
}

#[async_trait]
impl Prober for TcpProber {
    fn name(&self) -> &'static str {
        "tcp"
    }

    async fn probe(&self, address: &str, timeout: Duration) -> Result<ProbeOutcome, ProbeError> {
        let target = self.target(address)?;
        let started = Instant::now();

        match tokio::time::timeout(timeout, TcpStream::connect(&target)).await {
            Ok(Ok(_stream)) => Ok(ProbeOutcome::reachable(Some(started.elapsed()))),
            Ok(Err(e)) => {
                debug!(%target, error = %e, "tcp probe connection failed");
                Ok(ProbeOutcome::unreachable())
            }
            Err(_) => {
                debug!(%target, "tcp probe timed out");
                Ok(ProbeOutcome::unreachable())
            }
        }
    }
}
