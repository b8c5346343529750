use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use tracing::{debug, trace};

use crate::command::tokio_command;
use crate::{ProbeError, ProbeOutcome, Prober};

const PING_PROGRAM: &str = "ping";

/// Extra time granted to the `ping` process beyond the probe timeout
/// (process start-up, DNS lookup) before it is killed.
const PROCESS_GRACE: Duration = Duration::from_millis(500);

static LATENCY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"time\s*[=<]\s*([0-9]+(?:\.[0-9]+)?)\s*ms").expect("valid latency regex")
});

/// ICMP echo probe backed by the system `ping` executable.
#[derive(Debug, Clone, Default)]
pub struct IcmpProber;

impl IcmpProber {
    pub fn new() -> Self {
        Self
    }
}

/// Build the argument list for a single echo request with the given wait time.
fn ping_args(address: &str, timeout: Duration) -> Vec<String> {
    if cfg!(windows) {
        let millis = timeout.as_millis().max(1);
        vec![
            "-n".into(),
            "1".into(),
            "-w".into(),
            millis.to_string(),
            address.into(),
        ]
    } else {
        // Unix ping only takes whole seconds.
        let secs = timeout.as_secs_f64().ceil().max(1.0) as u64;
        let wait_flag = if cfg!(any(target_os = "macos", target_os = "freebsd")) {
            "-t"
        } else {
            "-W"
        };
        vec![
            "-n".into(),
            "-c".into(),
            "1".into(),
            wait_flag.into(),
            secs.to_string(),
            address.into(),
        ]
    }
}

/// Extract the round-trip time from `ping` output (`time=12.3 ms`, `time<1ms`).
pub fn parse_latency(output: &str) -> Option<Duration> {
    let caps = LATENCY_RE.captures(output)?;
    let millis: f64 = caps.get(1)?.as_str().parse().ok()?;
    Some(Duration::from_secs_f64(millis / 1000.0))
}

fn validate_address(address: &str) -> Result<&str, ProbeError> {
    let trimmed = address.trim();
    // A leading '-' would be taken as an option by ping.
    if trimmed.is_empty() || trimmed.starts_with('-') || trimmed.contains(char::is_whitespace) {
        return Err(ProbeError::InvalidAddress(address.to_string()));
    }
    Ok(trimmed)
}

#[async_trait]
impl Prober for IcmpProber {
    fn name(&self) -> &'static str {
        "icmp"
    }

    async fn probe(&self, address: &str, timeout: Duration) -> Result<ProbeOutcome, ProbeError> {
        let address = validate_address(address)?;
        let mut cmd = tokio_command(PING_PROGRAM);
        cmd.args(ping_args(address, timeout));

        let child = cmd.spawn().map_err(|source| ProbeError::Spawn {
            program: PING_PROGRAM,
            source,
        })?;

        let output = match tokio::time::timeout(timeout + PROCESS_GRACE, child.wait_with_output())
            .await
        {
            Ok(result) => result?,
            Err(_) => {
                // Dropping the future kills the child (kill_on_drop).
                debug!(%address, ?timeout, "ping did not exit in time");
                return Ok(ProbeOutcome::unreachable());
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        trace!(%address, status = ?output.status, %stdout, "ping finished");

        // Windows ping exits 0 for "Destination host unreachable" replies from a router.
        let answered = output.status.success() && (!cfg!(windows) || stdout.contains("TTL="));
        if answered {
            Ok(ProbeOutcome::reachable(parse_latency(&stdout)))
        } else {
            Ok(ProbeOutcome::unreachable())
        }
    }
}
