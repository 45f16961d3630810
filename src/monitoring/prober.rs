//! Host reachability probing.
//!
//! A single method is not reliable across mixed environments: raw ICMP
//! needs privileges and is often filtered, while the system `ping`
//! binary is slower but works almost everywhere. The prober therefore
//! tries a fast in-process ICMP echo first and falls back to a single
//! system `ping` invocation with a bounded wait.

use async_trait::async_trait;
use rand::random;
use std::net::IpAddr;
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::net::lookup_host;
use tokio::process::Command;
use tracing::{debug, error, warn};

use crate::db::models::TargetStatus;

pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_millis(3000);

/// Extra wait granted to the external ping process on top of its own
/// timeout before it is force-killed.
const FALLBACK_GRACE: Duration = Duration::from_secs(1);

#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("Empty hostname")]
    EmptyHostname,
    #[error("Failed to resolve hostname '{hostname}': {source}")]
    Resolve {
        hostname: String,
        #[source]
        source: std::io::Error,
    },
}

/// Outcome of a single reachability test.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeStatus {
    Up,
    Down,
}

impl From<ProbeStatus> for TargetStatus {
    fn from(status: ProbeStatus) -> Self {
        match status {
            ProbeStatus::Up => TargetStatus::Up,
            ProbeStatus::Down => TargetStatus::Down,
        }
    }
}

/// Seam between the scheduler and the concrete probing strategy.
#[async_trait]
pub trait Probe: Send + Sync {
    /// Reachability test that distinguishes plain unreachability
    /// (`Ok(Down)`) from probe infrastructure faults (`Err`).
    async fn try_probe(&self, hostname: &str) -> Result<ProbeStatus, ProbeError>;
}

pub struct Prober {
    icmp: Option<surge_ping::Client>,
    timeout: Duration,
}

impl Prober {
    pub fn new(timeout: Duration) -> Self {
        let icmp = match surge_ping::Client::new(&surge_ping::Config::default()) {
            Ok(client) => Some(client),
            Err(e) => {
                // Usually missing CAP_NET_RAW; the system ping fallback
                // still covers every check.
                warn!(error = %e, "ICMP client unavailable, probes will use system ping only");
                None
            }
        };
        Self { icmp, timeout }
    }

    /// Reachability test that never fails: every fault resolves to `Down`.
    pub async fn probe(&self, hostname: &str) -> ProbeStatus {
        match self.try_probe(hostname).await {
            Ok(status) => status,
            Err(e) => {
                debug!(hostname = hostname, error = %e, "Probe fault treated as DOWN");
                ProbeStatus::Down
            }
        }
    }

    /// Sequential convenience over `probe`; results keep input order.
    pub async fn probe_batch(&self, hostnames: &[String]) -> Vec<ProbeStatus> {
        let mut results = Vec::with_capacity(hostnames.len());
        for hostname in hostnames {
            results.push(self.probe(hostname).await);
        }
        results
    }

    /// Best-effort resolution to an address string; returns the input
    /// unchanged when resolution fails.
    pub async fn resolve(&self, hostname: &str) -> String {
        match resolve_addr(hostname).await {
            Ok(addr) => addr.to_string(),
            Err(e) => {
                warn!(hostname = hostname, error = %e, "Failed to resolve hostname");
                hostname.to_string()
            }
        }
    }

    async fn ping_icmp(&self, addr: IpAddr) -> bool {
        let Some(client) = &self.icmp else {
            return false;
        };
        let mut pinger = client.pinger(addr, surge_ping::PingIdentifier(random())).await;
        pinger.timeout(self.timeout);
        match pinger.ping(surge_ping::PingSequence(0), &[]).await {
            Ok((_reply, rtt)) => {
                debug!(addr = %addr, rtt_ms = rtt.as_millis() as u64, "ICMP echo reply");
                true
            }
            Err(e) => {
                debug!(addr = %addr, error = %e, "ICMP probe inconclusive");
                false
            }
        }
    }

    async fn ping_system(&self, hostname: &str) -> bool {
        let mut command = Command::new("ping");
        #[cfg(windows)]
        command.args([
            "-n",
            "1",
            "-w",
            &self.timeout.as_millis().to_string(),
            hostname,
        ]);
        #[cfg(not(windows))]
        command.args([
            "-c",
            "1",
            "-W",
            &self.timeout.as_secs().max(1).to_string(),
            hostname,
        ]);
        command
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                error!(hostname = hostname, error = %e, "Failed to spawn system ping");
                return false;
            }
        };

        match tokio::time::timeout(self.timeout + FALLBACK_GRACE, child.wait()).await {
            Ok(Ok(status)) => status.success(),
            Ok(Err(e)) => {
                error!(hostname = hostname, error = %e, "IO error waiting for system ping");
                false
            }
            Err(_) => {
                warn!(hostname = hostname, "System ping timeout, killing process");
                if let Err(e) = child.kill().await {
                    error!(hostname = hostname, error = %e, "Failed to kill system ping");
                }
                false
            }
        }
    }
}

impl Default for Prober {
    fn default() -> Self {
        Self::new(DEFAULT_PROBE_TIMEOUT)
    }
}

#[async_trait]
impl Probe for Prober {
    async fn try_probe(&self, hostname: &str) -> Result<ProbeStatus, ProbeError> {
        let hostname = hostname.trim();
        if hostname.is_empty() {
            return Err(ProbeError::EmptyHostname);
        }

        let addr = resolve_addr(hostname).await?;

        if self.ping_icmp(addr).await {
            debug!(hostname = hostname, "Host reachable via ICMP");
            return Ok(ProbeStatus::Up);
        }

        debug!(hostname = hostname, "Primary probe inconclusive, trying system ping");
        if self.ping_system(hostname).await {
            debug!(hostname = hostname, "Host reachable via system ping");
            return Ok(ProbeStatus::Up);
        }

        debug!(hostname = hostname, "Host not reachable by any method");
        Ok(ProbeStatus::Down)
    }
}

async fn resolve_addr(hostname: &str) -> Result<IpAddr, ProbeError> {
    // Port 0 satisfies the socket-address form without implying one.
    let mut addrs = lookup_host(format!("{hostname}:0"))
        .await
        .map_err(|source| ProbeError::Resolve {
            hostname: hostname.to_string(),
            source,
        })?;
    addrs
        .next()
        .map(|addr| addr.ip())
        .ok_or_else(|| ProbeError::Resolve {
            hostname: hostname.to_string(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "no addresses returned"),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn empty_hostname_is_an_infrastructure_fault() {
        let prober = Prober::default();
        assert!(matches!(
            prober.try_probe("   ").await,
            Err(ProbeError::EmptyHostname)
        ));
    }

    #[tokio::test]
    async fn probe_never_fails() {
        let prober = Prober::default();
        // Fault path collapses to Down rather than an error.
        assert_eq!(prober.probe("").await, ProbeStatus::Down);
    }

    #[tokio::test]
    async fn resolve_keeps_ip_literals() {
        let prober = Prober::default();
        assert_eq!(prober.resolve("127.0.0.1").await, "127.0.0.1");
    }

    #[tokio::test]
    async fn resolve_returns_input_on_failure() {
        let prober = Prober::default();
        assert_eq!(prober.resolve("").await, "");
    }
}
