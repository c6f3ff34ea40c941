//! Single-target probes. Every probe carries its own timeout so one silent
//! host cannot stall the rest of the system.

use std::future::Future;
use std::io::ErrorKind;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::time::{self, Instant};
use tracing::trace;

use crate::error::ProbeError;
use crate::services;
use crate::types::{PortProbeResult, ProbeResult};

/// Ports tried, in order, by the TCP connect ping.
pub const DEFAULT_LIVENESS_PORTS: &[u16] = &[80, 443, 22];

/// Transport primitives the scan engine drives.
///
/// Implementations never fail for unreachable targets: an unanswered probe is
/// a normal `reachable: false` / `open: false` result.
pub trait Prober: Send + Sync + 'static {
    /// Turn a literal address or hostname into an address.
    fn resolve(&self, host: &str) -> impl Future<Output = Result<IpAddr, ProbeError>> + Send;

    fn probe_liveness(
        &self,
        address: IpAddr,
        timeout: Duration,
    ) -> impl Future<Output = ProbeResult> + Send;

    /// Attempt one TCP connect. The connection is closed before returning.
    fn probe_port(
        &self,
        address: IpAddr,
        port: u16,
        timeout: Duration,
    ) -> impl Future<Output = PortProbeResult> + Send;
}

/// Prober backed by plain TCP sockets; needs no raw-socket privileges.
///
/// Liveness is a connect ping: a completed handshake or an active refusal
/// both prove the host answered. Only a timeout or a routing error counts as
/// unreachable.
#[derive(Debug, Clone)]
pub struct TcpProber {
    liveness_ports: Vec<u16>,
}

impl Default for TcpProber {
    fn default() -> Self {
        Self::new(DEFAULT_LIVENESS_PORTS.to_vec())
    }
}

impl TcpProber {
    pub fn new(liveness_ports: Vec<u16>) -> Self {
        let liveness_ports = if liveness_ports.is_empty() {
            DEFAULT_LIVENESS_PORTS.to_vec()
        } else {
            liveness_ports
        };
        Self { liveness_ports }
    }
}

impl Prober for TcpProber {
    async fn resolve(&self, host: &str) -> Result<IpAddr, ProbeError> {
        let host = host.trim();
        if let Ok(ip) = host.parse::<IpAddr>() {
            return Ok(ip);
        }
        let unresolved = || ProbeError::HostnameUnresolved(host.to_string());
        let addrs: Vec<SocketAddr> = tokio::net::lookup_host((host, 0))
            .await
            .map_err(|_| unresolved())?
            .collect();
        addrs
            .iter()
            .find(|a| a.is_ipv4())
            .or_else(|| addrs.first())
            .map(|a| a.ip())
            .ok_or_else(unresolved)
    }

    async fn probe_liveness(&self, address: IpAddr, timeout: Duration) -> ProbeResult {
        let start = Instant::now();
        let deadline = start + timeout;
        for &port in &self.liveness_ports {
            let attempt = time::timeout_at(deadline, TcpStream::connect(SocketAddr::new(address, port)));
            let answered = match attempt.await {
                Ok(Ok(stream)) => {
                    drop(stream);
                    true
                }
                Ok(Err(e)) if e.kind() == ErrorKind::ConnectionRefused => true,
                Ok(Err(e)) => {
                    trace!(%address, port, error = %e, "liveness attempt failed");
                    false
                }
                Err(_) => break,
            };
            if answered {
                return ProbeResult {
                    address,
                    reachable: true,
                    response_time_ms: start.elapsed().as_secs_f64() * 1000.0,
                    hostname: Some(address.to_string()),
                };
            }
        }
        ProbeResult::unreachable(address)
    }

    async fn probe_port(&self, address: IpAddr, port: u16, timeout: Duration) -> PortProbeResult {
        let connect = time::timeout(timeout, TcpStream::connect(SocketAddr::new(address, port)));
        let open = match connect.await {
            Ok(Ok(stream)) => {
                drop(stream);
                true
            }
            _ => false,
        };
        PortProbeResult {
            port,
            open,
            service: if open {
                services::lookup(port).unwrap_or_default().to_string()
            } else {
                String::new()
            },
        }
    }
}
