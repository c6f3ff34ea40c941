use crate::blocklist::SharedBlockList;
use crate::error::ScanError;
use crate::prober::Prober;
use crate::range::{AddressRange, PortRange};
use crate::types::{PingSummary, PortProbeResult, ProbeResult, SweepReport};
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Bounds on the number of echo attempts in one ping series.
pub const MAX_PING_COUNT: u32 = 20;
pub const DEFAULT_PING_COUNT: u32 = 5;

/// Timing and reporting knobs for the engine.
#[derive(Debug, Clone)]
pub struct ScanSettings {
    /// Per-probe timeout for sweeps.
    pub probe_timeout: Duration,
    /// Per-attempt timeout for ping series.
    pub ping_timeout: Duration,
    /// Pause after every sweep probe.
    pub inter_probe_delay: Duration,
    /// Pause between ping attempts.
    pub ping_interval: Duration,
    /// Keep closed ports in port sweep results.
    pub report_closed_ports: bool,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            probe_timeout: Duration::from_millis(300),
            ping_timeout: Duration::from_millis(1000),
            inter_probe_delay: Duration::from_millis(5),
            ping_interval: Duration::from_millis(100),
            report_closed_ports: false,
        }
    }
}

/// Drives sequential sweeps over a [`Prober`].
///
/// - Probes run one at a time, in ascending address/port order.
/// - After each probe the engine yields to the scheduler and sleeps for
///   `inter_probe_delay`, so request handling keeps running between probes.
/// - The `CancellationToken` is polled between probes; a cancelled sweep
///   returns what it has collected so far with `cancelled` set.
/// - Blocklist checks take the read lock only for the duration of the check.
pub struct ScanEngine<P> {
    prober: Arc<P>,
    blocklist: SharedBlockList,
    settings: ScanSettings,
}

impl<P> Clone for ScanEngine<P> {
    fn clone(&self) -> Self {
        Self {
            prober: Arc::clone(&self.prober),
            blocklist: Arc::clone(&self.blocklist),
            settings: self.settings.clone(),
        }
    }
}

impl<P: Prober> ScanEngine<P> {
    pub fn new(prober: P, blocklist: SharedBlockList, settings: ScanSettings) -> Self {
        Self {
            prober: Arc::new(prober),
            blocklist,
            settings,
        }
    }

    pub fn prober(&self) -> &P {
        &self.prober
    }

    /// Liveness sweep over `range`. Blocked addresses are neither probed nor
    /// reported; they only bump `skipped`.
    pub async fn sweep_addresses(
        &self,
        range: &AddressRange,
        cancel: &CancellationToken,
    ) -> SweepReport<ProbeResult> {
        let mut report = SweepReport::new(u64::from(range.count()));
        info!(start = %range.start, end = %range.end, truncated = range.truncated, "address sweep started");

        for addr in range.iter() {
            if cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }
            let ip = IpAddr::V4(addr);
            if self.is_blocked(ip).await {
                debug!(address = %ip, "skipping blocked address");
                report.skipped += 1;
                continue;
            }
            let result = self
                .prober
                .probe_liveness(ip, self.settings.probe_timeout)
                .await;
            report.scanned_done += 1;
            report.entries.push(result);
            self.pause().await;
        }

        info!(
            total = report.scanned_total,
            probed = report.scanned_done,
            reachable = report.entries.iter().filter(|r| r.reachable).count(),
            skipped = report.skipped,
            cancelled = report.cancelled,
            "address sweep finished"
        );
        report
    }

    /// TCP connect sweep over `range` on one host. A blocked target is
    /// refused before any probe; otherwise only open ports are kept unless
    /// `report_closed_ports` is set.
    pub async fn sweep_ports(
        &self,
        address: IpAddr,
        range: &PortRange,
        cancel: &CancellationToken,
    ) -> Result<SweepReport<PortProbeResult>, ScanError> {
        if self.is_blocked(address).await {
            warn!(%address, "port sweep refused for blocked target");
            return Err(ScanError::Blocked(address));
        }
        let mut report = SweepReport::new(u64::from(range.count()));
        info!(%address, start = range.start, end = range.end, "port sweep started");

        for port in range.iter() {
            if cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }
            let result = self
                .prober
                .probe_port(address, port, self.settings.probe_timeout)
                .await;
            report.scanned_done += 1;
            if result.open || self.settings.report_closed_ports {
                report.entries.push(result);
            }
            self.pause().await;
        }

        info!(
            %address,
            total = report.scanned_total,
            probed = report.scanned_done,
            open = report.entries.iter().filter(|r| r.open).count(),
            cancelled = report.cancelled,
            "port sweep finished"
        );
        Ok(report)
    }

    /// Resolve `host` and send `count` (clamped to 1..=20) liveness probes.
    ///
    /// Resolution failure and blocked targets produce a failed summary rather
    /// than an error.
    pub async fn ping(&self, host: &str, count: u32, cancel: &CancellationToken) -> PingSummary {
        let count = count.clamp(1, MAX_PING_COUNT);
        let mut summary = PingSummary::failed(host, count);

        let ip = match self.prober.resolve(host).await {
            Ok(ip) => ip,
            Err(e) => {
                warn!(host, error = %e, "ping aborted");
                return summary;
            }
        };
        if self.is_blocked(ip).await {
            warn!(host, address = %ip, "ping refused for blocked target");
            return summary;
        }

        let mut total_ms = 0.0;
        let mut sent = 0;
        for attempt in 0..count {
            if attempt > 0 {
                tokio::time::sleep(self.settings.ping_interval).await;
            }
            if cancel.is_cancelled() {
                break;
            }
            let result = self
                .prober
                .probe_liveness(ip, self.settings.ping_timeout)
                .await;
            sent += 1;
            if result.reachable {
                summary.packets_received += 1;
                total_ms += result.response_time_ms;
            }
            tokio::task::yield_now().await;
        }

        summary.packets_sent = sent;
        if summary.packets_received > 0 {
            summary.success = true;
            summary.avg_time_ms = total_ms / f64::from(summary.packets_received);
        }
        debug!(host, received = summary.packets_received, sent, "ping finished");
        summary
    }

    async fn is_blocked(&self, ip: IpAddr) -> bool {
        self.blocklist.read().await.is_blocked(ip)
    }

    async fn pause(&self) {
        tokio::task::yield_now().await;
        if !self.settings.inter_probe_delay.is_zero() {
            tokio::time::sleep(self.settings.inter_probe_delay).await;
        }
    }
}
