use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use ::time::OffsetDateTime;

/// Outcome of one liveness probe against a single address.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ProbeResult {
    pub address: IpAddr,
    pub reachable: bool,
    /// Round-trip of the successful probe; 0 when unreachable.
    pub response_time_ms: f64,
    /// Best-effort name; may simply be the address rendered as text.
    pub hostname: Option<String>,
}

impl ProbeResult {
    pub fn unreachable(address: IpAddr) -> Self {
        Self {
            address,
            reachable: false,
            response_time_ms: 0.0,
            hostname: None,
        }
    }
}

/// Outcome of one TCP connect probe.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PortProbeResult {
    pub port: u16,
    pub open: bool,
    /// Well-known service name, empty when the port is not catalogued.
    pub service: String,
}

/// Aggregate results and progress counters for one sweep.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SweepReport<T> {
    pub scanned_total: u64,
    pub scanned_done: u64,
    /// Targets passed over because they are on the blocklist.
    pub skipped: u64,
    pub cancelled: bool,
    pub entries: Vec<T>,
}

impl<T> SweepReport<T> {
    pub fn new(scanned_total: u64) -> Self {
        Self {
            scanned_total,
            scanned_done: 0,
            skipped: 0,
            cancelled: false,
            entries: Vec::new(),
        }
    }
}

/// Summary of a ping series against one host.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PingSummary {
    pub host: String,
    pub success: bool,
    pub packets_sent: u32,
    pub packets_received: u32,
    /// Mean of the successful attempts only.
    #[serde(rename = "avgTime")]
    pub avg_time_ms: f64,
}

impl PingSummary {
    pub fn failed(host: impl Into<String>, packets_sent: u32) -> Self {
        Self {
            host: host.into(),
            success: false,
            packets_sent,
            packets_received: 0,
            avg_time_ms: 0.0,
        }
    }
}

/// Wall-clock milliseconds since the Unix epoch.
pub fn now_millis() -> u64 {
    let nanos = OffsetDateTime::now_utc().unix_timestamp_nanos();
    u64::try_from(nanos / 1_000_000).unwrap_or(0)
}
