//! Error types for the reconnaissance and honeypot subsystem.
//!
//! Every error here describes an operation that failed while leaving shared
//! state untouched. None of them is meant to terminate the process; the
//! binary wraps them with `anyhow` only at startup.

use std::path::PathBuf;

/// Failure to turn operator input into an address or port range.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    /// Input is not a dotted-quad IPv4 address (or CIDR / dash range).
    #[error("invalid address format: {0}")]
    InvalidFormat(String),

    /// Range start lies after range end.
    #[error("range start {start} is after range end {end}")]
    Reversed { start: String, end: String },

    /// Range exceeds the scan cap and the reject policy is in effect.
    #[error("range too large: {requested} entries requested, at most {max} allowed")]
    RangeTooLarge { requested: u64, max: u64 },
}

/// Failure in the resolution step that precedes a probe.
///
/// Probes themselves never fail: an unreachable host or a closed port is a
/// normal result.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProbeError {
    #[error("failed to resolve hostname: {0}")]
    HostnameUnresolved(String),
}

/// Reasons a sweep is refused before any probe is issued.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScanError {
    #[error("target {0} is blocked")]
    Blocked(std::net::IpAddr),

    #[error(transparent)]
    Probe(#[from] ProbeError),
}

/// Storage could not be read or written.
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("storage unavailable at {path}: {source}")]
    Unavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed document at {path}: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Decoy responder lifecycle failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecoyError {
    #[error("decoy responder is already active")]
    AlreadyActive,

    #[error("access point failed to start: {0}")]
    AccessPoint(String),
}

/// Configuration loading and validation failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(String),

    #[error("invalid config value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}
