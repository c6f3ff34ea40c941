//! Runtime configuration loaded from `lan-sentry.toml`.
//!
//! Precedence, highest first: CLI flags, `LAN_SENTRY_*` environment
//! variables, the config file, built-in defaults. Every section is optional.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::blocklist::DEFAULT_MAX_ENTRIES;
use crate::decoy::{DEFAULT_CHANNEL, DEFAULT_SSID};
use crate::error::ConfigError;
use crate::ledger::DEFAULT_CAPACITY;
use crate::prober::DEFAULT_LIVENESS_PORTS;
use crate::range::RangePolicy;
use crate::scanner::ScanSettings;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub scan: ScanConfig,
    #[serde(default)]
    pub blocklist: BlockListConfig,
    #[serde(default)]
    pub decoy: DecoyConfig,
}

impl Config {
    /// Load `path`, apply environment overrides and validate. A missing file
    /// yields the defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let mut config = match std::fs::read_to_string(path) {
            Ok(text) => Self::parse(&text)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Self::default(),
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn parse(toml_str: &str) -> Result<Self, ConfigError> {
        toml::from_str(toml_str).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Environment variables: `LAN_SENTRY_BIND`, `LAN_SENTRY_DATA_DIR`,
    /// `LAN_SENTRY_LOG_LEVEL`, `LAN_SENTRY_AP_MODE`.
    pub fn apply_env_overrides(&mut self) {
        override_string(&mut self.server.bind, "LAN_SENTRY_BIND");
        override_path(&mut self.general.data_dir, "LAN_SENTRY_DATA_DIR");
        override_string(&mut self.general.log_level, "LAN_SENTRY_LOG_LEVEL");
        if let Ok(v) = std::env::var("LAN_SENTRY_AP_MODE") {
            match v.parse::<bool>() {
                Ok(b) => self.network.ap_mode = b,
                Err(_) => tracing::warn!(value = %v, "ignoring invalid LAN_SENTRY_AP_MODE"),
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(ConfigError::Invalid {
                field: "general.log_level",
                reason: format!("must be one of: {}", valid_levels.join(", ")),
            });
        }
        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.general.log_format.as_str()) {
            return Err(ConfigError::Invalid {
                field: "general.log_format",
                reason: format!("must be one of: {}", valid_formats.join(", ")),
            });
        }
        if self.scan.probe_timeout_ms == 0 || self.scan.ping_timeout_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "scan.probe_timeout_ms",
                reason: "probe timeouts must be non-zero".to_owned(),
            });
        }
        if self.decoy.ledger_capacity == 0 {
            return Err(ConfigError::Invalid {
                field: "decoy.ledger_capacity",
                reason: "must be at least 1".to_owned(),
            });
        }
        if !(1..=13).contains(&self.decoy.default_channel) {
            return Err(ConfigError::Invalid {
                field: "decoy.default_channel",
                reason: "must be within 1..=13".to_owned(),
            });
        }
        Ok(())
    }

    pub fn scan_settings(&self) -> ScanSettings {
        ScanSettings {
            probe_timeout: Duration::from_millis(self.scan.probe_timeout_ms),
            ping_timeout: Duration::from_millis(self.scan.ping_timeout_ms),
            inter_probe_delay: Duration::from_millis(self.scan.inter_probe_delay_ms),
            ping_interval: Duration::from_millis(self.scan.ping_interval_ms),
            report_closed_ports: self.scan.report_closed_ports,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    pub log_level: String,
    /// `pretty` or `json`.
    pub log_format: String,
    /// Directory holding the persisted blocklist and ledger documents.
    pub data_dir: PathBuf,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "pretty".to_owned(),
            data_dir: PathBuf::from("data"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    /// Static UI served to non-API paths while the decoy is inactive.
    pub ui_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8080".to_owned(),
            ui_dir: PathBuf::from("ui"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Host is serving its own access point. Block/unblock requests are only
    /// accepted in AP mode or while the decoy is active.
    pub ap_mode: bool,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self { ap_mode: true }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    pub probe_timeout_ms: u64,
    pub ping_timeout_ms: u64,
    pub inter_probe_delay_ms: u64,
    pub ping_interval_ms: u64,
    pub range_policy: RangePolicy,
    pub report_closed_ports: bool,
    /// Ports tried by the TCP connect ping.
    pub liveness_ports: Vec<u16>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            probe_timeout_ms: 300,
            ping_timeout_ms: 1000,
            inter_probe_delay_ms: 5,
            ping_interval_ms: 100,
            range_policy: RangePolicy::Clamp,
            report_closed_ports: false,
            liveness_ports: DEFAULT_LIVENESS_PORTS.to_vec(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlockListConfig {
    pub max_entries: usize,
}

impl Default for BlockListConfig {
    fn default() -> Self {
        Self {
            max_entries: DEFAULT_MAX_ENTRIES,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecoyConfig {
    pub ledger_capacity: usize,
    pub default_ssid: String,
    pub default_channel: u8,
}

impl Default for DecoyConfig {
    fn default() -> Self {
        Self {
            ledger_capacity: DEFAULT_CAPACITY,
            default_ssid: DEFAULT_SSID.to_owned(),
            default_channel: DEFAULT_CHANNEL,
        }
    }
}

fn override_string(target: &mut String, key: &str) {
    if let Ok(v) = std::env::var(key) {
        if !v.is_empty() {
            *target = v;
        }
    }
}

fn override_path(target: &mut PathBuf, key: &str) {
    if let Ok(v) = std::env::var(key) {
        if !v.is_empty() {
            *target = PathBuf::from(v);
        }
    }
}
