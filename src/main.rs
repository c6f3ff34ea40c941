use std::fs::File;
use std::path::PathBuf;

use lan_sentry::blocklist::BlockList;
use lan_sentry::config::Config;
use lan_sentry::decoy::HostAccessPoint;
use lan_sentry::prober::TcpProber;
use lan_sentry::range::{AddressRange, PortRange};
use lan_sentry::scanner::ScanEngine;
use lan_sentry::server::{self, AppState};
use lan_sentry::store::{JsonStore, Slot};
use lan_sentry::types::{PortProbeResult, ProbeResult};
use lan_sentry::{logging, netdetect};

use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// lan-sentry: LAN reconnaissance and honeypot monitor for single-threaded hosts.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "lan-sentry",
    version,
    about = "LAN reconnaissance and honeypot monitor: ping sweeps, TCP connect scans, blocklist and connection ledger.",
    long_about = None
)]
struct Cli {
    /// Path to the TOML config file. Missing file means built-in defaults.
    #[arg(long, default_value = "lan-sentry.toml")]
    config: PathBuf,

    /// Override the HTTP bind address (e.g. 0.0.0.0:8080).
    #[arg(long)]
    bind: Option<String>,

    /// Override the directory holding persisted blocklist and ledger documents.
    #[arg(long = "data-dir")]
    data_dir: Option<PathBuf>,

    /// Override the log format (pretty or json).
    #[arg(long = "log-format")]
    log_format: Option<String>,

    /// Run one sweep, print the results and exit instead of serving.
    #[arg(long, default_value_t = false)]
    sweep: bool,

    /// Sweep target: IP, `start-end` range or CIDR. If omitted, auto-detect local /24s.
    #[arg(long, requires = "sweep")]
    targets: Option<String>,

    /// Port range (e.g. `20-25`) to connect-scan on every reachable host.
    #[arg(long, requires = "sweep")]
    ports: Option<String>,

    /// Write sweep results as pretty JSON to this path.
    #[arg(long, requires = "sweep")]
    output: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
struct HostReport {
    #[serde(flatten)]
    probe: ProbeResult,
    open_ports: Vec<PortProbeResult>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load(&cli.config)
        .with_context(|| format!("failed to load config {}", cli.config.display()))?;
    if let Some(bind) = cli.bind.clone() {
        config.server.bind = bind;
    }
    if let Some(dir) = cli.data_dir.clone() {
        config.general.data_dir = dir;
    }
    if let Some(format) = cli.log_format.clone() {
        config.general.log_format = format;
    }
    config.validate()?;
    logging::init_tracing(&config.general)?;

    info!(
        config = %cli.config.display(),
        bind = %config.server.bind,
        data_dir = %config.general.data_dir.display(),
        range_policy = ?config.scan.range_policy,
        "lan-sentry starting"
    );

    let prober = TcpProber::new(config.scan.liveness_ports.clone());

    if cli.sweep {
        return run_sweep(&cli, &config, prober).await;
    }

    let store = JsonStore::new(&config.general.data_dir);
    let state = AppState::new(&config, prober, Box::new(HostAccessPoint), Some(store));

    let shutdown = CancellationToken::new();
    let on_signal = shutdown.clone();
    tokio::spawn(server::cancel_on_signal(tokio::signal::ctrl_c(), on_signal));

    server::spawn_server(&config.server.bind, state, shutdown).await?;
    info!("state flushed, exiting");
    Ok(())
}

async fn run_sweep(cli: &Cli, config: &Config, prober: TcpProber) -> Result<()> {
    let policy = config.scan.range_policy;
    let ranges = match cli.targets.as_deref() {
        Some(t) => vec![AddressRange::parse_target(t, policy)?],
        None => {
            let ranges = netdetect::local_sweep_ranges().context("failed to detect local networks")?;
            for r in &ranges {
                info!(start = %r.start, end = %r.end, hosts = r.count(), "detected local network");
            }
            ranges
        }
    };
    let ports = cli
        .ports
        .as_deref()
        .map(|p| PortRange::parse(p, policy))
        .transpose()?;

    // Honour the persisted blocklist; a one-shot sweep never writes it back.
    let mut blocklist = BlockList::new(config.blocklist.max_entries);
    let store = JsonStore::new(&config.general.data_dir);
    blocklist.restore(store.load_or_default(Slot::BlockList));
    let engine = ScanEngine::new(prober, blocklist.into_shared(), config.scan_settings());

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(server::cancel_on_signal(tokio::signal::ctrl_c(), on_signal));

    let mut hosts = Vec::new();
    for range in &ranges {
        if range.truncated {
            warn!(start = %range.start, end = %range.end, "target range truncated");
        }
        let report = engine.sweep_addresses(range, &cancel).await;
        for probe in report.entries.into_iter().filter(|p| p.reachable) {
            let open_ports = match &ports {
                Some(pr) => match engine.sweep_ports(probe.address, pr, &cancel).await {
                    Ok(r) => r.entries,
                    Err(e) => {
                        warn!(address = %probe.address, error = %e, "port sweep skipped");
                        Vec::new()
                    }
                },
                None => Vec::new(),
            };
            hosts.push(HostReport { probe, open_ports });
        }
        if cancel.is_cancelled() {
            break;
        }
    }

    print_results_table(&hosts);
    if let Some(path) = cli.output.as_deref() {
        match write_results_json(path, &hosts) {
            Ok(()) => println!("Wrote JSON results to {}", path.display()),
            Err(e) => eprintln!("Failed to write JSON to {}: {}", path.display(), e),
        }
    }
    Ok(())
}

fn print_results_table(hosts: &[HostReport]) {
    let ip_w = hosts
        .iter()
        .map(|h| h.probe.address.to_string().len())
        .fold("ip".len(), usize::max);
    let lat_w = "latency_ms".len();

    println!("\nReachable hosts: {}", hosts.len());
    println!(
        "{:<ip_w$}  {:>lat_w$}  open_ports",
        "ip",
        "latency_ms",
        ip_w = ip_w,
        lat_w = lat_w
    );
    println!(
        "{:-<ip_w$}  {:-<lat_w$}  {:-<10}",
        "",
        "",
        "",
        ip_w = ip_w,
        lat_w = lat_w
    );
    for h in hosts {
        let ports: Vec<String> = h
            .open_ports
            .iter()
            .map(|p| {
                if p.service.is_empty() {
                    p.port.to_string()
                } else {
                    format!("{}/{}", p.port, p.service)
                }
            })
            .collect();
        println!(
            "{:<ip_w$}  {:>lat_w$.1}  {}",
            h.probe.address.to_string(),
            h.probe.response_time_ms,
            ports.join(", "),
            ip_w = ip_w,
            lat_w = lat_w
        );
    }
}

fn write_results_json(path: &std::path::Path, hosts: &[HostReport]) -> anyhow::Result<()> {
    let file = File::create(path)?;
    serde_json::to_writer_pretty(file, hosts)?;
    Ok(())
}
