#![allow(dead_code)]

use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Body;
use axum::extract::connect_info::MockConnectInfo;
use axum::http::{Request, StatusCode};
use axum::Router;
use lan_sentry::config::Config;
use lan_sentry::decoy::HostAccessPoint;
use lan_sentry::error::ProbeError;
use lan_sentry::prober::Prober;
use lan_sentry::server::{router, AppState};
use lan_sentry::store::JsonStore;
use lan_sentry::types::{PortProbeResult, ProbeResult};
use serde_json::Value;
use tower::ServiceExt;

/// Source address every test request appears to come from.
pub const PEER: SocketAddr = SocketAddr::new(IpAddr::V4(Ipv4Addr::new(192, 168, 4, 2)), 51515);

/// Deterministic prober: answers from fixed sets and records every target.
#[derive(Default, Clone)]
pub struct ScriptedProber {
    pub alive: HashSet<IpAddr>,
    pub open_ports: HashSet<u16>,
    pub probed: Arc<Mutex<Vec<IpAddr>>>,
}

impl ScriptedProber {
    pub fn with_alive(addrs: &[&str]) -> Self {
        Self {
            alive: addrs.iter().map(|a| a.parse().unwrap()).collect(),
            ..Self::default()
        }
    }

    pub fn probed(&self) -> Vec<IpAddr> {
        self.probed.lock().unwrap().clone()
    }
}

impl Prober for ScriptedProber {
    async fn resolve(&self, host: &str) -> Result<IpAddr, ProbeError> {
        host.parse()
            .map_err(|_| ProbeError::HostnameUnresolved(host.to_string()))
    }

    async fn probe_liveness(&self, address: IpAddr, _timeout: Duration) -> ProbeResult {
        self.probed.lock().unwrap().push(address);
        if self.alive.contains(&address) {
            ProbeResult {
                address,
                reachable: true,
                response_time_ms: 3.0,
                hostname: Some(address.to_string()),
            }
        } else {
            ProbeResult::unreachable(address)
        }
    }

    async fn probe_port(&self, _address: IpAddr, port: u16, _timeout: Duration) -> PortProbeResult {
        let open = self.open_ports.contains(&port);
        PortProbeResult {
            port,
            open,
            service: if open {
                lan_sentry::services::lookup(port).unwrap_or_default().to_string()
            } else {
                String::new()
            },
        }
    }
}

/// Defaults with all pacing delays removed and the UI pointed at `dir`.
pub fn test_config(dir: &Path) -> Config {
    let mut config = Config::default();
    config.scan.inter_probe_delay_ms = 0;
    config.scan.ping_interval_ms = 0;
    config.server.ui_dir = dir.join("ui");
    config.general.data_dir = dir.join("data");
    config
}

pub fn app(config: &Config, prober: ScriptedProber, store: Option<JsonStore>) -> (AppState<ScriptedProber>, Router) {
    let state = AppState::new(config, prober, Box::new(HostAccessPoint), store);
    let router = router(state.clone()).layer(MockConnectInfo(PEER));
    (state, router)
}

pub async fn post_form(router: &Router, uri: &str, body: &str) -> (StatusCode, Value) {
    let req = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/x-www-form-urlencoded")
        .body(Body::from(body.to_owned()))
        .unwrap();
    send(router, req).await
}

pub async fn get_json(router: &Router, uri: &str) -> (StatusCode, Value) {
    let req = Request::builder().uri(uri).body(Body::empty()).unwrap();
    send(router, req).await
}

pub async fn get_raw(router: &Router, uri: &str) -> (StatusCode, String) {
    let req = Request::builder()
        .uri(uri)
        .header("user-agent", "probe/1.0")
        .body(Body::empty())
        .unwrap();
    let resp = router.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    (status, String::from_utf8_lossy(&bytes).into_owned())
}

async fn send(router: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let resp = router.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}
