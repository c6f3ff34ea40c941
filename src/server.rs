use std::{net::SocketAddr, path::PathBuf, sync::Arc};

use anyhow::Result;
use axum::{
    extract::{ConnectInfo, OriginalUri, Request, State},
    http::{header, HeaderValue, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Form, Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;
use tower_http::{services::ServeDir, set_header::SetResponseHeaderLayer, trace::TraceLayer};
use tracing::{info, warn};

use crate::{
    blocklist::{BlockList, BlockListDocument, SharedBlockList},
    config::Config,
    decoy::{
        AccessPoint, DecoyOutcome, DecoyResponder, DecoyState, InboundRequest, DECOY_PAGE,
        MAX_SUMMARY_HEADERS,
    },
    error::{ParseError, ScanError},
    ledger::{ConnectionLedger, LedgerDocument},
    prober::Prober,
    range::{AddressRange, PortRange, RangePolicy, MAX_SCAN_PORTS},
    scanner::{ScanEngine, DEFAULT_PING_COUNT},
    store::{JsonStore, Slot},
};

const DEFAULT_BLOCK_REASON: &str = "Manual block";

/// Shared state behind every route.
pub struct AppState<P> {
    inner: Arc<Shared<P>>,
}

impl<P> Clone for AppState<P> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct Shared<P> {
    engine: ScanEngine<P>,
    blocklist: SharedBlockList,
    decoy: DecoyResponder,
    store: Option<JsonStore>,
    range_policy: RangePolicy,
    ap_mode: bool,
    default_ssid: String,
    default_channel: u8,
    ui_dir: PathBuf,
    /// Token of the sweep currently running, tagged with a sequence number.
    active_scan: Mutex<Option<(u64, CancellationToken)>>,
    scan_seq: std::sync::atomic::AtomicU64,
}

impl<P: Prober> AppState<P> {
    /// Build the subsystem from `config`, restoring the blocklist and ledger
    /// from `store` when one is given.
    pub fn new(
        config: &Config,
        prober: P,
        access_point: Box<dyn AccessPoint>,
        store: Option<JsonStore>,
    ) -> Self {
        let mut blocklist = BlockList::new(config.blocklist.max_entries);
        let mut ledger = ConnectionLedger::new(config.decoy.ledger_capacity);
        if let Some(store) = &store {
            blocklist.restore(store.load_or_default::<BlockListDocument>(Slot::BlockList));
            ledger.restore(store.load_or_default::<LedgerDocument>(Slot::Ledger));
            info!(
                blocked = blocklist.len(),
                logs = ledger.len(),
                dir = %store.dir().display(),
                "restored persisted state"
            );
        }
        let blocklist = blocklist.into_shared();
        let engine = ScanEngine::new(prober, Arc::clone(&blocklist), config.scan_settings());
        let decoy = DecoyResponder::new(ledger, Arc::clone(&blocklist), access_point, store.clone());

        Self {
            inner: Arc::new(Shared {
                engine,
                blocklist,
                decoy,
                store,
                range_policy: config.scan.range_policy,
                ap_mode: config.network.ap_mode,
                default_ssid: config.decoy.default_ssid.clone(),
                default_channel: config.decoy.default_channel,
                ui_dir: config.server.ui_dir.clone(),
                active_scan: Mutex::new(None),
                scan_seq: std::sync::atomic::AtomicU64::new(0),
            }),
        }
    }

    pub fn engine(&self) -> &ScanEngine<P> {
        &self.inner.engine
    }

    pub fn blocklist(&self) -> &SharedBlockList {
        &self.inner.blocklist
    }

    pub fn decoy(&self) -> &DecoyResponder {
        &self.inner.decoy
    }

    /// Cancel any running sweep and write both documents to storage.
    pub async fn shutdown(&self) {
        self.cancel_scan().await;
        self.persist_blocklist().await;
        self.inner.decoy.flush().await;
    }

    async fn persist_blocklist(&self) {
        if let Some(store) = &self.inner.store {
            let doc = self.inner.blocklist.read().await.to_document();
            store.save_or_warn(Slot::BlockList, &doc);
        }
    }

    /// Register a new sweep, cancelling the previous one.
    async fn begin_scan(&self) -> (u64, CancellationToken) {
        let id = self
            .inner
            .scan_seq
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        let token = CancellationToken::new();
        let mut slot = self.inner.active_scan.lock().await;
        if let Some((_, previous)) = slot.replace((id, token.clone())) {
            info!("cancelling previous sweep");
            previous.cancel();
        }
        (id, token)
    }

    async fn end_scan(&self, id: u64) {
        let mut slot = self.inner.active_scan.lock().await;
        if matches!(slot.as_ref(), Some((current, _)) if *current == id) {
            *slot = None;
        }
    }

    async fn cancel_scan(&self) -> bool {
        match self.inner.active_scan.lock().await.take() {
            Some((_, token)) => {
                token.cancel();
                true
            }
            None => false,
        }
    }
}

/// Build the router: JSON API under `/api`, everything else through the
/// decoy fallback.
pub fn router<P: Prober>(state: AppState<P>) -> Router {
    let api = Router::new()
        .route("/network/ping", post(post_ping::<P>))
        .route("/network/scan", post(post_scan::<P>))
        .route("/network/scan/cancel", post(post_scan_cancel::<P>))
        .route("/network/ports", post(post_ports::<P>))
        .route("/network/block", post(post_block::<P>))
        .route("/network/unblock", post(post_unblock::<P>))
        .route("/network/blocked", get(get_blocked::<P>))
        .route("/honeypot/logs", get(get_logs::<P>))
        .route("/honeypot/clear", post(post_clear::<P>))
        .route("/honeypot/toggle", post(post_toggle::<P>))
        .method_not_allowed_fallback(api_method_fallback::<P>)
        .layer(SetResponseHeaderLayer::overriding(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-store"),
        ));

    Router::new()
        .nest("/api", api)
        .fallback(decoy_fallback::<P>)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind and serve until `shutdown` fires, then flush state.
pub async fn spawn_server<P: Prober>(
    bind: &str,
    state: AppState<P>,
    shutdown: CancellationToken,
) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!(addr = %listener.local_addr()?, "serving API");
    let app = router(state.clone()).into_make_service_with_connect_info::<SocketAddr>();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    state.shutdown().await;
    Ok(())
}

/// Cancel `token` once `signal` fires. A signal that fails to install leaves
/// the token alone so the run continues without signal support.
pub async fn cancel_on_signal<F>(signal: F, token: CancellationToken)
where
    F: std::future::Future<Output = std::io::Result<()>>,
{
    match signal.await {
        Ok(()) => {
            info!("shutdown requested");
            token.cancel();
        }
        Err(e) => warn!(error = %e, "failed to install signal handler"),
    }
}

/// Error response carrying an `{"error": ...}` body.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl From<ParseError> for ApiError {
    fn from(e: ParseError) -> Self {
        match e {
            ParseError::InvalidFormat(_) => Self::bad_request("Invalid IP format"),
            other => Self::bad_request(other.to_string()),
        }
    }
}

impl From<ScanError> for ApiError {
    fn from(e: ScanError) -> Self {
        match e {
            ScanError::Blocked(_) => Self {
                status: StatusCode::FORBIDDEN,
                message: e.to_string(),
            },
            ScanError::Probe(p) => Self::bad_request(p.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

fn required(value: Option<String>, name: &str) -> Result<String, ApiError> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request(format!("Missing {name} parameter")))
}

/// Numeric form fields arrive as text so a malformed value falls back to
/// the default instead of failing the whole request.
fn parse_number(value: Option<&str>) -> Option<i64> {
    value.and_then(|v| v.trim().parse().ok())
}

#[derive(Debug, Deserialize)]
pub struct PingForm {
    host: Option<String>,
    count: Option<String>,
}

async fn post_ping<P: Prober>(
    State(app): State<AppState<P>>,
    Form(form): Form<PingForm>,
) -> Result<impl IntoResponse, ApiError> {
    let host = required(form.host, "host")?;
    let count = parse_number(form.count.as_deref())
        .unwrap_or(i64::from(DEFAULT_PING_COUNT))
        .clamp(1, i64::from(crate::scanner::MAX_PING_COUNT)) as u32;
    let summary = app
        .engine()
        .ping(&host, count, &CancellationToken::new())
        .await;
    Ok(Json(summary))
}

#[derive(Debug, Deserialize)]
pub struct ScanForm {
    #[serde(rename = "startIP")]
    start_ip: Option<String>,
    #[serde(rename = "endIP")]
    end_ip: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Device {
    ip: String,
    mac: String,
    reachable: bool,
    response_time: f64,
}

#[derive(Debug, Serialize)]
struct ScanResponse {
    devices: Vec<Device>,
    truncated: bool,
    cancelled: bool,
}

async fn post_scan<P: Prober>(
    State(app): State<AppState<P>>,
    Form(form): Form<ScanForm>,
) -> Result<impl IntoResponse, ApiError> {
    let (start, end) = match (form.start_ip, form.end_ip) {
        (Some(s), Some(e)) if !s.is_empty() && !e.is_empty() => (s, e),
        _ => return Err(ApiError::bad_request("Missing IP range parameters")),
    };
    let range = AddressRange::parse(&start, &end, app.inner.range_policy)?;
    if range.truncated {
        warn!(requested_end = %end, end = %range.end, "scan range truncated");
    }

    let (id, cancel) = app.begin_scan().await;
    let report = app.engine().sweep_addresses(&range, &cancel).await;
    app.end_scan(id).await;

    let devices = report
        .entries
        .into_iter()
        .filter(|r| r.reachable)
        .map(|r| Device {
            ip: r.address.to_string(),
            mac: "Unknown".to_owned(),
            reachable: r.reachable,
            response_time: r.response_time_ms,
        })
        .collect();
    Ok(Json(ScanResponse {
        devices,
        truncated: range.truncated,
        cancelled: report.cancelled,
    }))
}

async fn post_scan_cancel<P: Prober>(State(app): State<AppState<P>>) -> impl IntoResponse {
    let cancelled = app.cancel_scan().await;
    Json(json!({ "success": cancelled }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortsForm {
    host: Option<String>,
    start_port: Option<i64>,
    end_port: Option<i64>,
}

#[derive(Debug, Serialize)]
struct PortsResponse {
    host: String,
    ports: Vec<crate::types::PortProbeResult>,
    truncated: bool,
    cancelled: bool,
}

async fn post_ports<P: Prober>(
    State(app): State<AppState<P>>,
    Form(form): Form<PortsForm>,
) -> Result<impl IntoResponse, ApiError> {
    let host = required(form.host, "host")?;
    let start = form.start_port.unwrap_or(1);
    let end = form
        .end_port
        .unwrap_or(start.saturating_add(i64::from(MAX_SCAN_PORTS)));
    let to_u32 = |v: i64| u32::try_from(v.max(0)).unwrap_or(u32::MAX);
    let range = PortRange::new(to_u32(start), to_u32(end), app.inner.range_policy)?;
    let address = app
        .engine()
        .prober()
        .resolve(&host)
        .await
        .map_err(ScanError::from)?;

    let (id, cancel) = app.begin_scan().await;
    let result = app.engine().sweep_ports(address, &range, &cancel).await;
    app.end_scan(id).await;
    let report = result?;

    Ok(Json(PortsResponse {
        host,
        ports: report.entries,
        truncated: range.truncated,
        cancelled: report.cancelled,
    }))
}

#[derive(Debug, Deserialize)]
pub struct BlockForm {
    ip: Option<String>,
    reason: Option<String>,
}

async fn ensure_ap_mode<P: Prober>(app: &AppState<P>) -> Result<(), ApiError> {
    if app.inner.ap_mode || app.decoy().is_active().await {
        Ok(())
    } else {
        Err(ApiError::bad_request(
            "IP blocking is only available in AP mode",
        ))
    }
}

fn parse_ip(ip: &str) -> Result<std::net::IpAddr, ApiError> {
    ip.trim()
        .parse()
        .map_err(|_| ApiError::from(ParseError::InvalidFormat(ip.to_owned())))
}

async fn post_block<P: Prober>(
    State(app): State<AppState<P>>,
    Form(form): Form<BlockForm>,
) -> Result<impl IntoResponse, ApiError> {
    ensure_ap_mode(&app).await?;
    let ip = required(form.ip, "IP")?;
    let address = parse_ip(&ip)?;
    let reason = form
        .reason
        .filter(|r| !r.is_empty())
        .unwrap_or_else(|| DEFAULT_BLOCK_REASON.to_owned());

    let success = app.blocklist().write().await.add(address, reason);
    if success {
        info!(%address, "address blocked");
        app.persist_blocklist().await;
    }
    Ok(Json(json!({ "success": success, "ip": ip })))
}

#[derive(Debug, Deserialize)]
pub struct UnblockForm {
    ip: Option<String>,
}

async fn post_unblock<P: Prober>(
    State(app): State<AppState<P>>,
    Form(form): Form<UnblockForm>,
) -> Result<impl IntoResponse, ApiError> {
    ensure_ap_mode(&app).await?;
    let ip = required(form.ip, "IP")?;
    let address = parse_ip(&ip)?;

    let success = app.blocklist().write().await.remove(address);
    if success {
        info!(%address, "address unblocked");
        app.persist_blocklist().await;
    }
    Ok(Json(json!({ "success": success, "ip": ip })))
}

async fn get_blocked<P: Prober>(State(app): State<AppState<P>>) -> impl IntoResponse {
    let doc = app.blocklist().read().await.to_document();
    Json(doc)
}

async fn get_logs<P: Prober>(State(app): State<AppState<P>>) -> impl IntoResponse {
    Json(app.decoy().to_document().await)
}

async fn post_clear<P: Prober>(State(app): State<AppState<P>>) -> impl IntoResponse {
    app.decoy().clear().await;
    Json(json!({ "success": true }))
}

#[derive(Debug, Deserialize)]
pub struct ToggleForm {
    active: Option<String>,
    ssid: Option<String>,
    channel: Option<String>,
}

async fn post_toggle<P: Prober>(
    State(app): State<AppState<P>>,
    Form(form): Form<ToggleForm>,
) -> impl IntoResponse {
    let want_active = form
        .active
        .map(|v| v == "true" || v == "1")
        .unwrap_or(true);
    let ssid = form
        .ssid
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| app.inner.default_ssid.clone());
    let channel = parse_number(form.channel.as_deref())
        .and_then(|c| u8::try_from(c).ok())
        .filter(|c| (1..=13).contains(c))
        .unwrap_or(app.inner.default_channel);

    let decoy = app.decoy();
    let is_active = decoy.is_active().await;
    let success = if want_active && !is_active {
        match decoy.start(&ssid, channel).await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "decoy start failed");
                false
            }
        }
    } else if !want_active && is_active {
        decoy.stop().await
    } else {
        true
    };

    let active = match decoy.state().await {
        DecoyState::Active { ssid, channel } => {
            info!(%ssid, channel, "decoy toggled on");
            true
        }
        DecoyState::Inactive => false,
    };
    Json(json!({ "success": success, "active": active }))
}

fn inbound_request(peer: SocketAddr, req: &Request) -> InboundRequest {
    // Nested routers see the URI with their prefix stripped.
    let uri = req
        .extensions()
        .get::<OriginalUri>()
        .map_or(req.uri(), |original| &original.0);
    InboundRequest {
        source: peer,
        method: req.method().to_string(),
        target: uri
            .path_and_query()
            .map(|pq| pq.as_str().to_owned())
            .unwrap_or_else(|| uri.path().to_owned()),
        headers: req
            .headers()
            .iter()
            .take(MAX_SUMMARY_HEADERS)
            .map(|(name, value)| {
                (
                    name.as_str().to_owned(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect(),
    }
}

/// `Some` when the decoy answered the request itself.
async fn capture<P: Prober>(app: &AppState<P>, inbound: InboundRequest) -> Option<Response> {
    match app.decoy().handle(&inbound).await {
        DecoyOutcome::Served => Some((StatusCode::OK, Html(DECOY_PAGE)).into_response()),
        DecoyOutcome::Refused => Some(StatusCode::FORBIDDEN.into_response()),
        DecoyOutcome::Passthrough => None,
    }
}

async fn decoy_fallback<P: Prober>(
    State(app): State<AppState<P>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    req: Request,
) -> Response {
    let inbound = inbound_request(peer, &req);
    if let Some(res) = capture(&app, inbound).await {
        return res;
    }
    let static_svc = ServeDir::new(&app.inner.ui_dir).append_index_html_on_directories(true);
    match static_svc.oneshot(req).await {
        Ok(res) => res.into_response(),
        Err(never) => match never {},
    }
}

/// API path hit with the wrong method: captured while the decoy runs,
/// otherwise a plain 405.
async fn api_method_fallback<P: Prober>(
    State(app): State<AppState<P>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    req: Request,
) -> Response {
    let inbound = inbound_request(peer, &req);
    match capture(&app, inbound).await {
        Some(res) => res,
        None => StatusCode::METHOD_NOT_ALLOWED.into_response(),
    }
}
