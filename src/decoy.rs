//! Honeypot responder: while active, every inbound request that reaches it is
//! written to the [`ConnectionLedger`] and answered with a fixed page.

use std::net::SocketAddr;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::blocklist::SharedBlockList;
use crate::error::DecoyError;
use crate::ledger::{ConnectionEvent, ConnectionLedger, LedgerDocument};
use crate::store::{JsonStore, Slot};
use crate::types::now_millis;

/// Page served to every request while the decoy is active.
pub const DECOY_PAGE: &str =
    "<html><body><h1>Welcome</h1><p>This is a test page.</p></body></html>";

/// At most this many headers are kept in a request summary.
pub const MAX_SUMMARY_HEADERS: usize = 5;

pub const DEFAULT_SSID: &str = "HoneypotAP";
pub const DEFAULT_CHANNEL: u8 = 1;

/// Radio-side collaborator bringing the open access point up and down.
pub trait AccessPoint: Send + Sync + 'static {
    fn start(&self, ssid: &str, channel: u8) -> Result<(), DecoyError>;
    fn stop(&self);
}

/// Access point for hosts where the radio is managed elsewhere; it only
/// records the transitions in the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct HostAccessPoint;

impl AccessPoint for HostAccessPoint {
    fn start(&self, ssid: &str, channel: u8) -> Result<(), DecoyError> {
        info!(ssid, channel, "open access point requested");
        Ok(())
    }

    fn stop(&self) {
        info!("access point teardown requested");
    }
}

/// The parts of an inbound request the decoy looks at.
#[derive(Debug, Clone)]
pub struct InboundRequest {
    pub source: SocketAddr,
    pub method: String,
    /// Path including any query string.
    pub target: String,
    pub headers: Vec<(String, String)>,
}

impl InboundRequest {
    /// `METHOD target HTTP/1.1` followed by up to [`MAX_SUMMARY_HEADERS`]
    /// `name: value` lines.
    pub fn summary(&self) -> String {
        let mut out = format!("{} {} HTTP/1.1\n", self.method, self.target);
        for (name, value) in self.headers.iter().take(MAX_SUMMARY_HEADERS) {
            out.push_str(name);
            out.push_str(": ");
            out.push_str(value);
            out.push('\n');
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecoyState {
    Inactive,
    Active { ssid: String, channel: u8 },
}

/// What the transport should do with a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecoyOutcome {
    /// Decoy is inactive; handle the request normally.
    Passthrough,
    /// Source is blocked; answer with a bare refusal and record nothing.
    Refused,
    /// Request was recorded; answer with [`DECOY_PAGE`].
    Served,
}

struct Inner {
    state: DecoyState,
    ledger: ConnectionLedger,
}

pub struct DecoyResponder {
    inner: Mutex<Inner>,
    blocklist: SharedBlockList,
    access_point: Box<dyn AccessPoint>,
    store: Option<JsonStore>,
}

impl DecoyResponder {
    pub fn new(
        ledger: ConnectionLedger,
        blocklist: SharedBlockList,
        access_point: Box<dyn AccessPoint>,
        store: Option<JsonStore>,
    ) -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: DecoyState::Inactive,
                ledger,
            }),
            blocklist,
            access_point,
            store,
        }
    }

    /// Bring up the open access point and start capturing. Channels outside
    /// 1..=13 fall back to 1.
    pub async fn start(&self, ssid: &str, channel: u8) -> Result<(), DecoyError> {
        let channel = if (1..=13).contains(&channel) {
            channel
        } else {
            DEFAULT_CHANNEL
        };
        let mut inner = self.inner.lock().await;
        if matches!(inner.state, DecoyState::Active { .. }) {
            return Err(DecoyError::AlreadyActive);
        }
        self.access_point.start(ssid, channel)?;
        inner.state = DecoyState::Active {
            ssid: ssid.to_string(),
            channel,
        };
        info!(ssid, channel, "decoy responder active");
        Ok(())
    }

    /// Tear the access point down. Returns false when already inactive.
    pub async fn stop(&self) -> bool {
        let mut inner = self.inner.lock().await;
        if inner.state == DecoyState::Inactive {
            return false;
        }
        self.access_point.stop();
        inner.state = DecoyState::Inactive;
        info!("decoy responder inactive");
        true
    }

    pub async fn state(&self) -> DecoyState {
        self.inner.lock().await.state.clone()
    }

    pub async fn is_active(&self) -> bool {
        matches!(self.inner.lock().await.state, DecoyState::Active { .. })
    }

    /// Classify and, when capturing, record `request`.
    pub async fn handle(&self, request: &InboundRequest) -> DecoyOutcome {
        let source = request.source.ip();
        // Never hold the ledger lock while waiting on the blocklist.
        let blocked = self.blocklist.read().await.is_blocked(source);
        let doc = {
            let mut inner = self.inner.lock().await;
            if inner.state == DecoyState::Inactive {
                return DecoyOutcome::Passthrough;
            }
            if blocked {
                debug!(%source, "refusing blocked source");
                return DecoyOutcome::Refused;
            }
            let event = ConnectionEvent::new(
                source,
                request.source.port(),
                request.summary(),
                now_millis(),
            );
            if let Some(old) = inner.ledger.record(event) {
                debug!(evicted = %old.source_address, "ledger full, oldest event evicted");
            }
            warn!(%source, method = %request.method, target = %request.target, "decoy captured request");
            inner.ledger.to_document()
        };
        if let Some(store) = &self.store {
            store.save_or_warn(Slot::Ledger, &doc);
        }
        DecoyOutcome::Served
    }

    /// Snapshot of the ledger, oldest first.
    pub async fn events(&self) -> Vec<ConnectionEvent> {
        self.inner.lock().await.ledger.all().cloned().collect()
    }

    pub async fn clear(&self) {
        let doc = {
            let mut inner = self.inner.lock().await;
            inner.ledger.clear();
            inner.ledger.to_document()
        };
        if let Some(store) = &self.store {
            store.save_or_warn(Slot::Ledger, &doc);
        }
    }

    pub async fn to_document(&self) -> LedgerDocument {
        self.inner.lock().await.ledger.to_document()
    }

    /// Write the ledger to storage now.
    pub async fn flush(&self) {
        let doc = self.to_document().await;
        if let Some(store) = &self.store {
            store.save_or_warn(Slot::Ledger, &doc);
        }
    }
}
