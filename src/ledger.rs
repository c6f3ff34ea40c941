//! Bounded FIFO log of inbound connection events seen by the decoy.

use std::collections::VecDeque;
use std::net::IpAddr;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Capacity used when none is configured.
pub const DEFAULT_CAPACITY: usize = 10;

/// Upper bound, in bytes, on a stored request summary.
pub const MAX_SUMMARY_BYTES: usize = 512;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionEvent {
    pub source_address: IpAddr,
    pub source_port: u16,
    /// Method, path and a bounded subset of headers; at most
    /// [`MAX_SUMMARY_BYTES`] long.
    pub request_summary: String,
    pub timestamp: u64,
}

impl ConnectionEvent {
    pub fn new(
        source_address: IpAddr,
        source_port: u16,
        request_summary: impl Into<String>,
        timestamp: u64,
    ) -> Self {
        let mut request_summary = request_summary.into();
        truncate_on_char_boundary(&mut request_summary, MAX_SUMMARY_BYTES);
        Self {
            source_address,
            source_port,
            request_summary,
            timestamp,
        }
    }
}

/// Fixed-capacity ring of [`ConnectionEvent`]s, oldest first.
///
/// Recording into a full ledger drops the oldest event and appends the new
/// one in the same call, so `len() <= capacity()` holds at every point a
/// caller can observe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionLedger {
    events: VecDeque<ConnectionEvent>,
    capacity: usize,
}

impl Default for ConnectionLedger {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl ConnectionLedger {
    /// A zero capacity is raised to 1.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            events: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append `event`, evicting the oldest one first when full. Returns the
    /// evicted event, if any.
    pub fn record(&mut self, event: ConnectionEvent) -> Option<ConnectionEvent> {
        let evicted = if self.events.len() == self.capacity {
            self.events.pop_front()
        } else {
            None
        };
        self.events.push_back(event);
        evicted
    }

    pub fn all(&self) -> impl ExactSizeIterator<Item = &ConnectionEvent> {
        self.events.iter()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn to_document(&self) -> LedgerDocument {
        LedgerDocument {
            logs: self
                .events
                .iter()
                .map(|e| LogRecord {
                    ip: e.source_address.to_string(),
                    port: e.source_port,
                    timestamp: e.timestamp,
                    data: e.request_summary.clone(),
                })
                .collect(),
        }
    }

    /// Replace the contents with `doc`. Records are replayed through
    /// [`record`](Self::record), so an oversized document keeps its newest
    /// entries; records with an unparseable address are skipped.
    pub fn restore(&mut self, doc: LedgerDocument) {
        self.events.clear();
        for rec in doc.logs {
            let Ok(addr) = rec.ip.parse::<IpAddr>() else {
                warn!(ip = %rec.ip, "skipping persisted log record with invalid address");
                continue;
            };
            self.record(ConnectionEvent::new(addr, rec.port, rec.data, rec.timestamp));
        }
    }

    pub fn serialize(&self) -> String {
        // A document of strings and integers always serializes.
        serde_json::to_string(&self.to_document()).unwrap_or_else(|_| String::from("{\"logs\":[]}"))
    }

    /// Restore from JSON text. Malformed input leaves the ledger empty.
    pub fn deserialize(&mut self, text: &str) {
        match serde_json::from_str::<LedgerDocument>(text) {
            Ok(doc) => self.restore(doc),
            Err(e) => {
                warn!(error = %e, "malformed ledger document, starting empty");
                self.events.clear();
            }
        }
    }
}

/// Persisted form: `{"logs":[{"ip","port","timestamp","data"}]}`.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct LedgerDocument {
    #[serde(default)]
    pub logs: Vec<LogRecord>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub ip: String,
    #[serde(default)]
    pub port: u16,
    #[serde(default)]
    pub timestamp: u64,
    #[serde(default)]
    pub data: String,
}

pub(crate) fn truncate_on_char_boundary(s: &mut String, max: usize) {
    if s.len() <= max {
        return;
    }
    let mut cut = max;
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    s.truncate(cut);
}
