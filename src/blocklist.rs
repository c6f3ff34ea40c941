//! Addresses excluded from probing and from decoy serving.

use std::net::IpAddr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::types::now_millis;

/// Default soft cap on the number of blocked addresses.
pub const DEFAULT_MAX_ENTRIES: usize = 64;

/// Shared handle used by the scan engine, the decoy responder and the API.
pub type SharedBlockList = Arc<RwLock<BlockList>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockEntry {
    pub address: IpAddr,
    pub reason: String,
    /// Unix milliseconds at insertion.
    pub timestamp: u64,
}

/// Insertion-ordered set of blocked addresses.
///
/// Expected cardinality is tens of entries, so every operation is a linear
/// scan over a `Vec`.
#[derive(Debug, Clone)]
pub struct BlockList {
    entries: Vec<BlockEntry>,
    max_entries: usize,
}

impl Default for BlockList {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ENTRIES)
    }
}

impl BlockList {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: Vec::new(),
            max_entries,
        }
    }

    pub fn into_shared(self) -> SharedBlockList {
        Arc::new(RwLock::new(self))
    }

    /// Block `address`. Returns false when it is already blocked or the list
    /// is at its cap; the existing entry is never overwritten.
    pub fn add(&mut self, address: IpAddr, reason: impl Into<String>) -> bool {
        if self.is_blocked(address) {
            debug!(%address, "address already blocked");
            return false;
        }
        if self.entries.len() >= self.max_entries {
            warn!(%address, max = self.max_entries, "blocklist full, entry not added");
            return false;
        }
        self.entries.push(BlockEntry {
            address,
            reason: reason.into(),
            timestamp: now_millis(),
        });
        true
    }

    pub fn remove(&mut self, address: IpAddr) -> bool {
        match self.entries.iter().position(|e| e.address == address) {
            Some(idx) => {
                self.entries.remove(idx);
                true
            }
            None => false,
        }
    }

    pub fn is_blocked(&self, address: IpAddr) -> bool {
        self.entries.iter().any(|e| e.address == address)
    }

    /// Entries in insertion order.
    pub fn all(&self) -> &[BlockEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn to_document(&self) -> BlockListDocument {
        BlockListDocument {
            blocked_ips: self
                .entries
                .iter()
                .map(|e| BlockedIpRecord {
                    ip: e.address.to_string(),
                    reason: e.reason.clone(),
                    timestamp: e.timestamp,
                })
                .collect(),
        }
    }

    /// Replace the contents with a persisted document. Records with an
    /// unparseable address or a duplicate address are skipped, and the soft
    /// cap still applies.
    pub fn restore(&mut self, doc: BlockListDocument) {
        self.entries.clear();
        for rec in doc.blocked_ips {
            let Ok(address) = rec.ip.parse::<IpAddr>() else {
                warn!(ip = %rec.ip, "skipping persisted block entry with invalid address");
                continue;
            };
            if self.is_blocked(address) || self.entries.len() >= self.max_entries {
                continue;
            }
            self.entries.push(BlockEntry {
                address,
                reason: rec.reason,
                timestamp: rec.timestamp,
            });
        }
    }
}

/// Persisted form: `{"blockedIPs":[{"ip","reason","timestamp"}]}`.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockListDocument {
    #[serde(rename = "blockedIPs", default)]
    pub blocked_ips: Vec<BlockedIpRecord>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct BlockedIpRecord {
    pub ip: String,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub timestamp: u64,
}
