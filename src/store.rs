//! JSON document persistence for the blocklist and ledger slots.
//!
//! Loads treat a missing or malformed file as "no prior state". Saves are
//! fire-and-forget from the caller's point of view: [`JsonStore::save_or_warn`]
//! logs failures and returns.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::PersistenceError;

/// Named document slots on local storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    BlockList,
    Ledger,
}

impl Slot {
    pub fn file_name(self) -> &'static str {
        match self {
            Slot::BlockList => "network_config.json",
            Slot::Ledger => "honeypot_logs.json",
        }
    }
}

#[derive(Debug, Clone)]
pub struct JsonStore {
    dir: PathBuf,
}

impl JsonStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self, slot: Slot) -> PathBuf {
        self.dir.join(slot.file_name())
    }

    /// Read a slot. `Ok(None)` when the file does not exist.
    pub fn load<T: DeserializeOwned>(&self, slot: Slot) -> Result<Option<T>, PersistenceError> {
        let path = self.path(slot);
        let text = match fs::read_to_string(&path) {
            Ok(t) => t,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(PersistenceError::Unavailable { path, source }),
        };
        serde_json::from_str(&text)
            .map(Some)
            .map_err(|source| PersistenceError::Malformed { path, source })
    }

    /// Read a slot, falling back to the default document on any failure.
    pub fn load_or_default<T: DeserializeOwned + Default>(&self, slot: Slot) -> T {
        match self.load(slot) {
            Ok(Some(doc)) => doc,
            Ok(None) => {
                debug!(slot = slot.file_name(), "no persisted state");
                T::default()
            }
            Err(e) => {
                warn!(error = %e, "persisted state unusable, starting empty");
                T::default()
            }
        }
    }

    /// Write a slot via a temporary file and rename.
    pub fn save<T: Serialize>(&self, slot: Slot, doc: &T) -> Result<(), PersistenceError> {
        let path = self.path(slot);
        let unavailable = |source| PersistenceError::Unavailable {
            path: path.clone(),
            source,
        };
        fs::create_dir_all(&self.dir).map_err(unavailable)?;
        let text = serde_json::to_string(doc).map_err(|source| PersistenceError::Malformed {
            path: path.clone(),
            source,
        })?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, text).map_err(unavailable)?;
        fs::rename(&tmp, &path).map_err(unavailable)?;
        Ok(())
    }

    pub fn save_or_warn<T: Serialize>(&self, slot: Slot, doc: &T) {
        if let Err(e) = self.save(slot, doc) {
            warn!(error = %e, "failed to persist state");
        }
    }
}
