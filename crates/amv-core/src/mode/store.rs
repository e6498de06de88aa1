//! Loading and saving the mode record on disk.
//!
//! `load` never writes. It reports whether normalization changed the stored
//! content and leaves the decision to persist with the caller. `save` writes
//! atomically and skips the write when the file already holds the same
//! normalized content.

use crate::atomic::{atomic_read_json, atomic_write_json};
use crate::error::Result;
use crate::mode::record::{normalize, ModeRecord};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Result of reading the mode record.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedMode {
    pub record: ModeRecord,
    /// Normalization differs from what is stored (or nothing is stored yet).
    pub changed: bool,
    /// The file was unreadable or invalid and defaults were substituted.
    /// The file itself is left untouched.
    pub recovered: bool,
}

/// JSON-backed mode record store.
#[derive(Debug, Clone)]
pub struct ModeStore {
    path: PathBuf,
}

impl ModeStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read and normalize the stored record.
    pub fn load(&self) -> LoadedMode {
        match self.read_raw() {
            Ok(None) => LoadedMode {
                record: ModeRecord::default(),
                changed: true,
                recovered: false,
            },
            Ok(Some(raw)) => {
                let record = normalize(&raw);
                let changed = serde_json::to_value(&record).map(|v| v != raw).unwrap_or(true);
                if changed {
                    debug!("Stored mode record at {} needs migration", self.path.display());
                }
                LoadedMode {
                    record,
                    changed,
                    recovered: false,
                }
            }
            Err(e) => {
                warn!("Could not load {}, using defaults: {}", self.path.display(), e);
                LoadedMode {
                    record: ModeRecord::default(),
                    changed: false,
                    recovered: true,
                }
            }
        }
    }

    /// Load, then persist the normalized form if it differs from disk.
    ///
    /// A corrupt file is not overwritten here; only an explicit `save` does.
    pub fn load_and_migrate(&self) -> Result<ModeRecord> {
        let loaded = self.load();
        if loaded.changed && !loaded.recovered {
            self.save(&loaded.record)?;
        }
        Ok(loaded.record)
    }

    /// Normalize and write `record`. Returns false when disk already matched.
    pub fn save(&self, record: &ModeRecord) -> Result<bool> {
        let normalized = record.normalized();
        let value = serde_json::to_value(&normalized)?;

        if let Ok(Some(existing)) = self.read_raw() {
            if existing == value {
                debug!("Mode record unchanged, skipping write");
                return Ok(false);
            }
        }

        atomic_write_json(&self.path, &value)?;
        Ok(true)
    }

    /// Move `path` to the front of the recent list and persist if it changed.
    pub fn add_recent_file(&self, path: &Path) -> Result<ModeRecord> {
        let mut record = self.load().record;
        let entry = path.to_string_lossy();
        if record.push_recent(&entry) {
            self.save(&record)?;
        }
        Ok(record)
    }

    fn read_raw(&self) -> Result<Option<Value>> {
        atomic_read_json(&self.path)
    }
}
