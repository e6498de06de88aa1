//! Atomic file operations for safe JSON persistence.
//!
//! Writes go to a temp file in the target directory, are fsynced, and then
//! renamed over the target so a reader never observes a half-written file.

use crate::{AmvError, Result};
use serde::{de::DeserializeOwned, Serialize};
use std::fs;
use std::io::Write;
use std::path::Path;
use tracing::debug;

/// Read and parse a JSON file.
///
/// Returns `None` if the file doesn't exist, or an error if parsing fails.
pub fn atomic_read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }

    let contents = fs::read_to_string(path).map_err(|e| AmvError::Io {
        message: format!("Failed to read {}", path.display()),
        path: Some(path.to_path_buf()),
        source: Some(e),
    })?;

    let data: T = serde_json::from_str(&contents).map_err(|e| AmvError::Json {
        message: format!("Failed to parse {}: {}", path.display(), e),
        source: Some(e),
    })?;

    Ok(Some(data))
}

/// Write data to a JSON file atomically.
///
/// 1. Serializes to pretty JSON
/// 2. Writes a temp file next to the target
/// 3. Syncs it to disk
/// 4. Renames it over the target
pub fn atomic_write_json<T: Serialize>(path: &Path, data: &T) -> Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => std::env::current_dir()?,
    };
    if !parent.exists() {
        fs::create_dir_all(&parent).map_err(|e| AmvError::Io {
            message: format!("Failed to create directory {}", parent.display()),
            path: Some(parent.clone()),
            source: Some(e),
        })?;
    }

    let serialized = serde_json::to_string_pretty(data).map_err(|e| AmvError::Json {
        message: format!("Failed to serialize data: {}", e),
        source: Some(e),
    })?;

    let mut temp = tempfile::Builder::new()
        .prefix(".amv-")
        .suffix(".json.tmp")
        .tempfile_in(&parent)
        .map_err(|e| AmvError::io("Failed to create temp file in", &parent, e))?;

    let written = temp
        .write_all(serialized.as_bytes())
        .and_then(|_| temp.flush());
    let synced = written.and_then(|_| temp.as_file().sync_all());
    if let Err(e) = synced {
        return Err(AmvError::io("Failed to write temp file", temp.path(), e));
    }

    temp.persist(path).map_err(|e| AmvError::Io {
        message: format!("Failed to rename temp file to {}", path.display()),
        path: Some(path.to_path_buf()),
        source: Some(e.error),
    })?;

    debug!("Atomically wrote {}", path.display());
    Ok(())
}
