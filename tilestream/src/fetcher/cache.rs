//! Per-tile disk cache files.
//!
//! One file per tile at a caller-chosen path. No naming scheme or eviction
//! is imposed here: files accumulate until something else removes them.
//! Failures never propagate; a failed read is a miss and a failed write is
//! only logged.

use std::io::ErrorKind;
use std::path::Path;

use bytes::Bytes;
use tracing::{trace, warn};

/// Reads a cached tile.
///
/// Returns `None` when the file is missing, empty or unreadable.
pub fn read_cached(path: &Path) -> Option<Bytes> {
    match std::fs::read(path) {
        Ok(data) if data.is_empty() => {
            trace!(path = %path.display(), "Ignoring empty cache file");
            None
        }
        Ok(data) => Some(Bytes::from(data)),
        Err(e) if e.kind() == ErrorKind::NotFound => None,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to read cache file");
            None
        }
    }
}

/// Writes a fetched tile, creating parent directories as needed.
///
/// Returns whether the write succeeded.
pub async fn write_cached(path: &Path, data: &[u8]) -> bool {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        if let Err(e) = tokio::fs::create_dir_all(parent).await {
            warn!(path = %path.display(), error = %e, "Failed to create cache directory");
            return false;
        }
    }
    match tokio::fs::write(path, data).await {
        Ok(()) => {
            trace!(path = %path.display(), bytes = data.len(), "Wrote cache file");
            true
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to write cache file");
            false
        }
    }
}
