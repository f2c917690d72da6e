//! Write-through filesystem persistence.
//!
//! One JSON file per key, written atomically (temp file + rename) so a
//! crash mid-write never leaves a corrupted readable file, plus a bulk
//! dump/load document for shipping a pre-warmed cache.
//!
//! Every error here is environmental: callers on the get/set path never see
//! it. Failures are logged at warn and treated as "no persisted state".

use std::fs;
use std::path::{Path, PathBuf};

use promptdeck_core::{from_epoch_secs, to_epoch_secs, PersistError, Timestamp};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::traits::CacheValue;

/// Longest sanitized-key prefix kept in a filename. The hash suffix does the
/// real collision resistance; the prefix is only there to keep the directory
/// debuggable by eye.
const FILENAME_PREFIX_LEN: usize = 50;

/// Hex characters of the SHA-256 key digest appended to every filename.
const FILENAME_HASH_LEN: usize = 16;

/// Per-key persisted file format (float epoch-second timestamps).
#[derive(Deserialize)]
struct EntryFile<V> {
    key: String,
    value: V,
    created_at: f64,
    last_accessed_at: f64,
}

/// Borrowing mirror of [`EntryFile`] for the write path.
#[derive(Serialize)]
struct EntryFileRef<'a, V> {
    key: &'a str,
    value: &'a V,
    created_at: f64,
    last_accessed_at: f64,
}

/// Bulk dump format: `{"entries": {key: value, ...}}`.
#[derive(Serialize, Deserialize)]
struct DumpFile {
    entries: serde_json::Map<String, serde_json::Value>,
}

/// Derive a deterministic, filesystem-safe filename for a cache key.
///
/// Keys are opaque strings like `owner/repo:commit_hash`; slashes, colons,
/// and anything else non-portable are squashed to `_`, and a key-hash suffix
/// keeps distinct keys from colliding after sanitization.
pub(crate) fn filename_for(key: &str) -> String {
    let safe_prefix: String = key
        .chars()
        .take(FILENAME_PREFIX_LEN)
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let digest = Sha256::digest(key.as_bytes());
    let key_hash = &hex::encode(digest)[..FILENAME_HASH_LEN];
    format!("{safe_prefix}_{key_hash}.json")
}

/// Handle on the cache's persistence directory.
///
/// Holds no live entry state; it is purely a serialization target/source
/// keyed by the same strings as the in-memory store.
#[derive(Debug, Clone)]
pub(crate) struct PersistDir {
    dir: PathBuf,
}

impl PersistDir {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    /// Create the directory if missing. Failure is logged, not raised: the
    /// cache keeps working memory-only on a read-only filesystem.
    pub fn ensure_dir(&self) {
        if let Err(e) = fs::create_dir_all(&self.dir) {
            warn!(dir = %self.dir.display(), error = %e, "failed to create cache directory");
        }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(filename_for(key))
    }

    /// Write-through a single entry. Errors are logged and swallowed.
    pub fn write_entry<V: CacheValue>(
        &self,
        key: &str,
        value: &V,
        created_at: Timestamp,
        last_accessed_at: Timestamp,
    ) {
        let file = EntryFileRef {
            key,
            value,
            created_at: to_epoch_secs(created_at),
            last_accessed_at: to_epoch_secs(last_accessed_at),
        };
        if let Err(e) = atomic_write_json(&self.path_for(key), &file) {
            warn!(key, error = %e, "failed to persist cache entry");
        }
    }

    /// Load a single entry. Missing, corrupted, or mismatched files read as
    /// absent.
    pub fn read_entry<V: CacheValue>(&self, key: &str) -> Option<(V, Timestamp, Timestamp)> {
        let path = self.path_for(key);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(key, error = %e, "failed to read persisted cache entry");
                return None;
            }
        };
        let file: EntryFile<V> = match serde_json::from_slice(&bytes) {
            Ok(file) => file,
            Err(e) => {
                warn!(key, error = %e, "corrupted cache file, treating as absent");
                return None;
            }
        };
        // A hash collision or a file copied between directories would pair
        // the wrong payload with this key.
        if file.key != key {
            warn!(
                expected = key,
                found = %file.key,
                "cache key mismatch in persisted file, treating as absent"
            );
            return None;
        }
        Some((
            file.value,
            from_epoch_secs(file.created_at),
            from_epoch_secs(file.last_accessed_at),
        ))
    }

    /// Delete a single entry's file. Errors are logged and swallowed.
    pub fn remove_entry(&self, key: &str) {
        let path = self.path_for(key);
        if let Err(e) = fs::remove_file(&path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(key, error = %e, "failed to delete cache file");
            }
        }
    }

    /// Delete every persisted `*.json` entry.
    pub fn clear(&self) {
        let Ok(dir) = fs::read_dir(&self.dir) else {
            return;
        };
        for path in json_files(dir) {
            if let Err(e) = fs::remove_file(&path) {
                warn!(path = %path.display(), error = %e, "failed to delete cache file");
            }
        }
    }

    /// Scan the directory and deserialize every readable entry, for startup
    /// warming. Unreadable files are skipped with a warning; expiry
    /// filtering is the caller's job (it owns the staleness policy).
    pub fn scan<V: CacheValue>(&self) -> Vec<(String, V, Timestamp, Timestamp)> {
        let Ok(dir) = fs::read_dir(&self.dir) else {
            return Vec::new();
        };
        let mut out = Vec::new();
        for path in json_files(dir) {
            let parsed = fs::read(&path)
                .map_err(PersistError::from)
                .and_then(|bytes| Ok(serde_json::from_slice::<EntryFile<V>>(&bytes)?));
            match parsed {
                Ok(file) => out.push((
                    file.key,
                    file.value,
                    from_epoch_secs(file.created_at),
                    from_epoch_secs(file.last_accessed_at),
                )),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "skipping unreadable cache file");
                }
            }
        }
        out
    }
}

/// Write a bulk dump document. Unlike the write-through path this is an
/// explicit offline operation, so errors propagate.
pub(crate) fn write_dump(
    path: &Path,
    entries: serde_json::Map<String, serde_json::Value>,
) -> Result<(), PersistError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let count = entries.len();
    atomic_write_json(path, &DumpFile { entries })?;
    debug!(count, path = %path.display(), "dumped cache entries");
    Ok(())
}

/// Read a bulk dump document. Missing or corrupt files read as empty.
pub(crate) fn read_dump(path: &Path) -> serde_json::Map<String, serde_json::Value> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) => {
            debug!(path = %path.display(), error = %e, "cache dump not readable");
            return serde_json::Map::new();
        }
    };
    match serde_json::from_slice::<DumpFile>(&bytes) {
        Ok(file) => file.entries,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "corrupted cache dump, loading nothing");
            serde_json::Map::new()
        }
    }
}

/// Serialize to a sibling temp file, then atomically rename over the target.
fn atomic_write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), PersistError> {
    let bytes = serde_json::to_vec_pretty(value)?;
    let tmp = path.with_extension("tmp");
    if let Err(e) = fs::write(&tmp, &bytes).and_then(|_| fs::rename(&tmp, path)) {
        let _ = fs::remove_file(&tmp);
        return Err(e.into());
    }
    Ok(())
}

fn json_files(dir: fs::ReadDir) -> impl Iterator<Item = PathBuf> {
    dir.flatten()
        .map(|e| e.path())
        .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
}
