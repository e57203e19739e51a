// Per-file extraction cache and index staleness

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::UNIX_EPOCH;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::index::db::IndexDatabase;
use crate::index::{FileCacheEntry, Symbol};

/// Sidecar file describing the cache the store was last built with
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheSidecar {
    pub version: i64,
    /// Source files seen by the last completed run, parse failures included
    pub file_count: usize,
    /// Start of the scan that built the index, in milliseconds since the
    /// Unix epoch. Edits landing after it make the index stale.
    pub last_indexed: i64,
}

impl CacheSidecar {
    /// Read the sidecar. Missing or corrupt files yield `None`.
    pub fn load(path: &Path) -> Option<Self> {
        let content = std::fs::read_to_string(path).ok()?;
        match serde_json::from_str(&content) {
            Ok(sidecar) => Some(sidecar),
            Err(e) => {
                warn!("Corrupt cache sidecar {}: {}", path.display(), e);
                None
            }
        }
    }

    /// Write via a temporary file and rename so readers never see a partial file
    pub fn write_atomic(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(self)?)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }
}

/// Current on-disk state of one file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileState {
    /// Nanoseconds since the Unix epoch
    pub mtime: i64,
    pub content_hash: String,
}

impl FileState {
    pub fn from_bytes(bytes: &[u8], mtime: i64) -> Self {
        Self {
            mtime,
            content_hash: blake3::hash(bytes).to_hex().to_string(),
        }
    }
}

/// File modification time in nanoseconds since the Unix epoch
pub fn file_mtime(path: &Path) -> std::io::Result<i64> {
    let modified = std::fs::metadata(path)?.modified()?;
    Ok(modified
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as i64)
        .unwrap_or(0))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheDecision {
    Reuse,
    Extract(ExtractReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractReason {
    New,
    Modified,
    VersionMismatch,
}

/// Re-extract unless the stored entry matches mtime, hash and version
pub fn decide(current: &FileState, stored: Option<&FileCacheEntry>, version: i64) -> CacheDecision {
    match stored {
        None => CacheDecision::Extract(ExtractReason::New),
        Some(entry) if entry.cache_schema_version != version => {
            CacheDecision::Extract(ExtractReason::VersionMismatch)
        }
        Some(entry) if entry.mtime != current.mtime || entry.content_hash != current.content_hash => {
            CacheDecision::Extract(ExtractReason::Modified)
        }
        Some(_) => CacheDecision::Reuse,
    }
}

/// Cached entries and symbols of the last completed run
pub struct CacheManager {
    entries: HashMap<String, FileCacheEntry>,
    symbols: HashMap<String, Vec<Symbol>>,
    version: i64,
}

impl CacheManager {
    /// Load the previous run's cache, or start cold when the sidecar is
    /// missing or was written by a different cache version.
    pub fn load(db: &IndexDatabase, sidecar_path: &Path, version: i64) -> Result<Self> {
        let sidecar = CacheSidecar::load(sidecar_path);
        let warm = match &sidecar {
            Some(s) if s.version == version => true,
            Some(s) => {
                info!(
                    "Cache version changed ({} -> {}), invalidating all cached files",
                    s.version, version
                );
                false
            }
            None => {
                debug!("No cache sidecar, starting cold");
                false
            }
        };

        if !warm {
            return Ok(Self::empty(version));
        }

        let entries = db.file_entries()?;
        let symbols = db.symbols_by_file()?;
        debug!("Loaded {} cached file entries", entries.len());
        Ok(Self {
            entries,
            symbols,
            version,
        })
    }

    pub fn empty(version: i64) -> Self {
        Self {
            entries: HashMap::new(),
            symbols: HashMap::new(),
            version,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn version(&self) -> i64 {
        self.version
    }

    pub fn decide(&self, rel_path: &str, current: &FileState) -> CacheDecision {
        decide(current, self.entries.get(rel_path), self.version)
    }

    /// Move out the cached entry and symbols of a file that is being reused
    pub fn take(&mut self, rel_path: &str) -> Option<(FileCacheEntry, Vec<Symbol>)> {
        let entry = self.entries.remove(rel_path)?;
        let symbols = self.symbols.remove(rel_path).unwrap_or_default();
        Some((entry, symbols))
    }
}

/// Result of a staleness check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Staleness {
    pub stale: bool,
    pub reason: String,
}

impl Staleness {
    fn stale(reason: impl Into<String>) -> Self {
        Self {
            stale: true,
            reason: reason.into(),
        }
    }

    fn fresh() -> Self {
        Self {
            stale: false,
            reason: "up to date".to_string(),
        }
    }
}

/// Decide whether the index needs rebuilding without touching the store.
///
/// `files` are the source files currently on disk.
pub fn check_staleness(
    db_path: &Path,
    sidecar_path: &Path,
    version: i64,
    files: &[crate::indexer::walker::SourceFile],
) -> Staleness {
    if !db_path.exists() {
        return Staleness::stale("database does not exist");
    }
    if !sidecar_path.exists() {
        return Staleness::stale("cache file missing");
    }
    let Some(sidecar) = CacheSidecar::load(sidecar_path) else {
        return Staleness::stale("cache file corrupt");
    };
    if sidecar.version != version {
        return Staleness::stale("cache version mismatch");
    }
    if sidecar.file_count != files.len() {
        return Staleness::stale(format!(
            "file count changed ({} cached, {} found)",
            sidecar.file_count,
            files.len()
        ));
    }

    for file in files {
        if let Ok(mtime) = file_mtime(&file.path) {
            if mtime / 1_000_000 > sidecar.last_indexed {
                return Staleness::stale("files modified since last index");
            }
        }
    }

    Staleness::fresh()
}
