//! Content-addressed memoization of per-analyzer outputs.
//!
//! Key = (snapshot identity, analyzer name, policy hash, analyzer version
//! tag). The in-memory map is append-only within a run; persistence under a
//! workspace-local directory is optional and best-effort. A stale entry —
//! one whose stored snapshot hash or version tag no longer matches — is
//! discarded and recomputed.

use std::path::PathBuf;

use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::core::registry::AnalyzerKind;
use crate::detectors::AnalyzerRun;

/// Content-addressed cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    /// Snapshot identity hash
    pub snapshot_id: String,
    /// Analyzer that produced the value
    pub analyzer: AnalyzerKind,
    /// Policy hash the run used
    pub policy_hash: String,
    /// Analyzer version tag; bumping it invalidates old entries
    pub analyzer_version: u32,
}

impl CacheKey {
    /// Stable digest used as the map key and the persisted file name.
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.snapshot_id.as_bytes());
        hasher.update(b"\x00");
        hasher.update(self.analyzer.as_str().as_bytes());
        hasher.update(b"\x00");
        hasher.update(self.policy_hash.as_bytes());
        hasher.update(b"\x00");
        hasher.update(self.analyzer_version.to_be_bytes());
        let digest = hasher.finalize();
        digest.iter().take(16).map(|b| format!("{b:02x}")).collect()
    }
}

/// A cached analyzer run together with the key fields used for stale
/// detection on reload.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CachedEntry {
    key: CacheKey,
    run: AnalyzerRun,
}

/// The per-run analysis cache. The only shared mutable store on the hot
/// path; operations are atomic per key.
#[derive(Debug, Default)]
pub struct AnalysisCache {
    entries: DashMap<String, CachedEntry>,
    dir: Option<PathBuf>,
    /// Serializes persistence-directory writes across parallel analyzers
    write_lock: Mutex<()>,
}

impl AnalysisCache {
    /// In-memory cache with no persistence.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Cache persisted under the given workspace-local directory.
    pub fn persistent(dir: impl Into<PathBuf>) -> Self {
        Self {
            entries: DashMap::new(),
            dir: Some(dir.into()),
            write_lock: Mutex::new(()),
        }
    }

    /// Look up a cached run. Checks memory first, then the persistence
    /// directory; stale or unreadable persisted entries are discarded.
    pub fn get(&self, key: &CacheKey) -> Option<AnalyzerRun> {
        let digest = key.digest();
        if let Some(entry) = self.entries.get(&digest) {
            return Some(entry.run.clone());
        }

        let dir = self.dir.as_ref()?;
        let path = dir.join(format!("{digest}.json"));
        let content = std::fs::read_to_string(&path).ok()?;
        match serde_json::from_str::<CachedEntry>(&content) {
            Ok(entry) if entry.key == *key => {
                debug!(analyzer = %key.analyzer, "cache hit (disk)");
                self.entries.insert(digest, entry.clone());
                Some(entry.run)
            }
            Ok(stale) => {
                // Hash collision on digest prefix or a moved cache dir
                warn!(
                    analyzer = %key.analyzer,
                    stored_snapshot = %stale.key.snapshot_id,
                    "discarding stale cache entry"
                );
                let _ = std::fs::remove_file(&path);
                None
            }
            Err(e) => {
                warn!("discarding unreadable cache entry {}: {e}", path.display());
                let _ = std::fs::remove_file(&path);
                None
            }
        }
    }

    /// Insert a run. Append-only within a run: an existing entry wins.
    pub fn put(&self, key: CacheKey, run: AnalyzerRun) {
        let digest = key.digest();
        if self.entries.contains_key(&digest) {
            return;
        }
        let entry = CachedEntry { key, run };

        if let Some(dir) = &self.dir {
            let _guard = self.write_lock.lock();
            if let Err(e) = persist(dir, &digest, &entry) {
                warn!("cache persistence failed for {digest}: {e}");
            }
        }
        self.entries.insert(digest, entry);
    }

    /// Number of in-memory entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no entry is cached in memory.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn persist(dir: &PathBuf, digest: &str, entry: &CachedEntry) -> std::io::Result<()> {
    std::fs::create_dir_all(dir)?;
    let payload = serde_json::to_string(entry)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    std::fs::write(dir.join(format!("{digest}.json")), payload)
}
